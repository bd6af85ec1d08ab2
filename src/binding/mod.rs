// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Binding definitions and the data they produce.

mod definition;
mod items;
mod value;

pub use definition::{object_data, read_data, Definition, DefinitionKind, ObjectType};
pub use items::{BindingItem, BindingItems, ItemSource};
pub use value::{scalar_to_string, Value};
