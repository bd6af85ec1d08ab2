// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Pipeline stages. `collect` gathers binding items from the services,
//! `mapping` and `naming` shape them, `project` injects them into the
//! applications.

pub mod collect;
pub mod mapping;
pub mod naming;
pub mod project;
