// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::SECRET_HASH_LEN;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The service an item was collected from, kept for naming templates only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSource {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingItem {
    pub name: String,
    pub value: String,
    pub source: Option<ItemSource>,
}

impl BindingItem {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        source: Option<ItemSource>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            source,
        }
    }
}

/// Ordered collection of binding items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingItems(Vec<BindingItem>);

impl BindingItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: BindingItem) {
        self.0.push(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingItem> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BindingItem> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|i| i.name == name)
    }

    /// Fold into a map. Items added later win over earlier ones with the same name.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|i| (i.name.clone(), i.value.clone()))
            .collect()
    }

    /// Name of the secret holding these items: `<prefix>-<content hash>`.
    ///
    /// The hash covers the folded, sorted content, so equal bindings share a
    /// name and any change of a key or value yields a new one.
    pub fn secret_name(&self, prefix: &str) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in self.as_map() {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}", prefix, &digest[..SECRET_HASH_LEN])
    }
}

impl Extend<BindingItem> for BindingItems {
    fn extend<T: IntoIterator<Item = BindingItem>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl FromIterator<BindingItem> for BindingItems {
    fn from_iter<T: IntoIterator<Item = BindingItem>>(iter: T) -> Self {
        BindingItems(iter.into_iter().collect())
    }
}
