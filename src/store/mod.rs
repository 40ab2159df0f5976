// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Read/write access to cluster objects.
//!
//! Reconcilers only talk to the cluster through [`ObjectStore`], which keeps them testable against the
//! in-memory store used by the unit tests.

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

#[cfg(test)]
pub(crate) mod fake;
mod kube_store;

pub use kube_store::KubeStore;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    NotFound(String),
    Conflict(String),
    Api(String),
    Serialization(String),
    LockingError,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub trait StoreObject: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<K> StoreObject for K where K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// `namespace` is `None` for cluster scoped kinds.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError>;

    /// Lists objects whose labels contain every pair of `selector`; an empty selector lists everything.
    async fn list<K: StoreObject>(&self, namespace: Option<&str>, selector: &BTreeMap<String, String>) -> Result<Vec<K>, StoreError>;

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError>;

    /// Replaces the object; a stale `resourceVersion` fails with [`StoreError::Conflict`].
    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError>;

    async fn update_status<K: StoreObject>(&self, object: &K) -> Result<K, StoreError>;

    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError>;

    /// Applies a JSON merge patch.
    async fn patch<K: StoreObject>(&self, namespace: Option<&str>, name: &str, patch: &serde_json::Value) -> Result<K, StoreError>;
}

/// Renders a selector the way the API server expects it in `labelSelector`.
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

pub fn label_selector(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
}
