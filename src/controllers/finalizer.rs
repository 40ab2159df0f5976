// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, warn};

use super::{ControllerError, Result};
use crate::{
    common::format_resource,
    store::{ObjectStore, StoreObject},
};

/// Adds and removes finalizers with JSON merge patches pinned to the observed `resourceVersion`.
pub struct FinalizerPatcher {}

impl FinalizerPatcher {
    /// Returns the patched object, or `None` when the finalizer was already present.
    pub async fn ensure_finalizer<S, K>(store: &S, resource: &K, finalizer_name: &str) -> Result<Option<K>>
    where
        S: ObjectStore,
        K: StoreObject,
    {
        let finalizers = resource.finalizers();
        if finalizers.iter().any(|f| f == finalizer_name) {
            return Ok(None);
        }
        let mut finalizers = finalizers.to_vec();
        finalizers.push(finalizer_name.to_owned());
        debug!("ensure_finalizer {} {} {finalizer_name}", format_resource::<K>(), resource.name_any());
        Self::patch(store, resource, finalizers).await.map(Some)
    }

    pub async fn remove_finalizer<S, K>(store: &S, resource: &K, finalizer_name: &str) -> Result<()>
    where
        S: ObjectStore,
        K: StoreObject,
    {
        let finalizers: Vec<String> = resource.finalizers().iter().filter(|f| *f != finalizer_name).cloned().collect();
        if finalizers.len() == resource.finalizers().len() {
            return Ok(());
        }
        debug!("remove_finalizer {} {} {finalizer_name}", format_resource::<K>(), resource.name_any());
        Self::patch(store, resource, finalizers).await.map(|_| ())
    }

    async fn patch<S, K>(store: &S, resource: &K, finalizers: Vec<String>) -> Result<K>
    where
        S: ObjectStore,
        K: StoreObject,
    {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": resource.resource_version(),
            }
        });
        let name = resource.name_any();
        store.patch::<K>(resource.namespace().as_deref(), &name, &patch).await.map_err(|e| {
            warn!("patch_finalizer: {} {name} patch failed {e}", format_resource::<K>());
            ControllerError::FinalizerPatchFailed(e.to_string())
        })
    }
}
