// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::{
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
    core::{params::GetParams, ObjectList, Request},
    Client, ResourceExt,
};
use tracing::debug;

use super::{selector_string, ObjectStore, StoreError, StoreObject};
use crate::common::format_resource;

/// [`ObjectStore`] over the kube API server.
///
/// Requests are built from [`kube::Resource::url_path`] so that one code path serves namespaced and
/// cluster scoped kinds.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_owned(),
        }
    }

    fn request<K: StoreObject>(namespace: Option<&str>) -> Request {
        Request::new(K::url_path(&(), namespace))
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

fn map_error(e: kube::Error) -> StoreError {
    match e {
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound(response.message),
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict(response.message),
        e => StoreError::Api(e.to_string()),
    }
}

fn build_error(e: kube::core::request::Error) -> StoreError {
    StoreError::Api(e.to_string())
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError> {
        let request = Self::request::<K>(namespace).get(name, &GetParams::default()).map_err(build_error)?;
        match self.client.request::<K>(request).await.map_err(map_error) {
            Ok(object) => Ok(Some(object)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>, selector: &BTreeMap<String, String>) -> Result<Vec<K>, StoreError> {
        let params = if selector.is_empty() { ListParams::default() } else { ListParams::default().labels(&selector_string(selector)) };
        let request = Self::request::<K>(namespace).list(&params).map_err(build_error)?;
        let list: ObjectList<K> = self.client.request(request).await.map_err(map_error)?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        debug!("Creating {} {}", format_resource::<K>(), object.name_any());
        let data = serde_json::to_vec(object)?;
        let request = Self::request::<K>(object.namespace().as_deref()).create(&self.post_params(), data).map_err(build_error)?;
        self.client.request(request).await.map_err(map_error)
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        debug!("Updating {} {}", format_resource::<K>(), object.name_any());
        let data = serde_json::to_vec(object)?;
        let request = Self::request::<K>(object.namespace().as_deref())
            .replace(&object.name_any(), &self.post_params(), data)
            .map_err(build_error)?;
        self.client.request(request).await.map_err(map_error)
    }

    async fn update_status<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        debug!("Updating status of {} {}", format_resource::<K>(), object.name_any());
        let data = serde_json::to_vec(object)?;
        let request = Self::request::<K>(object.namespace().as_deref())
            .replace_subresource("status", &object.name_any(), &self.post_params(), data)
            .map_err(build_error)?;
        self.client.request(request).await.map_err(map_error)
    }

    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        debug!("Deleting {} {name}", format_resource::<K>());
        let request = Self::request::<K>(namespace).delete(name, &DeleteParams::default()).map_err(build_error)?;
        match self.client.request_text(request).await.map_err(map_error) {
            Ok(_) | Err(StoreError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn patch<K: StoreObject>(&self, namespace: Option<&str>, name: &str, patch: &serde_json::Value) -> Result<K, StoreError> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        let request = Self::request::<K>(namespace).patch(name, &params, &Patch::Merge(patch)).map_err(build_error)?;
        self.client.request(request).await.map_err(map_error)
    }
}
