// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! In-memory [`ObjectStore`] with a call log, resource version conflicts and finalizer-aware deletion.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::ResourceExt;
use serde_json::{Map, Value};

use super::{ObjectStore, StoreError, StoreObject};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
    Patch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(self.verb, Verb::Get | Verb::List)
    }
}

type ObjectId = (String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<ObjectId, Value>,
    calls: Vec<StoreCall>,
    resource_version: u64,
}

impl Inner {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn record(&mut self, verb: Verb, kind: &str, namespace: &str, name: &str) {
        self.calls.push(StoreCall {
            verb,
            kind: kind.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        });
    }
}

#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<Inner>,
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

fn id_of<K: StoreObject>(namespace: Option<&str>, name: &str) -> ObjectId {
    (format!("{}/{}", K::group(&()), K::kind(&())), namespace.unwrap_or_default().to_owned(), name.to_owned())
}

fn metadata_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value["metadata"].is_object() {
        value["metadata"] = Value::Object(Map::new());
    }
    match value.get_mut("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => unreachable!("metadata was just set to an object"),
    }
}

fn resource_version(value: &Value) -> Option<&str> {
    value["metadata"]["resourceVersion"].as_str()
}

fn has_finalizers(value: &Value) -> bool {
    value["metadata"]["finalizers"].as_array().is_some_and(|f| !f.is_empty())
}

fn is_deleting(value: &Value) -> bool {
    !value["metadata"]["deletionTimestamp"].is_null()
}

fn check_version(kind: &str, name: &str, stored: &Value, incoming: &Value) -> Result<(), StoreError> {
    match resource_version(incoming) {
        Some(version) if Some(version) != resource_version(stored) => Err(StoreError::Conflict(format!("{kind} {name} has been modified"))),
        _ => Ok(()),
    }
}

/// JSON merge patch as defined by RFC 7386.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl FakeStore {
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockingError)
    }

    /// Inserts an object as if it already existed, status included, without logging a call.
    pub fn seed<K: StoreObject>(&self, object: K) -> K {
        let mut inner = self.lock().expect("fake store lock");
        let mut value = serde_json::to_value(&object).expect("serializable object");
        let version = inner.next_resource_version();
        let metadata = metadata_mut(&mut value);
        metadata.entry("uid").or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        metadata.entry("generation").or_insert(Value::from(1));
        metadata.insert("resourceVersion".to_owned(), Value::String(version));
        let id = id_of::<K>(object.namespace().as_deref(), &object.name_any());
        inner.objects.insert(id, value.clone());
        serde_json::from_value(value).expect("deserializable object")
    }

    pub fn object<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let inner = self.lock().expect("fake store lock");
        inner.objects.get(&id_of::<K>(namespace, name)).map(|value| serde_json::from_value(value.clone()).expect("deserializable object"))
    }

    pub fn objects<K: StoreObject>(&self) -> Vec<K> {
        let inner = self.lock().expect("fake store lock");
        let kind = id_of::<K>(None, "").0;
        inner
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, value)| serde_json::from_value(value.clone()).expect("deserializable object"))
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().expect("fake store lock").calls.clone()
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls().into_iter().filter(StoreCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        self.lock().expect("fake store lock").calls.clear();
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<Option<K>, StoreError> {
        let mut inner = self.lock()?;
        inner.record(Verb::Get, &kind_of::<K>(), namespace.unwrap_or_default(), name);
        inner.objects.get(&id_of::<K>(namespace, name)).map(|value| serde_json::from_value(value.clone())).transpose().map_err(Into::into)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>, selector: &BTreeMap<String, String>) -> Result<Vec<K>, StoreError> {
        let mut inner = self.lock()?;
        inner.record(Verb::List, &kind_of::<K>(), namespace.unwrap_or_default(), "");
        let kind = id_of::<K>(None, "").0;
        inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|namespace| namespace == ns))
            .filter(|(_, value)| selector.iter().all(|(key, expected)| value["metadata"]["labels"][key].as_str() == Some(expected.as_str())))
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(Into::into))
            .collect()
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let mut inner = self.lock()?;
        let namespace = object.namespace();
        let name = object.name_any();
        inner.record(Verb::Create, &kind_of::<K>(), namespace.as_deref().unwrap_or_default(), &name);
        let id = id_of::<K>(namespace.as_deref(), &name);
        if inner.objects.contains_key(&id) {
            return Err(StoreError::Conflict(format!("{} {name} already exists", kind_of::<K>())));
        }

        let mut value = serde_json::to_value(object)?;
        if let Value::Object(map) = &mut value {
            map.remove("status");
        }
        let version = inner.next_resource_version();
        let metadata = metadata_mut(&mut value);
        metadata.insert("uid".to_owned(), Value::String(uuid::Uuid::new_v4().to_string()));
        metadata.insert("generation".to_owned(), Value::from(1));
        metadata.insert("resourceVersion".to_owned(), Value::String(version));
        inner.objects.insert(id, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let mut inner = self.lock()?;
        let namespace = object.namespace();
        let name = object.name_any();
        let kind = kind_of::<K>();
        inner.record(Verb::Update, &kind, namespace.as_deref().unwrap_or_default(), &name);
        let id = id_of::<K>(namespace.as_deref(), &name);
        let Some(stored) = inner.objects.get(&id).cloned() else {
            return Err(StoreError::NotFound(format!("{kind} {name}")));
        };

        let mut value = serde_json::to_value(object)?;
        check_version(&kind, &name, &stored, &value)?;
        value["status"] = stored["status"].clone();
        if let Value::Object(map) = &mut value {
            if map.get("status").is_some_and(Value::is_null) {
                map.remove("status");
            }
        }
        let generation = stored["metadata"]["generation"].as_i64().unwrap_or(1);
        let generation = if stored["spec"] == value["spec"] { generation } else { generation + 1 };
        let version = inner.next_resource_version();
        let metadata = metadata_mut(&mut value);
        metadata.insert("uid".to_owned(), stored["metadata"]["uid"].clone());
        metadata.insert("generation".to_owned(), Value::from(generation));
        metadata.insert("resourceVersion".to_owned(), Value::String(version));
        if is_deleting(&value) && !has_finalizers(&value) {
            inner.objects.remove(&id);
        } else {
            inner.objects.insert(id, value.clone());
        }
        Ok(serde_json::from_value(value)?)
    }

    async fn update_status<K: StoreObject>(&self, object: &K) -> Result<K, StoreError> {
        let mut inner = self.lock()?;
        let namespace = object.namespace();
        let name = object.name_any();
        let kind = kind_of::<K>();
        inner.record(Verb::UpdateStatus, &kind, namespace.as_deref().unwrap_or_default(), &name);
        let id = id_of::<K>(namespace.as_deref(), &name);
        let Some(mut stored) = inner.objects.get(&id).cloned() else {
            return Err(StoreError::NotFound(format!("{kind} {name}")));
        };

        let incoming = serde_json::to_value(object)?;
        check_version(&kind, &name, &stored, &incoming)?;
        stored["status"] = incoming["status"].clone();
        let version = inner.next_resource_version();
        metadata_mut(&mut stored).insert("resourceVersion".to_owned(), Value::String(version));
        inner.objects.insert(id, stored.clone());
        Ok(serde_json::from_value(stored)?)
    }

    async fn delete<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.record(Verb::Delete, &kind_of::<K>(), namespace.unwrap_or_default(), name);
        let id = id_of::<K>(namespace, name);
        let Some(mut stored) = inner.objects.get(&id).cloned() else {
            return Ok(());
        };
        if has_finalizers(&stored) {
            if !is_deleting(&stored) {
                let version = inner.next_resource_version();
                let metadata = metadata_mut(&mut stored);
                metadata.insert("deletionTimestamp".to_owned(), serde_json::to_value(Time(Utc::now()))?);
                metadata.insert("resourceVersion".to_owned(), Value::String(version));
                inner.objects.insert(id, stored);
            }
        } else {
            inner.objects.remove(&id);
        }
        Ok(())
    }

    async fn patch<K: StoreObject>(&self, namespace: Option<&str>, name: &str, patch: &Value) -> Result<K, StoreError> {
        let mut inner = self.lock()?;
        let kind = kind_of::<K>();
        inner.record(Verb::Patch, &kind, namespace.unwrap_or_default(), name);
        let id = id_of::<K>(namespace, name);
        let Some(mut stored) = inner.objects.get(&id).cloned() else {
            return Err(StoreError::NotFound(format!("{kind} {name}")));
        };
        check_version(&kind, name, &stored, patch)?;

        merge_patch(&mut stored, patch);
        let version = inner.next_resource_version();
        metadata_mut(&mut stored).insert("resourceVersion".to_owned(), Value::String(version));
        if is_deleting(&stored) && !has_finalizers(&stored) {
            inner.objects.remove(&id);
        } else {
            inner.objects.insert(id, stored.clone());
        }
        Ok(serde_json::from_value(stored)?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use kube::ResourceExt;
    use kube_core::ObjectMeta;
    use serde_json::json;

    use super::{merge_patch, FakeStore, Verb};
    use crate::store::{label_selector, ObjectStore, StoreError};

    fn secret(name: &str, labels: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("ns".to_owned()),
                labels: Some(label_selector(labels)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_patch() {
        let mut target = json!({"a": "b", "c": {"d": "e", "f": "g"}});
        merge_patch(&mut target, &json!({"a": "z", "c": {"f": null}}));
        assert_eq!(target, json!({"a": "z", "c": {"d": "e"}}));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = FakeStore::default();
        let created = store.create(&secret("s", &[])).await.expect("create");
        let updated = store.update(&created).await.expect("update");
        assert_ne!(created.resource_version(), updated.resource_version());

        let result = store.update(&created).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_by_labels() {
        let store = FakeStore::default();
        store.seed(secret("a", &[("owner", "x")]));
        store.seed(secret("b", &[("owner", "y")]));
        let listed: Vec<Secret> = store.list(Some("ns"), &label_selector(&[("owner", "x")])).await.expect("list");
        assert_eq!(listed.iter().map(ResourceExt::name_any).collect::<Vec<_>>(), vec!["a".to_owned()]);

        let all: Vec<Secret> = store.list(None, &BTreeMap::new()).await.expect("list");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers() {
        let store = FakeStore::default();
        let mut object = secret("s", &[]);
        object.metadata.finalizers = Some(vec!["test".to_owned()]);
        store.seed(object);

        store.delete::<Secret>(Some("ns"), "s").await.expect("delete");
        let pending = store.object::<Secret>(Some("ns"), "s").expect("still present");
        assert!(pending.metadata.deletion_timestamp.is_some());

        store.patch::<Secret>(Some("ns"), "s", &json!({"metadata": {"finalizers": []}})).await.expect("patch");
        assert!(store.object::<Secret>(Some("ns"), "s").is_none());
        let verbs: Vec<_> = store.calls().iter().map(|c| c.verb).collect();
        assert_eq!(verbs, vec![Verb::Delete, Verb::Patch]);
    }
}
