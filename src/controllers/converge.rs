// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Create-or-update of derived objects.
//!
//! Every derived kind implements [`Child`]; [`converge`] is the only place that decides between
//! create, update and leaving the stored object alone.

use std::collections::BTreeSet;

use k8s_openapi::{
    api::core::v1::{Secret, Service},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use super::{route::certificates, ControllerError, Result};
use crate::{
    common::{ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY},
    crds::{CertManagerCertificate, Certificate, ClusterIngress, VirtualService},
    store::{ObjectStore, StoreObject},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildKind {
    VirtualService,
    Certificate,
    CertManagerCertificate,
    Secret,
    ClusterIngress,
    Service,
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Converged<K> {
    Created(K),
    Updated(K),
    Unchanged(K),
}

impl<K> Converged<K> {
    pub fn into_inner(self) -> K {
        match self {
            Converged::Created(k) | Converged::Updated(k) | Converged::Unchanged(k) => k,
        }
    }
}

pub trait Child: StoreObject {
    const KIND: ChildKind;

    /// Whether the stored object belongs to the owner that produced `desired`.
    fn is_owned_by(&self, desired: &Self) -> bool {
        is_controlled_by_same_owner(self.meta(), desired.meta())
    }

    /// Equality restricted to the fields the owner manages.
    fn semantic_eq(&self, desired: &Self) -> bool;

    /// Overwrites the managed fields with the desired ones, keeping everything else.
    fn merge_from(&mut self, desired: &Self);
}

fn controller_uid(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references.as_ref()?.iter().find(|r| r.controller == Some(true)).map(|r| r.uid.as_str())
}

fn is_controlled_by_same_owner(existing: &ObjectMeta, desired: &ObjectMeta) -> bool {
    match (controller_uid(existing), controller_uid(desired)) {
        (Some(existing), Some(desired)) => existing == desired,
        _ => false,
    }
}

pub async fn converge<S, K>(store: &S, desired: K) -> Result<Converged<K>>
where
    S: ObjectStore,
    K: Child,
{
    let namespace = desired.namespace();
    let name = desired.name_any();
    let kind = K::KIND;

    let Some(mut existing) = store.get::<K>(namespace.as_deref(), &name).await? else {
        let created = store.create(&desired).await?;
        info!("Created {kind} {}", display_name(namespace.as_deref(), &name));
        return Ok(Converged::Created(created));
    };

    if !existing.is_owned_by(&desired) {
        return Err(ControllerError::NotOwned { kind, name });
    }

    if existing.semantic_eq(&desired) {
        debug!("{kind} {} is up to date", display_name(namespace.as_deref(), &name));
        return Ok(Converged::Unchanged(existing));
    }

    existing.merge_from(&desired);
    let updated = store.update(&existing).await?;
    info!("Updated {kind} {}", display_name(namespace.as_deref(), &name));
    Ok(Converged::Updated(updated))
}

fn display_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}/{name}"),
        None => name.to_owned(),
    }
}

impl Child for VirtualService {
    const KIND: ChildKind = ChildKind::VirtualService;

    fn semantic_eq(&self, desired: &Self) -> bool {
        self.spec == desired.spec && self.metadata.labels == desired.metadata.labels
    }

    fn merge_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
        self.metadata.labels.clone_from(&desired.metadata.labels);
    }
}

impl Child for CertManagerCertificate {
    const KIND: ChildKind = ChildKind::CertManagerCertificate;

    fn semantic_eq(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }

    fn merge_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

impl Child for Secret {
    const KIND: ChildKind = ChildKind::Secret;

    fn semantic_eq(&self, desired: &Self) -> bool {
        self.data == desired.data && self.type_ == desired.type_ && self.metadata.labels == desired.metadata.labels
    }

    fn merge_from(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.type_.clone_from(&desired.type_);
        self.metadata.labels.clone_from(&desired.metadata.labels);
    }
}

impl Child for Service {
    const KIND: ChildKind = ChildKind::Service;

    fn semantic_eq(&self, desired: &Self) -> bool {
        let (Some(existing), Some(desired)) = (&self.spec, &desired.spec) else {
            return self.spec.is_none() && desired.spec.is_none();
        };
        existing.type_ == desired.type_ && existing.external_name == desired.external_name && existing.ports == desired.ports
    }

    fn merge_from(&mut self, desired: &Self) {
        let Some(desired_spec) = &desired.spec else {
            return;
        };
        let spec = self.spec.get_or_insert_with(Default::default);
        spec.type_.clone_from(&desired_spec.type_);
        spec.external_name.clone_from(&desired_spec.external_name);
        spec.ports.clone_from(&desired_spec.ports);
        spec.session_affinity.clone_from(&desired_spec.session_affinity);
        self.metadata.labels.clone_from(&desired.metadata.labels);
    }
}

impl Child for ClusterIngress {
    const KIND: ChildKind = ChildKind::ClusterIngress;

    /// Cluster ingresses are owned through the route labels.
    fn is_owned_by(&self, desired: &Self) -> bool {
        [ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY]
            .iter()
            .all(|key| self.labels().get(*key).is_some_and(|value| desired.labels().get(*key) == Some(value)))
    }

    fn semantic_eq(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }

    fn merge_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
        let labels = self.labels_mut();
        for (key, value) in desired.labels() {
            labels.insert(key.clone(), value.clone());
        }
    }
}

impl Child for Certificate {
    const KIND: ChildKind = ChildKind::Certificate;

    /// Certificates can be shared between routes; any certificate carrying a route ownership list is
    /// adoptable.
    fn is_owned_by(&self, _desired: &Self) -> bool {
        certificates::route_owners(self).is_some()
    }

    fn semantic_eq(&self, desired: &Self) -> bool {
        let existing: BTreeSet<String> = certificates::route_owners(self).unwrap_or_default().into_iter().collect();
        self.spec == desired.spec && certificates::route_owners(desired).unwrap_or_default().iter().all(|owner| existing.contains(owner))
    }

    fn merge_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
        certificates::add_route_owners(self, desired);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::OwnerReference, ByteString};

    use super::{converge, ChildKind, Converged};
    use crate::{
        controllers::{test_support::meta, ControllerError},
        store::fake::{FakeStore, Verb},
    };

    fn owned_secret(owner_uid: &str, value: &str) -> Secret {
        let mut metadata = meta(Some("istio-system"), "replica");
        metadata.owner_references = Some(vec![OwnerReference {
            api_version: "networking.internal.knative.dev/v1alpha1".to_owned(),
            kind: "ClusterIngress".to_owned(),
            name: "ci".to_owned(),
            uid: owner_uid.to_owned(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]);
        Secret {
            metadata,
            data: Some(BTreeMap::from([("tls.crt".to_owned(), ByteString(value.as_bytes().to_vec()))])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_converge_create_update_unchanged() {
        let store = FakeStore::default();

        let created = converge(&store, owned_secret("uid-1", "a")).await.expect("create");
        assert!(matches!(created, Converged::Created(_)));

        let unchanged = converge(&store, owned_secret("uid-1", "a")).await.expect("no-op");
        assert!(matches!(unchanged, Converged::Unchanged(_)));

        let updated = converge(&store, owned_secret("uid-1", "b")).await.expect("update");
        assert!(matches!(updated, Converged::Updated(_)));

        let verbs: Vec<_> = store.writes().iter().map(|c| c.verb).collect();
        assert_eq!(verbs, vec![Verb::Create, Verb::Update]);
    }

    #[tokio::test]
    async fn test_converge_repairs_secret_labels_and_type() {
        let store = FakeStore::default();
        let mut drifted = owned_secret("uid-1", "a");
        drifted.metadata.labels = Some(BTreeMap::from([("networking.internal.knative.dev/clusteringress".to_owned(), "other".to_owned())]));
        store.seed(drifted);

        let mut desired = owned_secret("uid-1", "a");
        desired.metadata.labels = Some(BTreeMap::from([("networking.internal.knative.dev/clusteringress".to_owned(), "ci".to_owned())]));
        desired.type_ = Some("kubernetes.io/tls".to_owned());

        let converged = converge(&store, desired.clone()).await.expect("repaired");
        let repaired = converged.into_inner();
        assert_eq!(repaired.metadata.labels, desired.metadata.labels);
        assert_eq!(repaired.type_.as_deref(), Some("kubernetes.io/tls"));

        let verbs: Vec<_> = store.writes().iter().map(|c| c.verb).collect();
        assert_eq!(verbs, vec![Verb::Update]);
        assert!(matches!(converge(&store, desired).await.expect("no-op"), Converged::Unchanged(_)));
    }

    #[tokio::test]
    async fn test_converge_refuses_foreign_object() {
        let store = FakeStore::default();
        store.seed(owned_secret("someone-else", "a"));

        let result = converge(&store, owned_secret("uid-1", "b")).await;
        assert_eq!(
            result,
            Err(ControllerError::NotOwned {
                kind: ChildKind::Secret,
                name: "replica".to_owned()
            })
        );
        assert!(store.writes().is_empty());
    }
}
