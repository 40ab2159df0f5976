// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use kube::{Resource, ResourceExt};
use tracing::info;

use crate::{
    common::{KeyOf, ResourceKey, INGRESS_LABEL_KEY, ORIGIN_SECRET_NAMESPACE_LABEL_KEY, ORIGIN_SECRET_NAME_LABEL_KEY},
    controllers::{converge, Result},
    crds::{networking::ClusterIngressTls, ClusterIngress},
    store::{label_selector, ObjectStore, StoreError},
    tracker::Tracker,
};

/// Name of the copy of `{origin_namespace}/{origin_name}` made for an ingress.
pub fn target_secret_name(ingress_name: &str, origin_namespace: &str, origin_name: &str) -> String {
    format!("{ingress_name}-{origin_namespace}-{origin_name}")
}

/// Copy of `origin` in `namespace`, controlled by the ingress and labeled with its origin.
pub fn make_target_secret(ingress: &ClusterIngress, origin: &Secret, namespace: &str) -> Secret {
    let ingress_name = ingress.name_any();
    let origin_namespace = origin.namespace().unwrap_or_default();
    let origin_name = origin.name_any();

    Secret {
        metadata: ObjectMeta {
            name: Some(target_secret_name(&ingress_name, &origin_namespace, &origin_name)),
            namespace: Some(namespace.to_owned()),
            labels: Some(BTreeMap::from([
                (INGRESS_LABEL_KEY.to_owned(), ingress_name),
                (ORIGIN_SECRET_NAME_LABEL_KEY.to_owned(), origin_name),
                (ORIGIN_SECRET_NAMESPACE_LABEL_KEY.to_owned(), origin_namespace),
            ])),
            owner_references: ingress.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: origin.data.clone(),
        type_: origin.type_.clone(),
        ..Default::default()
    }
}

fn origin_key(tls: &ClusterIngressTls) -> ResourceKey {
    ResourceKey::new::<Secret>(&tls.secret_namespace, &tls.secret_name)
}

fn origin_key_of_replica(replica: &Secret) -> Option<ResourceKey> {
    let labels = replica.labels();
    Some(ResourceKey::new::<Secret>(labels.get(ORIGIN_SECRET_NAMESPACE_LABEL_KEY)?, labels.get(ORIGIN_SECRET_NAME_LABEL_KEY)?))
}

/// Copies every origin secret referenced by the ingress TLS entries into each gateway namespace and
/// removes the copies that are no longer referenced.
///
/// Origin secrets are tracked without a lease; [`delete_secrets`] drops the registrations.
pub async fn reconcile_secrets<S: ObjectStore>(store: &S, tracker: &Tracker, ingress: &ClusterIngress, gateway_namespaces: &[String]) -> Result<()> {
    let owner = ingress.resource_key();
    let mut origins = Vec::with_capacity(ingress.spec.tls.len());
    for tls in &ingress.spec.tls {
        let key = origin_key(tls);
        tracker.track_forever(key.clone(), &owner)?;
        let Some(origin) = store.get::<Secret>(Some(&tls.secret_namespace), &tls.secret_name).await? else {
            return Err(StoreError::NotFound(format!("Secret {key}")).into());
        };
        origins.push(origin);
    }

    for namespace in gateway_namespaces {
        let mut desired_names = BTreeSet::new();
        for origin in &origins {
            let desired = make_target_secret(ingress, origin, namespace);
            desired_names.insert(desired.name_any());
            converge(store, desired).await?;
        }
        cleanup_secrets(store, tracker, ingress, namespace, &desired_names).await?;
    }
    Ok(())
}

/// Untracks the origin secrets of the ingress and deletes all of its copies.
pub async fn delete_secrets<S: ObjectStore>(store: &S, tracker: &Tracker, ingress: &ClusterIngress, gateway_namespaces: &[String]) -> Result<()> {
    let owner = ingress.resource_key();
    for tls in &ingress.spec.tls {
        tracker.untrack(&origin_key(tls), &owner)?;
    }
    for namespace in gateway_namespaces {
        cleanup_secrets(store, tracker, ingress, namespace, &BTreeSet::new()).await?;
    }
    Ok(())
}

async fn cleanup_secrets<S: ObjectStore>(store: &S, tracker: &Tracker, ingress: &ClusterIngress, namespace: &str, keep: &BTreeSet<String>) -> Result<()> {
    let ingress_name = ingress.name_any();
    let owner = ingress.resource_key();
    let selector = label_selector(&[(INGRESS_LABEL_KEY, &ingress_name)]);

    for replica in store.list::<Secret>(Some(namespace), &selector).await? {
        let name = replica.name_any();
        if keep.contains(&name) {
            continue;
        }
        if let Some(origin) = origin_key_of_replica(&replica) {
            tracker.untrack(&origin, &owner)?;
        }
        store.delete::<Secret>(Some(namespace), &name).await?;
        info!("Deleted secret {namespace}/{name} no longer used by {ingress_name}");
    }
    Ok(())
}
