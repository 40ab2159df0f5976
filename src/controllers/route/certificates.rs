// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use super::traffic::TrafficConfig;
use crate::{
    common::ROUTES_ANNOTATION_KEY,
    controllers::Result,
    crds::{
        networking::{CertificateSpec, ClusterIngressTls},
        serving::CertificateReference,
        Certificate, Route,
    },
    store::ObjectStore,
};

/// `namespace/name` of a route, as recorded in a certificate's ownership annotation.
pub fn route_owner_id(route: &Route) -> String {
    format!("{}/{}", route.namespace().unwrap_or_default(), route.name_any())
}

/// Routes sharing the certificate, or `None` when the annotation is missing or malformed.
pub(crate) fn route_owners(certificate: &Certificate) -> Option<Vec<String>> {
    let raw = certificate.annotations().get(ROUTES_ANNOTATION_KEY)?;
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(owners) => Some(owners),
        Err(e) => {
            warn!("Certificate {} has an invalid {ROUTES_ANNOTATION_KEY} annotation {e}", certificate.name_any());
            None
        },
    }
}

pub(crate) fn set_route_owners(certificate: &mut Certificate, owners: Vec<String>) {
    let owners: BTreeSet<String> = owners.into_iter().collect();
    let annotation = serde_json::Value::from(owners.into_iter().collect::<Vec<_>>()).to_string();
    certificate.annotations_mut().insert(ROUTES_ANNOTATION_KEY.to_owned(), annotation);
}

/// Adds the owners of `desired` to `existing`, both the annotation entries and the owner references.
pub(crate) fn add_route_owners(existing: &mut Certificate, desired: &Certificate) {
    let owners = route_owners(existing).unwrap_or_default().into_iter().chain(route_owners(desired).unwrap_or_default()).collect();
    set_route_owners(existing, owners);

    let references = existing.metadata.owner_references.get_or_insert_with(Vec::new);
    for reference in desired.metadata.owner_references.iter().flatten() {
        if !references.iter().any(|r| r.uid == reference.uid) {
            references.push(reference.clone());
        }
    }
}

/// The route's main domain plus one host per named target, sorted and deduplicated.
pub fn dns_names(domain: &str, traffic: &TrafficConfig) -> Vec<String> {
    let names: BTreeSet<String> = std::iter::once(domain.to_owned()).chain(traffic.target_names().map(|name| format!("{name}.{domain}"))).collect();
    names.into_iter().collect()
}

/// `*.` followed by every label but the first. Single label names are returned unchanged.
pub fn wildcard(dns_name: &str) -> String {
    match dns_name.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => format!("*.{rest}"),
        _ => dns_name.to_owned(),
    }
}

fn wildcard_certificate_name(wildcard: &str) -> &str {
    wildcard.strip_prefix("*.").unwrap_or(wildcard)
}

/// `route-{uid}`, shared by the route's cluster ingress and its certificate in non-wildcard mode.
pub fn route_child_name(route: &Route) -> String {
    format!("route-{}", route.uid().unwrap_or_default())
}

/// Certificates the route needs for `dns_names`.
///
/// With wildcard certificates every name collapses to its wildcard and each distinct wildcard gets one
/// certificate named after the wildcard host. Otherwise a single certificate covers all names.
pub fn make_certificates(route: &Route, dns_names: &[String], wildcard_certificates: bool) -> Vec<Certificate> {
    if wildcard_certificates {
        let wildcards: BTreeSet<String> = dns_names.iter().map(|name| wildcard(name)).collect();
        wildcards.iter().map(|w| make_certificate(route, wildcard_certificate_name(w), vec![w.clone()])).collect()
    } else {
        vec![make_certificate(route, &route_child_name(route), dns_names.to_vec())]
    }
}

fn make_certificate(route: &Route, name: &str, dns_names: Vec<String>) -> Certificate {
    let mut certificate = Certificate {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: route.namespace(),
            annotations: Some(BTreeMap::new()),
            owner_references: route.owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: CertificateSpec {
            dns_names,
            secret_name: name.to_owned(),
        },
        status: None,
    };
    set_route_owners(&mut certificate, vec![route_owner_id(route)]);
    certificate
}

/// TLS entries for the certificates that are ready to serve.
pub fn make_ingress_tls(certificates: &[Certificate]) -> Vec<ClusterIngressTls> {
    certificates
        .iter()
        .filter(|c| c.status.as_ref().is_some_and(|s| s.is_ready()))
        .map(|c| ClusterIngressTls {
            hosts: c.spec.dns_names.clone(),
            secret_name: c.spec.secret_name.clone(),
            secret_namespace: c.namespace().unwrap_or_default(),
            server_certificate: None,
            private_key: None,
        })
        .collect()
}

/// References recorded in the route status for `certificates`, sorted.
pub fn certificate_references(certificates: &[Certificate]) -> Vec<CertificateReference> {
    let mut references: Vec<CertificateReference> = certificates
        .iter()
        .map(|c| CertificateReference {
            namespace: c.namespace().unwrap_or_default(),
            name: c.name_any(),
        })
        .collect();
    references.sort();
    references.dedup();
    references
}

/// Drops the route from the certificates recorded in `previous` that are no longer desired. Certificates
/// left without any route are deleted.
pub async fn cleanup_unused_certificates<S: ObjectStore>(store: &S, route: &Route, previous: &[CertificateReference], desired: &[Certificate]) -> Result<()> {
    let owner_id = route_owner_id(route);
    let desired = certificate_references(desired);

    for reference in previous.iter().filter(|r| !desired.contains(r)) {
        let CertificateReference { namespace, name } = reference;
        let Some(mut certificate) = store.get::<Certificate>(Some(namespace), name).await? else {
            debug!("Certificate {namespace}/{name} is already gone");
            continue;
        };
        let Some(owners) = route_owners(&certificate) else {
            continue;
        };
        if !owners.contains(&owner_id) {
            continue;
        }

        let remaining: Vec<String> = owners.into_iter().filter(|o| *o != owner_id).collect();
        if remaining.is_empty() {
            info!("Deleting certificate {namespace}/{name} no longer used by {owner_id}");
            store.delete::<Certificate>(Some(namespace), name).await?;
        } else {
            debug!("Removing {owner_id} from certificate {namespace}/{name}");
            set_route_owners(&mut certificate, remaining);
            if let (Some(references), Some(uid)) = (certificate.metadata.owner_references.as_mut(), route.uid()) {
                references.retain(|r: &OwnerReference| r.uid != uid);
            }
            store.update(&certificate).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use kube::ResourceExt;

    use super::{certificate_references, cleanup_unused_certificates, dns_names, make_certificates, make_ingress_tls, route_owners, set_route_owners, wildcard};
    use crate::{
        controllers::{
            route::traffic::{RevisionTarget, TrafficConfig, DEFAULT_TARGET},
            test_support::meta,
        },
        crds::{networking::CertificateStatus, serving::CertificateReference, Certificate, Route},
        store::fake::{FakeStore, Verb},
    };

    fn route(name: &str) -> Route {
        let mut route = Route::new(name, Default::default());
        route.metadata.namespace = Some("ns".to_owned());
        route.metadata.uid = Some(format!("{name}-uid"));
        route
    }

    fn traffic_with_names(names: &[&str]) -> TrafficConfig {
        let target = |name: Option<&str>| RevisionTarget {
            name: name.map(str::to_owned),
            configuration_name: None,
            revision_name: "rev".to_owned(),
            percent: 100,
            active: true,
        };
        let mut targets = BTreeMap::from([(DEFAULT_TARGET.to_owned(), vec![target(None)])]);
        for name in names {
            targets.insert((*name).to_owned(), vec![target(Some(name))]);
        }
        TrafficConfig { targets, revision_targets: vec![target(None)] }
    }

    #[test]
    fn test_wildcard_dedup() {
        let names = vec!["a.x.example.com".to_owned(), "b.x.example.com".to_owned(), "y.example.com".to_owned()];
        let certificates = make_certificates(&route("r"), &names, true);

        let dns: Vec<_> = certificates.iter().map(|c| c.spec.dns_names.clone()).collect();
        assert_eq!(dns, vec![vec!["*.example.com".to_owned()], vec!["*.x.example.com".to_owned()]]);
        let names: Vec<_> = certificates.iter().map(ResourceExt::name_any).collect();
        assert_eq!(names, vec!["example.com".to_owned(), "x.example.com".to_owned()]);
        assert_eq!(certificates[0].spec.secret_name, "example.com");
        assert_eq!(route_owners(&certificates[0]), Some(vec!["ns/r".to_owned()]));
    }

    #[test]
    fn test_single_certificate_without_wildcards() {
        let names = dns_names("r.ns.example.com", &traffic_with_names(&["canary"]));
        assert_eq!(names, vec!["canary.r.ns.example.com".to_owned(), "r.ns.example.com".to_owned()]);

        let certificates = make_certificates(&route("r"), &names, false);
        assert_eq!(certificates.len(), 1);
        assert_eq!(certificates[0].name_any(), "route-r-uid");
        assert_eq!(certificates[0].spec.dns_names, names);
    }

    #[test]
    fn test_wildcard_of_single_label() {
        assert_eq!(wildcard("localhost"), "localhost");
        assert_eq!(wildcard("r.ns.example.com"), "*.ns.example.com");
    }

    #[test]
    fn test_only_ready_certificates_produce_tls() {
        let mut certificates = make_certificates(&route("r"), &["r.ns.example.com".to_owned(), "t.r.ns.example.com".to_owned()], true);
        let mut status = CertificateStatus::default();
        status.mark_ready();
        certificates[0].status = Some(status);

        let tls = make_ingress_tls(&certificates);
        assert_eq!(tls.len(), 1);
        assert_eq!(tls[0].hosts, vec!["*.ns.example.com".to_owned()]);
        assert_eq!(tls[0].secret_namespace, "ns");
    }

    fn reference(name: &str) -> CertificateReference {
        CertificateReference {
            namespace: "ns".to_owned(),
            name: name.to_owned(),
        }
    }

    fn seed_certificate(store: &FakeStore, name: &str, owners: Option<Vec<String>>) {
        let mut certificate = Certificate::new(name, Default::default());
        certificate.metadata = meta(Some("ns"), name);
        if let Some(owners) = owners {
            set_route_owners(&mut certificate, owners);
        }
        store.seed(certificate);
    }

    #[tokio::test]
    async fn test_unused_certificates_are_released() {
        let store = FakeStore::default();
        seed_certificate(&store, "shared.example.com", Some(vec!["ns/r".to_owned(), "ns/other".to_owned()]));
        seed_certificate(&store, "mine.example.com", Some(vec!["ns/r".to_owned()]));
        seed_certificate(&store, "foreign.example.com", None);
        seed_certificate(&store, "unrecorded.example.com", Some(vec!["ns/r".to_owned()]));

        let previous = vec![reference("foreign.example.com"), reference("gone.example.com"), reference("mine.example.com"), reference("shared.example.com")];
        cleanup_unused_certificates(&store, &route("r"), &previous, &[]).await.expect("cleanup");

        let shared = store.object::<Certificate>(Some("ns"), "shared.example.com").expect("still shared");
        assert_eq!(route_owners(&shared), Some(vec!["ns/other".to_owned()]));
        assert!(store.object::<Certificate>(Some("ns"), "mine.example.com").is_none());
        assert!(store.object::<Certificate>(Some("ns"), "foreign.example.com").is_some());
        assert!(store.object::<Certificate>(Some("ns"), "unrecorded.example.com").is_some());
        assert_eq!(store.writes().iter().map(|c| c.verb).collect::<Vec<_>>(), vec![Verb::Delete, Verb::Update]);
    }

    #[tokio::test]
    async fn test_desired_certificates_are_kept() {
        let store = FakeStore::default();
        seed_certificate(&store, "ns.example.com", Some(vec!["ns/r".to_owned()]));
        let desired = make_certificates(&route("r"), &["r.ns.example.com".to_owned()], true);
        assert_eq!(certificate_references(&desired), vec![reference("ns.example.com")]);

        cleanup_unused_certificates(&store, &route("r"), &[reference("ns.example.com")], &desired).await.expect("cleanup");
        assert!(store.writes().is_empty());
    }
}
