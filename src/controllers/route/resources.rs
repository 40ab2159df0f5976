// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};
use kube::{Resource, ResourceExt};

use super::{
    certificates::route_child_name,
    traffic::{RevisionTarget, TrafficConfig, DEFAULT_TARGET},
};
use crate::{
    common::{service_hostname, ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY, VISIBILITY_CLUSTER_LOCAL, VISIBILITY_LABEL_KEY},
    crds::{
        networking::{ClusterIngressSpec, ClusterIngressTls, HttpIngressPath, HttpIngressRuleValue, IngressBackendSplit, IngressRule, IngressVisibility},
        ClusterIngress, Route,
    },
};

/// Port revisions serve plain HTTP on.
pub const REVISION_SERVICE_PORT: i32 = 80;
pub const DEFAULT_ROUTE_TIMEOUT: &str = "600s";

pub fn is_cluster_local(route: &Route) -> bool {
    route.labels().get(VISIBILITY_LABEL_KEY).map(String::as_str) == Some(VISIBILITY_CLUSTER_LOCAL)
}

pub fn route_domain(route: &Route, domain_suffix: &str) -> String {
    format!("{}.{}.{domain_suffix}", route.name_any(), route.namespace().unwrap_or_default())
}

/// Cluster-local address of the placeholder service.
pub fn route_domain_internal(route: &Route) -> String {
    service_hostname(&route.name_any(), &route.namespace().unwrap_or_default())
}

/// Cluster ingress carrying one rule per target name, sorted by name.
pub fn make_cluster_ingress(route: &Route, domain: &str, traffic: &TrafficConfig, tls: Vec<ClusterIngressTls>) -> ClusterIngress {
    let namespace = route.namespace().unwrap_or_default();
    let rules = traffic
        .targets
        .iter()
        .map(|(name, targets)| {
            let hosts = if name == DEFAULT_TARGET {
                crate::common::dedup([domain.to_owned(), route_domain_internal(route)])
            } else {
                vec![format!("{name}.{domain}")]
            };
            make_ingress_rule(hosts, &namespace, targets)
        })
        .collect();

    ClusterIngress {
        metadata: ObjectMeta {
            name: Some(route_child_name(route)),
            labels: Some(BTreeMap::from([
                (ROUTE_LABEL_KEY.to_owned(), route.name_any()),
                (ROUTE_NAMESPACE_LABEL_KEY.to_owned(), namespace.clone()),
            ])),
            ..Default::default()
        },
        spec: ClusterIngressSpec {
            visibility: Some(if is_cluster_local(route) { IngressVisibility::ClusterLocal } else { IngressVisibility::ExternalIP }),
            rules,
            tls,
        },
        status: None,
    }
}

fn make_ingress_rule(hosts: Vec<String>, namespace: &str, targets: &[RevisionTarget]) -> IngressRule {
    let splits = targets
        .iter()
        .filter(|t| t.percent > 0)
        .map(|t| IngressBackendSplit {
            service_namespace: namespace.to_owned(),
            service_name: t.revision_name.clone(),
            service_port: REVISION_SERVICE_PORT,
            percent: t.percent,
        })
        .collect();
    IngressRule {
        hosts,
        http: HttpIngressRuleValue {
            paths: vec![HttpIngressPath {
                splits,
                timeout: Some(DEFAULT_ROUTE_TIMEOUT.to_owned()),
            }],
        },
    }
}

/// ExternalName service named like the route, pointing at the ingress load balancer.
pub fn make_placeholder_service(route: &Route, load_balancer_domain: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(route.name_any()),
            namespace: route.namespace(),
            labels: Some(BTreeMap::from([(ROUTE_LABEL_KEY.to_owned(), route.name_any())])),
            owner_references: route.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ExternalName".to_owned()),
            external_name: Some(load_balancer_domain.to_owned()),
            session_affinity: Some("None".to_owned()),
            ports: Some(vec![ServicePort {
                name: Some("http".to_owned()),
                protocol: Some("TCP".to_owned()),
                port: REVISION_SERVICE_PORT,
                target_port: Some(IntOrString::Int(REVISION_SERVICE_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}
