// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::{
    common::{dedup, service_hostname, INGRESS_LABEL_KEY, ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY},
    config::Istio,
    crds::{
        istio::{Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination, PortSelector, StringMatch, VirtualServiceSpec},
        networking::IngressRule,
        ClusterIngress, VirtualService,
    },
};

/// Names of the gateways serving the ingress: public gateways for external visibility, local ones
/// otherwise.
pub fn gateway_names(ingress: &ClusterIngress, istio: &Istio) -> Vec<String> {
    let gateways = if ingress.is_public() { &istio.ingress_gateways } else { &istio.local_gateways };
    dedup(gateways.iter().map(|g| g.gateway_name.clone()))
}

/// Address reported as the ingress load balancer, the first matching gateway service.
pub fn gateway_service_url<'a>(ingress: &ClusterIngress, istio: &'a Istio) -> Option<&'a str> {
    let gateways = if ingress.is_public() { &istio.ingress_gateways } else { &istio.local_gateways };
    gateways.first().map(|g| g.service_url.as_str())
}

/// The route namespace when the ingress belongs to a route, the system namespace otherwise.
pub fn virtual_service_namespace(ingress: &ClusterIngress, system_namespace: &str) -> String {
    ingress.labels().get(ROUTE_NAMESPACE_LABEL_KEY).cloned().unwrap_or_else(|| system_namespace.to_owned())
}

pub fn make_virtual_service(ingress: &ClusterIngress, gateway_names: &[String], system_namespace: &str) -> VirtualService {
    let name = ingress.name_any();
    let gateways: Vec<String> = gateway_names.iter().map(|g| format!("{system_namespace}/{g}")).collect();

    let mut labels = BTreeMap::from([(INGRESS_LABEL_KEY.to_owned(), name.clone())]);
    for key in [ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY] {
        if let Some(value) = ingress.labels().get(key) {
            labels.insert(key.to_owned(), value.clone());
        }
    }

    VirtualService {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(virtual_service_namespace(ingress, system_namespace)),
            labels: Some(labels),
            owner_references: ingress.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: VirtualServiceSpec {
            hosts: dedup(ingress.spec.rules.iter().flat_map(|rule| rule.hosts.iter().cloned())),
            gateways: gateways.clone(),
            http: ingress.spec.rules.iter().map(|rule| make_http_route(rule, &gateways)).collect(),
        },
    }
}

fn make_http_route(rule: &IngressRule, gateways: &[String]) -> HttpRoute {
    let match_ = rule
        .hosts
        .iter()
        .map(|host| HttpMatchRequest {
            authority: Some(StringMatch {
                exact: Some(host.clone()),
                prefix: None,
            }),
            gateways: gateways.to_vec(),
        })
        .collect();

    let path = rule.http.paths.first();
    let route = path
        .map(|path| {
            path.splits
                .iter()
                .map(|split| HttpRouteDestination {
                    destination: Destination {
                        host: service_hostname(&split.service_name, &split.service_namespace),
                        port: u32::try_from(split.service_port).ok().map(|number| PortSelector { number }),
                    },
                    weight: split.percent,
                })
                .collect()
        })
        .unwrap_or_default();

    HttpRoute {
        match_,
        route,
        timeout: path.and_then(|p| p.timeout.clone()),
    }
}
