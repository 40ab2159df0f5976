// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use super::ConfigError;

pub const ISTIO_CONFIG_NAME: &str = "config-istio";

const INGRESS_GATEWAY_KEY_PREFIX: &str = "gateway.";
const LOCAL_GATEWAY_KEY_PREFIX: &str = "local-gateway.";

pub const DEFAULT_INGRESS_GATEWAY_NAME: &str = "knative-ingress-gateway";
pub const DEFAULT_INGRESS_GATEWAY_SERVICE_URL: &str = "istio-ingressgateway.istio-system.svc.cluster.local";
pub const DEFAULT_LOCAL_GATEWAY_NAME: &str = "cluster-local-gateway";
pub const DEFAULT_LOCAL_GATEWAY_SERVICE_URL: &str = "cluster-local-gateway.istio-system.svc.cluster.local";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gateway {
    pub gateway_name: String,
    pub service_url: String,
}

impl Gateway {
    fn new(gateway_name: &str, service_url: &str) -> Self {
        Self {
            gateway_name: gateway_name.to_owned(),
            service_url: service_url.to_owned(),
        }
    }

    /// Namespace of the gateway service, the second label of its URL.
    pub fn service_namespace(&self) -> Option<&str> {
        self.service_url.split('.').nth(1).filter(|ns| !ns.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Istio {
    pub ingress_gateways: Vec<Gateway>,
    pub local_gateways: Vec<Gateway>,
}

impl Default for Istio {
    fn default() -> Self {
        Self {
            ingress_gateways: vec![Gateway::new(DEFAULT_INGRESS_GATEWAY_NAME, DEFAULT_INGRESS_GATEWAY_SERVICE_URL)],
            local_gateways: vec![Gateway::new(DEFAULT_LOCAL_GATEWAY_NAME, DEFAULT_LOCAL_GATEWAY_SERVICE_URL)],
        }
    }
}

impl Istio {
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let ingress_gateways = parse_gateways(data, INGRESS_GATEWAY_KEY_PREFIX)?;
        let local_gateways = parse_gateways(data, LOCAL_GATEWAY_KEY_PREFIX)?;
        let defaults = Self::default();
        Ok(Self {
            ingress_gateways: if ingress_gateways.is_empty() { defaults.ingress_gateways } else { ingress_gateways },
            local_gateways: if local_gateways.is_empty() { defaults.local_gateways } else { local_gateways },
        })
    }

    /// Deduplicated namespaces of the public ingress gateway services.
    pub fn ingress_gateway_namespaces(&self) -> Vec<String> {
        crate::common::dedup(self.ingress_gateways.iter().filter_map(Gateway::service_namespace).map(str::to_owned))
    }
}

fn parse_gateways(data: &BTreeMap<String, String>, prefix: &str) -> Result<Vec<Gateway>, ConfigError> {
    let mut gateways = vec![];
    for (key, url) in data {
        let Some(gateway_name) = key.strip_prefix(prefix) else {
            continue;
        };
        let url = url.trim();
        if gateway_name.is_empty() || url.split('.').filter(|label| !label.is_empty()).count() < 2 {
            return Err(ConfigError::InvalidGatewayUrl {
                gateway: key.clone(),
                url: url.to_owned(),
            });
        }
        gateways.push(Gateway::new(gateway_name, url));
    }
    gateways.sort_by(|a, b| a.gateway_name.cmp(&b.gateway_name));
    Ok(gateways)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Istio, DEFAULT_INGRESS_GATEWAY_NAME};

    #[test]
    fn test_gateways_are_parsed_and_sorted() {
        let data = BTreeMap::from([
            ("gateway.z-gateway".to_owned(), "z-svc.z-system.svc.cluster.local".to_owned()),
            ("gateway.a-gateway".to_owned(), "a-svc.a-system.svc.cluster.local".to_owned()),
            ("local-gateway.local".to_owned(), "local-svc.istio-system.svc.cluster.local".to_owned()),
            ("unrelated".to_owned(), "value".to_owned()),
        ]);
        let istio = Istio::from_config_map_data(&data).expect("valid istio config");
        let names: Vec<_> = istio.ingress_gateways.iter().map(|g| g.gateway_name.as_str()).collect();
        assert_eq!(names, vec!["a-gateway", "z-gateway"]);
        assert_eq!(istio.local_gateways[0].gateway_name, "local");
        assert_eq!(istio.ingress_gateway_namespaces(), vec!["a-system".to_owned(), "z-system".to_owned()]);
    }

    #[test]
    fn test_defaults_when_empty() {
        let istio = Istio::from_config_map_data(&BTreeMap::new()).expect("valid istio config");
        assert_eq!(istio.ingress_gateways[0].gateway_name, DEFAULT_INGRESS_GATEWAY_NAME);
        assert_eq!(istio.ingress_gateway_namespaces(), vec!["istio-system".to_owned()]);
    }

    #[test]
    fn test_invalid_url() {
        let data = BTreeMap::from([("gateway.broken".to_owned(), "nodots".to_owned())]);
        assert!(Istio::from_config_map_data(&data).is_err());
    }
}
