// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionSet, ConditionStatus};

pub const INGRESS_CONDITION_NETWORK_CONFIGURED: &str = "NetworkConfigured";
pub const INGRESS_CONDITION_LOAD_BALANCER_READY: &str = "LoadBalancerReady";

pub const INGRESS_CONDITIONS: ConditionSet = ConditionSet::new(&[INGRESS_CONDITION_NETWORK_CONFIGURED, INGRESS_CONDITION_LOAD_BALANCER_READY]);
pub const CERTIFICATE_CONDITIONS: ConditionSet = ConditionSet::new(&[]);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum IngressVisibility {
    #[default]
    ExternalIP,
    ClusterLocal,
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.internal.knative.dev",
    version = "v1alpha1",
    kind = "ClusterIngress",
    status = "ClusterIngressStatus",
    shortname = "ci",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIngressSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<IngressVisibility>,
    #[serde(default)]
    pub rules: Vec<IngressRule>,
    #[serde(default)]
    pub tls: Vec<ClusterIngressTls>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub http: HttpIngressRuleValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressRuleValue {
    #[serde(default)]
    pub paths: Vec<HttpIngressPath>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    #[serde(default)]
    pub splits: Vec<IngressBackendSplit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackendSplit {
    pub service_namespace: String,
    pub service_name: String,
    pub service_port: i32,
    pub percent: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIngressTls {
    #[serde(default)]
    pub hosts: Vec<String>,
    pub secret_name: String,
    pub secret_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIngressStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    #[serde(default)]
    pub ingress: Vec<LoadBalancerIngressStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerIngressStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_internal: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mesh_only: bool,
}

impl ClusterIngress {
    pub fn is_public(&self) -> bool {
        self.spec.visibility.unwrap_or_default() == IngressVisibility::ExternalIP
    }

    pub fn set_defaults(&mut self) {
        if self.spec.visibility.is_none() {
            self.spec.visibility = Some(IngressVisibility::ExternalIP);
        }
        for tls in &mut self.spec.tls {
            if tls.server_certificate.is_none() {
                tls.server_certificate = Some("tls.crt".to_owned());
            }
            if tls.private_key.is_none() {
                tls.private_key = Some("tls.key".to_owned());
            }
        }
    }
}

impl ClusterIngressStatus {
    pub fn initialize_conditions(&mut self) {
        INGRESS_CONDITIONS.initialize(&mut self.conditions);
    }

    pub fn is_ready(&self) -> bool {
        INGRESS_CONDITIONS.is_ready(&self.conditions)
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        INGRESS_CONDITIONS.get(&self.conditions, type_)
    }

    pub fn mark_network_configured(&mut self) {
        INGRESS_CONDITIONS.mark_true(&mut self.conditions, INGRESS_CONDITION_NETWORK_CONFIGURED);
    }

    pub fn mark_resource_not_owned(&mut self, kind: &str, name: &str) {
        INGRESS_CONDITIONS.mark_false(
            &mut self.conditions,
            INGRESS_CONDITION_NETWORK_CONFIGURED,
            "NotOwned",
            &format!("There is an existing {kind} {name:?} that we do not own."),
        );
    }

    pub fn mark_load_balancer_ready(&mut self, ingress: Vec<LoadBalancerIngressStatus>) {
        self.load_balancer = Some(LoadBalancerStatus { ingress });
        INGRESS_CONDITIONS.mark_true(&mut self.conditions, INGRESS_CONDITION_LOAD_BALANCER_READY);
    }

    /// The cluster-local address of the first load balancer entry, if any.
    pub fn domain_internal(&self) -> Option<&str> {
        self.load_balancer.as_ref()?.ingress.iter().find_map(|i| i.domain_internal.as_deref())
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "networking.internal.knative.dev",
    version = "v1alpha1",
    kind = "Certificate",
    namespaced,
    status = "CertificateStatus",
    shortname = "kcert",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default, rename = "dnsNames")]
    pub dns_names: Vec<String>,
    pub secret_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<Time>,
    #[serde(default, rename = "supportedDNSNames", skip_serializing_if = "Vec::is_empty")]
    pub supported_dns_names: Vec<String>,
}

impl CertificateStatus {
    pub fn initialize_conditions(&mut self) {
        CERTIFICATE_CONDITIONS.initialize(&mut self.conditions);
    }

    pub fn is_ready(&self) -> bool {
        CERTIFICATE_CONDITIONS.is_ready(&self.conditions)
    }

    pub fn mark_ready(&mut self) {
        CERTIFICATE_CONDITIONS.mark_true(&mut self.conditions, CERTIFICATE_CONDITIONS.ready);
    }

    pub fn mark_resource_not_owned(&mut self, kind: &str, name: &str) {
        CERTIFICATE_CONDITIONS.mark_false(
            &mut self.conditions,
            CERTIFICATE_CONDITIONS.ready,
            "NotOwned",
            &format!("There is an existing {kind} {name:?} that we do not own."),
        );
    }

    pub fn mark_not_ready(&mut self, status: ConditionStatus, reason: &str, message: &str) {
        if status == ConditionStatus::False {
            CERTIFICATE_CONDITIONS.mark_false(&mut self.conditions, CERTIFICATE_CONDITIONS.ready, reason, message);
        } else {
            CERTIFICATE_CONDITIONS.mark_unknown(&mut self.conditions, CERTIFICATE_CONDITIONS.ready, reason, message);
        }
    }
}
