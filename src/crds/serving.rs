// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::conditions::{Condition, ConditionSet, ConditionStatus};

pub const ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED: &str = "AllTrafficAssigned";
pub const ROUTE_CONDITION_INGRESS_READY: &str = "IngressReady";
pub const ROUTE_CONDITION_CERTIFICATE_PROVISIONED: &str = "CertificateProvisioned";

pub const ROUTE_CONDITIONS: ConditionSet = ConditionSet::new(&[ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED, ROUTE_CONDITION_INGRESS_READY]);

pub const REVISION_CONDITION_ACTIVE: &str = "Active";

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "serving.knative.dev", version = "v1alpha1", kind = "Route", namespaced, status = "RouteStatus", shortname = "rt", derive = "PartialEq", derive = "Default")]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Addressable {
    pub hostname: String,
}

/// A certificate the route asked for; certificates live in the route namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct CertificateReference {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_internal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<CertificateReference>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Route {
    /// Objects written by older clients may omit percentages; a lone target takes the whole traffic.
    pub fn set_defaults(&mut self) {
        if let [target] = self.spec.traffic.as_mut_slice() {
            if target.percent.is_none() {
                target.percent = Some(100);
            }
        }
        for target in &mut self.spec.traffic {
            if target.name.as_deref() == Some("") {
                target.name = None;
            }
        }
    }
}

impl RouteStatus {
    pub fn initialize_conditions(&mut self) {
        ROUTE_CONDITIONS.initialize(&mut self.conditions);
    }

    pub fn is_ready(&self) -> bool {
        ROUTE_CONDITIONS.is_ready(&self.conditions)
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        ROUTE_CONDITIONS.get(&self.conditions, type_)
    }

    pub fn mark_traffic_assigned(&mut self) {
        ROUTE_CONDITIONS.mark_true(&mut self.conditions, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED);
    }

    pub fn mark_unknown_traffic_error(&mut self, message: &str) {
        ROUTE_CONDITIONS.mark_unknown(&mut self.conditions, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED, "Unknown", message);
    }

    pub fn mark_configuration_not_ready(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_unknown(
            &mut self.conditions,
            ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED,
            "RevisionMissing",
            &format!("Configuration {name:?} is waiting for a Revision to become ready."),
        );
    }

    pub fn mark_configuration_failed(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_false(
            &mut self.conditions,
            ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED,
            "RevisionMissing",
            &format!("Configuration {name:?} does not have any ready Revision."),
        );
    }

    pub fn mark_revision_not_ready(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_unknown(
            &mut self.conditions,
            ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED,
            "RevisionMissing",
            &format!("Revision {name:?} is not yet ready."),
        );
    }

    pub fn mark_revision_failed(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_false(
            &mut self.conditions,
            ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED,
            "RevisionMissing",
            &format!("Revision {name:?} failed to become ready."),
        );
    }

    pub fn mark_missing_traffic_target(&mut self, kind: &str, name: &str) {
        ROUTE_CONDITIONS.mark_false(
            &mut self.conditions,
            ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED,
            &format!("{kind}Missing"),
            &format!("{kind} {name:?} referenced in traffic not found."),
        );
    }

    pub fn mark_invalid_traffic(&mut self, message: &str) {
        ROUTE_CONDITIONS.mark_false(&mut self.conditions, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED, "InvalidTraffic", message);
    }

    pub fn mark_resource_not_owned(&mut self, kind: &str, name: &str) {
        ROUTE_CONDITIONS.mark_false(
            &mut self.conditions,
            ROUTE_CONDITION_INGRESS_READY,
            "NotOwned",
            &format!("There is an existing {kind} {name:?} that we do not own."),
        );
    }

    pub fn propagate_ingress_conditions(&mut self, ingress_conditions: &[Condition]) {
        let Some(ready) = ingress_conditions.iter().find(|c| c.type_ == super::conditions::READY) else {
            ROUTE_CONDITIONS.mark_unknown(&mut self.conditions, ROUTE_CONDITION_INGRESS_READY, "Uninitialized", "Waiting for load balancer to be ready");
            return;
        };
        let reason = ready.reason.clone().unwrap_or_default();
        let message = ready.message.clone().unwrap_or_default();
        match ready.status {
            ConditionStatus::True => ROUTE_CONDITIONS.mark_true(&mut self.conditions, ROUTE_CONDITION_INGRESS_READY),
            ConditionStatus::False => ROUTE_CONDITIONS.mark_false(&mut self.conditions, ROUTE_CONDITION_INGRESS_READY, &reason, &message),
            ConditionStatus::Unknown => ROUTE_CONDITIONS.mark_unknown(&mut self.conditions, ROUTE_CONDITION_INGRESS_READY, &reason, &message),
        }
    }

    pub fn mark_certificate_ready(&mut self) {
        ROUTE_CONDITIONS.mark_true(&mut self.conditions, ROUTE_CONDITION_CERTIFICATE_PROVISIONED);
    }

    pub fn mark_certificate_not_owned(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_false(
            &mut self.conditions,
            ROUTE_CONDITION_CERTIFICATE_PROVISIONED,
            "NotOwned",
            &format!("There is an existing certificate {name} that we don't own."),
        );
    }

    pub fn mark_certificate_not_ready(&mut self, name: &str) {
        ROUTE_CONDITIONS.mark_unknown(
            &mut self.conditions,
            ROUTE_CONDITION_CERTIFICATE_PROVISIONED,
            "CertificateNotReady",
            &format!("Certificate {name} is not ready."),
        );
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "serving.knative.dev",
    version = "v1alpha1",
    kind = "Configuration",
    namespaced,
    status = "ConfigurationStatus",
    shortname = "config",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_template: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_created_revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ConfigurationStatus {
    pub fn latest_ready_revision(&self) -> Option<&str> {
        self.latest_ready_revision_name.as_deref().filter(|name| !name.is_empty())
    }

    pub fn is_failed(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == super::conditions::READY && c.status == ConditionStatus::False)
    }
}

#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "serving.knative.dev", version = "v1alpha1", kind = "Revision", namespaced, status = "RevisionStatus", shortname = "rev", derive = "PartialEq", derive = "Default")]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl RevisionStatus {
    fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_ready(&self) -> bool {
        self.condition(super::conditions::READY).is_some_and(Condition::is_true)
    }

    pub fn is_failed(&self) -> bool {
        self.condition(super::conditions::READY).is_some_and(|c| c.status == ConditionStatus::False)
    }

    /// A revision scaled to zero still routes through the activator.
    pub fn is_activation_required(&self) -> bool {
        self.condition(REVISION_CONDITION_ACTIVE).is_some_and(|c| c.status != ConditionStatus::True)
    }
}
