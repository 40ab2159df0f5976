// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Resolution of a route's traffic targets to concrete revisions.

use std::collections::BTreeMap;

use kube::ResourceExt;
use thiserror::Error;
use tracing::info;

use crate::crds::{
    serving::{RouteStatus, TrafficTarget},
    Configuration, Revision, Route,
};

/// Name of the target that receives the route's main traffic split.
pub const DEFAULT_TARGET: &str = "";

/// A traffic target that cannot be routed yet. Reported through the route status, never as a
/// reconcile failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error("Configuration {0:?} referenced in traffic not found")]
    ConfigurationMissing(String),
    #[error("Configuration {0:?} is waiting for a Revision to become ready")]
    ConfigurationNotReady(String),
    #[error("Configuration {0:?} does not have any ready Revision")]
    ConfigurationFailed(String),
    #[error("Revision {0:?} referenced in traffic not found")]
    RevisionMissing(String),
    #[error("Revision {0:?} is not yet ready")]
    RevisionNotReady(String),
    #[error("Revision {0:?} failed to become ready")]
    RevisionFailed(String),
    #[error("Traffic targets sum to {0}, not 100")]
    InvalidTraffic(i64),
}

impl TargetError {
    /// True when the target will not become routable without a user change.
    pub fn is_failed(&self) -> bool {
        !matches!(self, TargetError::ConfigurationNotReady(_) | TargetError::RevisionNotReady(_))
    }

    fn is_missing(&self) -> bool {
        matches!(self, TargetError::ConfigurationMissing(_) | TargetError::RevisionMissing(_))
    }

    pub fn mark_bad_traffic_target(&self, status: &mut RouteStatus) {
        match self {
            TargetError::ConfigurationMissing(name) => status.mark_missing_traffic_target("Configuration", name),
            TargetError::RevisionMissing(name) => status.mark_missing_traffic_target("Revision", name),
            TargetError::ConfigurationNotReady(name) => status.mark_configuration_not_ready(name),
            TargetError::ConfigurationFailed(name) => status.mark_configuration_failed(name),
            TargetError::RevisionNotReady(name) => status.mark_revision_not_ready(name),
            TargetError::RevisionFailed(name) => status.mark_revision_failed(name),
            TargetError::InvalidTraffic(_) => status.mark_invalid_traffic(&self.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionTarget {
    pub name: Option<String>,
    pub configuration_name: Option<String>,
    pub revision_name: String,
    pub percent: i64,
    pub active: bool,
}

impl From<&RevisionTarget> for TrafficTarget {
    fn from(target: &RevisionTarget) -> Self {
        TrafficTarget {
            name: target.name.clone(),
            configuration_name: target.configuration_name.clone(),
            revision_name: Some(target.revision_name.clone()),
            percent: Some(target.percent),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrafficConfig {
    /// Resolved targets keyed by target name; [`DEFAULT_TARGET`] holds the main split.
    pub targets: BTreeMap<String, Vec<RevisionTarget>>,
    /// Consolidated main split in the order targets first appear in the route.
    pub revision_targets: Vec<RevisionTarget>,
}

impl TrafficConfig {
    pub fn status_traffic(&self) -> Vec<TrafficTarget> {
        self.revision_targets.iter().map(TrafficTarget::from).collect()
    }

    /// Names of the tagged targets, without the default one.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str).filter(|name| *name != DEFAULT_TARGET)
    }
}

/// Names the route refers to, used to fetch the objects and to register for their changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficReferences {
    pub configurations: Vec<String>,
    pub revisions: Vec<String>,
}

impl TrafficReferences {
    pub fn of(route: &Route) -> Self {
        let mut references = Self::default();
        for target in &route.spec.traffic {
            if let Some(revision) = non_empty(target.revision_name.as_ref()) {
                references.revisions.push(revision.to_owned());
            } else if let Some(configuration) = non_empty(target.configuration_name.as_ref()) {
                references.configurations.push(configuration.to_owned());
            }
        }
        references.configurations.sort();
        references.configurations.dedup();
        references.revisions.sort();
        references.revisions.dedup();
        references
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// Resolves every target of `route` against the given objects.
///
/// A target that is not ready fails immediately. Missing targets are collected and the first one is
/// reported once all targets were checked. Targets naming the same revision under the same name are
/// merged by summing their percent.
pub fn build_traffic_config(
    route: &Route,
    configurations: &BTreeMap<String, Configuration>,
    revisions: &BTreeMap<String, Revision>,
) -> Result<TrafficConfig, TargetError> {
    let mut resolved = vec![];
    let mut missing = None;

    for target in &route.spec.traffic {
        match resolve_target(target, configurations, revisions) {
            Ok(Some(revision_target)) => resolved.push(revision_target),
            Ok(None) => {},
            Err(e) if e.is_missing() => {
                missing.get_or_insert(e);
            },
            Err(e) => return Err(e),
        }
    }
    if let Some(e) = missing {
        return Err(e);
    }

    let total: i64 = resolved.iter().map(|t| t.percent).sum();
    if total != 100 {
        return Err(TargetError::InvalidTraffic(total));
    }

    let revision_targets = consolidate(resolved);
    let mut targets: BTreeMap<String, Vec<RevisionTarget>> = BTreeMap::new();
    targets.insert(DEFAULT_TARGET.to_owned(), revision_targets.clone());
    for target in &revision_targets {
        if let Some(name) = &target.name {
            targets.entry(name.clone()).or_default().push(target.clone());
        }
    }
    for (name, named) in &mut targets {
        if name != DEFAULT_TARGET {
            if let [single] = named.as_mut_slice() {
                single.percent = 100;
            }
        }
    }

    for target in revision_targets.iter().filter(|t| !t.active) {
        info!("Revision {}/{} is inactive", route.namespace().unwrap_or_default(), target.revision_name);
    }

    Ok(TrafficConfig { targets, revision_targets })
}

fn resolve_target(
    target: &TrafficTarget,
    configurations: &BTreeMap<String, Configuration>,
    revisions: &BTreeMap<String, Revision>,
) -> Result<Option<RevisionTarget>, TargetError> {
    let percent = target.percent.unwrap_or_default();
    let name = target.name.clone().filter(|n| !n.is_empty());

    if let Some(revision_name) = non_empty(target.revision_name.as_ref()) {
        let revision = ready_revision(revision_name, revisions)?;
        return Ok(Some(RevisionTarget {
            name,
            configuration_name: None,
            revision_name: revision_name.to_owned(),
            percent,
            active: is_active(revision),
        }));
    }

    let Some(configuration_name) = non_empty(target.configuration_name.as_ref()) else {
        return Ok(None);
    };
    let Some(configuration) = configurations.get(configuration_name) else {
        return Err(TargetError::ConfigurationMissing(configuration_name.to_owned()));
    };
    let status = configuration.status.clone().unwrap_or_default();
    let Some(revision_name) = status.latest_ready_revision() else {
        return Err(if status.is_failed() {
            TargetError::ConfigurationFailed(configuration_name.to_owned())
        } else {
            TargetError::ConfigurationNotReady(configuration_name.to_owned())
        });
    };
    let revision = ready_revision(revision_name, revisions)?;
    Ok(Some(RevisionTarget {
        name,
        configuration_name: Some(configuration_name.to_owned()),
        revision_name: revision_name.to_owned(),
        percent,
        active: is_active(revision),
    }))
}

fn ready_revision<'a>(name: &str, revisions: &'a BTreeMap<String, Revision>) -> Result<&'a Revision, TargetError> {
    let Some(revision) = revisions.get(name) else {
        return Err(TargetError::RevisionMissing(name.to_owned()));
    };
    let status = revision.status.as_ref();
    if status.is_some_and(|s| s.is_ready()) {
        Ok(revision)
    } else if status.is_some_and(|s| s.is_failed()) {
        Err(TargetError::RevisionFailed(name.to_owned()))
    } else {
        Err(TargetError::RevisionNotReady(name.to_owned()))
    }
}

fn is_active(revision: &Revision) -> bool {
    !revision.status.as_ref().is_some_and(|s| s.is_activation_required())
}

fn consolidate(targets: Vec<RevisionTarget>) -> Vec<RevisionTarget> {
    let mut consolidated: Vec<RevisionTarget> = vec![];
    for target in targets {
        if let Some(existing) = consolidated.iter_mut().find(|t| t.name == target.name && t.revision_name == target.revision_name) {
            existing.percent += target.percent;
        } else {
            consolidated.push(target);
        }
    }
    consolidated
}
