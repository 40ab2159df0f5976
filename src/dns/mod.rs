// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! DNS record submission against a zone based provider.
//!
//! [`DnsRecords`] turns endpoints into record sets, splits a change per managed zone by longest suffix
//! match and hands each non-empty per-zone change to a [`DnsProvider`].

use std::{collections::BTreeMap, net::IpAddr};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

pub const DEFAULT_TTL: i64 = 300;
pub const RECORD_TYPE_CNAME: &str = "CNAME";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DnsError {
    #[error("unable to list managed zones: {0}")]
    Zones(String),
    #[error("change for zone {zone} rejected: {message}")]
    Rejected { zone: String, message: String },
}

/// A host name pointing at one or more targets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub dns_name: String,
    pub targets: Vec<String>,
    pub record_type: String,
    /// Zero or negative means unset.
    pub ttl: i64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub rrdatas: Vec<String>,
    pub ttl: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Change {
    pub additions: Vec<RecordSet>,
    pub deletions: Vec<RecordSet>,
}

impl Change {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedZone {
    pub name: String,
    /// Fully qualified, with the trailing dot.
    pub dns_name: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn zones(&self) -> Result<Vec<ManagedZone>, DnsError>;

    async fn apply(&self, zone: &str, change: Change) -> Result<(), DnsError>;
}

pub struct DnsRecords<P> {
    provider: P,
}

impl<P: DnsProvider> DnsRecords<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub async fn create_records(&self, endpoints: &[Endpoint]) -> Result<(), DnsError> {
        let change = Change {
            additions: endpoints.iter().map(new_record).collect(),
            deletions: vec![],
        };
        self.submit_change(change).await
    }

    pub async fn delete_records(&self, endpoints: &[Endpoint]) -> Result<(), DnsError> {
        let change = Change {
            additions: vec![],
            deletions: endpoints.iter().map(new_record).collect(),
        };
        self.submit_change(change).await
    }

    pub async fn submit_change(&self, change: Change) -> Result<(), DnsError> {
        if change.is_empty() {
            info!("All records are already up to date");
            return Ok(());
        }

        let zones = self.provider.zones().await?;
        if zones.is_empty() {
            warn!("No managed zones found");
        }
        for (zone, change) in separate_change(&zones, change) {
            for record in &change.deletions {
                info!("Deleting record {} {} {:?} {}", record.name, record.record_type, record.rrdatas, record.ttl);
            }
            for record in &change.additions {
                info!("Adding record {} {} {:?} {}", record.name, record.record_type, record.rrdatas, record.ttl);
            }
            self.provider.apply(&zone, change).await?;
        }
        Ok(())
    }
}

/// Record set for an endpoint: trailing dot on the name and on CNAME targets, default TTL when unset.
pub fn new_record(endpoint: &Endpoint) -> RecordSet {
    let rrdatas = if endpoint.record_type == RECORD_TYPE_CNAME {
        endpoint.targets.iter().map(|t| ensure_trailing_dot(t)).collect()
    } else {
        endpoint.targets.clone()
    };
    RecordSet {
        name: ensure_trailing_dot(&endpoint.dns_name),
        record_type: endpoint.record_type.clone(),
        rrdatas,
        ttl: if endpoint.ttl > 0 { endpoint.ttl } else { DEFAULT_TTL },
    }
}

/// IP addresses are returned unchanged.
pub fn ensure_trailing_dot(hostname: &str) -> String {
    if hostname.parse::<IpAddr>().is_ok() {
        return hostname.to_owned();
    }
    format!("{}.", hostname.trim_end_matches('.'))
}

/// The zone with the longest DNS name equal to, or a parent of, `hostname`.
pub fn find_zone<'a>(zones: &'a [ManagedZone], hostname: &str) -> Option<&'a ManagedZone> {
    zones
        .iter()
        .filter(|zone| hostname == zone.dns_name || hostname.ends_with(&format!(".{}", zone.dns_name)))
        .max_by_key(|zone| zone.dns_name.len())
}

/// Splits a change into one change per zone. Records without a zone are dropped, as are empty changes.
pub fn separate_change(zones: &[ManagedZone], change: Change) -> BTreeMap<String, Change> {
    let mut changes: BTreeMap<String, Change> = BTreeMap::new();

    for record in change.additions {
        match find_zone(zones, &ensure_trailing_dot(&record.name)) {
            Some(zone) => changes.entry(zone.name.clone()).or_default().additions.push(record),
            None => warn!("No matching zone for record addition {} {}", record.name, record.record_type),
        }
    }
    for record in change.deletions {
        match find_zone(zones, &ensure_trailing_dot(&record.name)) {
            Some(zone) => changes.entry(zone.name.clone()).or_default().deletions.push(record),
            None => warn!("No matching zone for record deletion {} {}", record.name, record.record_type),
        }
    }

    changes.retain(|zone, change| {
        let keep = !change.is_empty();
        if !keep {
            debug!("Dropping empty change for zone {zone}");
        }
        keep
    });
    changes
}
