// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Registry of "owner must be reconciled when this object changes" relations.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;
use tracing::debug;

use crate::common::ResourceKey;

#[derive(thiserror::Error, Debug, PartialEq, PartialOrd)]
pub enum TrackerError {
    LockingError,
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub type Enqueue = Arc<dyn Fn(ResourceKey) + Send + Sync>;

/// `None` never expires.
type Expiry = Option<Instant>;

pub struct Tracker {
    registrations: Mutex<HashMap<ResourceKey, HashMap<ResourceKey, Expiry>>>,
    enqueue: Enqueue,
    lease: Duration,
}

impl Tracker {
    pub fn new(enqueue: Enqueue, lease: Duration) -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
            enqueue,
            lease,
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Leased registration; the owner has to call again within the lease to keep it.
    pub fn track(&self, reference: ResourceKey, owner: &ResourceKey) -> Result<(), TrackerError> {
        self.track_for(reference, owner, self.lease)
    }

    pub fn track_for(&self, reference: ResourceKey, owner: &ResourceKey, lease: Duration) -> Result<(), TrackerError> {
        self.register(reference, owner, Some(Instant::now() + lease))
    }

    /// Registration that stays until [`Tracker::untrack`] is called.
    pub fn track_forever(&self, reference: ResourceKey, owner: &ResourceKey) -> Result<(), TrackerError> {
        self.register(reference, owner, None)
    }

    fn register(&self, reference: ResourceKey, owner: &ResourceKey, expiry: Expiry) -> Result<(), TrackerError> {
        let mut registrations = self.registrations.lock().map_err(|_| TrackerError::LockingError)?;
        debug!("Tracking {} {reference} for {} {owner}", reference.kind, owner.kind);
        registrations.entry(reference).or_default().insert(owner.clone(), expiry);
        Ok(())
    }

    pub fn untrack(&self, reference: &ResourceKey, owner: &ResourceKey) -> Result<(), TrackerError> {
        let mut registrations = self.registrations.lock().map_err(|_| TrackerError::LockingError)?;
        if let Some(owners) = registrations.get_mut(reference) {
            owners.remove(owner);
            if owners.is_empty() {
                registrations.remove(reference);
            }
        }
        Ok(())
    }

    /// Drops every registration made by a deleted owner.
    pub fn untrack_owner(&self, owner: &ResourceKey) -> Result<(), TrackerError> {
        let mut registrations = self.registrations.lock().map_err(|_| TrackerError::LockingError)?;
        registrations.retain(|_, owners| {
            owners.remove(owner);
            !owners.is_empty()
        });
        Ok(())
    }

    /// Enqueues every live owner of `reference`. Owners are collected under the lock and enqueued after
    /// it is released. Returns the number of owners enqueued.
    pub fn on_changed(&self, reference: &ResourceKey) -> Result<usize, TrackerError> {
        let owners = {
            let mut registrations = self.registrations.lock().map_err(|_| TrackerError::LockingError)?;
            let Some(owners) = registrations.get_mut(reference) else {
                return Ok(0);
            };
            let now = Instant::now();
            owners.retain(|_, expiry| expiry.is_none_or(|expiry| expiry > now));
            let live: Vec<ResourceKey> = owners.keys().cloned().collect();
            if owners.is_empty() {
                registrations.remove(reference);
            }
            live
        };

        for owner in &owners {
            debug!("{} {reference} changed, enqueueing {} {owner}", reference.kind, owner.kind);
            (self.enqueue)(owner.clone());
        }
        Ok(owners.len())
    }

    #[cfg(test)]
    pub(crate) fn owners_of(&self, reference: &ResourceKey) -> Vec<ResourceKey> {
        let registrations = self.registrations.lock().expect("tracker lock");
        let mut owners: Vec<_> = registrations.get(reference).map(|owners| owners.keys().cloned().collect()).unwrap_or_default();
        owners.sort();
        owners
    }
}
