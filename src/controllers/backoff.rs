// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::{collections::HashMap, sync::Mutex, time::Duration};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::common::ResourceKey;

/// Doubling retry delay capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min: Duration,
    current: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, current: min, max }
    }

    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        result
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}

/// Entries not failing again within this many maximum delays belong to keys that are gone.
const STALE_AFTER_MAX_DELAYS: u32 = 10;

/// Independent backoff state per work-queue key.
///
/// The kube runtime never reconciles a deleted object, so keys deleted while failing are pruned by age
/// on the next failure of any key.
pub struct BackoffStates {
    min: Duration,
    max: Duration,
    states: Mutex<HashMap<ResourceKey, (ExponentialBackoff, Instant)>>,
}

impl BackoffStates {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_error(&self, key: &ResourceKey) -> Duration {
        match self.states.lock() {
            Ok(mut states) => {
                let now = Instant::now();
                let stale_after = self.max.saturating_mul(STALE_AFTER_MAX_DELAYS);
                states.retain(|k, (_, last_failure)| {
                    let keep = k == key || now.duration_since(*last_failure) < stale_after;
                    if !keep {
                        debug!("Dropping backoff of {} {k}", k.kind);
                    }
                    keep
                });
                let (backoff, last_failure) = states.entry(key.clone()).or_insert_with(|| (ExponentialBackoff::new(self.min, self.max), now));
                *last_failure = now;
                backoff.next_backoff()
            },
            Err(e) => {
                warn!("Failed to lock backoff states: {e}, using the maximum backoff");
                self.max
            },
        }
    }

    /// Also called when the object behind `key` no longer exists.
    pub fn on_success(&self, key: &ResourceKey) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.states.lock().map(|states| states.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use k8s_openapi::api::core::v1::Secret;

    use super::{BackoffStates, ExponentialBackoff};
    use crate::common::ResourceKey;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        let delays: Vec<_> = (0..5).map(|_| backoff.next_backoff().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_per_key() {
        let states = BackoffStates::new(Duration::from_secs(1), Duration::from_secs(100));
        let a = ResourceKey::new::<Secret>("ns", "a");
        let b = ResourceKey::new::<Secret>("ns", "b");

        assert_eq!(states.on_error(&a), Duration::from_secs(1));
        assert_eq!(states.on_error(&a), Duration::from_secs(2));
        assert_eq!(states.on_error(&b), Duration::from_secs(1));

        states.on_success(&a);
        assert_eq!(states.on_error(&a), Duration::from_secs(1));
        assert_eq!(states.on_error(&b), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_keys_are_pruned() {
        let states = BackoffStates::new(Duration::from_secs(1), Duration::from_secs(100));
        let deleted = ResourceKey::new::<Secret>("ns", "deleted");
        let failing = ResourceKey::new::<Secret>("ns", "failing");

        states.on_error(&deleted);
        states.on_error(&failing);
        assert_eq!(states.tracked_keys(), 2);

        for _ in 0..11 {
            tokio::time::advance(Duration::from_secs(100)).await;
            states.on_error(&failing);
        }
        assert_eq!(states.tracked_keys(), 1);
        assert_eq!(states.on_error(&deleted), Duration::from_secs(1));
    }
}
