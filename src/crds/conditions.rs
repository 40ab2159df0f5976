// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY: &str = "Ready";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// A ready condition plus the dependent conditions it summarizes.
///
/// The ready condition is True only once every dependent is True, False as soon as any dependent is
/// False, and Unknown otherwise.
#[derive(Clone, Copy, Debug)]
pub struct ConditionSet {
    pub ready: &'static str,
    pub dependents: &'static [&'static str],
}

impl ConditionSet {
    pub const fn new(dependents: &'static [&'static str]) -> Self {
        Self { ready: READY, dependents }
    }

    pub fn get<'a>(&self, conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
        conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_ready(&self, conditions: &[Condition]) -> bool {
        self.get(conditions, self.ready).is_some_and(Condition::is_true)
    }

    /// Adds the ready condition and every dependent as Unknown when they are missing.
    pub fn initialize(&self, conditions: &mut Vec<Condition>) {
        for type_ in std::iter::once(&self.ready).chain(self.dependents.iter()) {
            if self.get(conditions, type_).is_none() {
                set(conditions, Condition { type_: (*type_).to_owned(), ..Default::default() });
            }
        }
    }

    pub fn mark_true(&self, conditions: &mut Vec<Condition>, type_: &str) {
        set(
            conditions,
            Condition {
                type_: type_.to_owned(),
                status: ConditionStatus::True,
                ..Default::default()
            },
        );

        let all_true = self.dependents.iter().all(|d| self.get(conditions, d).is_some_and(Condition::is_true));
        if all_true {
            set(
                conditions,
                Condition {
                    type_: self.ready.to_owned(),
                    status: ConditionStatus::True,
                    ..Default::default()
                },
            );
        }
    }

    pub fn mark_unknown(&self, conditions: &mut Vec<Condition>, type_: &str, reason: &str, message: &str) {
        set(conditions, Self::condition(type_, ConditionStatus::Unknown, reason, message));
        if type_ == self.ready {
            return;
        }

        let other_failed =
            self.dependents.iter().any(|d| *d != type_ && self.get(conditions, d).is_some_and(|c| c.status == ConditionStatus::False));
        if !other_failed && self.dependents.contains(&type_) {
            set(conditions, Self::condition(self.ready, ConditionStatus::Unknown, reason, message));
        }
    }

    pub fn mark_false(&self, conditions: &mut Vec<Condition>, type_: &str, reason: &str, message: &str) {
        set(conditions, Self::condition(type_, ConditionStatus::False, reason, message));
        if type_ != self.ready && self.dependents.contains(&type_) {
            set(conditions, Self::condition(self.ready, ConditionStatus::False, reason, message));
        }
    }

    fn condition(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> Condition {
        Condition {
            type_: type_.to_owned(),
            status,
            reason: Some(reason.to_owned()),
            message: Some(message.to_owned()),
            last_transition_time: None,
        }
    }
}

/// Replaces the condition of the same type. The transition time only moves when the status flips,
/// so re-applying an identical condition leaves the list deep-equal.
fn set(conditions: &mut Vec<Condition>, mut condition: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        if existing.status == condition.status && existing.reason == condition.reason && existing.message == condition.message {
            return;
        }
        condition.last_transition_time = if existing.status == condition.status {
            existing.last_transition_time.clone()
        } else {
            Some(Time(Utc::now()))
        };
        *existing = condition;
    } else {
        condition.last_transition_time = Some(Time(Utc::now()));
        conditions.push(condition);
        conditions.sort_by(|a, b| a.type_.cmp(&b.type_));
    }
}

#[cfg(test)]
mod tests {
    use super::{ConditionSet, ConditionStatus};

    const SET: ConditionSet = ConditionSet::new(&["A", "B"]);

    #[test]
    fn test_ready_follows_dependents() {
        let mut conditions = vec![];
        SET.initialize(&mut conditions);
        assert_eq!(conditions.len(), 3);
        assert!(conditions.iter().all(|c| c.status == ConditionStatus::Unknown));

        SET.mark_true(&mut conditions, "A");
        assert!(!SET.is_ready(&conditions));
        SET.mark_true(&mut conditions, "B");
        assert!(SET.is_ready(&conditions));

        SET.mark_false(&mut conditions, "B", "Broken", "b is broken");
        let ready = SET.get(&conditions, "Ready").expect("ready condition");
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason.as_deref(), Some("Broken"));
    }

    #[test]
    fn test_unknown_does_not_hide_failure() {
        let mut conditions = vec![];
        SET.initialize(&mut conditions);
        SET.mark_false(&mut conditions, "A", "Broken", "a is broken");
        SET.mark_unknown(&mut conditions, "B", "Waiting", "b is waiting");
        let ready = SET.get(&conditions, "Ready").expect("ready condition");
        assert_eq!(ready.status, ConditionStatus::False);
    }

    #[test]
    fn test_same_condition_is_stable() {
        let mut conditions = vec![];
        SET.initialize(&mut conditions);
        SET.mark_true(&mut conditions, "A");
        let before = conditions.clone();
        SET.mark_true(&mut conditions, "A");
        assert_eq!(before, conditions);
    }
}
