// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "knative-serving";
pub const DEFAULT_TRACKER_LEASE_SECONDS: u64 = 30 * 60;
pub const DEFAULT_LOG_FILE: &str = "kubvernor-networking.log";

fn default_system_namespace() -> String {
    DEFAULT_SYSTEM_NAMESPACE.to_owned()
}

/// Process configuration read from the file given on the command line.
#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    #[serde(default = "default_system_namespace")]
    #[builder(default = default_system_namespace())]
    pub system_namespace: String,
    #[serde(default)]
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
    #[serde(default)]
    #[builder(default)]
    pub tracker_lease_seconds: Option<u64>,
    #[serde(default)]
    #[builder(default)]
    pub log_file: Option<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("system namespace must be not empty")]
    SystemNamespace,
    #[error("tracker lease must be longer than zero seconds")]
    TrackerLease,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName);
        }
        if self.system_namespace.is_empty() {
            return Err(ConfigurationError::SystemNamespace);
        }
        if self.tracker_lease_seconds == Some(0) {
            return Err(ConfigurationError::TrackerLease);
        }
        Ok(())
    }

    pub fn tracker_lease(&self) -> Duration {
        Duration::from_secs(self.tracker_lease_seconds.unwrap_or(DEFAULT_TRACKER_LEASE_SECONDS))
    }

    pub fn log_file(&self) -> &str {
        self.log_file.as_deref().unwrap_or(DEFAULT_LOG_FILE)
    }
}
