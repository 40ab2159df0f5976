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

pub const TLS_CONFIG_NAME: &str = "config-tls";

const TLS_MODE_KEY: &str = "tls-mode";
const WILDCARD_CERT_KEY: &str = "wildcard-cert";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsMode {
    Auto,
    #[default]
    Manual,
}

impl TryFrom<&str> for TlsMode {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "AUTO" => Ok(TlsMode::Auto),
            "MANUAL" => Ok(TlsMode::Manual),
            _ => Err(ConfigError::UnknownTlsMode(value.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tls {
    pub mode: TlsMode,
    pub wildcard_certificates: bool,
}

impl Default for Tls {
    fn default() -> Self {
        Self {
            mode: TlsMode::Manual,
            wildcard_certificates: true,
        }
    }
}

impl Tls {
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mode = data.get(TLS_MODE_KEY).map(|raw| TlsMode::try_from(raw.as_str())).transpose()?.unwrap_or_default();
        let wildcard_certificates = match data.get(WILDCARD_CERT_KEY).map(String::as_str) {
            None | Some("true") => true,
            Some("false") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: WILDCARD_CERT_KEY.to_owned(),
                    value: other.to_owned(),
                })
            },
        };
        Ok(Self { mode, wildcard_certificates })
    }

    /// Certificates, secret propagation and gateway servers are only managed with automatic TLS.
    pub fn is_auto(&self) -> bool {
        self.mode == TlsMode::Auto
    }
}
