// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Runtime configuration assembled from config maps in the system namespace.
//!
//! Every fragment is parsed independently. The aggregated [`Config`] is an immutable snapshot; a change
//! to any fragment builds a new snapshot and swaps it in, so reconciles that already hold an
//! `Arc<Config>` keep a consistent view.

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

mod cert_manager;
mod domain;
mod istio;
mod tls;

pub use cert_manager::{CertManager, CERT_MANAGER_CONFIG_NAME};
pub use domain::{Domain, LabelSelector, DEFAULT_DOMAIN, DOMAIN_CONFIG_NAME};
pub use istio::{Gateway, Istio, ISTIO_CONFIG_NAME};
pub use tls::{Tls, TlsMode, TLS_CONFIG_NAME};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid yaml for {key}: {message}")]
    InvalidYaml { key: String, message: String },
    #[error("invalid service url {url:?} for {gateway}")]
    InvalidGatewayUrl { gateway: String, url: String },
    #[error("no TLS mode for {0}")]
    UnknownTlsMode(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub domain: Domain,
    pub istio: Istio,
    pub tls: Tls,
    pub cert_manager: CertManager,
}

impl Config {
    pub const WATCHED_CONFIG_MAPS: [&'static str; 4] = [DOMAIN_CONFIG_NAME, ISTIO_CONFIG_NAME, TLS_CONFIG_NAME, CERT_MANAGER_CONFIG_NAME];
}

enum Fragment {
    Domain(Domain),
    Istio(Istio),
    Tls(Tls),
    CertManager(CertManager),
}

impl Fragment {
    fn parse(name: &str, data: &BTreeMap<String, String>) -> Option<Result<Self, ConfigError>> {
        let fragment = match name {
            DOMAIN_CONFIG_NAME => Domain::from_config_map_data(data).map(Fragment::Domain),
            ISTIO_CONFIG_NAME => Istio::from_config_map_data(data).map(Fragment::Istio),
            TLS_CONFIG_NAME => Tls::from_config_map_data(data).map(Fragment::Tls),
            CERT_MANAGER_CONFIG_NAME => CertManager::from_config_map_data(data).map(Fragment::CertManager),
            _ => return None,
        };
        Some(fragment)
    }

    fn apply(self, config: &mut Config) {
        match self {
            Fragment::Domain(domain) => config.domain = domain,
            Fragment::Istio(istio) => config.istio = istio,
            Fragment::Tls(tls) => config.tls = tls,
            Fragment::CertManager(cert_manager) => config.cert_manager = cert_manager,
        }
    }
}

/// Holds the current snapshot and notifies subscribers when it is replaced.
pub struct ConfigStore {
    sender: watch::Sender<Arc<Config>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ConfigStore {
    pub fn new(initial: Config) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    pub fn load(&self) -> Arc<Config> {
        Arc::clone(&self.sender.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.sender.subscribe()
    }

    /// Parses the named config map and swaps in a snapshot carrying the new fragment.
    /// A fragment that fails to parse leaves the last good snapshot in place.
    /// Returns `Ok(false)` for config maps this store does not know about.
    pub fn on_config_changed(&self, name: &str, data: &BTreeMap<String, String>) -> Result<bool, ConfigError> {
        let Some(fragment) = Fragment::parse(name, data) else {
            return Ok(false);
        };
        let fragment = fragment.inspect_err(|e| warn!("Config {name} rejected, keeping the previous configuration: {e}"))?;

        self.sender.send_if_modified(|current| {
            let mut next = Config::clone(current);
            fragment.apply(&mut next);
            if next == **current {
                false
            } else {
                *current = Arc::new(next);
                true
            }
        });
        info!("Config {name} loaded");
        Ok(true)
    }

    /// A deleted config map falls back to the fragment defaults.
    pub fn on_config_deleted(&self, name: &str) -> Result<bool, ConfigError> {
        self.on_config_changed(name, &BTreeMap::new())
    }
}
