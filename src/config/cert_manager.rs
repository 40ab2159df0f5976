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
use crate::crds::certmanager::{Dns01SolverConfig, ObjectReference, SolverConfig};

pub const CERT_MANAGER_CONFIG_NAME: &str = "config-certmanager";

const SOLVER_CONFIG_KEY: &str = "solverConfig";
const ISSUER_REF_KEY: &str = "issuerRef";

pub const DEFAULT_ISSUER_KIND: &str = "ClusterIssuer";
pub const DEFAULT_ISSUER_NAME: &str = "letsencrypt-issuer";
pub const DEFAULT_DNS01_PROVIDER: &str = "cloud-dns-provider";

#[derive(Clone, Debug, PartialEq)]
pub struct CertManager {
    pub solver_config: SolverConfig,
    pub issuer_ref: ObjectReference,
}

impl Default for CertManager {
    fn default() -> Self {
        Self {
            solver_config: SolverConfig {
                http01: None,
                dns01: Some(Dns01SolverConfig { provider: DEFAULT_DNS01_PROVIDER.to_owned() }),
            },
            issuer_ref: ObjectReference {
                name: DEFAULT_ISSUER_NAME.to_owned(),
                kind: DEFAULT_ISSUER_KIND.to_owned(),
            },
        }
    }
}

impl CertManager {
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(raw) = data.get(SOLVER_CONFIG_KEY) {
            config.solver_config = serde_yaml::from_str(raw).map_err(|e| ConfigError::InvalidYaml {
                key: SOLVER_CONFIG_KEY.to_owned(),
                message: e.to_string(),
            })?;
        }
        if let Some(raw) = data.get(ISSUER_REF_KEY) {
            config.issuer_ref = serde_yaml::from_str(raw).map_err(|e| ConfigError::InvalidYaml {
                key: ISSUER_REF_KEY.to_owned(),
                message: e.to_string(),
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{CertManager, DEFAULT_DNS01_PROVIDER, DEFAULT_ISSUER_NAME};

    #[test]
    fn test_cert_manager_config() {
        let data = BTreeMap::from([
            ("issuerRef".to_owned(), "kind: Issuer\nname: my-issuer\n".to_owned()),
            ("solverConfig".to_owned(), "dns01:\n  provider: route53\n".to_owned()),
        ]);
        let config = CertManager::from_config_map_data(&data).expect("valid config");
        assert_eq!(config.issuer_ref.kind, "Issuer");
        assert_eq!(config.issuer_ref.name, "my-issuer");
        assert_eq!(config.solver_config.dns01.expect("dns01").provider, "route53");
    }

    #[test]
    fn test_defaults() {
        let config = CertManager::from_config_map_data(&BTreeMap::new()).expect("valid config");
        assert_eq!(config.issuer_ref.name, DEFAULT_ISSUER_NAME);
        assert_eq!(config.solver_config.dns01.expect("dns01").provider, DEFAULT_DNS01_PROVIDER);
    }

    #[test]
    fn test_invalid_issuer() {
        let data = BTreeMap::from([("issuerRef".to_owned(), "kind: [".to_owned())]);
        assert!(CertManager::from_config_map_data(&data).is_err());
    }
}
