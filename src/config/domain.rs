// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeMap;

use serde::Deserialize;

use super::ConfigError;
use crate::common::{CLUSTER_DOMAIN, VISIBILITY_CLUSTER_LOCAL, VISIBILITY_LABEL_KEY};

pub const DOMAIN_CONFIG_NAME: &str = "config-domain";
pub const DEFAULT_DOMAIN: &str = "example.com";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LabelSelector {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

impl LabelSelector {
    fn specificity(&self) -> usize {
        self.selector.len()
    }

    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.selector.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Domain suffixes keyed by the label selector a route must match to use them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    pub domains: BTreeMap<String, LabelSelector>,
}

impl Default for Domain {
    fn default() -> Self {
        Self { domains: BTreeMap::from([(DEFAULT_DOMAIN.to_owned(), LabelSelector::default())]) }
    }
}

impl Domain {
    pub fn from_config_map_data(data: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut domains = BTreeMap::new();
        for (domain, value) in data {
            let selector = if value.trim().is_empty() {
                LabelSelector::default()
            } else {
                serde_yaml::from_str(value).map_err(|e| ConfigError::InvalidYaml {
                    key: domain.clone(),
                    message: e.to_string(),
                })?
            };
            domains.insert(domain.clone(), selector);
        }
        if domains.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { domains })
    }

    /// The most specific matching selector wins, ties go to the lexicographically smallest domain.
    pub fn lookup_domain_for_labels(&self, labels: &BTreeMap<String, String>) -> String {
        if labels.get(VISIBILITY_LABEL_KEY).map(String::as_str) == Some(VISIBILITY_CLUSTER_LOCAL) {
            return CLUSTER_DOMAIN.to_owned();
        }

        let mut best: Option<(&String, usize)> = None;
        for (domain, selector) in &self.domains {
            if !selector.matches(labels) {
                continue;
            }
            let specificity = selector.specificity();
            match best {
                Some((_, best_specificity)) if specificity <= best_specificity => {},
                _ => best = Some((domain, specificity)),
            }
        }
        best.map_or_else(|| DEFAULT_DOMAIN.to_owned(), |(domain, _)| domain.clone())
    }
}
