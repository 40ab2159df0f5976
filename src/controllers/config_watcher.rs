// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Keeps the config store in sync with the config maps of the system namespace.

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::ListParams,
    runtime::{watcher, watcher::Event, WatchStreamExt},
    Api, Client, ResourceExt,
};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::config::{Config, ConfigStore};

#[derive(TypedBuilder)]
pub struct ConfigWatcher {
    client: Client,
    system_namespace: String,
    config: Arc<ConfigStore>,
}

impl ConfigWatcher {
    /// Reads the current config maps once so that controllers start with the cluster configuration.
    pub async fn load_initial(&self) -> Result<usize, kube::Error> {
        let api = Api::<ConfigMap>::namespaced(self.client.clone(), &self.system_namespace);
        let config_maps = api.list(&ListParams::default()).await?;
        let mut loaded = 0;
        for config_map in &config_maps.items {
            if apply_config_map(&self.config, config_map) {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    pub fn get_watcher(self) -> BoxFuture<'static, ()> {
        let api = Api::<ConfigMap>::namespaced(self.client, &self.system_namespace);
        let config = self.config;
        watcher(api, watcher::Config::default())
            .default_backoff()
            .for_each(move |event| {
                match event {
                    Ok(event) => on_event(&config, &event),
                    Err(e) => warn!("Config map watch failed {e}"),
                }
                futures::future::ready(())
            })
            .boxed()
    }
}

fn on_event(config: &ConfigStore, event: &Event<ConfigMap>) {
    match event {
        Event::Apply(config_map) | Event::InitApply(config_map) => {
            apply_config_map(config, config_map);
        },
        Event::Delete(config_map) => {
            let name = config_map.name_any();
            if let Err(e) = config.on_config_deleted(&name) {
                warn!("Unable to reset config {name} {e}");
            }
        },
        Event::Init | Event::InitDone => {},
    }
}

/// Returns whether the config map was a known fragment that parsed.
fn apply_config_map(config: &ConfigStore, config_map: &ConfigMap) -> bool {
    let name = config_map.name_any();
    if !Config::WATCHED_CONFIG_MAPS.contains(&name.as_str()) {
        debug!("Ignoring config map {name}");
        return false;
    }
    let data = config_map.data.clone().unwrap_or_default();
    match config.on_config_changed(&name, &data) {
        Ok(known) => known,
        Err(e) => {
            warn!("Invalid config {name} {e}");
            false
        },
    }
}
