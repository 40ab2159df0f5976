// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::sync::Arc;

use futures::FutureExt;
use kube::Client;
use tokio::sync::Mutex;
use tracing::{info, warn};

mod common;
pub mod config;
pub mod configuration;
mod controllers;
pub mod crds;
pub mod dns;
mod store;
mod tracker;

pub use configuration::{Configuration, ConfigurationError};
use controllers::{
    certificate::{CertificateController, CertificateControllerContext},
    cluster_ingress::{ClusterIngressController, ClusterIngressControllerContext},
    config_watcher::ConfigWatcher,
    route::{RouteController, RouteControllerContext},
    tracker_trigger, trigger_channel,
};
use crds::{ClusterIngress, Route};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("Kubvernor networking started");
    let client = Client::try_default().await?;
    let config = Arc::new(config::ConfigStore::default());
    let lease = configuration.tracker_lease();

    let config_watcher = ConfigWatcher::builder()
        .client(client.clone())
        .system_namespace(configuration.system_namespace.clone())
        .config(Arc::clone(&config))
        .build();
    match config_watcher.load_initial().await {
        Ok(loaded) => info!("Loaded {loaded} config maps from {}", configuration.system_namespace),
        Err(e) => warn!("Unable to load config maps, starting with defaults {e}"),
    }

    let (route_trigger_sender, route_trigger_receiver) = trigger_channel::<Route>();
    let route_tracker = Arc::new(tracker::Tracker::new(tracker_trigger(route_trigger_sender), lease));
    let (ingress_trigger_sender, ingress_trigger_receiver) = trigger_channel::<ClusterIngress>();
    let ingress_tracker = Arc::new(tracker::Tracker::new(tracker_trigger(ingress_trigger_sender), lease));
    let gateway_lock = Arc::new(Mutex::new(()));

    let route_controller = RouteController::builder()
        .ctx(
            RouteControllerContext::builder()
                .controller_name(configuration.controller_name.clone())
                .client(client.clone())
                .config(Arc::clone(&config))
                .tracker(route_tracker)
                .triggers(route_trigger_receiver)
                .build(),
        )
        .build();

    let cluster_ingress_controller = ClusterIngressController::builder()
        .ctx(
            ClusterIngressControllerContext::builder()
                .controller_name(configuration.controller_name.clone())
                .system_namespace(configuration.system_namespace.clone())
                .client(client.clone())
                .config(Arc::clone(&config))
                .tracker(ingress_tracker)
                .gateway_lock(gateway_lock)
                .triggers(ingress_trigger_receiver)
                .build(),
        )
        .build();

    let certificate_controller = CertificateController::builder()
        .ctx(
            CertificateControllerContext::builder()
                .controller_name(configuration.controller_name.clone())
                .client(client)
                .config(config)
                .build(),
        )
        .build();

    let config_watcher_task = async move {
        info!("Config watcher...started");
        config_watcher.get_watcher().await;
        info!("Config watcher...stopped");
    };
    let route_controller_task = async move {
        info!("Route controller...started");
        route_controller.get_controller().await;
        info!("Route controller...stopped");
    };
    let cluster_ingress_controller_task = async move {
        info!("Cluster Ingress controller...started");
        cluster_ingress_controller.get_controller().await;
        info!("Cluster Ingress controller...stopped");
    };
    let certificate_controller_task = async move {
        info!("Certificate controller...started");
        certificate_controller.get_controller().await;
        info!("Certificate controller...stopped");
    };

    futures::future::join_all(vec![
        config_watcher_task.boxed(),
        route_controller_task.boxed(),
        cluster_ingress_controller_task.boxed(),
        certificate_controller_task.boxed(),
    ])
    .await;
    info!("Kubvernor networking stopped");
    Ok(())
}
