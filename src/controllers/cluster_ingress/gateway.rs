// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Servers a cluster ingress contributes to the shared Istio gateways.
//!
//! Every server is tagged with its owner through the port name `{ingress}:{index}`. Updates only ever
//! replace the servers carrying the caller's tag and run under one process-wide lock.

use kube::ResourceExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::secrets::target_secret_name;
use crate::{
    controllers::Result,
    crds::{
        istio::{Port, Server, TlsOptions, PROTOCOL_HTTPS, TLS_MODE_SIMPLE},
        ClusterIngress, Gateway,
    },
    store::{ObjectStore, StoreError},
};

pub const HTTPS_PORT: u32 = 443;

fn owner_tag(ingress_name: &str) -> String {
    format!("{ingress_name}:")
}

/// One HTTPS server per TLS entry of the ingress, sorted by port name.
pub fn make_servers(ingress: &ClusterIngress) -> Vec<Server> {
    let name = ingress.name_any();
    let servers = ingress
        .spec
        .tls
        .iter()
        .enumerate()
        .map(|(index, tls)| Server {
            hosts: tls.hosts.clone(),
            port: Port {
                number: HTTPS_PORT,
                protocol: PROTOCOL_HTTPS.to_owned(),
                name: format!("{name}:{index}"),
            },
            tls: Some(TlsOptions {
                mode: TLS_MODE_SIMPLE.to_owned(),
                server_certificate: tls.server_certificate.clone(),
                private_key: tls.private_key.clone(),
                credential_name: Some(target_secret_name(&name, &tls.secret_namespace, &tls.secret_name)),
            }),
        })
        .collect();
    sort_servers(servers)
}

/// Servers of `gateway` tagged with `ingress_name`.
pub fn owned_servers(gateway: &Gateway, ingress_name: &str) -> Vec<Server> {
    let tag = owner_tag(ingress_name);
    sort_servers(gateway.spec.servers.iter().filter(|s| s.port.name.starts_with(&tag)).cloned().collect())
}

/// Replaces the servers tagged with `ingress_name` by `desired`, keeping every other server as is.
pub fn update_gateway(mut gateway: Gateway, ingress_name: &str, desired: Vec<Server>) -> Gateway {
    let tag = owner_tag(ingress_name);
    let mut servers: Vec<Server> = gateway.spec.servers.into_iter().filter(|s| !s.port.name.starts_with(&tag)).collect();
    servers.extend(desired);
    gateway.spec.servers = sort_servers(servers);
    gateway
}

fn sort_servers(mut servers: Vec<Server>) -> Vec<Server> {
    servers.sort_by(|a, b| a.port.name.cmp(&b.port.name));
    servers
}

/// Converges the ingress servers of every named gateway in `namespace`.
///
/// When `deleting` the desired set is empty and missing gateways are skipped. Otherwise a missing
/// gateway is an error.
pub async fn reconcile_gateways<S: ObjectStore>(
    store: &S,
    lock: &Mutex<()>,
    ingress: &ClusterIngress,
    gateway_names: &[String],
    namespace: &str,
    deleting: bool,
) -> Result<()> {
    let ingress_name = ingress.name_any();
    let desired = if deleting { vec![] } else { make_servers(ingress) };

    let _guard = lock.lock().await;
    for gateway_name in gateway_names {
        let Some(gateway) = store.get::<Gateway>(Some(namespace), gateway_name).await? else {
            if deleting {
                debug!("Gateway {namespace}/{gateway_name} is gone, nothing to clean up for {ingress_name}");
                continue;
            }
            return Err(StoreError::NotFound(format!("Gateway {namespace}/{gateway_name}")).into());
        };

        if owned_servers(&gateway, &ingress_name) == desired {
            debug!("Gateway {namespace}/{gateway_name} servers of {ingress_name} are up to date");
            continue;
        }

        let updated = update_gateway(gateway, &ingress_name, desired.clone());
        store.update(&updated).await?;
        info!("Updated gateway {namespace}/{gateway_name} servers of {ingress_name}");
    }
    Ok(())
}
