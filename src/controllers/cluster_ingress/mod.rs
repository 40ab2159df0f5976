// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! ClusterIngress reconciliation: the Istio virtual service, load balancer status and, with automatic
//! TLS, gateway servers and secret copies guarded by a finalizer.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Api, Client, ResourceExt,
};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub mod gateway;
pub mod secrets;
pub mod virtual_service;

use self::{
    gateway::reconcile_gateways,
    secrets::{delete_secrets, reconcile_secrets},
    virtual_service::{gateway_names, gateway_service_url, make_virtual_service},
};
use super::{
    converge, error_policy, finalizer::FinalizerPatcher, reconcile_cached, track_changes, ControllerContext, ControllerError, Reconcile, Result,
    RECONCILE_LONG_WAIT,
};
use crate::{
    common::{KeyOf, INGRESS_LABEL_KEY},
    config::{Config, ConfigStore},
    crds::{
        networking::{ClusterIngressStatus, LoadBalancerIngressStatus},
        ClusterIngress, VirtualService,
    },
    store::{KubeStore, ObjectStore},
    tracker::Tracker,
};

pub const CLUSTER_INGRESS_FINALIZER: &str = "clusteringresses.networking.internal.knative.dev";

#[derive(TypedBuilder)]
pub struct ClusterIngressReconciler<S> {
    controller_name: String,
    system_namespace: String,
    store: Arc<S>,
    config: Arc<ConfigStore>,
    tracker: Arc<Tracker>,
    gateway_lock: Arc<Mutex<()>>,
}

/// `[{MeshOnly}]` without a gateway address, `[{DomainInternal: url}]` otherwise.
pub fn load_balancer_status(service_url: Option<&str>) -> Vec<LoadBalancerIngressStatus> {
    match service_url.filter(|url| !url.is_empty()) {
        Some(url) => vec![LoadBalancerIngressStatus {
            domain_internal: Some(url.to_owned()),
            mesh_only: false,
        }],
        None => vec![LoadBalancerIngressStatus {
            domain_internal: None,
            mesh_only: true,
        }],
    }
}

#[async_trait]
impl<S: ObjectStore> Reconcile for ClusterIngressReconciler<S> {
    type Resource = ClusterIngress;
    type Status = ClusterIngressStatus;
    type Store = S;

    fn controller_name(&self) -> &str {
        &self.controller_name
    }

    fn store(&self) -> &S {
        &self.store
    }

    fn config(&self) -> Arc<Config> {
        self.config.load()
    }

    fn prepare(&self, ingress: &mut ClusterIngress) {
        ingress.set_defaults();
        ingress.status.get_or_insert_with(ClusterIngressStatus::default).initialize_conditions();
    }

    async fn reconcile(&self, ingress: &mut ClusterIngress, config: &Config) -> Result<Action> {
        let gateways = gateway_names(ingress, &config.istio);

        let desired = make_virtual_service(ingress, &gateways, &self.system_namespace);
        if let Err(e) = converge(&*self.store, desired).await {
            if let ControllerError::NotOwned { kind, name } = &e {
                ingress.status.get_or_insert_with(ClusterIngressStatus::default).mark_resource_not_owned(&kind.to_string(), name);
            }
            return Err(e);
        }

        let load_balancer = load_balancer_status(gateway_service_url(ingress, &config.istio));
        let generation = ingress.metadata.generation;
        let status = ingress.status.get_or_insert_with(ClusterIngressStatus::default);
        status.mark_network_configured();
        status.mark_load_balancer_ready(load_balancer);
        status.observed_generation = generation;

        if config.tls.is_auto() {
            if FinalizerPatcher::ensure_finalizer(&*self.store, ingress, CLUSTER_INGRESS_FINALIZER).await?.is_some() {
                debug!("Added finalizer to {}", ingress.name_any());
            }
            reconcile_secrets(&*self.store, &self.tracker, ingress, &config.istio.ingress_gateway_namespaces()).await?;
            reconcile_gateways(&*self.store, &self.gateway_lock, ingress, &gateways, &self.system_namespace, false).await?;
        }
        Ok(Action::requeue(RECONCILE_LONG_WAIT))
    }

    /// Gateway servers go first so that no server is left pointing at a deleted secret.
    async fn finalize(&self, ingress: &ClusterIngress, config: &Config) -> Result<Action> {
        if ingress.finalizers().first().map(String::as_str) != Some(CLUSTER_INGRESS_FINALIZER) {
            return Ok(Action::await_change());
        }
        let name = ingress.name_any();
        info!("Cleaning up gateways and secrets of {name}");

        let gateways = gateway_names(ingress, &config.istio);
        reconcile_gateways(&*self.store, &self.gateway_lock, ingress, &gateways, &self.system_namespace, true).await?;
        delete_secrets(&*self.store, &self.tracker, ingress, &config.istio.ingress_gateway_namespaces()).await?;
        self.tracker.untrack_owner(&ingress.resource_key())?;
        FinalizerPatcher::remove_finalizer(&*self.store, ingress, CLUSTER_INGRESS_FINALIZER).await?;
        Ok(Action::await_change())
    }
}

#[derive(TypedBuilder)]
pub struct ClusterIngressControllerContext {
    controller_name: String,
    system_namespace: String,
    client: Client,
    config: Arc<ConfigStore>,
    tracker: Arc<Tracker>,
    gateway_lock: Arc<Mutex<()>>,
    triggers: mpsc::Receiver<ObjectRef<ClusterIngress>>,
}

#[derive(TypedBuilder)]
pub struct ClusterIngressController {
    ctx: ClusterIngressControllerContext,
}

impl ClusterIngressController {
    pub fn get_controller(self) -> BoxFuture<'static, ()> {
        let ClusterIngressControllerContext {
            controller_name,
            system_namespace,
            client,
            config,
            tracker,
            gateway_lock,
            triggers,
        } = self.ctx;

        let reconciler = ClusterIngressReconciler::builder()
            .controller_name(controller_name.clone())
            .system_namespace(system_namespace)
            .store(Arc::new(KubeStore::new(client.clone(), &controller_name)))
            .config(Arc::clone(&config))
            .tracker(Arc::clone(&tracker))
            .gateway_lock(gateway_lock)
            .build();
        let context = Arc::new(ControllerContext::new(reconciler));

        let labelled = watcher::Config::default().labels(INGRESS_LABEL_KEY);
        let controller = Controller::new(Api::<ClusterIngress>::all(client.clone()), watcher::Config::default())
            .watches(Api::<VirtualService>::all(client.clone()), labelled.clone(), ingress_of_labelled::<VirtualService>)
            .watches(Api::<Secret>::all(client.clone()), labelled, ingress_of_labelled::<Secret>)
            .reconcile_on(ReceiverStream::new(triggers))
            .reconcile_all_on(WatchStream::from_changes(config.subscribe()).map(|_| ()))
            .run(
                reconcile_cached::<ClusterIngressReconciler<KubeStore>>,
                error_policy::<ClusterIngressReconciler<KubeStore>>,
                context,
            )
            .for_each(|_| futures::future::ready(()));

        let origin_secrets = track_changes(Api::<Secret>::all(client), watcher::Config::default(), tracker);

        async move {
            futures::join!(controller, origin_secrets);
        }
        .boxed()
    }
}

/// Children of a cluster ingress carry its name in a label; a cluster scoped owner cannot be found
/// through owner references from a namespaced child.
#[allow(clippy::needless_pass_by_value)]
fn ingress_of_labelled<K: ResourceExt>(object: K) -> Option<ObjectRef<ClusterIngress>> {
    object.labels().get(INGRESS_LABEL_KEY).map(|name| ObjectRef::new(name))
}
