// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Route reconciliation: traffic resolution, certificates, the cluster ingress and the placeholder
//! service.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::{
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Api, Client, ResourceExt,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, WatchStream};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub mod certificates;
pub mod resources;
pub mod traffic;

use self::{
    certificates::{certificate_references, cleanup_unused_certificates, dns_names, make_certificates, make_ingress_tls},
    resources::{is_cluster_local, make_cluster_ingress, make_placeholder_service, route_domain, route_domain_internal},
    traffic::{build_traffic_config, TrafficConfig, TrafficReferences},
};
use super::{converge, error_policy, reconcile_cached, triggers::track_changes, ControllerContext, ControllerError, Reconcile, Result, RECONCILE_LONG_WAIT};
use crate::{
    common::{KeyOf, ResourceKey, ROUTE_LABEL_KEY, ROUTE_NAMESPACE_LABEL_KEY},
    config::{Config, ConfigStore},
    crds::{
        networking::ClusterIngressTls,
        serving::{Addressable, CertificateReference, RouteStatus},
        Certificate, ClusterIngress, Configuration, Revision, Route,
    },
    store::{KubeStore, ObjectStore},
    tracker::Tracker,
};

#[derive(TypedBuilder)]
pub struct RouteReconciler<S> {
    controller_name: String,
    store: Arc<S>,
    config: Arc<ConfigStore>,
    tracker: Arc<Tracker>,
}

struct CertificateOutcome {
    tls: Vec<ClusterIngressTls>,
    not_ready: Option<String>,
    references: Vec<CertificateReference>,
}

impl<S: ObjectStore> RouteReconciler<S> {
    /// Requeue interval that renews the tracker registrations before they expire.
    fn retrack_interval(&self) -> Duration {
        std::cmp::min(RECONCILE_LONG_WAIT, self.tracker.lease() / 2)
    }

    async fn load_targets(
        &self,
        route: &Route,
        owner: &ResourceKey,
        references: &TrafficReferences,
    ) -> Result<(BTreeMap<String, Configuration>, BTreeMap<String, Revision>)> {
        let namespace = route.namespace().unwrap_or_default();
        let mut configurations = BTreeMap::new();
        let mut revision_names = references.revisions.clone();

        for name in &references.configurations {
            self.tracker.track(ResourceKey::new::<Configuration>(&namespace, name), owner)?;
            if let Some(configuration) = self.store.get::<Configuration>(Some(&namespace), name).await? {
                if let Some(latest) = configuration.status.as_ref().and_then(|s| s.latest_ready_revision()) {
                    revision_names.push(latest.to_owned());
                }
                configurations.insert(name.clone(), configuration);
            }
        }

        revision_names.sort();
        revision_names.dedup();
        let mut revisions = BTreeMap::new();
        for name in &revision_names {
            self.tracker.track(ResourceKey::new::<Revision>(&namespace, name), owner)?;
            if let Some(revision) = self.store.get::<Revision>(Some(&namespace), name).await? {
                revisions.insert(name.clone(), revision);
            }
        }
        Ok((configurations, revisions))
    }

    /// Converges the route's certificates and returns the TLS entries of the ready ones.
    async fn reconcile_certificates(&self, route: &Route, domain: &str, traffic: &TrafficConfig, config: &Config) -> Result<CertificateOutcome> {
        let desired = if config.tls.is_auto() && !is_cluster_local(route) {
            make_certificates(route, &dns_names(domain, traffic), config.tls.wildcard_certificates)
        } else {
            vec![]
        };

        let mut certificates = Vec::with_capacity(desired.len());
        for certificate in &desired {
            certificates.push(converge(&*self.store, certificate.clone()).await?.into_inner());
        }
        let previous = route.status.as_ref().map(|s| s.certificates.as_slice()).unwrap_or_default();
        cleanup_unused_certificates(&*self.store, route, previous, &desired).await?;

        let not_ready = certificates.iter().find(|c| !c.status.as_ref().is_some_and(|s| s.is_ready())).map(ResourceExt::name_any);
        Ok(CertificateOutcome {
            tls: make_ingress_tls(&certificates),
            not_ready,
            references: certificate_references(&certificates),
        })
    }
}

#[async_trait]
impl<S: ObjectStore> Reconcile for RouteReconciler<S> {
    type Resource = Route;
    type Status = RouteStatus;
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

    fn prepare(&self, route: &mut Route) {
        route.set_defaults();
        route.status.get_or_insert_with(RouteStatus::default).initialize_conditions();
    }

    async fn reconcile(&self, route: &mut Route, config: &Config) -> Result<Action> {
        let key = route.resource_key();
        let references = TrafficReferences::of(route);
        let (configurations, revisions) = self.load_targets(route, &key, &references).await?;

        let traffic = build_traffic_config(route, &configurations, &revisions);
        let status = route.status.get_or_insert_with(RouteStatus::default);
        let traffic = match traffic {
            Ok(traffic) => traffic,
            Err(e) => {
                info!("Route {key} is waiting for its traffic targets {e}");
                e.mark_bad_traffic_target(status);
                return Ok(Action::requeue(self.retrack_interval()));
            },
        };
        status.traffic = traffic.status_traffic();
        status.mark_traffic_assigned();

        let domain = route_domain(route, &config.domain.lookup_domain_for_labels(route.labels()));
        let domain_internal = route_domain_internal(route);
        let status = route.status.get_or_insert_with(RouteStatus::default);
        status.domain = Some(domain.clone());
        status.domain_internal = Some(domain_internal.clone());
        status.address = Some(Addressable { hostname: domain_internal });

        let certificates = match self.reconcile_certificates(route, &domain, &traffic, config).await {
            Ok(outcome) => outcome,
            Err(ControllerError::NotOwned { kind, name }) => {
                route.status.get_or_insert_with(RouteStatus::default).mark_certificate_not_owned(&name);
                return Err(ControllerError::NotOwned { kind, name });
            },
            Err(e) => return Err(e),
        };
        let manages_certificates = config.tls.is_auto() && !is_cluster_local(route);
        let status = route.status.get_or_insert_with(RouteStatus::default);
        status.certificates = certificates.references;
        if manages_certificates {
            match &certificates.not_ready {
                Some(name) => status.mark_certificate_not_ready(name),
                None => status.mark_certificate_ready(),
            }
        }

        let desired = make_cluster_ingress(route, &domain, &traffic, certificates.tls);
        let ingress = match converge(&*self.store, desired).await {
            Ok(converged) => converged.into_inner(),
            Err(ControllerError::NotOwned { kind, name }) => {
                route.status.get_or_insert_with(RouteStatus::default).mark_resource_not_owned(&kind.to_string(), &name);
                return Err(ControllerError::NotOwned { kind, name });
            },
            Err(e) => return Err(e),
        };
        let ingress_status = ingress.status.clone().unwrap_or_default();
        route.status.get_or_insert_with(RouteStatus::default).propagate_ingress_conditions(&ingress_status.conditions);

        if let Some(load_balancer) = ingress_status.domain_internal() {
            let service = make_placeholder_service(route, load_balancer);
            if let Err(e) = converge(&*self.store, service).await {
                if let ControllerError::NotOwned { kind, name } = &e {
                    route.status.get_or_insert_with(RouteStatus::default).mark_resource_not_owned(&kind.to_string(), name);
                }
                return Err(e);
            }
        } else {
            debug!("Route {key} waits for a load balancer address before creating the placeholder service");
        }

        let generation = route.metadata.generation;
        route.status.get_or_insert_with(RouteStatus::default).observed_generation = generation;
        Ok(Action::requeue(self.retrack_interval()))
    }
}

#[derive(TypedBuilder)]
pub struct RouteControllerContext {
    controller_name: String,
    client: Client,
    config: Arc<ConfigStore>,
    tracker: Arc<Tracker>,
    triggers: mpsc::Receiver<ObjectRef<Route>>,
}

#[derive(TypedBuilder)]
pub struct RouteController {
    ctx: RouteControllerContext,
}

impl RouteController {
    pub fn get_controller(self) -> BoxFuture<'static, ()> {
        let RouteControllerContext {
            controller_name,
            client,
            config,
            tracker,
            triggers,
        } = self.ctx;

        let reconciler = RouteReconciler::builder()
            .controller_name(controller_name.clone())
            .store(Arc::new(KubeStore::new(client.clone(), &controller_name)))
            .config(Arc::clone(&config))
            .tracker(Arc::clone(&tracker))
            .build();
        let context = Arc::new(ControllerContext::new(reconciler));

        let controller = Controller::new(Api::<Route>::all(client.clone()), watcher::Config::default())
            .owns(Api::<Service>::all(client.clone()), watcher::Config::default())
            .watches(Api::<ClusterIngress>::all(client.clone()), watcher::Config::default(), route_of_ingress)
            .watches(Api::<Certificate>::all(client.clone()), watcher::Config::default(), routes_of_certificate)
            .reconcile_on(ReceiverStream::new(triggers))
            .reconcile_all_on(WatchStream::from_changes(config.subscribe()).map(|_| ()))
            .run(reconcile_cached::<RouteReconciler<KubeStore>>, error_policy::<RouteReconciler<KubeStore>>, context)
            .for_each(|_| futures::future::ready(()));

        let configurations = track_changes(Api::<Configuration>::all(client.clone()), watcher::Config::default(), Arc::clone(&tracker));
        let revisions = track_changes(Api::<Revision>::all(client), watcher::Config::default(), tracker);

        async move {
            futures::join!(controller, configurations, revisions);
        }
        .boxed()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn route_of_ingress(ingress: ClusterIngress) -> Option<ObjectRef<Route>> {
    let labels = ingress.labels();
    let name = labels.get(ROUTE_LABEL_KEY)?;
    let namespace = labels.get(ROUTE_NAMESPACE_LABEL_KEY)?;
    Some(ObjectRef::new(name).within(namespace))
}

#[allow(clippy::needless_pass_by_value)]
fn routes_of_certificate(certificate: Certificate) -> Vec<ObjectRef<Route>> {
    certificates::route_owners(&certificate)
        .unwrap_or_default()
        .iter()
        .filter_map(|owner| ResourceKey::parse::<Route>(owner))
        .map(|key| key.object_ref::<Route>())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc, time::Duration};

    use kube::{runtime::controller::Action, ResourceExt};

    use super::RouteReconciler;
    use crate::{
        common::{KeyOf, ResourceKey},
        controllers::{
            reconcile_key,
            test_support::{auto_tls_config, Fixture},
            ChildKind, ControllerError,
        },
        crds::{
            conditions::READY,
            networking::{ClusterIngressStatus, LoadBalancerIngressStatus},
            serving::{CertificateReference, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED, ROUTE_CONDITION_CERTIFICATE_PROVISIONED, ROUTE_CONDITION_INGRESS_READY},
            Certificate, ClusterIngress, ConditionStatus, Configuration, Revision, Route,
        },
        store::{fake::{FakeStore, Verb}, ObjectStore},
    };

    const ROUTE: &str = r"
apiVersion: serving.knative.dev/v1alpha1
kind: Route
metadata:
  name: r
  namespace: ns
spec:
  traffic:
  - configurationName: cfg
    percent: 100
";

    const CONFIGURATION: &str = r"
apiVersion: serving.knative.dev/v1alpha1
kind: Configuration
metadata:
  name: cfg
  namespace: ns
spec: {}
status:
  latestReadyRevisionName: rev-1
  latestCreatedRevisionName: rev-1
";

    const REVISION: &str = r"
apiVersion: serving.knative.dev/v1alpha1
kind: Revision
metadata:
  name: rev-1
  namespace: ns
spec: {}
status:
  conditions:
  - type: Ready
    status: 'True'
  - type: Active
    status: 'True'
";

    /// Half of the fixture tracker lease.
    const RETRACK_INTERVAL: Duration = Duration::from_secs(150);

    fn reconciler(fixture: &Fixture) -> RouteReconciler<FakeStore> {
        RouteReconciler::builder()
            .controller_name("route-controller".to_owned())
            .store(Arc::clone(&fixture.store))
            .config(Arc::clone(&fixture.config))
            .tracker(Arc::clone(&fixture.tracker))
            .build()
    }

    fn seed_route(fixture: &Fixture) -> Route {
        let route: Route = serde_yaml::from_str(ROUTE).expect("route fixture");
        fixture.store.seed(route)
    }

    fn seed_targets(fixture: &Fixture) {
        fixture.store.seed::<Configuration>(serde_yaml::from_str(CONFIGURATION).expect("configuration fixture"));
        fixture.store.seed::<Revision>(serde_yaml::from_str(REVISION).expect("revision fixture"));
    }

    fn stored_route(fixture: &Fixture) -> Route {
        fixture.store.object::<Route>(Some("ns"), "r").expect("route")
    }

    fn condition_status(route: &Route, type_: &str) -> Option<ConditionStatus> {
        route.status.as_ref()?.condition(type_).map(|c| c.status)
    }

    /// Plays the cluster ingress and certificate controllers by marking their objects ready.
    async fn mark_children_ready(fixture: &Fixture) {
        for mut ingress in fixture.store.objects::<ClusterIngress>() {
            let mut status = ClusterIngressStatus::default();
            status.initialize_conditions();
            status.mark_network_configured();
            status.mark_load_balancer_ready(vec![LoadBalancerIngressStatus {
                domain_internal: Some("istio-ingressgateway.istio-system.svc.cluster.local".to_owned()),
                mesh_only: false,
            }]);
            ingress.status = Some(status);
            fixture.store.update_status(&ingress).await.expect("ingress status");
        }
        for mut certificate in fixture.store.objects::<Certificate>() {
            let status = certificate.status.get_or_insert_with(Default::default);
            status.initialize_conditions();
            status.mark_ready();
            fixture.store.update_status(&certificate).await.expect("certificate status");
        }
    }

    #[tokio::test]
    async fn test_route_end_to_end() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        seed_targets(&fixture);
        let reconciler = reconciler(&fixture);
        let key = route.resource_key();

        let action = reconcile_key(&reconciler, &key).await.expect("reconciled");
        assert_eq!(action, Action::requeue(RETRACK_INTERVAL));

        let certificates = fixture.store.objects::<Certificate>();
        assert_eq!(certificates.len(), 1);
        assert_eq!(certificates[0].name_any(), "ns.example.com");
        assert_eq!(certificates[0].spec.dns_names, vec!["*.ns.example.com".to_owned()]);

        let ingresses = fixture.store.objects::<ClusterIngress>();
        assert_eq!(ingresses.len(), 1);
        assert_eq!(ingresses[0].name_any(), format!("route-{}", route.uid().expect("uid")));
        assert!(ingresses[0].spec.tls.is_empty());
        let split = &ingresses[0].spec.rules[0].http.paths[0].splits[0];
        assert_eq!((split.service_name.as_str(), split.percent), ("rev-1", 100));

        let stored = stored_route(&fixture);
        let status = stored.status.as_ref().expect("status");
        assert_eq!(status.domain.as_deref(), Some("r.ns.example.com"));
        assert_eq!(status.domain_internal.as_deref(), Some("r.ns.svc.cluster.local"));
        assert_eq!(status.traffic[0].revision_name.as_deref(), Some("rev-1"));
        assert_eq!(
            status.certificates,
            vec![CertificateReference {
                namespace: "ns".to_owned(),
                name: "ns.example.com".to_owned()
            }]
        );
        assert_eq!(condition_status(&stored, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED), Some(ConditionStatus::True));
        assert_eq!(condition_status(&stored, ROUTE_CONDITION_CERTIFICATE_PROVISIONED), Some(ConditionStatus::Unknown));
        assert_eq!(condition_status(&stored, READY), Some(ConditionStatus::Unknown));

        mark_children_ready(&fixture).await;
        reconcile_key(&reconciler, &key).await.expect("reconciled");

        let stored = stored_route(&fixture);
        assert_eq!(condition_status(&stored, ROUTE_CONDITION_INGRESS_READY), Some(ConditionStatus::True));
        assert_eq!(condition_status(&stored, ROUTE_CONDITION_CERTIFICATE_PROVISIONED), Some(ConditionStatus::True));
        assert_eq!(condition_status(&stored, READY), Some(ConditionStatus::True));
        assert!(stored.status.as_ref().is_some_and(|s| s.is_ready()));

        let ingress = &fixture.store.objects::<ClusterIngress>()[0];
        assert_eq!(ingress.spec.tls.len(), 1);
        assert_eq!(ingress.spec.tls[0].secret_name, "ns.example.com");
        let service = fixture.store.object::<k8s_openapi::api::core::v1::Service>(Some("ns"), "r").expect("placeholder service");
        assert_eq!(
            service.spec.and_then(|s| s.external_name).as_deref(),
            Some("istio-ingressgateway.istio-system.svc.cluster.local")
        );
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        seed_targets(&fixture);
        let reconciler = reconciler(&fixture);
        let key = route.resource_key();

        reconcile_key(&reconciler, &key).await.expect("first pass");
        mark_children_ready(&fixture).await;
        reconcile_key(&reconciler, &key).await.expect("second pass");
        fixture.store.clear_calls();

        reconcile_key(&reconciler, &key).await.expect("third pass");
        assert!(fixture.store.writes().is_empty(), "unexpected writes {:?}", fixture.store.writes());
        assert!(!fixture.store.calls().iter().any(|c| c.verb == Verb::UpdateStatus));
    }

    #[tokio::test]
    async fn test_missing_target_is_not_an_error() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        let reconciler = reconciler(&fixture);
        let key = route.resource_key();

        let action = reconcile_key(&reconciler, &key).await.expect("target errors are reported in status");
        assert_eq!(action, Action::requeue(RETRACK_INTERVAL));

        let stored = stored_route(&fixture);
        assert_eq!(condition_status(&stored, ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED), Some(ConditionStatus::False));
        let condition = stored.status.as_ref().and_then(|s| s.condition(ROUTE_CONDITION_ALL_TRAFFIC_ASSIGNED)).expect("condition");
        assert_eq!(condition.reason.as_deref(), Some("ConfigurationMissing"));
        assert!(fixture.store.objects::<ClusterIngress>().is_empty());
        assert!(fixture.store.objects::<Certificate>().is_empty());

        let configuration_key = ResourceKey::new::<Configuration>("ns", "cfg");
        assert_eq!(fixture.tracker.owners_of(&configuration_key), vec![key]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_route_keeps_its_registration() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        let reconciler = reconciler(&fixture);
        let key = route.resource_key();
        let configuration_key = ResourceKey::new::<Configuration>("ns", "cfg");

        let mut action = reconcile_key(&reconciler, &key).await.expect("blocked");
        for _ in 0..4 {
            assert_eq!(action, Action::requeue(RETRACK_INTERVAL));
            tokio::time::advance(RETRACK_INTERVAL).await;
            action = reconcile_key(&reconciler, &key).await.expect("still blocked");
        }

        tokio::time::advance(Duration::from_secs(1)).await;
        seed_targets(&fixture);
        assert_eq!(fixture.tracker.on_changed(&configuration_key), Ok(1));

        reconcile_key(&reconciler, &key).await.expect("unblocked");
        assert_eq!(fixture.store.objects::<ClusterIngress>().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_lapses_without_requeue() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        reconcile_key(&reconciler(&fixture), &route.resource_key()).await.expect("blocked");

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(fixture.tracker.on_changed(&ResourceKey::new::<Configuration>("ns", "cfg")), Ok(0));
    }

    #[tokio::test]
    async fn test_replaced_certificates_are_released() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        seed_targets(&fixture);
        let reconciler = reconciler(&fixture);
        let key = route.resource_key();

        reconcile_key(&reconciler, &key).await.expect("wildcard certificate");
        let unrelated = fixture.store.seed(Certificate::new("other.example.com", Default::default()));

        let tls = BTreeMap::from([("tls-mode".to_owned(), "AUTO".to_owned()), ("wildcard-cert".to_owned(), "false".to_owned())]);
        fixture.config.on_config_changed("config-tls", &tls).expect("tls config");
        reconcile_key(&reconciler, &key).await.expect("per route certificate");

        let route_certificate = format!("route-{}", route.uid().expect("uid"));
        let names: Vec<_> = fixture.store.objects::<Certificate>().iter().map(ResourceExt::name_any).collect();
        assert!(names.contains(&route_certificate));
        assert!(names.contains(&unrelated.name_any()));
        assert!(!names.contains(&"ns.example.com".to_owned()));

        let stored = stored_route(&fixture);
        let references: Vec<_> = stored.status.as_ref().expect("status").certificates.iter().map(|r| r.name.clone()).collect();
        assert_eq!(references, vec![route_certificate]);
    }

    #[tokio::test]
    async fn test_manual_tls_skips_certificates() {
        let fixture = Fixture::new(crate::config::Config::default());
        let route = seed_route(&fixture);
        seed_targets(&fixture);
        let reconciler = reconciler(&fixture);

        reconcile_key(&reconciler, &route.resource_key()).await.expect("reconciled");
        assert!(fixture.store.objects::<Certificate>().is_empty());
        assert_eq!(fixture.store.objects::<ClusterIngress>().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_ingress_blocks_route() {
        let fixture = Fixture::new(auto_tls_config());
        let route = seed_route(&fixture);
        seed_targets(&fixture);
        let mut foreign = ClusterIngress::new(&format!("route-{}", route.uid().expect("uid")), Default::default());
        foreign.labels_mut().insert(crate::common::ROUTE_LABEL_KEY.to_owned(), "someone-else".to_owned());
        fixture.store.seed(foreign);

        let result = reconcile_key(&reconciler(&fixture), &route.resource_key()).await;
        assert!(matches!(result, Err(ControllerError::NotOwned { kind: ChildKind::ClusterIngress, .. })));

        let stored = stored_route(&fixture);
        let condition = stored.status.as_ref().and_then(|s| s.condition(ROUTE_CONDITION_INGRESS_READY)).expect("condition");
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason.as_deref(), Some("NotOwned"));
    }
}
