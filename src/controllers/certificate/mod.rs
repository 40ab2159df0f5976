// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Certificate reconciliation through cert-manager.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, Client,
};
use tokio_stream::wrappers::WatchStream;
use typed_builder::TypedBuilder;

pub mod resources;

use self::resources::{make_cert_manager_certificate, set_certificate_status};
use super::{converge, error_policy, reconcile_cached, ControllerContext, ControllerError, Reconcile, Result, RECONCILE_LONG_WAIT};
use crate::{
    config::{Config, ConfigStore},
    crds::{networking::CertificateStatus, CertManagerCertificate, Certificate},
    store::{KubeStore, ObjectStore},
};

#[derive(TypedBuilder)]
pub struct CertificateReconciler<S> {
    controller_name: String,
    store: Arc<S>,
    config: Arc<ConfigStore>,
}

#[async_trait]
impl<S: ObjectStore> Reconcile for CertificateReconciler<S> {
    type Resource = Certificate;
    type Status = CertificateStatus;
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

    fn prepare(&self, certificate: &mut Certificate) {
        certificate.status.get_or_insert_with(CertificateStatus::default).initialize_conditions();
    }

    async fn reconcile(&self, certificate: &mut Certificate, config: &Config) -> Result<Action> {
        let desired = make_cert_manager_certificate(certificate, &config.cert_manager);
        let cert_manager_certificate = match converge(&*self.store, desired).await {
            Ok(converged) => converged.into_inner(),
            Err(ControllerError::NotOwned { kind, name }) => {
                certificate.status.get_or_insert_with(CertificateStatus::default).mark_resource_not_owned(&kind.to_string(), &name);
                return Err(ControllerError::NotOwned { kind, name });
            },
            Err(e) => return Err(e),
        };
        set_certificate_status(certificate.status.get_or_insert_with(CertificateStatus::default), &cert_manager_certificate);
        Ok(Action::requeue(RECONCILE_LONG_WAIT))
    }
}

#[derive(TypedBuilder)]
pub struct CertificateControllerContext {
    controller_name: String,
    client: Client,
    config: Arc<ConfigStore>,
}

#[derive(TypedBuilder)]
pub struct CertificateController {
    ctx: CertificateControllerContext,
}

impl CertificateController {
    pub fn get_controller(self) -> BoxFuture<'static, ()> {
        let CertificateControllerContext { controller_name, client, config } = self.ctx;

        let reconciler = CertificateReconciler::builder()
            .controller_name(controller_name.clone())
            .store(Arc::new(KubeStore::new(client.clone(), &controller_name)))
            .config(Arc::clone(&config))
            .build();
        let context = Arc::new(ControllerContext::new(reconciler));

        Controller::new(Api::<Certificate>::all(client.clone()), watcher::Config::default())
            .owns(Api::<CertManagerCertificate>::all(client), watcher::Config::default())
            .reconcile_all_on(WatchStream::from_changes(config.subscribe()).map(|_| ()))
            .run(reconcile_cached::<CertificateReconciler<KubeStore>>, error_policy::<CertificateReconciler<KubeStore>>, context)
            .for_each(|_| futures::future::ready(()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kube::runtime::controller::Action;

    use super::CertificateReconciler;
    use crate::{
        common::KeyOf,
        controllers::{
            reconcile_key,
            test_support::{auto_tls_config, Fixture},
            ChildKind, ControllerError, RECONCILE_LONG_WAIT,
        },
        crds::{
            certmanager::{self, CertificateCondition},
            conditions::READY,
            CertManagerCertificate, Certificate, ConditionStatus,
        },
        store::{fake::FakeStore, ObjectStore},
    };

    const CERTIFICATE: &str = r"
apiVersion: networking.internal.knative.dev/v1alpha1
kind: Certificate
metadata:
  name: ns.example.com
  namespace: ns
spec:
  dnsNames:
  - '*.ns.example.com'
  secretName: ns.example.com
";

    fn reconciler(fixture: &Fixture) -> CertificateReconciler<FakeStore> {
        CertificateReconciler::builder()
            .controller_name("certificate-controller".to_owned())
            .store(Arc::clone(&fixture.store))
            .config(Arc::clone(&fixture.config))
            .build()
    }

    fn ready_condition(fixture: &Fixture) -> (ConditionStatus, Option<String>) {
        let certificate = fixture.store.object::<Certificate>(Some("ns"), "ns.example.com").expect("certificate");
        let condition = certificate.status.expect("status").conditions.into_iter().find(|c| c.type_ == READY).expect("ready");
        (condition.status, condition.reason)
    }

    #[tokio::test]
    async fn test_certificate_follows_cert_manager() {
        let fixture = Fixture::new(auto_tls_config());
        let certificate = fixture.store.seed::<Certificate>(serde_yaml::from_str(CERTIFICATE).expect("certificate fixture"));
        let reconciler = reconciler(&fixture);

        let action = reconcile_key(&reconciler, &certificate.resource_key()).await.expect("reconciled");
        assert_eq!(action, Action::requeue(RECONCILE_LONG_WAIT));
        assert_eq!(ready_condition(&fixture), (ConditionStatus::Unknown, Some("NotReady".to_owned())));

        let mut cm = fixture.store.object::<CertManagerCertificate>(Some("ns"), "ns.example.com").expect("cert-manager certificate");
        assert_eq!(cm.spec.dns_names, vec!["*.ns.example.com".to_owned()]);
        cm.status = Some(certmanager::CertificateStatus {
            conditions: vec![CertificateCondition {
                type_: "Ready".to_owned(),
                status: "True".to_owned(),
                reason: None,
                message: None,
            }],
            not_after: None,
        });
        fixture.store.update_status(&cm).await.expect("cert-manager status");

        reconcile_key(&reconciler, &certificate.resource_key()).await.expect("reconciled");
        assert_eq!(ready_condition(&fixture).0, ConditionStatus::True);

        fixture.store.clear_calls();
        reconcile_key(&reconciler, &certificate.resource_key()).await.expect("reconciled");
        assert!(fixture.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_cert_manager_certificate() {
        let fixture = Fixture::new(auto_tls_config());
        let certificate = fixture.store.seed::<Certificate>(serde_yaml::from_str(CERTIFICATE).expect("certificate fixture"));
        let mut foreign = CertManagerCertificate::new("ns.example.com", Default::default());
        foreign.metadata.namespace = Some("ns".to_owned());
        fixture.store.seed(foreign);

        let result = reconcile_key(&reconciler(&fixture), &certificate.resource_key()).await;
        assert!(matches!(result, Err(ControllerError::NotOwned { kind: ChildKind::CertManagerCertificate, .. })));
        assert_eq!(ready_condition(&fixture), (ConditionStatus::False, Some("NotOwned".to_owned())));
    }
}
