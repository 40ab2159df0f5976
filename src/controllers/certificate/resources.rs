// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::{
    config::CertManager,
    crds::{
        certmanager::{self, AcmeCertificateConfig, DomainSolverConfig},
        networking::CertificateStatus,
        CertManagerCertificate, Certificate, ConditionStatus,
    },
};

pub const NOT_READY_REASON: &str = "NotReady";

/// cert-manager certificate requesting the names of `certificate` from the configured issuer.
pub fn make_cert_manager_certificate(certificate: &Certificate, cert_manager: &CertManager) -> CertManagerCertificate {
    let dns_names: Vec<String> = certificate.spec.dns_names.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();

    CertManagerCertificate {
        metadata: ObjectMeta {
            name: Some(certificate.name_any()),
            namespace: certificate.namespace(),
            owner_references: certificate.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: certmanager::CertificateSpec {
            secret_name: certificate.spec.secret_name.clone(),
            dns_names: dns_names.clone(),
            issuer_ref: cert_manager.issuer_ref.clone(),
            acme: Some(AcmeCertificateConfig {
                config: vec![DomainSolverConfig {
                    domains: dns_names,
                    solver_config: cert_manager.solver_config.clone(),
                }],
            }),
        },
        status: None,
    }
}

/// Mirrors the cert-manager certificate state onto `status`.
pub fn set_certificate_status(status: &mut CertificateStatus, cert_manager_certificate: &CertManagerCertificate) {
    status.supported_dns_names.clone_from(&cert_manager_certificate.spec.dns_names);
    status.not_after = cert_manager_certificate.status.as_ref().and_then(|s| s.not_after.clone());

    if cert_manager_certificate.is_ready() {
        status.mark_ready();
        return;
    }
    match cert_manager_certificate.ready_condition() {
        Some(condition) if condition.status == "False" => status.mark_not_ready(
            ConditionStatus::False,
            condition.reason.as_deref().unwrap_or(NOT_READY_REASON),
            condition.message.as_deref().unwrap_or_default(),
        ),
        _ => status.mark_not_ready(
            ConditionStatus::Unknown,
            NOT_READY_REASON,
            &format!("Waiting for cert-manager certificate {} to be ready", cert_manager_certificate.name_any()),
        ),
    }
}
