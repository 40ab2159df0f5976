// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use itertools::Itertools;

mod resource_key;

pub use resource_key::{KeyOf, ResourceKey};

pub const ROUTE_LABEL_KEY: &str = "serving.knative.dev/route";
pub const ROUTE_NAMESPACE_LABEL_KEY: &str = "serving.knative.dev/routeNamespace";
pub const CONFIGURATION_LABEL_KEY: &str = "serving.knative.dev/configuration";
pub const VISIBILITY_LABEL_KEY: &str = "serving.knative.dev/visibility";
pub const VISIBILITY_CLUSTER_LOCAL: &str = "cluster-local";
pub const ROUTES_ANNOTATION_KEY: &str = "serving.knative.dev/routes";

pub const INGRESS_LABEL_KEY: &str = "networking.internal.knative.dev/clusteringress";
pub const ORIGIN_SECRET_NAME_LABEL_KEY: &str = "networking.internal.knative.dev/originSecretName";
pub const ORIGIN_SECRET_NAMESPACE_LABEL_KEY: &str = "networking.internal.knative.dev/originSecretNamespace";

pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

pub fn format_resource<R>() -> &'static str {
    std::any::type_name::<R>().split("::").last().unwrap_or_default()
}

/// `{name}.{namespace}.svc.cluster.local`
pub fn service_hostname(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}.{CLUSTER_DOMAIN}")
}

/// Removes repeated entries keeping the first occurrence order.
pub fn dedup<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    items.into_iter().unique().collect()
}

#[cfg(test)]
mod tests {
    use super::dedup;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let items = ["b", "a", "b", "c", "a"].iter().map(|s| (*s).to_owned());
        assert_eq!(dedup(items), vec!["b".to_owned(), "a".to_owned(), "c".to_owned()]);
    }
}
