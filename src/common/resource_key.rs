// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::fmt::Display;

use kube::{runtime::reflector::ObjectRef, Resource, ResourceExt};

/// Identity of an object in the cluster: group, kind, namespace and name.
/// Cluster scoped objects carry an empty namespace.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new<K>(namespace: &str, name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: K::kind(&()).into_owned(),
        }
    }

    pub fn cluster_scoped<K>(name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new::<K>("", name)
    }

    /// Parses a `namespace/name` (or bare `name`) work queue key.
    pub fn parse<K>(key: &str) -> Option<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let mut parts = key.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) if !name.is_empty() => Some(Self::cluster_scoped::<K>(name)),
            (Some(namespace), Some(name), None) if !name.is_empty() => Some(Self::new::<K>(namespace, name)),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        if self.namespace.is_empty() {
            None
        } else {
            Some(&self.namespace)
        }
    }

    pub fn is_kind<K>(&self) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        self.group == K::group(&()) && self.kind == K::kind(&())
    }

    pub fn object_ref<K>(&self) -> ObjectRef<K>
    where
        K: Resource<DynamicType = ()>,
    {
        let object_ref = ObjectRef::new(&self.name);
        match self.namespace() {
            Some(namespace) => object_ref.within(namespace),
            None => object_ref,
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

pub trait KeyOf {
    fn resource_key(&self) -> ResourceKey;
}

impl<K> KeyOf for K
where
    K: Resource<DynamicType = ()> + ResourceExt,
{
    fn resource_key(&self) -> ResourceKey {
        ResourceKey {
            group: K::group(&()).into_owned(),
            namespace: self.namespace().unwrap_or_default(),
            name: self.name_any(),
            kind: K::kind(&()).into_owned(),
        }
    }
}
