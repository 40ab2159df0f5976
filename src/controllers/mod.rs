// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

use std::{fmt::Debug, marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use kube::{runtime::controller::Action, Resource, ResourceExt};
use kube_core::object::HasStatus;
use tracing::{debug, instrument, warn};

mod backoff;
pub mod certificate;
pub mod cluster_ingress;
pub mod config_watcher;
mod converge;
mod finalizer;
pub mod route;
mod triggers;

pub use backoff::BackoffStates;
pub use converge::{converge, ChildKind};
pub use triggers::{track_changes, tracker_trigger, trigger_channel};

use crate::{
    common::{format_resource, KeyOf, ResourceKey},
    config::Config,
    store::{ObjectStore, StoreError, StoreObject},
    tracker::TrackerError,
};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ControllerError {
    Store(#[from] StoreError),
    Tracker(#[from] TrackerError),
    NotOwned { kind: ChildKind, name: String },
    InvalidPayload(String),
    FinalizerPatchFailed(String),
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

pub(crate) type Result<T, E = ControllerError> = std::result::Result<T, E>;

const RECONCILE_LONG_WAIT: Duration = Duration::from_secs(3600);
const RECONCILE_ERROR_WAIT: Duration = Duration::from_secs(100);
const RECONCILE_MIN_ERROR_WAIT: Duration = Duration::from_secs(1);

pub struct LogContext<'a, K> {
    pub controller_name: &'a str,
    pub resource_key: &'a ResourceKey,
    pub version: Option<String>,
    pub resource_type: PhantomData<K>,
}

impl<K> std::fmt::Display for LogContext<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} resource_id: {}, version: {:?}",
            self.controller_name,
            format_resource::<K>(),
            self.resource_key,
            self.version
        )
    }
}

impl<'a, K: Resource> LogContext<'a, K> {
    pub fn new(controller_name: &'a str, resource_key: &'a ResourceKey, resource: &K) -> Self {
        Self {
            controller_name,
            resource_key,
            version: resource.meta().resource_version.clone(),
            resource_type: PhantomData,
        }
    }
}

/// One reconciler per top-level kind. The shared flow lives in [`reconcile_key`]; implementors only
/// provide defaulting, the body and, optionally, the deletion path.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    type Resource: StoreObject + HasStatus<Status = Self::Status>;
    type Status: PartialEq + Default + Clone + Debug + Send + Sync;
    type Store: ObjectStore;

    fn controller_name(&self) -> &str;

    fn store(&self) -> &Self::Store;

    fn config(&self) -> Arc<Config>;

    /// Structural defaults and condition initialization on the working copy.
    fn prepare(&self, resource: &mut Self::Resource);

    async fn reconcile(&self, resource: &mut Self::Resource, config: &Config) -> Result<Action>;

    async fn finalize(&self, _resource: &Self::Resource, _config: &Config) -> Result<Action> {
        Ok(Action::await_change())
    }
}

/// Loads the object behind `key`, reconciles a copy and writes status back when it changed.
///
/// The status is written even when the body failed; a failing status write wins over the body error.
#[instrument(skip_all, fields(kind = %key.kind, key = %key))]
pub async fn reconcile_key<R: Reconcile>(reconciler: &R, key: &ResourceKey) -> Result<Action> {
    let Some(original) = reconciler.store().get::<R::Resource>(key.namespace(), &key.name).await? else {
        debug!("{} {key} no longer exists", key.kind);
        return Ok(Action::await_change());
    };
    let config = reconciler.config();
    let mut resource = original.clone();
    let log_context = LogContext::new(reconciler.controller_name(), key, &original);

    if resource.meta().deletion_timestamp.is_some() {
        debug!("{log_context} deleting");
        return reconciler.finalize(&resource, &config).await;
    }

    reconciler.prepare(&mut resource);
    let result = reconciler.reconcile(&mut resource, &config).await;
    if let Err(e) = &result {
        warn!("{log_context} reconcile failed {e}");
    }

    if original.status() == resource.status() {
        debug!("{log_context} status not changed");
    } else {
        update_status(reconciler.store(), &resource).await.inspect_err(|e| warn!("{log_context} failed to update status {e}"))?;
    }
    result
}

/// State shared by the kube runtime callbacks of one controller.
pub struct ControllerContext<R> {
    pub reconciler: R,
    pub backoff: BackoffStates,
}

impl<R: Reconcile> ControllerContext<R> {
    pub fn new(reconciler: R) -> Self {
        Self {
            reconciler,
            backoff: BackoffStates::new(RECONCILE_MIN_ERROR_WAIT, RECONCILE_ERROR_WAIT),
        }
    }
}

/// Entry point handed to `Controller::run`. The cached object only provides the key.
pub async fn reconcile_cached<R: Reconcile>(resource: Arc<R::Resource>, ctx: Arc<ControllerContext<R>>) -> Result<Action> {
    let key = resource.resource_key();
    let action = reconcile_key(&ctx.reconciler, &key).await?;
    ctx.backoff.on_success(&key);
    Ok(action)
}

#[allow(clippy::needless_pass_by_value)]
pub fn error_policy<R: Reconcile>(resource: Arc<R::Resource>, err: &ControllerError, ctx: Arc<ControllerContext<R>>) -> Action {
    let key = resource.resource_key();
    let wait = ctx.backoff.on_error(&key);
    warn!("{}: {} {key} failed {err}, retrying in {wait:?}", ctx.reconciler.controller_name(), key.kind);
    Action::requeue(wait)
}

/// Copies the desired status onto the latest stored object so that writes made by the body
/// (finalizer patches, for example) do not turn the status write into a conflict.
async fn update_status<S, K>(store: &S, desired: &K) -> Result<()>
where
    S: ObjectStore,
    K: StoreObject + HasStatus,
    K::Status: PartialEq + Clone,
{
    let Some(mut latest) = store.get::<K>(desired.namespace().as_deref(), &desired.name_any()).await? else {
        return Ok(());
    };
    if latest.status() == desired.status() {
        return Ok(());
    }
    *latest.status_mut() = desired.status().cloned();
    store.update_status(&latest).await?;
    Ok(())
}
