// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Plumbing between the dependency tracker and the kube runtime work queues.

use std::{fmt::Debug, sync::Arc};

use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    runtime::{reflector::ObjectRef, watcher, WatchStreamExt},
    Api, Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    common::{KeyOf, ResourceKey},
    tracker::{Enqueue, Tracker},
};

const TRIGGER_CHANNEL_SIZE: usize = 1024;

pub fn trigger_channel<K>() -> (mpsc::Sender<ObjectRef<K>>, mpsc::Receiver<ObjectRef<K>>)
where
    K: Resource<DynamicType = ()>,
{
    mpsc::channel(TRIGGER_CHANNEL_SIZE)
}

/// Forwards tracker notifications for owners of kind `K` to a controller work queue.
///
/// A full channel drops the notification. Owners waiting on a dependency requeue themselves within
/// half a tracker lease, which also picks up a dropped change.
pub fn tracker_trigger<K>(sender: mpsc::Sender<ObjectRef<K>>) -> Enqueue
where
    K: Resource<DynamicType = ()> + 'static,
{
    Arc::new(move |key: ResourceKey| {
        if !key.is_kind::<K>() {
            return;
        }
        if let Err(e) = sender.try_send(key.object_ref::<K>()) {
            warn!("Unable to enqueue {} {key} {e}", key.kind);
        }
    })
}

/// Feeds every change of a watched kind into the tracker.
pub fn track_changes<K>(api: Api<K>, config: watcher::Config, tracker: Arc<Tracker>) -> BoxFuture<'static, ()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    watcher(api, config)
        .default_backoff()
        .touched_objects()
        .for_each(move |event| {
            match event {
                Ok(object) => {
                    if let Err(e) = tracker.on_changed(&object.resource_key()) {
                        warn!("Unable to notify owners of {} {e}", object.name_any());
                    }
                },
                Err(e) => warn!("Watch failed {e}"),
            }
            futures::future::ready(())
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use kube::runtime::reflector::ObjectRef;

    use super::{tracker_trigger, trigger_channel};
    use crate::{
        common::ResourceKey,
        crds::{Configuration, Route},
    };

    #[test]
    fn test_only_owner_kind_is_forwarded() {
        let (sender, mut receiver) = trigger_channel::<Route>();
        let enqueue = tracker_trigger(sender);

        enqueue(ResourceKey::new::<Configuration>("ns", "cfg"));
        enqueue(ResourceKey::new::<Route>("ns", "r"));

        assert_eq!(receiver.try_recv().ok(), Some(ObjectRef::<Route>::new("r").within("ns")));
        assert!(receiver.try_recv().is_err());
    }
}
