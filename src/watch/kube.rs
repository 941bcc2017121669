//! Kubernetes-backed subscription factories
//!
//! Adapts a `kube` watcher stream to the monitor's listener interface.
//! Each subscription runs in its own tokio task; closing the handle aborts
//! the task.

use std::fmt::Debug;

use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::watcher;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::monitor::{WatchAction, WatchHandle, WatcherListener};
use crate::error::{Error, Result};

/// Watch subscription backed by a spawned tokio task
pub struct KubeWatch {
    task: JoinHandle<()>,
}

impl WatchHandle for KubeWatch {
    fn close(&mut self) {
        self.task.abort();
    }
}

impl Drop for KubeWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscription factory watching all resources of type `T` in a namespace
///
/// `handler` receives every delivered event; the listener is notified
/// alongside it so the monitor's retry accounting stays current. The kube
/// watcher retries internally, but the first error it yields ends the
/// subscription here so retry bookkeeping lives in the monitor alone.
pub fn namespaced_watch_factory<T, H>(
    client: Client,
    namespace: &str,
    handler: H,
) -> impl Fn(WatcherListener<T>) -> Result<Box<dyn WatchHandle>> + Send + Sync + 'static
where
    T: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    T::DynamicType: Default,
    H: Fn(WatchAction, &T) + Clone + Send + Sync + 'static,
{
    let namespace = namespace.to_string();
    move |listener: WatcherListener<T>| {
        let api: Api<T> = Api::namespaced(client.clone(), &namespace);
        let handler = handler.clone();
        let task = tokio::spawn(async move {
            let mut stream = watcher(api, watcher::Config::default()).boxed();
            while let Some(item) = stream.next().await {
                match item {
                    Ok(watcher::Event::Apply(resource))
                    | Ok(watcher::Event::InitApply(resource)) => {
                        handler(WatchAction::Applied, &resource);
                        listener.event_received(WatchAction::Applied, &resource);
                    }
                    Ok(watcher::Event::Delete(resource)) => {
                        handler(WatchAction::Deleted, &resource);
                        listener.event_received(WatchAction::Deleted, &resource);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        listener.watcher_closed(Some(Error::WatchError(err.to_string())));
                        return;
                    }
                }
            }
            listener.watcher_closed(None);
        });
        Ok(Box::new(KubeWatch { task }) as Box<dyn WatchHandle>)
    }
}
