//! Resilient watch plumbing for the operator's event streams

mod kube;
mod monitor;


pub use self::kube::{namespaced_watch_factory, KubeWatch};
pub use self::monitor::{
    WatchAction, WatchHandle, WatcherListener, WatcherMonitor, MAX_RETRIES,
};
