//! Self-healing wrapper around watch subscriptions
//!
//! A `WatcherMonitor` keeps one live subscription to an external event
//! stream. When the subscription dies it is recreated immediately, up to a
//! bounded number of consecutive attempts; any successfully delivered
//! event resets the budget. The closed flag and the retry counter live
//! under one mutex so an explicit `close` can never race a reconnection
//! into leaking a fresh subscription.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::error::Result;

/// Consecutive reconnection attempts allowed before giving up
pub const MAX_RETRIES: u32 = 5;

/// Change notification delivered to a watch listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchAction {
    Applied,
    Deleted,
}

/// A live subscription that can be shut down
pub trait WatchHandle: Send {
    fn close(&mut self);
}

type Creator<T> = dyn Fn(WatcherListener<T>) -> Result<Box<dyn WatchHandle>> + Send + Sync;
type GiveUp = dyn Fn() + Send + Sync;

struct MonitorState {
    retries: u32,
    closed: bool,
    gave_up: bool,
    watch: Option<Box<dyn WatchHandle>>,
}

struct MonitorShared<T> {
    creator: Box<Creator<T>>,
    give_up: Box<GiveUp>,
    state: Mutex<MonitorState>,
}

impl<T> MonitorShared<T> {
    fn lock_state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconnection loop; iterative so a factory that fails synchronously
    /// cannot grow the call stack
    fn on_watcher_closed(shared: &Arc<Self>) {
        loop {
            {
                let mut state = shared.lock_state();
                if state.closed || state.gave_up {
                    return;
                }
                state.retries += 1;
                if state.retries > MAX_RETRIES {
                    state.gave_up = true;
                    state.watch = None;
                    drop(state);
                    warn!("Giving up after {} consecutive watch failures", MAX_RETRIES);
                    (shared.give_up)();
                    return;
                }
            }

            let listener = WatcherListener {
                shared: Arc::downgrade(shared),
            };
            match (shared.creator)(listener) {
                Ok(watch) => {
                    let leftover = {
                        let mut state = shared.lock_state();
                        if state.closed || state.gave_up {
                            Some(watch)
                        } else {
                            state.watch = Some(watch);
                            None
                        }
                    };
                    // The monitor was closed while the subscription was
                    // being created; shut the fresh one down immediately.
                    if let Some(mut watch) = leftover {
                        watch.close();
                    }
                    return;
                }
                Err(err) => {
                    debug!("Watch recreation failed: {}", err);
                }
            }
        }
    }
}

/// Keeps a watch subscription alive across transient failures
pub struct WatcherMonitor<T> {
    shared: Arc<MonitorShared<T>>,
}

impl<T> WatcherMonitor<T> {
    /// Create the monitor and open the first subscription
    ///
    /// A failure to create the initial subscription is surfaced to the
    /// caller rather than retried.
    pub fn new<C, G>(creator: C, give_up: G) -> Result<Self>
    where
        C: Fn(WatcherListener<T>) -> Result<Box<dyn WatchHandle>> + Send + Sync + 'static,
        G: Fn() + Send + Sync + 'static,
    {
        let shared = Arc::new(MonitorShared {
            creator: Box::new(creator),
            give_up: Box::new(give_up),
            state: Mutex::new(MonitorState {
                retries: 0,
                closed: false,
                gave_up: false,
                watch: None,
            }),
        });

        let listener = WatcherListener {
            shared: Arc::downgrade(&shared),
        };
        let watch = (shared.creator)(listener)?;
        shared.lock_state().watch = Some(watch);

        Ok(Self { shared })
    }

    /// Stop reconnecting and release the current subscription; idempotent
    pub fn close(&self) {
        let watch = {
            let mut state = self.shared.lock_state();
            state.closed = true;
            state.watch.take()
        };
        if let Some(mut watch) = watch {
            watch.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn retry_count(&self) -> u32 {
        self.shared.lock_state().retries
    }
}

impl<T> Drop for WatcherMonitor<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Listener handed to the subscription factory
///
/// The subscription implementation calls `event_received` for every
/// delivered event and `watcher_closed` exactly once when the stream
/// terminates.
pub struct WatcherListener<T> {
    shared: Weak<MonitorShared<T>>,
}

impl<T> Clone for WatcherListener<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> WatcherListener<T> {
    /// Resets the reconnection budget
    pub fn event_received(&self, _action: WatchAction, _resource: &T) {
        if let Some(shared) = self.shared.upgrade() {
            shared.lock_state().retries = 0;
        }
    }

    /// Signals that the underlying subscription terminated
    pub fn watcher_closed(&self, error: Option<crate::Error>) {
        if let Some(err) = error {
            warn!("Watch subscription closed: {}", err);
        }
        if let Some(shared) = self.shared.upgrade() {
            MonitorShared::on_watcher_closed(&shared);
        }
    }
}
