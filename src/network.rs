//! Connectivity state tracking and reconnect fan-out.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Platform connectivity primitive, implemented by the embedding layer.
///
/// `online` is a synchronous probe used once at monitor start; afterwards
/// the watch stream is the single source of truth.
pub trait Connectivity: Send + Sync {
  /// Current link status.
  fn online(&self) -> bool;

  /// Stream of status changes.
  fn watch(&self) -> watch::Receiver<bool>;
}

/// A [`Connectivity`] source the embedding platform layer drives by hand,
/// forwarding whatever connect/disconnect events the OS provides.
pub struct ManualConnectivity {
  tx: watch::Sender<bool>,
}

impl ManualConnectivity {
  pub fn new(initial: bool) -> Self {
    let (tx, _) = watch::channel(initial);
    Self { tx }
  }

  /// Report a platform connectivity event.
  pub fn set_online(&self, online: bool) {
    self.tx.send_replace(online);
  }
}

impl Connectivity for ManualConnectivity {
  fn online(&self) -> bool {
    *self.tx.borrow()
  }

  fn watch(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

type Listener = dyn Fn(bool) + Send + Sync;

struct Inner {
  online: AtomicBool,
  subscribers: Mutex<Vec<(u64, Arc<Listener>)>>,
  next_subscriber: AtomicU64,
}

/// Tracks the process-wide online/offline state and notifies subscribers
/// on transitions.
///
/// One monitor is constructed per process and handed by reference to
/// whatever needs connectivity: the offline facade routes operations on
/// [`online`](NetworkMonitor::online), UI layers subscribe to render a
/// banner, and [`start`](NetworkMonitor::start) turns reconnects into queue
/// drains. Until a platform event arrives the state is optimistically
/// "online"; `start` narrows the false-online window by probing the
/// connectivity source up front.
#[derive(Clone)]
pub struct NetworkMonitor {
  inner: Arc<Inner>,
}

impl Default for NetworkMonitor {
  fn default() -> Self {
    Self::new()
  }
}

impl NetworkMonitor {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Inner {
        online: AtomicBool::new(true),
        subscribers: Mutex::new(Vec::new()),
        next_subscriber: AtomicU64::new(0),
      }),
    }
  }

  /// Current cached state. Never re-probes the platform.
  pub fn online(&self) -> bool {
    self.inner.online.load(Ordering::SeqCst)
  }

  /// Register a listener invoked with the new state on every transition.
  ///
  /// Listeners are called in subscription order and are not deduplicated.
  /// Dropping the returned [`Subscription`] deregisters the listener.
  pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
    let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
    self
      .subscribers()
      .push((id, Arc::new(listener) as Arc<Listener>));

    Subscription {
      inner: Arc::downgrade(&self.inner),
      id,
    }
  }

  /// Report a platform connectivity change. No-op unless the state
  /// actually flips; on a flip every subscriber is notified.
  ///
  /// This only updates state and fans out. Automatic queue drainage on
  /// reconnect is wired by [`start`](NetworkMonitor::start).
  pub fn set_online(&self, online: bool) {
    self.apply(online);
  }

  /// Consume connectivity events, keeping the state current and running
  /// `on_reconnect` after each offline-to-online transition.
  ///
  /// The initial state is seeded from a synchronous probe, so subscribers
  /// registered beforehand may be notified before this returns. Each
  /// reconnect action runs as its own task, tracked so that shutting the
  /// handle down aborts both the event loop and any in-flight action.
  /// Must be called from within a tokio runtime.
  pub fn start<F, Fut>(&self, connectivity: &dyn Connectivity, on_reconnect: F) -> MonitorHandle
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.apply(connectivity.online());

    let mut events = connectivity.watch();
    let monitor = self.clone();
    let reconnect_task: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
    let reconnect_slot = Arc::clone(&reconnect_task);

    let task = tokio::spawn(async move {
      while events.changed().await.is_ok() {
        let online = *events.borrow_and_update();
        if monitor.apply(online) && online {
          let action = tokio::spawn(on_reconnect());
          // A finished previous pass is simply dropped here.
          *reconnect_slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(action);
        }
      }
      debug!("connectivity stream closed, monitor loop ending");
    });

    MonitorHandle {
      task,
      reconnect_task,
    }
  }

  /// Apply a state change; returns whether a transition happened.
  fn apply(&self, online: bool) -> bool {
    let previous = self.inner.online.swap(online, Ordering::SeqCst);
    if previous == online {
      return false;
    }

    if online {
      info!("connectivity restored");
    } else {
      warn!("connectivity lost");
    }

    // Snapshot so listeners run outside the lock and may themselves
    // subscribe or unsubscribe.
    let listeners: Vec<Arc<Listener>> = self
      .subscribers()
      .iter()
      .map(|(_, listener)| Arc::clone(listener))
      .collect();
    for listener in listeners {
      listener(online);
    }

    true
  }

  fn subscribers(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Arc<Listener>)>> {
    self
      .inner
      .subscribers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

/// Registration guard returned by [`NetworkMonitor::subscribe`].
#[must_use = "dropping a Subscription immediately deregisters the listener"]
pub struct Subscription {
  inner: Weak<Inner>,
  id: u64,
}

impl Subscription {
  /// Deregister the listener now.
  pub fn cancel(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.upgrade() {
      inner
        .subscribers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .retain(|(id, _)| *id != self.id);
    }
  }
}

/// Handle to a running monitor loop started by [`NetworkMonitor::start`].
///
/// Dropping the handle shuts the loop down, aborting any in-flight
/// reconnect action with it.
pub struct MonitorHandle {
  task: JoinHandle<()>,
  reconnect_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MonitorHandle {
  /// Stop consuming connectivity events and abort any in-flight reconnect
  /// action.
  pub fn shutdown(&self) {
    self.task.abort();
    if let Some(action) = self
      .reconnect_task
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      action.abort();
    }
  }
}

impl Drop for MonitorHandle {
  fn drop(&mut self) {
    self.shutdown();
  }
}
