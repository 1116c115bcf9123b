//! Cooperative cancellation and loop-thread lifecycle handles.
//!
//! Every periodic loop receives a clone of one [`StopSignal`] and sleeps on
//! it between ticks with [`StopSignal::wait`], which returns early as soon
//! as a stop is requested.  Each loop thread is owned by a
//! [`ComponentHandle`] that the orchestrator joins with a bounded timeout,
//! so shutdown order and completion are observable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tankos_types::TankError;
use tracing::{debug, error, warn};

/// Granularity used while waiting for a thread to finish.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct StopInner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared stop flag with an interruptible sleep.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tankos_middleware::StopSignal;
///
/// let stop = StopSignal::new();
/// assert!(!stop.wait(Duration::from_millis(1)));
/// stop.request_stop();
/// assert!(stop.wait(Duration::from_secs(60))); // returns immediately
/// ```
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Ask every holder of this signal to wind down.  Idempotent.
    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        // Taking the lock orders the store before any waiter's re-check.
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `period` or until a stop is requested, whichever comes
    /// first.  Returns `true` when the caller should stop.
    pub fn wait(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut guard = self.inner.lock.lock();
        while !self.is_stop_requested() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_stop_requested()
    }
}

/// Owned handle to one running component thread.
pub struct ComponentHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl ComponentHandle {
    pub fn new(name: impl Into<String>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the thread to exit.
    ///
    /// Returns `true` when the thread finished (cleanly or by panicking; a
    /// panic is logged).  On timeout the thread is detached and `false` is
    /// returned.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(component = %self.name, ?timeout, "component did not stop in time; detaching");
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        match self.handle.join() {
            Ok(()) => debug!(component = %self.name, "component stopped"),
            Err(_) => error!(component = %self.name, "component thread panicked"),
        }
        true
    }
}

/// Spawn `body` on a named OS thread and wrap it in a [`ComponentHandle`].
///
/// # Errors
///
/// Returns [`TankError::Spawn`] if the OS refuses to create the thread.
pub fn spawn_component<F>(name: &str, body: F) -> Result<ComponentHandle, TankError>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| TankError::Spawn {
            component: name.to_string(),
            details: e.to_string(),
        })?;
    Ok(ComponentHandle::new(name, handle))
}
