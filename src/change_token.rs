//! Change notification for cached routing artifacts.
//!
//! A change token answers one question: "is the thing I read still current?".
//! Tokens here are one-shot; once signaled they stay signaled and consumers
//! fetch a fresh token together with the fresh value.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Capability shared by every change token.
pub trait ChangeToken: Send + Sync {
    /// `true` once the associated value is stale.
    fn has_changed(&self) -> bool;

    /// Run `callback` when the token fires. Runs immediately, on the calling
    /// thread, if the token has already fired.
    fn register_change_callback(&self, callback: Callback);
}

struct SourceState {
    cancelled: AtomicBool,
    callbacks: Mutex<Vec<Callback>>,
}

/// The writer side of a [`CancellationChangeToken`].
#[derive(Clone)]
pub struct CancellationTokenSource {
    state: Arc<SourceState>,
}

impl CancellationTokenSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(SourceState {
                cancelled: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A reader handle observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationChangeToken {
        CancellationChangeToken {
            state: Arc::clone(&self.state),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Signal every token handed out by this source. Idempotent.
    ///
    /// Callbacks run on the calling thread after the flag is visible, and
    /// outside the registration lock so they may register new callbacks.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.state.callbacks.lock());
        for callback in callbacks {
            callback();
        }
    }
}

impl Default for CancellationTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationTokenSource")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Reader handle of a [`CancellationTokenSource`].
#[derive(Clone)]
pub struct CancellationChangeToken {
    state: Arc<SourceState>,
}

impl ChangeToken for CancellationChangeToken {
    fn has_changed(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    fn register_change_callback(&self, callback: Callback) {
        {
            let mut callbacks = self.state.callbacks.lock();
            // Checked under the lock so a concurrent cancel() either sees this
            // callback in the list or we see the flag.
            if !self.state.cancelled.load(Ordering::Acquire) {
                callbacks.push(callback);
                return;
            }
        }
        callback();
    }
}

impl fmt::Debug for CancellationChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationChangeToken")
            .field("has_changed", &self.has_changed())
            .finish()
    }
}

/// Keeps an [`on_change`] subscription alive; dropping it stops re-registration.
#[must_use = "dropping the subscription stops change notifications"]
pub struct ChangeTokenSubscription {
    disposed: Arc<AtomicBool>,
}

impl ChangeTokenSubscription {
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

impl Drop for ChangeTokenSubscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Invoke `consumer` every time the token produced by `producer` fires,
/// re-registering on the next token each time.
pub fn on_change<P, C>(producer: P, consumer: C) -> ChangeTokenSubscription
where
    P: Fn() -> Arc<dyn ChangeToken> + Send + Sync + 'static,
    C: Fn() + Send + Sync + 'static,
{
    let disposed = Arc::new(AtomicBool::new(false));
    let link = Arc::new(OnChangeLink {
        producer: Box::new(producer),
        consumer: Box::new(consumer),
        disposed: Arc::clone(&disposed),
    });
    OnChangeLink::register(link);
    ChangeTokenSubscription { disposed }
}

struct OnChangeLink {
    producer: Box<dyn Fn() -> Arc<dyn ChangeToken> + Send + Sync>,
    consumer: Box<dyn Fn() + Send + Sync>,
    disposed: Arc<AtomicBool>,
}

impl OnChangeLink {
    fn register(link: Arc<Self>) {
        if link.disposed.load(Ordering::Acquire) {
            return;
        }
        let token = (link.producer)();
        let next = Arc::clone(&link);
        token.register_change_callback(Box::new(move || {
            if next.disposed.load(Ordering::Acquire) {
                return;
            }
            (next.consumer)();
            OnChangeLink::register(next);
        }));
    }
}
