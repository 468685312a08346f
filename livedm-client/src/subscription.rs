//! Single-handler slots with owned unsubscribe tokens.

use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler<T> = Arc<dyn Fn(&T) -> Result<(), HandlerError> + Send + Sync>;

type Slot<T> = Mutex<Option<(Uuid, Handler<T>)>>;

/// Holds at most one active handler for values of type `T`.
///
/// Registering replaces the previous handler. Handler failures, including
/// panics, are logged and never reach the caller of [`HandlerSlot::dispatch`].
pub struct HandlerSlot<T> {
    inner: Arc<Slot<T>>,
}

impl<T: 'static> HandlerSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Installs `handler` as the active handler.
    pub fn register<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let handler: Handler<T> = Arc::new(handler);
        let previous = self.inner.lock().replace((id, handler));
        if previous.is_some() {
            tracing::debug!("Replaced active handler with {}", id);
        }

        let weak: Weak<Slot<T>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            release: Some(Box::new(move || {
                if let Some(slot) = weak.upgrade() {
                    let mut guard = slot.lock();
                    if matches!(guard.as_ref(), Some((active, _)) if *active == id) {
                        *guard = None;
                    }
                }
            })),
        }
    }

    /// Invokes the active handler, if any. Returns whether one was called.
    pub fn dispatch(&self, value: &T) -> bool {
        let Some(handler) = self.inner.lock().as_ref().map(|(_, h)| h.clone()) else {
            return false;
        };

        match catch_unwind(AssertUnwindSafe(|| handler(value))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Handler failed: {}", e),
            Err(panic) => tracing::error!("Handler panicked: {}", panic_message(&*panic)),
        }
        true
    }
}

impl<T: 'static> Default for HandlerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Owned registration token.
///
/// Dropping the token (or calling [`Subscription::unsubscribe`]) removes the
/// handler, unless another registration has replaced it since.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: Uuid,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
