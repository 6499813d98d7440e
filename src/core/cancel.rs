//! Cancellation signals and their registration with the pool.
//!
//! Two signal styles are accepted: a single-shot [`CancellationToken`] and an
//! event-style [`AbortEmitter`]. Both are folded into [`CancelSignal`]; the
//! only difference between them is how the pool subscribes. Either way the
//! pool's abort callback runs at most once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::runtime::TokioSpawner;

type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a listener registered on an [`AbortEmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct EmitterState {
    aborted: bool,
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Event-style abort signal: listeners subscribe and are notified once when
/// [`abort`](Self::abort) is called.
///
/// Cloning yields another handle to the same emitter.
#[derive(Clone, Default)]
pub struct AbortEmitter {
    state: Arc<Mutex<EmitterState>>,
}

impl AbortEmitter {
    /// Create an emitter in the not-aborted state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the abort notification. Only the first call notifies listeners.
    pub fn abort(&self) {
        let listeners = {
            let mut state = self.state.lock();
            if state.aborted {
                return;
            }
            state.aborted = true;
            std::mem::take(&mut state.listeners)
        };
        // Listeners run outside the emitter lock so they may take other locks.
        for (_, listener) in listeners {
            listener();
        }
    }

    /// Whether [`abort`](Self::abort) has been called.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Subscribe to the abort notification.
    ///
    /// If the emitter has already fired, the listener runs immediately and
    /// `None` is returned.
    pub fn on_abort(&self, listener: impl FnOnce() + Send + 'static) -> Option<ListenerId> {
        let mut state = self.state.lock();
        if state.aborted {
            drop(state);
            listener();
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Box::new(listener)));
        Some(ListenerId(id))
    }

    /// Unsubscribe a listener. Returns `false` if it already ran or was removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id.0);
        state.listeners.len() != before
    }

    /// Number of listeners still waiting for the abort notification.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }
}

impl fmt::Debug for AbortEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AbortEmitter")
            .field("aborted", &state.aborted)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// External cancellation signal attached to a task at submission.
#[derive(Debug, Clone)]
pub enum CancelSignal {
    /// Single-shot token; cancellation fires when the token is cancelled.
    Token(CancellationToken),
    /// Event emitter; cancellation fires on its abort notification.
    Emitter(AbortEmitter),
}

impl CancelSignal {
    /// Whether the signal has already fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Token(token) => token.is_cancelled(),
            Self::Emitter(emitter) => emitter.is_aborted(),
        }
    }

    /// Subscribe `on_abort` to this signal.
    ///
    /// Tokens are watched by a task on the pool's watcher runtime; emitters
    /// get a listener. Call [`Registration::release`] once the task resolves.
    pub(crate) fn register(
        self,
        spawner: &TokioSpawner,
        on_abort: impl FnOnce() + Send + 'static,
    ) -> Registration {
        match self {
            Self::Token(token) => {
                let watch = spawner.spawn(async move {
                    token.cancelled().await;
                    on_abort();
                });
                Registration::Watch(watch)
            }
            Self::Emitter(emitter) => match emitter.on_abort(on_abort) {
                Some(id) => Registration::Listener { emitter, id },
                None => Registration::Fired,
            },
        }
    }
}

impl From<CancellationToken> for CancelSignal {
    fn from(token: CancellationToken) -> Self {
        Self::Token(token)
    }
}

impl From<AbortEmitter> for CancelSignal {
    fn from(emitter: AbortEmitter) -> Self {
        Self::Emitter(emitter)
    }
}

/// A live subscription held by a task until it resolves.
///
/// Deadline timers use the same type since they take the same cancellation
/// path.
pub(crate) enum Registration {
    /// Watcher task on the watcher runtime (token or deadline).
    Watch(tokio::task::AbortHandle),
    /// Listener on an emitter.
    Listener { emitter: AbortEmitter, id: ListenerId },
    /// The signal had already fired during registration.
    Fired,
}

impl Registration {
    /// Drop the subscription so the callback can no longer run.
    pub fn release(self) {
        match self {
            Self::Watch(handle) => handle.abort(),
            Self::Listener { emitter, id } => {
                emitter.remove_listener(id);
            }
            Self::Fired => {}
        }
    }
}
