//! Reference-counted pause plumbing.
//!
//! Several parties may independently want the same fount to stay silent; a
//! [`Pauser`] keeps count and fires its callbacks only on the first pause
//! and the last resume. Each call to [`Pauser::pause`] yields a [`Pause`]
//! token that releases its share of the pause when consumed or dropped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct PauserInner {
    pauses: Cell<usize>,
    on_first_pause: Box<dyn Fn()>,
    on_last_resume: Box<dyn Fn()>,
}

/// Counter-based pause aggregation with edge-triggered callbacks.
///
/// `on_first_pause` fires when the live-token count goes from zero to one,
/// `on_last_resume` when it returns to zero. The callbacks may re-enter the
/// pauser: a resume callback taking a fresh pause will see the counter at
/// one and trigger `on_first_pause` again. That is the intended behavior:
/// the edge-triggering invariant holds across the external boundary, not
/// across re-entry within a single call.
#[derive(Clone)]
pub struct Pauser {
    inner: Rc<PauserInner>,
}

impl Pauser {
    /// Create a pauser with the two edge callbacks.
    pub fn new(on_first_pause: impl Fn() + 'static, on_last_resume: impl Fn() + 'static) -> Self {
        Pauser {
            inner: Rc::new(PauserInner {
                pauses: Cell::new(0),
                on_first_pause: Box::new(on_first_pause),
                on_last_resume: Box::new(on_last_resume),
            }),
        }
    }

    /// Take a pause. The underlying activity stays paused until every token
    /// handed out by this pauser has been released.
    pub fn pause(&self) -> Pause {
        let count = self.inner.pauses.get() + 1;
        self.inner.pauses.set(count);
        if count == 1 {
            (self.inner.on_first_pause)();
        }
        Pause {
            inner: Some(Rc::clone(&self.inner)),
        }
    }
}

impl std::fmt::Debug for Pauser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pauser")
            .field("pauses", &self.inner.pauses.get())
            .finish()
    }
}

/// A single-use reason for a fount to stay silent.
///
/// The token is linear: it is released exactly once, either explicitly via
/// [`Pause::unpause`] or implicitly when dropped. Releasing the same pause
/// twice is therefore not expressible.
#[must_use = "dropping a pause token releases it immediately"]
pub struct Pause {
    inner: Option<Rc<PauserInner>>,
}

impl Pause {
    /// A token that pauses nothing and releases nothing.
    pub fn no_op() -> Self {
        Pause { inner: None }
    }

    /// Release this pause, resuming the flow if it was the last one.
    pub fn unpause(self) {
        drop(self);
    }
}

impl Drop for Pause {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let count = inner.pauses.get() - 1;
            inner.pauses.set(count);
            if count == 0 {
                (inner.on_last_resume)();
            }
        }
    }
}

impl std::fmt::Debug for Pause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pause")
            .field("live", &self.inner.is_some())
            .finish()
    }
}

/// Coalesces repeated pause requests into at most one live token.
///
/// Used wherever a composite must pause its upstream "because there is no
/// downstream": many code paths may notice the condition, but the upstream
/// should only be paused once.
pub struct OncePause {
    pauser: Pauser,
    held: RefCell<Option<Pause>>,
}

impl OncePause {
    /// Wrap a pauser.
    pub fn new(pauser: Pauser) -> Self {
        OncePause {
            pauser,
            held: RefCell::new(None),
        }
    }

    /// Take a pause unless one is already held. Idempotent.
    pub fn pause_once(&self) {
        if self.held.borrow().is_some() {
            return;
        }
        let pause = self.pauser.pause();
        let previous = self.held.borrow_mut().replace(pause);
        drop(previous);
    }

    /// Release the held pause, if any.
    pub fn maybe_unpause(&self) {
        let held = self.held.borrow_mut().take();
        drop(held);
    }
}
