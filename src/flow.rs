//! The two capability traits everything else is built from: a [`Fount`]
//! produces items and pushes them into a [`Drain`].
//!
//! Founts and drains are wired into pipelines with [`Fount::flow_to`] and
//! unwired with `flow_to(None)`. The producer drives: a drain never asks for
//! items, it can only slow the fount down by taking a [`Pause`] token or end
//! the relationship with [`Fount::stop_flow`].
//!
//! Forward references (fount to drain) are owning; back-references (drain to
//! fount) are weak, so a pipeline stays alive exactly as long as its source
//! does. Both directions are still detached explicitly through the
//! `flow_to(None)` / `flowing_from(None)` protocol so that pauses are
//! released deterministically rather than whenever a destructor happens to
//! run.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::pause::Pause;

/// A shared handle to a fount producing items of type `T`.
pub type FountRef<T> = Rc<dyn Fount<Item = T>>;

/// A shared handle to a drain consuming items of type `T`.
pub type DrainRef<T> = Rc<dyn Drain<Item = T>>;

pub(crate) type WeakFount<T> = Weak<dyn Fount<Item = T>>;

/// The producer side of a push-based stream.
///
/// A fount delivers items to at most one drain at a time. While any pause
/// token obtained from [`Fount::pause_flow`] is alive, the fount must not
/// deliver items.
pub trait Fount {
    /// The type of item this fount produces.
    type Item: 'static;

    /// The drain currently attached to this fount, if any.
    fn drain(&self) -> Option<DrainRef<Self::Item>>;

    /// Attach `drain` to this fount, detaching any previous drain first.
    ///
    /// Passing `None` detaches the current drain without attaching a new
    /// one. Attaching synchronously announces the fount to the drain via
    /// [`Drain::flowing_from`], which may immediately deliver buffered
    /// items.
    ///
    /// The drain holds only a weak reference back to this fount; the
    /// caller keeps the fount alive for as long as the stream should
    /// flow.
    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<Self::Item>>);

    /// Obtain a pause token; the fount stays silent until every outstanding
    /// token has been released.
    fn pause_flow(&self) -> Pause;

    /// Ask the flow to end. The request propagates to the ultimate source,
    /// which answers with a single [`Drain::flow_stopped`] notification
    /// carrying [`StopReason::StopFlowCalled`].
    fn stop_flow(&self);
}

/// The consumer side of a push-based stream.
pub trait Drain {
    /// The type of item this drain accepts.
    type Item: 'static;

    /// The fount currently feeding this drain, if any.
    fn fount(&self) -> Option<FountRef<Self::Item>>;

    /// A fount has attached itself (or detached, when `fount` is `None`).
    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<Self::Item>>);

    /// An item has arrived from the attached fount.
    fn receive(&self, item: Self::Item);

    /// The flow has ended; no further `receive` calls are legal. Delivered
    /// at most once per flow.
    fn flow_stopped(&self, reason: StopReason);
}

/// Why a flow came to an end, carried by [`Drain::flow_stopped`].
#[derive(Clone, Debug)]
pub enum StopReason {
    /// [`Fount::stop_flow`] was called somewhere downstream.
    StopFlowCalled,
    /// A memory fount ran out of items.
    EndOfIteration,
    /// A tube failed while processing; the pipeline was torn down.
    Error(Rc<dyn std::error::Error>),
}

impl StopReason {
    /// Wrap an arbitrary error as a stop reason.
    pub fn error(error: impl Into<Box<dyn std::error::Error>>) -> Self {
        StopReason::Error(Rc::from(error.into()))
    }

    /// True if the flow ended because `stop_flow` was called.
    pub fn is_stop_flow_called(&self) -> bool {
        matches!(self, StopReason::StopFlowCalled)
    }

    /// True if the flow ended because a memory fount was exhausted.
    pub fn is_end_of_iteration(&self) -> bool {
        matches!(self, StopReason::EndOfIteration)
    }

    /// True if the flow was torn down by a failing tube.
    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::Error(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StopFlowCalled => write!(f, "stop_flow was called"),
            StopReason::EndOfIteration => write!(f, "the fount was exhausted"),
            StopReason::Error(error) => write!(f, "a tube failed: {error}"),
        }
    }
}

/// Identity comparison on founts; fat-pointer metadata is ignored.
pub(crate) fn same_fount<T: 'static>(a: &FountRef<T>, b: &FountRef<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Identity comparison on drains; fat-pointer metadata is ignored.
pub(crate) fn same_drain<T: 'static>(a: &DrainRef<T>, b: &DrainRef<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// The fount-side peer slot: owns the reference to the current drain and
/// implements the attach/detach choreography of `flow_to`.
pub(crate) struct DrainLink<T: 'static> {
    drain: RefCell<Option<DrainRef<T>>>,
}

impl<T: 'static> DrainLink<T> {
    pub(crate) fn new() -> Self {
        DrainLink {
            drain: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<DrainRef<T>> {
        self.drain.borrow().clone()
    }

    /// Record `drain` as the new peer of `this`, then detach the previous
    /// drain if it was still bound to `this`, then announce the flow to the
    /// new drain. The new peer is recorded first so that re-entrant peers
    /// observe the updated wiring.
    pub(crate) fn begin_flowing_to(&self, this: FountRef<T>, drain: Option<DrainRef<T>>) {
        let old = {
            let mut slot = self.drain.borrow_mut();
            std::mem::replace(&mut *slot, drain.clone())
        };
        if let Some(old) = old {
            let replaced = match &drain {
                Some(new) => !same_drain(&old, new),
                None => true,
            };
            if replaced && old.fount().is_some_and(|f| same_fount(&f, &this)) {
                Rc::clone(&old).flowing_from(None);
            }
        }
        if let Some(drain) = drain {
            drain.flowing_from(Some(this));
        }
    }
}

/// The drain-side peer slot: a weak back-reference to the current fount and
/// the symmetric attach/detach choreography of `flowing_from`.
pub(crate) struct FountLink<T: 'static> {
    fount: RefCell<Option<WeakFount<T>>>,
}

impl<T: 'static> FountLink<T> {
    pub(crate) fn new() -> Self {
        FountLink {
            fount: RefCell::new(None),
        }
    }

    pub(crate) fn get(&self) -> Option<FountRef<T>> {
        self.fount.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Record `fount` as the new peer of `this`, then detach the previous
    /// fount if it was still flowing to `this`.
    pub(crate) fn begin_flowing_from(&self, this: DrainRef<T>, fount: Option<FountRef<T>>) {
        let old = self.get();
        *self.fount.borrow_mut() = fount.as_ref().map(Rc::downgrade);
        if let Some(old) = old {
            let replaced = match &fount {
                Some(new) => !same_fount(&old, new),
                None => true,
            };
            if replaced && old.drain().is_some_and(|d| same_drain(&d, &this)) {
                Rc::clone(&old).flow_to(None);
            }
        }
    }
}
