//! The adapter that turns a [`Tube`] into a drain-plus-fount pair.
//!
//! A siphon owns the tube, a queue of pending (not yet delivered) output,
//! and the pause state binding the two sides together. It is one object
//! exposing two capability views: [`SiphonDrain`] faces the upstream fount
//! and [`SiphonFount`] faces the downstream drain. [`series`](crate::series)
//! is the public way to build one.
//!
//! The invariants the siphon is responsible for:
//!
//! * output emitted by `started` precedes output of any `received` call,
//!   and output of `stopped` precedes the terminal notification;
//! * while the siphon's fount is paused, or while it has no drain, emitted
//!   output is buffered and the upstream is paused;
//! * the terminal notification reaches the downstream at most once;
//! * all of the above hold when a drain re-enters the siphon (pausing,
//!   stopping, re-flowing or diverting it) from inside `receive`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use tracing::error;

use crate::flow::{Drain, DrainLink, DrainRef, Fount, FountLink, FountRef, StopReason};
use crate::pause::{OncePause, Pause, Pauser};
use crate::tube::{Signal, Tube, TubeResult};

type PendingIter<T> = Box<dyn Iterator<Item = Signal<T>>>;

/// Result of popping from [`PendingValues`].
pub(crate) enum Popped<T> {
    /// The next buffered signal.
    Value(Signal<T>),
    /// The queue is suspended; nothing was consumed.
    Suspended,
    /// The queue is drained.
    Finished,
}

/// An ordered queue of lazy emissions, supporting suspension.
///
/// When suspended, popping never advances any underlying iterator unless
/// the caller explicitly overrides (the one legitimate use is ejecting the
/// buffer for diversion).
pub(crate) struct PendingValues<T: 'static> {
    deque: RefCell<VecDeque<PendingIter<T>>>,
    suspended: Cell<bool>,
    epoch: Cell<u64>,
}

impl<T: 'static> PendingValues<T> {
    fn new() -> Self {
        PendingValues {
            deque: RefCell::new(VecDeque::new()),
            suspended: Cell::new(false),
            epoch: Cell::new(0),
        }
    }

    fn suspend(&self) {
        self.suspended.set(true);
    }

    fn resume(&self) {
        self.suspended.set(false);
    }

    fn append(&self, iterator: PendingIter<T>) {
        self.deque.borrow_mut().push_back(iterator);
    }

    fn clear(&self) {
        self.deque.borrow_mut().clear();
        self.epoch.set(self.epoch.get() + 1);
    }

    fn is_empty(&self) -> bool {
        self.deque.borrow().is_empty()
    }

    /// Pop the next signal from the leftmost emission.
    ///
    /// Advancing an emission may re-enter the siphon and suspend or clear
    /// this queue, so the suspension flag is re-checked after `next` and a
    /// value produced under a fresh suspension is pushed back unconsumed.
    fn pop(&self, even_if_suspended: bool) -> Popped<T> {
        if self.suspended.get() && !even_if_suspended {
            return Popped::Suspended;
        }
        loop {
            let head = self.deque.borrow_mut().pop_front();
            let Some(mut head) = head else {
                return Popped::Finished;
            };
            let epoch = self.epoch.get();
            let step = head.next();
            if self.epoch.get() != epoch {
                // The queue was cleared out from under us; the in-flight
                // emission and its value go with it.
                continue;
            }
            match step {
                None => continue,
                Some(signal) => {
                    if self.suspended.get() && !even_if_suspended {
                        let mut deque = self.deque.borrow_mut();
                        deque.push_front(head);
                        deque.push_front(Box::new(std::iter::once(signal)));
                        return Popped::Suspended;
                    }
                    self.deque.borrow_mut().push_front(head);
                    return Popped::Value(signal);
                }
            }
        }
    }

    /// Drain the whole queue, suspension notwithstanding, dropping skip
    /// markers.
    fn eject(&self) -> Vec<T> {
        let mut items = Vec::new();
        loop {
            match self.pop(true) {
                Popped::Finished => return items,
                Popped::Value(Signal::Item(item)) => items.push(item),
                Popped::Value(Signal::Skip) => {}
                Popped::Suspended => unreachable!("pop(true) never reports suspension"),
            }
        }
    }
}

/// Shared state behind both capability views of one siphon.
pub(crate) struct SiphonCore<T: Tube> {
    tube: T,
    pending: PendingValues<T::Out>,
    upstream: FountLink<T::In>,
    downstream: DrainLink<T::Out>,
    can_process_input: Cell<bool>,
    ever_started: Cell<bool>,
    unbuffering: Cell<bool>,
    terminal_sent: Cell<bool>,
    stop_reason: RefCell<Option<StopReason>>,
    pause_on_pause: RefCell<Option<Pause>>,
    pauser: Pauser,
    no_drain_pause: OncePause,
}

impl<T: Tube> SiphonCore<T> {
    pub(crate) fn tube(&self) -> &T {
        &self.tube
    }

    pub(crate) fn upstream_fount(&self) -> Option<FountRef<T::In>> {
        self.upstream.get()
    }

    pub(crate) fn eject_pending(&self) -> Vec<T::Out> {
        self.pending.eject()
    }

    fn no_more(&self, input: bool, output: bool) {
        if input {
            self.can_process_input.set(false);
        }
        if output {
            self.pending.clear();
        }
    }

    fn actually_pause(&self) {
        self.pending.suspend();
        let pause = match self.upstream.get() {
            Some(fount) => fount.pause_flow(),
            None => Pause::no_op(),
        };
        let previous = self.pause_on_pause.borrow_mut().replace(pause);
        drop(previous);
    }

    fn actually_resume(&self) {
        let held = self.pause_on_pause.borrow_mut().take();
        self.pending.resume();
        self.unbuffer();
        drop(held);
    }

    /// Run one tube callback and feed its emission into the pipeline.
    fn deliver_from(&self, source: impl FnOnce(&T) -> TubeResult<T::Out>) {
        match source(&self.tube) {
            Err(error) => {
                error!(message = "Tube failed while delivering.", %error);
                if let Some(fount) = self.upstream.get() {
                    fount.stop_flow();
                }
                if let Some(drain) = self.downstream.get()
                    && !self.terminal_sent.replace(true)
                {
                    drain.flow_stopped(StopReason::Error(Rc::from(error)));
                }
            }
            Ok(emission) => {
                if let Some(iterator) = emission.into_inner() {
                    self.pending.append(iterator);
                    if self.downstream.get().is_none() {
                        self.no_drain_pause.pause_once();
                    }
                }
                self.unbuffer();
            }
        }
    }

    /// Deliver buffered output for as long as we are allowed to.
    ///
    /// Re-entrancy-guarded; each iteration re-reads the pending, pause and
    /// downstream state rather than caching it, because any `receive` call
    /// may change all three.
    fn unbuffer(&self) {
        if self.unbuffering.get() {
            return;
        }
        self.unbuffering.set(true);
        loop {
            match self.pending.pop(false) {
                Popped::Suspended => break,
                Popped::Value(Signal::Skip) => continue,
                Popped::Finished => {
                    let reason = self.stop_reason.borrow_mut().take();
                    if let Some(reason) = reason {
                        self.end_of_line(reason);
                    }
                    break;
                }
                Popped::Value(Signal::Item(item)) => {
                    if let Some(drain) = self.downstream.get() {
                        drain.receive(item);
                    }
                }
            }
        }
        self.unbuffering.set(false);
    }

    /// The buffered output is gone and the flow is over; tell downstream.
    fn end_of_line(&self, reason: StopReason) {
        self.no_more(true, true);
        if let Some(drain) = self.downstream.get()
            && !self.terminal_sent.replace(true)
        {
            drain.flow_stopped(reason);
        }
    }
}

/// Build a siphon around `tube`, returning its two capability views.
pub(crate) fn siphon<T: Tube>(tube: T) -> (Rc<SiphonDrain<T>>, Rc<SiphonFount<T>>) {
    let core = Rc::new_cyclic(|weak: &Weak<SiphonCore<T>>| {
        let on_pause = weak.clone();
        let on_resume = weak.clone();
        let pauser = Pauser::new(
            move || {
                if let Some(core) = on_pause.upgrade() {
                    core.actually_pause();
                }
            },
            move || {
                if let Some(core) = on_resume.upgrade() {
                    core.actually_resume();
                }
            },
        );
        SiphonCore {
            tube,
            pending: PendingValues::new(),
            upstream: FountLink::new(),
            downstream: DrainLink::new(),
            can_process_input: Cell::new(true),
            ever_started: Cell::new(false),
            unbuffering: Cell::new(false),
            terminal_sent: Cell::new(false),
            stop_reason: RefCell::new(None),
            pause_on_pause: RefCell::new(None),
            no_drain_pause: OncePause::new(pauser.clone()),
            pauser,
        }
    });
    let drain = Rc::new(SiphonDrain {
        core: Rc::clone(&core),
    });
    let fount = Rc::new(SiphonFount { core });
    (drain, fount)
}

/// The upstream-facing view of a siphon.
pub struct SiphonDrain<T: Tube> {
    core: Rc<SiphonCore<T>>,
}

impl<T: Tube> SiphonDrain<T> {
    pub(crate) fn core(&self) -> &Rc<SiphonCore<T>> {
        &self.core
    }
}

impl<T: Tube> Drain for SiphonDrain<T> {
    type Item = T::In;

    fn fount(&self) -> Option<FountRef<T::In>> {
        self.core.upstream.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<T::In>>) {
        let this: DrainRef<T::In> = self.clone();
        self.core.upstream.begin_flowing_from(this, fount.clone());
        // If a pause was held against the previous upstream, transfer it:
        // the new upstream is paused before the old pause is released, so
        // the composite is never momentarily unpaused during hand-off.
        let held = self.core.pause_on_pause.borrow_mut().take();
        if let Some(held) = held {
            let fresh = match &fount {
                Some(fount) => fount.pause_flow(),
                None => Pause::no_op(),
            };
            let previous = self.core.pause_on_pause.borrow_mut().replace(fresh);
            drop(previous);
            drop(held);
        }
        if let Some(fount) = &fount {
            if !self.core.can_process_input.get() {
                fount.stop_flow();
            }
            if !self.core.ever_started.replace(true) {
                self.core.deliver_from(|tube| tube.started());
            }
        }
    }

    fn receive(&self, item: T::In) {
        debug_assert!(
            self.core.can_process_input.get(),
            "receive called after the flow stopped"
        );
        self.core.deliver_from(move |tube| tube.received(item));
    }

    fn flow_stopped(&self, reason: StopReason) {
        // A terminal that was already delivered downstream wins; a reason
        // that is merely pending delivery is replaced by the newer one.
        if self.core.terminal_sent.get() {
            return;
        }
        self.core.no_more(true, false);
        *self.core.stop_reason.borrow_mut() = Some(reason.clone());
        self.core.deliver_from(move |tube| tube.stopped(&reason));
    }
}

/// The downstream-facing view of a siphon.
pub struct SiphonFount<T: Tube> {
    core: Rc<SiphonCore<T>>,
}

impl<T: Tube> Fount for SiphonFount<T> {
    type Item = T::Out;

    fn drain(&self) -> Option<DrainRef<T::Out>> {
        self.core.downstream.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T::Out>>) {
        let this: FountRef<T::Out> = self.clone();
        let attaching = drain.is_some();
        self.core.downstream.begin_flowing_to(this, drain);
        if attaching {
            self.core.no_drain_pause.maybe_unpause();
        } else if !self.core.pending.is_empty() {
            self.core.no_drain_pause.pause_once();
        }
        self.core.unbuffer();
    }

    fn pause_flow(&self) -> Pause {
        self.core.pauser.pause()
    }

    fn stop_flow(&self) {
        self.core.no_more(true, true);
        if let Some(fount) = self.core.upstream.get() {
            fount.stop_flow();
        }
    }
}

/// An almost-inert fount: it announces itself to drains it is flowed to and
/// answers `stop_flow` with a synthetic terminal, but never produces items.
pub(crate) struct NullFount<T: 'static> {
    drain: DrainLink<T>,
}

impl<T: 'static> NullFount<T> {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(NullFount {
            drain: DrainLink::new(),
        })
    }
}

impl<T: 'static> Fount for NullFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.drain.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        let this: FountRef<T> = self.clone();
        self.drain.begin_flowing_to(this, drain);
    }

    fn pause_flow(&self) -> Pause {
        Pause::no_op()
    }

    fn stop_flow(&self) {
        if let Some(drain) = self.drain.get() {
            drain.flow_stopped(StopReason::StopFlowCalled);
        }
    }
}
