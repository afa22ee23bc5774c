//! Helpers for exercising pipelines in tests: recording drains, scriptable
//! founts, and a deterministic clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::flow::{Drain, DrainLink, DrainRef, Fount, FountLink, FountRef, StopReason};
use crate::pause::{Pause, Pauser};
use crate::queue::Clock;

/// A fount that records whether it has been paused or stopped.
pub struct FakeFount<T: 'static> {
    link: DrainLink<T>,
    paused: Cell<bool>,
    stopped: Cell<bool>,
    terminal: RefCell<Option<StopReason>>,
    pauser: Pauser,
}

impl<T: 'static> FakeFount<T> {
    /// Create a fake fount.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<FakeFount<T>>| {
            let on_pause = weak.clone();
            let on_resume = weak.clone();
            FakeFount {
                link: DrainLink::new(),
                paused: Cell::new(false),
                stopped: Cell::new(false),
                terminal: RefCell::new(None),
                pauser: Pauser::new(
                    move || {
                        if let Some(fount) = on_pause.upgrade() {
                            fount.paused.set(true);
                        }
                    },
                    move || {
                        if let Some(fount) = on_resume.upgrade() {
                            fount.paused.set(false);
                        }
                    },
                ),
            }
        })
    }

    /// Whether at least one pause is outstanding.
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    /// Whether `stop_flow` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    /// Make `stop_flow` answer immediately with the given terminal, the
    /// way a source with nothing left to release would.
    pub fn terminate_on_stop(&self, reason: StopReason) {
        *self.terminal.borrow_mut() = Some(reason);
    }
}

impl<T: 'static> Fount for FakeFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.link.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        let this: FountRef<T> = self.clone();
        self.link.begin_flowing_to(this, drain);
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        self.stopped.set(true);
        let terminal = self.terminal.borrow_mut().take();
        if let Some(reason) = terminal
            && let Some(drain) = self.link.get()
        {
            drain.flow_stopped(reason);
        }
    }
}

/// A fount with an internal buffer, delivering whenever it is attached and
/// unpaused.
pub struct BufferedFount<T: 'static> {
    link: DrainLink<T>,
    buffer: RefCell<VecDeque<T>>,
    paused: Cell<bool>,
    stopped: Cell<bool>,
    pauser: Pauser,
}

impl<T: 'static> BufferedFount<T> {
    /// Create an empty buffered fount.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<BufferedFount<T>>| {
            let on_pause = weak.clone();
            let on_resume = weak.clone();
            BufferedFount {
                link: DrainLink::new(),
                buffer: RefCell::new(VecDeque::new()),
                paused: Cell::new(false),
                stopped: Cell::new(false),
                pauser: Pauser::new(
                    move || {
                        if let Some(fount) = on_pause.upgrade() {
                            fount.paused.set(true);
                        }
                    },
                    move || {
                        if let Some(fount) = on_resume.upgrade() {
                            fount.paused.set(false);
                            fount.deliver_while_allowed();
                        }
                    },
                ),
            }
        })
    }

    /// Queue an item for delivery on the next attach or resume.
    pub fn buffer_up(&self, item: T) {
        self.buffer.borrow_mut().push_back(item);
    }

    /// Whether at least one pause is outstanding.
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    fn deliver_while_allowed(&self) {
        loop {
            if self.paused.get() || self.stopped.get() {
                return;
            }
            let Some(drain) = self.link.get() else {
                return;
            };
            let Some(item) = self.buffer.borrow_mut().pop_front() else {
                return;
            };
            drain.receive(item);
        }
    }
}

impl<T: Clone + 'static> BufferedFount<T> {
    /// The items still waiting to be delivered.
    pub fn buffered(&self) -> Vec<T> {
        self.buffer.borrow().iter().cloned().collect()
    }
}

impl<T: 'static> Fount for BufferedFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.link.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        let this: FountRef<T> = self.clone();
        self.link.begin_flowing_to(this, drain);
        self.deliver_while_allowed();
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        self.stopped.set(true);
    }
}

/// A drain that records everything it observes, with optional scripted
/// reactions for driving the flow-control paths.
pub struct FakeDrain<T: 'static> {
    fount_link: FountLink<T>,
    received: RefCell<Vec<T>>,
    stopped: RefCell<Vec<StopReason>>,
    pause_on_receive: Cell<bool>,
    stop_on_receive: Cell<bool>,
    pause_on_attach: Cell<bool>,
    reflow: RefCell<Option<DrainRef<T>>>,
    held: RefCell<Vec<Pause>>,
}

impl<T: 'static> FakeDrain<T> {
    /// Create a fake drain.
    pub fn new() -> Rc<Self> {
        Rc::new(FakeDrain {
            fount_link: FountLink::new(),
            received: RefCell::new(Vec::new()),
            stopped: RefCell::new(Vec::new()),
            pause_on_receive: Cell::new(false),
            stop_on_receive: Cell::new(false),
            pause_on_attach: Cell::new(false),
            reflow: RefCell::new(None),
            held: RefCell::new(Vec::new()),
        })
    }

    /// Pause the fount on every received item, keeping the tokens.
    pub fn pause_on_receive(&self) {
        self.pause_on_receive.set(true);
    }

    /// Stop the fount as soon as an item is received.
    pub fn stop_on_receive(&self) {
        self.stop_on_receive.set(true);
    }

    /// Pause the fount from inside `flowing_from`.
    pub fn pause_on_attach(&self) {
        self.pause_on_attach.set(true);
    }

    /// On the next attach, immediately re-flow the fount to `target`.
    pub fn reflow_on_attach(&self, target: DrainRef<T>) {
        *self.reflow.borrow_mut() = Some(target);
    }

    /// Release every pause this drain has taken.
    pub fn release_pauses(&self) {
        let held = std::mem::take(&mut *self.held.borrow_mut());
        drop(held);
    }

    /// The terminal notifications observed so far.
    pub fn stopped_reasons(&self) -> Vec<StopReason> {
        self.stopped.borrow().clone()
    }
}

impl<T: Clone + 'static> FakeDrain<T> {
    /// The items observed so far.
    pub fn received(&self) -> Vec<T> {
        self.received.borrow().clone()
    }
}

impl<T: 'static> Drain for FakeDrain<T> {
    type Item = T;

    fn fount(&self) -> Option<FountRef<T>> {
        self.fount_link.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<T>>) {
        let this: DrainRef<T> = self.clone();
        self.fount_link.begin_flowing_from(this, fount.clone());
        if let Some(fount) = fount {
            if self.pause_on_attach.get() {
                self.held.borrow_mut().push(fount.pause_flow());
            }
            let reflow = self.reflow.borrow_mut().take();
            if let Some(target) = reflow {
                Rc::clone(&fount).flow_to(Some(target));
            }
        }
    }

    fn receive(&self, item: T) {
        debug_assert!(
            self.fount_link.get().is_some(),
            "receive on a drain with no fount"
        );
        self.received.borrow_mut().push(item);
        if self.stop_on_receive.get()
            && let Some(fount) = self.fount_link.get()
        {
            fount.stop_flow();
        }
        if self.pause_on_receive.get()
            && let Some(fount) = self.fount_link.get()
        {
            let pause = fount.pause_flow();
            self.held.borrow_mut().push(pause);
        }
    }

    fn flow_stopped(&self, reason: StopReason) {
        self.stopped.borrow_mut().push(reason);
    }
}

/// A terminal drain that aggregates everything it receives and otherwise
/// stays out of the way.
pub struct Collector<T: 'static> {
    items: RefCell<Vec<T>>,
}

impl<T: 'static> Collector<T> {
    /// Create a collector.
    pub fn new() -> Rc<Self> {
        Rc::new(Collector {
            items: RefCell::new(Vec::new()),
        })
    }
}

impl<T: Clone + 'static> Collector<T> {
    /// Everything received so far.
    pub fn collected(&self) -> Vec<T> {
        self.items.borrow().clone()
    }
}

impl<T: 'static> Drain for Collector<T> {
    type Item = T;

    fn fount(&self) -> Option<FountRef<T>> {
        None
    }

    fn flowing_from(self: Rc<Self>, _fount: Option<FountRef<T>>) {}

    fn receive(&self, item: T) {
        self.items.borrow_mut().push(item);
    }

    fn flow_stopped(&self, _reason: StopReason) {}
}

struct ScheduledCall {
    due: Duration,
    seq: u64,
    f: Box<dyn FnOnce()>,
}

/// A manually-advanced [`Clock`] for deterministic scheduling in tests.
pub struct TestClock {
    now: Cell<Duration>,
    seq: Cell<u64>,
    pending: RefCell<Vec<ScheduledCall>>,
}

impl TestClock {
    /// Create a clock at time zero.
    pub fn new() -> Rc<Self> {
        Rc::new(TestClock {
            now: Cell::new(Duration::ZERO),
            seq: Cell::new(0),
            pending: RefCell::new(Vec::new()),
        })
    }

    /// The current time.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Advance the clock, running every call that falls due, including
    /// calls scheduled while advancing; insertion order is preserved for
    /// equal deadlines.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
        loop {
            let next = {
                let pending = self.pending.borrow();
                pending
                    .iter()
                    .enumerate()
                    .filter(|(_, call)| call.due <= self.now.get())
                    .min_by_key(|(_, call)| (call.due, call.seq))
                    .map(|(index, _)| index)
            };
            let Some(index) = next else {
                break;
            };
            let call = self.pending.borrow_mut().remove(index);
            (call.f)();
        }
    }
}

impl Clock for TestClock {
    fn call_later(&self, delay: Duration, f: Box<dyn FnOnce()>) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.pending.borrow_mut().push(ScheduledCall {
            due: self.now.get() + delay,
            seq,
            f,
        });
    }
}
