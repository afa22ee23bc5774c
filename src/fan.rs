//! Multi-peer composites: fan-in, fan-out, and fan-through.
//!
//! The interesting part of each composite is how pause and stop semantics
//! aggregate over several peers: pausing an [`In`]'s single fount pauses
//! every upstream, pausing any of an [`Out`]'s founts pauses the one
//! upstream (reference-counted), and a fount that stops is removed from its
//! composite without disturbing its siblings.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::flow::{Drain, DrainLink, DrainRef, Fount, FountLink, FountRef, StopReason};
use crate::pause::{OncePause, Pause, Pauser};
use crate::tube::Series;

/// One fount fed by any number of drains.
///
/// ```text
/// your fount ──> In::new_drain() ──╮
/// your fount ──> In::new_drain() ──┼──> In::fount() ──> your drain
/// your fount ──> In::new_drain() ──╯
/// ```
pub struct In<T: 'static> {
    shared: Rc<InShared<T>>,
}

struct InShared<T: 'static> {
    drains: RefCell<Vec<Rc<InDrain<T>>>>,
    fount: Rc<InFount<T>>,
}

impl<T: 'static> In<T> {
    /// Create a fan-in with no drains yet. The fount starts out paused
    /// because it has no drain.
    pub fn new() -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<InShared<T>>| InShared {
            drains: RefCell::new(Vec::new()),
            fount: InFount::new(weak.clone()),
        });
        shared.fount.no_drain.pause_once();
        In { shared }
    }

    /// The single fount carrying every input from every attached drain.
    pub fn fount(&self) -> FountRef<T> {
        Rc::clone(&self.shared.fount) as FountRef<T>
    }

    /// Create a new drain whose inputs will come out of [`In::fount`].
    pub fn new_drain(&self) -> DrainRef<T> {
        let drain = Rc::new(InDrain {
            shared: Rc::downgrade(&self.shared),
            fount_link: FountLink::new(),
            held: RefCell::new(None),
        });
        self.shared.drains.borrow_mut().push(Rc::clone(&drain));
        drain
    }
}

impl<T: 'static> Default for In<T> {
    fn default() -> Self {
        In::new()
    }
}

struct InFount<T: 'static> {
    shared: Weak<InShared<T>>,
    link: DrainLink<T>,
    is_paused: Cell<bool>,
    pauser: Pauser,
    no_drain: OncePause,
}

impl<T: 'static> InFount<T> {
    fn new(shared: Weak<InShared<T>>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<InFount<T>>| {
            let (pause_shared, pause_self) = (shared.clone(), weak.clone());
            let (resume_shared, resume_self) = (shared.clone(), weak.clone());
            let pauser = Pauser::new(
                move || {
                    let (Some(shared), Some(fount)) = (pause_shared.upgrade(), pause_self.upgrade())
                    else {
                        return;
                    };
                    fount.is_paused.set(true);
                    let drains: Vec<_> = shared.drains.borrow().clone();
                    for drain in drains {
                        if let Some(upstream) = drain.fount_link.get() {
                            let pause = upstream.pause_flow();
                            let previous = drain.held.borrow_mut().replace(pause);
                            drop(previous);
                        }
                    }
                },
                move || {
                    let (Some(shared), Some(fount)) =
                        (resume_shared.upgrade(), resume_self.upgrade())
                    else {
                        return;
                    };
                    fount.is_paused.set(false);
                    let drains: Vec<_> = shared.drains.borrow().clone();
                    for drain in drains {
                        let held = drain.held.borrow_mut().take();
                        drop(held);
                    }
                },
            );
            InFount {
                shared,
                link: DrainLink::new(),
                is_paused: Cell::new(false),
                no_drain: OncePause::new(pauser.clone()),
                pauser,
            }
        })
    }
}

impl<T: 'static> Fount for InFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.link.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        let this: FountRef<T> = self.clone();
        self.link.begin_flowing_to(this, drain);
        if self.link.get().is_none() {
            self.no_drain.pause_once();
        } else {
            self.no_drain.maybe_unpause();
        }
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let drains: Vec<_> = shared.drains.borrow().clone();
        for drain in drains {
            if let Some(upstream) = drain.fount_link.get() {
                upstream.stop_flow();
            }
        }
    }
}

struct InDrain<T: 'static> {
    shared: Weak<InShared<T>>,
    fount_link: FountLink<T>,
    held: RefCell<Option<Pause>>,
}

impl<T: 'static> Drain for InDrain<T> {
    type Item = T;

    fn fount(&self) -> Option<FountRef<T>> {
        self.fount_link.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<T>>) {
        let this: DrainRef<T> = self.clone();
        self.fount_link.begin_flowing_from(this, fount.clone());
        if let Some(fount) = fount
            && let Some(shared) = self.shared.upgrade()
            && shared.fount.is_paused.get()
        {
            let pause = fount.pause_flow();
            let previous = self.held.borrow_mut().replace(pause);
            drop(previous);
        }
    }

    fn receive(&self, item: T) {
        if let Some(shared) = self.shared.upgrade()
            && let Some(downstream) = shared.fount.link.get()
        {
            downstream.receive(item);
        }
    }

    fn flow_stopped(&self, _reason: StopReason) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .drains
                .borrow_mut()
                .retain(|drain| !std::ptr::eq(Rc::as_ptr(drain), self));
        }
    }
}

/// One drain delivering to any number of founts.
///
/// ```text
///                                  ╭──> Out::new_fount() ──> your drain
/// your fount ──> Out::drain() ──> Out ──> Out::new_fount() ──> your drain
///                                  ╰──> Out::new_fount() ──> your drain
/// ```
///
/// Every received item is delivered to every fount currently attached to a
/// drain; items are `Clone` for that reason. A fount that is paused queues
/// items locally and releases one per resume cycle.
pub struct Out<T: Clone + 'static> {
    shared: Rc<OutShared<T>>,
}

struct OutShared<T: Clone + 'static> {
    founts: RefCell<Vec<Rc<OutFount<T>>>>,
    drain: Rc<OutDrain<T>>,
}

impl<T: Clone + 'static> Out<T> {
    /// Create a fan-out with no founts yet.
    pub fn new() -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<OutShared<T>>| OutShared {
            founts: RefCell::new(Vec::new()),
            drain: OutDrain::new(weak.clone()),
        });
        Out { shared }
    }

    /// The single drain broadcasting to every fount.
    pub fn drain(&self) -> DrainRef<T> {
        Rc::clone(&self.shared.drain) as DrainRef<T>
    }

    /// Create a new fount that will repeat every input this fan-out's
    /// drain receives.
    pub fn new_fount(&self) -> FountRef<T> {
        let fount = OutFount::new(Rc::downgrade(&self.shared));
        self.shared.founts.borrow_mut().push(Rc::clone(&fount));
        fount as FountRef<T>
    }
}

impl<T: Clone + 'static> Default for Out<T> {
    fn default() -> Self {
        Out::new()
    }
}

struct OutDrain<T: Clone + 'static> {
    shared: Weak<OutShared<T>>,
    fount_link: FountLink<T>,
    paused: Cell<bool>,
    held: RefCell<Option<Pause>>,
    pauser: Pauser,
}

impl<T: Clone + 'static> OutDrain<T> {
    fn new(shared: Weak<OutShared<T>>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<OutDrain<T>>| {
            let pause_self = weak.clone();
            let resume_self = weak.clone();
            let pauser = Pauser::new(
                move || {
                    let Some(drain) = pause_self.upgrade() else {
                        return;
                    };
                    drain.paused.set(true);
                    if let Some(upstream) = drain.fount_link.get() {
                        let pause = upstream.pause_flow();
                        let previous = drain.held.borrow_mut().replace(pause);
                        drop(previous);
                    }
                },
                move || {
                    let Some(drain) = resume_self.upgrade() else {
                        return;
                    };
                    drain.paused.set(false);
                    let held = drain.held.borrow_mut().take();
                    drop(held);
                },
            );
            OutDrain {
                shared,
                fount_link: FountLink::new(),
                paused: Cell::new(false),
                held: RefCell::new(None),
                pauser,
            }
        })
    }
}

impl<T: Clone + 'static> Drain for OutDrain<T> {
    type Item = T;

    fn fount(&self) -> Option<FountRef<T>> {
        self.fount_link.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<T>>) {
        // Carry the aggregate pause over to the new upstream before the
        // old one is released.
        if self.paused.get() {
            let fresh = fount.as_ref().map(|fount| fount.pause_flow());
            let previous = std::mem::replace(&mut *self.held.borrow_mut(), fresh);
            drop(previous);
        }
        let this: DrainRef<T> = self.clone();
        self.fount_link.begin_flowing_from(this, fount);
    }

    fn receive(&self, item: T) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let founts: Vec<_> = shared.founts.borrow().clone();
        for fount in founts {
            fount.deliver_one(item.clone());
        }
    }

    fn flow_stopped(&self, reason: StopReason) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let founts: Vec<_> = shared.founts.borrow().clone();
        for fount in founts {
            if let Some(drain) = fount.link.get() {
                drain.flow_stopped(reason.clone());
            }
        }
    }
}

struct OutFount<T: Clone + 'static> {
    shared: Weak<OutShared<T>>,
    link: DrainLink<T>,
    queued: RefCell<VecDeque<T>>,
    held: RefCell<Option<Pause>>,
    pauser: Pauser,
}

impl<T: Clone + 'static> OutFount<T> {
    fn new(shared: Weak<OutShared<T>>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<OutFount<T>>| {
            let (pause_shared, pause_self) = (shared.clone(), weak.clone());
            let resume_self = weak.clone();
            let pauser = Pauser::new(
                move || {
                    let (Some(shared), Some(fount)) = (pause_shared.upgrade(), pause_self.upgrade())
                    else {
                        return;
                    };
                    let pause = shared.drain.pauser.pause();
                    let previous = fount.held.borrow_mut().replace(pause);
                    drop(previous);
                },
                move || {
                    let Some(fount) = resume_self.upgrade() else {
                        return;
                    };
                    let held = fount.held.borrow_mut().take();
                    let queued = fount.queued.borrow_mut().pop_front();
                    if let Some(item) = queued
                        && let Some(drain) = fount.link.get()
                    {
                        drain.receive(item);
                    }
                    drop(held);
                },
            );
            OutFount {
                shared,
                link: DrainLink::new(),
                queued: RefCell::new(VecDeque::new()),
                held: RefCell::new(None),
                pauser,
            }
        })
    }

    /// Deliver one broadcast item, queueing it if this fount is paused.
    fn deliver_one(&self, item: T) {
        if self.link.get().is_none() {
            return;
        }
        if self.held.borrow().is_some() {
            self.queued.borrow_mut().push_back(item);
            return;
        }
        if let Some(drain) = self.link.get() {
            drain.receive(item);
        }
    }
}

impl<T: Clone + 'static> Fount for OutFount<T> {
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
        if let Some(shared) = self.shared.upgrade() {
            shared
                .founts
                .borrow_mut()
                .retain(|fount| !std::ptr::eq(Rc::as_ptr(fount), self));
        }
    }
}

/// Fans each input through a list of sub-pipelines and gathers their
/// outputs into a single fount, preserving per-input delivery order:
/// sub-pipeline 1's output for input X, then 2's, then the next input.
pub struct Thru<I: Clone + 'static, O: 'static> {
    out: Out<I>,
    gather: In<O>,
}

impl<I: Clone + 'static, O: 'static> Thru<I, O> {
    /// Build a fan-through over the given sub-pipelines.
    pub fn new(pipes: Vec<Series<I, O>>) -> Self {
        let out = Out::new();
        let gather = In::new();
        for pipe in pipes {
            out.new_fount().flow_to(Some(pipe.drain()));
            pipe.fount().flow_to(Some(gather.new_drain()));
        }
        Thru { out, gather }
    }

    /// The drain accepting inputs to fan through.
    pub fn drain(&self) -> DrainRef<I> {
        self.out.drain()
    }

    /// The fount gathering every sub-pipeline's output.
    pub fn fount(&self) -> FountRef<O> {
        self.gather.fount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FakeDrain, FakeFount};
    use crate::tube::{receiver, series, Emission};

    #[test]
    fn fan_out_delivers_to_every_drain() {
        let ff = FakeFount::new();
        let fd_a = FakeDrain::new();
        let fd_b = FakeDrain::new();

        let out = Out::new();
        let fount_a = out.new_fount();
        let fount_b = out.new_fount();
        Rc::clone(&ff).flow_to(Some(out.drain()));

        fount_a.flow_to(Some(fd_a.clone() as DrainRef<String>));
        fount_b.flow_to(Some(fd_b.clone() as DrainRef<String>));
        ff.drain().unwrap().receive(String::from("foo"));

        assert_eq!(fd_a.received(), vec!["foo"]);
        assert_eq!(fd_b.received(), vec!["foo"]);
    }

    #[test]
    fn fan_out_only_reaches_attached_founts() {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();

        let out = Out::new();
        let fount = out.new_fount();
        Rc::clone(&ff).flow_to(Some(out.drain()));
        ff.drain().unwrap().receive(String::from("foo"));

        fount.flow_to(Some(fd.clone() as DrainRef<String>));
        assert!(fd.received().is_empty());
    }

    #[test]
    fn pausing_one_out_fount_pauses_the_upstream() {
        let ff = FakeFount::<String>::new();
        let out = Out::new();
        let fount = out.new_fount();
        Rc::clone(&ff).flow_to(Some(out.drain()));

        let _pause = fount.pause_flow();
        assert!(ff.is_paused());
    }

    #[test]
    fn drain_pausing_its_own_fount_does_not_starve_siblings() {
        let ff = FakeFount::new();
        let out = Out::new();
        let fount_a = out.new_fount();
        let fount_b = out.new_fount();

        let pausing = FakeDrain::new();
        pausing.pause_on_receive();
        fount_a.flow_to(Some(pausing.clone() as DrainRef<String>));
        let fd = FakeDrain::new();
        fount_b.flow_to(Some(fd.clone() as DrainRef<String>));
        Rc::clone(&ff).flow_to(Some(out.drain()));

        ff.drain().unwrap().receive(String::from("something"));
        assert_eq!(pausing.received(), vec!["something"]);
        assert_eq!(fd.received(), vec!["something"]);
        assert!(ff.is_paused());
    }

    #[test]
    fn drain_pausing_every_fount_queues_the_item() {
        let ff = FakeFount::new();
        let out = Out::new();
        let fount_a = out.new_fount();
        let fount_b = out.new_fount();
        let pauses: Rc<RefCell<Vec<Pause>>> = Rc::new(RefCell::new(Vec::new()));

        struct PauseEverybody {
            all: Vec<FountRef<String>>,
            pauses: Rc<RefCell<Vec<Pause>>>,
            received: RefCell<Vec<String>>,
        }

        impl Drain for PauseEverybody {
            type Item = String;

            fn fount(&self) -> Option<FountRef<String>> {
                None
            }

            fn flowing_from(self: Rc<Self>, _fount: Option<FountRef<String>>) {}

            fn receive(&self, item: String) {
                self.received.borrow_mut().push(item);
                for fount in &self.all {
                    self.pauses.borrow_mut().push(fount.pause_flow());
                }
            }

            fn flow_stopped(&self, _reason: StopReason) {}
        }

        Rc::clone(&ff).flow_to(Some(out.drain()));
        let everybody = Rc::new(PauseEverybody {
            all: vec![Rc::clone(&fount_a), Rc::clone(&fount_b)],
            pauses: Rc::clone(&pauses),
            received: RefCell::new(Vec::new()),
        });
        fount_a.flow_to(Some(everybody as DrainRef<String>));
        let fd = FakeDrain::new();
        fount_b.flow_to(Some(fd.clone() as DrainRef<String>));

        ff.drain().unwrap().receive(String::from("something"));
        assert!(fd.received().is_empty());
        for pause in pauses.borrow_mut().drain(..) {
            pause.unpause();
        }
        assert_eq!(fd.received(), vec!["something"]);
    }

    #[test]
    fn stopping_one_fount_removes_only_that_fount() {
        let ff = FakeFount::new();
        let out = Out::new();
        let fount_a = out.new_fount();
        let fount_b = out.new_fount();
        Rc::clone(&ff).flow_to(Some(out.drain()));

        let fd_a = FakeDrain::new();
        let fd_b = FakeDrain::new();
        fount_a.flow_to(Some(fd_a.clone() as DrainRef<String>));
        fount_b.flow_to(Some(fd_b.clone() as DrainRef<String>));

        ff.drain().unwrap().receive(String::from("before"));
        fd_a.fount().unwrap().stop_flow();
        ff.drain().unwrap().receive(String::from("after"));
        assert_eq!(fd_a.received(), vec!["before"]);
        assert_eq!(fd_b.received(), vec!["before", "after"]);
        assert!(!ff.is_stopped());
    }

    #[test]
    fn stopping_a_fount_during_receive_spares_siblings() {
        let ff = FakeFount::new();
        let out = Out::new();
        let fount_a = out.new_fount();
        let fount_b = out.new_fount();

        let stopping = FakeDrain::new();
        stopping.stop_on_receive();
        fount_a.flow_to(Some(stopping.clone() as DrainRef<String>));
        let fd = FakeDrain::new();
        fount_b.flow_to(Some(fd.clone() as DrainRef<String>));
        Rc::clone(&ff).flow_to(Some(out.drain()));

        ff.drain().unwrap().receive(String::from("something"));
        assert_eq!(stopping.received(), vec!["something"]);
        assert_eq!(fd.received(), vec!["something"]);

        ff.drain().unwrap().receive(String::from("something else"));
        assert_eq!(stopping.received(), vec!["something"]);
        assert_eq!(fd.received(), vec!["something", "something else"]);
        assert!(!ff.is_stopped());
    }

    #[test]
    fn detaching_the_upstream_releases_its_pause() {
        let out = Out::<String>::new();
        let upstream = FakeFount::new();
        Rc::clone(&upstream).flow_to(Some(out.drain()));
        let _pause = out.new_fount().pause_flow();
        assert!(upstream.is_paused());
        let drain = out.drain();
        Rc::clone(&drain).flowing_from(None);
        assert!(!upstream.is_paused());
    }

    #[test]
    fn terminal_broadcasts_to_every_drain() {
        let out = Out::<String>::new();
        let upstream = FakeFount::new();
        Rc::clone(&upstream).flow_to(Some(out.drain()));
        let fount_1 = out.new_fount();
        let fount_2 = out.new_fount();
        let downstream_1 = FakeDrain::new();
        let downstream_2 = FakeDrain::new();
        fount_1.flow_to(Some(downstream_1.clone() as DrainRef<String>));
        fount_2.flow_to(Some(downstream_2.clone() as DrainRef<String>));
        out.drain().flow_stopped(StopReason::StopFlowCalled);
        assert_eq!(downstream_1.stopped_reasons().len(), 1);
        assert_eq!(downstream_2.stopped_reasons().len(), 1);
    }

    #[test]
    fn fan_in_forwards_from_any_drain() {
        let fd = FakeDrain::new();
        let fan_in = In::new();
        fan_in.fount().flow_to(Some(fd.clone() as DrainRef<String>));
        let ff = FakeFount::new();
        Rc::clone(&ff).flow_to(Some(fan_in.new_drain()));
        ff.drain().unwrap().receive(String::from("testing"));
        assert_eq!(fd.received(), vec!["testing"]);
    }

    #[test]
    fn upstream_paused_until_the_fount_has_a_drain() {
        let ff = FakeFount::<String>::new();
        let fan_in = In::new();
        Rc::clone(&ff).flow_to(Some(fan_in.new_drain()));
        assert!(ff.is_paused());
        fan_in
            .fount()
            .flow_to(Some(FakeDrain::new() as DrainRef<String>));
        assert!(!ff.is_paused());
    }

    #[test]
    fn new_upstream_paused_when_aggregate_is_paused() {
        let fan_in = In::<String>::new();
        let fd = FakeDrain::new();
        fan_in.fount().flow_to(Some(fd.clone() as DrainRef<String>));
        let f1 = FakeFount::new();
        Rc::clone(&f1).flow_to(Some(fan_in.new_drain()));
        assert!(!f1.is_paused());

        let pause = fd.fount().unwrap().pause_flow();
        assert!(f1.is_paused());

        let f2 = FakeFount::new();
        assert!(!f2.is_paused());
        Rc::clone(&f2).flow_to(Some(fan_in.new_drain()));
        assert!(f2.is_paused());
        pause.unpause();
        assert!(!f2.is_paused());
    }

    #[test]
    fn detaching_an_unattached_fount_keeps_upstreams_paused() {
        let fan_in = In::<String>::new();
        let ff = FakeFount::new();
        Rc::clone(&ff).flow_to(Some(fan_in.new_drain()));
        assert!(ff.is_paused());
        fan_in.fount().flow_to(None);
        assert!(ff.is_paused());
    }

    #[test]
    fn switching_the_fount_to_no_drain_pauses_upstreams() {
        let fan_in = In::<String>::new();
        let downstream = FakeDrain::new();
        fan_in
            .fount()
            .flow_to(Some(downstream.clone() as DrainRef<String>));
        let upstream_1 = FakeFount::new();
        let upstream_2 = FakeFount::new();
        Rc::clone(&upstream_1).flow_to(Some(fan_in.new_drain()));
        Rc::clone(&upstream_2).flow_to(Some(fan_in.new_drain()));
        fan_in.fount().flow_to(None);
        assert!(upstream_1.is_paused());
        assert!(upstream_2.is_paused());
    }

    #[test]
    fn stopped_drain_is_removed_from_the_set() {
        let fan_in = In::<String>::new();
        let downstream = FakeDrain::new();
        fan_in
            .fount()
            .flow_to(Some(downstream.clone() as DrainRef<String>));
        let upstream_1 = FakeFount::new();
        let upstream_2 = FakeFount::new();
        Rc::clone(&upstream_1).flow_to(Some(fan_in.new_drain()));
        Rc::clone(&upstream_2).flow_to(Some(fan_in.new_drain()));

        upstream_1
            .drain()
            .unwrap()
            .flow_stopped(StopReason::StopFlowCalled);
        assert!(!upstream_1.is_paused());
        assert!(!upstream_2.is_paused());

        let pause = downstream.fount().unwrap().pause_flow();
        assert!(!upstream_1.is_paused());
        assert!(upstream_2.is_paused());

        pause.unpause();
        assert!(!upstream_1.is_paused());
        assert!(!upstream_2.is_paused());
    }

    #[test]
    fn stop_flow_reaches_every_upstream() {
        let fan_in = In::<String>::new();
        let downstream = FakeDrain::new();
        fan_in
            .fount()
            .flow_to(Some(downstream.clone() as DrainRef<String>));
        let upstream_1 = FakeFount::new();
        let upstream_2 = FakeFount::new();
        Rc::clone(&upstream_1).flow_to(Some(fan_in.new_drain()));
        Rc::clone(&upstream_2).flow_to(Some(fan_in.new_drain()));

        assert!(!upstream_1.is_stopped());
        assert!(!upstream_2.is_stopped());
        downstream.fount().unwrap().stop_flow();
        assert!(upstream_1.is_stopped());
        assert!(upstream_2.is_stopped());
    }

    #[test]
    fn thru_gathers_outputs_in_sub_pipeline_order() {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();

        let times_two = series(receiver(|n: u32| Emission::one(n * 2)));
        let times_three = series(receiver(|n: u32| Emission::one(n * 3)));
        let thru = Thru::new(vec![times_two, times_three]);

        Rc::clone(&ff).flow_to(Some(thru.drain()));
        thru.fount().flow_to(Some(fd.clone() as DrainRef<u32>));
        ff.drain().unwrap().receive(1);
        ff.drain().unwrap().receive(2);
        ff.drain().unwrap().receive(3);
        assert_eq!(fd.received(), vec![2u32, 3, 4, 6, 6, 9]);
    }
}
