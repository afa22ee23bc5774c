//! A bounded push-buffer fount driven by a cooperative clock.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::{ensure, Snafu};

use crate::flow::{Drain, DrainLink, DrainRef, Fount, StopReason};
use crate::pause::{Pause, Pauser};

/// The scheduling capability a [`QueueFount`] needs from its environment:
/// run `f` once, `delay` from now. Production environments adapt their
/// event loop; tests use
/// [`test_util::TestClock`](crate::test_util::TestClock).
pub trait Clock {
    /// Schedule `f` to run once after `delay`.
    fn call_later(&self, delay: Duration, f: Box<dyn FnOnce()>);
}

/// `push` was called while the queue was already at capacity. The queue is
/// left unchanged.
#[derive(Debug, Snafu)]
#[snafu(display("queue fount is at capacity ({capacity} items)"))]
pub struct QueueOverflow {
    /// The configured capacity of the queue.
    pub capacity: usize,
}

/// Config used to build a [`QueueFount`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct QueueFountConfig {
    /// The maximum number of items the queue will buffer; `push` fails
    /// once this is reached.
    pub capacity: usize,

    /// Milliseconds between delivery turns.
    #[serde(default)]
    pub turn_delay_ms: u64,
}

impl QueueFountConfig {
    /// Creates a `QueueFountConfig` with the given capacity and no turn
    /// delay.
    pub const fn new(capacity: usize) -> Self {
        QueueFountConfig {
            capacity,
            turn_delay_ms: 0,
        }
    }

    /// Build the `QueueFount` from this configuration.
    pub fn build<T: 'static>(&self, clock: Rc<dyn Clock>) -> Rc<QueueFount<T>> {
        QueueFount::with_turn_delay(
            self.capacity,
            Duration::from_millis(self.turn_delay_ms),
            clock,
        )
    }
}

/// A fount fed by explicit [`push`](QueueFount::push) calls, delivering one
/// item per clock turn.
///
/// Items are delivered in push order (FIFO). Pausing suspends the turn
/// loop; resuming the last pause delivers the next item and schedules the
/// loop again.
pub struct QueueFount<T: 'static> {
    deque: RefCell<VecDeque<T>>,
    capacity: usize,
    turn_delay: Duration,
    clock: Rc<dyn Clock>,
    link: DrainLink<T>,
    started: Cell<bool>,
    stopped: Cell<bool>,
    paused: Cell<bool>,
    pauser: Pauser,
    weak: Weak<QueueFount<T>>,
}

impl<T: 'static> QueueFount<T> {
    /// Create a queue fount with the given capacity, delivering as fast as
    /// the clock allows.
    pub fn new(capacity: usize, clock: Rc<dyn Clock>) -> Rc<Self> {
        QueueFount::with_turn_delay(capacity, Duration::ZERO, clock)
    }

    /// Create a queue fount that waits `turn_delay` between deliveries.
    pub fn with_turn_delay(capacity: usize, turn_delay: Duration, clock: Rc<dyn Clock>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<QueueFount<T>>| {
            let on_pause = weak.clone();
            let on_resume = weak.clone();
            let pauser = Pauser::new(
                move || {
                    if let Some(queue) = on_pause.upgrade() {
                        queue.paused.set(true);
                    }
                },
                move || {
                    if let Some(queue) = on_resume.upgrade() {
                        queue.paused.set(false);
                        queue.turn();
                    }
                },
            );
            QueueFount {
                deque: RefCell::new(VecDeque::new()),
                capacity,
                turn_delay,
                clock,
                link: DrainLink::new(),
                started: Cell::new(false),
                stopped: Cell::new(false),
                paused: Cell::new(false),
                pauser,
                weak: weak.clone(),
            }
        })
    }

    /// Enqueue an item for delivery.
    ///
    /// Fails with [`QueueOverflow`] when the queue already holds
    /// `capacity` items; the queue is not mutated in that case.
    pub fn push(&self, item: T) -> Result<(), QueueOverflow> {
        ensure!(
            self.deque.borrow().len() < self.capacity,
            QueueOverflowSnafu {
                capacity: self.capacity
            }
        );
        self.deque.borrow_mut().push_back(item);
        if self.started.get() && !self.paused.get() && !self.stopped.get() {
            self.schedule_turn(Duration::ZERO);
        }
        Ok(())
    }

    /// How many items are currently buffered.
    pub fn len(&self) -> usize {
        self.deque.borrow().len()
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.deque.borrow().is_empty()
    }

    fn schedule_turn(&self, delay: Duration) {
        let weak = self.weak.clone();
        self.clock.call_later(
            delay,
            Box::new(move || {
                if let Some(queue) = weak.upgrade() {
                    queue.turn();
                }
            }),
        );
    }

    /// Deliver one item, then schedule the next turn.
    fn turn(&self) {
        if self.paused.get() || self.stopped.get() {
            return;
        }
        let Some(drain) = self.link.get() else {
            return;
        };
        let item = self.deque.borrow_mut().pop_front();
        if let Some(item) = item {
            drain.receive(item);
            self.schedule_turn(self.turn_delay);
        }
    }
}

impl<T: 'static> Fount for QueueFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.link.get()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        let this = Rc::clone(&self) as crate::flow::FountRef<T>;
        self.link.begin_flowing_to(this, drain);
        self.started.set(true);
        self.turn();
    }

    fn pause_flow(&self) -> Pause {
        self.pauser.pause()
    }

    fn stop_flow(&self) {
        if self.stopped.replace(true) {
            return;
        }
        self.deque.borrow_mut().clear();
        if let Some(drain) = self.link.get() {
            drain.flow_stopped(StopReason::StopFlowCalled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Fount;
    use crate::test_util::{FakeDrain, TestClock};

    #[test]
    fn queued_items_are_delivered_in_push_order() {
        let clock = TestClock::new();
        let queue = QueueFount::new(10, clock.clone());
        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        queue.push("first").unwrap();
        queue.push("second").unwrap();
        clock.advance(Duration::ZERO);
        assert_eq!(fd.received(), vec!["first", "second"]);
    }

    #[test]
    fn items_pushed_before_a_drain_attaches_are_kept() {
        let clock = TestClock::new();
        let queue = QueueFount::new(2, clock.clone());
        queue.push("something").unwrap();
        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        clock.advance(Duration::ZERO);
        assert_eq!(fd.received(), vec!["something"]);
    }

    #[test]
    fn push_fails_at_capacity_without_mutating() {
        let clock = TestClock::new();
        let queue = QueueFount::new(2, clock.clone());
        queue.push("one").unwrap();
        queue.push("two").unwrap();
        assert_eq!(queue.len(), 2);
        let error = queue.push("three").unwrap_err();
        assert_eq!(error.capacity, 2);
        assert_eq!(queue.len(), 2);

        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        clock.advance(Duration::ZERO);
        assert_eq!(fd.received(), vec!["one", "two"]);
    }

    #[test]
    fn pushes_while_paused_deliver_on_resume() {
        let clock = TestClock::new();
        let queue = QueueFount::new(2, clock.clone());
        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        let pause = queue.pause_flow();
        queue.push("something").unwrap();
        assert_eq!(queue.len(), 1);
        clock.advance(Duration::ZERO);
        assert!(fd.received().is_empty());
        pause.unpause();
        clock.advance(Duration::ZERO);
        assert_eq!(fd.received(), vec!["something"]);
    }

    #[test]
    fn stop_before_delivery_clears_the_queue() {
        let clock = TestClock::new();
        let queue = QueueFount::new(2, clock.clone());
        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        queue.push("something").unwrap();
        queue.stop_flow();
        clock.advance(Duration::ZERO);
        assert!(queue.is_empty());
        assert!(fd.received().is_empty());
        assert_eq!(fd.stopped_reasons().len(), 1);
        assert!(fd.stopped_reasons()[0].is_stop_flow_called());
    }

    #[test]
    fn stop_after_delivery_signals_once() {
        let clock = TestClock::new();
        let queue = QueueFount::new(2, clock.clone());
        let fd = FakeDrain::new();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        queue.push("something").unwrap();
        clock.advance(Duration::ZERO);
        queue.stop_flow();
        queue.stop_flow();
        assert_eq!(fd.received(), vec!["something"]);
        assert_eq!(fd.stopped_reasons().len(), 1);
    }

    #[test]
    fn turn_delay_spaces_deliveries_out() {
        let clock = TestClock::new();
        let queue = QueueFountConfig {
            capacity: 8,
            turn_delay_ms: 10,
        }
        .build::<&str>(clock.clone());
        let fd = FakeDrain::new();
        queue.push("a").unwrap();
        queue.push("b").unwrap();
        Rc::clone(&queue).flow_to(Some(fd.clone() as DrainRef<&str>));
        clock.advance(Duration::ZERO);
        assert_eq!(fd.received(), vec!["a"]);
        clock.advance(Duration::from_millis(10));
        assert_eq!(fd.received(), vec!["a", "b"]);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = QueueFountConfig {
            capacity: 16,
            turn_delay_ms: 5,
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(
            serde_json::from_str::<QueueFountConfig>(&text).unwrap(),
            config
        );
    }
}
