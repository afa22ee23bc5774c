//! Accepting inbound flows with connection-count back-pressure.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::flow::{Drain, DrainRef, Fount, FountLink, FountRef, StopReason};
use crate::tube::{series, Emission, Tube, TubeResult};

/// A fount and a drain, together modeling one bidirectional channel (for
/// example an accepted connection).
pub struct Flow<T: 'static> {
    /// The inbound side.
    pub fount: FountRef<T>,
    /// The outbound side.
    pub drain: DrainRef<T>,
}

impl<T: 'static> Flow<T> {
    /// Pair a fount and a drain into a flow.
    pub fn new(fount: FountRef<T>, drain: DrainRef<T>) -> Self {
        Flow { fount, drain }
    }
}

/// Config used to build a [`Listener`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ListenerConfig {
    /// How many flows may be live at once before the fount of flows is
    /// paused.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

const fn default_max_connections() -> usize {
    100
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            max_connections: default_max_connections(),
        }
    }
}

impl ListenerConfig {
    /// Build the `Listener` from this configuration.
    pub fn build<T: 'static>(&self, connector: impl Fn(Flow<T>) + 'static) -> Rc<Listener<T>> {
        Listener::with_max_connections(connector, self.max_connections)
    }
}

/// A terminal drain that accepts [`Flow`]s and sets each one up through a
/// user callback.
///
/// Each accepted flow's fount is wrapped with a stop-hook so the listener
/// learns when the flow completes; while `max_connections` flows are live,
/// the fount of flows is paused.
pub struct Listener<T: 'static> {
    connector: Box<dyn Fn(Flow<T>)>,
    max_connections: usize,
    current_connections: Cell<usize>,
    paused: RefCell<Option<crate::pause::Pause>>,
    fount_link: FountLink<Flow<T>>,
    weak: Weak<Listener<T>>,
}

impl<T: 'static> Listener<T> {
    /// Create a listener with the default connection limit.
    pub fn new(connector: impl Fn(Flow<T>) + 'static) -> Rc<Self> {
        ListenerConfig::default().build(connector)
    }

    /// Create a listener that allows at most `max_connections` live flows.
    pub fn with_max_connections(
        connector: impl Fn(Flow<T>) + 'static,
        max_connections: usize,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Listener<T>>| Listener {
            connector: Box::new(connector),
            max_connections,
            current_connections: Cell::new(0),
            paused: RefCell::new(None),
            fount_link: FountLink::new(),
            weak: weak.clone(),
        })
    }

    fn connection_completed(&self) {
        self.current_connections
            .set(self.current_connections.get() - 1);
        let pause = self.paused.borrow_mut().take();
        drop(pause);
    }
}

impl<T: 'static> Drain for Listener<T> {
    type Item = Flow<T>;

    fn fount(&self) -> Option<FountRef<Flow<T>>> {
        self.fount_link.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<Flow<T>>>) {
        let this: DrainRef<Flow<T>> = self.clone();
        self.fount_link.begin_flowing_from(this, fount);
    }

    fn receive(&self, flow: Flow<T>) {
        self.current_connections
            .set(self.current_connections.get() + 1);
        if self.current_connections.get() >= self.max_connections
            && let Some(fount) = self.fount_link.get()
        {
            let pause = fount.pause_flow();
            let previous = self.paused.borrow_mut().replace(pause);
            drop(previous);
        }
        let listener = self.weak.clone();
        // The hook holds the accepted fount until the flow completes:
        // back-references are weak, so nothing else keeps the source of a
        // handed-off flow alive.
        let accepted: RefCell<Option<FountRef<T>>> = RefCell::new(Some(Rc::clone(&flow.fount)));
        let hook = series(OnStop::new(move || {
            accepted.borrow_mut().take();
            if let Some(listener) = listener.upgrade() {
                listener.connection_completed();
            }
        }));
        let hooked_fount = hook.fount();
        flow.fount.flow_to(Some(hook.drain()));
        (self.connector)(Flow::new(hooked_fount, flow.drain));
    }

    fn flow_stopped(&self, _reason: StopReason) {}
}

/// A pass-through tube that runs a callback when the flow stops.
struct OnStop<T: 'static> {
    callback: Box<dyn Fn()>,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T: 'static> OnStop<T> {
    fn new(callback: impl Fn() + 'static) -> Self {
        OnStop {
            callback: Box::new(callback),
            _item: std::marker::PhantomData,
        }
    }
}

impl<T: 'static> Tube for OnStop<T> {
    type In = T;
    type Out = T;

    fn received(&self, item: T) -> TubeResult<T> {
        Ok(Emission::one(item))
    }

    fn stopped(&self, _reason: &StopReason) -> TubeResult<T> {
        (self.callback)();
        Ok(Emission::none())
    }
}
