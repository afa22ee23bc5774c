//! Addressed dispatch.
//!
//! A [`Router`] accepts [`To`] envelopes on its single drain and delivers
//! each payload to exactly one of its routes: the one whose handle is the
//! envelope's address. Route identity is pointer identity, not value
//! equality: two envelopes match only if they name the very same route.
//!
//! Internally the router is a fan-[`Out`](crate::fan::Out) of envelopes;
//! every route is a fan fount piped through a stateless filter that keeps
//! only the envelopes addressed to it. Back-pressure from any single route
//! therefore propagates to the router's upstream through the fan-out's
//! shared pauser.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::fan::Out;
use crate::flow::{Drain, DrainRef, Fount, FountLink, FountRef, StopReason};
use crate::pause::Pause;
use crate::tube::{series, Emission, Tube, TubeResult};

struct RouteTag {
    name: Option<String>,
}

/// An addressed envelope: deliver `what` to the route `where` names.
///
/// Built with [`to`]; envelope equality is not defined beyond the identity
/// of the route it is addressed to.
pub struct To<T> {
    tag: Rc<RouteTag>,
    what: T,
}

impl<T: Clone> Clone for To<T> {
    fn clone(&self) -> Self {
        To {
            tag: Rc::clone(&self.tag),
            what: self.what.clone(),
        }
    }
}

impl<T> fmt::Debug for To<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag.name {
            Some(name) => write!(f, "To({name})"),
            None => write!(f, "To(<anonymous route>)"),
        }
    }
}

/// Construct an envelope addressing `what` to `route`.
pub fn to<T>(route: &Route<T>, what: T) -> To<T> {
    To {
        tag: Rc::clone(&route.tag),
        what,
    }
}

/// A cloneable handle to one of a router's outbound founts, usable both as
/// a fount (flow it to a drain) and as an address (pass it to [`to`]).
pub struct Route<T: 'static> {
    tag: Rc<RouteTag>,
    fount: FountRef<T>,
}

impl<T: 'static> Route<T> {
    /// Flow this route's output to `drain`.
    pub fn flow_to(&self, drain: Option<DrainRef<T>>) {
        Rc::clone(&self.fount).flow_to(drain);
    }

    /// Pause this route's output.
    pub fn pause_flow(&self) -> Pause {
        self.fount.pause_flow()
    }

    /// Remove this route from its router.
    pub fn stop_flow(&self) {
        self.fount.stop_flow();
    }

    /// The underlying fount.
    pub fn fount(&self) -> FountRef<T> {
        Rc::clone(&self.fount)
    }
}

impl<T: 'static> Clone for Route<T> {
    fn clone(&self) -> Self {
        Route {
            tag: Rc::clone(&self.tag),
            fount: Rc::clone(&self.fount),
        }
    }
}

impl<T: 'static> fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag.name {
            Some(name) => write!(f, "Route({name})"),
            None => write!(f, "Route(<anonymous>)"),
        }
    }
}

/// Keeps envelopes addressed to one route, unwrapping their payloads.
struct RouteFilter<T> {
    tag: Rc<RouteTag>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: 'static> Tube for RouteFilter<T> {
    type In = To<T>;
    type Out = T;

    fn received(&self, envelope: To<T>) -> TubeResult<T> {
        if Rc::ptr_eq(&envelope.tag, &self.tag) {
            Ok(Emission::one(envelope.what))
        } else {
            Ok(Emission::none())
        }
    }
}

/// Discards everything; the terminal drain behind the null route.
struct NullRouteDrain<T: 'static> {
    fount_link: FountLink<T>,
}

impl<T: 'static> Drain for NullRouteDrain<T> {
    type Item = T;

    fn fount(&self) -> Option<FountRef<T>> {
        self.fount_link.get()
    }

    fn flowing_from(self: Rc<Self>, fount: Option<FountRef<T>>) {
        let this: DrainRef<T> = self.clone();
        self.fount_link.begin_flowing_from(this, fount);
    }

    fn receive(&self, _item: T) {}

    fn flow_stopped(&self, _reason: StopReason) {}
}

/// Dispatches envelopes to identity-keyed routes.
pub struct Router<T: Clone + 'static> {
    out: Out<To<T>>,
}

impl<T: Clone + 'static> Router<T> {
    /// Create a router. A null route is wired immediately so that
    /// un-addressed envelopes always have at least one attached drain to
    /// fall through to.
    pub fn new() -> Self {
        let out = Out::new();
        let null_route = out.new_fount();
        null_route.flow_to(Some(Rc::new(NullRouteDrain {
            fount_link: FountLink::new(),
        }) as DrainRef<To<T>>));
        Router { out }
    }

    /// The drain accepting [`To`] envelopes.
    pub fn drain(&self) -> DrainRef<To<T>> {
        self.out.drain()
    }

    /// Create a new route, optionally named for debugging.
    pub fn new_route(&self, name: Option<&str>) -> Route<T> {
        let tag = Rc::new(RouteTag {
            name: name.map(String::from),
        });
        let filter = series(RouteFilter {
            tag: Rc::clone(&tag),
            _payload: PhantomData,
        });
        self.out.new_fount().flow_to(Some(filter.drain()));
        Route {
            tag,
            fount: filter.fount(),
        }
    }
}

impl<T: Clone + 'static> Default for Router<T> {
    fn default() -> Self {
        Router::new()
    }
}
