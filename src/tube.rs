//! Transforms.
//!
//! A [`Tube`] turns inputs into zero or more outputs. It has no flow-control
//! powers of its own: wrap it with [`series`] to get a drain on one side and
//! a fount on the other, with buffering and pause propagation handled by the
//! siphon machinery.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::flow::{DrainRef, Fount, FountRef, StopReason};
use crate::siphon;

/// An error raised by a tube; tears the surrounding pipeline down.
pub type TubeError = Box<dyn std::error::Error>;

/// The result of one tube callback: an emission, or an error that ends the
/// flow.
pub type TubeResult<T> = Result<Emission<T>, TubeError>;

/// One step of an emission: a value to deliver, or a request to skip this
/// step while keeping the rest of the emission alive.
pub enum Signal<T> {
    /// Deliver this item downstream.
    Item(T),
    /// Deliver nothing for this step; the emission continues.
    Skip,
}

/// A lazily-consumed sequence of outputs produced by one tube callback.
///
/// Emissions are iterated one step at a time by the siphon, so an emission
/// may pause its own fount between items and the remaining items will wait
/// for the resume.
pub struct Emission<T>(Option<Box<dyn Iterator<Item = Signal<T>>>>);

impl<T: 'static> Emission<T> {
    /// No output.
    pub fn none() -> Self {
        Emission(None)
    }

    /// A single item.
    pub fn one(item: T) -> Self {
        Emission::lazy(std::iter::once(item))
    }

    /// A lazily-evaluated sequence of items.
    pub fn lazy(items: impl Iterator<Item = T> + 'static) -> Self {
        Emission(Some(Box::new(items.map(Signal::Item))))
    }

    /// A lazily-evaluated sequence of signals, for emissions that need
    /// [`Signal::Skip`] steps.
    pub fn signals(signals: impl Iterator<Item = Signal<T>> + 'static) -> Self {
        Emission(Some(Box::new(signals)))
    }

    pub(crate) fn into_inner(self) -> Option<Box<dyn Iterator<Item = Signal<T>>>> {
        self.0
    }
}

impl<T: 'static> From<Vec<T>> for Emission<T> {
    fn from(items: Vec<T>) -> Self {
        Emission::lazy(items.into_iter())
    }
}

impl<T: 'static> From<Option<T>> for Emission<T> {
    fn from(item: Option<T>) -> Self {
        match item {
            Some(item) => Emission::one(item),
            None => Emission::none(),
        }
    }
}

/// A transform expressed as a greeting, a per-item step, and a farewell.
///
/// All three callbacks default to emitting nothing, so a tube only
/// implements the parts it cares about. Callbacks take `&self`: a tube that
/// keeps state between calls uses interior mutability, which is what lets a
/// tube re-enter its own machinery (a divertable tube may call
/// [`Diverter::divert`](crate::Diverter::divert) from inside `received`).
pub trait Tube: 'static {
    /// The type of item this tube accepts.
    type In: 'static;
    /// The type of item this tube emits.
    type Out: 'static;

    /// Called once, when the tube's drain side is first attached to a
    /// fount. Outputs precede anything emitted by `received`.
    fn started(&self) -> TubeResult<Self::Out> {
        Ok(Emission::none())
    }

    /// Called for each item arriving from upstream.
    fn received(&self, item: Self::In) -> TubeResult<Self::Out> {
        let _ = item;
        Ok(Emission::none())
    }

    /// Called when the upstream flow has stopped. Outputs reach the
    /// downstream drain before the terminal notification does.
    fn stopped(&self, reason: &StopReason) -> TubeResult<Self::Out> {
        let _ = reason;
        Ok(Emission::none())
    }
}

/// A tube that can surrender its buffered output for replay into a new
/// downstream when a [`Diverter`](crate::Diverter) is re-wired.
pub trait Divertable: Tube {
    /// Convert already-emitted but not-yet-delivered outputs back into
    /// input form, such that feeding the result to a fresh copy of this
    /// tube would reproduce `buffered`. Unconsumed internal state (e.g. a
    /// partial parse buffer) should be appended.
    fn reassemble(&self, buffered: Vec<Self::Out>) -> Vec<Self::In>;
}

/// A stateless tube built from a function; see [`receiver`].
pub struct Receiver<I, O, F> {
    function: RefCell<F>,
    _types: PhantomData<fn(I) -> O>,
}

/// Build a tube from a function applied to each received item.
///
/// ```
/// use sluice::{receiver, Emission};
///
/// let add_one = receiver(|item: u32| Emission::one(item + 1));
/// # let _ = sluice::series(add_one);
/// ```
pub fn receiver<I, O, F>(function: F) -> Receiver<I, O, F>
where
    I: 'static,
    O: 'static,
    F: FnMut(I) -> Emission<O> + 'static,
{
    Receiver {
        function: RefCell::new(function),
        _types: PhantomData,
    }
}

impl<I, O, F> Tube for Receiver<I, O, F>
where
    I: 'static,
    O: 'static,
    F: FnMut(I) -> Emission<O> + 'static,
{
    type In = I;
    type Out = O;

    fn received(&self, item: I) -> TubeResult<O> {
        Ok((self.function.borrow_mut())(item))
    }
}

/// A pipeline segment with a typed drain end and a typed fount end.
///
/// Built by [`series`] and extended with [`Series::then`]; the ends are
/// wired to the rest of the world with ordinary `flow_to` calls:
///
/// ```
/// use sluice::{receiver, series, Emission};
///
/// let pipe = series(receiver(|n: u32| Emission::one(n * 2)))
///     .then(receiver(|n: u32| Emission::one(n + 1)));
/// let drain = pipe.drain(); // accepts u32
/// let fount = pipe.fount(); // emits u32
/// # let _ = (drain, fount);
/// ```
pub struct Series<In: 'static, Out: 'static> {
    drain: DrainRef<In>,
    fount: FountRef<Out>,
}

/// Wrap a tube in a siphon, yielding a [`Series`] with a drain end and a
/// fount end. This is the only way a tube joins a pipeline.
pub fn series<T: Tube>(tube: T) -> Series<T::In, T::Out> {
    let (drain, fount) = siphon::siphon(tube);
    Series { drain, fount }
}

impl<In: 'static, Out: 'static> Series<In, Out> {
    /// Extend this series with another tube; the new tube's greeting is
    /// delivered (and buffered) immediately.
    pub fn then<T: Tube<In = Out>>(self, tube: T) -> Series<In, T::Out> {
        self.chain(series(tube))
    }

    /// Append an already-built series, connecting this fount to its drain.
    pub fn chain<Next: 'static>(self, next: Series<Out, Next>) -> Series<In, Next> {
        Rc::clone(&self.fount).flow_to(Some(next.drain()));
        Series {
            drain: self.drain,
            fount: next.fount,
        }
    }

    /// Terminate this series with a drain, returning the head drain to
    /// attach a fount to.
    pub fn into_drain(self, drain: DrainRef<Out>) -> DrainRef<In> {
        Rc::clone(&self.fount).flow_to(Some(drain));
        self.drain
    }

    /// The drain end of this series.
    pub fn drain(&self) -> DrainRef<In> {
        Rc::clone(&self.drain)
    }

    /// The fount end of this series.
    pub fn fount(&self) -> FountRef<Out> {
        Rc::clone(&self.fount)
    }
}

impl<In: 'static, Out: 'static> Clone for Series<In, Out> {
    fn clone(&self) -> Self {
        Series {
            drain: Rc::clone(&self.drain),
            fount: Rc::clone(&self.fount),
        }
    }
}
