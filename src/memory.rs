//! Founts that produce values from data already in memory.

use std::cell::RefCell;
use std::rc::Rc;

use crate::flow::{Drain, DrainRef, Fount, FountRef, StopReason};
use crate::pause::Pause;
use crate::siphon::NullFount;
use crate::tube::{series, Emission, Tube, TubeResult};

/// Delivers everything from an iterator as its greeting.
struct IteratorTube<I: Iterator> {
    iterator: RefCell<Option<I>>,
}

impl<I> Tube for IteratorTube<I>
where
    I: Iterator + 'static,
    I::Item: 'static,
{
    type In = ();
    type Out = I::Item;

    fn started(&self) -> TubeResult<I::Item> {
        match self.iterator.borrow_mut().take() {
            Some(iterator) => Ok(Emission::lazy(iterator)),
            None => Ok(Emission::none()),
        }
    }
}

/// A fount over an in-memory sequence; see [`iterator_fount`].
pub struct IteratorFount<T: 'static> {
    fount: FountRef<T>,
    // The internal kick-off fount is only reachable through weak
    // back-references; this handle keeps it alive so a later `stop_flow`
    // can still reach it.
    _kick: Rc<NullFount<()>>,
}

impl<T: 'static> Fount for IteratorFount<T> {
    type Item = T;

    fn drain(&self) -> Option<DrainRef<T>> {
        self.fount.drain()
    }

    fn flow_to(self: Rc<Self>, drain: Option<DrainRef<T>>) {
        Rc::clone(&self.fount).flow_to(drain);
    }

    fn pause_flow(&self) -> Pause {
        self.fount.pause_flow()
    }

    fn stop_flow(&self) {
        self.fount.stop_flow();
    }
}

/// Create a fount that lazily delivers the values of `iterable` to
/// whatever drain it is flowed to, then signals
/// [`StopReason::EndOfIteration`].
pub fn iterator_fount<I>(iterable: I) -> Rc<IteratorFount<I::Item>>
where
    I: IntoIterator,
    I::IntoIter: 'static,
    I::Item: 'static,
{
    let pipe = series(IteratorTube {
        iterator: RefCell::new(Some(iterable.into_iter())),
    });
    let kick: Rc<NullFount<()>> = NullFount::new();
    Rc::clone(&kick).flow_to(Some(pipe.drain()));
    pipe.drain().flow_stopped(StopReason::EndOfIteration);
    Rc::new(IteratorFount {
        fount: pipe.fount(),
        _kick: kick,
    })
}
