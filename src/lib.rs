//! Composable push-based streaming pipelines with explicit back-pressure.
//!
//! Programs are assembled from [`Fount`]s (producers), [`Drain`]s
//! (consumers) and [`Tube`]s (transforms adapted to a drain/fount pair by
//! [`series`]), wired together with `flow_to`. The producer drives;
//! consumers push back by taking [`Pause`] tokens, and buffering happens
//! inside the adapters rather than in user code.
//!
//! ```
//! use std::rc::Rc;
//! use sluice::{receiver, series, Emission, Fount};
//! use sluice::memory::iterator_fount;
//! use sluice::test_util::FakeDrain;
//!
//! let doubled = series(receiver(|n: u32| Emission::one(n * 2)));
//! let out = FakeDrain::new();
//! let numbers = iterator_fount(1..=3);
//! Rc::clone(&numbers).flow_to(Some(doubled.drain()));
//! doubled.fount().flow_to(Some(out.clone() as sluice::DrainRef<u32>));
//! assert_eq!(out.received(), vec![2, 4, 6]);
//! ```
//!
//! A fount owns its drain; back-references are weak. A pipeline therefore
//! lives exactly as long as its source: keep the source fount around for
//! as long as the stream should flow.
//!
//! Everything runs on one cooperative thread: there are no suspension
//! points, only synchronous re-entrant callbacks, and the composites in
//! [`fan`] and [`route`] aggregate pause and stop semantics over multiple
//! peers. [`Diverter`] can re-plug a pipeline mid-stream, replaying
//! buffered-but-undelivered items into the new downstream.

#![deny(missing_docs)]

mod divert;
pub mod fan;
mod flow;
pub mod framing;
pub mod listen;
pub mod memory;
mod pause;
pub mod queue;
pub mod route;
mod siphon;
pub mod test_util;
mod tube;

pub use divert::Diverter;
pub use flow::{Drain, DrainRef, Fount, FountRef, StopReason};
pub use listen::{Flow, Listener, ListenerConfig};
pub use pause::{OncePause, Pause, Pauser};
pub use queue::{Clock, QueueFount, QueueFountConfig, QueueOverflow};
pub use route::{to, Route, Router, To};
pub use tube::{
    receiver, series, Divertable, Emission, Receiver, Series, Signal, Tube, TubeError, TubeResult,
};
