//! Mid-stream re-plugging.
//!
//! A [`Diverter`] wraps a [`Divertable`] tube and can, at any point (even
//! re-entrantly from inside the pipeline it is part of), unplug the tube
//! from its downstream and hand the upstream to a new drain. Output the
//! tube had already emitted but not yet delivered is converted back to
//! input form with [`Divertable::reassemble`] and replayed into the new
//! drain first, so the new pipeline observes a semantically equivalent
//! stream.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::flow::{DrainRef, Fount, FountRef};
use crate::siphon::{self, NullFount, SiphonCore, SiphonDrain, SiphonFount};
use crate::tube::{series, Divertable, Emission, Tube, TubeResult};

/// A drain wrapping a divertable tube, able to re-route the flow into a
/// new drain on request.
pub struct Diverter<T: Divertable> {
    core: Rc<SiphonCore<T>>,
    drain: Rc<SiphonDrain<T>>,
    fount: Rc<SiphonFount<T>>,
}

impl<T: Divertable> Diverter<T> {
    /// Wrap `tube` in a siphon that can be diverted.
    pub fn new(tube: T) -> Self {
        let (drain, fount) = siphon::siphon(tube);
        Diverter {
            core: Rc::clone(drain.core()),
            drain,
            fount,
        }
    }

    /// The drain end; attach the upstream fount here.
    pub fn drain(&self) -> DrainRef<T::In> {
        Rc::clone(&self.drain) as DrainRef<T::In>
    }

    /// The fount end; attach the (original) downstream drain here.
    pub fn fount(&self) -> FountRef<T::Out> {
        Rc::clone(&self.fount) as FountRef<T::Out>
    }

    /// Divert the flow arriving at this diverter into `new_drain`.
    ///
    /// Buffered output, including output currently suppressed by a pause,
    /// is ejected, passed through [`Divertable::reassemble`], and replayed
    /// into `new_drain` before the upstream itself is re-attached there.
    /// The original downstream receives nothing further, not even the
    /// terminal notification. `divert` may be called re-entrantly, from
    /// inside `new_drain`'s machinery or from the wrapped tube itself.
    pub fn divert(&self, new_drain: DrainRef<T::In>) {
        let buffered = self.core.eject_pending();
        let reassembled = self.core.tube().reassemble(buffered);
        let upstream = self.core.upstream_fount();
        let draining = series(DrainingTube::new(reassembled, upstream, Rc::clone(&new_drain)));
        let kick: Rc<NullFount<T::In>> = NullFount::new();
        kick.flow_to(Some(draining.drain()));
        draining.fount().flow_to(Some(new_drain));
    }
}

/// Replays a list of items as its greeting, then hands the eventual
/// upstream over to the eventual downstream.
struct DrainingTube<T: 'static> {
    items: RefCell<VecDeque<T>>,
    handoff: RefCell<Option<(Option<FountRef<T>>, DrainRef<T>)>>,
}

impl<T: 'static> DrainingTube<T> {
    fn new(items: Vec<T>, upstream: Option<FountRef<T>>, downstream: DrainRef<T>) -> Self {
        DrainingTube {
            items: RefCell::new(VecDeque::from(items)),
            handoff: RefCell::new(Some((upstream, downstream))),
        }
    }
}

impl<T: 'static> Tube for DrainingTube<T> {
    type In = T;
    type Out = T;

    fn started(&self) -> TubeResult<T> {
        let mut items = std::mem::take(&mut *self.items.borrow_mut());
        let mut handoff = self.handoff.borrow_mut().take();
        Ok(Emission::lazy(std::iter::from_fn(move || {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            // Greeting exhausted: re-point the old upstream at the new
            // downstream. The hand-off must happen lazily, after the last
            // replayed item went out, so ordering is preserved.
            if let Some((upstream, downstream)) = handoff.take()
                && let Some(upstream) = upstream
            {
                upstream.flow_to(Some(downstream));
            }
            None
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{Drain, Fount};
    use crate::test_util::{FakeDrain, FakeFount};
    use crate::tube::Signal;

    struct DivertablePassthru;

    impl Tube for DivertablePassthru {
        type In = String;
        type Out = String;

        fn received(&self, item: String) -> TubeResult<String> {
            Ok(Emission::one(item))
        }
    }

    impl Divertable for DivertablePassthru {
        fn reassemble(&self, buffered: Vec<String>) -> Vec<String> {
            buffered
        }
    }

    /// A tube that asks its diverter to switch as soon as it sees a
    /// trigger item, swallowing the trigger.
    struct Switcher {
        diverter: Rc<Diverter<DivertablePassthru>>,
        target: RefCell<Option<DrainRef<String>>>,
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Tube for Switcher {
        type In = String;
        type Out = String;

        fn received(&self, item: String) -> TubeResult<String> {
            self.seen.borrow_mut().push(item);
            if let Some(target) = self.target.borrow_mut().take() {
                self.diverter.divert(target);
            }
            Ok(Emission::none())
        }
    }

    fn switched(label: &str) -> impl Tube<In = String, Out = String> {
        let label = label.to_string();
        crate::tube::receiver(move |item: String| Emission::one(format!("{label} {item}")))
    }

    #[test]
    fn divert_reroutes_subsequent_items() {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let diverter = Rc::new(Diverter::new(DivertablePassthru));

        let new_drain =
            series(switched("switched")).into_drain(fd.clone() as DrainRef<String>);
        let switcher = series(Switcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(new_drain)),
            seen: Rc::clone(&seen),
        });

        Rc::clone(&ff).flow_to(Some(diverter.drain()));
        diverter
            .fount()
            .flow_to(Some(switcher.into_drain(fd.clone() as DrainRef<String>)));
        ff.drain().unwrap().receive(String::from("switch"));
        ff.drain().unwrap().receive(String::from("to switchee"));
        assert_eq!(*seen.borrow(), vec!["switch"]);
        assert_eq!(fd.received(), vec!["switched to switchee"]);
    }

    struct BorkSplitter;

    impl Tube for BorkSplitter {
        type In = String;
        type Out = String;

        fn received(&self, item: String) -> TubeResult<String> {
            let pieces: Vec<String> = item.split("BORK").map(String::from).collect();
            Ok(pieces.into())
        }
    }

    impl Divertable for BorkSplitter {
        fn reassemble(&self, buffered: Vec<String>) -> Vec<String> {
            let mut items = Vec::new();
            for element in buffered {
                items.push(String::from("(bork was here)"));
                items.push(element);
            }
            items
        }
    }

    #[test]
    fn divert_reassembles_undelivered_output() {
        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let pre_switch = Rc::new(RefCell::new(Vec::new()));
        let diverter = Rc::new(Diverter::new(BorkSplitter));

        struct ReassemblySwitcher {
            diverter: Rc<Diverter<BorkSplitter>>,
            target: RefCell<Option<DrainRef<String>>>,
            pre_switch: Rc<RefCell<Vec<String>>>,
        }

        impl Tube for ReassemblySwitcher {
            type In = String;
            type Out = String;

            fn received(&self, item: String) -> TubeResult<String> {
                self.pre_switch.borrow_mut().push(item);
                let target = self.target.borrow_mut().take().expect("switched twice");
                self.diverter.divert(target);
                Ok(Emission::none())
            }
        }

        let new_drain =
            series(switched("switched")).into_drain(fd.clone() as DrainRef<String>);
        let switcher = series(ReassemblySwitcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(new_drain)),
            pre_switch: Rc::clone(&pre_switch),
        });

        Rc::clone(&ff).flow_to(Some(diverter.drain()));
        diverter
            .fount()
            .flow_to(Some(switcher.into_drain(fd.clone() as DrainRef<String>)));
        ff.drain()
            .unwrap()
            .receive(String::from("beforeBORKto switchee"));

        assert_eq!(*pre_switch.borrow(), vec!["before"]);
        assert_eq!(
            fd.received(),
            vec!["switched (bork was here)", "switched to switchee"]
        );
    }

    #[test]
    fn divert_while_paused_reassembles_the_rest() {
        struct SpaceSplitter;

        impl Tube for SpaceSplitter {
            type In = String;
            type Out = String;

            fn received(&self, item: String) -> TubeResult<String> {
                let pieces: Vec<String> = item.split(' ').map(String::from).collect();
                Ok(pieces.into())
            }
        }

        impl Divertable for SpaceSplitter {
            fn reassemble(&self, buffered: Vec<String>) -> Vec<String> {
                vec![buffered.join(" ")]
            }
        }

        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let pausing = FakeDrain::new();
        pausing.pause_on_receive();
        let diverter = Diverter::new(SpaceSplitter);
        Rc::clone(&ff).flow_to(Some(diverter.drain()));
        diverter
            .fount()
            .flow_to(Some(pausing.clone() as DrainRef<String>));
        ff.drain().unwrap().receive(String::from("foo bar baz"));
        diverter.divert(fd.clone() as DrainRef<String>);
        assert_eq!(pausing.received(), vec!["foo"]);
        assert_eq!(fd.received(), vec!["bar baz"]);
    }

    #[test]
    fn divert_controls_where_in_flight_output_goes() {
        struct YieldingSwitcher {
            diverter: Rc<Diverter<DivertablePassthru>>,
            target: RefCell<Option<DrainRef<String>>>,
        }

        impl Tube for YieldingSwitcher {
            type In = String;
            type Out = String;

            fn received(&self, item: String) -> TubeResult<String> {
                if item == "switch" {
                    let diverter = Rc::clone(&self.diverter);
                    let target = self.target.borrow_mut().take().expect("switched twice");
                    let mut step = 0;
                    Ok(Emission::signals(std::iter::from_fn(move || {
                        step += 1;
                        match step {
                            1 => Some(Signal::Item(String::from("diverting"))),
                            2 => {
                                diverter.divert(Rc::clone(&target));
                                Some(Signal::Item(String::from("switched")))
                            }
                            _ => None,
                        }
                    })))
                } else {
                    Ok(Emission::one(item))
                }
            }
        }

        let ff = FakeFount::new();
        let fd = FakeDrain::new();
        let diverter = Rc::new(Diverter::new(DivertablePassthru));
        let new_drain =
            series(switched("switched:")).into_drain(fd.clone() as DrainRef<String>);

        let head = series(YieldingSwitcher {
            diverter: Rc::clone(&diverter),
            target: RefCell::new(Some(new_drain)),
        })
        .into_drain(diverter.drain());
        Rc::clone(&ff).flow_to(Some(head));
        diverter.fount().flow_to(Some(fd.clone() as DrainRef<String>));

        ff.drain().unwrap().receive(String::from("before"));
        ff.drain().unwrap().receive(String::from("switch"));
        ff.drain().unwrap().receive(String::from("after"));
        assert_eq!(
            fd.received(),
            vec![
                "before",
                "diverting",
                "switched: switched",
                "switched: after"
            ]
        );
    }

    #[test]
    fn divert_during_buffered_replay_reaches_the_final_drain() {
        struct FirstDivertable {
            diverter: Rc<RefCell<Option<Rc<Diverter<FirstDivertable>>>>>,
            target: Rc<RefCell<Option<DrainRef<String>>>>,
        }

        impl Tube for FirstDivertable {
            type In = String;
            type Out = String;

            fn received(&self, _item: String) -> TubeResult<String> {
                let diverter = self.diverter.borrow().clone().expect("diverter unset");
                let target = self.target.borrow_mut().take().expect("switched twice");
                diverter.divert(target);
                Ok(Emission::none())
            }
        }

        impl Divertable for FirstDivertable {
            fn reassemble(&self, _buffered: Vec<String>) -> Vec<String> {
                vec![String::from("more data"), String::from("yet more data")]
            }
        }

        struct SecondDivertable {
            diverter: Rc<RefCell<Option<Rc<Diverter<SecondDivertable>>>>>,
            target: Rc<RefCell<Option<DrainRef<String>>>>,
        }

        impl Tube for SecondDivertable {
            type In = String;
            type Out = String;

            fn received(&self, _item: String) -> TubeResult<String> {
                let diverter = self.diverter.borrow().clone().expect("diverter unset");
                if let Some(target) = self.target.borrow_mut().take() {
                    diverter.divert(target);
                }
                Ok(Emission::none())
            }
        }

        impl Divertable for SecondDivertable {
            fn reassemble(&self, _buffered: Vec<String>) -> Vec<String> {
                Vec::new()
            }
        }

        let ff = FakeFount::new();
        let final_drain = FakeDrain::new();

        let first_slot = Rc::new(RefCell::new(None));
        let first_target = Rc::new(RefCell::new(None));
        let first = Rc::new(Diverter::new(FirstDivertable {
            diverter: Rc::clone(&first_slot),
            target: Rc::clone(&first_target),
        }));
        *first_slot.borrow_mut() = Some(Rc::clone(&first));

        let second_slot = Rc::new(RefCell::new(None));
        let second_target = Rc::new(RefCell::new(None));
        let second = Rc::new(Diverter::new(SecondDivertable {
            diverter: Rc::clone(&second_slot),
            target: Rc::clone(&second_target),
        }));
        *second_slot.borrow_mut() = Some(Rc::clone(&second));

        *first_target.borrow_mut() = Some(second.drain());
        *second_target.borrow_mut() = Some(final_drain.clone() as DrainRef<String>);

        Rc::clone(&ff).flow_to(Some(first.drain()));
        ff.drain().unwrap().receive(String::from("first data"));
        assert_eq!(final_drain.received(), vec!["yet more data"]);
    }
}
