//! Property-based invariant tests for `Signal` and `EventEmitter`.
//!
//! 1. Delivery order equals connection order.
//! 2. A `connect_once` listener fires exactly once across any number of
//!    emissions.
//! 3. Disconnecting a listener from inside an emission never skips or
//!    double-invokes the survivors.
//! 4. Emitting on one channel never reaches listeners of another.

use std::cell::RefCell;
use std::rc::Rc;

use patchkit_core::{ConnectionId, EventEmitter, Signal};
use proptest::prelude::*;

type Log = Rc<RefCell<Vec<usize>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

// ═════════════════════════════════════════════════════════════════════════
// 1-2. Ordering and one-shot listeners
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn signal_delivers_in_connection_order(
        once_flags in proptest::collection::vec(any::<bool>(), 0..24),
        emissions in 1usize..5,
    ) {
        let log = new_log();
        let signal: Signal<()> = Signal::new();
        for (i, once) in once_flags.iter().copied().enumerate() {
            let log = Rc::clone(&log);
            let handler = move |_: &()| log.borrow_mut().push(i);
            if once {
                signal.connect_once(handler);
            } else {
                signal.connect(handler);
            }
        }

        let mut expected = Vec::new();
        for round in 0..emissions {
            signal.emit(&());
            expected.extend(
                once_flags
                    .iter()
                    .enumerate()
                    .filter(|(_, once)| round == 0 || !**once)
                    .map(|(i, _)| i),
            );
        }
        prop_assert_eq!(&*log.borrow(), &expected);
        let persistent = once_flags.iter().filter(|once| !**once).count();
        prop_assert_eq!(signal.listener_count(), persistent);
    }

    #[test]
    fn emitter_once_listeners_fire_exactly_once(
        channels in proptest::collection::vec(0u8..3, 1..24),
        emissions in 1usize..6,
    ) {
        let log = new_log();
        let emitter: EventEmitter<()> = EventEmitter::new();
        for (i, channel) in channels.iter().enumerate() {
            let log = Rc::clone(&log);
            emitter.connect_once(&format!("ch{channel}"), move |_: &()| log.borrow_mut().push(i));
        }
        for _ in 0..emissions {
            for channel in 0u8..3 {
                emitter.emit(&format!("ch{channel}"), &());
            }
        }
        let mut fired = log.borrow().clone();
        fired.sort_unstable();
        let all: Vec<usize> = (0..channels.len()).collect();
        prop_assert_eq!(fired, all);
        prop_assert_eq!(emitter.total_listeners(), 0);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Disconnect during emission
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn disconnect_during_emission_spares_survivors(
        count in 2usize..16,
        killer_seed in any::<usize>(),
        victim_seed in any::<usize>(),
    ) {
        let killer = killer_seed % count;
        let victim = victim_seed % count;
        let log = new_log();
        let signal: Signal<()> = Signal::new();
        let ids: Rc<RefCell<Vec<ConnectionId>>> = Rc::new(RefCell::new(Vec::new()));

        for i in 0..count {
            let log = Rc::clone(&log);
            let ids_in = Rc::clone(&ids);
            let signal_in = signal.clone();
            let id = signal.connect(move |_: &()| {
                log.borrow_mut().push(i);
                if i == killer {
                    let target = ids_in.borrow()[victim];
                    signal_in.disconnect(target);
                }
            });
            ids.borrow_mut().push(id);
        }

        signal.emit(&());
        // The victim is skipped only if it comes after the killer.
        let expected: Vec<usize> = (0..count)
            .filter(|i| !(victim > killer && *i == victim))
            .collect();
        prop_assert_eq!(&*log.borrow(), &expected);
        prop_assert_eq!(signal.listener_count(), count - 1);

        // Handlers hold clones of the signal; break the cycle.
        for id in ids.borrow().iter() {
            signal.disconnect(*id);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Channel isolation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn channels_are_isolated(
        listeners in proptest::collection::vec(0u8..4, 0..20),
        target in 0u8..4,
    ) {
        let log = new_log();
        let emitter: EventEmitter<()> = EventEmitter::new();
        for (i, channel) in listeners.iter().enumerate() {
            let log = Rc::clone(&log);
            emitter.connect(&format!("ch{channel}"), move |_: &()| log.borrow_mut().push(i));
        }
        emitter.emit(&format!("ch{target}"), &());
        let expected: Vec<usize> = listeners
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == target)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(&*log.borrow(), &expected);
        prop_assert_eq!(emitter.has_listeners_for(&format!("ch{target}")), !expected.is_empty());
    }
}
