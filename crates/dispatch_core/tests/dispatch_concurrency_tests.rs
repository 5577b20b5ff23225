mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dispatch_core::logging::init_test_logging;
use dispatch_core::test_helpers::{assert_dispatch_invariants, random_location_near, test_dispatcher};
use dispatch_core::{DispatchError, DispatchResult, RiderId};
use rand::Rng;
use support::fixtures::{seeded_destination, seeded_origin, seeded_rng};

const WORKERS: u64 = 8;
const OPS_PER_WORKER: usize = 400;

/// Only ordering errors are expected from racing callers; anything else is a bug.
fn tolerate_ordering(result: DispatchResult<()>) {
    match result {
        Ok(()) | Err(DispatchError::InvalidTransition { .. }) => {}
        Err(other) => panic!("unexpected error under contention: {other:?}"),
    }
}

#[test]
fn concurrent_callers_never_double_book() {
    init_test_logging();
    let (dispatcher, _clock) = test_dispatcher();
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        // Reader: every snapshot of active matches must be exclusive.
        let reader = scope.spawn(|| {
            let mut snapshots = 0usize;
            while !done.load(Ordering::Acquire) {
                let active = dispatcher.list_active_matches();
                let drivers: HashSet<_> = active.iter().map(|m| m.driver_id).collect();
                let riders: HashSet<_> = active.iter().map(|m| m.rider_id).collect();
                assert_eq!(drivers.len(), active.len(), "driver double-booked");
                assert_eq!(riders.len(), active.len(), "rider double-booked");
                snapshots += 1;
            }
            snapshots
        });

        let workers: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let dispatcher = &dispatcher;
                scope.spawn(move || {
                    let mut rng = seeded_rng(1000 + worker);
                    let mut riders: Vec<RiderId> = Vec::new();
                    let mut drivers = Vec::new();
                    for _ in 0..OPS_PER_WORKER {
                        match rng.gen_range(0..100) {
                            0..=29 => {
                                let from = random_location_near(&mut rng, seeded_origin(), 3.0);
                                let to = random_location_near(&mut rng, seeded_destination(), 1.0);
                                riders.push(dispatcher.request_ride(from, to).expect("request"));
                            }
                            30..=49 => {
                                let at = random_location_near(&mut rng, seeded_origin(), 3.0);
                                drivers.push(dispatcher.driver_online(at).expect("online"));
                            }
                            50..=59 if !drivers.is_empty() => {
                                let id = drivers[rng.gen_range(0..drivers.len())];
                                dispatcher.driver_offline(id).expect("offline never fails for known ids");
                            }
                            60..=64 if !drivers.is_empty() => {
                                let id = drivers[rng.gen_range(0..drivers.len())];
                                let at = random_location_near(&mut rng, seeded_origin(), 3.0);
                                tolerate_ordering(dispatcher.reconnect_driver(id, at));
                            }
                            65..=69 if !drivers.is_empty() => {
                                let id = drivers[rng.gen_range(0..drivers.len())];
                                let at = random_location_near(&mut rng, seeded_origin(), 3.0);
                                dispatcher
                                    .update_driver_location(id, at)
                                    .expect("update never fails for known ids");
                            }
                            70..=79 if !riders.is_empty() => {
                                let id = riders[rng.gen_range(0..riders.len())];
                                tolerate_ordering(dispatcher.cancel_ride(id));
                            }
                            80..=87 if !riders.is_empty() => {
                                let id = riders[rng.gen_range(0..riders.len())];
                                tolerate_ordering(dispatcher.start_trip(id));
                            }
                            88..=99 if !riders.is_empty() => {
                                let id = riders[rng.gen_range(0..riders.len())];
                                tolerate_ordering(dispatcher.complete_ride(id));
                            }
                            _ => {}
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("worker panicked");
        }
        done.store(true, Ordering::Release);
        let snapshots = reader.join().expect("reader panicked");
        assert!(snapshots > 0);
    });

    assert_dispatch_invariants(&dispatcher);

    let counts = dispatcher.counts();
    assert_eq!(counts.drivers_engaged(), counts.matches_active);
    assert_eq!(counts.riders_matched, counts.matches_active);
}

#[test]
fn racing_requests_for_one_driver_get_one_match() {
    let (dispatcher, _clock) = test_dispatcher();
    let d1 = dispatcher.driver_online(seeded_origin()).expect("d1");

    let riders: Vec<RiderId> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dispatcher = &dispatcher;
                scope.spawn(move || {
                    dispatcher
                        .request_ride(seeded_origin(), seeded_destination())
                        .expect("request")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("request thread"))
            .collect()
    });

    let matched: Vec<_> = riders
        .iter()
        .filter_map(|&id| dispatcher.match_for_rider(id))
        .collect();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].driver_id, d1);
    assert_eq!(dispatcher.waiting_riders().len(), 15);
    assert_dispatch_invariants(&dispatcher);
}
