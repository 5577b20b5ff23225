//! Load tests for dispatch_core: throughput under a large fleet and queue.

mod support;

use std::time::Instant;

use dispatch_core::test_helpers::{assert_dispatch_invariants, test_dispatcher};
use support::fixtures::{online_drivers, request_rides, seeded_rng};

#[test]
#[ignore] // Only run explicitly: cargo test --package dispatch_core --test load_tests -- --ignored
fn test_sustained_load() {
    let (dispatcher, _clock) = test_dispatcher();
    let mut rng = seeded_rng(42);

    let start = Instant::now();
    online_drivers(&dispatcher, &mut rng, 5_000, 20.0);
    let mut completed = 0usize;
    for _ in 0..20 {
        for rider in request_rides(&dispatcher, &mut rng, 1_000, 20.0) {
            if dispatcher.match_for_rider(rider).is_some() {
                dispatcher.complete_ride(rider).expect("complete");
                completed += 1;
            }
        }
    }
    let duration = start.elapsed();

    let ops_per_sec = (5_000 + 2 * completed) as f64 / duration.as_secs_f64();
    println!(
        "Sustained load test: {} rides in {:.2}s ({:.0} ops/sec)",
        completed,
        duration.as_secs_f64(),
        ops_per_sec
    );

    assert_eq!(completed, 20_000);
    assert!(ops_per_sec > 1000.0, "throughput too low: {ops_per_sec:.0} ops/sec");
    assert_dispatch_invariants(&dispatcher);
}

#[test]
#[ignore]
fn test_queue_drain_when_fleet_arrives_late() {
    let (dispatcher, _clock) = test_dispatcher();
    let mut rng = seeded_rng(7);

    let riders = request_rides(&dispatcher, &mut rng, 2_000, 10.0);
    assert_eq!(dispatcher.waiting_riders().len(), riders.len());

    let start = Instant::now();
    online_drivers(&dispatcher, &mut rng, 1_500, 10.0);
    println!(
        "Drained {} riders in {:.2}s",
        riders.len() - dispatcher.waiting_riders().len(),
        start.elapsed().as_secs_f64()
    );

    assert_eq!(dispatcher.waiting_riders().len(), 500);
    assert_dispatch_invariants(&dispatcher);
}
