//! Drive a dispatcher from several threads and print the resulting state.
//!
//! Run with: cargo run -p dispatch_core --example dispatch_run
//! Set RUST_LOG=dispatch_core=debug for per-commit logs.

use std::sync::Arc;

use dispatch_core::logging::{init_logging, DEFAULT_FILTER};
use dispatch_core::test_helpers::{random_location_near, test_distant_location, test_location};
use dispatch_core::{DispatchConfig, Dispatcher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    const NUM_DRIVERS: usize = 100;
    const RIDERS_PER_THREAD: usize = 125;
    const THREADS: u64 = 4;

    init_logging(DEFAULT_FILTER)?;

    let dispatcher = Arc::new(Dispatcher::new(DispatchConfig::default())?);

    let mut rng = StdRng::seed_from_u64(123);
    let drivers: Vec<_> = (0..NUM_DRIVERS)
        .map(|_| dispatcher.driver_online(random_location_near(&mut rng, test_location(), 8.0)))
        .collect::<Result<_, _>>()?;

    let handles: Vec<_> = (0..THREADS)
        .map(|thread| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || -> Result<usize, dispatch_core::DispatchError> {
                let mut rng = StdRng::seed_from_u64(1000 + thread);
                let mut completed = 0;
                for _ in 0..RIDERS_PER_THREAD {
                    let from = random_location_near(&mut rng, test_location(), 8.0);
                    let to = random_location_near(&mut rng, test_distant_location(), 3.0);
                    let rider = dispatcher.request_ride(from, to)?;
                    if dispatcher.match_for_rider(rider).is_none() {
                        continue;
                    }
                    match rng.gen_range(0..10) {
                        0 => dispatcher.cancel_ride(rider)?,
                        _ => {
                            dispatcher.start_trip(rider)?;
                            dispatcher.complete_ride(rider)?;
                            completed += 1;
                        }
                    }
                }
                Ok(completed)
            })
        })
        .collect();

    let mut completed = 0;
    for handle in handles {
        completed += handle.join().map_err(|_| "worker thread panicked")??;
    }

    // A few drivers drop out; their riders go back to the queue.
    for driver in drivers.iter().take(5) {
        dispatcher.driver_offline(*driver)?;
    }

    let counts = dispatcher.counts();
    println!(
        "--- Dispatch run ({} drivers, {} riders over {} threads, seed 123) ---",
        NUM_DRIVERS,
        RIDERS_PER_THREAD * THREADS as usize,
        THREADS
    );
    println!("Completed trips: {completed}");
    println!("{}", serde_json::to_string_pretty(&counts)?);

    let active = dispatcher.list_active_matches();
    println!("\nActive matches (first 10 of {}):", active.len());
    for m in active.iter().take(10) {
        println!(
            "  rider={} driver={}  pickup={:.2} km  eta={} s",
            m.rider_id,
            m.driver_id,
            m.distance_km,
            m.eta_ms / 1000
        );
    }
    Ok(())
}
