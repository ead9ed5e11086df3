//! Demonstration of sealstream shutdown scenarios.
//!
//! Run with: `cargo run -p sealstream --bin demo`
//!
//! Set `RUST_LOG=sealstream=debug` to watch the roles decide and seal.
//! Press Ctrl-C during the last demo to become its decider.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sealstream::{
    Flow, Pipeline, PipelineConfig, Produce, ShutdownReport, Topology, TracingObserver,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const STOP_VALUE: u64 = 333;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== sealstream Demo ===\n");

    demo_one_producer_many_consumers().await?;
    demo_many_producers_one_consumer().await?;
    demo_many_producers_many_consumers().await?;
    demo_sole_producer().await?;
    demo_ctrl_c().await?;

    println!("\n=== All demos completed successfully! ===");
    Ok(())
}

fn print_report(report: &ShutdownReport) {
    println!("  Decider: {} ({})", report.decider, report.reason);
    println!(
        "  Produced {}, delivered {}, dropped {}",
        report.produced, report.delivered, report.dropped
    );
}

/// Emits random values until it emits the stop value, then runs dry.
fn until_stop_value(seed: u64) -> impl FnMut() -> Produce<u64> + Send {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut done = false;
    move || {
        if done {
            return Produce::Exhausted;
        }
        let value = rng.gen_range(0..10_000);
        done = value == STOP_VALUE;
        Produce::Item(value)
    }
}

/// Demo 1: one producer, many consumers; the coordinator seals on exhaustion
async fn demo_one_producer_many_consumers() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 1: 1 producer / 1000 consumers ---");

    let report = Pipeline::new(PipelineConfig::fan_out(1000, 100))?
        .with_producers(|p| until_stop_value(p as u64))
        .run()
        .await;

    print_report(&report);
    println!("  ✓ Producer ran dry, consumers drained\n");
    Ok(())
}

/// Demo 2: many producers, one consumer, fifteen third parties racing
async fn demo_many_producers_one_consumer() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 2: 1000 producers / 1 consumer / 15 third parties ---");

    let report = Pipeline::new(PipelineConfig::new(1000, 1, 15, 100))?
        .with_producers(|p| {
            let mut rng = StdRng::seed_from_u64(p as u64);
            move || {
                let value = rng.gen_range(0..10_000);
                if value == STOP_VALUE {
                    Produce::Stop(format!("saw {}", value))
                } else {
                    Produce::Item(value)
                }
            }
        })
        .with_third_parties(|i| async move {
            let delay = rand::thread_rng().gen_range(1..50);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Some(format!("timer {} after {}ms", i, delay))
        })
        .with_observer(TracingObserver)
        .run()
        .await;

    print_report(&report);
    println!("  ✓ One decider recorded\n");
    Ok(())
}

/// Demo 3: many producers and consumers; a consumer or a watchdog decides
async fn demo_many_producers_many_consumers() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 3: 10 producers / 10 consumers / 3 third parties ---");

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);

    let report = Pipeline::new(PipelineConfig::new(10, 10, 3, 16))?
        .with_producers(|p| {
            let mut rng = StdRng::seed_from_u64(1000 + p as u64);
            move || Produce::Item(rng.gen_range(0..10_000u64))
        })
        .with_consumers(move |_| {
            let counter = Arc::clone(&counter);
            move |value: u64| {
                counter.fetch_add(1, Ordering::Relaxed);
                if value == STOP_VALUE {
                    Flow::Stop(format!("received {}", value))
                } else {
                    Flow::Continue
                }
            }
        })
        .with_third_parties(|i| async move {
            tokio::time::sleep(Duration::from_secs(1 + i as u64)).await;
            Some(format!("watchdog {}", i))
        })
        .run()
        .await;

    print_report(&report);
    println!("  Consumers handled {} items", received.load(Ordering::Relaxed));
    println!("  ✓ Accepted items drained after the decision\n");
    Ok(())
}

/// Demo 4: a sole producer seals the stream itself
async fn demo_sole_producer() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 4: sole producer seals ---");

    let config = PipelineConfig::new(1, 4, 0, 8).with_topology(Topology::SoleProducer);
    let report = Pipeline::new(config)?
        .with_producers(|_| {
            let mut next = 0u64;
            move || {
                next += 1;
                if next > 20 {
                    Produce::Exhausted
                } else {
                    Produce::Item(next)
                }
            }
        })
        .run()
        .await;

    print_report(&report);
    println!("  ✓ Stream sealed by its only writer\n");
    Ok(())
}

/// Demo 5: an OS signal as a third party
async fn demo_ctrl_c() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Demo 5: Ctrl-C or a 2s deadline, whichever comes first ---");

    let config = PipelineConfig::new(2, 2, 2, 8).with_produce_interval(Duration::from_millis(100));
    let report = Pipeline::new(config)?
        .with_producers(|p| {
            let mut next = 0u64;
            move || {
                next += 1;
                Produce::Item(p as u64 * 1000 + next)
            }
        })
        .with_third_parties(|i| async move {
            if i == 0 {
                tokio::signal::ctrl_c().await.ok()?;
                Some("ctrl-c".to_string())
            } else {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Some("deadline".to_string())
            }
        })
        .run()
        .await;

    print_report(&report);
    println!("  ✓ Third party decided\n");
    Ok(())
}
