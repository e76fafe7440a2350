//! Basic circuit breaker usage example

use std::sync::Arc;
use std::time::Duration;
use traffic_breaker::{CircuitBreaker, CircuitError, ManualClock, PredicateClassifier};

/// Stand-in for an HTTP response: only the status code matters here
#[derive(Debug)]
struct Response {
    status: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Circuit Breaker Basic Example ===\n");

    // The transport decides what a failure is; the breaker only sees a bool
    let classifier = Arc::new(PredicateClassifier::new(|ctx| {
        ctx.outcome
            .value::<Response>()
            .is_some_and(|response| response.status >= 400)
    }));

    // A manual clock lets the demo skip the open timeout instantly
    let clock = Arc::new(ManualClock::new());

    let circuit = match CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .success_threshold(2)
        .timeout(Duration::from_secs(5))
        .clock(clock.clone())
        .failure_classifier(classifier)
        .on_open(|name, s| println!("Circuit '{}' opened after {} failures", name, s.failures))
        .on_half_open(|name, _| println!("Circuit '{}' half-open, testing...", name))
        .on_close(|name, _| println!("Circuit '{}' closed", name))
        .build()
    {
        Ok(circuit) => circuit,
        Err(e) => {
            eprintln!("invalid breaker configuration: {}", e);
            return;
        }
    };

    println!("Initial state: {}\n", circuit.state_name());

    println!("--- Successful calls ---");
    for i in 1..=2 {
        match circuit.call(move || Ok::<_, String>(Response { status: 200 + i })) {
            Ok(response) => println!("ok: status {}", response.status),
            Err(e) => println!("error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Triggering failures ---");
    let _ = circuit.call(|| Ok::<_, String>(Response { status: 503 }));
    let _ = circuit.call(|| Err::<Response, _>("connection reset".to_string()));
    let _ = circuit.call(|| Ok::<_, String>(Response { status: 500 }));
    println!("State: {}\n", circuit.state_name());

    println!("--- Attempting call while open ---");
    match circuit.call(|| Ok::<_, String>(Response { status: 200 })) {
        Err(CircuitError::Open(open)) => println!("rejected: {}", open),
        Err(CircuitError::Execution(e)) => println!("failed: {}", e),
        Ok(_) => println!("unexpected success"),
    }
    println!();

    println!("--- After the open timeout ---");
    clock.advance(Duration::from_secs(6));
    for _ in 0..2 {
        match circuit.call(|| Ok::<_, String>(Response { status: 200 })) {
            Ok(response) => println!("trial ok: status {}", response.status),
            Err(e) => println!("trial error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state_name());

    println!("--- Resetting circuit ---");
    circuit.reset();
    let snapshot = circuit.snapshot();
    println!(
        "State after reset: {} (failures: {}, successes: {})",
        snapshot.state, snapshot.failures, snapshot.successes
    );
}
