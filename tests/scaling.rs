//! Scaling tests with synthetic 20k event stores.
//!
//! Measures catch-up throughput, rebuild on reopen, filtered scans and
//! subscribers running alongside a writer.

use eventlane::{
    AllSubscriptionRequest, Engine, EventFilter, ExpectedRevision, NewEvent, Position, Principal,
    ReadResponse, Store, StoreConfig, StreamSubscriptionRequest,
};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tempfile::TempDir;

const EVENT_COUNT: usize = 20_000;
const STREAM_COUNT: usize = 50;

fn test_config(dir: &TempDir) -> StoreConfig {
    StoreConfig {
        path: dir.path().to_path_buf(),
        record_cache_size: 1000,
        live_buffer_size: 4096,
        ..Default::default()
    }
}

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report(&self) {
        println!("  {} took {:.2}ms", self.name, self.elapsed_ms());
    }

    fn report_with_count(&self, count: usize) {
        let ms = self.elapsed_ms();
        println!(
            "  {} took {:.2}ms ({} items, {:.0} items/sec)",
            self.name,
            ms,
            count,
            if ms > 0.0 { count as f64 / (ms / 1000.0) } else { 0.0 }
        );
    }
}

fn populate(store: &Store) {
    let event_types = ["created", "updated", "archived", "audited"];
    for batch in 0..EVENT_COUNT / 10 {
        let events = (0..10)
            .map(|i| {
                let index = batch * 10 + i;
                NewEvent::json(
                    event_types[index % event_types.len()],
                    &serde_json::json!({ "index": index }),
                )
                .unwrap()
            })
            .collect();
        store
            .append(
                &format!("entity-{}", batch % STREAM_COUNT),
                ExpectedRevision::Any,
                events,
            )
            .unwrap();
    }
}

fn count_until_caught_up(responses: &mut impl Iterator<Item = eventlane::Result<ReadResponse>>) -> usize {
    let mut events = 0;
    for response in responses {
        match response.unwrap() {
            ReadResponse::Event(_) => events += 1,
            ReadResponse::CaughtUp => return events,
            _ => {}
        }
    }
    panic!("enumerator ended before catching up");
}

// =============================================================================
// Test: catch-up over the whole log, before and after reopen
// =============================================================================

#[test]
fn test_scaling_all_catch_up() {
    println!("\n=== 20k Events, $all Catch-up ===");

    let dir = TempDir::new().unwrap();
    {
        let store = Store::create(test_config(&dir)).unwrap();
        let timer = Timer::new("Append 20k events");
        populate(&store);
        timer.report_with_count(EVENT_COUNT);

        let timer = Timer::new("Sync to disk");
        store.sync().unwrap();
        timer.report();
    }

    let timer = Timer::new("Reopen store (rebuild index)");
    let store = Arc::new(Store::open(test_config(&dir)).unwrap());
    timer.report();
    assert_eq!(store.event_count(), EVENT_COUNT);

    let timer = Timer::new("Catch up $all");
    let mut sub = Engine::for_store(store.clone()).subscribe_to_all(AllSubscriptionRequest {
        principal: Principal::admin(),
        ..Default::default()
    });
    let delivered = count_until_caught_up(&mut sub);
    timer.report_with_count(delivered);
    assert_eq!(delivered, EVENT_COUNT);

    println!("  ✓ $all catch-up test passed");
}

// =============================================================================
// Test: filtered scan over a large log
// =============================================================================

#[test]
fn test_scaling_filtered_scan() {
    println!("\n=== 20k Events, Filtered Scan ===");

    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::create(test_config(&dir)).unwrap());
    populate(&store);

    let timer = Timer::new("Filtered catch-up (event type)");
    let mut sub = Engine::for_store(store.clone()).subscribe_to_all(AllSubscriptionRequest {
        filter: EventFilter::event_type_prefixes(["archived"]).unwrap(),
        max_search_window: Some(500),
        principal: Principal::admin(),
        ..Default::default()
    });

    let mut delivered = 0;
    let mut checkpoints = Vec::new();
    for response in sub.by_ref() {
        match response.unwrap() {
            ReadResponse::Event(_) => delivered += 1,
            ReadResponse::Checkpoint(p) => checkpoints.push(p),
            ReadResponse::CaughtUp => break,
            _ => {}
        }
    }
    timer.report_with_count(EVENT_COUNT);

    assert_eq!(delivered, EVENT_COUNT / 4);
    assert_eq!(checkpoints.len(), EVENT_COUNT / 500);
    assert!(checkpoints.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(checkpoints.last().copied(), store.last_position());

    println!("  ✓ Filtered scan test passed");
}

// =============================================================================
// Test: stream subscriptions over many streams
// =============================================================================

#[test]
fn test_scaling_stream_subscriptions() {
    println!("\n=== 20k Events, {} Stream Subscriptions ===", STREAM_COUNT);

    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::create(test_config(&dir)).unwrap());
    populate(&store);
    let engine = Engine::for_store(store.clone());

    let timer = Timer::new("Catch up every stream");
    let mut total = 0;
    for s in 0..STREAM_COUNT {
        let mut sub = engine
            .subscribe_to_stream(StreamSubscriptionRequest {
                stream: format!("entity-{}", s),
                ..Default::default()
            })
            .unwrap();
        let delivered = count_until_caught_up(&mut sub);
        assert_eq!(delivered, EVENT_COUNT / STREAM_COUNT);
        total += delivered;
    }
    timer.report_with_count(total);
    assert_eq!(store.live().subscriber_count(), 0);

    println!("  ✓ Stream subscription test passed");
}

// =============================================================================
// Test: live subscribers alongside a writer
// =============================================================================

#[test]
fn test_scaling_live_subscribers() {
    println!("\n=== Live Subscribers With Concurrent Writer ===");

    let dir = TempDir::new().unwrap();
    let store = Arc::new(Store::create(test_config(&dir)).unwrap());
    let engine = Engine::for_store(store.clone());
    let writes = 2_000;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let mut sub = engine.subscribe_to_all(AllSubscriptionRequest {
                checkpoint: Some(Position::END),
                principal: Principal::admin(),
                ..Default::default()
            });
            // Registered with the live feed before any write.
            assert!(matches!(
                sub.next_response().unwrap(),
                Some(ReadResponse::SubscriptionConfirmed { .. })
            ));
            assert!(matches!(sub.next_response().unwrap(), Some(ReadResponse::CaughtUp)));
            thread::spawn(move || {
                let mut last = Position::START;
                let mut delivered = 0;
                while delivered < writes {
                    match sub.next_response().unwrap().unwrap() {
                        ReadResponse::Event(e) => {
                            let position = e.original_position().unwrap();
                            assert!(position > last);
                            last = position;
                            delivered += 1;
                        }
                        ReadResponse::Failed(reason) => panic!("subscription failed: {}", reason),
                        _ => {}
                    }
                }
                delivered
            })
        })
        .collect();

    let timer = Timer::new("Write 2k events with 4 subscribers");
    for i in 0..writes {
        store
            .append(
                &format!("live-{}", i % 10),
                ExpectedRevision::Any,
                vec![NewEvent::raw("tick", Vec::new())],
            )
            .unwrap();
    }
    let delivered: usize = readers.into_iter().map(|r| r.join().unwrap()).sum();
    timer.report_with_count(delivered);
    assert_eq!(delivered, writes * 4);

    println!("  ✓ Live subscriber test passed");
}
