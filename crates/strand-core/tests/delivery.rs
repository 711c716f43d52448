use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::watch;

use strand_core::app::{Consumer, ConsumerOptions, PollBackoff, Producer};
use strand_core::domain::{
    EntryId, EventType, HandlerError, Message, StartPosition, TaskId,
};
use strand_core::impls::InMemoryLogStore;
use strand_core::ports::{FixedClock, LogStore, MessageHandler};

const Q: &str = "default_queue";
const G: &str = "default_group";

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Message>>,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, _: &EventType, message: &Message) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Handler that never succeeds; stands in for a consumer that dies before ack.
struct Crashing;

#[async_trait]
impl MessageHandler for Crashing {
    async fn handle(&self, _: &EventType, _: &Message) -> Result<(), HandlerError> {
        Err(HandlerError::failed("process died"))
    }
}

fn options(id: &str) -> ConsumerOptions {
    ConsumerOptions {
        id: id.to_string(),
        queue: Q.to_string(),
        group: G.to_string(),
        start: StartPosition::Beginning,
        batch_size: 10,
        reclaim_interval: Duration::from_secs(30),
        min_idle: Duration::from_secs(30),
        block_timeout: Duration::from_millis(50),
        backoff: PollBackoff::fixed(Duration::from_millis(5)),
        default_event_type: EventType::new("user.registered.v1"),
        poison_warn_after: 5,
    }
}

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap())
}

#[tokio::test]
async fn produced_task_is_handled_once_and_gone_after_ack() {
    let store = Arc::new(InMemoryLogStore::new());
    let recorder = Arc::new(Recorder::default());
    let mut consumer = Consumer::new(store.clone(), recorder.clone(), options("consumer_1"));
    consumer.register().await.unwrap();

    Producer::new(store.clone(), Q)
        .produce(&Message::new(TaskId::new("t1"), "P"))
        .await
        .unwrap();

    let report = consumer.run_iteration().await;
    assert_eq!(report.acked, 1);
    {
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, TaskId::new("t1"));
        assert_eq!(seen[0].payload, "P");
    }

    let again = store
        .read_new(Q, G, "consumer_1", 10, Duration::from_millis(10))
        .await
        .unwrap();
    assert!(again.is_empty());
    assert!(store.pending(Q, G).await.unwrap().is_empty());
    assert_eq!(store.len(Q).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_read_times_out_without_error() {
    let store = InMemoryLogStore::new();
    store.create_group(Q, G, StartPosition::Latest).await.unwrap();

    let started = std::time::Instant::now();
    let batch = store
        .read_new(Q, G, "consumer_1", 10, Duration::from_secs(1))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(batch.is_empty());
    assert!(elapsed >= Duration::from_millis(900), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "returned too late: {elapsed:?}");
}

#[tokio::test]
async fn crashed_consumer_entry_is_reclaimed_by_another() {
    let clock = clock();
    let store = Arc::new(InMemoryLogStore::with_clock(Arc::new(clock.clone())));

    let mut a = Consumer::new(store.clone(), Arc::new(Crashing), options("consumer_a"));
    let recorder = Arc::new(Recorder::default());
    let mut b_opts = options("consumer_b");
    b_opts.reclaim_interval = Duration::ZERO;
    let mut b = Consumer::new(store.clone(), recorder.clone(), b_opts);
    a.register().await.unwrap();
    b.register().await.unwrap();

    Producer::new(store.clone(), Q)
        .produce(&Message::new(TaskId::new("t1"), "P"))
        .await
        .unwrap();
    a.run_iteration().await;

    let pending = store.pending(Q, G).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].owner, "consumer_a");

    // Not idle long enough yet
    let early = b.run_iteration().await;
    assert_eq!(early.fetched, 0);

    clock.advance(Duration::from_secs(31));
    let reclaimed = b.run_iteration().await;
    assert_eq!(reclaimed.fetched, 1);
    assert_eq!(reclaimed.acked, 1);
    assert_eq!(recorder.seen.lock().unwrap()[0].payload, "P");

    clock.advance(Duration::from_secs(120));
    let after = store
        .reclaim_stale(Q, G, "consumer_b", Duration::from_secs(30), 10)
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn concurrent_reclaims_never_share_an_entry() {
    let clock = clock();
    let store = Arc::new(InMemoryLogStore::with_clock(Arc::new(clock.clone())));
    store.create_group(Q, G, StartPosition::Beginning).await.unwrap();
    for i in 0..50 {
        store.append(Q, format!("{i}").as_bytes()).await.unwrap();
    }
    store
        .read_new(Q, G, "dead", 50, Duration::ZERO)
        .await
        .unwrap();
    clock.advance(Duration::from_secs(60));

    let mut joins = Vec::new();
    for c in 0..5 {
        let store = store.clone();
        joins.push(tokio::spawn(async move {
            let consumer = format!("c{c}");
            let mut mine = Vec::new();
            loop {
                let batch = store
                    .reclaim_stale(Q, G, &consumer, Duration::from_secs(30), 3)
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|e| e.id));
                tokio::task::yield_now().await;
            }
            (consumer, mine)
        }));
    }

    let mut owner_of: HashMap<EntryId, String> = HashMap::new();
    for join in joins {
        let (consumer, ids) = join.await.unwrap();
        for id in ids {
            let prev = owner_of.insert(id, consumer.clone());
            assert!(prev.is_none(), "{id} reclaimed by {prev:?} and {consumer}");
        }
    }
    assert_eq!(owner_of.len(), 50);

    // Pending ownership matches whoever reclaimed last
    for pending in store.pending(Q, G).await.unwrap() {
        assert_eq!(owner_of[&pending.entry_id], pending.owner);
    }
}

#[tokio::test]
async fn consumers_running_together_deliver_everything_once() {
    let store = Arc::new(InMemoryLogStore::new());
    let recorder = Arc::new(Recorder::default());
    let (tx, rx) = watch::channel(false);

    let mut joins = Vec::new();
    for i in 0..4 {
        let mut consumer = Consumer::new(store.clone(), recorder.clone(), options(&format!("consumer_{i}")));
        let rx = rx.clone();
        joins.push(tokio::spawn(async move { consumer.run(rx).await }));
    }

    let producer = Producer::new(store.clone(), Q);
    for i in 0..100 {
        producer
            .produce(&Message::new(TaskId::new(format!("t{i}")), format!("{i}")))
            .await
            .unwrap();
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.len(Q).await.unwrap() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tx.send(true).unwrap();
    for join in joins {
        join.await.unwrap().unwrap();
    }

    let seen = recorder.seen.lock().unwrap();
    let ids: HashSet<String> = seen.iter().map(|m| m.id.to_string()).collect();
    assert_eq!(ids.len(), 100);
    assert_eq!(seen.len(), 100);
}
