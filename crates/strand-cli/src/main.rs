use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::time::{Duration, Instant, sleep};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand_core::Config;
use strand_core::app::{AppBuilder, ConsumerExit, DelayedScheduler, PollBackoff, Producer};
use strand_core::domain::{HandlerError, Message, StartPosition, StoreError, TaskId};
use strand_core::impls::{InMemoryDelaySet, InMemoryLogStore};
use strand_core::ports::{DelaySet, IdGenerator, LogStore, SystemClock, UlidGenerator};
use strand_core::typed::{Handler, Task, UserRegistered};

#[derive(Parser)]
#[command(name = "strand", about = "At-least-once task queue demo and benchmark")]
struct Cli {
    /// TOML config file; STRAND_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce a few user registrations (some delayed) and consume them
    Demo {
        #[arg(long, default_value_t = 2)]
        consumers: usize,
        #[arg(long, default_value_t = 10)]
        users: usize,
        #[arg(long, default_value_t = 3)]
        delayed: usize,
    },
    /// Enqueue M tasks, drain them with N consumers, report elapsed time
    Bench {
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long, default_value_t = 10_000)]
        tasks: usize,
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },
}

struct UserRegisteredHandler;

#[async_trait]
impl Handler<UserRegistered> for UserRegisteredHandler {
    async fn handle(&self, task_id: &TaskId, task: UserRegistered) -> Result<(), HandlerError> {
        info!(%task_id, user = %task.id, name = %task.name, age = task.age, "welcome");
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BenchTask {
    seq: u64,
}

impl Task for BenchTask {
    const TYPE: &'static str = "bench.noop.v1";
}

struct BenchHandler {
    handled: Arc<AtomicU64>,
}

#[async_trait]
impl Handler<BenchTask> for BenchHandler {
    async fn handle(&self, _task_id: &TaskId, _task: BenchTask) -> Result<(), HandlerError> {
        self.handled.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    match cli.command {
        Command::Demo {
            consumers,
            users,
            delayed,
        } => demo(&config, consumers, users, delayed).await,
        Command::Bench {
            workers,
            tasks,
            batch_size,
        } => bench(config, workers, tasks, batch_size).await,
    }
}

async fn demo(
    config: &Config,
    consumers: usize,
    users: usize,
    delayed: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryLogStore::new());
    let delay_set = Arc::new(InMemoryDelaySet::new());
    let ids = UlidGenerator::new(SystemClock);

    let app = AppBuilder::new()
        .register::<UserRegistered, _>(UserRegisteredHandler)?
        .expect_event_types(&[UserRegistered::TYPE])
        .build()?;

    // 先にグループを作っておく（Latest でも投入分を取りこぼさない）
    store
        .create_group(&config.queue.name, &config.queue.group, config.queue.start)
        .await?;

    let producer = Producer::new(store.clone(), config.queue.name.clone());
    for i in 0..users {
        let user = UserRegistered {
            id: format!("user_{i}"),
            name: format!("user_{i}"),
            age: 20 + (i % 50) as u32,
        };
        producer.produce_task(ids.generate_task_id(), &user).await?;
    }

    let scheduler = Arc::new(DelayedScheduler::new(
        delay_set.clone(),
        store.clone(),
        Arc::new(SystemClock),
        config.scheduler_options(),
    ));
    for i in 0..delayed {
        let user = UserRegistered {
            id: format!("late_user_{i}"),
            name: format!("late_user_{i}"),
            age: 30,
        };
        let message = Message::new(ids.generate_task_id(), serde_json::to_string(&user)?)
            .with_event_type(UserRegistered::TYPE);
        scheduler
            .schedule_in(&message, Duration::from_secs(1 + i as u64))
            .await?;
    }
    info!(users, delayed, "tasks enqueued");

    let (scheduler_tx, scheduler_rx) = watch::channel(false);
    let scheduler_join = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(scheduler_rx).await })
    };
    let pool = app.spawn_pool(
        store.clone(),
        (0..consumers).map(|i| config.consumer_options(format!("consumer_{}", i + 1))),
    );

    tokio::select! {
        drained = wait_until_drained(store.as_ref(), delay_set.as_ref(), config) => drained?,
        _ = tokio::signal::ctrl_c() => warn!("interrupted"),
    }

    let _ = scheduler_tx.send(true);
    let exits = pool.shutdown_and_join().await;
    let _ = scheduler_join.await;
    report_exits(&exits)?;
    Ok(())
}

async fn bench(
    mut config: Config,
    workers: usize,
    tasks: usize,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    config.queue.start = StartPosition::Beginning;
    config.consumer.batch_size = batch_size.max(1);

    let store = Arc::new(InMemoryLogStore::new());
    let handled = Arc::new(AtomicU64::new(0));
    let app = AppBuilder::new()
        .register::<BenchTask, _>(BenchHandler {
            handled: handled.clone(),
        })?
        .build()?;
    let ids = UlidGenerator::new(SystemClock);

    let producer = Producer::new(store.clone(), config.queue.name.clone());
    for seq in 0..tasks as u64 {
        producer.produce_task(ids.generate_task_id(), &BenchTask { seq }).await?;
    }
    println!("enqueued {tasks} tasks");

    let started = Instant::now();
    let pool = app.spawn_pool(
        store.clone(),
        (0..workers).map(|i| {
            let mut opts = config.consumer_options(format!("bench_{i}"));
            opts.backoff = PollBackoff::new(Duration::ZERO, Duration::from_millis(50), 2.0);
            opts
        }),
    );

    loop {
        let remaining = store.len(&config.queue.name).await?;
        if remaining == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let elapsed = started.elapsed();

    let exits = pool.shutdown_and_join().await;
    report_exits(&exits)?;

    let handled = handled.load(Ordering::Relaxed);
    let rate = handled as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!("{workers} workers handled {handled} tasks in {elapsed:?} ({rate:.0} tasks/s)");
    Ok(())
}

async fn wait_until_drained(
    store: &dyn LogStore,
    delay_set: &dyn DelaySet,
    config: &Config,
) -> Result<(), StoreError> {
    loop {
        let live = store.len(&config.queue.name).await?;
        let parked = delay_set.len(&config.scheduler.set_name).await?;
        if live == 0 && parked == 0 {
            info!("all tasks acknowledged");
            return Ok(());
        }
        sleep(Duration::from_millis(100)).await;
    }
}

fn report_exits(exits: &[ConsumerExit]) -> Result<(), Box<dyn std::error::Error>> {
    for exit in exits {
        match &exit.result {
            Ok(stats) => println!("{}: {}", exit.consumer, serde_json::to_string(stats)?),
            Err(e) => println!("{}: failed: {e}", exit.consumer),
        }
    }
    Ok(())
}
