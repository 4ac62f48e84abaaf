//! taskq CLI: run a simulated reindex workload through the background queue.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskq::config::Config;
use taskq::model::EquivalenceKey;
use taskq::progress::ProgressHandle;
use taskq::telemetry::init_telemetry;
use taskq::worker::WorkerReport;
use taskq::{BackgroundQueue, Task};

#[derive(Parser)]
#[command(name = "taskq", about = "Background task queue with cooperative cancellation")]
struct Cli {
    /// Optional TOML config file (environment variables still win)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue simulated reindex tasks and drain them on a worker thread
    Demo {
        /// Number of distinct reindex tasks
        #[arg(long, default_value_t = 5)]
        tasks: usize,
        /// Duplicate submissions of the first tasks (rejected by dedup)
        #[arg(long, default_value_t = 2)]
        duplicates: usize,
        /// Cancel this many tasks while they are still queued
        #[arg(long, default_value_t = 1)]
        cancel: usize,
        /// Make this many tasks fail
        #[arg(long, default_value_t = 1)]
        fail: usize,
        /// Steps per task
        #[arg(long, default_value_t = 10)]
        steps: u32,
        /// Sleep per step, in milliseconds
        #[arg(long, default_value_t = 20)]
        step_ms: u64,
    },
    /// Print the effective configuration
    Config,
}

/// Pretend index rebuild for one root.
struct ReindexTask {
    root: String,
    steps: u32,
    step: Duration,
    fail: bool,
    disposed: Arc<AtomicUsize>,
}

impl Task for ReindexTask {
    fn equivalence_key(&self) -> EquivalenceKey {
        EquivalenceKey::new(format!("reindex:{}", self.root))
    }

    fn run(&self, progress: &ProgressHandle) -> taskq::Result<()> {
        progress.set_indeterminate(false);
        for step in 0..self.steps {
            progress.check_cancelled()?;
            progress.set_text(format!("indexing {} ({}/{})", self.root, step + 1, self.steps));
            std::thread::sleep(self.step);
            progress.set_fraction(f64::from(step + 1) / f64::from(self.steps));
            if self.fail && step == self.steps / 2 {
                return Err(taskq::Error::Task(format!("corrupt index for {}", self.root)));
            }
        }
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }

    fn kind(&self) -> &str {
        "reindex"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    match cli.command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Demo {
            tasks,
            duplicates,
            cancel,
            fail,
            steps,
            step_ms,
        } => {
            let _guard = init_telemetry(&config)?;

            let demo = DemoArgs {
                tasks,
                duplicates,
                cancel,
                fail,
                steps,
                step: Duration::from_millis(step_ms),
            };
            // Queue calls block on the coordinator; keep them off the runtime.
            let report = tokio::task::spawn_blocking(move || cmd_demo(&config, demo)).await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

struct DemoArgs {
    tasks: usize,
    duplicates: usize,
    cancel: usize,
    fail: usize,
    steps: u32,
    step: Duration,
}

fn cmd_demo(config: &Config, args: DemoArgs) -> anyhow::Result<WorkerReport> {
    let queue = BackgroundQueue::with_config(config)?;
    let disposed = Arc::new(AtomicUsize::new(0));

    let make_task = |i: usize| ReindexTask {
        root: format!("module-{i}"),
        steps: args.steps.max(1),
        step: args.step,
        fail: i >= args.tasks.saturating_sub(args.fail),
        disposed: Arc::clone(&disposed),
    };

    let mut ids = Vec::new();
    for i in 0..args.tasks {
        if let Some(id) = queue.submit(make_task(i))? {
            ids.push(id);
        }
    }

    let mut rejected = 0;
    for i in 0..args.duplicates.min(args.tasks) {
        if !queue.enqueue(make_task(i))? {
            rejected += 1;
        }
    }

    for id in ids.iter().take(args.cancel) {
        queue.cancel_task(*id);
    }

    println!("queued:");
    println!("{}", serde_json::to_string_pretty(&queue.pending()?)?);

    let worker = queue.spawn_worker(|progress| ProgressHandle::child_of(&progress), |kind: &str| {
        tracing::info!(kind, "stage started");
    })?;
    let report = worker
        .join()
        .map_err(|_| anyhow::anyhow!("worker thread panicked"))??;

    queue.shutdown()?;

    println!(
        "rejected {rejected} duplicate(s), disposed {} task(s)",
        disposed.load(Ordering::SeqCst)
    );
    Ok(report)
}
