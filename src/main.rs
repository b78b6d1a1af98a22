use clap::Parser;
use expense_accrual::application::orchestrator::AccrualOrchestrator;
use expense_accrual::application::scheduler::{AccrualScheduler, CronCadence};
use expense_accrual::config::{
    AccrualSettings, Anchor, DEFAULT_SCHEDULE, DEFAULT_STORE_URL, RunSettings, ScheduleSettings,
    StoreSettings,
};
use expense_accrual::domain::ports::{ExpenseStore, ExpenseStoreRef, RecordClientRef};
use expense_accrual::infrastructure::http_store::HttpExpenseStore;
use expense_accrual::infrastructure::in_memory::InMemoryExpenseStore;
use expense_accrual::interfaces::csv::report_writer::ReportWriter;
use expense_accrual::interfaces::http::{ApiState, router};
use miette::{IntoDiagnostic, Result};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the record store. Expenses live under `<url>/expenses`.
    #[arg(long, env = "EXPENSE_STORE_URL", default_value = DEFAULT_STORE_URL)]
    store_url: String,

    /// Use an in-memory store seeded from this JSON file instead of the remote store.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Perform a single accrual run, print its report as CSV and exit.
    #[arg(long)]
    run_once: bool,

    /// Cron expression for scheduled runs (5 or 6 fields).
    #[arg(long, env = "ACCRUAL_SCHEDULE", default_value = DEFAULT_SCHEDULE)]
    schedule: String,

    /// Time zone the schedule is evaluated in.
    #[arg(long, env = "ACCRUAL_ANCHOR", value_enum, default_value_t = Anchor::Local)]
    anchor: Anchor,

    /// Address the HTTP API listens on.
    #[arg(long, env = "EXPENSE_API_ADDR", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Timeout for a single record store call, in seconds.
    #[arg(long, env = "EXPENSE_STORE_TIMEOUT_SECS", default_value_t = 10)]
    call_timeout_secs: u64,

    /// Attempts per record update, first try included.
    #[arg(long, env = "ACCRUAL_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Backoff before the first retry, in milliseconds. Doubles per retry.
    #[arg(long, env = "ACCRUAL_RETRY_BACKOFF_MS", default_value_t = 200)]
    retry_backoff_ms: u64,

    /// Maximum record updates in flight at once.
    #[arg(long, env = "ACCRUAL_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Overall run deadline, in seconds.
    #[arg(long, env = "ACCRUAL_DEADLINE_SECS", default_value_t = 300)]
    deadline_secs: u64,
}

impl Cli {
    fn settings(&self) -> AccrualSettings {
        AccrualSettings {
            store: StoreSettings {
                base_url: self.store_url.clone(),
                call_timeout: Duration::from_secs(self.call_timeout_secs),
            },
            run: RunSettings {
                max_attempts: self.max_attempts,
                retry_backoff: Duration::from_millis(self.retry_backoff_ms),
                max_concurrent_updates: self.concurrency,
                run_deadline: Duration::from_secs(self.deadline_secs),
            },
            schedule: ScheduleSettings {
                cron: self.schedule.clone(),
                anchor: self.anchor,
            },
        }
    }
}

fn share<S: ExpenseStore + 'static>(store: S) -> (ExpenseStoreRef, RecordClientRef) {
    let store = Arc::new(store);
    let client: RecordClientRef = store.clone();
    let store: ExpenseStoreRef = store;
    (store, client)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings();
    settings.validate().into_diagnostic()?;

    let (store, client) = if let Some(seed) = &cli.seed {
        let bytes = std::fs::read(seed).into_diagnostic()?;
        info!(seed = %seed.display(), "using in-memory expense store");
        share(InMemoryExpenseStore::from_json(&bytes).into_diagnostic()?)
    } else {
        info!(url = %settings.store.base_url, "using remote expense store");
        share(HttpExpenseStore::new(&settings.store).into_diagnostic()?)
    };

    let orchestrator = Arc::new(AccrualOrchestrator::new(client, settings.run.clone()));

    if cli.run_once {
        let report = orchestrator.run_once().await;
        let stdout = io::stdout();
        let mut writer = ReportWriter::new(stdout.lock());
        writer.write_report(&report).into_diagnostic()?;
        return report.ensure_completed().into_diagnostic();
    }

    let cadence = CronCadence::parse(&settings.schedule).into_diagnostic()?;
    let scheduler = AccrualScheduler::new(orchestrator, cadence);
    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_signal()).await })
    };

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .into_diagnostic()?;
    info!("Server running at http://{}", cli.listen);
    axum::serve(listener, router(ApiState { store, scheduler }))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    scheduler_task.await.into_diagnostic()?;
    Ok(())
}
