//! Microgrid simulator entry point: CLI wiring, one-shot runs and the status server.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info};

use microgrid_sim::Error;
use microgrid_sim::api::{self, AppState};
use microgrid_sim::config::Settings;
use microgrid_sim::io::export::export_csv;
use microgrid_sim::pipeline::Pipeline;
use microgrid_sim::state::StatusStore;
use microgrid_sim::telemetry::{init_tracing, shutdown_signal};

use crate::cli::{Args, Command, HorizonArgs, RunArgs, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut settings = Settings::from_toml_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    settings.apply_overrides(args.price_area, args.latitude, args.longitude);

    let errors = settings.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("{} configuration error(s) in {}", errors.len(), args.config.display());
    }

    let store = Arc::new(StatusStore::new());
    let pipeline = Arc::new(Pipeline::from_settings(settings, store)?);

    match args.command {
        Command::Run(run) => run_once(&pipeline, run).await,
        Command::Fetch(horizon) => fetch_only(&pipeline, horizon).await,
        Command::Serve(serve) => serve_api(pipeline, serve).await,
    }
}

async fn run_once(pipeline: &Pipeline, args: RunArgs) -> Result<()> {
    let h = &args.horizon;
    let horizon = pipeline.settings().horizon(h.start, h.days)?;
    let record = pipeline.run(horizon, h.refresh).await?;

    for r in &record.result.records {
        println!("{r}");
    }
    println!("\n{}", record.result.kpi);

    if let Some(path) = &args.telemetry_out {
        export_csv(&record.result.records, path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "hour records exported");
    }
    Ok(())
}

async fn fetch_only(pipeline: &Pipeline, args: HorizonArgs) -> Result<()> {
    let horizon = pipeline.settings().horizon(args.start, args.days)?;
    let inputs = pipeline.fetch(&horizon, args.refresh).await?;
    info!(
        hours = inputs.hours(),
        cache_dir = %pipeline.cache().dir().display(),
        "series fetched and cached"
    );
    Ok(())
}

async fn trigger_run(pipeline: &Pipeline, reason: &'static str) {
    let horizon = match pipeline.default_horizon() {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, reason, "cannot resolve horizon");
            return;
        }
    };
    match pipeline.run(horizon, false).await {
        Ok(record) => info!(run_id = record.run_id, reason, "run finished"),
        Err(Error::AlreadyRunning) => debug!(reason, "run already in progress, skipped"),
        Err(e) => error!(error = %e, reason, "run failed"),
    }
}

async fn serve_api(pipeline: Arc<Pipeline>, args: ServeArgs) -> Result<()> {
    let addr = args.bind.unwrap_or(pipeline.settings().server.bind);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    if args.run_on_start {
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move { trigger_run(&p, "startup").await });
    }

    if let Some(minutes) = pipeline.settings().schedule.interval_minutes {
        let period = Duration::from_secs(minutes * 60);
        let p = Arc::clone(&pipeline);
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                trigger_run(&p, "schedule").await;
            }
        });
        info!(minutes, "scheduled runs enabled");
    }

    api::serve(AppState::new(pipeline), listener, shutdown_signal())
        .await
        .context("status server failed")?;
    info!("status server stopped");
    Ok(())
}
