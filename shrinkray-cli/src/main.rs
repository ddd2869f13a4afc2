//! Command-line front end for the orchestration engine.
//!
//! No HTTP/SSE transport lives here: this binary constructs an [`Engine`]
//! in-process and drives its control API directly from parsed arguments.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shrinkray_config::{Config, ConfigUpdate};
use shrinkray_core::{Engine, JobId, JobStatus, QueueEvent};

#[derive(Parser)]
#[command(name = "shrinkray", version, about = "Batch video transcoding orchestrator")]
struct Cli {
    /// TOML config document; documented defaults are used if the file is missing.
    #[arg(long, global = true, default_value = "shrinkray.toml")]
    config: PathBuf,

    /// Queue snapshot file the engine restores from and persists to.
    #[arg(long, global = true, default_value = "shrinkray-queue.json")]
    snapshot: PathBuf,

    /// Log file name, rotated daily under `logs/`.
    #[arg(long, global = true, default_value = "shrinkray.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submits one or more paths under a preset and blocks until every job in
    /// the queue reaches a terminal state (or until Ctrl-C), printing each
    /// job's outcome as it lands.
    Run {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        preset: String,
    },
    /// Lists every job currently in the queue.
    List,
    /// Prints one job's full record as JSON.
    Get { id: String },
    /// Cancels a pending or running job.
    Cancel { id: String },
    /// Re-probes the source and re-queues a terminal job under its original preset.
    Retry { id: String },
    /// Drops terminal jobs from the queue: every terminal status, or one
    /// status if `--status` is given. Running jobs are never dropped.
    Clear {
        #[arg(long)]
        status: Option<String>,
    },
    /// Stops claiming new jobs; running jobs are requeued to pending.
    Pause,
    /// Resumes claiming new jobs.
    Resume,
    /// Prints the effective configuration document as JSON.
    Config,
    /// Applies a partial update to the configuration document.
    Set {
        #[arg(long)]
        workers: Option<u8>,
        #[arg(long)]
        quality_hevc: Option<u8>,
        #[arg(long)]
        quality_av1: Option<u8>,
        #[arg(long)]
        tonemap_hdr: Option<bool>,
        #[arg(long)]
        notify_on_complete: Option<bool>,
        #[arg(long)]
        smart_shrink_vmaf_target: Option<f64>,
    },
    /// Lists the preset catalogue bound to this machine's detected encoder backends.
    Presets,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    shrinkray_logging::init_default(cli.log_file.clone());

    let mut config = load_config(&cli.config)?;
    config.coerce_bounds();

    let engine = Engine::new(config, cli.snapshot.clone()).context("failed to start engine")?;

    match cli.command {
        Command::Run { paths, preset } => run_until_drained(&engine, paths, preset)?,
        Command::List => print_jobs(&engine.list()),
        Command::Get { id } => match engine.get(&JobId::from(id.as_str())) {
            Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
            None => println!("no job with id {id}"),
        },
        Command::Cancel { id } => match engine.cancel(&JobId::from(id.as_str())) {
            Some(job) => println!("cancelled {} ({})", job.id, job.input_path.display()),
            None => println!("no job with id {id}"),
        },
        Command::Retry { id } => match engine.retry(&JobId::from(id.as_str())) {
            Ok(job) => println!("requeued {id} as {}", job.id),
            Err(err) => println!("could not retry {id}: {err}"),
        },
        Command::Clear { status } => {
            let filter = status.as_deref().map(parse_status).transpose()?;
            let removed = engine.clear(filter);
            println!("removed {removed} job(s)");
        }
        Command::Pause => {
            engine.pause_queue();
            println!("queue paused");
        }
        Command::Resume => {
            engine.resume_queue();
            println!("queue resumed");
        }
        Command::Config => println!("{}", serde_json::to_string_pretty(&engine.config())?),
        Command::Set {
            workers,
            quality_hevc,
            quality_av1,
            tonemap_hdr,
            notify_on_complete,
            smart_shrink_vmaf_target,
        } => {
            let patch = ConfigUpdate {
                workers,
                quality_hevc,
                quality_av1,
                tonemap_hdr,
                notify_on_complete,
                smart_shrink_vmaf_target,
                ..Default::default()
            };
            let updated = engine.update_config(patch);
            save_config(&cli.config, &updated)?;
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
        Command::Presets => {
            for preset in engine.presets() {
                println!("{}\t{}\t{}\t{}", preset.id, preset.name, preset.codec, preset.backend);
            }
        }
    }

    engine.shutdown();
    Ok(())
}

fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn save_config(path: &PathBuf, config: &Config) -> anyhow::Result<()> {
    let text = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn parse_status(raw: &str) -> anyhow::Result<JobStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "complete" => Ok(JobStatus::Complete),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
        "skipped" => Ok(JobStatus::Skipped),
        other => anyhow::bail!("unknown job status {other:?}"),
    }
}

fn print_jobs(jobs: &[shrinkray_core::Job]) {
    if jobs.is_empty() {
        println!("queue is empty");
        return;
    }
    for job in jobs {
        println!(
            "{}\t{}\t{:>5.1}%\t{}",
            job.id,
            job.status,
            job.progress.percent,
            job.input_path.display()
        );
    }
}

/// Submits `paths` under `preset`, then blocks printing each job transition
/// until the queue is fully quiescent or the user hits Ctrl-C — at which
/// point running jobs are requeued to `pending` for a future invocation to
/// pick back up, rather than left abandoned mid-encode.
///
/// `submit` admits jobs on its own background thread, so the drain check
/// can't just watch `(pending, running) == (0, 0)` from the start: nothing
/// may have been queued yet. We subscribe first and wait for ingestion's own
/// `Progress(probed == total)` event before treating quiescence as "done"
/// rather than "hasn't started".
fn run_until_drained(engine: &Engine, paths: Vec<PathBuf>, preset: String) -> anyhow::Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let (subscriber_id, events) = engine.subscribe();
    engine.submit(paths, preset).context("failed to submit paths")?;

    let mut ingestion_done = false;
    loop {
        if interrupted.load(Ordering::SeqCst) {
            println!("interrupted, requeuing running jobs and exiting");
            engine.pause_queue();
            break;
        }

        while let Ok(event) = events.try_recv() {
            match event {
                QueueEvent::Progress(progress) if progress.probed >= progress.total => {
                    ingestion_done = true;
                }
                QueueEvent::JobUpdated { job } if job.status.is_terminal() => {
                    println!("{}\t{}\t{}", job.id, job.status, job.input_path.display());
                }
                _ => {}
            }
        }

        if ingestion_done {
            let stats = engine.stats();
            if stats.pending == 0 && stats.running == 0 {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    engine.unsubscribe(subscriber_id);
    print_jobs(&engine.list());
    Ok(())
}
