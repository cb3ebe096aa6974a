use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use time::OffsetDateTime;
use tracing::{info, warn};

use scan_console_rs::api::{HttpBackend, ScanBackend};
use scan_console_rs::config::{
    ClientConfig, PollPolicy, DEFAULT_API_URL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use scan_console_rs::controller::Controller;
use scan_console_rs::machine::Phase;
use scan_console_rs::request::{
    build_advanced_request, build_quick_request, AdvancedForm, PortOption, TargetKind,
};
use scan_console_rs::types::{JobId, ScanRequest};
use scan_console_rs::view::{progress_line, TerminalView};
use scan_console_rs::{log, report};

/// Command-line console for a remote port scanner.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "scan-console-rs",
    version,
    about = "Launch port scans on a remote scanner API and follow them to completion.",
    long_about = None
)]
struct Cli {
    /// Base URL of the scanner API.
    #[arg(long = "api-url", env = "SCAN_CONSOLE_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Anti-forgery token sent as X-CSRFToken on state-changing requests.
    #[arg(long = "csrf-token", env = "SCAN_CONSOLE_CSRF_TOKEN", hide_env_values = true, global = true)]
    csrf_token: Option<String>,

    /// Interval between progress checks in milliseconds.
    #[arg(long = "poll-interval-ms", default_value_t = DEFAULT_POLL_INTERVAL_MS, global = true)]
    poll_interval_ms: u64,

    /// Failed progress checks tolerated in a row before giving up on a job.
    #[arg(long = "poll-retries", default_value_t = 0, global = true)]
    poll_retries: u32,

    /// Timeout of every HTTP request in seconds.
    #[arg(long = "request-timeout-secs", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, global = true)]
    request_timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace). RUST_LOG overrides it.
    #[arg(long = "log-level", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan common TCP ports of a target with default settings.
    Quick {
        /// IP address, CIDR or hostname.
        target: String,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Scan with explicit ports, protocols, timeout and thread count.
    Scan {
        /// IP address, CIDR or hostname.
        #[arg(long)]
        target: String,
        /// Preset (common, top100, top1000) or a list like 80,90-95,443.
        #[arg(long, default_value = "common")]
        ports: String,
        /// Also scan UDP.
        #[arg(long)]
        udp: bool,
        /// Skip TCP (requires --udp).
        #[arg(long = "no-tcp")]
        no_tcp: bool,
        /// Per-port timeout in seconds.
        #[arg(long, default_value = "3")]
        timeout: String,
        /// Worker threads on the scanner.
        #[arg(long, default_value = "50")]
        threads: String,
        #[command(flatten)]
        watch: WatchArgs,
    },
    /// Ask the server to stop a running job.
    Stop { job_id: String },
    /// Show the current progress of a job once.
    Progress { job_id: String },
    /// Print the port results of a job.
    Results {
        job_id: String,
        /// Write results as pretty JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show dashboard counters.
    Stats,
    /// List recent jobs.
    Jobs {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    /// Print the results table once the scan completes.
    #[arg(long = "show-results")]
    show_results: bool,
    /// Write results as pretty JSON to this path once the scan completes.
    #[arg(long)]
    output: Option<PathBuf>,
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            csrf_token: self.csrf_token.clone().filter(|t| !t.trim().is_empty()),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            poll: PollPolicy {
                interval: Duration::from_millis(self.poll_interval_ms),
                max_retries: self.poll_retries,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    log::init_logger(&cli.log_level)?;

    let config = cli.client_config();
    let backend = Arc::new(HttpBackend::new(&config)?);

    match cli.command {
        Command::Quick { target, watch } => {
            let request = build_quick_request(&target)?;
            run_scan(backend, &config, request, &watch).await
        }
        Command::Scan {
            target,
            ports,
            udp,
            no_tcp,
            timeout,
            threads,
            watch,
        } => {
            let mut form = AdvancedForm {
                target,
                tcp: !no_tcp,
                udp,
                timeout,
                threads,
                ..AdvancedForm::default()
            };
            match PortOption::parse(&ports) {
                Some(option) => form.select_port_option(option),
                None => {
                    form.select_port_option(PortOption::Custom);
                    form.ports.set_custom(ports);
                }
            }
            let request = build_advanced_request(&form)?;
            run_scan(backend, &config, request, &watch).await
        }
        Command::Stop { job_id } => {
            let job_id = JobId::new(job_id);
            backend
                .stop(&job_id)
                .await
                .with_context(|| format!("failed to stop {job_id}"))?;
            println!("Stop requested for {job_id}");
            Ok(())
        }
        Command::Progress { job_id } => {
            let job_id = JobId::new(job_id);
            let snapshot = backend
                .progress(&job_id)
                .await
                .with_context(|| format!("failed to read progress of {job_id}"))?;
            println!("{job_id}: {} ({})", progress_line(&snapshot), snapshot.status.as_str());
            Ok(())
        }
        Command::Results { job_id, output } => {
            let page = backend.results(&JobId::new(job_id)).await?;
            report::print_results_table(&page);
            if let Some(path) = output.as_deref() {
                write_json(path, &page);
            }
            Ok(())
        }
        Command::Stats => {
            let stats = backend.dashboard_stats().await?;
            report::print_stats(&stats);
            Ok(())
        }
        Command::Jobs { limit } => {
            let jobs = backend.recent_jobs(limit).await?;
            for line in report::job_lines(&jobs.results, OffsetDateTime::now_utc()) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Submit a scan and follow it until it settles. Ctrl+C asks the server to
/// stop the job; polling continues if the stop is not acknowledged.
async fn run_scan(
    backend: Arc<HttpBackend>,
    config: &ClientConfig,
    request: ScanRequest,
    watch: &WatchArgs,
) -> Result<()> {
    println!("scan-console-rs configuration:");
    println!("  api          : {}", config.api_root());
    println!(
        "  target       : {} ({})",
        request.target,
        TargetKind::classify(&request.target)
    );
    println!("  ports        : {}", request.ports);
    println!(
        "  protocols    : {}",
        request
            .protocols
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  timeout      : {}s", request.timeout_secs);
    println!("  threads      : {}", request.threads);

    let view = TerminalView::new(config.api_root());
    let mut controller = Controller::with_shared(Arc::clone(&backend), view, config.poll);

    let started = Instant::now();
    let job_id = match controller.submit(request).await {
        Ok(id) => id,
        Err(e) => bail!("scan was not started: {e}"),
    };
    println!("Job {job_id} started (Ctrl+C to stop)");

    loop {
        tokio::select! {
            progressed = controller.step() => {
                if !progressed || controller.state().phase() != Phase::Polling {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(job = %job_id, "interrupt received; stopping scan");
                if let Err(e) = controller.stop().await {
                    warn!(error = %e, "stop failed; still polling");
                }
                if controller.state().phase() != Phase::Polling {
                    break;
                }
            }
        }
    }

    let elapsed = report::format_duration(started.elapsed().as_secs());
    match controller.state().phase() {
        Phase::Completed => {
            println!("Finished in {elapsed}");
            controller.view_results();
            if watch.show_results || watch.output.is_some() {
                let page = backend.results(&job_id).await?;
                if watch.show_results {
                    report::print_results_table(&page);
                }
                if let Some(path) = watch.output.as_deref() {
                    write_json(path, &page);
                }
            }
            Ok(())
        }
        Phase::Stopped => {
            println!("Stopped after {elapsed}");
            Ok(())
        }
        Phase::Failed => bail!("scan {job_id} failed after {elapsed}"),
        Phase::Abandoned => bail!(
            "lost track of scan {job_id}; it may still be running on the server (check `progress {job_id}`)"
        ),
        other => bail!("scan {job_id} ended unexpectedly in {other:?}"),
    }
}

fn write_json(path: &std::path::Path, page: &scan_console_rs::types::ResultsPage) {
    if let Err(e) = report::write_results_json(path, page) {
        eprintln!("Failed to write JSON to {}: {}", path.display(), e);
    } else {
        println!("Wrote JSON results to {}", path.display());
    }
}
