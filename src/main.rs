use anyhow::Result;
use clap::Parser;
use speedtest::http::{HttpDirectory, HttpTransport};
use speedtest::icmp::IcmpPinger;
use speedtest::report::ConsoleReporter;
use speedtest::store::ResultStore;
use speedtest::{Orchestrator, Outcome, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

#[derive(Parser)]
#[command(name = "speedtest")]
#[command(
    about = "Measure latency and download throughput against the closest speed test servers",
    long_about = None
)]
struct Cli {
    /// Settings file (TOML, or JSON when the extension is .json)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Test these hosts (host:port) directly instead of searching
    #[arg(long, short, value_delimiter = ',')]
    servers: Vec<String>,

    /// Search term(s) for the server directory, comma separated
    #[arg(long)]
    search: Option<String>,

    /// Download test duration in milliseconds
    #[arg(long)]
    download_time: Option<u64>,

    /// Concurrent download connections
    #[arg(long)]
    connections: Option<usize>,

    /// Read buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Maximum pings per host
    #[arg(long)]
    ping_count: Option<usize>,

    /// Directory results to probe per search term
    #[arg(long)]
    candidate_count: Option<usize>,

    /// Maximum pings per candidate while ranking
    #[arg(long)]
    candidate_ping_max: Option<usize>,

    /// Best candidates to test per search term
    #[arg(long)]
    candidate_tests: Option<usize>,

    /// Skip the download check on ranked candidates
    #[arg(long)]
    no_verify: bool,

    /// Append successful results to this file (JSON lines)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Plain line output, no live progress
    #[arg(long)]
    no_interactive: bool,

    /// List ranked candidates
    #[arg(long, short)]
    verbose: bool,

    /// Print settings and detailed probe statistics
    #[arg(long, short)]
    debug: bool,
}

impl Cli {
    /// Command-line flags override the settings file.
    fn apply(self, settings: &mut Settings) {
        if !self.servers.is_empty() {
            settings.servers = self.servers;
        }
        if let Some(search) = self.search {
            settings.search = search;
        }
        if let Some(v) = self.download_time {
            settings.download_time_ms = v;
        }
        if let Some(v) = self.connections {
            settings.download_connections = v;
        }
        if let Some(v) = self.buffer_size {
            settings.buffer_size = v;
        }
        if let Some(v) = self.ping_count {
            settings.ping_count = v;
        }
        if let Some(v) = self.candidate_count {
            settings.candidate_count = v;
        }
        if let Some(v) = self.candidate_ping_max {
            settings.candidate_ping_max = v;
        }
        if let Some(v) = self.candidate_tests {
            settings.candidate_tests = v;
        }
        if let Some(path) = self.output {
            settings.results_file = Some(path);
        }
        settings.verify_candidates &= !self.no_verify;
        settings.interactive &= !self.no_interactive;
        settings.verbose |= self.verbose;
        settings.debug |= self.debug;
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn default_level(debug: bool, verbose: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

fn env_filter(debug: bool, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(debug, verbose)))
}

/// Logging starts from the command-line flags so settings loading is traced too;
/// the returned handle raises the level once the settings file is read.
fn init_tracing(debug: bool, verbose: bool) -> FilterHandle {
    let (filter, handle) = reload::Layer::new(env_filter(debug, verbose));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    handle
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let filter = init_tracing(cli.debug, cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;

    filter.reload(env_filter(settings.debug, settings.verbose))?;

    if settings.debug {
        println!("{}", settings);
    }

    let orchestrator = Orchestrator::new(
        &settings,
        HttpDirectory::new(&settings.directory_url)?,
        IcmpPinger::new()?,
        HttpTransport::new()?,
    );
    let reporter = ConsoleReporter::new(&settings);

    let report = orchestrator.run(&reporter).await;

    if report.outcome == Outcome::Failed {
        eprintln!("Could not find a usable server: {:?}", settings.search);
    }

    if let Some(path) = &settings.results_file {
        let written = ResultStore::new(path).append(&report.results).await?;
        info!("Stored {} result(s) in {:?}", written, path);
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}
