use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use nettopo::duration::{format_duration, parse_duration};
use nettopo::logging::init_logging;
use nettopo::{export_graph, Engine, InputSource, LogFormat, Output, Overrides, Settings};

#[derive(Parser, Debug)]
#[command(name = "nettopo")]
#[command(about = "Live network topology graph from packet captures and traceroutes")]
struct Args {
    /// Capture file of newline-delimited events ("-" for stdin)
    #[arg(short, long, conflicts_with = "connect")]
    input: Option<String>,

    /// Read events from a TCP endpoint (host:port)
    #[arg(short, long)]
    connect: Option<String>,

    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print updates to stdout as JSON lines
    #[arg(long)]
    stdout: bool,

    /// Append updates to a file as JSON lines (repeatable)
    #[arg(long)]
    output_file: Vec<PathBuf>,

    /// Send each update to a TCP endpoint (repeatable)
    #[arg(long)]
    output_tcp: Vec<String>,

    /// Identity of this host (default: detected primary address)
    #[arg(long)]
    local_ip: Option<String>,

    /// Idle time before a host, connection or path is evicted (e.g. "5m", "300s")
    #[arg(long, value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// How often idle entities are swept (e.g. "60s")
    #[arg(long, value_parser = parse_duration)]
    sweep_interval: Option<Duration>,

    /// Identify packet endpoints by ip:port instead of ip
    #[arg(long)]
    port_identity: bool,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Export the detailed graph to a JSON file once the input ends, then exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            node_timeout: self.timeout,
            sweep_interval: self.sweep_interval,
            local_identity: self.local_ip.clone(),
            port_identity: self.port_identity,
            log_format: self.log_format,
        }
    }

    fn outputs(&self) -> Vec<Output> {
        let mut outputs = Vec::new();
        if self.stdout {
            outputs.push(Output::Stdout);
        }
        outputs.extend(self.output_file.iter().cloned().map(Output::File));
        outputs.extend(self.output_tcp.iter().cloned().map(Output::Tcp));
        outputs
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply(args.overrides())?;
    init_logging(&settings.log_level, settings.log_format)?;

    let config = settings.engine_config();
    info!(
        local = %config.local_identity,
        timeout = %format_duration(config.node_timeout),
        sweep_interval = %format_duration(config.sweep_interval),
        port_identity = config.port_identity,
        "starting nettopo"
    );
    let engine = Engine::new(config);

    for output in args.outputs() {
        engine.attach(output);
    }
    let sweeper = engine.start_sweeper();

    let source = InputSource::from_args(args.input.as_deref(), args.connect.as_deref());
    info!(%source, "reading events");
    let reader = source.open().await?;

    let finished = tokio::select! {
        report = engine.ingest(reader) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };

    match (finished, &args.export) {
        (Some(_), Some(path)) => {
            export_graph(&engine, path)?;
            info!(path = %path.display(), "exported graph");
        }
        (Some(_), None) => {
            info!("input ended, still sweeping and publishing until Ctrl-C");
            tokio::signal::ctrl_c().await?;
        }
        (None, _) => info!("interrupted"),
    }

    sweeper.shutdown().await;

    let stats = engine.query().stats();
    info!(stats = %serde_json::to_string(&stats)?, "final stats");
    Ok(())
}
