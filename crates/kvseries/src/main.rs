mod display;
mod output;
mod telemetry;

use std::net::SocketAddr;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use kvseries_core::Report;
use kvseries_core::config::Config;
use kvseries_core::filter::{LabelFilter, ReportFilter};
use kvseries_core::query::RangeRequest;
use kvseries_core::time::{parse_day, parse_duration_str};
use kvseries_core::window::{DayRange, QueryWindow};
use kvseries_store::{Appender, HttpKvConfig, HttpKvStore, MergeOrder, RangeReader};
use tokio::io::AsyncReadExt;

use crate::display::DisplayState;
use crate::output::{print_append_human, print_keys_human, print_range_human};
use crate::telemetry::{LogFormat, init_cli_tracing, init_server_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "kvseries")]
#[command(about = "Day-bucketed time series over a remote key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    kv_endpoint: Option<String>,

    #[arg(long, global = true)]
    kv_project: Option<String>,

    #[arg(long, global = true)]
    kv_key: Option<String>,

    #[arg(long, global = true, help = "Bucket timezone: utc, local or an offset like +02:00")]
    bucket_tz: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Accept JSON reports over HTTP and append them to day buckets")]
    Ingest {
        #[arg(long)]
        addr: Option<String>,
    },
    #[command(about = "Serve range queries over HTTP as JSON")]
    Display {
        #[arg(long)]
        addr: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    #[command(about = "Read a day range straight from the KV store")]
    Query {
        #[arg(long, help = "First day, YYYY-MM-DD")]
        start: Option<String>,
        #[arg(long, help = "Last day, YYYY-MM-DD")]
        end: Option<String>,
        #[arg(long, help = "Series name or glob")]
        series: Option<String>,
        #[arg(long = "where", help = "Label filter key=glob, repeatable")]
        where_filters: Vec<String>,
        #[arg(long, help = "Window length when --start is omitted, e.g. 2days")]
        lookback: Option<String>,
    },
    #[command(about = "Append reports from a JSON file, or - for stdin")]
    Push { input: String },
    #[command(about = "Print the bucket keys a day range spans")]
    Keys {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    match cli.command {
        Commands::Ingest { addr } => {
            init_server_tracing("kvseries-ingest", LogFormat::from_env());
            run_ingest(cfg, addr).await
        }
        Commands::Display { addr, group } => {
            init_server_tracing("kvseries-display", LogFormat::from_env());
            run_display(cfg, addr, group).await
        }
        Commands::Query {
            start,
            end,
            series,
            where_filters,
            lookback,
        } => {
            init_cli_tracing();
            let mut state = display_state(&cfg, cfg.group.clone())?;
            if let Some(v) = lookback {
                state.lookback = parse_duration_str(&v)?;
            }
            let request = RangeRequest {
                range: parse_range(start, end)?,
                filter: ReportFilter {
                    series,
                    labels: where_filters
                        .iter()
                        .map(|f| LabelFilter::parse(f))
                        .collect::<kvseries_core::Result<Vec<_>>>()?,
                },
            };
            let response = display::range_response(&state, &request).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_range_human(&response);
            }
            Ok(())
        }
        Commands::Push { input } => {
            init_cli_tracing();
            let reports = read_reports(&input).await?;
            let appender = Appender::new(http_store(&cfg)?, cfg.kv_key.clone(), cfg.bucket_zone)
                .with_timeout(cfg.append_timeout);
            let summary = appender.append_batch(&reports).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_append_human(&summary);
            }
            if !summary.failed.is_empty() {
                anyhow::bail!("{} of {} reports not appended", summary.failed.len(), reports.len());
            }
            Ok(())
        }
        Commands::Keys { start, end } => {
            init_cli_tracing();
            let window = QueryWindow::resolve(
                parse_range(start, end)?,
                Utc::now(),
                cfg.bucket_zone,
                cfg.default_window,
            )?;
            let keys = window.bucket_keys(&cfg.kv_key, cfg.bucket_zone);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else {
                print_keys_human(&keys);
            }
            Ok(())
        }
    }
}

async fn run_ingest(cfg: Config, addr: Option<String>) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .unwrap_or_else(|| cfg.ingest_addr.clone())
        .parse()
        .context("parse ingest address")?;

    let appender = match cfg.require_token() {
        Ok(_) => Some(
            Appender::new(http_store(&cfg)?, cfg.kv_key.clone(), cfg.bucket_zone)
                .with_timeout(cfg.append_timeout),
        ),
        Err(_) => {
            tracing::warn!("KVSERIES_KV_TOKEN is not set; reports will be acknowledged and dropped");
            None
        }
    };

    eprintln!("kvseries ingest");
    eprintln!("  listen: {addr}");
    eprintln!("  kv: {}/{}", cfg.kv_endpoint, cfg.kv_project);
    eprintln!("  key: {}_YYYY_MM_DD ({})", cfg.kv_key, cfg.bucket_zone);

    let server = tokio::spawn(kvseries_ingest::server::run_ingest_server(appender, addr));
    tokio::select! {
        res = server => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    shutdown_tracing();
    Ok(())
}

async fn run_display(
    cfg: Config,
    addr: Option<String>,
    group: Option<String>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .unwrap_or_else(|| cfg.display_addr.clone())
        .parse()
        .context("parse display address")?;
    let state = display_state(&cfg, group.or_else(|| cfg.group.clone()))?;

    eprintln!("kvseries display");
    eprintln!("  listen: {addr}");
    eprintln!("  kv: {}/{}", cfg.kv_endpoint, cfg.kv_project);
    eprintln!("  key: {}_YYYY_MM_DD ({})", cfg.kv_key, cfg.bucket_zone);

    let server = tokio::spawn(display::run_display_server(state, addr));
    tokio::select! {
        res = server => {
            res??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    shutdown_tracing();
    Ok(())
}

/// Defaults, config file and environment, then whatever the command line
/// overrides on top.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = &cli.kv_endpoint {
        cfg.kv_endpoint = v.clone();
    }
    if let Some(v) = &cli.kv_project {
        cfg.kv_project = v.clone();
    }
    if let Some(v) = &cli.kv_key {
        cfg.kv_key = v.clone();
    }
    if let Some(v) = &cli.bucket_tz {
        cfg.bucket_zone = v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid --bucket-tz {v}: {e}"))?;
    }
    Ok(cfg)
}

fn http_store(cfg: &Config) -> anyhow::Result<HttpKvStore> {
    let token = cfg.require_token()?;
    let store = HttpKvStore::new(HttpKvConfig {
        endpoint: cfg.kv_endpoint.clone(),
        project: cfg.kv_project.clone(),
        token: token.to_string(),
        timeout: cfg.fetch_timeout.max(cfg.append_timeout),
    })?;
    Ok(store)
}

fn display_state(
    cfg: &Config,
    group: Option<String>,
) -> anyhow::Result<DisplayState<HttpKvStore>> {
    let reader = RangeReader::new(http_store(cfg)?, cfg.kv_key.clone(), cfg.bucket_zone)
        .with_fetch_timeout(cfg.fetch_timeout)
        .with_order(MergeOrder::from_sort_flag(cfg.sort_merged));
    Ok(DisplayState {
        reader,
        group,
        lookback: cfg.default_window,
    })
}

fn parse_range(start: Option<String>, end: Option<String>) -> anyhow::Result<DayRange> {
    Ok(DayRange {
        start: start.as_deref().map(parse_day).transpose()?,
        end: end.as_deref().map(parse_day).transpose()?,
    })
}

async fn read_reports(input: &str) -> anyhow::Result<Vec<Report>> {
    let raw = if input == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("read reports from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("read reports from {input}"))?
    };
    parse_reports(&raw)
}

/// Accepts the ingest endpoint's array body or a single report object.
fn parse_reports(raw: &str) -> anyhow::Result<Vec<Report>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') {
        let report: Report = serde_json::from_str(trimmed).context("parse report")?;
        return Ok(vec![report]);
    }
    serde_json::from_str(trimmed).context("parse reports")
}
