use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use cms_watch::alert::{dispatch_alerts, evaluate_alerts, sinks_from_config, AlertPolicy};
use cms_watch::config::{Config, ConfigOverrides};
use cms_watch::history::{history_cutoff, load_since, summarize_trends, FacilityTrend};
use cms_watch::output::csv::{events_to_csv, trends_to_csv, write_changes_csv};
use cms_watch::output::json::render_json;
use cms_watch::output::table::{render_events_table, render_snapshots_table, render_trends_table};
use cms_watch::output::text::render_summary;
use cms_watch::report::FacilityReport;
use cms_watch::snapshot::open_store;
use cms_watch::source::SocrataSource;
use cms_watch::watch::{run_watch, WatchRequest};
use cms_watch::watchlist::resolve_watchlist;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Table,
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "cms-watch",
    version,
    about = "Snapshot CMS nursing home data and report what changed"
)]
struct Cli {
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(short, long, global = true)]
    quiet: bool,
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    #[command(flatten)]
    run: RunArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, clap::Args, Clone, Default)]
struct FacilityArgs {
    /// Facility CCNs; commas or repeated values.
    #[arg(long, num_args = 1..)]
    ccn: Vec<String>,
    /// File with one CCN per line.
    #[arg(long = "ccn-file")]
    ccn_file: Option<PathBuf>,
}

#[derive(Debug, clap::Args, Clone, Default)]
struct RunArgs {
    #[command(flatten)]
    facilities: FacilityArgs,
    /// Look-back window in days for penalties and deficiencies.
    #[arg(long)]
    days: Option<u32>,
    #[arg(long = "out-dir")]
    out_dir: Option<String>,
    #[arg(long = "snapshot-dir")]
    snapshot_dir: Option<String>,
    /// Also write changes_<timestamp>.csv into the output directory.
    #[arg(long = "export-csv")]
    export_csv: bool,
    /// Compare against stored snapshots without saving this pull.
    #[arg(long = "no-history")]
    no_history: bool,
    #[arg(long = "send-alerts")]
    send_alerts: bool,
    #[arg(long = "webhook-url")]
    webhook_url: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rating trends across stored snapshots.
    History {
        #[command(flatten)]
        facilities: FacilityArgs,
        #[arg(long)]
        months: Option<u32>,
    },
    /// List stored snapshots.
    Snapshots,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    config.apply_env();
    config.apply_overrides(ConfigOverrides {
        snapshot_dir: cli.run.snapshot_dir.clone(),
        output_dir: cli.run.out_dir.clone(),
        default_days: cli.run.days,
        webhook_url: cli.run.webhook_url.clone(),
    });

    match &cli.command {
        Some(Commands::Config { init, show }) => {
            handle_config_command(*init, *show, &config, &config_path)
        }
        Some(Commands::Snapshots) => list_snapshots(&config, cli.output),
        Some(Commands::History { facilities, months }) => {
            show_history(&config, facilities, *months, cli.output)
        }
        None => run(&config, &cli.run, cli.output).await,
    }
}

async fn run(config: &Config, args: &RunArgs, format: OutputFormat) -> Result<()> {
    let ccns = resolve_watchlist(&args.facilities.ccn, args.facilities.ccn_file.as_deref())?;
    let source = SocrataSource::new(&config.source, config.app_token())?;
    let store = open_store(config)?;
    let out_dir = config.resolved_output_dir();

    let request = WatchRequest {
        ccns,
        days: config.analysis.default_days,
        today: Local::now().date_naive(),
        out_dir: out_dir.clone(),
        persist: !args.no_history,
    };
    let outcome = run_watch(&source, store.as_ref(), &request).await?;
    print_reports(&outcome.reports, format)?;

    if args.export_csv {
        match write_changes_csv(&out_dir, &outcome.reports, Local::now())? {
            Some(path) => info!("exported changes to {}", path.display()),
            None => info!("no changes to export"),
        }
    }
    if args.send_alerts {
        let alerts = evaluate_alerts(&outcome.reports, &AlertPolicy::from_config(&config.alerts));
        if alerts.is_empty() {
            info!("no alerts at or above {}", config.alerts.min_severity);
        } else {
            let sinks = sinks_from_config(&config.alerts)?;
            if sinks.is_empty() {
                warn!("--send-alerts given but no alert sinks are configured");
            }
            dispatch_alerts(&alerts, &sinks).await;
        }
    }
    info!(
        "reports written to {} ({} events)",
        out_dir.display(),
        outcome.event_count()
    );
    Ok(())
}

fn print_reports(reports: &[FacilityReport], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", render_summary(reports)),
        OutputFormat::Table => println!("{}", render_events_table(reports)),
        OutputFormat::Json => println!("{}", render_json(reports)?),
        OutputFormat::Csv => print!("{}", events_to_csv(reports)?),
    }
    Ok(())
}

fn show_history(
    config: &Config,
    facilities: &FacilityArgs,
    months: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let ccns = resolve_watchlist(&facilities.ccn, facilities.ccn_file.as_deref())?;
    let months = months.unwrap_or(config.analysis.history_months);
    let store = open_store(config)?;
    let cutoff = history_cutoff(Local::now().date_naive(), months);
    let snapshots = load_since(store.as_ref(), cutoff)?;
    let trends = summarize_trends(&snapshots, &ccns);
    if trends.is_empty() {
        warn!("no provider data stored since {cutoff}");
    }
    print_trends(&trends, format)
}

fn print_trends(trends: &[FacilityTrend], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text | OutputFormat::Table => println!("{}", render_trends_table(trends)),
        OutputFormat::Json => println!("{}", render_json(trends)?),
        OutputFormat::Csv => print!("{}", trends_to_csv(trends)?),
    }
    Ok(())
}

fn list_snapshots(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config)?;
    let dates = store.list_dates()?;
    match format {
        OutputFormat::Json => println!("{}", render_json(&dates)?),
        OutputFormat::Text | OutputFormat::Csv => {
            for date in &dates {
                println!("{date}");
            }
        }
        OutputFormat::Table => {
            let snapshots = dates
                .iter()
                .map(|date| store.load(*date))
                .collect::<Result<Vec<_>>>()?;
            println!("{}", render_snapshots_table(&snapshots));
        }
    }
    Ok(())
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        let mut shown = config.clone();
        if !shown.source.app_token.is_empty() {
            shown.source.app_token = "********".to_string();
        }
        if !shown.alerts.email.smtp_password.is_empty() {
            shown.alerts.email.smtp_password = "********".to_string();
        }
        println!("{}", render_json(&shown)?);
    }
    Ok(())
}
