//! jobflow CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobflow_core::{AnalysisConfig, Panel};
use jobflow_inference::{
    DidOptions, DidReport, SeriesBatch, SeriesDetail, analyze_series, assign, estimate_with,
    group_summary, pre_trend_comparison, series_report,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "jobflow")]
#[command(about = "jobflow - causal and seasonal analysis of occupation-level job flows")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    /// Threads for per-class series fits (0 = auto).
    #[arg(long, global = true, default_value = "0")]
    threads: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum raw `year,month,class,net_jobs` records into a `date,class,net_jobs` panel CSV
    Aggregate {
        /// Raw records CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output panel CSV. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Difference-in-differences with class and month fixed effects
    Did {
        /// Panel CSV (`date,class,net_jobs`)
        #[arg(short, long)]
        panel: PathBuf,

        /// Analysis config (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Per-class seasonal profile, trend and residual AR models
    Series {
        /// Panel CSV (`date,class,net_jobs`)
        #[arg(short, long)]
        panel: PathBuf,

        /// Analysis config (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Both analyses plus the diagnostics report
    Run {
        /// Panel CSV (`date,class,net_jobs`)
        #[arg(short, long)]
        panel: PathBuf,

        /// Analysis config (YAML or JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    if cli.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(cli.threads).build_global() {
            tracing::warn!(error = %e, "could not configure thread pool; using default");
        }
    }

    match cli.command {
        Commands::Aggregate { input, output } => cmd_aggregate(&input, output.as_deref()),
        Commands::Did { panel, config, output } => cmd_did(&panel, &config, output.as_deref()),
        Commands::Series { panel, config, output } => {
            cmd_series(&panel, &config, output.as_deref())
        }
        Commands::Run { panel, config, output } => cmd_run(&panel, &config, output.as_deref()),
        Commands::Version => {
            println!("jobflow {}", jobflow_core::VERSION);
            Ok(())
        }
    }
}

fn load_inputs(panel: &Path, config: &Path) -> Result<(Panel, AnalysisConfig)> {
    tracing::info!(path = %config.display(), "loading config");
    let cfg = AnalysisConfig::from_path(config)
        .with_context(|| format!("reading config {}", config.display()))?;

    tracing::info!(path = %panel.display(), "loading panel");
    let panel = Panel::from_csv_path(panel)
        .with_context(|| format!("reading panel {}", panel.display()))?;
    tracing::info!(rows = panel.len(), classes = panel.classes().len(), "panel loaded");
    Ok((panel, cfg))
}

fn cmd_aggregate(input: &Path, output: Option<&Path>) -> Result<()> {
    let panel = Panel::from_records_csv_path(input)
        .with_context(|| format!("reading records {}", input.display()))?;
    tracing::info!(rows = panel.len(), "records aggregated");
    match output {
        Some(path) => panel.write_csv(std::fs::File::create(path)?)?,
        None => panel.write_csv(std::io::stdout().lock())?,
    }
    Ok(())
}

fn did_json(panel: &Panel, cfg: &AnalysisConfig) -> Result<serde_json::Value> {
    let rows = assign(panel, &cfg.treatment);
    let model = estimate_with(&rows, &DidOptions::from(&cfg.did))?;
    let report = DidReport::from_model(&model);
    tracing::info!(
        estimate = report.treatment_effect.estimate,
        std_error = report.treatment_effect.std_error,
        "DiD estimated"
    );

    Ok(serde_json::json!({
        "estimate": report.treatment_effect.estimate,
        "std_error": report.treatment_effect.std_error,
        "ci_lower": report.treatment_effect.ci_lower,
        "ci_upper": report.treatment_effect.ci_upper,
        "p_value": report.treatment_effect.p_value,
        "model": report,
        "summary": model.to_string(),
        "group_summary": group_summary(&rows),
        "pre_trend_comparison": pre_trend_comparison(&rows),
    }))
}

fn series_json(batch: &SeriesBatch) -> serde_json::Value {
    let classes: serde_json::Map<String, serde_json::Value> = batch
        .classes
        .iter()
        .map(|(class, result)| {
            let v = match result {
                Ok(r) => serde_json::json!({
                    "status": "ok",
                    "result": SeriesDetail::from_result(r),
                }),
                Err(e) => serde_json::json!({ "status": "failed", "error": e.to_string() }),
            };
            (class.clone(), v)
        })
        .collect();

    serde_json::json!({
        "origin": batch.origin,
        "n_ok": batch.n_ok(),
        "classes": classes,
    })
}

fn cmd_did(panel: &Path, config: &Path, output: Option<&Path>) -> Result<()> {
    let (panel, cfg) = load_inputs(panel, config)?;
    write_json(output, did_json(&panel, &cfg)?)
}

fn cmd_series(panel: &Path, config: &Path, output: Option<&Path>) -> Result<()> {
    let (panel, cfg) = load_inputs(panel, config)?;
    let batch = analyze_series(&panel, &cfg.series)?;
    write_json(output, series_json(&batch))
}

fn cmd_run(panel: &Path, config: &Path, output: Option<&Path>) -> Result<()> {
    let (panel, cfg) = load_inputs(panel, config)?;

    // The two paths are independent: a failed DiD is reported, not fatal.
    let did = match did_json(&panel, &cfg) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "DiD estimation failed");
            serde_json::json!({ "error": e.to_string() })
        }
    };
    let batch = analyze_series(&panel, &cfg.series)?;

    let output_json = serde_json::json!({
        "version": jobflow_core::VERSION,
        "panel": {
            "rows": panel.len(),
            "classes": panel.classes(),
            "min_date": panel.min_date(),
            "max_date": panel.max_date(),
        },
        "did": did,
        "series": series_json(&batch),
        "report": series_report(&batch),
    });
    write_json(output, output_json)
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
