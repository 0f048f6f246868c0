//! Top-level CLI definition and dispatch.

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};

use adaptive_disposition::core::config::Config;
use adaptive_disposition::core::errors::{AdcError, Result};
use adaptive_disposition::engine::replay::{ReplayFixture, TurnResult, diff_expectations, replay};
use adaptive_disposition::state::segment::SegmentMap;
use adaptive_disposition::store::provenance::{Decision, ProvenanceEntry, TriggerType};
use adaptive_disposition::store::sqlite::DispositionStore;

/// Adaptive disposition controller — inspect and replay the versioned store.
#[derive(Debug, Parser)]
#[command(
    name = "adc",
    author,
    version,
    about = "Adaptive Disposition Controller - versioned state inspector",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Override database path.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Create the zero-vector initial snapshot and make it active.
    Init,
    /// Show the active snapshot and store summary.
    Status,
    /// List recent versions with their latest provenance.
    History(HistoryArgs),
    /// Run a recorded fixture through the deterministic replay harness.
    Replay(ReplayArgs),
    /// Explain one snapshot: norms, metrics, provenance trail.
    Explain(ExplainArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct HistoryArgs {
    /// Number of versions to list.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: u32,
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// Replay fixture (JSON) to execute.
    #[arg(value_name = "PATH")]
    fixture: PathBuf,
    /// Print every turn result, not just divergences.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct ExplainArgs {
    /// Version id to explain.
    #[arg(value_name = "VERSION_ID")]
    version_id: String,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, value_name = "SHELL")]
    shell: CompletionShell,
}

/// Dispatch a parsed CLI invocation. The returned code is the process exit
/// status: replay uses 0 for a clean match and 1 for divergence; usage and
/// IO failures surface as errors which the binary maps to 2.
pub fn run(cli: &Cli) -> Result<i32> {
    if cli.no_color {
        control::set_override(false);
    }
    let config = load_config(cli)?;
    match &cli.command {
        Command::Init => run_init(cli, &config),
        Command::Status => run_status(cli, &config),
        Command::History(args) => run_history(cli, &config, args),
        Command::Replay(args) => run_replay(cli, args),
        Command::Explain(args) => run_explain(cli, &config, args),
        Command::Completions(args) => {
            generate(args.shell, &mut Cli::command(), "adc", &mut io::stdout());
            Ok(0)
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.paths.db_path.clone_from(db);
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<DispositionStore> {
    DispositionStore::open(&config.paths.db_path)
}

fn run_init(cli: &Cli, config: &Config) -> Result<i32> {
    let store = open_store(config)?;
    let initial = store.create_initial(SegmentMap::default_layout())?;
    store.append_provenance(
        &ProvenanceEntry::new(
            initial.version_id.clone(),
            TriggerType::Init,
            Decision::Commit,
        )
        .with_reason("initial zero-vector snapshot"),
    )?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&initial)?);
    } else {
        println!(
            "{} store initialised at {}",
            "ok:".green().bold(),
            config.paths.db_path.display()
        );
        println!("   active version {}", initial.version_id.bold());
    }
    Ok(0)
}

fn run_status(cli: &Cli, config: &Config) -> Result<i32> {
    let store = open_store(config)?;
    let active = store.get_active()?;
    let provenance_count = store.provenance_count()?;

    if cli.json {
        let value = serde_json::json!({
            "active_version": active.version_id,
            "parent": active.parent_id,
            "created_at": active.created_at,
            "state_norm": active.l2_norm(),
            "segment_norms": active
                .segment_map
                .iter()
                .map(|span| (span.id.name(), active.segment_norm(span.id)))
                .collect::<Vec<_>>(),
            "provenance_rows": provenance_count,
            "wal_mode": store.is_wal_mode(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    println!("{} {}", "active:".bold(), active.version_id);
    println!("  created  {}", active.created_at.to_rfc3339());
    println!(
        "  parent   {}",
        active.parent_id.as_deref().unwrap_or("(initial)")
    );
    println!("  norm     {:.4}", active.l2_norm());
    for span in active.segment_map.iter() {
        println!(
            "  {:<10} {:.4}",
            span.id.name(),
            active.segment_norm(span.id)
        );
    }
    println!("  audit    {provenance_count} provenance rows");
    Ok(0)
}

fn run_history(cli: &Cli, config: &Config, args: &HistoryArgs) -> Result<i32> {
    let store = open_store(config)?;
    let versions = store.list_versions_with_provenance(args.limit)?;

    if cli.json {
        let value: Vec<serde_json::Value> = versions
            .iter()
            .map(|(snapshot, provenance)| {
                serde_json::json!({
                    "version_id": snapshot.version_id,
                    "parent": snapshot.parent_id,
                    "created_at": snapshot.created_at,
                    "state_norm": snapshot.l2_norm(),
                    "decision": provenance.as_ref().map(|p| p.decision.name()),
                    "reason": provenance.as_ref().and_then(|p| p.reason.clone()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    for (snapshot, provenance) in &versions {
        let decision = provenance.as_ref().map_or("-", |p| p.decision.name());
        let decision = match decision {
            "commit" => decision.green(),
            "reject" => decision.red(),
            other => other.normal(),
        };
        println!(
            "{}  {:>8}  norm {:.4}  {}",
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            decision,
            snapshot.l2_norm(),
            snapshot.version_id,
        );
        if let Some(reason) = provenance.as_ref().and_then(|p| p.reason.as_deref()) {
            println!("    {reason}");
        }
    }
    Ok(0)
}

fn run_replay(cli: &Cli, args: &ReplayArgs) -> Result<i32> {
    let raw = fs::read_to_string(&args.fixture).map_err(|source| AdcError::io(&args.fixture, source))?;
    let fixture: ReplayFixture = serde_json::from_str(&raw)?;
    let report = replay(&fixture.start, &fixture.interactions, &fixture.config);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if args.verbose {
            for result in &report.results {
                print_turn(result);
            }
        }
        let summary = &report.summary;
        println!(
            "{} total={} commits={} gate_rejects={} eval_rollbacks={} no_ops={}",
            "summary:".bold(),
            summary.total,
            summary.commits,
            summary.gate_rejects,
            summary.eval_rollbacks,
            summary.no_ops,
        );
        println!("final active version {}", summary.final_snapshot.version_id);
    }

    if fixture.expected.is_empty() {
        return Ok(0);
    }
    let divergences = diff_expectations(&report, &fixture.expected);
    if divergences.is_empty() {
        if !cli.json {
            println!("{} all {} expectations matched", "ok:".green().bold(), fixture.expected.len());
        }
        Ok(0)
    } else {
        for divergence in &divergences {
            eprintln!(
                "{} turn {}: expected {}, got {}",
                "divergence:".red().bold(),
                divergence.turn_id,
                divergence.expected.name(),
                divergence
                    .actual
                    .map_or("(missing turn)", |action| action.name()),
            );
        }
        Ok(1)
    }
}

fn print_turn(result: &TurnResult) {
    let action = match result.action.name() {
        "commit" => result.action.name().green(),
        "no_op" => result.action.name().normal(),
        other => other.red(),
    };
    println!(
        "turn {:>4}  {:<13} delta {:.4}  {}",
        result.turn_id, action, result.metrics.total_delta_norm, result.reason
    );
}

fn run_explain(cli: &Cli, config: &Config, args: &ExplainArgs) -> Result<i32> {
    let store = open_store(config)?;
    let snapshot = store.get(&args.version_id)?;
    let trail = store.provenance_for(&args.version_id)?;

    if cli.json {
        let value = serde_json::json!({
            "snapshot": snapshot,
            "provenance": trail,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    println!("{} {}", "version:".bold(), snapshot.version_id);
    println!(
        "  parent   {}",
        snapshot.parent_id.as_deref().unwrap_or("(initial)")
    );
    println!("  created  {}", snapshot.created_at.to_rfc3339());
    println!("  norm     {:.4}", snapshot.l2_norm());
    for span in snapshot.segment_map.iter() {
        println!(
            "  {:<10} {:.4}",
            span.id.name(),
            snapshot.segment_norm(span.id)
        );
    }
    if let Some(metrics) = &snapshot.metrics {
        println!("  metrics  {}", serde_json::to_string(metrics)?);
    }
    if trail.is_empty() {
        println!("  no provenance rows");
    }
    for entry in &trail {
        println!(
            "  [{}] {} {}",
            entry.trigger_type,
            entry.decision,
            entry.reason.as_deref().unwrap_or(""),
        );
    }
    Ok(0)
}
