use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::{Path, PathBuf};
use symbol_patcher::{
    load_request_from_path, load_settings_from_path, ApplyReport, ChangesReport, FileStatus,
    MemoryIndex, Phase, PhaseReport, PreviewReport, RefactorError, Refactorer, Settings,
};
use tracing_subscriber::EnvFilter;

/// Index snapshot looked up in the workspace root when `--index` is absent.
const INDEX_FILE_NAME: &str = ".symbol-index.json";

#[derive(Parser)]
#[command(name = "symbol-patcher")]
#[command(about = "Batch symbol-aware refactoring with preview, diff and atomic apply", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request document in the given phase (default: the document's own)
    Run {
        /// Request document (.toml or .json)
        request: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,

        /// Override the phase named in the request
        #[arg(short, long, value_enum)]
        phase: Option<Phase>,
    },

    /// Show per-operation counts without touching any file
    Preview {
        request: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Show unified diffs without touching any file
    Diff {
        request: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate a request document without planning it
    Check { request: PathBuf },
}

#[derive(Args)]
struct EngineArgs {
    /// Workspace root (else SYMBOL_PATCHER_WORKSPACE, else the current directory)
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Symbol index snapshot (JSON)
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("symbol_patcher=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            engine,
            phase,
        } => cmd_run(&request, &engine, phase),
        Commands::Preview { request, engine } => cmd_run(&request, &engine, Some(Phase::Preview)),
        Commands::Diff { request, engine } => cmd_run(&request, &engine, Some(Phase::Changes)),
        Commands::Check { request } => cmd_check(&request),
    }
}

/// Resolve workspace path
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. SYMBOL_PATCHER_WORKSPACE environment variable
/// 3. Current directory
fn resolve_workspace(cli_workspace: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var("SYMBOL_PATCHER_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: SYMBOL_PATCHER_WORKSPACE is set but path doesn't exist: {}",
                env_path
            )
            .yellow()
        );
    }

    Ok(env::current_dir()?.canonicalize()?)
}

fn load_index(workspace: &Path, explicit: Option<&Path>) -> Result<MemoryIndex> {
    if let Some(path) = explicit {
        return Ok(MemoryIndex::from_json_path(path, workspace)?);
    }
    let default = workspace.join(INDEX_FILE_NAME);
    if default.is_file() {
        return Ok(MemoryIndex::from_json_path(&default, workspace)?);
    }
    tracing::debug!("no symbol index found, symbol operations will not resolve");
    Ok(MemoryIndex::new())
}

fn load_settings(workspace: &Path, explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return Ok(load_settings_from_path(path)?);
    }
    let default = workspace.join(symbol_patcher::config::SETTINGS_FILE_NAME);
    if default.is_file() {
        return Ok(load_settings_from_path(&default)?);
    }
    Ok(Settings::default())
}

fn cmd_run(request_path: &Path, args: &EngineArgs, phase: Option<Phase>) -> Result<()> {
    let workspace = resolve_workspace(args.workspace.as_deref())?;
    let settings = load_settings(&workspace, args.config.as_deref())?;
    let index = load_index(&workspace, args.index.as_deref())?;
    let request = load_request_from_path(request_path)?;
    let (batch, requested) = request.into_batch();
    let phase = phase.unwrap_or(requested);

    let engine = Refactorer::new(&workspace, index, settings)?;
    let report = match engine.run(&batch, phase) {
        Ok(report) => report,
        Err(err) => {
            print_diagnostics(&err);
            return Err(err.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_operations(&report);
    match &report {
        PhaseReport::Preview(preview) => print_preview(preview),
        PhaseReport::Changes(changes) => print_changes(changes),
        PhaseReport::Apply(apply) => print_apply(apply, engine.root()),
    }
    Ok(())
}

fn cmd_check(request_path: &Path) -> Result<()> {
    let request = load_request_from_path(request_path)?;
    println!(
        "{} {}: {} operation(s), phase {}",
        "✓".green(),
        request_path.display(),
        request.operations.len(),
        request.phase
    );
    Ok(())
}

fn print_operations(report: &PhaseReport) {
    for op in report.operations() {
        println!("{} {}", "•".cyan(), op);
    }
}

fn print_preview(report: &PreviewReport) {
    println!();
    println!(
        "{} {} edit(s) in {} file(s)",
        "Total:".bold(),
        report.total_edits,
        report.total_files
    );
}

/// Helper: Show unified diffs with colored +/- lines
fn print_changes(report: &ChangesReport) {
    for file in &report.files {
        println!();
        if file.created {
            println!("{}", format!("new file: {}", file.path.display()).cyan());
        }
        for line in file.diff.lines() {
            let styled = if line.starts_with("+++") || line.starts_with("---") {
                line.bold()
            } else if line.starts_with("@@") {
                line.cyan()
            } else if line.starts_with('+') {
                line.green()
            } else if line.starts_with('-') {
                line.red()
            } else {
                line.normal()
            };
            println!("{}", styled);
        }
    }
}

fn print_apply(report: &ApplyReport, root: &Path) {
    println!();
    for file in &report.files {
        let shown = file.path.strip_prefix(root).unwrap_or(&file.path);
        let marker = match file.status {
            FileStatus::Written => "✓".green(),
            FileStatus::Created => "+".green(),
            FileStatus::Unchanged => "⊙".yellow(),
        };
        println!(
            "{} {} ({}, {} edit(s))",
            marker,
            shown.display(),
            file.status,
            file.edits
        );
    }
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} edit(s) in {} file(s)",
        format!("{}", report.edit_count()).green(),
        report.files.len()
    );
}

/// Extra context for the errors users can act on.
fn print_diagnostics(err: &RefactorError) {
    match err {
        RefactorError::StaleReference { .. } => {
            eprintln!("  {}", "The symbol index no longer matches the sources.".red());
            eprintln!("  Action: re-export the index and run again");
        }
        RefactorError::EditConflict { .. } => {
            eprintln!("  {}", "CONFLICT: two operations edit the same text".red());
            eprintln!("  Action: split the batch or narrow one operation's filter");
        }
        RefactorError::PartialWriteFailure { unrestored, .. } if !unrestored.is_empty() => {
            eprintln!("  {}", "Some files could not be restored:".red().bold());
            for path in unrestored {
                eprintln!("    - {}", path.display());
            }
        }
        _ => {}
    }
}
