use anchor_patcher::anchor::AnchorError;
use anchor_patcher::config::{
    apply_patches, check_patches, discover_patch_files, load_from_path, ApplicationError,
    PatchStatus,
};
use anchor_patcher::document::SourceDocument;
use anchor_patcher::recipes::{self, Recipe};
use anchor_patcher::runner::{PatchRunner, RunError, RunReport};
use anchor_patcher::safety::RootGuard;
use anchor_patcher::verify::{self, ProbeStatus};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anchor-patcher")]
#[command(about = "Anchor-based patching for generated source files", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch configs to a project
    Apply {
        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific patch file to apply (otherwise applies all in <root>/patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Dry run - compute every patch without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Report which patches are pending, applied, or drifted
    Status {
        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific patch file to check (otherwise checks all in <root>/patches)
        #[arg(short, long)]
        patches: Option<PathBuf>,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a built-in recipe
    Run {
        /// Recipe name (see `list`)
        recipe: String,

        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Target document (defaults to src/app/Main.tsx under the root)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Dry run - compute the patch without modifying the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,
    },

    /// Check whether a built-in recipe would apply, without writing
    Check {
        /// Recipe name (see `list`)
        recipe: String,

        /// Project root (defaults to the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Target document (defaults to src/app/Main.tsx under the root)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the built-in recipes
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            root,
            patches,
            dry_run,
            diff,
        } => cmd_apply(root, patches, dry_run, diff),

        Commands::Status {
            root,
            patches,
            json,
        } => cmd_status(root, patches, json),

        Commands::Run {
            recipe,
            root,
            file,
            dry_run,
            diff,
        } => cmd_run(&recipe, root, file, dry_run, diff),

        Commands::Check { recipe, root, file } => cmd_check(&recipe, root, file),

        Commands::List => cmd_list(),
    }
}

/// Log level comes from `-v` only; the environment is not consulted.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("anchor_patcher={level}")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match root {
        Some(path) => path,
        None => env::current_dir().context("failed to read current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("project root not found: {}", root.display()))
}

/// Patch files to load: the explicit one, or every `*.toml` in `<root>/patches`.
fn resolve_patch_files(root: &Path, patches: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    if let Some(path) = patches {
        return Ok(vec![path]);
    }

    let patches_dir = root.join("patches");
    if !patches_dir.is_dir() {
        anyhow::bail!(
            "No patches directory at {} (pass --patches FILE to use a specific config)",
            patches_dir.display()
        );
    }
    let files = discover_patch_files(&patches_dir)?;
    if files.is_empty() {
        anyhow::bail!("No .toml patch files found in {}", patches_dir.display());
    }
    Ok(files)
}

fn resolve_target(root: &Path, file: Option<PathBuf>) -> PathBuf {
    match file {
        Some(path) if path.is_absolute() => path,
        Some(path) => root.join(path),
        None => root.join(recipes::DEFAULT_TARGET),
    }
}

fn find_recipe(name: &str) -> Result<&'static Recipe> {
    recipes::find(name).with_context(|| {
        let known: Vec<_> = recipes::all().iter().map(|r| r.name).collect();
        format!("unknown recipe '{}' (known: {})", name, known.join(", "))
    })
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, original: &str, patched: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, patched);
    for group in diff.grouped_ops(3) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                print!("{}", line);
                if change.missing_newline() {
                    println!();
                }
            }
        }
    }
}

/// Print per-operation results of a successful run. Returns how many
/// operations changed the document.
fn report_run(report: &RunReport, dry_run: bool, show_diff: bool) -> usize {
    let mut changed = 0;
    for outcome in &report.outcomes {
        let verb = match (outcome.changed, dry_run) {
            (true, true) => "Would apply to",
            (true, false) => "Applied to",
            (false, _) => "No change in",
        };
        let mark = if outcome.changed {
            "✓".green()
        } else {
            "⊙".yellow()
        };
        println!("{} {}: {} {}", mark, outcome.id, verb, report.path.display());
        if outcome.changed {
            changed += 1;
        }
    }

    if show_diff && report.changed() {
        display_diff(&report.path, &report.original, &report.patched);
    }
    changed
}

/// Print a rejected run with whatever conflict context the error carries.
fn report_failure(err: &RunError) {
    match err {
        RunError::Patch {
            path,
            source,
            already_applied,
        } => {
            eprintln!("{} {}: {}", "✗".red(), source.id(), source);
            eprintln!("  File: {}", path.display());
            match source.anchor_error() {
                Some(AnchorError::AnchorAmbiguous { count, .. }) => {
                    eprintln!(
                        "  {}",
                        format!("CONFLICT: anchor matched {} locations (expected 1)", count).red()
                    );
                    eprintln!("  Action: make the anchor more specific or pin an occurrence");
                }
                Some(AnchorError::IndexOutOfRange { .. }) => {
                    eprintln!("  {}", "CONFLICT: recorded position is past the end".red());
                    eprintln!("  The document is shorter than when the patch was written.");
                }
                Some(e) if e.is_not_found() => {
                    eprintln!("  {}", "CONFLICT: anchor matched no locations".red());
                    if *already_applied {
                        eprintln!("  The patched form is present; this patch looks applied already.");
                    } else {
                        eprintln!("  Possible causes:");
                        eprintln!("    - The generated file was regenerated with different text");
                        eprintln!("    - Another patch already rewrote this region");
                    }
                }
                _ => {}
            }
        }
        other => eprintln!("{} {}", "✗".red(), other),
    }
    if err.rejected_before_write() {
        eprintln!("  Nothing in this batch was written.");
    }
}

fn cmd_apply(
    root: Option<PathBuf>,
    patches: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let root = resolve_root(root)?;
    let patch_files = resolve_patch_files(&root, patches)?;

    println!("Root: {}", root.display());
    println!();

    let mut total_applied = 0;
    let mut total_unchanged = 0;
    let mut total_failed = 0;

    for patch_file in patch_files {
        println!("Loading patches from {}...", patch_file.display());
        let config = load_from_path(&patch_file)?;

        if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }

        match apply_patches(&config, &root, dry_run) {
            Ok(reports) => {
                for report in &reports {
                    let changed = report_run(report, dry_run, show_diff);
                    total_applied += changed;
                    total_unchanged += report.outcomes.len() - changed;
                }
            }
            Err(ApplicationError::Run(err)) => {
                report_failure(&err);
                total_failed += 1;
            }
            Err(err) => {
                eprintln!("{} {}", "✗".red(), err);
                total_failed += 1;
            }
        }

        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{}", total_applied).green());
    println!("  {} unchanged", format!("{}", total_unchanged).yellow());
    println!("  {} failed configs", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(root: Option<PathBuf>, patches: Option<PathBuf>, json: bool) -> Result<()> {
    let root = resolve_root(root)?;
    let patch_files = resolve_patch_files(&root, patches)?;

    let mut statuses: Vec<PatchStatus> = Vec::new();
    for patch_file in patch_files {
        let config = load_from_path(&patch_file)?;
        statuses.extend(check_patches(&config, &root)?);
    }

    let drifted = statuses
        .iter()
        .filter(|s| matches!(s.status, ProbeStatus::Drifted { .. }))
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        println!("{}", "Patch Status Report".bold());
        println!("Root: {}", root.display());
        println!();
        print_status_groups(&statuses);
    }

    if drifted > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_status_groups(statuses: &[PatchStatus]) {
    let applied: Vec<_> = statuses
        .iter()
        .filter(|s| s.status == ProbeStatus::Applied)
        .collect();
    let pending: Vec<_> = statuses
        .iter()
        .filter(|s| s.status == ProbeStatus::Pending)
        .collect();
    let drifted: Vec<_> = statuses
        .iter()
        .filter_map(|s| match &s.status {
            ProbeStatus::Drifted { reason } => Some((s, reason)),
            _ => None,
        })
        .collect();

    if !applied.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✓".green(),
            "APPLIED".green().bold(),
            applied.len()
        );
        for status in &applied {
            println!("  - {} ({})", status.id, status.file.display());
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({} patches)",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for status in &pending {
            println!("  - {} ({})", status.id, status.file.display());
        }
        println!();
    }

    if !drifted.is_empty() {
        println!(
            "{} {} ({} patches)",
            "✗".red(),
            "DRIFTED".red().bold(),
            drifted.len()
        );
        for (status, reason) in &drifted {
            println!("  - {} ({})", status.id, reason.dimmed());
        }
        println!();
    }
}

fn cmd_run(
    name: &str,
    root: Option<PathBuf>,
    file: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let recipe = find_recipe(name)?;
    let root = resolve_root(root)?;
    let target = resolve_target(&root, file);

    if dry_run {
        println!("{}", "[DRY RUN - nothing will be written]".cyan());
    }

    let runner = PatchRunner::new()
        .with_guard(RootGuard::new(&root)?)
        .dry_run(dry_run);
    match runner.run(&target, &recipe.operations()) {
        Ok(report) => {
            report_run(&report, dry_run, show_diff);
            Ok(())
        }
        Err(err) => {
            report_failure(&err);
            std::process::exit(1);
        }
    }
}

fn cmd_check(name: &str, root: Option<PathBuf>, file: Option<PathBuf>) -> Result<()> {
    let recipe = find_recipe(name)?;
    let root = resolve_root(root)?;
    let target = RootGuard::new(&root)?.validate_path(resolve_target(&root, file))?;
    let document = SourceDocument::load(&target)?;

    println!("{} {}", "Checking".bold(), recipe.name);
    println!("File: {}", target.display());
    println!();

    let mut drifted = 0;
    let mut snapshot = document.text().to_string();
    for op in recipe.operations() {
        let status = verify::probe(&snapshot, &op);
        match &status {
            ProbeStatus::Pending => println!("{} {}: pending", "⊙".yellow(), op.id),
            ProbeStatus::Applied => println!("{} {}: applied", "✓".green(), op.id),
            ProbeStatus::Drifted { reason } => {
                eprintln!("{} {}: DRIFTED", "✗".red(), op.id);
                eprintln!("  {}", reason);
                drifted += 1;
            }
        }
        if status == ProbeStatus::Pending {
            if let Ok(next) = op.apply(&snapshot) {
                snapshot = next;
            }
        }
    }

    if drifted > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list() -> Result<()> {
    println!("{}", "Built-in recipes:".bold());
    for recipe in recipes::all() {
        println!("  {} {}", format!("{:<18}", recipe.name).cyan(), recipe.summary);
        for op in recipe.operations() {
            println!(
                "  {:<18}   - {} ({} at {})",
                "",
                op.id,
                op.kind,
                op.anchor.describe()
            );
        }
    }
    println!();
    println!("Default target: {}", recipes::DEFAULT_TARGET);
    Ok(())
}
