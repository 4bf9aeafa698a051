use anyhow::{Context, Result};
use catalog_core::config::CatalogConfig;
use catalog_skills::{
    reload_snapshot, scan, Complexity, DiagnosticOutcome, FolderDiagnostic, ScanReport, Skill,
    SkillQuery, SkillRepository, SkillScanner, SkillWatcher, WatchOptions,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "skill-catalog",
    about = "Index and watch a directory of SKILL.md skill definitions",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/skill-catalog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the skills directory
    #[arg(short = 'd', long, global = true)]
    skills_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the skills directory once and report what was found
    Scan {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all loaded skills
    List,

    /// Search skills by text, category, tag, or complexity
    Search {
        /// Case-insensitive text matched against name and description
        query: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        complexity: Option<Complexity>,
    },

    /// Show one skill as a SKILL.md document
    Show {
        name: String,
    },

    /// Load skills and keep reloading them as files change
    Watch,

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config.
    let mut config = match &cli.config {
        Some(path) => CatalogConfig::load_from(path)?,
        None => CatalogConfig::load()?,
    };
    config.apply_env_overrides();

    // Apply CLI overrides.
    if let Some(dir) = &cli.skills_dir {
        config.skills.dir = dir.clone();
    }

    init_tracing(&config, cli.verbose);

    match cli.command {
        Commands::Config { action } => handle_config_command(action, &config)?,
        Commands::Scan { json } => {
            config.validate()?;
            let report = scan(&config.skills.dir)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::List => {
            let repo = load_repository(&config).await?;
            for (category, skills) in repo.group_by_category() {
                println!("{category}");
                for skill in skills {
                    println!("  {:<28} {}", skill.name, skill.description);
                }
            }
        }
        Commands::Search {
            query,
            category,
            tag,
            complexity,
        } => {
            let repo = load_repository(&config).await?;
            let query = SkillQuery {
                query,
                category,
                tag,
                complexity,
            };
            let results = repo.search(&query);
            if results.is_empty() {
                println!("No matching skills.");
            }
            for skill in results {
                print_skill_line(&skill);
            }
        }
        Commands::Show { name } => {
            let repo = load_repository(&config).await?;
            let skill = repo
                .get(&name)
                .with_context(|| format!("No skill named '{name}'"))?;
            println!("# {} ({})", skill.uri(), skill.folder_path.display());
            print!("{}", skill.to_document()?);
        }
        Commands::Watch => run_watch(&config).await?,
    }

    Ok(())
}

fn init_tracing(config: &CatalogConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_repository(config: &CatalogConfig) -> Result<Arc<SkillRepository>> {
    config.validate()?;
    let scanner = SkillScanner::new(&config.skills.dir);
    let repo = Arc::new(SkillRepository::new());
    let summary = reload_snapshot(&scanner, &repo, config.watch.on_empty).await?;
    if summary.cleared {
        tracing::warn!("No skill folders in {}", summary.root.display());
    }
    for diagnostic in &summary.diagnostics {
        tracing::debug!("{}", describe(diagnostic));
    }
    Ok(repo)
}

async fn run_watch(config: &CatalogConfig) -> Result<()> {
    let repo = load_repository(config).await?;
    tracing::info!("Loaded {} skills", repo.len());

    if !config.watch.enabled {
        tracing::info!("Hot reload disabled; nothing to watch");
        return Ok(());
    }

    let (watcher, mut errors) = SkillWatcher::start(
        &config.skills.dir,
        Arc::clone(&repo),
        WatchOptions::from(&config.watch),
        |summary| {
            tracing::info!(
                "Catalog reloaded: {} skills ({} skipped, {} failed)",
                summary.skill_count,
                summary.stats.skipped,
                summary.stats.failed
            );
            for diagnostic in &summary.diagnostics {
                tracing::info!("{}", describe(diagnostic));
            }
        },
    )?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(err) = errors.recv() => tracing::warn!("{}", err),
        }
    }

    watcher.stop().await;
    Ok(())
}

fn handle_config_command(action: Option<ConfigAction>, config: &CatalogConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = CatalogConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                let path = CatalogConfig::default().save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", CatalogConfig::default_path().display());
        }
    }
    Ok(())
}

// ── Output ──────────────────────────────────────────────────────────────

fn print_report(report: &ScanReport) {
    println!("Skills directory: {}", report.root.display());
    println!(
        "{} loaded, {} skipped, {} failed",
        report.stats.loaded, report.stats.skipped, report.stats.failed
    );
    for skill in report.skills.values() {
        print_skill_line(skill);
    }
    if !report.diagnostics.is_empty() {
        println!();
        for diagnostic in &report.diagnostics {
            println!("{}", describe(diagnostic));
        }
    }
}

fn print_skill_line(skill: &Skill) {
    let tags = skill.tags.iter().cloned().collect::<Vec<_>>().join(", ");
    println!(
        "  {:<28} {:<16} {}{}",
        skill.name,
        skill.category.as_deref().unwrap_or("-"),
        skill.description,
        if tags.is_empty() {
            String::new()
        } else {
            format!(" [{tags}]")
        }
    );
}

fn describe(diagnostic: &FolderDiagnostic) -> String {
    match &diagnostic.outcome {
        DiagnosticOutcome::Skipped { reason, detail } => {
            format!("skipped {} ({}): {}", diagnostic.folder, reason, detail)
        }
        DiagnosticOutcome::Failed { kind, message } => {
            format!("failed  {} [{}]: {}", diagnostic.folder, kind, message)
        }
    }
}
