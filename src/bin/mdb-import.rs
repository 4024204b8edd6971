//! mdb-import command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::{fmt, EnvFilter};

use mdb_import::{
    Config, IdentifierSet, ImportService, Importer, Job, JobSpec, JobState, LogEntry, LogLevel,
    MdbTools, PgConnector,
};

#[derive(Parser)]
#[command(name = "mdb-import", version, about = "Migrate Access .mdb files into PostgreSQL")]
struct Cli {
    /// Config file (default: <config_dir>/mdb-import/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit diagnostics and the final result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables and columns of a source file
    Tables { source: PathBuf },
    /// Write schema and table artifacts without touching a database
    Dump {
        source: PathBuf,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Provision a database and role, then load schema and rows
    Import(ImportArgs),
}

#[derive(Args)]
struct ImportArgs {
    source: PathBuf,

    /// Owning role (default: <database>_user)
    #[arg(long)]
    role: Option<String>,

    #[arg(long, env = "MDB_IMPORT_ROLE_PASSWORD", hide_env_values = true)]
    role_password: String,

    #[arg(long)]
    admin_user: Option<String>,

    #[arg(long, env = "MDB_IMPORT_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Directory for schema and table artifacts
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,
}

fn init_tracing(json: bool, verbose: bool) {
    let default = if verbose { "mdb_import=debug" } else { "mdb_import=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_target(false).try_init()
    };
    if let Err(e) = installed {
        eprintln!("tracing init failed: {e}");
    }
}

fn print_entry(entry: &LogEntry) {
    let marker = match entry.level {
        LogLevel::Info => "→".cyan(),
        LogLevel::Warn => "!".yellow(),
        LogLevel::Error => "✗".red(),
    };
    println!("  {} {}", marker, entry.message);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let tools = MdbTools::new(config.tools.clone());

    match cli.command {
        Commands::Tables { source } => {
            let identifiers = IdentifierSet::discover(&tools, &source)
                .await
                .with_context(|| format!("Failed to read {}", source.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(identifiers.tables())?);
            } else {
                for table in identifiers.tables() {
                    println!("{} {}", "•".cyan(), table.name.bold());
                    println!("    {}", table.columns.join(", ").dimmed());
                }
            }
        }
        Commands::Dump { source, out } => {
            let importer = Importer::new(tools, PgConnector).with_rules(config.schema.clone());
            let job = Job::new();
            let artifacts = importer.prepare(&job, &source, &out).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&artifacts)?);
            } else {
                println!("{} Schema → {}", "✓".green(), artifacts.schema.display());
                for table in &artifacts.tables {
                    println!(
                        "{} {} → {} ({} rows)",
                        "✓".green(),
                        table.table,
                        table.path.display(),
                        table.statements
                    );
                }
            }
        }
        Commands::Import(args) => run_import(config, tools, args, cli.json).await?,
    }

    Ok(())
}

async fn run_import(config: Config, tools: MdbTools, args: ImportArgs, json: bool) -> Result<()> {
    let mut server = config.server.clone();
    if let Some(host) = args.host {
        server.host = host;
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(user) = args.admin_user {
        server.admin_user = user;
    }
    if args.admin_password.is_some() {
        server.admin_password = args.admin_password;
    }

    let importer = Importer::new(tools, PgConnector).with_rules(config.schema.clone());
    let service = ImportService::new(importer, config.jobs.clone());

    let mut spec = JobSpec::new(&args.source, args.role_password, server, &args.work_dir);
    if let Some(role) = args.role {
        spec = spec.with_role(role);
    }

    let id = service.submit(spec)?;
    let job = service.job(&id).context("Job vanished from the registry")?;
    if !json {
        println!("{} Importing {} (job {})", "→".cyan(), args.source.display(), id);
    }

    let mut seen = 0;
    loop {
        let done = job.is_terminal();
        let entries = job.entries_since(seen);
        seen += entries.len();
        if !json {
            entries.iter().for_each(print_entry);
        }
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    match job.state() {
        JobState::Succeeded => {
            let result = service.result(&id).context("Finished job has no result")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let failed = result.failed_statements();
                let summary = format!(
                    "Imported into {} (owner {}), {} failed statements",
                    result.database, result.role, failed
                );
                if failed == 0 {
                    println!("\n{} {}", "✓".green().bold(), summary);
                } else {
                    println!("\n{} {}", "!".yellow().bold(), summary);
                }
            }
            Ok(())
        }
        JobState::Failed { reason } | JobState::Crashed { reason } => {
            anyhow::bail!("Import failed: {reason}")
        }
        JobState::Running => anyhow::bail!("Import stopped reporting progress"),
    }
}
