use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use quillwork::config::ReconcileConfig;
use quillwork::reconcile::defaults::synthesize;
use quillwork::reconcile::sanitize::sanitize;
use quillwork::reconcile::{Reconciled, Reconciler, ReplayModel, RoleSchemas, SchemaRegistry};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "quillwork",
    about = "Reconcile model responses into schema-conformant structured data",
    version
)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile a saved response, replaying follow-up responses for compensation rounds
    Reconcile(ReconcileArgs),
    /// Print the sanitized form of a response (stdin when no file is given)
    Sanitize {
        file: Option<PathBuf>,
    },
    /// Print the default skeleton for a role
    Skeleton {
        #[arg(long)]
        role: String,
        #[arg(long)]
        schemas: Option<PathBuf>,
    },
    /// List the roles with a registered schema
    Roles {
        #[arg(long)]
        schemas: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    #[arg(long)]
    role: String,
    /// Initial model response
    #[arg(long)]
    input: PathBuf,
    /// Responses served, in order, to compensation prompts
    #[arg(long = "followup")]
    followups: Vec<PathBuf>,
    /// Extra role → schema table (JSON or TOML)
    #[arg(long)]
    schemas: Option<PathBuf>,
    #[arg(long)]
    max_retries: Option<u32>,
    /// Treat empty required arrays as incomplete
    #[arg(long)]
    strict_arrays: bool,
    /// Print the compensation prompts that were sent
    #[arg(long)]
    show_prompts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quillwork=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReconcileConfig::load_from(path),
        None => ReconcileConfig::load(),
    };

    match cli.command {
        Commands::Reconcile(args) => run_reconcile(args, config).await,
        Commands::Sanitize { file } => {
            let raw = read_input(file.as_deref())?;
            println!("{}", sanitize(&raw));
            Ok(())
        }
        Commands::Skeleton { role, schemas } => {
            let registry = load_registry(schemas.as_deref(), &config)?;
            let schema = registry
                .schema_for_role(&role)
                .with_context(|| format!("No schema registered for role '{}'", role))?;
            println!("{}", serde_json::to_string_pretty(&synthesize(&schema))?);
            Ok(())
        }
        Commands::Roles { schemas } => {
            let registry = load_registry(schemas.as_deref(), &config)?;
            for role in registry.roles() {
                println!("{}", role);
            }
            Ok(())
        }
    }
}

async fn run_reconcile(args: ReconcileArgs, mut config: ReconcileConfig) -> Result<()> {
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if args.strict_arrays {
        config.empty_arrays_incomplete = true;
    }

    let registry = load_registry(args.schemas.as_deref(), &config)?;
    let initial = read_input(Some(&args.input))?;
    let followups = args
        .followups
        .iter()
        .map(|path| read_input(Some(path)))
        .collect::<Result<Vec<_>>>()?;

    let model = Arc::new(ReplayModel::new(followups));
    let reconciler = Reconciler::new(Arc::new(registry), model.clone(), &config);
    let outcome = reconciler.reconcile(&args.role, initial).await?;

    if args.show_prompts {
        for (i, prompt) in model.prompts().iter().enumerate() {
            eprintln!("--- compensation prompt {} ---\n{}\n", i + 1, prompt);
        }
    }

    match outcome {
        Reconciled::Structured(reconciliation) => {
            println!("{}", serde_json::to_string_pretty(&reconciliation)?);
        }
        Reconciled::Unstructured(text) => println!("{}", text),
    }
    Ok(())
}

fn load_registry(extra: Option<&Path>, config: &ReconcileConfig) -> Result<RoleSchemas> {
    let mut registry = RoleSchemas::builtin()?;
    for path in [config.schema_file.as_deref(), extra].into_iter().flatten() {
        registry = registry.merged(RoleSchemas::load(path)?);
    }
    Ok(registry)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}
