mod analyze_cmd;
mod config;
mod worker_cmds;

use clap::{Parser, Subcommand};
use tracing::info;

use mise_db::pool;
use mise_db::queries::backlog;

use analyze_cmd::GraphFormat;
use config::MiseConfig;
use worker_cmds::Sweep;

#[derive(Parser)]
#[command(name = "mise", about = "Meal plan workflow workers")]
struct Cli {
    /// Database URL (overrides MISE_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a mise config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/mise")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Finalize meal plans whose voting period has ended
    FinalizeMealPlans,
    /// Write grocery lists for finalized meal plans
    InitializeGroceryLists,
    /// Create advance-prep tasks for the coming week
    CreateMealPlanTasks,
    /// Request re-indexing of stale search entities
    IndexSearchData,
    /// Run every worker once, in pipeline order
    RunAll,
    /// Render a recipe's step graph
    AnalyzeRecipe {
        /// Recipe ID
        recipe_id: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },
}

/// Execute the `mise init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        topics: config::TopicsSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `mise db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `mise db-init` command: create the database, migrate it and
/// summarize what each worker has waiting.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MiseConfig::resolve(cli_db_url)?;

    println!("Initializing mise database...");
    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database.");
    }

    let db_pool = pool::create_pool(&resolved.db_config).await?;
    let backlog = match pool::run_migrations(&db_pool).await {
        Ok(()) => backlog::workflow_backlog(&db_pool).await,
        Err(err) => Err(err),
    };
    db_pool.close().await;
    let backlog = backlog?;

    println!("Database ready. Meal plans:");
    println!("  voting:                 {}", backlog.voting);
    println!("  awaiting finalization:  {}", backlog.awaiting_finalization);
    println!("  awaiting grocery list:  {}", backlog.awaiting_grocery_list);
    println!("  awaiting tasks:         {}", backlog.awaiting_tasks);
    println!("Produced:");
    println!("  grocery list items:     {}", backlog.grocery_list_items);
    println!("  meal plan tasks:        {}", backlog.meal_plan_tasks);
    println!("  outbox messages:        {}", backlog.outbox_messages);

    println!("mise db-init complete.");
    Ok(())
}

/// Run a worker command unless `CEASE_OPERATION` is set.
async fn cmd_sweep(sweep: Sweep, cli_db_url: Option<&str>) -> anyhow::Result<()> {
    if config::cease_operation() {
        info!(?sweep, "CEASE_OPERATION is set, not running");
        return Ok(());
    }
    let resolved = MiseConfig::resolve(cli_db_url)?;
    worker_cmds::run_sweep(sweep, &resolved).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_url = cli.database_url.as_deref();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(db_url).await?;
        }
        Commands::AnalyzeRecipe { recipe_id, format } => {
            let resolved = MiseConfig::resolve(db_url)?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = analyze_cmd::run_analyze(&db_pool, &recipe_id, format).await;
            db_pool.close().await;
            result?;
        }
        Commands::FinalizeMealPlans => cmd_sweep(Sweep::Finalize, db_url).await?,
        Commands::InitializeGroceryLists => cmd_sweep(Sweep::GroceryLists, db_url).await?,
        Commands::CreateMealPlanTasks => cmd_sweep(Sweep::Tasks, db_url).await?,
        Commands::IndexSearchData => cmd_sweep(Sweep::Index, db_url).await?,
        Commands::RunAll => cmd_sweep(Sweep::All, db_url).await?,
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that touch process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
