//! Orchestrator entry point: the `adw` binary described in spec §6's CLI
//! surface. Resolves a stage list (from `--stages`, `--workflow`, or
//! `--config`), creates or reuses the ADW's state row and worktree, and
//! drives the orchestrator to completion -- or, under `--dry-run`, just
//! prints the resolved `WorkflowConfig` and exits without touching git or
//! spawning an agent.

use adw_core::{
    ADWState, ConfigLoader, GitAdapter, NullEventEmitter, Orchestrator, OrchestratorConfig,
    SqliteStateStore, StateStore, WorktreeManager,
};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "adw", about = "Drives one agent-driven workflow run to completion", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// GitHub/Kanban issue number this run addresses.
    issue_number: i64,

    /// Reuse an existing ADW id to resume a prior run; generates a fresh
    /// 8-char hex id otherwise.
    adw_id: Option<String>,

    /// Comma-separated stage list, e.g. `plan,build,test`.
    #[arg(long, value_name = "CSV")]
    stages: Option<String>,

    /// Name of a YAML workflow file under `ADW_CONFIG_DIR` (default `./workflows`).
    #[arg(long, value_name = "NAME")]
    workflow: Option<String>,

    /// Inline JSON `OrchestratorConfig`, e.g. `{"continue_on_failure": true}`.
    #[arg(long, value_name = "JSON")]
    config: Option<String>,

    /// Print the resolved `WorkflowConfig` and exit without running anything.
    #[arg(long)]
    dry_run: bool,

    /// Repository root; `trees/<adw_id>` and the state database are resolved
    /// relative to it.
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn generate_adw_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

async fn resolve_workflow(args: &Args) -> anyhow::Result<adw_core::WorkflowConfig> {
    let loader = ConfigLoader::new();

    if let Some(stages) = &args.stages {
        return Ok(loader.from_stage_list(stages)?);
    }
    if let Some(workflow) = &args.workflow {
        return Ok(loader.from_named_workflow(workflow).await?);
    }
    if args.config.is_some() {
        // An inline `--config` alone carries orchestrator-wide settings, not
        // a stage list; the conventional full pipeline is implied.
        return Ok(loader.from_stage_list("plan,build,test,review,document,merge")?);
    }

    anyhow::bail!("one of --stages, --workflow, or --config is required")
}

fn resolve_orchestrator_config(args: &Args) -> anyhow::Result<OrchestratorConfig> {
    match &args.config {
        Some(json) => Ok(ConfigLoader::new().parse_inline_config(json)?),
        None => Ok(OrchestratorConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())))
        .with_target(false)
        .init();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "workflow run failed");
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let workflow = resolve_workflow(&args).await?;
    let orchestrator_config = resolve_orchestrator_config(&args)?;

    if args.dry_run {
        println!("{}", "resolved workflow configuration (dry run):".bold());
        println!("{}", serde_json::to_string_pretty(&workflow)?);
        println!("{}", serde_json::to_string_pretty(&orchestrator_config)?);
        return Ok(());
    }

    let adw_id = args.adw_id.clone().unwrap_or_else(generate_adw_id);
    let db_path = args.repo_root.join("adws/database/agentickanban.db");
    let store = SqliteStateStore::new(&db_path).await?;
    store.initialize().await?;

    if store.load(&adw_id).await?.is_none() {
        let mut state = ADWState::new(adw_id.clone());
        state.issue_number = Some(args.issue_number);
        store.save(&state).await?;
        info!(adw_id, issue_number = args.issue_number, "created new ADW state");
    }

    let branch_name = format!("adw-{adw_id}-{}", args.issue_number);
    let worktree_manager = WorktreeManager::new(&args.repo_root);
    let worktree_path = worktree_manager.create(&adw_id, &branch_name).await?;

    let mut state = store
        .load(&adw_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("ADW state for '{adw_id}' vanished after creation"))?;
    state.branch_name = Some(branch_name.clone());
    state.worktree_path = Some(worktree_path.display().to_string());
    store.save(&state).await?;

    // Stamps the branch with an initial commit so later stages (build,
    // merge) always have something to diff against; a no-op if the
    // worktree already carries uncommitted or committed changes.
    let adapter = GitAdapter::new(&worktree_path);
    adapter
        .commit_all(&format!("adw({adw_id}): initialize worktree"))
        .await?;

    let store: Arc<dyn StateStore> = Arc::new(store);
    let orchestrator = Orchestrator::new(store, Arc::new(NullEventEmitter), orchestrator_config);

    println!(
        "{} adw_id={adw_id} issue={} stages={}",
        "starting workflow run".green().bold(),
        args.issue_number,
        workflow.enabled_stage_names().join(",")
    );

    orchestrator.run(&adw_id, &worktree_path.display().to_string(), &workflow).await?;

    println!("{} adw_id={adw_id}", "workflow run complete".green().bold());
    Ok(())
}
