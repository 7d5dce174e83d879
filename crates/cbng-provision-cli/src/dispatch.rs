use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cbng_provision_core::ProvisionConfig;
use cbng_provision_installer::{
    provision_workspace_with_observer, PipelineStage, ProvisionLayout, ProvisionOptions,
    ProvisionOutcome, SystemRuntime,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::completion::write_completions_script;
use crate::render::{format_outcome_lines, TerminalRenderer};
use crate::{Cli, Commands, RunArgs};

pub(crate) fn run_cli(cli: Cli, renderer: TerminalRenderer) -> Result<()> {
    let Cli {
        config,
        workspace,
        command,
        ..
    } = cli;

    match command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let config = load_config(config.as_deref(), workspace)?;
            run_provision(&config, args, renderer)
        }
        Commands::Plan { json } => {
            let config = load_config(config.as_deref(), workspace)?;
            let plan = PlanReport::from_config(&config)?;
            if json {
                let rendered = serde_json::to_string_pretty(&plan)
                    .context("failed to serialize provision plan")?;
                println!("{rendered}");
            } else {
                renderer.print_lines(&format_plan_lines(&plan));
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            write_completions_script(shell, &mut lock)
        }
    }
}

pub(crate) fn load_config(
    path: Option<&Path>,
    workspace: Option<PathBuf>,
) -> Result<ProvisionConfig> {
    let mut config = match path {
        Some(path) => ProvisionConfig::from_path(path)?,
        None => ProvisionConfig::default(),
    };
    if let Some(workspace) = workspace {
        config.paths.workspace = workspace;
        config.validate()?;
    }
    debug!(
        source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "defaults".to_string()),
        workspace = %config.paths.workspace.display(),
        "loaded provision config"
    );
    Ok(config)
}

fn run_provision(config: &ProvisionConfig, args: RunArgs, renderer: TerminalRenderer) -> Result<()> {
    let mut runtime = SystemRuntime::new()?;
    let options = ProvisionOptions {
        force: args.force,
        rebuild: args.rebuild.map(Into::into),
    };
    let version = config.version()?;
    info!(force = options.force, "starting provision run");
    renderer.print_section(&format!("{} {version}", config.package.name));

    let mut progress = renderer.start_stages("provision", PipelineStage::ALL.len() as u64);
    let result = provision_workspace_with_observer(config, options, &mut runtime, |stage| {
        progress.begin(stage)
    });

    match result {
        Ok(outcome) => {
            match &outcome {
                ProvisionOutcome::Provisioned(_) => progress.finish_success(),
                ProvisionOutcome::AlreadyProvisioned { .. } => progress.finish_abandon(),
            }
            renderer.print_lines(&format_outcome_lines(&outcome, renderer.style()));
            Ok(())
        }
        Err(err) => {
            progress.finish_abandon();
            Err(err)
        }
    }
}

/// Everything a run would touch, resolved without side effects.
#[derive(Debug, Serialize)]
pub(crate) struct PlanReport {
    pub(crate) package: String,
    pub(crate) version: String,
    pub(crate) url: String,
    pub(crate) archive_type: &'static str,
    pub(crate) sha256: Option<String>,
    pub(crate) signature_check: bool,
    pub(crate) archive_path: PathBuf,
    pub(crate) staging_dir: PathBuf,
    pub(crate) sentinel_path: PathBuf,
    pub(crate) payload_dir: PathBuf,
    pub(crate) workspace_dir: PathBuf,
    pub(crate) executables: Vec<String>,
    pub(crate) builder: PathBuf,
    pub(crate) rebuild: &'static str,
    pub(crate) databases: Vec<PlannedDatabase>,
    pub(crate) marker_path: PathBuf,
    pub(crate) receipt_path: PathBuf,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlannedDatabase {
    pub(crate) target: PathBuf,
    pub(crate) source: PathBuf,
}

impl PlanReport {
    pub(crate) fn from_config(config: &ProvisionConfig) -> Result<Self> {
        config.validate()?;
        let layout = ProvisionLayout::from_config(config)?;

        Ok(Self {
            package: config.package.name.clone(),
            version: config.version()?.to_string(),
            url: config.archive_url()?,
            archive_type: config.archive_type()?.as_str(),
            sha256: config.package.sha256.clone(),
            signature_check: config.package.signature.is_some(),
            archive_path: layout.archive_path().to_path_buf(),
            staging_dir: layout.staging_dir().to_path_buf(),
            sentinel_path: layout.sentinel_path(),
            payload_dir: layout.payload_dir(),
            workspace_dir: layout.workspace_dir().to_path_buf(),
            executables: config.layout.executables.clone(),
            builder: layout.workspace_entry(&config.databases.builder),
            rebuild: config.databases.rebuild.as_str(),
            databases: config
                .databases
                .pairs
                .iter()
                .map(|pair| PlannedDatabase {
                    target: layout.data_path(&pair.target),
                    source: layout.data_path(&pair.source),
                })
                .collect(),
            marker_path: layout.marker_path(),
            receipt_path: layout.receipt_path(),
        })
    }
}

pub(crate) fn format_plan_lines(plan: &PlanReport) -> Vec<String> {
    let mut lines = vec![
        format!("package: {} {}", plan.package, plan.version),
        format!("url: {}", plan.url),
        format!("archive: {} ({})", plan.archive_path.display(), plan.archive_type),
        format!(
            "sha256: {}",
            plan.sha256.as_deref().unwrap_or("not pinned")
        ),
        format!("signature-check: {}", plan.signature_check),
        format!("staging: {}", plan.staging_dir.display()),
        format!("sentinel: {}", plan.sentinel_path.display()),
        format!("payload: {}", plan.payload_dir.display()),
        format!("workspace: {}", plan.workspace_dir.display()),
        format!("executables: {}", plan.executables.join(", ")),
        format!("builder: {} (rebuild={})", plan.builder.display(), plan.rebuild),
    ];
    lines.extend(plan.databases.iter().map(|database| {
        format!(
            "database: {} <- {}",
            database.target.display(),
            database.source.display()
        )
    }));
    lines.push(format!("marker: {}", plan.marker_path.display()));
    lines.push(format!("receipt: {}", plan.receipt_path.display()));
    lines
}
