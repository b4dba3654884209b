//! Exec action CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use exec_action::logging::init_logging;
use exec_action::{ActionSet, DeviceEvent, RuntimeMode, SystemResolver, Uevent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "exec-action")]
#[command(about = "Run templated commands for device events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Actions file (YAML)
    #[arg(short, long, default_value = "actions.yaml")]
    config: PathBuf,

    /// Log filter, e.g. "debug" (defaults to $EXEC_ACTION_LOG, then "info")
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the actions file and list its actions
    Check,

    /// Fire actions for one event
    Fire {
        /// Event file in uevent KEY=VALUE format
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Parse the event file as a JSON object instead
        #[arg(long)]
        json: bool,

        /// Extra event property, KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "property")]
        properties: Vec<String>,

        /// Only fire the action with this name
        #[arg(short, long)]
        action: Option<String>,

        /// Log what would run without running it
        #[arg(long)]
        dry_run: bool,

        /// Log the rendered command line of each child
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level.as_deref())?;

    let actions = ActionSet::load(&cli.config, &SystemResolver)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Check => {
            list_actions(&actions);
            actions.release();
        }
        Commands::Fire {
            event,
            json,
            properties,
            action,
            dry_run,
            debug,
        } => {
            let event = build_event(event.as_deref(), json, &properties)?;
            let mode = RuntimeMode { dry_run, debug };
            let failed = fire(Arc::new(actions), Arc::new(event), action, mode).await?;

            if failed > 0 {
                bail!("{} action(s) failed", failed);
            }
        }
    }

    Ok(())
}

fn list_actions(actions: &ActionSet) {
    println!("Actions ({}):", actions.len());
    println!();

    for named in actions.iter() {
        println!("  {} ({})", named.name, named.action.kind().name());

        let exec_action::Action::Exec(exec) = &named.action;
        let template = exec.template();
        let creds = template.credentials();

        println!("    args: {}", template.argv().len());
        if !template.env().is_empty() {
            let names: Vec<&str> = template.env().iter().map(|e| e.name.as_str()).collect();
            println!("    env: {}", names.join(", "));
        }
        if !creds.is_inherit() {
            println!("    uid: {:?}, gid: {:?}", creds.uid, creds.gid);
        }
    }
}

fn build_event(path: Option<&Path>, json: bool, properties: &[String]) -> Result<Uevent> {
    let mut event = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read event {}", path.display()))?;
            if json {
                Uevent::from_json(&text)?
            } else {
                Uevent::parse_uevent(&text)?
            }
        }
        None => Uevent::new(),
    };

    for property in properties {
        let (name, value) = property
            .split_once('=')
            .with_context(|| format!("property `{}' is not KEY=VALUE", property))?;
        event.insert(name, value);
    }

    info!("event has {} properties", event.properties().len());

    Ok(event)
}

/// Fire the selected actions concurrently and count failures
async fn fire(
    actions: Arc<ActionSet>,
    event: Arc<Uevent>,
    only: Option<String>,
    mode: RuntimeMode,
) -> Result<usize> {
    let names: Vec<String> = match only {
        Some(name) => {
            if actions.get(&name).is_none() {
                bail!("no action named `{}'", name);
            }
            vec![name]
        }
        None => actions.iter().map(|a| a.name.clone()).collect(),
    };

    let mut handles = Vec::with_capacity(names.len());
    for name in names {
        let actions = Arc::clone(&actions);
        let event = Arc::clone(&event);

        handles.push(tokio::task::spawn_blocking(move || {
            let outcome = actions
                .get(&name)
                .map(|named| named.action.execute(event.as_ref(), mode));
            (name, outcome)
        }));
    }

    let mut failed = 0;
    for handle in handles {
        let (name, outcome) = handle.await.context("action task panicked")?;
        match outcome {
            Some(Ok(outcome)) if outcome.is_success() => {
                info!("action {}: {:?}", name, outcome);
            }
            Some(Ok(outcome)) => {
                error!("action {} failed: {:?}", name, outcome);
                failed += 1;
            }
            Some(Err(e)) => {
                error!("action {}: {}", name, e);
                failed += 1;
            }
            None => {}
        }
    }

    Ok(failed)
}
