use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::RwLock;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use lamina_cli::commands::{self, Harness};
use lamina_cli::{demo, readline};
use lamina_core::document::{DocumentSurface, MemoryDocument};
use lamina_core::engine::{Engine, EngineOptions};
use lamina_core::registry::FeatureRegistry;
use lamina_types::HarnessSettings;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings: HarnessSettings = confy::load("lamina", None).unwrap_or_else(|err| {
        warn!(error = %err, "failed to load settings; using defaults");
        HarnessSettings::default()
    });

    let document = Arc::new(MemoryDocument::new());
    let mut registry = FeatureRegistry::new();
    demo::register_features(&mut registry, &document).map_err(|e| e.to_string())?;
    for id in &settings.disabled_features {
        if !registry.disable(id) {
            warn!(feature = %id, "disabled feature is not registered");
        }
    }

    let options = EngineOptions {
        unkeyed_rerun: settings.unkeyed_rerun,
    };
    let engine = Engine::new(
        registry.freeze(),
        Arc::clone(&document) as Arc<dyn DocumentSurface>,
        options,
    );

    let state = Arc::new(RwLock::new(Harness {
        engine,
        document,
        settings,
        last_report: None,
        completions: Vec::new(),
        torn_down: false,
    }));

    loop {
        let line = readline::readline()?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match respond(line, Arc::clone(&state)).await {
            Ok(quit) => {
                if quit {
                    break;
                }
            }
            Err(err) => {
                eprint!("{err}");
            }
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(version, about = "activation engine harness")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fire the initial document-ready trigger
    Ready {
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Fire an in-place navigation trigger
    Nav {
        #[arg(short, long)]
        path: String,
    },
    /// Show marker tokens on the document
    Markers,
    /// Show annotations attached by features
    Annotations,
    /// Show the last trigger report
    Report {
        #[arg(long)]
        json: bool,
    },
    /// Await in-flight invocations and show outcomes
    Quiesce,
    /// List registered features
    Features,
    /// Show aggregated shortcut metadata
    Shortcuts,
    /// Show claim records
    Claims,
    /// Simulate the host rebuilding the document
    Reconstruct,
    /// Retire all cleanups and release all claims
    Teardown,
    Exit,
}

async fn respond(line: &str, state: Arc<RwLock<Harness>>) -> Result<bool, String> {
    let mut args = shlex::split(line).ok_or("error: Invalid quoting")?;
    args.insert(0, "lamina".to_string());
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;

    match &cli.command {
        Some(Commands::Ready { path }) => {
            commands::ready(path.as_deref(), Arc::clone(&state)).await?
        }
        Some(Commands::Nav { path }) => commands::navigate(path, Arc::clone(&state)).await?,
        Some(Commands::Markers) => commands::markers(Arc::clone(&state)).await?,
        Some(Commands::Annotations) => commands::annotations(Arc::clone(&state)).await?,
        Some(Commands::Report { json }) => commands::report(*json, Arc::clone(&state)).await?,
        Some(Commands::Quiesce) => commands::quiesce(Arc::clone(&state)).await?,
        Some(Commands::Features) => commands::features(Arc::clone(&state)).await?,
        Some(Commands::Shortcuts) => commands::shortcuts(Arc::clone(&state)).await?,
        Some(Commands::Claims) => commands::claims(Arc::clone(&state)).await?,
        Some(Commands::Reconstruct) => commands::reconstruct(Arc::clone(&state)).await?,
        Some(Commands::Teardown) => commands::teardown(Arc::clone(&state)).await?,
        Some(Commands::Exit) => return Ok(true),
        None => {}
    }
    Ok(false)
}
