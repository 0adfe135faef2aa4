use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::{
    config::{self, Config},
    enroll,
    recognize::Recognizer,
    server::{self, AppState},
    storage::EncodingSource,
    DetectionModel, Pipeline,
};
use log::info;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(
    version,
    about = "Enroll known faces from a folder and identify faces in photos"
)]
struct Cli {
    /// Config file (defaults to the built-in path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode every face under the training folder and replace the encoding database
    Enroll {
        /// Detector strategy: fast or accurate (defaults to the configured one)
        #[arg(short, long)]
        model: Option<DetectionModel>,
    },
    /// Identify the face in an image file
    Recognize {
        image: PathBuf,
        #[arg(short, long)]
        model: Option<DetectionModel>,
    },
    /// Run recognition over every file in the validation folder
    Validate {
        /// Folder to scan instead of the configured one
        #[arg(short, long)]
        dir: Option<PathBuf>,
        #[arg(short, long)]
        model: Option<DetectionModel>,
    },
    /// Start the HTTP server
    Serve {
        /// Rebuild the encoding database before accepting requests
        #[arg(long)]
        enroll: bool,
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the effective configuration
    Config {
        /// Write the default configuration to the config path instead
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let load = || config::load_config(config_path);

    match cli.command {
        Commands::Enroll { model } => {
            let cfg = load()?;
            let mut pipeline = load_pipeline(&cfg)?;
            enroll::enroll(
                &mut pipeline,
                &cfg,
                model.unwrap_or(cfg.detection_model),
            )
            .context("Enrollment failed")?;
            Ok(())
        }
        Commands::Recognize { image, model } => {
            let cfg = load()?;
            let mut pipeline = load_pipeline(&cfg)?;
            let label = recognizer(&cfg, model)
                .recognize_path(&mut pipeline, &image)
                .with_context(|| format!("Failed to recognize {}", image.display()))?;
            println!("{label}");
            Ok(())
        }
        Commands::Validate { dir, model } => {
            let cfg = load()?;
            let mut pipeline = load_pipeline(&cfg)?;
            let dir = dir.unwrap_or_else(|| cfg.validation_dir.clone());
            let results = recognizer(&cfg, model)
                .validate(&mut pipeline, &dir)
                .context("Validation failed")?;
            info!("✓ Validated {} file(s) under {}", results.len(), dir.display());
            Ok(())
        }
        Commands::Serve { enroll, host, port } => {
            let mut cfg = load()?;
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            serve(&cfg, enroll)
        }
        Commands::Config { init } => show_config(config_path, init),
    }
}

fn load_pipeline(cfg: &Config) -> Result<Pipeline> {
    Pipeline::load(&cfg.models).context("Failed to initialize face recognition pipeline")
}

fn recognizer(cfg: &Config, model: Option<DetectionModel>) -> Recognizer {
    Recognizer::new(
        EncodingSource::new(&cfg.encodings_path, cfg.cache_encodings),
        model.unwrap_or(cfg.detection_model),
    )
}

fn serve(cfg: &Config, run_enrollment: bool) -> Result<()> {
    let mut pipeline = load_pipeline(cfg)?;
    if run_enrollment {
        enroll::enroll(&mut pipeline, cfg, cfg.detection_model)
            .context("Enrollment failed")?;
    } else {
        enroll::ensure_layout(cfg).context("Failed to create data folders")?;
    }

    let state = Arc::new(AppState::new(Box::new(pipeline), recognizer(cfg, None)));
    let addr = cfg.server.addr();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        server::serve(listener, state).await.context("Server error")
    })?;

    info!("✓ Server stopped");
    Ok(())
}

fn show_config(path: Option<&std::path::Path>, init: bool) -> Result<()> {
    let shown = path.unwrap_or(&config::CONFIG_PATH);
    if init {
        config::save_config(&Config::default(), path).context("Failed to write config")?;
        info!("✓ Wrote default config to {}", shown.display());
        return Ok(());
    }

    let cfg = config::load_config(path)?;
    info!("Config file: {}", shown.display());
    print!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}
