//! Plant Disease Server CLI
//!
//! Serves the leaf upload page and the prediction endpoint, or classifies
//! images from disk with the same model and preprocessing.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use plant_disease_server::backend::{backend_name, default_device, InferenceBackend};
use plant_disease_server::config::{ErrorStatusPolicy, ServerConfig};
use plant_disease_server::inference::{InferenceContext, ModelHost};
use plant_disease_server::labels::LabelTable;
use plant_disease_server::model::load_model_config;
use plant_disease_server::server;
use plant_disease_server::utils::logging::{init_logging, LogConfig, LogLevel};
use plant_disease_server::utils::{format_bytes, format_millis};

/// Plant Disease Classification Server
///
/// Classifies photos of crop leaves into 38 PlantVillage classes with a CNN
/// built on the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "plant-disease-server")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Plant leaf disease classification server", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, global = true, env = "PLANT_DISEASE_LOG_LEVEL")]
    log_level: Option<String>,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "PLANT_DISEASE_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags layered on top of the defaults and the TOML file
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// Host to bind to
    #[arg(long, global = true, env = "PLANT_DISEASE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, global = true, env = "PLANT_DISEASE_PORT")]
    port: Option<u16>,

    /// Path to the trained model record
    #[arg(short, long, global = true, env = "PLANT_DISEASE_MODEL")]
    model: Option<PathBuf>,

    /// JSON architecture config for the model
    #[arg(long, global = true, env = "PLANT_DISEASE_MODEL_CONFIG")]
    model_config: Option<PathBuf>,

    /// Largest accepted upload in bytes
    #[arg(long, global = true, env = "PLANT_DISEASE_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    /// Status codes for error responses
    #[arg(long, global = true, value_enum, env = "PLANT_DISEASE_ERROR_STATUS")]
    error_status: Option<ErrorStatusPolicy>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(model) = self.model {
            config.model_path = model;
        }
        if let Some(model_config) = self.model_config {
            config.model_config_path = Some(model_config);
        }
        if let Some(max_upload_bytes) = self.max_upload_bytes {
            config.max_upload_bytes = max_upload_bytes;
        }
        if let Some(error_status) = self.error_status {
            config.error_status = error_status;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve,

    /// Classify an image, or every image in a directory
    Predict {
        /// Path to an image file or a directory of images
        #[arg(short, long)]
        image: PathBuf,

        /// Number of ranked classes to print
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&log_config(&cli)).map_err(anyhow::Error::msg)?;

    let mut config = match &cli.config {
        Some(path) => ServerConfig::from_toml_file(path)?,
        None => ServerConfig::default(),
    };
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(config).await,
        Commands::Predict { image, top_k } => cmd_predict(&config, &image, top_k),
    }
}

/// Pick a logging preset for the command and terminal, then apply `--log-level`
fn log_config(cli: &Cli) -> LogConfig {
    let config = if cli.verbose {
        LogConfig::verbose()
    } else if matches!(cli.command, Some(Commands::Predict { .. })) {
        // predict prints its own report
        LogConfig::quiet()
    } else if !std::io::stdout().is_terminal() {
        LogConfig::production()
    } else {
        LogConfig::default()
    };

    match cli.log_level.as_deref() {
        Some(level) => config.with_level(parse_log_level(level)),
        None => config,
    }
}

fn parse_log_level(name: &str) -> LogLevel {
    match name.parse::<LogLevel>() {
        Ok(level) => level,
        Err(never) => match never {},
    }
}

/// Load the model described by `config`; any failure here is fatal
fn load_context(config: &ServerConfig) -> Result<InferenceContext> {
    let model_config = load_model_config(config.model_config_path.as_deref())?;
    let host = ModelHost::<InferenceBackend>::load(
        &config.model_path,
        &model_config,
        LabelTable::plant_village(),
        default_device(),
    )
    .with_context(|| format!("Could not load model from {}", config.model_path.display()))?;

    Ok(InferenceContext::from_classifier(host))
}

async fn cmd_serve(config: ServerConfig) -> Result<()> {
    info!("Plant Disease Server v{}", plant_disease_server::VERSION);
    info!("Configuration:");
    info!("  Address:     {}:{}", config.host, config.port);
    info!("  Model:       {:?}", config.model_path);
    info!("  Model cfg:   {:?}", config.model_config_path);
    info!("  Upload max:  {}", format_bytes(config.max_upload_bytes));
    info!("  Backend:     {}", backend_name());

    let context = match load_context(&config) {
        Ok(context) => context,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return Err(e);
        }
    };

    server::serve(config, context).await?;
    Ok(())
}

fn cmd_predict(config: &ServerConfig, input: &Path, top_k: usize) -> Result<()> {
    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", config.model_path.display());
    println!("  Backend: {}", backend_name());
    println!();

    if !input.exists() {
        anyhow::bail!("Input path not found: {}", input.display());
    }

    println!("{}", "Loading model...".cyan());
    let context = load_context(config)?;

    let files = collect_images(input)?;
    if files.is_empty() {
        println!("{} No images found in {}", "Warning:".yellow(), input.display());
        return Ok(());
    }

    println!("{}", "Running inference...".cyan());
    println!();

    let mut failures = 0;
    for file in &files {
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let start = Instant::now();
        let outcome = context.predict_bytes(&bytes);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());

        match outcome {
            Ok(prediction) => {
                println!(
                    "{} {} ({:.2}%, entropy {:.3}) in {}",
                    format!("{}:", name).bold(),
                    prediction.label.green(),
                    prediction.rounded_confidence() * 100.0,
                    prediction.entropy(),
                    format_millis(elapsed_ms)
                );
                for (rank, score) in prediction.top_k(top_k, context.labels()).iter().enumerate() {
                    println!(
                        "    {}. {:<50} {:>6.2}%",
                        rank + 1,
                        score.label,
                        score.probability * 100.0
                    );
                }
            }
            Err(e) => {
                failures += 1;
                println!("{} {} [{}] {}", format!("{}:", name).bold(), "Error".red(), e.kind(), e);
            }
        }
    }

    println!();
    println!(
        "{} {} image(s), {} failed",
        "Done:".green().bold(),
        files.len(),
        failures
    );
    Ok(())
}

/// A single file, or the image files directly inside a directory
///
/// Any extension the `image` crate recognizes counts as an image.
fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && image::ImageFormat::from_path(p).is_ok())
        .collect();
    files.sort();
    Ok(files)
}
