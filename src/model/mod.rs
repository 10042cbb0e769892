//! Model module: CNN architecture and record loading
//!
//! The classifier is a Burn module; trained weights are read from a
//! `CompactRecorder` record (`.mpk`). The architecture config can be stored
//! as JSON next to the weights and is validated before the model is built.

pub mod cnn;

use std::path::{Path, PathBuf};

use burn::config::Config;
use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::{debug, info};

pub use cnn::{LeafClassifier, LeafClassifierConfig};

use crate::utils::error::{Error, Result};

/// File extension appended by `CompactRecorder`
pub const RECORD_EXTENSION: &str = "mpk";

/// Path the recorder actually reads for a given model path
pub fn record_path(path: &Path) -> PathBuf {
    path.with_extension(RECORD_EXTENSION)
}

/// Load an architecture config from JSON, or fall back to the default
pub fn load_model_config(path: Option<&Path>) -> Result<LeafClassifierConfig> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                return Err(Error::PathNotFound(path.to_path_buf()));
            }
            debug!("Reading model config from {:?}", path);
            LeafClassifierConfig::load(path).map_err(|e| {
                Error::Config(format!("Failed to parse model config {}: {:?}", path.display(), e))
            })?
        }
        None => LeafClassifierConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

/// Build the network from `config` and load trained weights from `path`
///
/// Fails if the record is missing or does not match the architecture.
pub fn load_classifier<B: Backend>(
    path: &Path,
    config: &LeafClassifierConfig,
    device: &B::Device,
) -> Result<LeafClassifier<B>> {
    let file = record_path(path);
    if !file.exists() {
        return Err(Error::PathNotFound(file));
    }

    info!("Loading model weights from {:?}", file);
    LeafClassifier::<B>::new(config, device)
        .load_file(file.clone(), &CompactRecorder::new(), device)
        .map_err(|e| Error::ModelLoad {
            path: file,
            reason: format!("{:?}", e),
        })
}

/// Write a classifier's weights with `CompactRecorder`
pub fn save_classifier<B: Backend>(model: LeafClassifier<B>, path: &Path) -> Result<()> {
    model
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .map_err(|e| Error::ModelLoad {
            path: path.to_path_buf(),
            reason: format!("Failed to save record: {:?}", e),
        })
}
