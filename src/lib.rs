//! # Plant Disease Server
//!
//! HTTP service classifying photos of crop leaves into one of the 38
//! PlantVillage disease classes with a CNN built on the Burn framework.
//!
//! ## Modules
//!
//! - `labels`: the fixed class-label table in model output order
//! - `model`: CNN architecture and record loading
//! - `inference`: image preprocessing, the model host and predictions
//! - `server`: axum router, upload page and prediction endpoint
//! - `config`: layered server configuration
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use plant_disease_server::backend::{default_device, InferenceBackend};
//! use plant_disease_server::inference::{InferenceContext, ModelHost};
//! use plant_disease_server::labels::LabelTable;
//! use plant_disease_server::model::cnn::LeafClassifierConfig;
//!
//! let host = ModelHost::<InferenceBackend>::load(
//!     "best_model.mpk".as_ref(),
//!     &LeafClassifierConfig::default(),
//!     LabelTable::plant_village(),
//!     default_device(),
//! )?;
//! let context = InferenceContext::from_classifier(host);
//! let prediction = context.predict_bytes(&std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.4})", prediction.label, prediction.rounded_confidence());
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod labels;
pub mod model;
pub mod server;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ErrorStatusPolicy, ServerConfig};
pub use inference::{Classifier, InferenceContext, ModelHost, Prediction};
pub use labels::{LabelTable, CLASS_NAMES, NUM_CLASSES};
pub use model::cnn::{LeafClassifier, LeafClassifierConfig};
pub use utils::error::{Error, ErrorKind, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
