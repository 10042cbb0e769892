//! Inference module: preprocessing, model host and predictions
//!
//! Request path: bytes -> [`preprocess::decode_image`] ->
//! [`preprocess::prepare_image`] -> [`Classifier::classify`] -> [`Prediction`].

pub mod context;
pub mod host;
pub mod prediction;
pub mod preprocess;

// Re-export main types for convenience
pub use context::InferenceContext;
pub use host::{Classifier, ModelHost};
pub use prediction::{round_confidence, ClassScore, Prediction};
pub use preprocess::{decode_image, prepare_image, preprocess_bytes, NormalizedImage, IMAGE_SIZE};
