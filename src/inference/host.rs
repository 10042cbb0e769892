//! Model host
//!
//! Owns the loaded network and the label table and maps a normalized image
//! to a prediction. The HTTP layer only sees the [`Classifier`] trait.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use tracing::{debug, info};

use crate::inference::prediction::Prediction;
use crate::inference::preprocess::{NormalizedImage, CHANNELS};
use crate::labels::LabelTable;
use crate::model::{load_classifier, LeafClassifier, LeafClassifierConfig};
use crate::utils::error::{Error, Result};

/// Anything that can classify a normalized leaf image
pub trait Classifier: Send + Sync {
    /// Side length of the square input the classifier expects
    fn input_size(&self) -> u32;

    /// Label table indexed by model output
    fn labels(&self) -> &LabelTable;

    /// Classify one image of shape [1, input_size, input_size, 3]
    fn classify(&self, input: &NormalizedImage) -> Result<Prediction>;
}

/// Burn-backed classifier
pub struct ModelHost<B: Backend> {
    // Burn modules are Send but not Sync
    model: Mutex<LeafClassifier<B>>,
    device: B::Device,
    labels: LabelTable,
    input_size: usize,
}

impl<B: Backend> std::fmt::Debug for ModelHost<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHost")
            .field("input_size", &self.input_size)
            .field("num_classes", &self.labels.len())
            .finish()
    }
}

impl<B: Backend> ModelHost<B> {
    /// Wrap an already built model
    ///
    /// Fails if the label table does not match the model's output size.
    pub fn new(model: LeafClassifier<B>, labels: LabelTable, device: B::Device) -> Result<Self> {
        if model.num_classes() != labels.len() {
            return Err(Error::LabelMismatch {
                labels: labels.len(),
                outputs: model.num_classes(),
            });
        }

        Ok(Self {
            input_size: model.input_size(),
            model: Mutex::new(model),
            device,
            labels,
        })
    }

    /// Load trained weights from disk
    pub fn load(
        path: &Path,
        config: &LeafClassifierConfig,
        labels: LabelTable,
        device: B::Device,
    ) -> Result<Self> {
        let start = Instant::now();
        let model = load_classifier::<B>(path, config, &device)?;
        let host = Self::new(model, labels, device)?;
        host.warm_up().map_err(|reason| Error::ModelLoad {
            path: path.to_path_buf(),
            reason,
        })?;

        info!(
            "Model ready: {} classes, {}x{} input, loaded in {:.1}ms",
            host.labels.len(),
            host.input_size,
            host.input_size,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(host)
    }

    /// Shape the loaded model accepts
    pub fn expected_shape(&self) -> [usize; 4] {
        [1, self.input_size, self.input_size, CHANNELS]
    }

    /// Run one forward pass on a blank image and check the output width
    ///
    /// Loaded weights are only checked against the config, so a record
    /// trained with a different head or filter count surfaces here.
    pub fn warm_up(&self) -> std::result::Result<(), String> {
        let [_, height, width, channels] = self.expected_shape();
        let tensor = Tensor::<B, 4>::zeros([1, channels, height, width], &self.device);

        let dims = self.forward(tensor).map_err(|e| e.to_string())?.dims();
        if dims != [1, self.labels.len()] {
            return Err(format!(
                "model outputs {:?}, expected [1, {}] for the label table",
                dims,
                self.labels.len()
            ));
        }

        debug!("Warm-up pass produced {:?}", dims);
        Ok(())
    }

    // Forward never mutates the model, so a poisoned lock is still usable
    fn lock_model(&self) -> MutexGuard<'_, LeafClassifier<B>> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// NCHW input to class probabilities; backend panics become errors
    fn forward(&self, tensor: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let model = self.lock_model();
        catch_unwind(AssertUnwindSafe(|| model.forward_probabilities(tensor))).map_err(|panic| {
            Error::Inference(format!("forward pass panicked: {}", panic_message(&*panic)))
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

impl<B: Backend> Classifier for ModelHost<B>
where
    B::Device: Send + Sync,
{
    fn input_size(&self) -> u32 {
        self.input_size as u32
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn classify(&self, input: &NormalizedImage) -> Result<Prediction> {
        let expected = self.expected_shape();
        if input.shape() != expected {
            return Err(Error::ShapeMismatch {
                expected,
                actual: input.shape(),
            });
        }

        let start = Instant::now();

        // NHWC -> NCHW for the convolution stack
        let data = TensorData::new(input.data().to_vec(), expected);
        let tensor = Tensor::<B, 4>::from_data(data, &self.device).permute([0, 3, 1, 2]);

        let output = self.forward(tensor)?;

        let probabilities: Vec<f32> = output
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| Error::Inference(format!("Failed to read probabilities: {:?}", e)))?;

        debug!(
            "Forward pass took {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        Prediction::from_probabilities(probabilities, &self.labels)
    }
}
