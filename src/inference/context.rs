//! Inference context shared by request handlers
//!
//! Built once at startup and handed to the server as state. Cloning is cheap;
//! all clones share the same classifier.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::inference::host::Classifier;
use crate::inference::prediction::Prediction;
use crate::inference::preprocess::{decode_image, prepare_image};
use crate::labels::LabelTable;
use crate::utils::error::Result;

#[derive(Clone)]
pub struct InferenceContext {
    classifier: Arc<dyn Classifier>,
}

impl std::fmt::Debug for InferenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceContext")
            .field("input_size", &self.classifier.input_size())
            .field("num_classes", &self.classifier.labels().len())
            .finish()
    }
}

impl InferenceContext {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn from_classifier<C: Classifier + 'static>(classifier: C) -> Self {
        Self::new(Arc::new(classifier))
    }

    pub fn labels(&self) -> &LabelTable {
        self.classifier.labels()
    }

    pub fn input_size(&self) -> u32 {
        self.classifier.input_size()
    }

    /// Decode, preprocess and classify uploaded image bytes
    ///
    /// CPU-bound; call from a blocking thread inside async code.
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let start = Instant::now();
        let image = decode_image(bytes)?;
        debug!(
            "Decoded {}x{} image ({} bytes) in {:.2}ms",
            image.width(),
            image.height(),
            bytes.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        let input = prepare_image(&image, self.classifier.input_size())?;
        self.classifier.classify(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::host::tests::tiny_config;
    use crate::inference::host::ModelHost;
    use crate::inference::preprocess::tests::solid_png;
    use crate::utils::error::ErrorKind;
    use burn_ndarray::NdArray;

    fn context() -> InferenceContext {
        let device = Default::default();
        let model = tiny_config().init::<NdArray>(&device);
        let host = ModelHost::new(model, LabelTable::plant_village(), device).unwrap();
        InferenceContext::from_classifier(host)
    }

    #[test]
    fn test_predict_bytes_success() {
        let ctx = context();
        let prediction = ctx.predict_bytes(&solid_png(100, 60, [30, 160, 70])).unwrap();
        assert!(ctx.labels().contains(&prediction.label));
    }

    #[test]
    fn test_same_bytes_same_prediction() {
        let ctx = context();
        let bytes = solid_png(90, 90, [120, 100, 20]);
        assert_eq!(
            ctx.predict_bytes(&bytes).unwrap(),
            ctx.clone().predict_bytes(&bytes).unwrap()
        );
    }

    #[test]
    fn test_resolution_insensitive() {
        let ctx = context();
        let small = ctx.predict_bytes(&solid_png(48, 48, [70, 150, 60])).unwrap();
        let large = ctx.predict_bytes(&solid_png(640, 480, [70, 150, 60])).unwrap();
        assert_eq!(small.label, large.label);
    }

    #[test]
    fn test_bad_bytes_report_decode_kind() {
        let ctx = context();
        let err = ctx.predict_bytes(b"\x89PNG but not really").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(ctx.predict_bytes(&[]).unwrap_err().kind(), ErrorKind::Decode);
    }

    /// Needs a trained record: set PLANT_DISEASE_SMOKE_MODEL, PLANT_DISEASE_SMOKE_IMAGE
    /// and PLANT_DISEASE_SMOKE_LABEL, then run with `--ignored`.
    #[test]
    #[ignore]
    fn test_reference_leaf_smoke() {
        use crate::model::cnn::LeafClassifierConfig;
        use std::path::PathBuf;

        let model = PathBuf::from(std::env::var("PLANT_DISEASE_SMOKE_MODEL").unwrap());
        let image = PathBuf::from(std::env::var("PLANT_DISEASE_SMOKE_IMAGE").unwrap());
        let label = std::env::var("PLANT_DISEASE_SMOKE_LABEL").unwrap();

        let host = ModelHost::<NdArray>::load(
            &model,
            &LeafClassifierConfig::default(),
            LabelTable::plant_village(),
            Default::default(),
        )
        .unwrap();
        let ctx = InferenceContext::from_classifier(host);

        let prediction = ctx.predict_bytes(&std::fs::read(image).unwrap()).unwrap();
        assert_eq!(prediction.label, label);
        assert!(prediction.confidence > 0.5);
    }
}
