//! Prediction results
//!
//! Turns the classifier's probability vector into a labelled prediction.

use serde::{Deserialize, Serialize};

use crate::labels::LabelTable;
use crate::utils::error::{Error, Result};

/// Decimal places kept when reporting confidence
pub const CONFIDENCE_DECIMALS: i32 = 4;

/// Round a probability for reporting
pub fn round_confidence(confidence: f32) -> f64 {
    let scale = 10f64.powi(CONFIDENCE_DECIMALS);
    (f64::from(confidence) * scale).round() / scale
}

/// A single ranked class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScore {
    pub class_index: usize,
    pub label: String,
    pub probability: f32,
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Arg-max index into the label table
    pub class_index: usize,

    /// Label at `class_index`
    pub label: String,

    /// Probability at `class_index`
    pub confidence: f32,

    /// Full probability distribution over all classes
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Pick the arg-max of `probabilities`
    ///
    /// Ties resolve to the lowest index. The vector must have one entry per
    /// label and at least one finite value.
    pub fn from_probabilities(probabilities: Vec<f32>, labels: &LabelTable) -> Result<Self> {
        if probabilities.len() != labels.len() {
            return Err(Error::Inference(format!(
                "model produced {} probabilities for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }

        let (class_index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |best: Option<(usize, f32)>, (i, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((i, p)),
            })
            .ok_or_else(|| Error::Inference("model produced no finite probabilities".into()))?;

        let label = labels
            .get(class_index)
            .ok_or_else(|| Error::Inference(format!("class index {} out of range", class_index)))?
            .to_string();

        Ok(Self {
            class_index,
            label,
            confidence,
            probabilities,
        })
    }

    /// Confidence rounded for reporting
    pub fn rounded_confidence(&self) -> f64 {
        round_confidence(self.confidence)
    }

    /// The `k` most likely classes, best first
    pub fn top_k(&self, k: usize, labels: &LabelTable) -> Vec<ClassScore> {
        let mut indexed: Vec<(usize, f32)> = self
            .probabilities
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        indexed
            .into_iter()
            .take(k)
            .map(|(class_index, probability)| ClassScore {
                class_index,
                label: labels.get(class_index).unwrap_or("Unknown").to_string(),
                probability,
            })
            .collect()
    }

    /// Entropy of the distribution (higher means less certain)
    pub fn entropy(&self) -> f32 {
        self.probabilities
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| -p * p.ln())
            .sum()
    }
}
