//! CNN architecture for leaf disease classification
//!
//! A stack of convolutional blocks (Conv2d, BatchNorm, ReLU, 2x2 MaxPool)
//! doubling the filter count at each stage, followed by global average
//! pooling and a two-layer classifier head. Weights are stored with Burn's
//! `CompactRecorder`, so the record layout depends on this structure.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use crate::labels::NUM_CLASSES;
use crate::utils::error::{self, Error};

/// Configuration for the LeafClassifier CNN
#[derive(Config, Debug)]
pub struct LeafClassifierConfig {
    /// Number of output classes
    #[config(default = "38")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "256")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first block, doubled at each following block
    #[config(default = "32")]
    pub base_filters: usize,

    /// Number of convolutional blocks
    #[config(default = "4")]
    pub depth: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "256")]
    pub hidden_units: usize,

    /// Dropout rate (only active on autodiff backends)
    #[config(default = "0.3")]
    pub dropout_rate: f64,
}

impl LeafClassifierConfig {
    /// Check that the configuration describes a buildable network
    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes == 0 {
            return Err(Error::Config("num_classes must be greater than 0".into()));
        }
        if self.in_channels == 0 || self.base_filters == 0 || self.hidden_units == 0 {
            return Err(Error::Config(
                "in_channels, base_filters and hidden_units must be positive".into(),
            ));
        }
        if self.depth == 0 {
            return Err(Error::Config("depth must be at least 1".into()));
        }
        let reduction = 1usize
            .checked_shl(self.depth as u32)
            .ok_or_else(|| Error::Config(format!("depth {} is too large", self.depth)))?;
        if self.input_size == 0 || self.input_size % reduction != 0 {
            return Err(Error::Config(format!(
                "input_size {} must be a positive multiple of {}",
                self.input_size, reduction
            )));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(Error::Config("dropout_rate must be in range [0.0, 1.0)".into()));
        }
        Ok(())
    }

    /// Channel count produced by the last convolutional block
    pub fn feature_channels(&self) -> usize {
        self.base_filters << (self.depth - 1)
    }

    /// Build the model on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> LeafClassifier<B> {
        LeafClassifier::new(self, device)
    }
}

/// Conv2d, BatchNorm, ReLU and a 2x2 MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Leaf disease classifier
#[derive(Module, Debug)]
pub struct LeafClassifier<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
    num_classes: usize,
    input_size: usize,
}

impl<B: Backend> LeafClassifier<B> {
    /// Create a new classifier with freshly initialized weights
    pub fn new(config: &LeafClassifierConfig, device: &B::Device) -> Self {
        let mut blocks = Vec::with_capacity(config.depth);
        let mut in_channels = config.in_channels;
        for stage in 0..config.depth {
            let out_channels = config.base_filters << stage;
            blocks.push(ConvBlock::new(in_channels, out_channels, device));
            in_channels = out_channels;
        }

        Self {
            blocks,
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(config.feature_channels(), config.hidden_units).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(config.hidden_units, config.num_classes).init(device),
            num_classes: config.num_classes,
            input_size: config.input_size,
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.blocks.iter().fold(x, |x, block| block.forward(x));

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// Forward pass returning class probabilities
    pub fn forward_probabilities(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

impl Default for LeafClassifierConfig {
    fn default() -> Self {
        Self::new().with_num_classes(NUM_CLASSES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> LeafClassifierConfig {
        LeafClassifierConfig::new()
            .with_input_size(32)
            .with_base_filters(4)
            .with_depth(2)
            .with_hidden_units(16)
    }

    #[test]
    fn test_default_config() {
        let config = LeafClassifierConfig::default();
        assert_eq!(config.num_classes, 38);
        assert_eq!(config.input_size, 256);
        assert_eq!(config.feature_channels(), 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(LeafClassifierConfig::new().with_num_classes(0).validate().is_err());
        assert!(LeafClassifierConfig::new().with_input_size(100).validate().is_err());
        assert!(LeafClassifierConfig::new().with_depth(0).validate().is_err());
        assert!(LeafClassifierConfig::new().with_dropout_rate(1.0).validate().is_err());
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 38]);
        assert_eq!(model.num_classes(), 38);
        assert_eq!(model.blocks.len(), 2);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let probs: Vec<f32> = model
            .forward_probabilities(input)
            .into_data()
            .to_vec()
            .unwrap();

        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
