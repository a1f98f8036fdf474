use crate::error::ConfigError;
use crate::model::{BassetConfig, ConvStageSpec, Mode};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::Distribution;

/// Convolution, batch normalization, ReLU and max pooling along the
/// sequence axis
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    fn new(spec: &ConvStageSpec, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new(
            [spec.in_channels, spec.out_channels],
            [spec.kernel, spec.kernel_width],
        )
        .with_padding(PaddingConfig2d::Explicit(spec.padding, 0))
        .init(device);

        Self {
            conv,
            norm: BatchNormConfig::new(spec.out_channels).init(device),
            pool: MaxPool2dConfig::new([spec.pool, 1])
                .with_strides([spec.pool, 1])
                .init(),
        }
    }

    /// `[N, C_in, H, W]` to `[N, C_out, H', 1]`
    pub fn forward(&self, x: Tensor<B, 4>, mode: Mode) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let shape = [1, x.dims()[1], 1, 1];
        let x = match mode {
            Mode::Train => batch_norm(&self.norm, x, shape),
            Mode::Inference => frozen_norm(&self.norm, x, shape),
        };
        self.pool.forward(relu(x))
    }
}

/// Fully connected layer, batch normalization, ReLU and dropout
#[derive(Module, Debug)]
pub struct DenseStage<B: Backend> {
    linear: Linear<B>,
    norm: BatchNorm<B, 0>,
    dropout: Dropout,
}

impl<B: Backend> DenseStage<B> {
    fn new(input: usize, output: usize, dropout: f64, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(input, output).init(device),
            norm: BatchNormConfig::new(output).init(device),
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>, mode: Mode) -> Tensor<B, 2> {
        let x = self.linear.forward(x);
        let shape = [1, x.dims()[1]];
        match mode {
            Mode::Train => dropout(&self.dropout, relu(batch_norm(&self.norm, x, shape))),
            Mode::Inference => relu(frozen_norm(&self.norm, x, shape)),
        }
    }
}

/// Normalize with the batch statistics and fold them into the running ones
///
/// `shape` is the broadcast shape of one per-channel vector, channels on
/// axis 1. Variance is biased, matching the running-statistic update of
/// burn's own layer.
fn batch_norm<B: Backend, const N: usize, const D: usize>(
    norm: &BatchNorm<B, N>,
    x: Tensor<B, D>,
    shape: [usize; D],
) -> Tensor<B, D> {
    let channels = shape[1];
    let count = x.shape().num_elements() / channels;

    let flat: Tensor<B, 2> = x.clone().swap_dims(0, 1).reshape([channels, count]);
    let mean = flat.clone().mean_dim(1);
    let var = flat.sub(mean.clone()).powf_scalar(2.0).mean_dim(1);

    let momentum = norm.momentum;
    let running_mean = norm
        .running_mean
        .value_sync()
        .mul_scalar(1.0 - momentum)
        .add(mean.clone().detach().reshape([channels]).mul_scalar(momentum));
    let running_var = norm
        .running_var
        .value_sync()
        .mul_scalar(1.0 - momentum)
        .add(var.clone().detach().reshape([channels]).mul_scalar(momentum));
    norm.running_mean.update(running_mean.detach());
    norm.running_var.update(running_var.detach());

    normalize(norm, x, mean.reshape(shape), var.reshape(shape), shape)
}

/// Normalize with the running statistics, leaving them untouched
fn frozen_norm<B: Backend, const N: usize, const D: usize>(
    norm: &BatchNorm<B, N>,
    x: Tensor<B, D>,
    shape: [usize; D],
) -> Tensor<B, D> {
    let mean = norm.running_mean.value_sync().reshape(shape);
    let var = norm.running_var.value_sync().reshape(shape);
    normalize(norm, x, mean, var, shape)
}

fn normalize<B: Backend, const N: usize, const D: usize>(
    norm: &BatchNorm<B, N>,
    x: Tensor<B, D>,
    mean: Tensor<B, D>,
    var: Tensor<B, D>,
    shape: [usize; D],
) -> Tensor<B, D> {
    let gamma = norm.gamma.val().reshape(shape);
    let beta = norm.beta.val().reshape(shape);

    x.sub(mean)
        .div(var.add_scalar(norm.epsilon).sqrt())
        .mul(gamma)
        .add(beta)
}

/// Zero activations with probability `prob`, rescaling the survivors
fn dropout<B: Backend, const D: usize>(layer: &Dropout, x: Tensor<B, D>) -> Tensor<B, D> {
    if layer.prob == 0.0 {
        return x;
    }
    let keep = 1.0 - layer.prob;
    let mask = x.random_like(Distribution::Bernoulli(keep));
    x.mul(mask).div_scalar(keep)
}

/// Basset network
///
/// Three convolution stages over a one-hot `[N, 1, L, 4]` input, then two
/// fully connected stages and a final linear layer with one logit per
/// cell type. The sigmoid is left to the loss and to [`Self::predict_proba`].
#[derive(Module, Debug)]
pub struct BassetModel<B: Backend> {
    conv1: ConvStage<B>,
    conv2: ConvStage<B>,
    conv3: ConvStage<B>,
    fc1: DenseStage<B>,
    fc2: DenseStage<B>,
    output: Linear<B>,
}

impl<B: Backend> BassetModel<B> {
    /// Logits `[N, num_targets]`
    pub fn forward(&self, input: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        let x = self.conv1.forward(input, mode);
        let x = self.conv2.forward(x, mode);
        let x = self.conv3.forward(x, mode);

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);

        let x = self.fc1.forward(x, mode);
        let x = self.fc2.forward(x, mode);
        self.output.forward(x)
    }

    /// Per-cell-type accessibility probabilities in inference mode
    pub fn predict_proba(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(input, Mode::Inference))
    }
}

/// Build a freshly initialized network, validating the geometry first
pub fn init_model<B: Backend>(
    config: &BassetConfig,
    device: &B::Device,
) -> Result<BassetModel<B>, ConfigError> {
    let geometry = config.geometry()?;
    let [stage1, stage2, stage3] = config.stages();

    Ok(BassetModel {
        conv1: ConvStage::new(&stage1, device),
        conv2: ConvStage::new(&stage2, device),
        conv3: ConvStage::new(&stage3, device),
        fc1: DenseStage::new(geometry.flattened, config.hidden_size, config.dropout, device),
        fc2: DenseStage::new(config.hidden_size, config.hidden_size, config.dropout, device),
        output: LinearConfig::new(config.hidden_size, config.num_targets).init(device),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_default_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&BassetConfig::basset_default(), &device).unwrap();

        let input = Tensor::<TestBackend, 4>::zeros([1, 1, 600, 4], &device);
        let logits = model.forward(input, Mode::Inference);
        assert_eq!(logits.dims(), [1, 164]);
    }

    #[test]
    fn test_small_forward_shape() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&BassetConfig::small(60, 5), &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([3, 1, 60, 4], &device);
        assert_eq!(model.forward(input, Mode::Train).dims(), [3, 5]);
    }

    #[test]
    fn test_frozen_norm_matches_burn_inference() {
        let device = <TestBackend as Backend>::Device::default();
        let norm = BatchNormConfig::new(3).init::<TestBackend, 2>(&device);
        let x = Tensor::<TestBackend, 4>::random(
            [2, 3, 5, 1],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        // without autodiff burn's layer normalizes with the running statistics
        let expected = norm.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        let actual = frozen_norm(&norm, x, [1, 3, 1, 1])
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn test_batch_norm_uses_batch_statistics() {
        let device = <TestBackend as Backend>::Device::default();
        let norm = BatchNormConfig::new(2).init::<TestBackend, 0>(&device);
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 10.0], [3.0, 30.0]], &device);

        let normalized = values(batch_norm(&norm, x, [1, 2]));
        for (a, b) in normalized.iter().zip([-1.0, -1.0, 1.0, 1.0].iter()) {
            assert!((a - b).abs() < 1e-2, "{a} vs {b}");
        }

        // momentum 0.1 moves the running mean a tenth of the way to [2, 20]
        let running = norm.running_mean.value_sync().into_data().to_vec::<f32>().unwrap();
        assert!((running[0] - 0.2).abs() < 1e-5);
        assert!((running[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_train_mode_differs_from_inference_without_autodiff() {
        let device = <TestBackend as Backend>::Device::default();
        TestBackend::seed(7);
        let model =
            init_model::<TestBackend>(&BassetConfig::small(60, 5).with_dropout(0.5), &device)
                .unwrap();
        let input = Tensor::<TestBackend, 4>::random(
            [4, 1, 60, 4],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );

        let first = values(model.forward(input.clone(), Mode::Train));
        let second = values(model.forward(input.clone(), Mode::Train));
        let inference = values(model.forward(input, Mode::Inference));

        assert_ne!(first, inference);
        assert_ne!(first, second);
    }

    #[test]
    fn test_dropout_is_skipped_at_zero_rate() {
        let device = <TestBackend as Backend>::Device::default();
        let layer = DropoutConfig::new(0.0).init();
        let x = Tensor::<TestBackend, 2>::ones([3, 4], &device);
        assert_eq!(values(dropout(&layer, x)), vec![1.0; 12]);

        let layer = DropoutConfig::new(0.5).init();
        let x = Tensor::<TestBackend, 2>::ones([50, 40], &device);
        let kept = values(dropout(&layer, x));
        assert!(kept.iter().all(|v| *v == 0.0 || (v - 2.0).abs() < 1e-6));
        assert!(kept.iter().any(|v| *v == 0.0));
    }

    #[test]
    fn test_inference_is_deterministic_under_autodiff() {
        let device = <TestAutodiffBackend as Backend>::Device::default();
        let model =
            init_model::<TestAutodiffBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 1, 60, 4], &device);

        let first = model.forward(input.clone(), Mode::Inference).inner();
        let second = model.forward(input, Mode::Inference).inner();
        assert_eq!(values(first), values(second));
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&BassetConfig::small(60, 5), &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([4, 1, 60, 4], &device);
        let probs = values(model.predict_proba(input));
        assert_eq!(probs.len(), 20);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let device = <TestBackend as Backend>::Device::default();
        let result = init_model::<TestBackend>(&BassetConfig::small(12, 5), &device);
        assert!(matches!(result, Err(ConfigError::CollapsedFeatureMap { stage: 3 })));
    }
}
