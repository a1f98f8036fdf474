pub mod architecture;
pub mod checkpoint;
pub mod loss;

use crate::data::{DatasetShape, NUM_NUCLEOTIDES};
use crate::error::ConfigError;
use burn::prelude::*;

/// Whether a forward pass trains or evaluates the network
///
/// `Train` normalizes with batch statistics, folds them into the running
/// statistics and applies dropout. `Inference` normalizes with the frozen
/// running statistics and skips dropout. Both behave the same on every
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Inference,
}

/// Basset network configuration
#[derive(Config, Debug)]
pub struct BassetConfig {
    /// Positions per input sequence
    #[config(default = "600")]
    pub sequence_length: usize,

    /// Number of independent binary outputs (cell types)
    #[config(default = "164")]
    pub num_targets: usize,

    #[config(default = "300")]
    pub conv1_channels: usize,
    #[config(default = "19")]
    pub conv1_kernel: usize,
    #[config(default = "9")]
    pub conv1_padding: usize,
    #[config(default = "3")]
    pub pool1: usize,

    #[config(default = "200")]
    pub conv2_channels: usize,
    #[config(default = "11")]
    pub conv2_kernel: usize,
    #[config(default = "5")]
    pub conv2_padding: usize,
    #[config(default = "4")]
    pub pool2: usize,

    #[config(default = "200")]
    pub conv3_channels: usize,
    #[config(default = "7")]
    pub conv3_kernel: usize,
    #[config(default = "4")]
    pub conv3_padding: usize,
    #[config(default = "4")]
    pub pool3: usize,

    /// Width of both fully connected hidden layers
    #[config(default = "1000")]
    pub hidden_size: usize,

    /// Dropout rate after each fully connected hidden layer
    #[config(default = "0.3")]
    pub dropout: f64,
}

/// One convolution, normalization and pooling stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvStageSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Kernel size along the sequence axis
    pub kernel: usize,
    /// Kernel size along the nucleotide axis
    pub kernel_width: usize,
    /// Zero padding on both ends of the sequence axis
    pub padding: usize,
    /// Pool size and stride along the sequence axis
    pub pool: usize,
}

/// Feature map sizes implied by a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Sequence-axis height after each convolution stage
    pub heights: [usize; 3],
    /// Input width of the first fully connected layer
    pub flattened: usize,
}

impl BassetConfig {
    /// Architecture of the Basset paper
    pub fn basset_default() -> Self {
        Self::new()
    }

    /// Narrow network on short windows, for smoke tests and quick runs
    pub fn small(sequence_length: usize, num_targets: usize) -> Self {
        Self::new()
            .with_sequence_length(sequence_length)
            .with_num_targets(num_targets)
            .with_conv1_channels(8)
            .with_conv2_channels(8)
            .with_conv3_channels(8)
            .with_hidden_size(16)
    }

    /// Record shape the network consumes
    pub fn dataset_shape(&self) -> DatasetShape {
        DatasetShape {
            sequence_length: self.sequence_length,
            num_targets: self.num_targets,
        }
    }

    /// The three convolution stages in order
    pub fn stages(&self) -> [ConvStageSpec; 3] {
        [
            ConvStageSpec {
                in_channels: 1,
                out_channels: self.conv1_channels,
                kernel: self.conv1_kernel,
                kernel_width: NUM_NUCLEOTIDES,
                padding: self.conv1_padding,
                pool: self.pool1,
            },
            ConvStageSpec {
                in_channels: self.conv1_channels,
                out_channels: self.conv2_channels,
                kernel: self.conv2_kernel,
                kernel_width: 1,
                padding: self.conv2_padding,
                pool: self.pool2,
            },
            ConvStageSpec {
                in_channels: self.conv2_channels,
                out_channels: self.conv3_channels,
                kernel: self.conv3_kernel,
                kernel_width: 1,
                padding: self.conv3_padding,
                pool: self.pool3,
            },
        ]
    }

    /// Run the convolution arithmetic and validate every size
    ///
    /// The first kernel spans all four nucleotides, so the width collapses
    /// to one and stays there; only the sequence axis shrinks.
    pub fn geometry(&self) -> Result<Geometry, ConfigError> {
        let positive = [
            ("sequence_length", self.sequence_length),
            ("num_targets", self.num_targets),
            ("hidden_size", self.hidden_size),
            ("conv1_channels", self.conv1_channels),
            ("conv2_channels", self.conv2_channels),
            ("conv3_channels", self.conv3_channels),
            ("conv1_kernel", self.conv1_kernel),
            ("conv2_kernel", self.conv2_kernel),
            ("conv3_kernel", self.conv3_kernel),
            ("pool1", self.pool1),
            ("pool2", self.pool2),
            ("pool3", self.pool3),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::NonPositive { name });
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::Dropout(self.dropout));
        }

        let mut heights = [0usize; 3];
        let mut height = self.sequence_length;
        for (i, stage) in self.stages().iter().enumerate() {
            let padded = height + 2 * stage.padding;
            if padded < stage.kernel {
                return Err(ConfigError::CollapsedFeatureMap { stage: i + 1 });
            }
            height = (padded - stage.kernel + 1) / stage.pool;
            if height == 0 {
                return Err(ConfigError::CollapsedFeatureMap { stage: i + 1 });
            }
            heights[i] = height;
        }

        Ok(Geometry {
            heights,
            flattened: self.conv3_channels * heights[2],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let geometry = BassetConfig::basset_default().geometry().unwrap();
        assert_eq!(geometry.heights, [200, 50, 13]);
        assert_eq!(geometry.flattened, 200 * 13);
    }

    #[test]
    fn test_small_geometry() {
        let geometry = BassetConfig::small(60, 5).geometry().unwrap();
        assert_eq!(geometry.heights, [20, 5, 1]);
        assert_eq!(geometry.flattened, 8);
    }

    #[test]
    fn test_collapsing_geometry_is_rejected() {
        let config = BassetConfig::small(12, 5);
        assert_eq!(
            config.geometry(),
            Err(ConfigError::CollapsedFeatureMap { stage: 3 })
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = BassetConfig::new().with_pool2(0);
        assert_eq!(config.geometry(), Err(ConfigError::NonPositive { name: "pool2" }));

        let config = BassetConfig::new().with_dropout(1.0);
        assert_eq!(config.geometry(), Err(ConfigError::Dropout(1.0)));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = BassetConfig::small(60, 5);
        let json = serde_json::to_string(&config).unwrap();
        let restored: BassetConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.geometry(), config.geometry());
        assert_eq!(restored.hidden_size, 16);
    }
}
