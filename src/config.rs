use std::path::Path;

use crate::decoding::alphabet::BlankPosition;
use crate::error::OcrError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    Greedy,
    Beam { beam_width: usize, top_paths: usize },
}

impl DecodeStrategy {
    pub const DEFAULT_BEAM_WIDTH: usize = 10;
}

impl Default for DecodeStrategy {
    fn default() -> Self {
        Self::Beam {
            beam_width: Self::DEFAULT_BEAM_WIDTH,
            top_paths: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrnnConfig {
    pub model_path: String,
    pub config_path: String,
    /// One character per line; the built-in lexicon is used when empty.
    pub lexicon_path: String,
    pub device: String,
    pub batch_size: usize,
    /// Overrides the model config when set.
    pub max_label_len: Option<usize>,
    /// `(height, width)`; overrides the model config when set.
    pub image_size: Option<(usize, usize)>,
    pub decode: DecodeStrategy,
}

impl CrnnConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 64;
}

impl Default for CrnnConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            config_path: String::new(),
            lexicon_path: String::new(),
            device: "cpu".to_string(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
            max_label_len: None,
            image_size: None,
            decode: DecodeStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct CrnnModelConfig {
    #[serde(default = "default_img_height")]
    pub img_height: usize,
    #[serde(default = "default_img_width")]
    pub img_width: usize,
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: usize,
    #[serde(default = "default_max_label_len")]
    pub max_label_len: usize,
    #[serde(default)]
    pub blank_position: BlankPosition,
    #[serde(default = "default_channels_last")]
    pub channels_last: bool,
    /// The network emits raw logits and needs a softmax before decoding.
    #[serde(default)]
    pub outputs_logits: bool,
}

fn default_img_height() -> usize {
    32
}
fn default_img_width() -> usize {
    100
}
fn default_downsample_factor() -> usize {
    4
}
fn default_max_label_len() -> usize {
    23
}
fn default_channels_last() -> bool {
    true
}

impl Default for CrnnModelConfig {
    fn default() -> Self {
        Self {
            img_height: default_img_height(),
            img_width: default_img_width(),
            downsample_factor: default_downsample_factor(),
            max_label_len: default_max_label_len(),
            blank_position: BlankPosition::default(),
            channels_last: default_channels_last(),
            outputs_logits: false,
        }
    }
}

impl CrnnModelConfig {
    /// Reads `config.json`; an empty path yields the defaults.
    pub fn load(path: &Path) -> Result<Self, OcrError> {
        if path.as_os_str().is_empty() {
            return Ok(Self::default());
        }
        let data =
            std::fs::read_to_string(path).map_err(|e| OcrError::io("read config.json", e))?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| OcrError::json("parse config.json", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OcrError> {
        if self.img_height == 0 || self.img_width == 0 {
            return Err(OcrError::invalid_input(format!(
                "image size must be non-zero, got {}x{}",
                self.img_height, self.img_width
            )));
        }
        if self.downsample_factor == 0 {
            return Err(OcrError::invalid_input("downsample_factor must be >= 1"));
        }
        Ok(())
    }

    /// Timesteps the model should emit for one image.
    pub fn expected_timesteps(&self) -> usize {
        self.img_width / self.downsample_factor.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crnn_config_default() {
        let config = CrnnConfig::default();
        assert!(config.model_path.is_empty());
        assert!(config.lexicon_path.is_empty());
        assert_eq!(config.device, "cpu");
        assert_eq!(config.batch_size, 64);
        assert_eq!(
            config.decode,
            DecodeStrategy::Beam {
                beam_width: 10,
                top_paths: 1
            }
        );
    }

    #[test]
    fn model_config_fills_defaults() {
        let config: CrnnModelConfig =
            serde_json::from_str(r#"{"img_width": 128}"#).expect("valid config json");
        assert_eq!(config.img_width, 128);
        assert_eq!(config.img_height, 32);
        assert_eq!(config.blank_position, BlankPosition::Last);
        assert!(config.channels_last);
        assert!(!config.outputs_logits);
        assert_eq!(config.expected_timesteps(), 32);
    }

    #[test]
    fn model_config_parses_blank_position() {
        let config: CrnnModelConfig =
            serde_json::from_str(r#"{"blank_position": "first"}"#).expect("valid config json");
        assert_eq!(config.blank_position, BlankPosition::First);
    }

    #[test]
    fn model_config_rejects_zero_downsample() {
        let config = CrnnModelConfig {
            downsample_factor: 0,
            ..CrnnModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_path_loads_defaults() {
        let config = CrnnModelConfig::load(Path::new("")).expect("defaults");
        assert_eq!(config, CrnnModelConfig::default());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CrnnModelConfig::load(Path::new("/nonexistent/config.json"))
            .expect_err("missing file must fail");
        assert!(matches!(err, OcrError::Io { .. }));
    }
}
