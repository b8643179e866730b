use std::path::Path;
use std::sync::Arc;

use crate::config::{CrnnConfig, CrnnModelConfig};
use crate::decoding::alphabet::Alphabet;
use crate::error::OcrError;
use crate::pipeline::defaults::decoder_for_strategy;
use crate::pipeline::model_runtime::build_runtime_backend;
use crate::pipeline::runtime::{Recognizer, RecognizerParts};
use crate::pipeline::traits::{RuntimeBackend, SequenceDecoder};

pub struct RecognizerBuilder {
    config: CrnnConfig,
    runtime_backend: Option<Box<dyn RuntimeBackend>>,
    decoder: Option<Box<dyn SequenceDecoder>>,
    alphabet: Option<Alphabet>,
}

impl RecognizerBuilder {
    pub fn new(config: CrnnConfig) -> Self {
        Self {
            config,
            runtime_backend: None,
            decoder: None,
            alphabet: None,
        }
    }

    pub fn with_runtime_backend(mut self, runtime_backend: Box<dyn RuntimeBackend>) -> Self {
        self.runtime_backend = Some(runtime_backend);
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn SequenceDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Skips reading `lexicon_path`.
    pub fn with_alphabet(mut self, alphabet: Alphabet) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    pub fn build(self) -> Result<Recognizer, OcrError> {
        let mut model_cfg = CrnnModelConfig::load(Path::new(&self.config.config_path))?;
        if let Some((img_height, img_width)) = self.config.image_size {
            model_cfg.img_height = img_height;
            model_cfg.img_width = img_width;
            model_cfg.validate()?;
        }
        let max_label_len = self.config.max_label_len.unwrap_or(model_cfg.max_label_len);
        if self.config.batch_size == 0 {
            return Err(OcrError::invalid_input("batch_size must be >= 1"));
        }

        let alphabet = match self.alphabet {
            Some(alphabet) => alphabet,
            None if self.config.lexicon_path.is_empty() => {
                Alphabet::default_lexicon(model_cfg.blank_position)?
            }
            None => Alphabet::from_lexicon_file(
                Path::new(&self.config.lexicon_path),
                model_cfg.blank_position,
            )?,
        };
        let alphabet = Arc::new(alphabet);

        let decoder = self.decoder.unwrap_or_else(|| {
            decoder_for_strategy(self.config.decode, alphabet.clone(), Some(max_label_len))
        });

        let runtime_backend = if let Some(runtime_backend) = self.runtime_backend {
            runtime_backend
        } else {
            build_runtime_backend(&self.config, &model_cfg)?
        };

        tracing::info!(
            classes = alphabet.num_classes(),
            blank = alphabet.blank(),
            decoder = decoder.name(),
            device = %runtime_backend.device_label(),
            max_label_len,
            "recognizer ready"
        );

        Ok(Recognizer::from_parts(RecognizerParts {
            runtime_backend,
            decoder,
            alphabet,
            model_cfg,
            batch_size: self.config.batch_size,
            max_label_len,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::decoding::alphabet::BlankPosition;
    use crate::types::{ImageTensor, ProbabilityBatch, ProbabilityTensor};

    use super::*;

    struct MockBackend;

    impl RuntimeBackend for MockBackend {
        fn infer(&self, images: &[ImageTensor]) -> Result<ProbabilityBatch, OcrError> {
            // 37 classes: default lexicon plus a trailing blank; class 10 is 'a'.
            Ok(images
                .iter()
                .map(|_| ProbabilityTensor::one_hot(&[10, 10, 36, 11], 37).expect("in-range path"))
                .collect())
        }

        fn device_label(&self) -> String {
            "mock".to_string()
        }
    }

    fn blank_image() -> ImageTensor {
        ImageTensor {
            height: 32,
            width: 100,
            pixels: vec![0.0; 3200],
        }
    }

    #[test]
    fn build_with_defaults_and_mock_backend() {
        let recognizer = RecognizerBuilder::new(CrnnConfig::default())
            .with_runtime_backend(Box::new(MockBackend))
            .build()
            .expect("build should succeed");
        assert_eq!(recognizer.alphabet().num_classes(), 37);
        assert_eq!(recognizer.alphabet().blank_position(), BlankPosition::Last);
        assert_eq!(recognizer.decoder_name(), "beam");
        assert_eq!(recognizer.device_label(), "mock");
        let out = recognizer.predict_batch(&[blank_image()]).unwrap();
        assert_eq!(out[0].text, "ab");
    }

    #[test]
    fn build_reads_model_config_and_lexicon() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("config.json");
        let lexicon_path = dir.path().join("lexicon.txt");
        std::fs::write(
            &config_path,
            r#"{"img_height": 31, "max_label_len": 5, "blank_position": "first"}"#,
        )
        .expect("write config");
        std::fs::write(&lexicon_path, "x\ny\nzz\n\n").expect("write lexicon");

        let config = CrnnConfig {
            config_path: config_path.to_string_lossy().to_string(),
            lexicon_path: lexicon_path.to_string_lossy().to_string(),
            ..CrnnConfig::default()
        };
        let recognizer = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build()
            .expect("build should succeed");
        assert_eq!(recognizer.model_config().img_height, 31);
        assert_eq!(recognizer.max_label_len(), 5);
        assert_eq!(recognizer.alphabet().len(), 2);
        assert_eq!(recognizer.alphabet().blank(), 0);
    }

    #[test]
    fn configured_max_label_len_overrides_model_config() {
        let config = CrnnConfig {
            max_label_len: Some(21),
            ..CrnnConfig::default()
        };
        let recognizer = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build()
            .expect("build should succeed");
        assert_eq!(recognizer.max_label_len(), 21);
    }

    #[test]
    fn configured_image_size_overrides_model_config() {
        let config = CrnnConfig {
            image_size: Some((48, 160)),
            ..CrnnConfig::default()
        };
        let recognizer = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build()
            .expect("build should succeed");
        assert_eq!(recognizer.model_config().img_height, 48);
        assert_eq!(recognizer.model_config().expected_timesteps(), 40);

        let zero = CrnnConfig {
            image_size: Some((0, 160)),
            ..CrnnConfig::default()
        };
        let result = RecognizerBuilder::new(zero)
            .with_runtime_backend(Box::new(MockBackend))
            .build();
        assert!(matches!(result, Err(OcrError::InvalidInput { .. })));
    }

    #[test]
    fn injected_alphabet_and_decoder_are_used() {
        let alphabet = Alphabet::new(['q'], BlankPosition::First).expect("valid alphabet");
        let decoder = crate::pipeline::defaults::GreedyCtcDecoder::new(
            Arc::new(alphabet.clone()),
            None,
        );
        let recognizer = RecognizerBuilder::new(CrnnConfig::default())
            .with_runtime_backend(Box::new(MockBackend))
            .with_alphabet(alphabet)
            .with_decoder(Box::new(decoder))
            .build()
            .expect("build should succeed");
        assert_eq!(recognizer.alphabet().num_classes(), 2);
        assert_eq!(recognizer.decoder_name(), "greedy");
    }

    #[test]
    fn build_fails_on_missing_config_file() {
        let config = CrnnConfig {
            config_path: "/nonexistent/config.json".to_string(),
            ..CrnnConfig::default()
        };
        let result = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build();
        assert!(matches!(result, Err(OcrError::Io { .. })));
    }

    #[test]
    fn build_fails_on_missing_lexicon() {
        let config = CrnnConfig {
            lexicon_path: "/nonexistent/lexicon.txt".to_string(),
            ..CrnnConfig::default()
        };
        let result = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn build_rejects_zero_batch_size() {
        let config = CrnnConfig {
            batch_size: 0,
            ..CrnnConfig::default()
        };
        let result = RecognizerBuilder::new(config)
            .with_runtime_backend(Box::new(MockBackend))
            .build();
        assert!(matches!(result, Err(OcrError::InvalidInput { .. })));
    }
}
