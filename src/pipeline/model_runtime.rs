#[cfg(feature = "onnx")]
use std::path::Path;

use crate::config::{CrnnConfig, CrnnModelConfig};
use crate::error::OcrError;
use crate::pipeline::traits::RuntimeBackend;
#[cfg(feature = "onnx")]
use crate::types::{ImageTensor, ProbabilityBatch, ProbabilityTensor};

pub(crate) fn build_runtime_backend(
    config: &CrnnConfig,
    model_cfg: &CrnnModelConfig,
) -> Result<Box<dyn RuntimeBackend>, OcrError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Box::new(OnnxRuntimeBackend::load(config, model_cfg)?))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = (config, model_cfg);
        Err(OcrError::runtime(
            "build runtime backend",
            "ONNX runtime support is disabled; enable the `onnx` cargo feature or inject a backend",
        ))
    }
}

#[cfg(feature = "onnx")]
struct OnnxRuntimeBackend {
    session: std::sync::Mutex<ort::session::Session>,
    device_label: String,
    img_height: usize,
    img_width: usize,
    channels_last: bool,
}

#[cfg(feature = "onnx")]
impl OnnxRuntimeBackend {
    fn load(config: &CrnnConfig, model_cfg: &CrnnModelConfig) -> Result<Self, OcrError> {
        let execution_providers = onnx_execution_providers(config.device.as_str())?;
        let session = ort::session::Session::builder()
            .map_err(|e| OcrError::runtime("onnx session builder", e))?
            .with_execution_providers(execution_providers)
            .map_err(|e| OcrError::runtime("onnx execution providers", e))?
            .commit_from_file(Path::new(&config.model_path))
            .map_err(|e| OcrError::runtime("onnx model load", e))?;

        tracing::info!(
            inputs = session.inputs().len(),
            outputs = session.outputs().len(),
            model_path = %config.model_path,
            device = %config.device,
            img_height = model_cfg.img_height,
            img_width = model_cfg.img_width,
            "CRNN ONNX runtime loaded"
        );

        let device_label = parse_onnx_device(config.device.as_str())?;
        Ok(Self {
            session: std::sync::Mutex::new(session),
            device_label: device_label.to_string(),
            img_height: model_cfg.img_height,
            img_width: model_cfg.img_width,
            channels_last: model_cfg.channels_last,
        })
    }

    fn pack_batch(&self, images: &[ImageTensor]) -> Result<Vec<f32>, OcrError> {
        let plane = self.img_height * self.img_width;
        let mut data = Vec::with_capacity(images.len() * plane);
        for (i, image) in images.iter().enumerate() {
            if image.height != self.img_height
                || image.width != self.img_width
                || image.pixels.len() != plane
            {
                return Err(OcrError::invalid_input(format!(
                    "image {i} is {}x{} ({} values), model expects {}x{}",
                    image.height,
                    image.width,
                    image.pixels.len(),
                    self.img_height,
                    self.img_width
                )));
            }
            data.extend_from_slice(&image.pixels);
        }
        Ok(data)
    }
}

#[cfg(feature = "onnx")]
impl RuntimeBackend for OnnxRuntimeBackend {
    fn infer(&self, images: &[ImageTensor]) -> Result<ProbabilityBatch, OcrError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.pack_batch(images)?;
        let shape = if self.channels_last {
            [images.len(), self.img_height, self.img_width, 1]
        } else {
            [images.len(), 1, self.img_height, self.img_width]
        };
        let input = ort::value::TensorRef::from_array_view((shape, data.as_slice()))
            .map_err(|e| OcrError::runtime("onnx input tensor", e))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| OcrError::runtime("onnx session lock", "session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| OcrError::runtime("onnx forward pass", e))?;
        if outputs.len() == 0 {
            return Err(OcrError::runtime(
                "onnx forward pass",
                "model produced no outputs",
            ));
        }
        let (shape, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OcrError::runtime("onnx extract probabilities", e))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        split_batch_output(&dims, values, images.len())
    }

    fn device_label(&self) -> String {
        self.device_label.clone()
    }
}

#[cfg(feature = "onnx")]
fn onnx_execution_providers(
    device: &str,
) -> Result<Vec<ort::ep::ExecutionProviderDispatch>, OcrError> {
    match parse_onnx_device(device)? {
        "cuda" => Ok(vec![
            ort::ep::CUDA::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
            ort::ep::CPU::default().build(),
        ]),
        _ => Ok(vec![ort::ep::CPU::default().build()]),
    }
}

#[cfg(feature = "onnx")]
fn parse_onnx_device(device: &str) -> Result<&'static str, OcrError> {
    if device.eq_ignore_ascii_case("cpu") {
        Ok("cpu")
    } else if device.eq_ignore_ascii_case("cuda") {
        Ok("cuda")
    } else {
        Err(OcrError::invalid_input(format!(
            "unsupported ONNX device '{device}', expected 'cpu' or 'cuda'"
        )))
    }
}

/// Splits a `[N, T, C]` output into one tensor per image.
#[cfg(feature = "onnx")]
fn split_batch_output(
    dims: &[i64],
    values: &[f32],
    batch_len: usize,
) -> Result<ProbabilityBatch, OcrError> {
    let [batch, timesteps, classes] = dims else {
        return Err(OcrError::invalid_input(format!(
            "unsupported ONNX output rank {}; expected [N, T, C]",
            dims.len()
        )));
    };
    let batch = non_negative_dim(*batch, "batch")?;
    let timesteps = non_negative_dim(*timesteps, "time")?;
    let classes = positive_dim(*classes, "class")?;
    if batch != batch_len {
        return Err(OcrError::invalid_input(format!(
            "ONNX output batch is {batch}, input batch was {batch_len}"
        )));
    }
    let expected_len = batch
        .checked_mul(timesteps)
        .and_then(|n| n.checked_mul(classes))
        .ok_or_else(|| OcrError::invalid_input("ONNX output shape is too large"))?;
    if expected_len != values.len() {
        return Err(OcrError::invalid_input(format!(
            "ONNX output shape/data mismatch: shape implies {expected_len} values, got {}",
            values.len()
        )));
    }

    let per_image = timesteps * classes;
    Ok((0..batch)
        .map(|b| {
            let image = &values[b * per_image..(b + 1) * per_image];
            ProbabilityTensor::new(image.chunks(classes).map(<[f32]>::to_vec).collect())
        })
        .collect())
}

#[cfg(feature = "onnx")]
fn non_negative_dim(value: i64, name: &'static str) -> Result<usize, OcrError> {
    if value < 0 {
        return Err(OcrError::invalid_input(format!(
            "ONNX output {name} dimension must be >= 0, got {value}"
        )));
    }
    Ok(value as usize)
}

#[cfg(feature = "onnx")]
fn positive_dim(value: i64, name: &'static str) -> Result<usize, OcrError> {
    if value <= 0 {
        return Err(OcrError::invalid_input(format!(
            "ONNX output {name} dimension must be > 0, got {value}"
        )));
    }
    Ok(value as usize)
}

#[cfg(all(test, not(feature = "onnx")))]
mod tests {
    use super::*;

    #[test]
    fn backend_requires_onnx_feature() {
        let result = build_runtime_backend(&CrnnConfig::default(), &CrnnModelConfig::default());
        let err = result.err().expect("no backend without the onnx feature");
        assert!(err.to_string().contains("onnx"));
    }
}
