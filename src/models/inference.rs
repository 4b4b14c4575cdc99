//! Classifier boundary and the ONNX-backed implementation

use crate::features::FeatureVector;
use crate::models::loader::{LoadedModel, ModelArtifact, ModelLoader};
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Opaque fraud scorer.
///
/// Implementations must be deterministic for a fixed model and input, and
/// return the probability of the fraud class. Calls may block.
pub trait Classifier: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<f64>;

    /// Identifier of the loaded model generation
    fn model_version(&self) -> &str;
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    model: Mutex<LoadedModel>,
    model_version: String,
}

impl OnnxClassifier {
    /// Load the model referenced by a validated artifact
    pub fn from_artifact(artifact: &ModelArtifact, onnx_threads: usize) -> Result<Self> {
        let loader = ModelLoader::with_threads(onnx_threads)?;
        let model = loader.load_model(&artifact.model_path, &artifact.manifest.model_version)?;
        Ok(Self {
            model: Mutex::new(model),
            model_version: artifact.manifest.model_version.clone(),
        })
    }

    fn run_model(&self, model: &mut LoadedModel, features: &[f32]) -> Result<f64> {
        use ort::value::Tensor;

        // [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let outputs = model
            .session
            .run(ort::inputs![&model.input_name => input_tensor])?;

        self.extract_probability(&outputs, &model.output_name, &model.name)
    }

    /// Extract the fraud probability from tensor outputs (XGBoost, random
    /// forest exports) or seq(map) outputs (LightGBM, CatBoost exports).
    fn extract_probability(
        &self,
        outputs: &ort::session::SessionOutputs,
        output_name: &str,
        model_name: &str,
    ) -> Result<f64> {
        if let Some(output) = outputs.get(output_name) {
            if let Some(prob) = self.extract_from_value(&output, model_name) {
                return Ok(prob);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(prob) = self.extract_from_value(&output, model_name) {
                debug!(model = %model_name, output = %name, "Probability taken from fallback output");
                return Ok(prob);
            }
        }

        anyhow::bail!("model {model_name} produced no probability output")
    }

    fn extract_from_value(&self, output: &ort::value::DynValue, model_name: &str) -> Option<f64> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return fraud_prob_from_tensor(&dims, data);
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            match self.extract_from_sequence_map(output) {
                Ok(prob) => return Some(prob),
                Err(e) => warn!(model = %model_name, error = %e, "Unreadable seq(map) output"),
            }
        }
        None
    }

    fn extract_from_sequence_map(&self, output: &ort::value::DynValue) -> Result<f64> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
        let first = maps
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;
        let kv_pairs = first.try_extract_key_values::<i64, f32>()?;

        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 1) {
            return Ok(*prob as f64);
        }
        if let Some((_, prob)) = kv_pairs.iter().find(|(class_id, _)| *class_id == 0) {
            return Ok(1.0 - *prob as f64);
        }
        anyhow::bail!("No class probability found in map")
    }
}

impl Classifier for OnnxClassifier {
    fn score(&self, features: &FeatureVector) -> Result<f64> {
        let input = features.to_model_input();
        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let prob = self.run_model(&mut model, &input)?;
        debug!(model = %self.model_version, probability = prob, "Model inference complete");
        Ok(prob)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Pick the fraud-class probability out of a flat tensor.
///
/// `[batch, classes]` and `[classes]` shapes use class index 1; single-column
/// outputs are already the fraud probability.
fn fraud_prob_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => *classes,
        _ => return data.last().map(|&v| v as f64),
    };
    match classes {
        c if c >= 2 => data.get(1).map(|&v| v as f64),
        1 => data.first().map(|&v| v as f64),
        _ => None,
    }
}
