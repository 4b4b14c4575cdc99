//! Model artifact and ONNX model loading

use crate::features::encoding::CategoryEncoding;
use crate::features::layout::{layout_hash, validate_feature_names, FEATURE_VERSION};
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Manifest file expected at the root of an artifact directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Describes a trained model and the inputs it was fit against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    /// Model generation identifier
    pub model_version: String,
    /// ONNX file, relative to the artifact directory
    pub model_file: String,
    /// Feature names in training column order
    pub feature_names: Vec<String>,
    /// Category encoding table, relative to the artifact directory
    pub encoding_file: String,
}

/// Everything the scorer needs from one model generation
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub manifest: ArtifactManifest,
    pub encoding: CategoryEncoding,
    pub model_path: PathBuf,
}

impl ModelArtifact {
    /// Load and validate an artifact directory.
    ///
    /// Fails if the manifest's feature order differs from the feature layout,
    /// if the encoding table cannot be read, or if the model file is missing.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let manifest: ArtifactManifest = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", manifest_path.display()))?;

        validate_feature_names(&manifest.feature_names).with_context(|| {
            format!(
                "Model {} was trained on a different feature order",
                manifest.model_version
            )
        })?;

        let encoding = CategoryEncoding::load(dir.join(&manifest.encoding_file))?;

        let model_path = dir.join(&manifest.model_file);
        if !model_path.exists() {
            anyhow::bail!("Model file not found: {}", model_path.display());
        }

        info!(
            model_version = %manifest.model_version,
            feature_version = FEATURE_VERSION,
            layout_hash = format!("{:08x}", layout_hash()),
            encoding_version = %encoding.version(),
            "Model artifact validated"
        );

        Ok(Self {
            manifest,
            encoding,
            model_path,
        })
    }
}

/// Loaded ONNX model with metadata
pub struct LoadedModel {
    /// Model name
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the model
    pub input_name: String,
    /// Output name for probabilities
    pub output_name: String,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX model from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<LoadedModel> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        // Prefer the probability output over the label output
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name: name.to_string(),
            session,
            input_name,
            output_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::layout::FEATURE_LAYOUT;

    fn write_artifact(dir: &Path, feature_names: Vec<String>, with_model: bool) {
        let manifest = ArtifactManifest {
            model_version: "test-1".to_string(),
            model_file: "fraud_model.onnx".to_string(),
            feature_names,
            encoding_file: "merchant_categories.json".to_string(),
        };
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        CategoryEncoding::fit(["Dining", "Travel"].iter().copied())
            .save(dir.join("merchant_categories.json"))
            .unwrap();
        if with_model {
            std::fs::write(dir.join("fraud_model.onnx"), b"onnx").unwrap();
        }
    }

    fn layout_names() -> Vec<String> {
        FEATURE_LAYOUT.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_artifact_loads() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), layout_names(), true);

        let artifact = ModelArtifact::load(dir.path()).unwrap();
        assert_eq!(artifact.manifest.model_version, "test-1");
        assert_eq!(artifact.encoding.code("Travel"), 1);
        assert!(artifact.model_path.ends_with("fraud_model.onnx"));
    }

    #[test]
    fn test_reordered_features_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut names = layout_names();
        names.swap(0, 1);
        write_artifact(dir.path(), names, true);

        let err = ModelArtifact::load(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("different feature order"));
    }

    #[test]
    fn test_missing_model_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(dir.path(), layout_names(), false);
        assert!(ModelArtifact::load(dir.path()).is_err());
    }

    #[test]
    fn test_missing_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelArtifact::load(dir.path()).is_err());
    }
}
