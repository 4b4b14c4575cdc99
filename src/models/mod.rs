//! Model artifact loading and classifier inference

pub mod inference;
pub mod loader;

pub use inference::{Classifier, OnnxClassifier};
pub use loader::{ArtifactManifest, ModelArtifact, ModelLoader};
