//! Collaborator interfaces the workflow is built against.
//!
//! All calls are synchronous and may block for the duration of a model
//! inference or database write.

use crate::types::AlignedFace;
use std::path::Path;

/// Error type returned by collaborator implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Detects a face in an image and writes a canonical crop of it.
pub trait Aligner: Send + Sync {
    /// Returns `None` when the image contains no detectable face.
    fn align(&self, image: &Path) -> Result<Option<AlignedFace>, BoxError>;
}

/// Maps a face crop to a known identity.
pub trait Recognizer: Send + Sync {
    /// Returns the matched person's name, or an empty string when the face
    /// is unknown.
    fn recognize(&self, face: &AlignedFace) -> Result<String, BoxError>;

    /// Bring the recognizer up to date with the person store (reload or
    /// retrain). Called after every successful registration.
    fn check(&self) -> Result<(), BoxError>;
}

/// Registry of known people keyed by face samples.
pub trait PersonStore: Send + Sync {
    fn add_person(&self, face: &AlignedFace, name: &str) -> Result<(), BoxError>;
}
