//! facerec-vision — Reference recognition backend.
//!
//! SCRFD face detection and ArcFace embeddings run on ONNX Runtime (CPU).
//! Registered face samples live in SQLite. [`FaceAligner`],
//! [`GalleryRecognizer`] and [`SqlitePersonStore`] plug into the
//! `facerec-core` workflow.

pub mod aligner;
pub mod alignment;
pub mod detector;
pub mod embedder;
pub mod recognizer;
pub mod store;
pub mod types;

pub use aligner::FaceAligner;
pub use detector::FaceDetector;
pub use embedder::{FaceEmbedder, FaceEncoder};
pub use recognizer::GalleryRecognizer;
pub use store::{PersonSummary, SqlitePersonStore, StoredSample};
pub use types::{BoundingBox, CosineMatcher, Embedding, FaceModel, MatchResult, Matcher};

use image::{GrayImage, ImageReader};
use std::path::Path;
use thiserror::Error;

/// Failure inside one of the backend's workflow collaborators.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("detector: {0}")]
    Detector(#[from] detector::DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] embedder::EmbedderError),
    #[error("store: {0}")]
    Store(#[from] store::StoreError),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

/// Decode an image as grayscale, sniffing the format from its content so a
/// missing or misleading extension does not matter.
pub(crate) fn open_gray(path: &Path) -> Result<GrayImage, BackendError> {
    Ok(ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .to_luma8())
}
