use crate::alignment;
use crate::detector::FaceDetector;
use crate::types::BoundingBox;
use crate::BackendError;
use facerec_core::{AlignedFace, Aligner, BoxError};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// [`Aligner`] backed by the SCRFD detector.
///
/// Writes the aligned crop of `<dir>/<stem>.<ext>` to
/// `<output_dir>/<stem>_face.png`.
pub struct FaceAligner {
    detector: Mutex<FaceDetector>,
    output_dir: PathBuf,
}

impl FaceAligner {
    pub fn new(detector: FaceDetector, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            detector: Mutex::new(detector),
            output_dir: output_dir.into(),
        }
    }

    fn try_align(&self, image_path: &Path) -> Result<Option<AlignedFace>, BackendError> {
        let image = crate::open_gray(image_path)?;

        let faces = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| BackendError::Poisoned("detector"))?;
            detector.detect(&image)?
        };

        let Some((face, landmarks)) = select_face(&faces) else {
            tracing::info!(image = %image_path.display(), detected = faces.len(), "no alignable face");
            return Ok(None);
        };

        let crop = alignment::align_face(&image, landmarks);
        std::fs::create_dir_all(&self.output_dir)?;
        let out = self.output_dir.join(crop_file_name(image_path));
        crop.save(&out)?;

        tracing::debug!(
            image = %image_path.display(),
            crop = %out.display(),
            confidence = face.confidence,
            "face aligned"
        );
        Ok(Some(AlignedFace::new(out)))
    }
}

impl Aligner for FaceAligner {
    fn align(&self, image: &Path) -> Result<Option<AlignedFace>, BoxError> {
        Ok(self.try_align(image)?)
    }
}

/// Most confident detection that carries landmarks. Detections arrive
/// sorted by confidence.
fn select_face(faces: &[BoundingBox]) -> Option<(&BoundingBox, &[(f32, f32); 5])> {
    faces
        .iter()
        .find_map(|face| face.landmarks.as_ref().map(|lm| (face, lm)))
}

fn crop_file_name(image_path: &Path) -> String {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    format!("{stem}_face.png")
}
