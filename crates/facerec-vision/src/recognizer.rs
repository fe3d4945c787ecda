//! Gallery-based recognizer: embeds registered samples and matches probes
//! against them by cosine similarity.

use crate::embedder::FaceEncoder;
use crate::store::SqlitePersonStore;
use crate::types::{CosineMatcher, FaceModel, Matcher};
use crate::BackendError;
use facerec_core::{AlignedFace, BoxError, Recognizer};
use std::sync::{Arc, Mutex, RwLock};

/// Default cosine similarity threshold for a positive match.
pub const DEFAULT_THRESHOLD: f32 = 0.40;

/// [`Recognizer`] over the samples of a [`SqlitePersonStore`].
///
/// The gallery is empty until [`reload`](Self::reload) (or `check()`) runs.
pub struct GalleryRecognizer<E> {
    encoder: Mutex<E>,
    store: Arc<SqlitePersonStore>,
    gallery: RwLock<Vec<FaceModel>>,
    threshold: f32,
}

impl<E: FaceEncoder> GalleryRecognizer<E> {
    pub fn new(encoder: E, store: Arc<SqlitePersonStore>, threshold: f32) -> Self {
        Self {
            encoder: Mutex::new(encoder),
            store,
            gallery: RwLock::new(Vec::new()),
            threshold,
        }
    }

    pub fn gallery_len(&self) -> usize {
        self.gallery.read().map(|g| g.len()).unwrap_or(0)
    }

    /// Encode samples that have no embedding (or one from another model
    /// version), persist those embeddings and swap in the rebuilt gallery.
    ///
    /// Samples whose crop can no longer be read are skipped with a warning.
    pub fn reload(&self) -> Result<usize, BackendError> {
        let samples = self.store.samples()?;
        let mut encoder = self
            .encoder
            .lock()
            .map_err(|_| BackendError::Poisoned("encoder"))?;

        let mut gallery = Vec::with_capacity(samples.len());
        let mut encoded = 0usize;
        for sample in samples {
            let current = sample
                .embedding
                .filter(|e| e.model_version.as_deref() == Some(encoder.model_version()));

            let embedding = match current {
                Some(embedding) => embedding,
                None => {
                    let crop = match crate::open_gray(&sample.face_path) {
                        Ok(crop) => crop,
                        Err(e) => {
                            tracing::warn!(
                                id = %sample.id,
                                path = %sample.face_path.display(),
                                error = %e,
                                "skipping unreadable face sample"
                            );
                            continue;
                        }
                    };
                    let embedding = encoder.encode(&crop)?;
                    self.store.set_embedding(&sample.id, &embedding)?;
                    encoded += 1;
                    embedding
                }
            };

            gallery.push(FaceModel {
                id: sample.id,
                name: sample.name,
                embedding,
            });
        }
        drop(encoder);

        let size = gallery.len();
        *self
            .gallery
            .write()
            .map_err(|_| BackendError::Poisoned("gallery"))? = gallery;

        tracing::info!(size, encoded, "gallery reloaded");
        Ok(size)
    }

    /// Name of the best gallery match at or above the threshold, or an empty
    /// string.
    pub fn identify(&self, face: &AlignedFace) -> Result<String, BackendError> {
        let crop = crate::open_gray(face.path())?;
        let probe = self
            .encoder
            .lock()
            .map_err(|_| BackendError::Poisoned("encoder"))?
            .encode(&crop)?;

        let gallery = self
            .gallery
            .read()
            .map_err(|_| BackendError::Poisoned("gallery"))?;
        let result = CosineMatcher.compare(&probe, &gallery, self.threshold);

        tracing::debug!(
            matched = result.matched,
            similarity = result.similarity,
            gallery = gallery.len(),
            "probe compared"
        );
        Ok(result.name.unwrap_or_default())
    }
}

impl<E: FaceEncoder> Recognizer for GalleryRecognizer<E> {
    fn recognize(&self, face: &AlignedFace) -> Result<String, BoxError> {
        Ok(self.identify(face)?)
    }

    fn check(&self) -> Result<(), BoxError> {
        self.reload()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::EmbedderError;
    use crate::types::Embedding;
    use image::{GrayImage, Luma};
    use std::path::{Path, PathBuf};

    /// Encodes a crop as the one-hot vector of its first pixel's value band.
    struct BandEncoder {
        version: &'static str,
        calls: Arc<Mutex<usize>>,
    }

    impl FaceEncoder for BandEncoder {
        fn encode(&mut self, crop: &GrayImage) -> Result<Embedding, EmbedderError> {
            *self.calls.lock().unwrap() += 1;
            let band = (crop.get_pixel(0, 0).0[0] / 64) as usize;
            let mut values = vec![0.0; 4];
            values[band] = 1.0;
            Ok(Embedding { values, model_version: Some(self.version.to_string()) })
        }

        fn model_version(&self) -> &str {
            self.version
        }
    }

    fn write_crop(dir: &Path, name: &str, value: u8) -> PathBuf {
        let path = dir.join(name);
        GrayImage::from_pixel(112, 112, Luma([value])).save(&path).unwrap();
        path
    }

    fn setup(dir: &Path, version: &'static str) -> (Arc<SqlitePersonStore>, GalleryRecognizer<BandEncoder>, Arc<Mutex<usize>>) {
        let store = Arc::new(
            SqlitePersonStore::open(&dir.join("people.db"), &dir.join("faces")).unwrap(),
        );
        let calls = Arc::new(Mutex::new(0));
        let encoder = BandEncoder { version, calls: calls.clone() };
        let recognizer = GalleryRecognizer::new(encoder, store.clone(), DEFAULT_THRESHOLD);
        (store, recognizer, calls)
    }

    #[test]
    fn test_empty_gallery_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let (_store, recognizer, _) = setup(dir.path(), "v1");
        recognizer.check().unwrap();
        let probe = AlignedFace::new(write_crop(dir.path(), "probe.png", 10));
        assert_eq!(recognizer.recognize(&probe).unwrap(), "");
    }

    #[test]
    fn test_check_encodes_new_samples_and_matches() {
        let dir = tempfile::tempdir().unwrap();
        let (store, recognizer, _) = setup(dir.path(), "v1");
        store.add_sample(&write_crop(dir.path(), "a.png", 10), "Alice").unwrap();
        store.add_sample(&write_crop(dir.path(), "b.png", 200), "Bob").unwrap();

        recognizer.check().unwrap();
        assert_eq!(recognizer.gallery_len(), 2);
        assert!(store.samples().unwrap().iter().all(|s| s.embedding.is_some()));

        let probe = AlignedFace::new(write_crop(dir.path(), "probe.png", 220));
        assert_eq!(recognizer.recognize(&probe).unwrap(), "Bob");

        let stranger = AlignedFace::new(write_crop(dir.path(), "stranger.png", 100));
        assert_eq!(recognizer.recognize(&stranger).unwrap(), "");
    }

    #[test]
    fn test_stored_embeddings_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let (store, recognizer, calls) = setup(dir.path(), "v1");
        store.add_sample(&write_crop(dir.path(), "a.png", 10), "Alice").unwrap();

        recognizer.reload().unwrap();
        recognizer.reload().unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_model_version_change_reencodes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (store, recognizer, _) = setup(dir.path(), "v1");
            store.add_sample(&write_crop(dir.path(), "a.png", 10), "Alice").unwrap();
            recognizer.reload().unwrap();
        }

        let (store, recognizer, calls) = setup(dir.path(), "v2");
        recognizer.reload().unwrap();
        assert_eq!(*calls.lock().unwrap(), 1);
        let stored = store.samples().unwrap();
        assert_eq!(
            stored[0].embedding.as_ref().and_then(|e| e.model_version.as_deref()),
            Some("v2")
        );
    }

    #[test]
    fn test_unreadable_sample_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (store, recognizer, _) = setup(dir.path(), "v1");
        store.add_sample(&write_crop(dir.path(), "a.png", 10), "Alice").unwrap();
        store.add_sample(&write_crop(dir.path(), "b.png", 200), "Bob").unwrap();
        std::fs::remove_file(&store.samples().unwrap()[0].face_path).unwrap();

        assert_eq!(recognizer.reload().unwrap(), 1);
    }

    #[test]
    fn test_probe_without_extension_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let (store, recognizer, _) = setup(dir.path(), "v1");
        store.add_sample(&write_crop(dir.path(), "a.png", 10), "Alice").unwrap();
        recognizer.check().unwrap();

        let bare = dir.path().join("probe");
        std::fs::rename(write_crop(dir.path(), "probe.png", 20), &bare).unwrap();
        assert_eq!(recognizer.recognize(&AlignedFace::new(bare)).unwrap(), "Alice");
    }
}
