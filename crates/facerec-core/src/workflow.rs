//! The recognition workflow: received image → alignment → recognition →
//! user-visible outcome.

use crate::backend::{Aligner, BoxError, PersonStore, Recognizer};
use crate::message;
use crate::session::SessionState;
use crate::types::{
    AlignedFace, ImagePurpose, PendingCapture, RealtimeOutcome, RecognitionResult,
    RegistrationOutcome, RejectReason, UploadedImage,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Failures the workflow cannot turn into a user-facing outcome.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("failed to write received image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("alignment failed: {0}")]
    Align(#[source] BoxError),
    #[error("recognition failed: {0}")]
    Recognize(#[source] BoxError),
    #[error("person store failed: {0}")]
    Store(#[source] BoxError),
}

/// Orchestrates the upload, realtime and registration entry points over
/// injected collaborators.
pub struct RecognitionWorkflow {
    upload_dir: PathBuf,
    aligner: Arc<dyn Aligner>,
    recognizer: Arc<dyn Recognizer>,
    store: Arc<dyn PersonStore>,
}

impl RecognitionWorkflow {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        aligner: Arc<dyn Aligner>,
        recognizer: Arc<dyn Recognizer>,
        store: Arc<dyn PersonStore>,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            aligner,
            recognizer,
            store,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Classify an image submitted through the upload form.
    pub fn process_upload(&self, image: &UploadedImage) -> Result<RecognitionResult, WorkflowError> {
        let path = self.save(ImagePurpose::Upload, image)?;
        let result = self.classify(&path)?;
        tracing::info!(file = %path.display(), ?result, "upload: classified");
        Ok(result)
    }

    /// Classify a webcam frame and record the outcome text in the session
    /// for the polling endpoint.
    pub fn process_realtime_capture(
        &self,
        session: &mut SessionState,
        image: Option<&UploadedImage>,
    ) -> Result<RealtimeOutcome, WorkflowError> {
        let outcome = match image {
            Some(image) if !image.is_empty() => {
                let path = self.save(ImagePurpose::Realtime, image)?;
                RealtimeOutcome::Completed(self.classify(&path)?)
            }
            _ => {
                tracing::warn!("realtime: request carried no image");
                RealtimeOutcome::LoadFailed
            }
        };

        session.result = Some(message::realtime_message(&outcome));
        tracing::debug!(?outcome, "realtime: result stored in session");
        Ok(outcome)
    }

    /// Align a registration capture and hold it in the session until a name
    /// is submitted. Never touches the person store.
    pub fn begin_registration_capture<'s>(
        &self,
        session: &'s mut SessionState,
        image: &UploadedImage,
    ) -> Result<&'s PendingCapture, WorkflowError> {
        let path = self.save(ImagePurpose::Register, image)?;
        let pending = match self.align(&path)? {
            Some(face) => PendingCapture::Face(face),
            None => PendingCapture::NoFace,
        };
        tracing::info!(face = pending.face().is_some(), "register: capture received");
        Ok(session.pending.insert(pending))
    }

    /// Bind `name` to the session's pending capture.
    ///
    /// A submit consumes the pending capture whether or not it succeeds, so
    /// the next registration needs a fresh capture. A blank name leaves the
    /// pending capture in place.
    pub fn complete_registration(
        &self,
        session: &mut SessionState,
        name: &str,
    ) -> Result<RegistrationOutcome, WorkflowError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(RegistrationOutcome::Rejected(RejectReason::BlankName));
        }

        let face = match session.pending.take() {
            None => {
                tracing::info!(name, "register: rejected, no pending capture");
                return Ok(RegistrationOutcome::Rejected(RejectReason::NoPendingCapture));
            }
            Some(PendingCapture::NoFace) => {
                tracing::info!(name, "register: rejected, pending capture has no face");
                return Ok(RegistrationOutcome::Rejected(RejectReason::FacelessCapture));
            }
            Some(PendingCapture::Face(face)) => face,
        };

        self.store
            .add_person(&face, name)
            .map_err(WorkflowError::Store)?;
        self.recognizer.check().map_err(WorkflowError::Recognize)?;

        tracing::info!(name, face = %face.path().display(), "register: person added");
        Ok(RegistrationOutcome::Registered)
    }

    fn save(&self, purpose: ImagePurpose, image: &UploadedImage) -> Result<PathBuf, WorkflowError> {
        let path = self.upload_dir.join(purpose.file_name(image));
        std::fs::create_dir_all(&self.upload_dir)
            .and_then(|_| std::fs::write(&path, &image.bytes))
            .map_err(|source| WorkflowError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(?purpose, file = %path.display(), bytes = image.bytes.len(), "image saved");
        Ok(path)
    }

    fn align(&self, path: &Path) -> Result<Option<AlignedFace>, WorkflowError> {
        self.aligner.align(path).map_err(WorkflowError::Align)
    }

    /// No face short-circuits before the recognizer; an empty label is
    /// "unrecognized", never an error.
    fn classify(&self, path: &Path) -> Result<RecognitionResult, WorkflowError> {
        let Some(face) = self.align(path)? else {
            return Ok(RecognitionResult::NoFaceFound);
        };

        let label = self
            .recognizer
            .recognize(&face)
            .map_err(WorkflowError::Recognize)?;

        if label.is_empty() {
            Ok(RecognitionResult::Unrecognized)
        } else {
            Ok(RecognitionResult::Identified(label))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeAligner {
        face: Option<PathBuf>,
        calls: AtomicUsize,
        images: Mutex<Vec<PathBuf>>,
    }

    impl Aligner for FakeAligner {
        fn align(&self, image: &Path) -> Result<Option<AlignedFace>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.images.lock().unwrap().push(image.to_path_buf());
            Ok(self.face.clone().map(AlignedFace::new))
        }
    }

    struct FakeRecognizer {
        label: String,
        recognize_calls: AtomicUsize,
        check_calls: AtomicUsize,
    }

    impl Recognizer for FakeRecognizer {
        fn recognize(&self, _face: &AlignedFace) -> Result<String, BoxError> {
            self.recognize_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label.clone())
        }

        fn check(&self) -> Result<(), BoxError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        added: Mutex<Vec<(PathBuf, String)>>,
    }

    impl PersonStore for FakeStore {
        fn add_person(&self, face: &AlignedFace, name: &str) -> Result<(), BoxError> {
            self.added
                .lock()
                .unwrap()
                .push((face.path().to_path_buf(), name.to_string()));
            Ok(())
        }
    }

    struct FailingStore;

    impl PersonStore for FailingStore {
        fn add_person(&self, _face: &AlignedFace, _name: &str) -> Result<(), BoxError> {
            Err("disk full".into())
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        aligner: Arc<FakeAligner>,
        recognizer: Arc<FakeRecognizer>,
        store: Arc<FakeStore>,
        workflow: RecognitionWorkflow,
    }

    fn harness(face: Option<&str>, label: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let aligner = Arc::new(FakeAligner {
            face: face.map(PathBuf::from),
            calls: AtomicUsize::new(0),
            images: Mutex::new(Vec::new()),
        });
        let recognizer = Arc::new(FakeRecognizer {
            label: label.to_string(),
            recognize_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(FakeStore::default());
        let workflow = RecognitionWorkflow::new(
            dir.path().join("uploads"),
            aligner.clone(),
            recognizer.clone(),
            store.clone(),
        );
        Harness {
            dir,
            aligner,
            recognizer,
            store,
            workflow,
        }
    }

    fn image(name: &str) -> UploadedImage {
        UploadedImage::new(name, vec![0xff, 0xd8, 0xff])
    }

    #[test]
    fn test_upload_without_face_skips_recognizer() {
        let h = harness(None, "Alice");
        let result = h.workflow.process_upload(&image("a.jpg")).unwrap();
        assert_eq!(result, RecognitionResult::NoFaceFound);
        assert_eq!(h.recognizer.recognize_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_upload_empty_label_is_unrecognized() {
        let h = harness(Some("/tmp/face.png"), "");
        let result = h.workflow.process_upload(&image("a.jpg")).unwrap();
        assert_eq!(result, RecognitionResult::Unrecognized);
    }

    #[test]
    fn test_upload_identifies_person() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        let result = h.workflow.process_upload(&image("a.jpg")).unwrap();
        assert_eq!(result, RecognitionResult::Identified("Alice".into()));
        assert_eq!(message::upload_message(&result), "The person is Alice");
    }

    #[test]
    fn test_upload_writes_sanitized_filename() {
        let h = harness(None, "");
        h.workflow.process_upload(&image("../evil name.jpg")).unwrap();
        let written = h.dir.path().join("uploads").join("upload_evil_name.jpg");
        assert_eq!(std::fs::read(written).unwrap(), vec![0xff, 0xd8, 0xff]);
    }

    #[test]
    fn test_upload_non_ascii_name_keeps_extension() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        let result = h.workflow.process_upload(&image("人脸.jpg")).unwrap();
        assert_eq!(result, RecognitionResult::Identified("Alice".into()));

        let written = h.dir.path().join("uploads").join("upload.jpg");
        assert_eq!(std::fs::read(&written).unwrap(), vec![0xff, 0xd8, 0xff]);
        assert_eq!(*h.aligner.images.lock().unwrap(), vec![written]);
    }

    #[test]
    fn test_upload_named_like_capture_leaves_capture_alone() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        let capture = UploadedImage::new("webcam.jpg", vec![1, 2, 3]);
        h.workflow
            .begin_registration_capture(&mut session, &capture)
            .unwrap();

        h.workflow.process_upload(&image("register.jpg")).unwrap();

        let uploads = h.dir.path().join("uploads");
        assert_eq!(std::fs::read(uploads.join("register.jpg")).unwrap(), vec![1, 2, 3]);
        let images = h.aligner.images.lock().unwrap();
        assert_eq!(images[0], uploads.join("register.jpg"));
        assert_eq!(images[1], uploads.join("upload_register.jpg"));
    }

    #[test]
    fn test_upload_does_not_touch_session_or_store() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        h.workflow.process_upload(&image("a.jpg")).unwrap();
        assert!(h.store.added.lock().unwrap().is_empty());
        assert_eq!(h.recognizer.check_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_realtime_without_file_sets_load_failed() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        let mut session = SessionState::new();
        let outcome = h.workflow.process_realtime_capture(&mut session, None).unwrap();
        assert_eq!(outcome, RealtimeOutcome::LoadFailed);
        assert_eq!(session.result.as_deref(), Some("load image file failed"));
        assert_eq!(h.aligner.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_realtime_empty_file_sets_load_failed() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        let mut session = SessionState::new();
        let empty = UploadedImage::new("webcam.jpg", Vec::new());
        let outcome = h
            .workflow
            .process_realtime_capture(&mut session, Some(&empty))
            .unwrap();
        assert_eq!(outcome, RealtimeOutcome::LoadFailed);
    }

    #[test]
    fn test_realtime_no_face_skips_recognizer() {
        let h = harness(None, "Alice");
        let mut session = SessionState::new();
        let outcome = h
            .workflow
            .process_realtime_capture(&mut session, Some(&image("webcam.jpg")))
            .unwrap();
        assert_eq!(outcome, RealtimeOutcome::Completed(RecognitionResult::NoFaceFound));
        assert_eq!(session.result.as_deref(), Some(message::NO_FACE));
        assert_eq!(h.recognizer.recognize_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_realtime_identified_stores_result() {
        let h = harness(Some("/tmp/face.png"), "Alice");
        let mut session = SessionState::new();
        h.workflow
            .process_realtime_capture(&mut session, Some(&image("webcam.jpg")))
            .unwrap();
        assert_eq!(session.result.as_deref(), Some("Person name Alice"));
        assert!(h.dir.path().join("uploads/realtime.jpg").exists());
    }

    #[test]
    fn test_capture_does_not_touch_store() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        let pending = h
            .workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        assert_eq!(pending, &PendingCapture::Face(AlignedFace::new("/tmp/face.png")));
        assert!(h.store.added.lock().unwrap().is_empty());
        assert_eq!(h.recognizer.recognize_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_faceless_capture_is_held_as_no_face() {
        let h = harness(None, "");
        let mut session = SessionState::new();
        h.workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        assert_eq!(session.pending, Some(PendingCapture::NoFace));
    }

    #[test]
    fn test_complete_without_capture_is_rejected() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        let outcome = h.workflow.complete_registration(&mut session, "Alice").unwrap();
        assert_eq!(
            outcome,
            RegistrationOutcome::Rejected(RejectReason::NoPendingCapture)
        );
        assert!(h.store.added.lock().unwrap().is_empty());
        assert_eq!(h.recognizer.check_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_complete_after_faceless_capture_is_rejected() {
        let h = harness(None, "");
        let mut session = SessionState::new();
        h.workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        let outcome = h.workflow.complete_registration(&mut session, "Alice").unwrap();
        assert_eq!(
            outcome,
            RegistrationOutcome::Rejected(RejectReason::FacelessCapture)
        );
        assert!(h.store.added.lock().unwrap().is_empty());
    }

    #[test]
    fn test_complete_registers_once_and_rechecks() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        h.workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        let outcome = h.workflow.complete_registration(&mut session, " Alice ").unwrap();

        assert_eq!(outcome, RegistrationOutcome::Registered);
        let added = h.store.added.lock().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0], (PathBuf::from("/tmp/face.png"), "Alice".to_string()));
        assert_eq!(h.recognizer.check_calls.load(Ordering::SeqCst), 1);
        assert!(session.pending.is_none());
    }

    #[test]
    fn test_second_submit_needs_new_capture() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        h.workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        h.workflow.complete_registration(&mut session, "Alice").unwrap();
        let again = h.workflow.complete_registration(&mut session, "Alice").unwrap();
        assert_eq!(again, RegistrationOutcome::Rejected(RejectReason::NoPendingCapture));
        assert_eq!(h.store.added.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_name_keeps_pending_capture() {
        let h = harness(Some("/tmp/face.png"), "");
        let mut session = SessionState::new();
        h.workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        let outcome = h.workflow.complete_registration(&mut session, "   ").unwrap();
        assert_eq!(outcome, RegistrationOutcome::Rejected(RejectReason::BlankName));
        assert!(session.pending.is_some());
    }

    #[test]
    fn test_new_capture_overwrites_pending() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(FakeRecognizer {
            label: String::new(),
            recognize_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
        });
        let store = Arc::new(FakeStore::default());
        let mut session = SessionState::new();

        let with_face = RecognitionWorkflow::new(
            dir.path(),
            Arc::new(FakeAligner { face: Some("/tmp/face.png".into()), calls: AtomicUsize::new(0), images: Mutex::new(Vec::new()) }),
            recognizer.clone(),
            store.clone(),
        );
        with_face
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();

        let without_face = RecognitionWorkflow::new(
            dir.path(),
            Arc::new(FakeAligner { face: None, calls: AtomicUsize::new(0), images: Mutex::new(Vec::new()) }),
            recognizer,
            store,
        );
        without_face
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();

        assert_eq!(session.pending, Some(PendingCapture::NoFace));
    }

    #[test]
    fn test_store_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let recognizer = Arc::new(FakeRecognizer {
            label: String::new(),
            recognize_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
        });
        let workflow = RecognitionWorkflow::new(
            dir.path(),
            Arc::new(FakeAligner { face: Some("/tmp/face.png".into()), calls: AtomicUsize::new(0), images: Mutex::new(Vec::new()) }),
            recognizer.clone(),
            Arc::new(FailingStore),
        );
        let mut session = SessionState::new();
        workflow
            .begin_registration_capture(&mut session, &image("webcam.jpg"))
            .unwrap();
        let err = workflow.complete_registration(&mut session, "Alice").unwrap_err();
        assert!(matches!(err, WorkflowError::Store(_)));
        assert_eq!(recognizer.check_calls.load(Ordering::SeqCst), 0);
    }
}
