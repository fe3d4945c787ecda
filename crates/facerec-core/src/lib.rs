//! facerec-core — Recognition workflow shared by the upload, realtime and
//! registration entry points.
//!
//! The workflow owns no models. Face alignment, recognition and the person
//! database are injected through the [`Aligner`], [`Recognizer`] and
//! [`PersonStore`] traits.

pub mod backend;
pub mod message;
pub mod session;
pub mod types;
pub mod workflow;

pub use backend::{Aligner, BoxError, PersonStore, Recognizer};
pub use session::SessionState;
pub use types::{
    AlignedFace, ImagePurpose, PendingCapture, RealtimeOutcome, RecognitionResult,
    RegistrationOutcome, RejectReason, UploadedImage,
};
pub use workflow::{RecognitionWorkflow, WorkflowError};
