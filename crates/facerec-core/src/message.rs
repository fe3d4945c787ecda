//! User-facing texts for flash messages and the polled realtime result.

use crate::types::{RealtimeOutcome, RecognitionResult, RegistrationOutcome};

pub const NO_FACE: &str = "This picture can not find faces, Please change another picture";
pub const UNRECOGNIZED: &str = "Can not recognize the picture, Please change another picture";
pub const LOAD_FAILED: &str = "load image file failed";
pub const REGISTER_SUCCESS: &str = "Register new person success";
pub const REGISTER_FAILED: &str = "Register new person failed, please retry";

// Form validation
pub const INVALID_IMAGE_TYPE: &str = "Images only! (png, jpg, jpeg)";
pub const MISSING_FILE: &str = "No file selected";
pub const NAME_REQUIRED: &str = "Name is required";

/// Flash text for the upload page.
pub fn upload_message(result: &RecognitionResult) -> String {
    match result {
        RecognitionResult::NoFaceFound => NO_FACE.to_string(),
        RecognitionResult::Unrecognized => UNRECOGNIZED.to_string(),
        RecognitionResult::Identified(name) => format!("The person is {name}"),
    }
}

/// Text stored in the session for `/_show` polling.
pub fn realtime_message(outcome: &RealtimeOutcome) -> String {
    match outcome {
        RealtimeOutcome::LoadFailed => LOAD_FAILED.to_string(),
        RealtimeOutcome::Completed(RecognitionResult::Identified(name)) => {
            format!("Person name {name}")
        }
        RealtimeOutcome::Completed(other) => upload_message(other),
    }
}

pub fn registration_message(outcome: RegistrationOutcome) -> &'static str {
    match outcome {
        RegistrationOutcome::Registered => REGISTER_SUCCESS,
        RegistrationOutcome::Rejected(_) => REGISTER_FAILED,
    }
}
