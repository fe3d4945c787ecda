use std::path::{Path, PathBuf};

/// File extensions accepted by the upload form.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Stored uploads are named `upload_<name>` or `upload.<ext>`, which can
/// never collide with the fixed capture names.
const UPLOAD_PREFIX: &str = "upload";

/// An image received in a request: raw bytes plus the client-side filename.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// True when the request carried a file field with no content.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercased extension of the client filename, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Whether the filename carries one of [`ALLOWED_EXTENSIONS`].
    pub fn has_allowed_extension(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
    }
}

/// Reduce a client filename to a safe, flat ASCII name.
///
/// Path separators become word breaks, whitespace runs collapse to `_`,
/// anything outside `[A-Za-z0-9._-]` is dropped and leading/trailing dots
/// and underscores are stripped. `../../etc/passwd` becomes `etc_passwd`.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Which entry point received an image. Each purpose writes to its own
/// location in the upload directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePurpose {
    Upload,
    Realtime,
    Register,
}

impl ImagePurpose {
    /// File name the received image is stored under.
    ///
    /// Realtime and registration captures use constant names, so two sessions
    /// capturing at once write the same file.
    pub fn file_name(self, image: &UploadedImage) -> String {
        match self {
            ImagePurpose::Upload => {
                let name = secure_filename(&image.filename);
                let sanitized = Path::new(&name);
                let intact = sanitized.file_stem().is_some_and(|s| !s.is_empty())
                    && sanitized.extension().is_some();
                if intact {
                    format!("{UPLOAD_PREFIX}_{name}")
                } else {
                    // stem or extension lost to sanitizing
                    let ext = image
                        .extension()
                        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
                        .unwrap_or_else(|| "jpg".to_string());
                    format!("{UPLOAD_PREFIX}.{ext}")
                }
            }
            ImagePurpose::Realtime => "realtime.jpg".to_string(),
            ImagePurpose::Register => "register.jpg".to_string(),
        }
    }
}

/// A canonical face crop produced by an [`Aligner`](crate::Aligner).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedFace {
    path: PathBuf,
}

impl AlignedFace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of aligning and classifying one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    /// The aligner found no face.
    NoFaceFound,
    /// A face was found but the recognizer returned no label.
    Unrecognized,
    /// The recognizer matched the face to this person.
    Identified(String),
}

impl RecognitionResult {
    pub fn name(&self) -> Option<&str> {
        match self {
            RecognitionResult::Identified(name) => Some(name),
            _ => None,
        }
    }
}

/// Outcome of a realtime webcam capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeOutcome {
    /// The request carried no usable file.
    LoadFailed,
    Completed(RecognitionResult),
}

/// The face captured during registration, waiting for a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCapture {
    Face(AlignedFace),
    /// The last capture had no detectable face.
    NoFace,
}

impl PendingCapture {
    pub fn face(&self) -> Option<&AlignedFace> {
        match self {
            PendingCapture::Face(face) => Some(face),
            PendingCapture::NoFace => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No capture was taken in this session.
    NoPendingCapture,
    /// The last capture had no face.
    FacelessCapture,
    /// The submitted name was blank.
    BlankName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Rejected(RejectReason),
}
