use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Daemon configuration.
///
/// Sources, lowest precedence first: built-in defaults, the TOML file named
/// by `FACEREC_CONFIG`, `FACEREC_*` environment variables. Command-line
/// flags are applied on top by `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on (default: 0.0.0.0).
    pub bind: String,
    pub port: u16,
    /// Where received images are written (default: system temp dir).
    pub upload_dir: PathBuf,
    /// Where aligned face crops are written (default: `<upload_dir>/aligned`).
    pub aligned_dir: PathBuf,
    /// Path to the SQLite person database.
    pub db_path: PathBuf,
    /// Where registered face crops are kept.
    pub faces_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Idle time after which a session is dropped.
    pub session_ttl_secs: u64,
}

/// Keys accepted in the TOML config file. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    port: Option<u16>,
    upload_dir: Option<PathBuf>,
    aligned_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    faces_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    similarity_threshold: Option<f32>,
    session_ttl_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the optional TOML file and `FACEREC_*`
    /// environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let file = match std::env::var("FACEREC_CONFIG") {
            Ok(path) => load_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::resolve(file, |key| std::env::var(key).ok()))
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, from_file: Option<PathBuf>| env(key).map(PathBuf::from).or(from_file);

        let data_dir = path("FACEREC_DATA_DIR", file.data_dir).unwrap_or_else(|| {
            env("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                })
                .join("facerec")
        });

        let upload_dir =
            path("FACEREC_UPLOAD_DIR", file.upload_dir).unwrap_or_else(std::env::temp_dir);
        let aligned_dir = path("FACEREC_ALIGNED_DIR", file.aligned_dir)
            .unwrap_or_else(|| upload_dir.join("aligned"));

        Self {
            bind: env("FACEREC_BIND")
                .or(file.bind)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&env, "FACEREC_PORT").or(file.port).unwrap_or(5000),
            db_path: path("FACEREC_DB_PATH", file.db_path)
                .unwrap_or_else(|| data_dir.join("people.db")),
            faces_dir: path("FACEREC_FACES_DIR", file.faces_dir)
                .unwrap_or_else(|| data_dir.join("faces")),
            model_dir: path("FACEREC_MODEL_DIR", file.model_dir)
                .unwrap_or_else(|| data_dir.join("models")),
            similarity_threshold: parsed(&env, "FACEREC_SIMILARITY_THRESHOLD")
                .or(file.similarity_threshold)
                .unwrap_or(facerec_vision::recognizer::DEFAULT_THRESHOLD),
            session_ttl_secs: parsed(&env, "FACEREC_SESSION_TTL_SECS")
                .or(file.session_ttl_secs)
                .unwrap_or(3600),
            upload_dir,
            aligned_dir,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

/// Unparseable values fall back as if unset.
fn parsed<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.parse().ok())
}

fn load_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}
