//! SQLite-backed person store.
//!
//! Each registration adds one face sample under a name. The sample's crop is
//! copied into the faces directory because aligned crops are written to
//! fixed paths that later captures overwrite.

use crate::types::Embedding;
use facerec_core::{AlignedFace, BoxError, PersonStore};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    face_path  TEXT NOT NULL,
    embedding  TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS samples_name ON samples(name);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("embedding encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database lock poisoned")]
    Poisoned,
}

/// A registered face sample as persisted.
#[derive(Debug, Clone)]
pub struct StoredSample {
    pub id: String,
    pub name: String,
    pub face_path: PathBuf,
    /// `None` until the recognizer has encoded the sample.
    pub embedding: Option<Embedding>,
    pub created_at: String,
}

/// A registered person and how many samples they have.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSummary {
    pub name: String,
    pub samples: usize,
}

pub struct SqlitePersonStore {
    conn: Mutex<Connection>,
    faces_dir: PathBuf,
}

impl SqlitePersonStore {
    /// Open (or create) the database and the faces directory.
    pub fn open(db_path: &Path, faces_dir: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(faces_dir)?;

        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(db = %db_path.display(), faces = %faces_dir.display(), "person store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            faces_dir: faces_dir.to_path_buf(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Copy `face` into the faces directory and record it under `name`.
    /// Returns the new sample id.
    pub fn add_sample(&self, face: &Path, name: &str) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let ext = face.extension().and_then(|e| e.to_str()).unwrap_or("png");
        let stored = self.faces_dir.join(format!("{id}.{ext}"));
        std::fs::copy(face, &stored)?;

        let created_at = chrono::Utc::now().to_rfc3339();
        let inserted = self.conn()?.execute(
            "INSERT INTO samples (id, name, face_path, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, stored.to_string_lossy(), created_at],
        );
        if let Err(e) = inserted {
            let _ = std::fs::remove_file(&stored);
            return Err(e.into());
        }

        tracing::info!(id = %id, name, "face sample stored");
        Ok(id)
    }

    /// All samples, oldest first.
    pub fn samples(&self) -> Result<Vec<StoredSample>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, face_path, embedding, created_at FROM samples ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, name, face_path, embedding, created_at)| {
                Ok(StoredSample {
                    id,
                    name,
                    face_path: PathBuf::from(face_path),
                    embedding: embedding.map(|e| serde_json::from_str(&e)).transpose()?,
                    created_at,
                })
            })
            .collect()
    }

    pub fn set_embedding(&self, id: &str, embedding: &Embedding) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(embedding)?;
        self.conn()?.execute(
            "UPDATE samples SET embedding = ?1 WHERE id = ?2",
            params![encoded, id],
        )?;
        Ok(())
    }

    /// Registered names with their sample counts, alphabetically.
    pub fn people(&self) -> Result<Vec<PersonSummary>, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT name, COUNT(*) FROM samples GROUP BY name ORDER BY name")?;
        let people = stmt
            .query_map([], |row| {
                Ok(PersonSummary {
                    name: row.get(0)?,
                    samples: row.get::<_, i64>(1)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(people)
    }

    /// Delete every sample of `name` and its stored crops. Returns the number
    /// of samples removed.
    pub fn remove_person(&self, name: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let paths = conn
            .prepare("SELECT face_path FROM samples WHERE name = ?1")?
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let removed = conn.execute("DELETE FROM samples WHERE name = ?1", [name])?;

        for path in paths {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path, error = %e, "could not delete stored face");
            }
        }
        tracing::info!(name, removed, "person removed");
        Ok(removed)
    }
}

impl PersonStore for SqlitePersonStore {
    fn add_person(&self, face: &AlignedFace, name: &str) -> Result<(), BoxError> {
        self.add_sample(face.path(), name)?;
        Ok(())
    }
}
