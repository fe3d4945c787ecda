use crate::session::SessionStore;
use facerec_core::{BoxError, RecognitionWorkflow};
use facerec_vision::{PersonSummary, SqlitePersonStore};
use std::sync::Arc;

/// Read side of the person registry, for the `/people` listing.
pub trait PeopleSource: Send + Sync {
    fn people(&self) -> Result<Vec<PersonSummary>, BoxError>;
}

impl PeopleSource for SqlitePersonStore {
    fn people(&self) -> Result<Vec<PersonSummary>, BoxError> {
        Ok(SqlitePersonStore::people(self)?)
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<RecognitionWorkflow>,
    pub sessions: SessionStore,
    pub people: Arc<dyn PeopleSource>,
}
