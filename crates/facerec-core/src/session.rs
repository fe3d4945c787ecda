use crate::types::PendingCapture;

/// Per-client state carried between requests.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    /// Registration capture awaiting a name.
    pub pending: Option<PendingCapture>,
    /// Last realtime recognition text, read by the polling endpoint.
    pub result: Option<String>,
    flashes: Vec<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot message for the next rendered page.
    pub fn flash(&mut self, message: impl Into<String>) {
        self.flashes.push(message.into());
    }

    /// Drain queued flash messages in the order they were added.
    pub fn take_flashes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flashes)
    }
}
