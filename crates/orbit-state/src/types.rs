use serde::{Deserialize, Serialize};

/// The persisted record, loaded and saved as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableState {
    /// Second half of a mystery case, waiting for the next run.
    pub pending_diagnosis: Option<String>,
    /// ISO-8601 timestamp of the last save; `None` before the first save.
    pub updated_at: Option<String>,
}

impl DurableState {
    pub fn with_pending(diagnosis: impl Into<String>) -> Self {
        Self {
            pending_diagnosis: Some(diagnosis.into()),
            updated_at: None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_diagnosis.is_some()
    }
}
