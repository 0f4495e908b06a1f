//! Persisted anchor index entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One hosted note: the cloud anchor id and the serialized note payload to show once the
/// anchor resolves again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub anchor_id: String,
    pub note_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
