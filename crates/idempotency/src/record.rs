use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker stored once an operation completed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = CompletionRecord {
            completed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["completed_at"], "2023-11-14T22:13:20Z");
    }
}
