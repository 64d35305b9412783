// crates/core/src/record.rs
//! Progress record and wire payload types.

use serde::{Deserialize, Serialize};

/// A progress signal extracted from one line of a watched location.
///
/// Transient: produced by a tracker, possibly coalesced away by the
/// updater's sampling gate, sent, then discarded. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    /// Process-wide sequence number, strictly increasing across all tags.
    pub sequence: u64,
    /// Which watched location produced this record ("progress", "stdout", "stderr").
    pub tag: String,
    /// Most recently matched percentage for this tag. No smoothing.
    pub percent: Option<f64>,
    /// Free text captured from the progress line. May exceed the configured
    /// maximum here; the updater truncates at send time.
    pub message: String,
    /// True when the source line blew the per-line byte budget and was
    /// emitted as a truncated partial line.
    pub raw_truncated: bool,
}

/// JSON body POSTed to the scheduler callback endpoint.
///
/// Stable schema: `{"sequence", "tag", "percent"?, "message"}`, where
/// `percent` is omitted when the record carries none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub sequence: u64,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    pub message: String,
}

impl ProgressPayload {
    /// Build the wire payload for a record, truncating the message to
    /// `max_message_length`. Truncation is character-boundary safe and
    /// silent; the record's own flag covers diagnostics.
    pub fn from_record(record: &ProgressRecord, max_message_length: usize) -> Self {
        Self {
            sequence: record.sequence,
            tag: record.tag.clone(),
            percent: record.percent,
            message: truncate_message(&record.message, max_message_length),
        }
    }
}

/// Truncate `message` to at most `max_len` characters without splitting a
/// multi-byte character.
pub fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    message.chars().take(max_len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(message: &str, percent: Option<f64>) -> ProgressRecord {
        ProgressRecord {
            sequence: 7,
            tag: "progress".into(),
            percent,
            message: message.into(),
            raw_truncated: false,
        }
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = ProgressPayload::from_record(&record("halfway done", Some(42.5)), 512);
        let json = serde_json::to_string(&payload).unwrap();
        let back: ProgressPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn percent_is_omitted_when_absent() {
        let payload = ProgressPayload::from_record(&record("starting", None), 512);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("percent"));

        let back: ProgressPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.percent, None);
    }

    #[test]
    fn message_is_truncated_to_exactly_max_length() {
        let long = "x".repeat(600);
        let payload = ProgressPayload::from_record(&record(&long, Some(1.0)), 512);
        assert_eq!(payload.message.chars().count(), 512);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let message = "é".repeat(100);
        let truncated = truncate_message(&message, 64);
        assert_eq!(truncated.chars().count(), 64);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn short_messages_are_untouched() {
        assert_eq!(truncate_message("done", 512), "done");
    }
}
