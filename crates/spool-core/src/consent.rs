//! Tracking consent

use serde::{Deserialize, Serialize};

/// The user's decision about data collection.
///
/// Data collected while consent is `Pending` is kept aside until the
/// decision is known: moved to the upload directory on `Granted`, deleted
/// on `NotGranted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingConsent {
    /// Data is collected and uploaded
    Granted,
    /// Data is neither collected nor uploaded
    NotGranted,
    /// Data is collected but kept on device until consent changes
    #[default]
    Pending,
}

impl std::fmt::Display for TrackingConsent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingConsent::Granted => write!(f, "granted"),
            TrackingConsent::NotGranted => write!(f, "not_granted"),
            TrackingConsent::Pending => write!(f, "pending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_serde_names() {
        let json = serde_json::to_string(&TrackingConsent::NotGranted).unwrap();
        assert_eq!(json, "\"not_granted\"");
        let parsed: TrackingConsent = serde_json::from_str("\"granted\"").unwrap();
        assert_eq!(parsed, TrackingConsent::Granted);
        assert_eq!(TrackingConsent::default(), TrackingConsent::Pending);
    }
}
