//! Immutable snapshot of SDK state used when building uploads

use serde::{Deserialize, Serialize};

use crate::consent::TrackingConsent;

/// Intake region the SDK uploads to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    #[default]
    Us1,
    Us3,
    Us5,
    Eu1,
    Ap1,
    Us1Fed,
}

impl Site {
    /// Base URL of the intake for this site
    pub fn endpoint(&self) -> &'static str {
        match self {
            Site::Us1 => "https://browser-intake-datadoghq.com",
            Site::Us3 => "https://browser-intake-us3-datadoghq.com",
            Site::Us5 => "https://browser-intake-us5-datadoghq.com",
            Site::Eu1 => "https://browser-intake-datadoghq.eu",
            Site::Ap1 => "https://browser-intake-ap1-datadoghq.com",
            Site::Us1Fed => "https://browser-intake-ddog-gov.com",
        }
    }
}

/// Host device description, used for the `User-Agent` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device model, e.g. `x86_64`
    pub model: String,
    /// Operating system name
    pub os_name: String,
    /// Operating system version
    pub os_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            model: std::env::consts::ARCH.to_string(),
            os_name: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
        }
    }
}

/// Everything the upload path needs to know about the running SDK.
///
/// A context is a value: components receive a fresh clone for every
/// upload cycle and never observe it changing under their feet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkContext {
    /// Intake site
    pub site: Site,
    /// Client token sent as `DD-API-KEY`
    pub client_token: String,
    /// Service name
    pub service: String,
    /// Environment name, e.g. `prod`
    pub env: String,
    /// Application version
    pub version: String,
    /// Source reported in the `ddsource` query parameter
    pub source: String,
    /// SDK version reported in `DD-EVP-ORIGIN-VERSION`
    pub sdk_version: String,
    /// Application name used in the `User-Agent` header
    pub application_name: String,
    /// Host device
    pub device: DeviceInfo,
    /// Current tracking consent
    pub tracking_consent: TrackingConsent,
}

impl SdkContext {
    /// Create a context with the given client token and defaults everywhere else
    pub fn new(client_token: impl Into<String>) -> Self {
        Self {
            client_token: client_token.into(),
            ..Default::default()
        }
    }
}

impl Default for SdkContext {
    fn default() -> Self {
        Self {
            site: Site::default(),
            client_token: String::new(),
            service: "spool".to_string(),
            env: "prod".to_string(),
            version: "0.0.0".to_string(),
            source: "rust".to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            application_name: "spool".to_string(),
            device: DeviceInfo::default(),
            tracking_consent: TrackingConsent::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_endpoints() {
        assert_eq!(Site::Us1.endpoint(), "https://browser-intake-datadoghq.com");
        assert_eq!(Site::Eu1.endpoint(), "https://browser-intake-datadoghq.eu");
        assert!(Site::Us1Fed.endpoint().starts_with("https://"));
    }

    #[test]
    fn test_context_defaults() {
        let context = SdkContext::new("token");
        assert_eq!(context.client_token, "token");
        assert_eq!(context.tracking_consent, TrackingConsent::Pending);
        assert_eq!(context.source, "rust");
    }
}
