//! Classification of upload outcomes

use std::fmt;

use crate::error::HttpClientError;

/// HTTP status codes worth sending the same batch again for
const RETRYABLE_STATUS_CODES: [u16; 7] = [408, 429, 500, 502, 503, 504, 507];

/// What went wrong with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatusError {
    /// The intake rejected the client token
    Unauthorized { status_code: u16 },
    /// The intake answered with a non-success status
    HttpError { status_code: u16 },
    /// No response was received
    NetworkError { message: String },
}

/// Outcome of uploading one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatus {
    /// Whether the batch must be kept and sent again later
    pub needs_retry: bool,
    /// Status code of the response, if one was received
    pub response_code: Option<u16>,
    /// `DD-REQUEST-ID` of the request
    pub request_id: Option<String>,
    pub error: Option<UploadStatusError>,
}

impl UploadStatus {
    /// Classify a response received from the intake
    pub fn from_response(status_code: u16, request_id: Option<String>) -> Self {
        let error = match status_code {
            200..=299 => None,
            401 | 403 => Some(UploadStatusError::Unauthorized { status_code }),
            _ => Some(UploadStatusError::HttpError { status_code }),
        };
        Self {
            needs_retry: RETRYABLE_STATUS_CODES.contains(&status_code),
            response_code: Some(status_code),
            request_id,
            error,
        }
    }

    /// Classify a request that never got a response. Always retried.
    pub fn from_network_error(error: &HttpClientError, request_id: Option<String>) -> Self {
        Self {
            needs_retry: true,
            response_code: None,
            request_id,
            error: Some(UploadStatusError::NetworkError {
                message: error.to_string(),
            }),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.response_code, &self.error) {
            (_, Some(UploadStatusError::NetworkError { message })) => write!(f, "[error: {message}]"),
            (Some(code), _) => write!(
                f,
                "[response code: {code}, request ID: {}]",
                self.request_id.as_deref().unwrap_or("(???)")
            ),
            (None, _) => write!(f, "[no response]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_codes_are_accepted() {
        for code in [200, 201, 202, 204, 299] {
            let status = UploadStatus::from_response(code, None);
            assert!(status.is_accepted(), "{code}");
            assert!(!status.needs_retry, "{code}");
        }
    }

    #[test]
    fn test_unauthorized_is_not_retried() {
        for code in [401, 403] {
            let status = UploadStatus::from_response(code, None);
            assert!(!status.needs_retry);
            assert_eq!(status.error, Some(UploadStatusError::Unauthorized { status_code: code }));
        }
    }

    #[test]
    fn test_retryable_codes() {
        for code in RETRYABLE_STATUS_CODES {
            let status = UploadStatus::from_response(code, None);
            assert!(status.needs_retry, "{code}");
            assert_eq!(status.error, Some(UploadStatusError::HttpError { status_code: code }));
        }
    }

    #[test]
    fn test_other_codes_are_not_retried() {
        for code in 100..600u16 {
            if RETRYABLE_STATUS_CODES.contains(&code) {
                continue;
            }
            assert!(!UploadStatus::from_response(code, None).needs_retry, "{code}");
        }
    }

    #[test]
    fn test_network_error_is_retried() {
        let status = UploadStatus::from_network_error(&HttpClientError::Network("offline".into()), None);
        assert!(status.needs_retry);
        assert_eq!(status.response_code, None);
        assert_eq!(status.to_string(), "[error: Network error: offline]");
    }

    #[test]
    fn test_display_includes_request_id() {
        let status = UploadStatus::from_response(202, Some("abc-123".into()));
        assert_eq!(status.to_string(), "[response code: 202, request ID: abc-123]");

        let status = UploadStatus::from_response(500, None);
        assert_eq!(status.to_string(), "[response code: 500, request ID: (???)]");
    }
}
