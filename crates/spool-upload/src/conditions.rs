//! System conditions that can hold uploads back

use std::fmt;

use spool_core::SdkContext;

/// Reason an upload cycle is skipped
#[derive(Debug, Clone, PartialEq)]
pub enum Blocker {
    /// Battery too low and not charging
    Battery { level: u8, charging: bool },
    LowPowerMode,
    NetworkReachability(String),
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocker::Battery { level, charging } => {
                let state = if *charging { "charging" } else { "unplugged" };
                write!(f, "battery is {state} ({level}%)")
            }
            Blocker::LowPowerMode => write!(f, "low power mode is enabled"),
            Blocker::NetworkReachability(description) => write!(f, "network reachability is {description}"),
        }
    }
}

/// Decides whether the system is ready for an upload
pub trait UploadConditions: Send + Sync {
    /// Everything currently preventing an upload; empty when ready
    fn blockers_for_upload(&self, context: &SdkContext) -> Vec<Blocker>;
}

/// Never blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl UploadConditions for AlwaysReady {
    fn blockers_for_upload(&self, _context: &SdkContext) -> Vec<Blocker> {
        Vec::new()
    }
}

/// Human readable summary of `blockers` for logs
pub fn describe_blockers(blockers: &[Blocker]) -> String {
    if blockers.is_empty() {
        return "ready".to_string();
    }
    let reasons: Vec<String> = blockers.iter().map(Blocker::to_string).collect();
    format!("upload skipped because {}", reasons.join(" and "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_blockers() {
        assert_eq!(describe_blockers(&[]), "ready");
        assert_eq!(
            describe_blockers(&[
                Blocker::Battery { level: 5, charging: false },
                Blocker::NetworkReachability("offline".into()),
            ]),
            "upload skipped because battery is unplugged (5%) and network reachability is offline"
        );
    }

    #[test]
    fn test_always_ready() {
        assert!(AlwaysReady.blockers_for_upload(&SdkContext::default()).is_empty());
    }
}
