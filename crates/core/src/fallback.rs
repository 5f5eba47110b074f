//! Links into the remote platform's own web UI for features the deployment
//! does not expose over RPC.

use crate::capability::{CapabilitySet, ATTENDANCE_GET_SESSIONS, MESSAGE_GET_CONVERSATIONS};

pub const FEATURE_ATTENDANCE: &str = "attendance";
pub const FEATURE_MESSAGES: &str = "messages";
pub const FEATURE_GRADES: &str = "grades";

/// Builds fallback URLs from static path templates.
#[derive(Debug, Clone)]
pub struct FallbackResolver {
    base_url: String,
}

impl FallbackResolver {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for `feature`, scoped to `course_id` where the template takes one.
    /// Unrecognized features resolve to the bare base URL.
    pub fn resolve(&self, feature: &str, course_id: Option<i64>) -> String {
        let path = match (feature, course_id) {
            (FEATURE_ATTENDANCE, Some(id)) => format!("/mod/attendance/index.php?id={id}"),
            (FEATURE_ATTENDANCE, None) => "/my/".to_string(),
            (FEATURE_MESSAGES, _) => "/message/index.php".to_string(),
            (FEATURE_GRADES, Some(id)) => format!("/grade/report/user/index.php?id={id}"),
            (FEATURE_GRADES, None) => "/grade/report/overview/index.php".to_string(),
            _ => return self.base_url.clone(),
        };
        format!("{}{}", self.base_url, path)
    }
}

/// How a presentation layer should reach a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureAccess {
    /// The named remote function is available.
    Rpc(&'static str),
    /// Send the user to the platform's web UI instead.
    Fallback(String),
}

impl FeatureAccess {
    /// Resolve `feature` against the probed capabilities. Features without a
    /// probed remote function always fall back.
    pub fn resolve(
        capabilities: &CapabilitySet,
        resolver: &FallbackResolver,
        feature: &str,
        course_id: Option<i64>,
    ) -> Self {
        match probed_function(feature) {
            Some(function) if capabilities.contains(function) => FeatureAccess::Rpc(function),
            _ => FeatureAccess::Fallback(resolver.resolve(feature, course_id)),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FeatureAccess::Fallback(_))
    }
}

fn probed_function(feature: &str) -> Option<&'static str> {
    match feature {
        FEATURE_ATTENDANCE => Some(ATTENDANCE_GET_SESSIONS),
        FEATURE_MESSAGES => Some(MESSAGE_GET_CONVERSATIONS),
        _ => None,
    }
}
