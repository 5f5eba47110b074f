//! Capability probing: which named remote functions a deployment supports.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SatchelError};
use crate::remote::client::{RemoteApi, RpcParams};
use crate::remote::RemoteConfig;

pub const ATTENDANCE_GET_SESSIONS: &str = "mod_attendance_get_sessions";
pub const ATTENDANCE_GET_SESSION: &str = "mod_attendance_get_session";
pub const ATTENDANCE_UPDATE_USER_STATUS: &str = "mod_attendance_update_user_status";
pub const MESSAGE_GET_CONVERSATIONS: &str = "core_message_get_conversations";
pub const MESSAGE_SEND_INSTANT: &str = "core_message_send_instant_messages";

/// Versioned probe list. Extending it is how probing for a new feature is added.
pub const PROBE_FUNCTIONS: &[&str] = &[
    ATTENDANCE_GET_SESSIONS,
    ATTENDANCE_GET_SESSION,
    ATTENDANCE_UPDATE_USER_STATUS,
    MESSAGE_GET_CONVERSATIONS,
    MESSAGE_SEND_INSTANT,
];

/// Error codes that prove the function exists even though the empty probe call was rejected.
const PRESENT_ERROR_CODES: &[&str] = &["invalidparameter"];

/// How a probe response is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Available whenever the call completes without a transport failure.
    #[default]
    Transport,
    /// Additionally reject HTTP 200 payloads carrying an application exception,
    /// except errors that only complain about the (deliberately empty) arguments.
    Strict,
}

impl ProbeMode {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            ProbeMode::Strict
        } else {
            ProbeMode::Transport
        }
    }

    fn accepts(self, payload: &Value) -> bool {
        match self {
            ProbeMode::Transport => true,
            ProbeMode::Strict => match payload.as_object() {
                Some(obj) if obj.contains_key("exception") || obj.contains_key("errorcode") => obj
                    .get("errorcode")
                    .and_then(Value::as_str)
                    .is_some_and(|code| PRESENT_ERROR_CODES.contains(&code)),
                _ => true,
            },
        }
    }
}

/// Remote functions known to succeed against the current remote configuration.
///
/// Rebuilt at the start of every sync cycle and threaded through it by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    available: BTreeSet<String>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: &str) {
        self.available.insert(function.to_string());
    }

    pub fn contains(&self, function: &str) -> bool {
        self.available.contains(function)
    }

    /// Fail with [`SatchelError::CapabilityUnavailable`] unless `function` was probed as available.
    pub fn require(&self, function: &str) -> Result<()> {
        if self.contains(function) {
            Ok(())
        } else {
            Err(SatchelError::CapabilityUnavailable(function.to_string()))
        }
    }

    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.available.iter().map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            available: iter.into_iter().map(str::to_string).collect(),
        }
    }
}

/// Calls each function of a probe list with empty arguments and records which succeed.
pub struct CapabilityProber<'a> {
    api: &'a dyn RemoteApi,
    mode: ProbeMode,
    functions: &'a [&'a str],
}

impl<'a> CapabilityProber<'a> {
    pub fn new(api: &'a dyn RemoteApi, mode: ProbeMode) -> Self {
        Self {
            api,
            mode,
            functions: PROBE_FUNCTIONS,
        }
    }

    /// Probe a custom function list instead of [`PROBE_FUNCTIONS`].
    pub fn with_functions(mut self, functions: &'a [&'a str]) -> Self {
        self.functions = functions;
        self
    }

    /// Probe every function in the list. Individual failures never propagate.
    pub async fn probe(&self, config: &RemoteConfig) -> CapabilitySet {
        let mut set = CapabilitySet::new();
        let empty = RpcParams::new();

        for function in self.functions {
            match self.api.call(config, function, &empty).await {
                Ok(payload) if self.mode.accepts(&payload) => {
                    debug!(function = %function, "Capability available");
                    set.insert(function);
                }
                Ok(_) => {
                    debug!(function = %function, "Capability rejected by strict probe");
                }
                Err(e) => {
                    warn!(function = %function, error = %e, "Capability probe failed");
                }
            }
        }

        info!(
            available = set.len(),
            probed = self.functions.len(),
            mode = ?self.mode,
            "Capability probe complete"
        );
        set
    }
}
