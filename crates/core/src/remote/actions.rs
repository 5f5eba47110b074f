//! Capability-gated remote operations outside the sync cycle.
//!
//! Each action checks the probed [`CapabilitySet`] first and fails with
//! [`SatchelError::CapabilityUnavailable`] without calling the remote side
//! when its function is absent.

use tracing::{debug, info};

use super::client::{RemoteApi, RpcParams};
use super::record::RawRecord;
use super::RemoteConfig;
use crate::capability::{
    CapabilitySet, ATTENDANCE_UPDATE_USER_STATUS, MESSAGE_GET_CONVERSATIONS, MESSAGE_SEND_INSTANT,
};
use crate::error::{Result, SatchelError};

pub struct RemoteActions<'a> {
    api: &'a dyn RemoteApi,
    config: &'a RemoteConfig,
    capabilities: &'a CapabilitySet,
}

impl<'a> RemoteActions<'a> {
    pub fn new(
        api: &'a dyn RemoteApi,
        config: &'a RemoteConfig,
        capabilities: &'a CapabilitySet,
    ) -> Self {
        Self {
            api,
            config,
            capabilities,
        }
    }

    async fn call(&self, function: &str, params: RpcParams) -> Result<RawRecord> {
        self.capabilities.require(function)?;
        let value = self.api.call(self.config, function, &params).await?;
        // Some functions answer with a one-element array.
        let value = match value {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        let record = RawRecord::from_value(value).unwrap_or_default();
        if let Some(code) = record.str("errorcode") {
            return Err(SatchelError::Sync(format!(
                "{function} raised {code}: {}",
                record.str("message").unwrap_or_default()
            )));
        }
        Ok(record)
    }

    /// Conversations visible to `user_id`.
    pub async fn list_conversations(&self, user_id: i64) -> Result<Vec<RawRecord>> {
        let record = self
            .call(
                MESSAGE_GET_CONVERSATIONS,
                RpcParams::new().with("userid", user_id),
            )
            .await?;
        let conversations = record.records("conversations");
        debug!(user_id, count = conversations.len(), "Listed conversations");
        Ok(conversations)
    }

    /// Send `text` to `to_user_id`; returns the remote message id.
    pub async fn send_message(&self, to_user_id: i64, text: &str) -> Result<i64> {
        let params = RpcParams::new()
            .with("messages[0][touserid]", to_user_id)
            .with("messages[0][text]", text);
        let record = self.call(MESSAGE_SEND_INSTANT, params).await?;
        match record.i64("msgid").filter(|id| *id > 0) {
            Some(id) => {
                info!(to_user_id, message_id = id, "Message sent");
                Ok(id)
            }
            None => Err(SatchelError::Sync(format!(
                "message to {to_user_id} rejected: {}",
                record.str("errormessage").unwrap_or_else(|| "unknown".into())
            ))),
        }
    }

    /// Record `status_id` for `student_id` in `session_id`, taken by `taken_by`.
    ///
    /// `status_set` lists every status id of the session's status set; the
    /// remote side checks `status_id` against it.
    pub async fn submit_attendance_status(
        &self,
        session_id: i64,
        student_id: i64,
        status_id: i64,
        status_set: &[i64],
        taken_by: i64,
    ) -> Result<()> {
        if !status_set.contains(&status_id) {
            return Err(SatchelError::Sync(format!(
                "status {status_id} is not in the session's status set"
            )));
        }
        let status_set = status_set
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let params = RpcParams::new()
            .with("sessionid", session_id)
            .with("studentid", student_id)
            .with("takenbyid", taken_by)
            .with("statusid", status_id)
            .with("statusset", status_set);
        self.call(ATTENDANCE_UPDATE_USER_STATUS, params).await?;
        info!(session_id, student_id, status_id, "Attendance status submitted");
        Ok(())
    }
}
