//! Change notifications over HTTP.
//!
//! Mutating commands spool new action-log rows to a JSON file in the OS
//! temp directory and hand it to a detached `td webhook-dispatch` process,
//! which POSTs the payload once and deletes the spool.
//!
//! Requests carry `X-TD-Timestamp` (unix seconds) and, when a secret is
//! configured, `X-TD-Signature: sha256=<hex>` where the MAC covers
//! `timestamp + "." + body`. Receivers should bound timestamp skew.

use crate::error::{Result, TdError};
use crate::model::ActionLog;
use crate::storage::{ActionFilter, SqliteStorage};
use crate::storage::sqlite::format_datetime;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const USER_AGENT: &str = "td-webhook/1";
pub const TIMESTAMP_HEADER: &str = "X-TD-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-TD-Signature";
pub const SPOOL_PREFIX: &str = "td-webhook-";
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Metadata key holding the last action-log id already spooled.
pub const CURSOR_KEY: &str = "webhook_last_action_id";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAction {
    pub id: String,
    pub session_id: String,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub previous_data: String,
    pub new_data: String,
    pub timestamp: String,
}

impl From<&ActionLog> for WebhookAction {
    fn from(row: &ActionLog) -> Self {
        Self {
            id: row.id.to_string(),
            session_id: row.session_id.clone(),
            action_type: row.action_type.as_str().to_lowercase(),
            entity_type: row.entity_type.to_lowercase(),
            entity_id: row.entity_id.clone(),
            previous_data: row.previous_data.clone(),
            new_data: row.new_data.clone(),
            timestamp: format_datetime(&row.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub project_dir: String,
    pub timestamp: String,
    pub actions: Vec<WebhookAction>,
}

/// Everything a detached dispatcher needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolEnvelope {
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,
    pub payload: WebhookPayload,
}

#[must_use]
pub fn build_payload(project_dir: &str, actions: &[ActionLog]) -> WebhookPayload {
    WebhookPayload {
        project_dir: project_dir.to_string(),
        timestamp: format_datetime(&Utc::now()),
        actions: actions.iter().map(WebhookAction::from).collect(),
    }
}

/// Write `envelope` to a fresh `td-webhook-*.json` in the temp directory.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written; the partial
/// file is removed.
pub fn write_spool(envelope: &SpoolEnvelope) -> Result<PathBuf> {
    write_spool_in(&std::env::temp_dir(), envelope)
}

/// Like [`write_spool`] but in an explicit directory.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_spool_in(dir: &Path, envelope: &SpoolEnvelope) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix(SPOOL_PREFIX)
        .suffix(".json")
        .tempfile_in(dir)?;

    // Dropping the NamedTempFile on any early return deletes it.
    serde_json::to_writer(&mut file, envelope)?;
    file.flush()?;

    let (_, path) = file.keep().map_err(|err| TdError::Io(err.error))?;
    debug!(path = %path.display(), "webhook spool written");
    Ok(path)
}

/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_spool(path: &Path) -> Result<SpoolEnvelope> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Hex HMAC-SHA256 of `timestamp + "." + body`.
///
/// # Errors
///
/// Returns a config error if the key is rejected.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| TdError::Config(format!("invalid webhook secret: {err}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// POST the payload once.
///
/// # Errors
///
/// Returns `Transport` for non-2xx responses and network failures.
pub fn dispatch(url: &str, secret: &str, payload: &WebhookPayload) -> Result<()> {
    let body = serde_json::to_string(payload)?;
    let timestamp = Utc::now().timestamp();

    let agent = ureq::AgentBuilder::new()
        .timeout(DISPATCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build();
    let mut req = agent
        .post(url)
        .set("Content-Type", "application/json")
        .set(TIMESTAMP_HEADER, &timestamp.to_string());
    if !secret.is_empty() {
        let signature = sign(secret, timestamp, body.as_bytes())?;
        req = req.set(SIGNATURE_HEADER, &format!("sha256={signature}"));
    }

    match req.send_string(&body) {
        Ok(resp) if (200..=299).contains(&resp.status()) => {
            info!(url, status = resp.status(), actions = payload.actions.len(), "webhook delivered");
            Ok(())
        }
        Ok(resp) => Err(TdError::Transport(format!(
            "HTTP {} {}",
            resp.status(),
            resp.status_text()
        ))),
        Err(ureq::Error::Status(code, resp)) => {
            let text = resp.into_string().unwrap_or_default();
            Err(TdError::Transport(format!("HTTP {code}: {}", text.trim())))
        }
        Err(ureq::Error::Transport(err)) => Err(TdError::Transport(err.to_string())),
    }
}

/// Deliver a spool file, then delete it whatever the outcome.
///
/// # Errors
///
/// Returns an error if the spool cannot be read or delivery fails.
pub fn dispatch_spool(path: &Path) -> Result<()> {
    let envelope = read_spool(path);
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "failed to remove webhook spool");
    }
    let envelope = envelope?;
    dispatch(&envelope.url, &envelope.secret, &envelope.payload)
}

/// Spool action rows recorded since the last spool.
///
/// Returns `None` when nothing new happened. Advances the stored cursor.
///
/// # Errors
///
/// Returns an error if the store or the spool write fails.
pub fn spool_pending(
    store: &mut SqliteStorage,
    url: &str,
    secret: &str,
    project_dir: &str,
) -> Result<Option<PathBuf>> {
    let after_id = store
        .get_metadata(CURSOR_KEY)?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let actions = store.list_action_log(&ActionFilter {
        after_id: Some(after_id),
        ..ActionFilter::default()
    })?;
    let Some(last) = actions.last() else {
        return Ok(None);
    };
    let last_id = last.id;

    let envelope = SpoolEnvelope {
        url: url.to_string(),
        secret: secret.to_string(),
        payload: build_payload(project_dir, &actions),
    };
    let path = write_spool(&envelope)?;
    store.set_metadata(CURSOR_KEY, &last_id.to_string())?;
    Ok(Some(path))
}
