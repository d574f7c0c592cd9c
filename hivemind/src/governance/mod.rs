//! Governance middleware ("Omega").
//!
//! Every externally visible action runs through a four-step pipeline:
//! pre-check the vault is writable, validate the candidate record, write it
//! durably, and (for tool calls) post-verify with a result record. Policy
//! knobs decide whether failures block or degrade to warnings.

mod record;

pub use record::LogRecord;

use std::sync::Arc;

use serde_json::json;

use crate::error::{HubError, HubResult};
use crate::mcp::CallToolResult;
use crate::notebook::NotebookVault;

/// Governance policy knobs. Defaults are all on.
#[derive(Clone, Debug)]
pub struct OmegaConfig {
    pub enforce_logging: bool,
    pub block_on_failure: bool,
    pub require_timestamp: bool,
    pub require_source: bool,
    pub require_action: bool,
    pub iso8601_strict: bool,
    pub validate_schema: bool,
}

impl Default for OmegaConfig {
    fn default() -> Self {
        Self {
            enforce_logging: true,
            block_on_failure: true,
            require_timestamp: true,
            require_source: true,
            require_action: true,
            iso8601_strict: true,
            validate_schema: true,
        }
    }
}

/// Outcome of one enforcement pass.
#[derive(Clone, Debug)]
pub struct LogOutcome {
    pub logged: bool,
    pub warning: Option<String>,
}

/// The governance pipeline over a notebook vault.
pub struct Omega {
    vault: Arc<NotebookVault>,
    config: OmegaConfig,
    version: String,
}

impl Omega {
    pub fn new(vault: Arc<NotebookVault>, config: OmegaConfig) -> Self {
        Self {
            vault,
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn config(&self) -> &OmegaConfig {
        &self.config
    }

    /// Runs pre-check, validation, and the durable write for one record.
    ///
    /// - Pre-check failure blocks (`GovernanceBlocked`) under
    ///   `block_on_failure`, otherwise degrades to a warning.
    /// - Validation failure is always `GovernanceInvalidFormat`.
    /// - Write failure aborts under `enforce_logging`, otherwise returns
    ///   `logged: false`.
    pub async fn enforce(&self, record: &LogRecord) -> HubResult<LogOutcome> {
        let mut warning = None;
        if let Err(e) = self.vault.ensure_root().await {
            if self.config.block_on_failure {
                return Err(HubError::GovernanceBlocked(e.to_string()));
            }
            warning = Some(e.to_string());
        }
        if self.config.validate_schema {
            record
                .validate(&self.config)
                .map_err(HubError::GovernanceInvalidFormat)?;
        }
        match self
            .vault
            .append_daily_log(&record.render_markdown(), &self.version)
            .await
        {
            Ok(_) => Ok(LogOutcome {
                logged: true,
                warning,
            }),
            Err(e) if self.config.enforce_logging => Err(HubError::GovernanceBlocked(format!(
                "log write failed under enforce: {}",
                e
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "governance log write failed, continuing");
                Ok(LogOutcome {
                    logged: false,
                    warning: Some(e.to_string()),
                })
            }
        }
    }

    /// Wraps one tool call: pre-record, action, post-record. The pre-record
    /// gates execution; the post-record is best-effort since the action has
    /// already run.
    pub async fn wrap_tool_call<F, Fut>(
        &self,
        server: &str,
        tool: &str,
        args_summary: serde_json::Value,
        action: F,
    ) -> CallToolResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CallToolResult>,
    {
        let pre = LogRecord::now(
            "tool_call",
            server,
            tool,
            json!({ "metadata": { "arguments": args_summary } }),
        );
        if let Err(e) = self.enforce(&pre).await {
            return CallToolResult::error(&e, tool);
        }

        let result = action().await;

        let post = LogRecord::now(
            "tool_call",
            server,
            format!("{}_result", tool),
            json!({
                "result": {
                    "is_error": result.is_err(),
                    "preview": preview(result.first_text()),
                }
            }),
        );
        if let Err(e) = self.enforce(&post).await {
            tracing::warn!(tool, error = %e, "post-verify record failed");
        }
        result
    }

    /// Transport-level hook: synthesizes one `http_request` record from
    /// method/path/status. No result record is emitted for transports.
    pub async fn record_http(
        &self,
        transport: &str,
        method: &str,
        path: &str,
        status: u16,
    ) -> HubResult<LogOutcome> {
        let record = LogRecord::now(
            "http_request",
            transport,
            method,
            json!({
                "metadata": { "path": path, "status": status },
            }),
        );
        self.enforce(&record).await
    }
}

/// Bounded result preview carried in post-records.
fn preview(text: &str) -> String {
    const CAP: usize = 240;
    if text.len() <= CAP {
        text.to_string()
    } else {
        let mut cut = CAP;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}
