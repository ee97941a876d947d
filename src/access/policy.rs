//! Write-access policy.
//!
//! Every call is checked against the configured restrictions before it is
//! attempted. Reads always pass. Writes go through four gates in a fixed
//! order and the first violation wins:
//!
//! 1. read-only mode
//! 2. service allowlist (case-insensitive)
//! 3. tool allowlist (exact match)
//! 4. folder restriction (Drive ancestry walk, cached)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::hierarchy::FolderHierarchy;
use crate::types::{AccessControlConfig, Error, Result};

/// Services whose write operations can be allowlisted.
pub const WRITE_SERVICES: [&str; 4] = ["sheets", "docs", "drive", "calendar"];

// =============================================================================
// Request
// =============================================================================

/// Kind of operation a tool performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, Operation::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Operation::Read),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(Error::validation(format!("Unknown operation: {}", other))),
        }
    }
}

/// One access decision to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub operation: Operation,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_folder_id: Option<String>,
}

impl AccessRequest {
    pub fn new(operation: Operation, service_name: impl Into<String>) -> Self {
        Self {
            operation,
            service_name: service_name.into(),
            tool_name: None,
            target_folder_id: None,
        }
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_target_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.target_folder_id = Some(folder_id.into());
        self
    }
}

// =============================================================================
// Denial
// =============================================================================

/// Which gate rejected the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialCode {
    ReadOnlyMode,
    ServiceRestricted,
    ToolRestricted,
    FolderRestricted,
}

impl DenialCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialCode::ReadOnlyMode => "READ_ONLY_MODE",
            DenialCode::ServiceRestricted => "SERVICE_RESTRICTED",
            DenialCode::ToolRestricted => "TOOL_RESTRICTED",
            DenialCode::FolderRestricted => "FOLDER_RESTRICTED",
        }
    }
}

impl fmt::Display for DenialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy denial with the context needed to diagnose it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct AccessControlError {
    pub code: DenialCode,
    pub message: String,
    pub operation: Operation,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl AccessControlError {
    pub fn new(
        code: DenialCode,
        operation: Operation,
        service: &str,
        tool: Option<&str>,
        folder: Option<&str>,
    ) -> Self {
        let message = match code {
            DenialCode::ReadOnlyMode => format!(
                "{} on {} rejected: server is in read-only mode",
                operation, service
            ),
            DenialCode::ServiceRestricted => {
                format!("Write operations are not allowed for service {}", service)
            }
            DenialCode::ToolRestricted => format!(
                "Tool {} is not in the write allowlist",
                tool.unwrap_or("<none>")
            ),
            DenialCode::FolderRestricted => format!(
                "Target {} is outside the allowed folder",
                folder.unwrap_or("<none>")
            ),
        };

        Self {
            code,
            message,
            operation,
            service: service.to_string(),
            tool: tool.map(str::to_string),
            folder: folder.map(str::to_string),
        }
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// Evaluates [`AccessRequest`]s against an immutable [`AccessControlConfig`].
#[derive(Debug, Clone)]
pub struct AccessPolicyEvaluator {
    config: Arc<AccessControlConfig>,
    hierarchy: Option<FolderHierarchy>,
}

impl AccessPolicyEvaluator {
    /// `hierarchy` is only consulted when a folder restriction is active.
    pub fn new(config: Arc<AccessControlConfig>, hierarchy: Option<FolderHierarchy>) -> Self {
        Self { config, hierarchy }
    }

    pub fn config(&self) -> &AccessControlConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> Option<&FolderHierarchy> {
        self.hierarchy.as_ref()
    }

    /// Permit or deny `request`.
    ///
    /// Denials surface as [`Error::AccessControl`]. Drive failures during the
    /// folder walk surface as [`Error::Service`].
    pub async fn validate_access(&self, request: &AccessRequest) -> Result<()> {
        if !request.operation.is_write() {
            return Ok(());
        }

        let outcome = self.evaluate_write(request).await;
        match &outcome {
            Ok(()) => tracing::debug!(
                operation = %request.operation,
                service = %request.service_name,
                tool = request.tool_name.as_deref().unwrap_or(""),
                "access_granted"
            ),
            Err(Error::AccessControl(denial)) => tracing::warn!(
                operation = %request.operation,
                service = %request.service_name,
                tool = request.tool_name.as_deref().unwrap_or(""),
                folder = request.target_folder_id.as_deref().unwrap_or(""),
                code = denial.code.as_str(),
                "access_denied: {}",
                denial.message
            ),
            Err(e) => tracing::error!(
                operation = %request.operation,
                service = %request.service_name,
                "access_check_failed: {}",
                e
            ),
        }
        outcome
    }

    async fn evaluate_write(&self, request: &AccessRequest) -> Result<()> {
        let cfg = &self.config;
        let deny = |code: DenialCode| -> Result<()> {
            Err(AccessControlError::new(
                code,
                request.operation,
                &request.service_name,
                request.tool_name.as_deref(),
                request.target_folder_id.as_deref(),
            )
            .into())
        };

        if cfg.read_only_mode {
            return deny(DenialCode::ReadOnlyMode);
        }

        if let Some(services) = &cfg.allowed_write_services {
            let permitted = services
                .iter()
                .any(|s| s.eq_ignore_ascii_case(&request.service_name));
            if !permitted {
                return deny(DenialCode::ServiceRestricted);
            }
        }

        if let Some(tools) = &cfg.allowed_write_tools {
            let permitted = request
                .tool_name
                .as_ref()
                .is_some_and(|tool| tools.contains(tool));
            if !permitted {
                return deny(DenialCode::ToolRestricted);
            }
        }

        if let Some(root) = cfg.restricted_folder() {
            let Some(target) = request.target_folder_id.as_deref() else {
                return deny(DenialCode::FolderRestricted);
            };
            let hierarchy = self.hierarchy.as_ref().ok_or_else(|| {
                Error::internal("folder restriction configured without a Drive client")
            })?;
            if !hierarchy.is_within_folder_hierarchy(target, root).await? {
                return deny(DenialCode::FolderRestricted);
            }
        }

        Ok(())
    }
}
