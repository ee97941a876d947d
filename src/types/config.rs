//! Configuration structures.
//!
//! Configuration is read once at startup from a string-keyed map (normally a
//! snapshot of the process environment). Parsing never fails: every malformed
//! value is dropped with a warning and replaced by its default.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use crate::access::{parse_tool_name, WRITE_SERVICES};

/// Environment snapshot that configuration is parsed from.
pub type EnvMap = HashMap<String, String>;

/// Environment keys understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceEnv {
    RetryMaxAttempts,
    RetryBaseDelay,
    RetryMaxDelay,
    RetryJitter,
    RetryRetriableCodes,
    DriveFolderId,
    AllowWritesOutsideFolder,
    AllowedWriteServices,
    AllowedWriteTools,
    ReadOnlyMode,
    ApiBaseUrl,
    HttpTimeout,
    HttpConnectTimeout,
    AccessToken,
    LogLevel,
    LogFormat,
}

impl WorkspaceEnv {
    /// Canonical environment variable name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryMaxAttempts => "GOOGLE_RETRY_MAX_ATTEMPTS",
            Self::RetryBaseDelay => "GOOGLE_RETRY_BASE_DELAY",
            Self::RetryMaxDelay => "GOOGLE_RETRY_MAX_DELAY",
            Self::RetryJitter => "GOOGLE_RETRY_JITTER",
            Self::RetryRetriableCodes => "GOOGLE_RETRY_RETRIABLE_CODES",
            Self::DriveFolderId => "GOOGLE_DRIVE_FOLDER_ID",
            Self::AllowWritesOutsideFolder => "GOOGLE_ALLOW_WRITES_OUTSIDE_FOLDER",
            Self::AllowedWriteServices => "GOOGLE_ALLOWED_WRITE_SERVICES",
            Self::AllowedWriteTools => "GOOGLE_ALLOWED_WRITE_TOOLS",
            Self::ReadOnlyMode => "GOOGLE_READ_ONLY_MODE",
            Self::ApiBaseUrl => "GOOGLE_API_BASE_URL",
            Self::HttpTimeout => "GOOGLE_HTTP_TIMEOUT",
            Self::HttpConnectTimeout => "GOOGLE_HTTP_CONNECT_TIMEOUT",
            Self::AccessToken => "GOOGLE_ACCESS_TOKEN",
            Self::LogLevel => "GWORKSPACE_LOG_LEVEL",
            Self::LogFormat => "GWORKSPACE_LOG_FORMAT",
        }
    }
}

impl fmt::Display for WorkspaceEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Retry/backoff policy for upstream calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Write-gating policy.
    #[serde(default)]
    pub access: AccessControlConfig,

    /// Drive HTTP client settings.
    #[serde(default)]
    pub drive: DriveConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse every section from an environment snapshot.
    pub fn from_env_map(env: &EnvMap) -> Self {
        Self {
            retry: RetryConfig::from_env_map(env),
            access: AccessControlConfig::from_env_map(env),
            drive: DriveConfig::from_env_map(env),
            observability: ObservabilityConfig::from_env_map(env),
        }
    }

    /// Parse from the current process environment.
    pub fn from_env() -> Self {
        Self::from_env_map(&std::env::vars().collect())
    }

    /// JSON schema of the configuration document.
    pub fn json_schema() -> crate::types::Result<Value> {
        Ok(serde_json::to_value(schemars::schema_for!(Config))?)
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Retry/backoff policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    /// Total attempts including the first call (>= 1).
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for the exponential delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Relative jitter applied to each delay, in [0, 1].
    pub jitter_factor: f64,

    /// HTTP statuses that trigger a retry.
    pub retriable_codes: BTreeSet<u16>,
}

impl RetryConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
    pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;
    pub const DEFAULT_RETRIABLE_CODES: [u16; 5] = [429, 500, 502, 503, 504];

    /// Parse from an environment snapshot, field by field.
    pub fn from_env_map(env: &EnvMap) -> Self {
        let max_attempts = read(env, WorkspaceEnv::RetryMaxAttempts)
            .and_then(|raw| match raw.parse::<u32>() {
                Ok(n) if n >= 1 => Some(n),
                _ => reject(WorkspaceEnv::RetryMaxAttempts, raw, "expected an integer >= 1"),
            })
            .unwrap_or(Self::DEFAULT_MAX_ATTEMPTS);

        let base_delay_ms = read(env, WorkspaceEnv::RetryBaseDelay)
            .and_then(|raw| parse_millis(WorkspaceEnv::RetryBaseDelay, raw))
            .unwrap_or(Self::DEFAULT_BASE_DELAY_MS);

        let max_delay_ms = read(env, WorkspaceEnv::RetryMaxDelay)
            .and_then(|raw| {
                let parsed = parse_millis(WorkspaceEnv::RetryMaxDelay, raw)?;
                if parsed < base_delay_ms {
                    return reject(
                        WorkspaceEnv::RetryMaxDelay,
                        raw,
                        "must not be below the base delay",
                    );
                }
                Some(parsed)
            })
            .unwrap_or(Self::DEFAULT_MAX_DELAY_MS)
            .max(base_delay_ms);

        let jitter_factor = read(env, WorkspaceEnv::RetryJitter)
            .and_then(|raw| match raw.parse::<f64>() {
                Ok(f) if f.is_finite() && (0.0..=1.0).contains(&f) => Some(f),
                _ => reject(WorkspaceEnv::RetryJitter, raw, "expected a number in [0, 1]"),
            })
            .unwrap_or(Self::DEFAULT_JITTER_FACTOR);

        let retriable_codes = read(env, WorkspaceEnv::RetryRetriableCodes)
            .map(|raw| {
                split_list(raw)
                    .filter_map(|entry| match entry.parse::<u16>() {
                        Ok(code) if (100..=599).contains(&code) => Some(code),
                        _ => reject(
                            WorkspaceEnv::RetryRetriableCodes,
                            entry,
                            "expected an HTTP status in [100, 599]",
                        ),
                    })
                    .collect::<BTreeSet<u16>>()
            })
            .filter(|codes| !codes.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_RETRIABLE_CODES.into_iter().collect());

        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter_factor,
            retriable_codes,
        }
    }

    pub fn is_retriable_code(&self, status: u16) -> bool {
        self.retriable_codes.contains(&status)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: Self::DEFAULT_BASE_DELAY_MS,
            max_delay_ms: Self::DEFAULT_MAX_DELAY_MS,
            jitter_factor: Self::DEFAULT_JITTER_FACTOR,
            retriable_codes: Self::DEFAULT_RETRIABLE_CODES.into_iter().collect(),
        }
    }
}

// =============================================================================
// Access control
// =============================================================================

/// Write-gating policy. Reads are never restricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessControlConfig {
    /// Deny every non-read operation. Defaults to true.
    pub read_only_mode: bool,

    /// Services that may write (lowercase). `None` means unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_write_services: Option<BTreeSet<String>>,

    /// Tool identifiers that may write. `None` means unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_write_tools: Option<BTreeSet<String>>,

    /// Root folder that writes are confined to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Permit writes outside `folder_id`. Unset behaves as `false` once a
    /// folder is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_writes_outside_folder: Option<bool>,
}

impl AccessControlConfig {
    /// Parse from an environment snapshot.
    pub fn from_env_map(env: &EnvMap) -> Self {
        let read_only_mode = read(env, WorkspaceEnv::ReadOnlyMode)
            .and_then(|raw| parse_bool(WorkspaceEnv::ReadOnlyMode, raw))
            .unwrap_or(true);

        let allowed_write_services = read(env, WorkspaceEnv::AllowedWriteServices)
            .map(|raw| {
                split_list(raw)
                    .filter_map(|entry| {
                        let service = entry.to_ascii_lowercase();
                        if WRITE_SERVICES.contains(&service.as_str()) {
                            Some(service)
                        } else {
                            reject(
                                WorkspaceEnv::AllowedWriteServices,
                                entry,
                                "unknown service",
                            )
                        }
                    })
                    .collect::<BTreeSet<String>>()
            })
            .filter(|set| !set.is_empty());

        let allowed_write_tools = read(env, WorkspaceEnv::AllowedWriteTools)
            .map(|raw| {
                split_list(raw)
                    .filter_map(|entry| {
                        if parse_tool_name(entry).is_some() {
                            Some(entry.to_string())
                        } else {
                            reject(
                                WorkspaceEnv::AllowedWriteTools,
                                entry,
                                "not a recognised tool name",
                            )
                        }
                    })
                    .collect::<BTreeSet<String>>()
            })
            .filter(|set| !set.is_empty());

        let folder_id = read(env, WorkspaceEnv::DriveFolderId).map(str::to_string);

        let allow_writes_outside_folder = read(env, WorkspaceEnv::AllowWritesOutsideFolder)
            .and_then(|raw| parse_bool(WorkspaceEnv::AllowWritesOutsideFolder, raw));

        Self {
            read_only_mode,
            allowed_write_services,
            allowed_write_tools,
            folder_id,
            allow_writes_outside_folder,
        }
    }

    /// Fully permissive configuration (writes allowed everywhere).
    pub fn permissive() -> Self {
        Self {
            read_only_mode: false,
            ..Self::default()
        }
    }

    /// Root folder writes are confined to, if the folder gate is active.
    pub fn restricted_folder(&self) -> Option<&str> {
        if self.allow_writes_outside_folder.unwrap_or(false) {
            return None;
        }
        self.folder_id.as_deref()
    }
}

impl Default for AccessControlConfig {
    fn default() -> Self {
        Self {
            read_only_mode: true,
            allowed_write_services: None,
            allowed_write_tools: None,
            folder_id: None,
            allow_writes_outside_folder: None,
        }
    }
}

// =============================================================================
// Drive client
// =============================================================================

/// Drive HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DriveConfig {
    /// API root, without trailing slash.
    pub base_url: String,

    /// Whole-request timeout.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub timeout: Duration,

    /// TCP connect timeout.
    #[serde(with = "humantime_serde")]
    #[schemars(with = "String")]
    pub connect_timeout: Duration,
}

impl DriveConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.googleapis.com";

    pub fn from_env_map(env: &EnvMap) -> Self {
        let defaults = Self::default();
        Self {
            base_url: read(env, WorkspaceEnv::ApiBaseUrl)
                .map(|raw| raw.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: read(env, WorkspaceEnv::HttpTimeout)
                .and_then(|raw| parse_duration(WorkspaceEnv::HttpTimeout, raw))
                .unwrap_or(defaults.timeout),
            connect_timeout: read(env, WorkspaceEnv::HttpConnectTimeout)
                .and_then(|raw| parse_duration(WorkspaceEnv::HttpConnectTimeout, raw))
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Observability
// =============================================================================

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// Fallback filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl ObservabilityConfig {
    pub fn from_env_map(env: &EnvMap) -> Self {
        let defaults = Self::default();
        Self {
            log_level: read(env, WorkspaceEnv::LogLevel)
                .map(str::to_string)
                .unwrap_or(defaults.log_level),
            json_logs: read(env, WorkspaceEnv::LogFormat)
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

// =============================================================================
// Parsing helpers
// =============================================================================

fn read(env: &EnvMap, key: WorkspaceEnv) -> Option<&str> {
    env.get(key.as_str())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn reject<T>(key: WorkspaceEnv, raw: &str, why: &str) -> Option<T> {
    tracing::warn!(key = %key, value = raw, "config_value_rejected: {}", why);
    None
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_millis(key: WorkspaceEnv, raw: &str) -> Option<u64> {
    match raw.parse::<u64>() {
        Ok(ms) => Some(ms),
        Err(_) => reject(key, raw, "expected a non-negative integer (milliseconds)"),
    }
}

fn parse_bool(key: WorkspaceEnv, raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => reject(key, raw, "expected true|false|1|0"),
    }
}

fn parse_duration(key: WorkspaceEnv, raw: &str) -> Option<Duration> {
    match humantime_serde::deserialize::<Duration, _>(Value::String(raw.to_string())) {
        Ok(d) if !d.is_zero() => Some(d),
        _ => reject(key, raw, "expected a positive duration such as 30s"),
    }
}
