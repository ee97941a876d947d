//! Tool identifier grammar.
//!
//! Tool names come in three surface forms:
//! - `prefix__service__action` (double underscore)
//! - `prefix__service-action` (prefixed service-dash-action)
//! - `service-action` (legacy, unprefixed)
//!
//! Services never contain `-`, so the first dash always separates service
//! from action and every parsed name serializes back to its input.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Surface form a tool name was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolNamePattern {
    DoubleUnderscore,
    ServiceDashAction,
    Legacy,
}

/// A tool identifier split into its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedToolName {
    /// Server prefix; `None` only for [`ToolNamePattern::Legacy`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub service: String,
    pub action: String,
    pub pattern: ToolNamePattern,
}

impl ParsedToolName {
    /// Render back into the surface form it was parsed from.
    pub fn to_tool_name(&self) -> String {
        let prefix = self.prefix.as_deref().unwrap_or_default();
        match self.pattern {
            ToolNamePattern::DoubleUnderscore => {
                format!("{}__{}__{}", prefix, self.service, self.action)
            }
            ToolNamePattern::ServiceDashAction => {
                format!("{}__{}-{}", prefix, self.service, self.action)
            }
            ToolNamePattern::Legacy => format!("{}-{}", self.service, self.action),
        }
    }
}

impl fmt::Display for ParsedToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_tool_name())
    }
}

impl FromStr for ParsedToolName {
    type Err = crate::types::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_tool_name(s)
            .ok_or_else(|| crate::types::Error::validation(format!("Unrecognised tool name: {}", s)))
    }
}

/// Parse a tool identifier. Returns `None` when no pattern matches.
pub fn parse_tool_name(name: &str) -> Option<ParsedToolName> {
    let parts: Vec<&str> = name.split("__").collect();

    match parts.as_slice() {
        [prefix, service, action] => {
            if is_segment(prefix) && is_service(service) && is_action(action) {
                Some(ParsedToolName {
                    prefix: Some(prefix.to_string()),
                    service: service.to_string(),
                    action: action.to_string(),
                    pattern: ToolNamePattern::DoubleUnderscore,
                })
            } else {
                None
            }
        }
        [prefix, rest] => {
            if !is_segment(prefix) {
                return None;
            }
            let (service, action) = split_service_action(rest)?;
            Some(ParsedToolName {
                prefix: Some(prefix.to_string()),
                service,
                action,
                pattern: ToolNamePattern::ServiceDashAction,
            })
        }
        [bare] => {
            let (service, action) = split_service_action(bare)?;
            Some(ParsedToolName {
                prefix: None,
                service,
                action,
                pattern: ToolNamePattern::Legacy,
            })
        }
        _ => None,
    }
}

fn split_service_action(s: &str) -> Option<(String, String)> {
    let (service, action) = s.split_once('-')?;
    (is_service(service) && is_action(action)).then(|| (service.to_string(), action.to_string()))
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_service(s: &str) -> bool {
    is_segment(s) && !s.contains('-')
}

fn is_action(s: &str) -> bool {
    is_segment(s) && !s.starts_with('-')
}
