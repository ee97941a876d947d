//! Core types for the Workspace pipeline.
//!
//! This module provides foundational types used throughout the crate:
//! - **Errors**: the crate error taxonomy with thiserror derives
//! - **Config**: retry, access-control, Drive and observability settings

mod config;
mod errors;

pub use config::{
    AccessControlConfig, Config, DriveConfig, EnvMap, ObservabilityConfig, RetryConfig,
    WorkspaceEnv,
};
pub use errors::{Error, Result};
