//! # gworkspace-core - resilience and policy core for Google Workspace tools
//!
//! Every outbound Workspace call passes through the same pipeline:
//! - [`access`]: write gating (read-only mode, service/tool allowlists,
//!   folder restriction resolved against Drive)
//! - [`resilience`]: error normalization and retry with exponential backoff
//! - [`guard`]: the composition of both around a single call
//!
//! ## Architecture
//!
//! ```text
//!   tool handler → CallGuard ─┬─ validation
//!                             ├─ AccessPolicyEvaluator ── FolderHierarchy ── DriveClient
//!                             └─ RetryExecutor ── normalize()
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod access;
pub mod google;
pub mod guard;
pub mod resilience;
pub mod types;
pub mod validation;

// Internal utilities
pub mod observability;

pub use guard::CallGuard;
pub use types::{Config, Error, Result};
