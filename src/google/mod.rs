//! Google API collaborators: credentials and the Drive parent lookup.

pub mod auth;
pub mod drive;
pub mod failure;

pub use auth::{AuthHandle, AuthProvider, Credentials, StaticTokenProvider};
pub use drive::{DriveClient, HttpDriveClient};
pub use failure::{parse_retry_after, ApiFailure};
