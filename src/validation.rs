//! Request validation utilities.
//!
//! Malformed requests fail here with [`Error::Validation`] before any policy
//! gate or network call runs.

use crate::access::AccessRequest;
use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Drive file and folder ids are URL-safe base64-ish tokens (`root` included).
pub fn validate_drive_id(id: &str, field: &str) -> Result<()> {
    validate_non_empty(id, field)?;
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::validation(format!(
            "{} contains invalid characters: {}",
            field, id
        )));
    }
    Ok(())
}

/// Validate the fields of an access request.
pub fn validate_request(request: &AccessRequest) -> Result<()> {
    validate_non_empty(&request.service_name, "service_name")?;
    if !request
        .service_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric())
    {
        return Err(Error::validation(format!(
            "service_name must be alphanumeric: {}",
            request.service_name
        )));
    }
    if let Some(tool) = &request.tool_name {
        validate_non_empty(tool, "tool_name")?;
    }
    if let Some(folder) = &request.target_folder_id {
        validate_drive_id(folder, "target_folder_id")?;
    }
    Ok(())
}
