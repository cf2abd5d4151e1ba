//! Input validators used by clap argument parsing.

/// Maximum accepted resource ID length.
pub const MAX_RESOURCE_ID_LENGTH: usize = 128;

/// Maximum accepted phase name length.
pub const MAX_PHASE_NAME_LENGTH: usize = 64;

/// Validate a resource ID argument.
///
/// IDs are opaque control-plane identifiers; the only constraints are
/// non-emptiness, a sane length, and no whitespace.
///
/// # Errors
///
/// Returns a human-readable message for clap to surface.
pub fn validate_resource_id(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("resource ID cannot be empty".to_string());
    }
    if value.len() > MAX_RESOURCE_ID_LENGTH {
        return Err(format!(
            "resource ID cannot exceed {MAX_RESOURCE_ID_LENGTH} characters"
        ));
    }
    if value.chars().any(char::is_whitespace) {
        return Err("resource ID cannot contain whitespace".to_string());
    }
    Ok(value.to_string())
}

/// Validate a phase name argument.
///
/// Phase names are used as record attributes and in file-friendly output:
/// alphanumeric plus `-` and `_`.
///
/// # Errors
///
/// Returns a human-readable message for clap to surface.
pub fn validate_phase_name(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("phase name cannot be empty".to_string());
    }
    if value.len() > MAX_PHASE_NAME_LENGTH {
        return Err(format!(
            "phase name cannot exceed {MAX_PHASE_NAME_LENGTH} characters"
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("phase name must be alphanumeric (dashes and underscores allowed)".to_string());
    }
    Ok(value.to_string())
}
