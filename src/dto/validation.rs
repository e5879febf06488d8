//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest room code accepted at any entry point.
pub const MAX_ROOM_CODE_LEN: usize = 8;

/// Validates that a room code is 1 to 8 ASCII alphanumeric characters, in any case.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("abc123") // Ok
/// validate_room_code("ABCDEFGHI") // Err - too long
/// validate_room_code("AB-12") // Err - punctuation
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only ASCII letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a free-text field is not blank once trimmed.
pub fn validate_not_blank(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}
