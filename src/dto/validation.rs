//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted location label, in characters.
pub const MAX_LABEL_CHARS: usize = 200;

/// Validates that a location label is present once trimmed and not oversized.
///
/// # Examples
///
/// ```ignore
/// validate_label("Accra Mall") // Ok
/// validate_label("   ")        // Err - blank
/// ```
pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("label_blank");
        err.message = Some("Location label must not be empty".into());
        return Err(err);
    }

    let chars = trimmed.chars().count();
    if chars > MAX_LABEL_CHARS {
        let mut err = ValidationError::new("label_length");
        err.message = Some(
            format!("Location label must be at most {MAX_LABEL_CHARS} characters (got {chars})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates a latitude/longitude pair in decimal degrees.
pub fn validate_coordinates(lat: f64, lng: f64) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        let mut err = ValidationError::new("coordinates_range");
        err.message = Some(format!("Coordinates out of range (lat {lat}, lng {lng})").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label() {
        assert!(validate_label("Accra Mall").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label(" \t").is_err());
        assert!(validate_label(&"x".repeat(MAX_LABEL_CHARS + 1)).is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(5.6037, -0.187).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }
}
