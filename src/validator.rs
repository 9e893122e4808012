// src/validator.rs - Centralized format validation
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ApiError;

lazy_static! {
    // Loose international format: optional +, 7-15 digits, separators allowed
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9][0-9 \-()]{5,18}[0-9]$").unwrap();
    static ref TRACKING_REGEX: Regex = Regex::new(r"^TRK\d+[A-Z0-9]{9}$").unwrap();
    static ref BATCH_ID_REGEX: Regex = Regex::new(r"^BATCH-\d+-[A-Z0-9]{6}$").unwrap();
}

pub fn validate_phone(phone: &str) -> Result<(), ApiError> {
    if PHONE_REGEX.is_match(phone) {
        Ok(())
    } else {
        Err(ApiError::ValidationError(format!(
            "Invalid phone number '{}'",
            phone
        )))
    }
}

pub fn is_valid_tracking_number(value: &str) -> bool {
    TRACKING_REGEX.is_match(value)
}

pub fn is_valid_batch_id(value: &str) -> bool {
    BATCH_ID_REGEX.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+15551234567").is_ok());
        assert!(validate_phone("555-123-4567").is_ok());
        assert!(validate_phone("(02) 123 4567").is_ok());
        assert!(validate_phone("abc").is_err());
        assert!(validate_phone("").is_err());
    }

    #[test]
    fn test_tracking_number_format() {
        assert!(is_valid_tracking_number("TRK1700000000000AB12CD34E"));
        assert!(!is_valid_tracking_number("TRK1700000000000ab12cd34e"));
        assert!(!is_valid_tracking_number("1700000000000AB12CD34E"));
        assert!(!is_valid_tracking_number("TRKAB12CD34E"));
    }

    #[test]
    fn test_batch_id_format() {
        assert!(is_valid_batch_id("BATCH-1700000000000-A1B2C3"));
        assert!(!is_valid_batch_id("BATCH-A1B2C3"));
        assert!(!is_valid_batch_id("BATCH-1700000000000-a1b2c3"));
    }
}
