use thiserror::Error;

/// Errors raised while building domain values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid uuid: {0}")]
    InvalidUuid(String),

    #[error("not a time-based uuid: {0}")]
    NotTimeBased(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid calendar day: {0}")]
    InvalidDay(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_names_the_field() {
        assert_eq!(CoreError::EmptyField("user").to_string(), "user must not be empty");
    }

    #[test]
    fn invalid_day_display() {
        let err = CoreError::InvalidDay("2024-13-01".into());
        assert!(err.to_string().contains("2024-13-01"));
    }
}
