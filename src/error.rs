use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Arithmetic overflow computing {0}")]
    ArithmeticOverflow(String),
}

impl ScheduleError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        ScheduleError::ArithmeticOverflow(context.into())
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[cfg(test)]
mod tests {
    use super::ScheduleError;
    use test_log::test;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ScheduleError::invalid("principal", "must be greater than zero").to_string(),
            "Invalid input: principal: must be greater than zero"
        );
        assert_eq!(
            ScheduleError::overflow("interest").to_string(),
            "Arithmetic overflow computing interest"
        );
    }
}
