use thiserror::Error;

/// Errors raised while resolving, translating, or querying chart data.
///
/// None of these are recovered internally. A translation either succeeds
/// completely or returns one of these before any data tree is handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdoError {
    #[error("Invalid argument '{name}': {message}")]
    ArgumentInvalid { name: String, message: String },

    #[error("Required argument '{0}' was not specified")]
    ArgumentRequired(String),

    #[error("Invalid operation: {0}")]
    OperationInvalid(String),
}

impl CdoError {
    pub fn argument_invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArgumentInvalid {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn argument_required(name: impl Into<String>) -> Self {
        Self::ArgumentRequired(name.into())
    }

    pub fn operation_invalid(message: impl Into<String>) -> Self {
        Self::OperationInvalid(message.into())
    }

    /// Name of the offending argument, for the argument variants
    pub fn argument_name(&self) -> Option<&str> {
        match self {
            Self::ArgumentInvalid { name, .. } => Some(name),
            Self::ArgumentRequired(name) => Some(name),
            Self::OperationInvalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_identify_argument() {
        let err = CdoError::argument_invalid("measuresIndexes", "Index value '7' is out of range");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'measuresIndexes': Index value '7' is out of range"
        );
        assert_eq!(err.argument_name(), Some("measuresIndexes"));

        let err = CdoError::argument_required("datums");
        assert_eq!(err.to_string(), "Required argument 'datums' was not specified");

        let err = CdoError::operation_invalid("Can only load datums in an owner data");
        assert_eq!(err.argument_name(), None);
    }
}
