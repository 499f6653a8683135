use thiserror::Error;

use crate::domain::topic::Topic;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("conversation mode is required")]
    MissingMode,
    #[error("unknown conversation mode `{0}` (expected child|teen|adult|senior)")]
    UnknownMode(String),
    #[error("user message must not be empty")]
    EmptyMessage,
    #[error("search query must not be empty")]
    EmptyQuery,
    #[error("unknown session `{0}`")]
    UnknownSession(String),
    #[error("a recommendation question for {pending:?} is already pending")]
    ConsentAlreadyPending { pending: Topic },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

/// Coarse class of an interface failure, used to pick a status code and a safe message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Caller,
    Missing,
    Unavailable,
    Internal,
}

impl InterfaceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::BadRequest { .. } => FailureKind::Caller,
            Self::NotFound { .. } => FailureKind::Missing,
            Self::ServiceUnavailable { .. } => FailureKind::Unavailable,
            Self::Internal { .. } => FailureKind::Internal,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            FailureKind::Caller => "The request could not be processed. Check inputs and try again.",
            FailureKind::Missing => "The requested resource does not exist.",
            FailureKind::Unavailable => "The service is temporarily unavailable. Please retry shortly.",
            FailureKind::Internal => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    /// Domain rejections are the caller's fault; storage and provider failures are transient.
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(error) => {
                InterfaceError::BadRequest { message: error.to_string(), correlation_id }
            }
            Self::NotFound(message) => InterfaceError::NotFound { message, correlation_id },
            Self::Persistence(message) | Self::Integration(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, FailureKind, InterfaceError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::UnknownMode("toddler".to_owned()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("toddler")
        ));
    }

    #[test]
    fn bad_request_has_user_safe_message() {
        let interface =
            ApplicationError::from(DomainError::EmptyMessage).into_interface("req-2");

        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn unknown_session_is_a_caller_error() {
        let interface = ApplicationError::from(DomainError::UnknownSession("s-1".to_owned()))
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn missing_shelf_entry_maps_to_not_found() {
        let interface =
            ApplicationError::NotFound("book b-1".to_owned()).into_interface("req-3");

        assert_eq!(interface.kind(), FailureKind::Missing);
        assert_eq!(interface.user_message(), "The requested resource does not exist.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert_eq!(interface.kind(), FailureKind::Unavailable);
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing api key".to_owned()).into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
