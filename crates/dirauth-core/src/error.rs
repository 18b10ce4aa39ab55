//! Error types for Dirauth

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Invalid server list: {0}")]
    InvalidServerList(String),

    #[error("Invalid group specification: {0}")]
    InvalidGroupSpec(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Connection Errors
    #[error("All directory servers failed: {}", .errors.join("; "))]
    AllEndpointsExhausted { errors: Vec<String> },

    // Directory Errors
    #[error("Bind failed: {0}")]
    BindFailure(String),

    #[error("Search failed: {0}")]
    SearchFailure(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    // Authorization Errors
    #[error("User {user} is not a member of any required group")]
    NotAuthorized { user: String },
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidServerList(_) => "InvalidServerList",
            Error::InvalidGroupSpec(_) => "InvalidGroupSpec",
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::AllEndpointsExhausted { .. } => "AllEndpointsExhausted",
            Error::BindFailure(_) => "BindFailure",
            Error::SearchFailure(_) => "SearchFailure",
            Error::UserNotFound(_) => "UserNotFound",
            Error::NotAuthorized { .. } => "NotAuthorized",
        }
    }

    /// Whether the error was raised before any network activity
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidServerList(_) | Error::InvalidGroupSpec(_) | Error::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_lists_every_endpoint() {
        let err = Error::AllEndpointsExhausted {
            errors: vec![
                "ldap://a.example.com:389: connection refused".to_string(),
                "ldap://b.example.com:389: timed out".to_string(),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("a.example.com"));
        assert!(message.contains("b.example.com"));
        assert_eq!(err.code(), "AllEndpointsExhausted");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::InvalidGroupSpec("missing container".into()).is_configuration());
        assert!(!Error::BindFailure("invalid credentials".into()).is_configuration());
        assert!(!Error::NotAuthorized { user: "bob".into() }.is_configuration());
    }
}
