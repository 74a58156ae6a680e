use thiserror::Error;

/// Errors raised inside the host runtime.
///
/// `Clone` because an awaitable hands the same failure to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("TypeError: {0}")]
    Type(String),

    /// A raised exception, either from host code or re-raised from the guest.
    #[error("{name}: {message}")]
    Exception {
        name: String,
        message: String,
        stack: Option<String>,
    },

    #[error("no running event loop")]
    NoRunningLoop,

    #[error("engine has been shut down")]
    EngineShutDown,

    #[error("awaitable was cancelled")]
    Cancelled,
}

impl HostError {
    /// Shorthand for a plain `Error` exception with no stack.
    pub fn raise(message: impl Into<String>) -> Self {
        Self::Exception {
            name: "Error".to_string(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HostError::Type(_) => "TypeError",
            HostError::Exception { name, .. } => name,
            HostError::NoRunningLoop | HostError::EngineShutDown => "RuntimeError",
            HostError::Cancelled => "CancelledError",
        }
    }

    /// The message without the leading exception name.
    pub fn message(&self) -> String {
        match self {
            HostError::Type(message) => message.clone(),
            HostError::Exception { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_display_includes_name() {
        let err = HostError::Exception {
            name: "RangeError".into(),
            message: "out of range".into(),
            stack: None,
        };
        assert_eq!(err.to_string(), "RangeError: out of range");
        assert_eq!(err.name(), "RangeError");
        assert_eq!(err.message(), "out of range");
    }

    #[test]
    fn raise_defaults_to_error() {
        let err = HostError::raise("boom");
        assert_eq!(err.name(), "Error");
        assert_eq!(err.to_string(), "Error: boom");
    }
}
