use super::types::{EngineErrorKind, ReviewError};

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl ReviewError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // An expired invocation already consumed its whole upper bound.
            ReviewError::Engine(e) if e.kind == EngineErrorKind::Timeout => ErrorClassification {
                error_type: "EngineTimeout",
                retryable: false,
            },
            ReviewError::Engine(e) if e.kind == EngineErrorKind::Crash => ErrorClassification {
                error_type: "EngineCrash",
                retryable: true,
            },
            ReviewError::Engine(_) => ErrorClassification {
                error_type: "EngineMalformedOutput",
                retryable: true,
            },
            ReviewError::Provisioning(_) => ErrorClassification {
                error_type: "ProvisioningError",
                retryable: true,
            },
            ReviewError::Git(_) => ErrorClassification {
                error_type: "GitError",
                retryable: true,
            },
            ReviewError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
            },

            // Non-retryable errors
            ReviewError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            ReviewError::Arbitration(_) => ErrorClassification {
                error_type: "ArbitrationError",
                retryable: false,
            },
            ReviewError::AllRunsFailed(_) => ErrorClassification {
                error_type: "AllRunsFailed",
                retryable: false,
            },
            ReviewError::InvalidTransition { .. } => ErrorClassification {
                error_type: "InvalidTransition",
                retryable: false,
            },
            ReviewError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            ReviewError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            ReviewError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }
}
