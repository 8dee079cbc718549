use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SatflowError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("{provider} responded with HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} API error {code}: {message}")]
    ApiError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Download of {product} failed: {reason}")]
    DownloadError { product: String, reason: String },

    #[error("Task '{task}' failed: {details}")]
    TaskError { task: String, details: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Provider,
    Storage,
    Data,
    Workflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// CLI 結束碼，失敗一律非 0
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorSeverity::Medium => 2,   // 可重試的錯誤
            ErrorSeverity::High => 1,     // 處理錯誤
            ErrorSeverity::Critical => 3, // 系統錯誤
        }
    }
}

impl SatflowError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SatflowError::ConfigError { .. }
            | SatflowError::MissingConfigError { .. }
            | SatflowError::InvalidConfigValueError { .. }
            | SatflowError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            SatflowError::HttpError(_) => ErrorCategory::Network,
            SatflowError::ProviderError { .. } | SatflowError::ApiError { .. } => {
                ErrorCategory::Provider
            }
            SatflowError::IoError(_) | SatflowError::ZipError(_) | SatflowError::DownloadError { .. } => {
                ErrorCategory::Storage
            }
            SatflowError::CsvError(_)
            | SatflowError::SerializationError(_)
            | SatflowError::ProcessingError { .. }
            | SatflowError::ValidationError { .. } => ErrorCategory::Data,
            SatflowError::TaskError { .. } => ErrorCategory::Workflow,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SatflowError::HttpError(_) | SatflowError::ProviderError { .. } => ErrorSeverity::Medium,
            SatflowError::ApiError { .. } | SatflowError::DownloadError { .. } => ErrorSeverity::Medium,
            SatflowError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否值得重試（網路錯誤、伺服器 5xx、API 暫時性錯誤）
    pub fn is_retryable(&self) -> bool {
        match self {
            SatflowError::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            SatflowError::ProviderError { status, .. } => *status >= 500 || *status == 429,
            SatflowError::ApiError { .. } => true,
            SatflowError::DownloadError { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the command line arguments, the TOML file and the provider credential environment variables"
            }
            ErrorCategory::Network => "Check network connectivity and retry later",
            ErrorCategory::Provider => {
                "The provider rejected the request; verify credentials and that the service is available"
            }
            ErrorCategory::Storage => "Check free disk space and write permissions of the output directory",
            ErrorCategory::Data => "The provider returned data in an unexpected shape; rerun with --verbose",
            ErrorCategory::Workflow => "Inspect the flow run summary for the failing task",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SatflowError::MissingConfigError { field } => {
                format!("Required setting '{}' has not been provided", field)
            }
            SatflowError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            SatflowError::ProviderError { provider, status, .. } => {
                format!("{} returned HTTP {}", provider, status)
            }
            SatflowError::HttpError(_) => "Could not reach the satellite data provider".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SatflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_not_retryable() {
        let err = SatflowError::MissingConfigError {
            field: "DHUS_USER".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(!err.is_retryable());
        assert!(err.user_friendly_message().contains("DHUS_USER"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = SatflowError::ProviderError {
            provider: "Copernicus".to_string(),
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let client_err = SatflowError::ProviderError {
            provider: "Copernicus".to_string(),
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(!client_err.is_retryable());
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        let io = SatflowError::IoError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(io.severity(), ErrorSeverity::Critical);
        assert_eq!(io.severity().exit_code(), 3);
        assert_eq!(ErrorSeverity::High.exit_code(), 1);
        assert_eq!(ErrorSeverity::Medium.exit_code(), 2);
        assert!(ErrorSeverity::Critical > ErrorSeverity::Medium);
    }
}
