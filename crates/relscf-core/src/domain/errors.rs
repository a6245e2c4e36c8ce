use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RelScfResult<T> = Result<T, RelScfError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Success,
    ConfigurationError,
    NumericalDivergence,
    EigenvalueNotFound,
    ScfNotConverged,
    IoSystemError,
    InternalError,
}

impl ErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 2,
            Self::IoSystemError => 3,
            Self::NumericalDivergence => 4,
            Self::EigenvalueNotFound => 5,
            Self::ScfNotConverged => 6,
            Self::InternalError => 7,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConfigurationError => "ConfigurationError",
            Self::NumericalDivergence => "NumericalDivergence",
            Self::EigenvalueNotFound => "EigenvalueNotFound",
            Self::ScfNotConverged => "ScfNotConverged",
            Self::IoSystemError => "IoSystemError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every component error so callers can classify failures
/// without matching on each variant.
pub trait Categorized {
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelScfError {
    category: ErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl RelScfError {
    pub fn new(
        category: ErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn configuration(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ConfigurationError, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InternalError, placeholder, message)
    }

    /// Wraps a component error, keeping its category and rendered message.
    pub fn from_component<E>(placeholder: &'static str, error: &E) -> Self
    where
        E: Categorized + Display,
    {
        Self::new(error.category(), placeholder, error.to_string())
    }

    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for RelScfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]: {}",
            self.category, self.placeholder, self.message
        )
    }
}

impl Error for RelScfError {}
