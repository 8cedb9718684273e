//! Error types for object removal operations

use thiserror::Error;

/// Result type alias for object removal operations
pub type Result<T> = std::result::Result<T, InpaintError>;

/// Error taxonomy used for diagnostics and logging
///
/// The boundary never exposes this structurally; every failure collapses to a
/// `status = 0` response with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArguments,
    DecodeError,
    ModelUnavailable,
    InferenceError,
    CropError,
    CompositionError,
    Cancelled,
    Configuration,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidArguments => "InvalidArguments",
            Self::DecodeError => "DecodeError",
            Self::ModelUnavailable => "ModelUnavailable",
            Self::InferenceError => "InferenceError",
            Self::CropError => "CropError",
            Self::CompositionError => "CompositionError",
            Self::Cancelled => "Cancelled",
            Self::Configuration => "Configuration",
            Self::Internal => "Internal",
        };
        f.write_str(name)
    }
}

/// Error types for object removal operations
#[derive(Error, Debug)]
pub enum InpaintError {
    /// A required argument is missing or malformed at the message level
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// An input buffer could not be decoded into a raster image
    #[error("Failed to decode {input}: {source}")]
    Decode {
        input: &'static str,
        #[source]
        source: image::ImageError,
    },

    /// The inpainting model failed to initialize and stays unavailable
    #[error("Inpainting model unavailable: {0}")]
    ModelUnavailable(String),

    /// Model invocation failed (tensor conversion, shape mismatch, runtime error)
    #[error("Inference error: {0}")]
    Inference(String),

    /// The crop rectangle does not fit inside the resized model output
    #[error("Crop error: {0}")]
    Crop(String),

    /// The result canvas could not be produced or encoded
    #[error("Composition error: {0}")]
    Composition(String),

    /// The caller abandoned the request before a result was delivered
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InpaintError {
    /// Create a new invalid arguments error
    pub fn invalid_arguments<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new decode error for the named input
    #[must_use]
    pub fn decode(input: &'static str, source: image::ImageError) -> Self {
        Self::Decode { input, source }
    }

    /// Create a new model unavailable error
    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new crop error
    pub fn crop<S: Into<String>>(msg: S) -> Self {
        Self::Crop(msg.into())
    }

    /// Create a new composition error
    pub fn composition<S: Into<String>>(msg: S) -> Self {
        Self::Composition(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create inference error with provider context
    pub fn inference_error_with_provider(
        provider: &str,
        operation: &str,
        error: &str,
        fallback_suggestions: &[&str],
    ) -> Self {
        let suggestions = if fallback_suggestions.is_empty() {
            String::new()
        } else {
            format!(" Try: {}", fallback_suggestions.join(" or "))
        };

        Self::Inference(format!(
            "{} failed using '{}' provider: {}.{}",
            operation, provider, error, suggestions
        ))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Taxonomy bucket of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::Decode { .. } => ErrorKind::DecodeError,
            Self::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            Self::Inference(_) => ErrorKind::InferenceError,
            Self::Crop(_) => ErrorKind::CropError,
            Self::Composition(_) => ErrorKind::CompositionError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidConfig(_) | Self::Model(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}
