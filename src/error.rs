//! Error types for uvcprobe operations

use thiserror::Error;

/// Result type alias using uvcprobe's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for uvcprobe operations
#[derive(Error, Debug)]
pub enum Error {
    /// Camera-related errors
    #[error("Camera error: {0}")]
    Camera(String),

    /// Camera device not found
    #[error("Camera device not found: {0}")]
    CameraNotFound(String),

    /// Failed to capture frame from camera
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// An external utility could not be run or timed out
    #[error("{program}: {message}")]
    Tool {
        /// Program that was invoked
        program: String,
        /// What went wrong
        message: String,
    },

    /// Control id or name is not part of the registry
    #[error("Unknown control: {0}")]
    ControlUnknown(String),

    /// Integer value outside the control's range
    #[error("{control}: value {value} out of range {min}~{max}")]
    OutOfRange {
        /// Control name
        control: String,
        /// Rejected value
        value: i64,
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },

    /// Value not among the control's enumerated options
    #[error("{control}: value {value} is not one of {allowed}")]
    InvalidOption {
        /// Control name
        control: String,
        /// Rejected value
        value: i64,
        /// Accepted values, comma separated
        allowed: String,
    },

    /// The driver or setter refused a control write
    #[error("Setting {control} on {device} failed: {stderr}")]
    ControlRejected {
        /// Control name
        control: String,
        /// Device node
        device: String,
        /// Error text reported by the setter
        stderr: String,
    },

    /// Utility output could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Parameter store read/write failure
    #[error("Parameter store error: {0}")]
    Store(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

// V4L errors are converted manually in camera module

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", e))
    }
}
