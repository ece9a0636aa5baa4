//! Error types for the object runtime

/// Result type for runtime operations
pub type ObjectResult<T> = Result<T, ObjectError>;

/// Object runtime errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ObjectError {
    /// Value is not an instance of the expected class (or failed its validity check)
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected class name
        expected: String,
        /// Actual type or class name
        got: String,
    },

    /// Property registered twice on the same class
    #[error("Property '{property}' is already registered on class '{class}'")]
    DuplicateProperty {
        /// Class name
        class: String,
        /// Property name
        property: String,
    },

    /// Class name registered twice
    #[error("Class '{0}' is already registered")]
    DuplicateClass(String),

    /// Class name is empty or contains the `/` separator used by `stringify`
    #[error("Invalid class name '{0}': names must be non-empty and cannot contain '/'")]
    InvalidClassName(String),

    /// Class name not found in the registry
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// Primitive values have no identity and cannot be referenced
    #[error("Value of type {0} cannot be referenced")]
    NotReferenceable(String),

    /// `unref` of a value that holds no reference count
    #[error("Unbalanced unref of {0:#x}")]
    UnbalancedUnref(usize),

    /// Nested signal emission exceeded the configured depth
    #[error("Signal '{name}' exceeded the maximum emission depth of {depth}")]
    EmitDepthExceeded {
        /// Signal name
        name: String,
        /// Configured depth limit
        depth: usize,
    },

    /// Invalid argument passed to a runtime function
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// A native or script callback failed
    #[error("{0}")]
    Callback(String),

    /// Runtime options failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Isolated worker failed or panicked
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<String> for ObjectError {
    fn from(s: String) -> Self {
        ObjectError::Callback(s)
    }
}

impl From<&str> for ObjectError {
    fn from(s: &str) -> Self {
        ObjectError::Callback(s.to_string())
    }
}
