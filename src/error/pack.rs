use thiserror::Error;

pub type PackResult<T> = Result<T, PackError>;

/// Ошибки кодирования и чтения бинарного формата.
///
/// Все нарушения предусловий сигнализируются синхронно в точке вызова;
/// ядро никогда не восстанавливается само и не повторяет операцию.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackError {
    // ==== Builder ====
    #[error("Builder value is not sealed")]
    BuilderNotSealed,

    #[error("Need an open Array value for this operation")]
    NeedOpenArray,

    #[error("Need an open Object value for this operation")]
    NeedOpenObject,

    #[error("Need an open Array or Object value")]
    NeedOpenCompound,

    #[error("Need a subvalue in the current Array or Object")]
    NeedSubvalue,

    #[error("Duplicate attribute name: {0}")]
    DuplicateAttributeName(String),

    // ==== View / navigation ====
    #[error("Index out of bounds")]
    IndexOutOfBounds,

    #[error("UTF-8 decoding failed: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid value type for operation: expecting {0}")]
    InvalidValueType(&'static str),

    #[error("Number out of range")]
    NumberOutOfRange,

    #[error("Invalid attribute path")]
    InvalidAttributePath,

    #[error("Need a custom type handler to interpret a Custom value")]
    NeedCustomTypeHandler,

    // ==== Collection ====
    #[error("Maximum merge depth exceeded ({0})")]
    MaxMergeDepthExceeded(usize),
}
