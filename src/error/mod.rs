//! Ошибки кодеков и потоков (крейт `zvalue-error`).

pub use zvalue_error::{
    CompressionError, CompressionOp, ErrorCategory, ErrorExt, GenericError, ParseError,
    ProtocolViolation, ResultExt, SinkError, StackError, StatusCode, ValueError, ZvResult,
};
