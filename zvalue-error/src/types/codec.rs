use std::{any::Any, fmt};

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибка разбора данных на проводе.
///
/// Всегда пробрасывается вызывающему, повторных попыток внутри кодеков нет.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Вход закончился посреди значения
    #[error("premature end of {what}")]
    Truncated { what: &'static str },

    /// Недопустимое кодирование длины/аргумента
    #[error("invalid {what} length encoding")]
    InvalidLength { what: &'static str },

    #[error("cbor float16 values are not supported")]
    Float16Unsupported,

    #[error("unknown cbor simple value {value}")]
    UnknownSimple { value: u8 },

    /// Внутри строки/бинаря неопределённой длины встретился чужой тип
    #[error("expected cbor chunk, got major type {major}")]
    UnexpectedChunk { major: u8 },

    #[error("object key must be a string, got {type_name}")]
    NonStringKey { type_name: &'static str },

    #[error("invalid {format} marker 0x{marker:02x}")]
    InvalidMarker { format: &'static str, marker: u8 },

    #[error("unsupported {format} type: {what}")]
    Unsupported {
        format: &'static str,
        what: &'static str,
    },

    #[error("invalid {table} reference {index}")]
    InvalidReference { table: &'static str, index: usize },

    /// Ссылка на объект, чьё декодирование ещё не завершено
    #[error("possible recursive reference to object {index}")]
    RecursiveReference { index: usize },

    #[error("reference type mismatch: expected {expected}, found {found}")]
    WrongReferenceType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unrecognized externalizable object '{class_name}'")]
    UnknownExternalizable { class_name: String },

    #[error("amf3 associative arrays are not supported")]
    SparseArray,

    #[error("invalid UTF-8 in {context}")]
    InvalidUtf8 { context: &'static str },

    #[error("invalid base64: {reason}")]
    InvalidBase64 { reason: String },

    #[error("invalid json: {reason}")]
    InvalidJson { reason: &'static str },

    #[error("invalid number '{text}'")]
    InvalidNumber { text: String },
}

/// Нарушение внутреннего контракта потоков или энкодеров.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolViolation {
    #[error("final size already set to {current}, cannot change it to {requested}")]
    FinalSizeConflict { current: usize, requested: usize },

    /// Поток уже выдал больше элементов, чем объявлено
    #[error("too many elements: {got} exceeds declared size {limit}")]
    SizeExceeded { limit: usize, got: usize },

    #[error("stream ended after {got} elements, declared size is {expected}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("{what} handler already attached")]
    HandlerAttached { what: &'static str },

    #[error("{op} on a finished stream")]
    AlreadyFinal { op: &'static str },

    #[error("stream is not final")]
    NotFinal,

    #[error("invalid codec configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("value cannot be encoded: {reason}")]
    Unencodable { reason: &'static str },
}

/// Ошибка доступа к значению не того типа.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("expected {expected} but found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Ошибка, выброшенная потребителем декодированных данных.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("sink error: {message}")]
pub struct SinkError {
    pub message: String,
}

/// Направление работы движка сжатия.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOp {
    Deflate,
    Inflate,
}

/// Сбой deflate/inflate. Всегда фатален для конвейера.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompressionError {
    #[error("{op} failed: {reason}")]
    Engine { op: CompressionOp, reason: String },

    #[error("premature end of {op} stream")]
    PrematureEnd { op: CompressionOp },
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl CompressionError {
    pub fn op(&self) -> CompressionOp {
        match self {
            Self::Engine { op, .. } | Self::PrematureEnd { op } => *op,
        }
    }
}

impl fmt::Display for CompressionOp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Deflate => f.write_str("deflate"),
            Self::Inflate => f.write_str("inflate"),
        }
    }
}

impl ErrorExt for ParseError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Truncated { .. } => StatusCode::UnexpectedEof,
            Self::Float16Unsupported
            | Self::Unsupported { .. }
            | Self::UnknownExternalizable { .. }
            | Self::SparseArray => StatusCode::Unsupported,
            Self::InvalidReference { .. }
            | Self::RecursiveReference { .. }
            | Self::WrongReferenceType { .. } => StatusCode::InvalidReference,
            Self::InvalidUtf8 { .. } => StatusCode::InvalidUtf8,
            Self::InvalidBase64 { .. } => StatusCode::InvalidBase64,
            Self::InvalidNumber { .. } => StatusCode::InvalidFloat,
            _ => StatusCode::ParseError,
        }
    }

    fn category(&self) -> crate::ErrorCategory {
        crate::ErrorCategory::Parse
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "parse".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::InvalidMarker { format, marker } => {
                tags.push(("format", format.to_string()));
                tags.push(("marker", format!("0x{marker:02x}")));
            }
            Self::Unsupported { format, .. } => {
                tags.push(("format", format.to_string()));
            }
            _ => {}
        }

        tags
    }
}

impl ErrorExt for ProtocolViolation {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::FinalSizeConflict { .. }
            | Self::SizeExceeded { .. }
            | Self::SizeMismatch { .. } => StatusCode::SizeMismatch,
            Self::HandlerAttached { .. } => StatusCode::HandlerConflict,
            Self::InvalidConfig { .. } => StatusCode::InvalidArgs,
            Self::Unencodable { .. } => StatusCode::InvalidValue,
            Self::AlreadyFinal { .. } | Self::NotFinal => StatusCode::ProtocolViolation,
        }
    }

    fn category(&self) -> crate::ErrorCategory {
        crate::ErrorCategory::Protocol
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for ValueError {
    fn status_code(&self) -> StatusCode {
        StatusCode::TypeError
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for SinkError {
    fn status_code(&self) -> StatusCode {
        StatusCode::SinkFailed
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ErrorExt for CompressionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Engine { .. } => StatusCode::CompressionFailed,
            Self::PrematureEnd { .. } => StatusCode::CorruptedData,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "compression".to_string()),
            ("status_code", self.status_code().to_string()),
            ("op", self.op().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    /// Тест проверяет, что все ошибки разбора попадают в категорию Parse,
    /// даже если их код относится к общим (`Unsupported`).
    #[test]
    fn test_parse_errors_are_parse_category() {
        let cases = [
            ParseError::Float16Unsupported,
            ParseError::SparseArray,
            ParseError::Truncated { what: "u29" },
            ParseError::RecursiveReference { index: 3 },
        ];
        for e in cases {
            assert_eq!(e.category(), ErrorCategory::Parse, "{e}");
        }
        assert_eq!(
            ParseError::Float16Unsupported.status_code(),
            StatusCode::Unsupported
        );
    }

    /// Тест проверяет категории остальных ошибок таксономии.
    #[test]
    fn test_other_categories() {
        assert_eq!(
            ProtocolViolation::NotFinal.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            ProtocolViolation::InvalidConfig {
                reason: "buffer".into()
            }
            .category(),
            ErrorCategory::Protocol
        );
        assert_eq!(SinkError::new("x").category(), ErrorCategory::Sink);
        assert_eq!(
            ValueError::TypeMismatch {
                expected: "integer",
                found: "string"
            }
            .category(),
            ErrorCategory::Other
        );
        assert_eq!(
            CompressionError::PrematureEnd {
                op: CompressionOp::Inflate
            }
            .category(),
            ErrorCategory::Compression
        );
    }

    /// Тест проверяет тексты сообщений, на которые опираются логи.
    #[test]
    fn test_messages() {
        assert_eq!(
            ParseError::InvalidMarker {
                format: "amf3",
                marker: 0x0d
            }
            .to_string(),
            "invalid amf3 marker 0x0d"
        );
        assert_eq!(
            ProtocolViolation::SizeExceeded { limit: 2, got: 3 }.to_string(),
            "too many elements: 3 exceeds declared size 2"
        );
        assert_eq!(
            CompressionError::PrematureEnd {
                op: CompressionOp::Inflate
            }
            .to_string(),
            "premature end of inflate stream"
        );
    }

    #[test]
    fn test_marker_tags() {
        let tags = ParseError::InvalidMarker {
            format: "amf3",
            marker: 0x07,
        }
        .metrics_tags();
        assert!(tags.contains(&("marker", "0x07".to_string())));
    }
}
