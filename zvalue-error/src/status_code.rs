use std::fmt;

use num_enum::TryFromPrimitive;

/// Числовой код ошибки кодека.
///
/// Сотня кода задаёт группу (см. [`StatusCode::category`]):
/// 1xx - вызовы API, 2xx - значения, 3xx - данные на проводе,
/// 4xx - контракт потоков, 5xx - потребитель, 6xx - zlib.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u16)]
#[non_exhaustive]
pub enum StatusCode {
    Internal = 100,
    InvalidArgs = 101,
    Unsupported = 102,

    TypeError = 200,
    InvalidValue = 201,
    InvalidData = 202,

    UnexpectedEof = 300,
    ParseError = 301,
    InvalidUtf8 = 302,
    InvalidFloat = 303,
    InvalidBase64 = 304,
    InvalidReference = 305,

    ProtocolViolation = 400,
    SizeMismatch = 401,
    HandlerConflict = 402,

    SinkFailed = 500,

    CorruptedData = 600,
    CompressionFailed = 601,
}

/// Уровень, на котором ошибку стоит логировать.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Категория ошибки с точки зрения сессии декодирования.
///
/// Обработчик исключений сессии вправе перехватывать только
/// [`ErrorCategory::Sink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Некорректные, обрезанные или неподдерживаемые данные на входе.
    Parse,
    /// Нарушен внутренний контракт потоков (ошибка программиста).
    Protocol,
    /// Ошибка, выброшенная потребителем декодированных данных.
    Sink,
    /// Сбой движка deflate/inflate.
    Compression,
    Other,
}

impl StatusCode {
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::try_from(code).ok()
    }

    pub fn category(self) -> ErrorCategory {
        match self.code() / 100 {
            3 => ErrorCategory::Parse,
            4 => ErrorCategory::Protocol,
            5 => ErrorCategory::Sink,
            6 => ErrorCategory::Compression,
            _ => ErrorCategory::Other,
        }
    }

    /// Плохой вход - забота вызывающего, поэтому `Warn`; нарушенный контракт
    /// и сбой zlib - `Error`.
    pub fn log_level(self) -> LogLevel {
        match self.category() {
            ErrorCategory::Protocol | ErrorCategory::Compression => LogLevel::Error,
            ErrorCategory::Parse | ErrorCategory::Sink => LogLevel::Warn,
            ErrorCategory::Other => match self {
                Self::Internal => LogLevel::Error,
                Self::InvalidArgs => LogLevel::Info,
                _ => LogLevel::Debug,
            },
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Z{}/{:?}", self.code(), self)
    }
}
