use std::{error::Error, fmt, panic::Location, sync::Arc};

use crate::{ErrorCategory, ErrorExt, LogLevel, StatusCode};

/// Ошибка кодека: корневая причина плюс след из заметок, оставленных по
/// пути наверх (узел декодера, элемент массива, точка входа API).
///
/// Корень разделяется через `Arc`, так что клон не копирует саму ошибку.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    trail: Vec<Frame>,
}

/// Заметка в следе и место в исходниках, где её добавили.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub note: String,
    pub location: &'static Location<'static>,
}

impl Frame {
    #[track_caller]
    fn here(note: String) -> Self {
        Self {
            note,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.note,
            self.location.file(),
            self.location.line()
        )
    }
}

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            trail: Vec::new(),
        }
    }

    /// Добавляет заметку во внешний конец следа.
    #[track_caller]
    pub fn context(
        mut self,
        note: impl Into<String>,
    ) -> Self {
        self.trail.push(Frame::here(note.into()));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    pub fn category(&self) -> ErrorCategory {
        self.root.category()
    }

    /// Ошибка пришла от потребителя данных (и может быть перехвачена).
    pub fn is_sink(&self) -> bool {
        self.category() == ErrorCategory::Sink
    }

    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    pub fn root(&self) -> &dyn ErrorExt {
        self.root.as_ref()
    }

    /// Заметки от внутренней к внешней.
    pub fn trail(&self) -> &[Frame] {
        &self.trail
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }

    /// Подробная строка для лога: код, корень и след с местами в исходниках.
    pub fn report(&self) -> String {
        let mut out = format!("[{}] {}", self.status_code(), self.root.log_message());
        for frame in self.trail.iter().rev() {
            out.push_str("\n  in ");
            out.push_str(&frame.to_string());
        }
        out
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StackError")
            .field("code", &self.status_code())
            .field("root", &self.root.to_string())
            .field("trail", &self.trail)
            .finish()
    }
}

/// `внешняя: ...: внутренняя: корень`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for frame in self.trail.iter().rev() {
            write!(f, "{}: ", frame.note)?;
        }
        fmt::Display::fmt(&self.root, f)
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}
