use std::{any::Any, error::Error};

use crate::{ErrorCategory, StackError, StatusCode};

/// Общий интерфейс ошибок библиотеки (object-safe, хранится в
/// [`StackError`] как `dyn ErrorExt`).
pub trait ErrorExt: Error + Send + Sync + 'static {
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn category(&self) -> ErrorCategory {
        self.status_code().category()
    }

    /// Нужен для downcast из `dyn ErrorExt`.
    fn as_any(&self) -> &dyn Any;

    /// Сообщение для лога; по умолчанию - `Debug`-представление.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Поля для структурированного лога.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("category", format!("{:?}", self.category()).to_lowercase()),
            ("code", self.status_code().code().to_string()),
        ]
    }
}

/// `.context(..)` / `.with_context(..)` для любого `Result`, чья ошибка
/// сводится к [`StackError`].
pub trait ResultExt<T> {
    fn context(
        self,
        note: impl Into<String>,
    ) -> Result<T, StackError>;

    /// Заметка строится только при ошибке.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<StackError>,
{
    #[track_caller]
    fn context(
        self,
        note: impl Into<String>,
    ) -> Result<T, StackError> {
        // match, а не map_err: замыкание потеряло бы место вызова
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(note)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into().context(f())),
        }
    }
}
