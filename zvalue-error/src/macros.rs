//! `bail!`, `ensure!` и `context!`.
//!
//! Форма с кодом (`bail!(StatusCode::InvalidArgs, "bad size {}", n)`) строит
//! [`GenericError`](crate::GenericError); форма с одним выражением принимает
//! любую ошибку, которая сводится к [`StackError`](crate::StackError).

/// Возвращает `Err` из текущей функции.
#[macro_export]
macro_rules! bail {
    ($err:expr $(,)?) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $($fmt:tt)+) => {
        return Err($crate::StackError::new($crate::GenericError::new(
            $code,
            format!($($fmt)+),
        )))
    };
}

/// `bail!` с теми же аргументами, если условие ложно.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($rest:tt)+) => {
        if !($cond) {
            $crate::bail!($($rest)+);
        }
    };
}

/// Добавляет к ошибке `Result` форматированную заметку.
#[macro_export]
macro_rules! context {
    ($result:expr, $($fmt:tt)+) => {
        match $result {
            Ok(v) => Ok(v),
            Err(e) => Err($crate::StackError::from(e).context(format!($($fmt)+))),
        }
    };
}
