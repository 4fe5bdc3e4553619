//! Настройка `tracing-subscriber`: фильтр уровней и fmt-слой.

pub mod config;
mod filters;
mod formatter;

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zvalue_error::{GenericError, StatusCode, ZvResult};

pub use config::{LogFormat, LoggingConfig};

/// Устанавливает глобальный subscriber с выводом в stdout.
///
/// Повторный вызов возвращает ошибку: subscriber уже установлен.
pub fn init_logging(config: &LoggingConfig) -> ZvResult<()> {
    let env_filter = filters::build_filter_from_config(config);
    let layer = formatter::build_formatter_from_config(config, io::stdout);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| GenericError::new(StatusCode::Internal, e.to_string()))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}
