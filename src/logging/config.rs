use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};

/// Формат вывода fmt-слоя.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Директива фильтра (`info`, `zvalue=debug,warn`, ...).
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Цвета в выводе.
    #[serde(default = "default_true")]
    pub ansi: bool,
    #[serde(default = "default_true")]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            ansi: true,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Умолчания, поверх них - переменные `ZVALUE_LOG_*`
    /// (`ZVALUE_LOG_LEVEL`, `ZVALUE_LOG_FORMAT`, `ZVALUE_LOG_ANSI`).
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .set_default("level", default_level())?
            .set_default("format", "compact")?
            .set_default("ansi", true)?
            .set_default("with_target", true)?
            .add_source(Environment::with_prefix("ZVALUE_LOG").try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn build_filter_directive(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            default_level()
        } else {
            level.to_string()
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    fn clear() {
        for var in ["ZVALUE_LOG_LEVEL", "ZVALUE_LOG_FORMAT", "ZVALUE_LOG_ANSI"] {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear();
        assert_eq!(LoggingConfig::load().unwrap(), LoggingConfig::default());
    }

    /// Тест проверяет чтение формата и уровня из окружения.
    #[test]
    #[serial]
    fn test_load_from_env() {
        clear();
        env::set_var("ZVALUE_LOG_LEVEL", "zvalue=debug");
        env::set_var("ZVALUE_LOG_FORMAT", "json");
        env::set_var("ZVALUE_LOG_ANSI", "false");
        let cfg = LoggingConfig::load();
        clear();
        let cfg = cfg.unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.ansi);
        assert_eq!(cfg.build_filter_directive(), "zvalue=debug");
    }

    #[test]
    fn test_blank_level_falls_back() {
        let cfg = LoggingConfig {
            level: "  ".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(cfg.build_filter_directive(), "info");
    }
}
