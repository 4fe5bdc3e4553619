use serde::{Deserialize, Serialize};

use config::{Config, ConfigError, Environment};
use zvalue_error::{ensure, ProtocolViolation, ZvResult};

use crate::codec::{DecodeOptions, EncoderLimits};

/// Настройки кодеков.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    /// Размер выходного буфера pull-энкодеров.
    pub buffer_size: usize,
    /// Фрагменты от этого размера отдаются без копирования.
    pub copy_threshold: usize,
    pub deflate_buffer_size: usize,
    /// Кадрирование вывода AMF3 кусками с длиной.
    pub amf3_chunked: bool,
    pub amf3_object_refs: bool,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            copy_threshold: 512,
            deflate_buffer_size: 1024,
            amf3_chunked: false,
            amf3_object_refs: true,
        }
    }
}

impl CodecSettings {
    /// Значения по умолчанию, поверх них - переменные `ZVALUE_*`
    /// (например, `ZVALUE_BUFFER_SIZE=4096`).
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let cfg = Config::builder()
            .set_default("buffer_size", defaults.buffer_size as u64)?
            .set_default("copy_threshold", defaults.copy_threshold as u64)?
            .set_default("deflate_buffer_size", defaults.deflate_buffer_size as u64)?
            .set_default("amf3_chunked", defaults.amf3_chunked)?
            .set_default("amf3_object_refs", defaults.amf3_object_refs)?
            .add_source(Environment::with_prefix("ZVALUE").try_parsing(true))
            .build()?;

        cfg.try_deserialize()
    }

    pub fn validate(&self) -> ZvResult<()> {
        ensure!(
            self.copy_threshold <= self.buffer_size,
            ProtocolViolation::InvalidConfig {
                reason: format!(
                    "copy threshold {} exceeds buffer size {}",
                    self.copy_threshold, self.buffer_size
                ),
            }
        );
        ensure!(
            self.deflate_buffer_size > 0,
            ProtocolViolation::InvalidConfig {
                reason: "deflate buffer size must be positive".to_string(),
            }
        );
        Ok(())
    }

    pub fn limits(&self) -> EncoderLimits {
        EncoderLimits::new(self.buffer_size, self.copy_threshold)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::default().with_object_refs(self.amf3_object_refs)
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use serial_test::serial;

    use super::*;

    const VARS: [&str; 3] = ["ZVALUE_BUFFER_SIZE", "ZVALUE_AMF3_CHUNKED", "ZVALUE_COPY_THRESHOLD"];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    /// Тест проверяет значения по умолчанию без переменных окружения.
    #[test]
    #[serial]
    fn test_load_defaults() {
        clear();
        let settings = CodecSettings::load().unwrap();
        assert_eq!(settings, CodecSettings::default());
        assert_eq!(settings.limits(), EncoderLimits::default());
        assert!(settings.decode_options().allow_object_refs);
    }

    /// Тест проверяет, что переменные `ZVALUE_*` перекрывают умолчания.
    #[test]
    #[serial]
    fn test_load_from_env() {
        clear();
        env::set_var("ZVALUE_BUFFER_SIZE", "4096");
        env::set_var("ZVALUE_AMF3_CHUNKED", "true");
        let settings = CodecSettings::load();
        clear();
        let settings = settings.unwrap();
        assert_eq!(settings.buffer_size, 4096);
        assert!(settings.amf3_chunked);
        assert_eq!(settings.copy_threshold, 512);
    }

    #[test]
    #[serial]
    fn test_validate() {
        clear();
        env::set_var("ZVALUE_COPY_THRESHOLD", "10000");
        let settings = CodecSettings::load();
        clear();
        let err = settings.unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("copy threshold"), "{err}");

        let zero = CodecSettings {
            deflate_buffer_size: 0,
            ..CodecSettings::default()
        };
        assert!(zero.validate().is_err());
        assert!(CodecSettings::default().validate().is_ok());
    }
}
