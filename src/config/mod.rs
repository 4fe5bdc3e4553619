//! Параметры кодеков по умолчанию, загружаемые из окружения.

mod settings;

pub use settings::CodecSettings;
