//! Инкрементальная сериализация значений в CBOR, AMF3 и JSON.
//!
//! Декодеры принимают вход кусками (push) и отдают дерево значений по мере
//! разбора, энкодеры производят вывод по запросу потребителя (pull), не
//! материализуя его целиком. Поверх - сжатие zlib и автоопределение
//! формата.

/// Точки входа: `encode_*`, `decode_*`, `decode_any`, `decode_auto`.
pub mod api;
/// Push-декодеры и pull-энкодеры форматов.
pub mod codec;
/// Сжатие zlib.
pub mod compression;
/// Параметры кодеков из окружения.
pub mod config;
/// Ошибки.
pub mod error;
/// Настройка логирования.
pub mod logging;
/// Pull/push-потоки и потоковые значения.
pub mod stream;
/// Материализованные значения.
pub mod value;

// -----------------------------------------------------------------------------
//  Часто используемые типы
// -----------------------------------------------------------------------------

pub use api::{
    decode_amf3, decode_any, decode_auto, decode_cbor, decode_json, encode_amf3, encode_cbor,
    encode_compressed, encode_json, pull_encode, pull_encode_amf3, pull_encode_cbor,
    pull_encode_compressed, pull_encode_json, push_decode_amf3, push_decode_cbor,
    push_decode_compressed, push_decode_json, push_decoder, Format,
};
pub use codec::{DecodeOptions, DecoderInput, EncoderLimits, PushDecoder, Step};
pub use compression::{deflate, inflate, is_compressed};
pub use config::CodecSettings;
pub use error::{StackError, ZvResult};
pub use logging::{init_logging, LoggingConfig};
pub use stream::{
    BinaryPull, BinaryPush, Convert, FormatOptions, PullStream, PushStream, StringPull,
    StringPush, ValuePull, ValuePush,
};
pub use value::{lexicographic, KeyCompare, Object, Value};
