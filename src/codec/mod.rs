//! Форматы сериализации: push-декодеры и pull-энкодеры.
//!
//! Декодер получает вход кусками через [`PushDecoder::push_input`] и
//! отдаёт корневое значение потребителю, как только известен его тип.
//! Энкодер - это pull-поток байтов, который заполняет буфер фиксированного
//! размера, а крупные фрагменты отдаёт без копирования.

pub mod amf3;
pub mod cbor;
pub mod input;
pub mod json;
pub mod output;

pub use input::{
    DecodeOptions, DecoderInput, ExceptionHandler, OutputFn, PushDecoder, Step,
};
pub use output::EncoderLimits;
