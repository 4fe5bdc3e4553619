//! Точки входа: кодирование и декодирование целых значений, потоковые
//! построители и варианты со сжатием.

use std::{cell::RefCell, fmt, rc::Rc};

use bytes::Bytes;
use tracing::warn;
use zvalue_error::{ParseError, ResultExt, ZvResult};

use crate::{
    codec::{amf3, cbor, json, DecodeOptions, DecoderInput, EncoderLimits, PushDecoder, Step},
    compression::{self, is_compressed},
    stream::{convert::pull_binary, BinaryPull, BinaryPush, Convert, StringPull, ValuePull, ValuePush},
    value::{lexicographic, Value},
};

/// Формат сериализации.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Cbor,
    Amf3,
}

impl Format {
    /// Угадывает формат по первому байту: меньше 32 - AMF3, от 128 - CBOR,
    /// остальное - JSON.
    pub fn detect(first: u8) -> Self {
        match first {
            0..=31 => Self::Amf3,
            128..=255 => Self::Cbor,
            _ => Self::Json,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Cbor => "cbor",
            Self::Amf3 => "amf3",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn encode_json(value: &Value) -> ZvResult<String> {
    pull_encode_json(&ValuePull::from(value), EncoderLimits::default())?.pull_final()
}

pub fn encode_cbor(value: &Value) -> ZvResult<Bytes> {
    pull_encode_cbor(&ValuePull::from(value), EncoderLimits::default())?.pull_final()
}

pub fn encode_amf3(value: &Value) -> ZvResult<Bytes> {
    pull_encode_amf3(&ValuePull::from(value), EncoderLimits::default(), false)?.pull_final()
}

/// Кодирует значение в выбранный формат и сжимает результат.
pub fn encode_compressed(
    value: &Value,
    format: Format,
) -> ZvResult<Bytes> {
    let plain = pull_encode(&ValuePull::from(value), format, EncoderLimits::default())?;
    compression::pull_deflate(&plain, compression::DEFAULT_BUFFER_SIZE).pull_final()
}

pub fn decode_json(data: impl Into<Bytes>) -> ZvResult<Value> {
    decode(Format::Json, data.into())
}

pub fn decode_cbor(data: impl Into<Bytes>) -> ZvResult<Value> {
    decode(Format::Cbor, data.into())
}

pub fn decode_amf3(data: impl Into<Bytes>) -> ZvResult<Value> {
    decode(Format::Amf3, data.into())
}

/// Декодирует AMF3, CBOR или JSON, выбирая формат по первому байту.
///
/// CBOR распознаётся по старшему биту, поэтому скаляры и строки CBOR
/// должны идти с тегом (например, с префиксом `d9 d9 f7`).
pub fn decode_any(data: impl Into<Bytes>) -> ZvResult<Value> {
    let data = data.into();
    let Some(&first) = data.first() else {
        return Err(ParseError::Truncated { what: "input" }.into());
    };
    decode(Format::detect(first), data)
}

/// Как [`decode_any`], но сначала снимает сжатие zlib (возможно,
/// многократное).
pub fn decode_auto(data: impl Into<Bytes>) -> ZvResult<Value> {
    let mut data = data.into();
    while data.len() >= 2 && is_compressed(data[0], data[1]) {
        data = compression::inflate(&data)?;
    }
    decode_any(data)
}

fn decode(
    format: Format,
    data: Bytes,
) -> ZvResult<Value> {
    let slot = Rc::new(RefCell::new(None));
    let out = Rc::clone(&slot);
    let mut decoder = push_decoder(
        format,
        move |value| {
            *out.borrow_mut() = Some(value);
            Ok(())
        },
        DecodeOptions::default(),
    );
    let mut input = DecoderInput::new(data);
    let step = decoder
        .push_input(&mut input)
        .with_context(|| format!("decode_{format}"))?;
    if step == Step::NeedMore {
        decoder
            .push_input(&mut DecoderInput::end_of_input())
            .with_context(|| format!("decode_{format}"))?;
    } else if !input.remaining().is_empty() {
        warn!(
            "decode_{format}: {} bytes after value ignored",
            input.remaining().len()
        );
    }
    let value = slot.borrow_mut().take();
    match value {
        Some(value) => value.take_final(lexicographic),
        None => Err(ParseError::Truncated { what: format.name() }.into()),
    }
}

/// Pull-энкодер для `format`; текст JSON отдаётся как байты UTF-8.
pub fn pull_encode(
    value: &ValuePull,
    format: Format,
    limits: EncoderLimits,
) -> ZvResult<BinaryPull> {
    match format {
        Format::Json => {
            let text = pull_encode_json(value, limits)?;
            pull_binary(&ValuePull::String(text), Convert::Cast)
        }
        Format::Cbor => pull_encode_cbor(value, limits),
        Format::Amf3 => pull_encode_amf3(value, limits, false),
    }
}

pub fn pull_encode_json(
    value: &ValuePull,
    limits: EncoderLimits,
) -> ZvResult<StringPull> {
    json::pull_encoder(value, limits)
}

pub fn pull_encode_cbor(
    value: &ValuePull,
    limits: EncoderLimits,
) -> ZvResult<BinaryPull> {
    cbor::pull_encoder(value, limits)
}

/// С `chunked` вывод делится на куски с двухбайтовой длиной и
/// завершается куском нулевой длины.
pub fn pull_encode_amf3(
    value: &ValuePull,
    limits: EncoderLimits,
    chunked: bool,
) -> ZvResult<BinaryPull> {
    amf3::pull_encoder(value, limits, chunked)
}

/// Pull-энкодер со сжатием вывода.
pub fn pull_encode_compressed(
    value: &ValuePull,
    format: Format,
    limits: EncoderLimits,
    deflate_buffer_size: usize,
) -> ZvResult<BinaryPull> {
    let plain = pull_encode(value, format, limits)?;
    Ok(compression::pull_deflate(&plain, deflate_buffer_size))
}

/// Push-декодер для `format`.
pub fn push_decoder(
    format: Format,
    output: impl FnOnce(ValuePush) -> ZvResult<()> + 'static,
    options: DecodeOptions,
) -> PushDecoder {
    let output = Box::new(output);
    match format {
        Format::Json => json::push_decoder(output, options),
        Format::Cbor => cbor::push_decoder(output, options),
        Format::Amf3 => amf3::push_decoder(output, options),
    }
}

pub fn push_decode_json(
    output: impl FnOnce(ValuePush) -> ZvResult<()> + 'static,
    options: DecodeOptions,
) -> PushDecoder {
    push_decoder(Format::Json, output, options)
}

pub fn push_decode_cbor(
    output: impl FnOnce(ValuePush) -> ZvResult<()> + 'static,
    options: DecodeOptions,
) -> PushDecoder {
    push_decoder(Format::Cbor, output, options)
}

pub fn push_decode_amf3(
    output: impl FnOnce(ValuePush) -> ZvResult<()> + 'static,
    options: DecodeOptions,
) -> PushDecoder {
    push_decoder(Format::Amf3, output, options)
}

/// Поток для сжатых данных: куски распаковываются и передаются
/// push-декодеру `format`. Конец потока обязателен.
pub fn push_decode_compressed(
    format: Format,
    output: impl FnOnce(ValuePush) -> ZvResult<()> + 'static,
    options: DecodeOptions,
    inflate_buffer_size: usize,
) -> ZvResult<BinaryPush> {
    let mut decoder = push_decoder(format, output, options);
    let plain = BinaryPush::new();
    plain.set_value_handler(move |item: Option<Bytes>| {
        let mut input = match item {
            Some(chunk) => DecoderInput::new(chunk),
            None => DecoderInput::end_of_input(),
        };
        if decoder.is_complete() {
            if !input.remaining().is_empty() {
                warn!(
                    "push_decode_{format}: {} bytes after value ignored",
                    input.remaining().len()
                );
            }
            return Ok(());
        }
        if decoder.push_input(&mut input)? == Step::Done && !input.remaining().is_empty() {
            warn!(
                "push_decode_{format}: {} bytes after value ignored",
                input.remaining().len()
            );
        }
        Ok(())
    })?;
    compression::push_inflate(plain, inflate_buffer_size)
}
