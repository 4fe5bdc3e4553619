//! Доступ к потокам по ожидаемому типу с преобразованием string <-> binary.

use bytes::Bytes;
use zvalue_error::{ValueError, ZvResult};

use super::{
    base64_stream::{Base64Decoder, Base64Encoder},
    ArrayPull, ArrayPush, BinaryPull, BinaryPush, ObjectPull, ObjectPush, StringPull, StringPush,
    ValuePull, ValuePush,
};

/// Способ превращения строки в бинарные данные и обратно.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Convert {
    /// Тип должен совпадать.
    #[default]
    None,
    /// Байты переносятся как есть.
    Cast,
    /// Бинарные данные представлены строкой base64.
    Base64,
}

fn mismatch(
    expected: &'static str,
    found: &'static str,
) -> zvalue_error::StackError {
    ValueError::TypeMismatch { expected, found }.into()
}

/// Строковый поток из значения; бинарные данные преобразуются по `convert`.
pub fn pull_string(
    value: &ValuePull,
    convert: Convert,
) -> ZvResult<StringPull> {
    match (value, convert) {
        (ValuePull::String(s), _) => Ok(s.clone()),
        (ValuePull::Binary(b), Convert::Cast) => {
            let b = b.clone();
            Ok(StringPull::from_fn(move || b.pull()))
        }
        (ValuePull::Binary(b), Convert::Base64) => {
            let b = b.clone();
            let mut encoder = Base64Encoder::default();
            Ok(StringPull::from_fn(move || loop {
                let text = match b.pull()? {
                    Some(chunk) => encoder.update(&chunk),
                    None => {
                        let tail = encoder.finish();
                        if tail.is_empty() {
                            return Ok(None);
                        }
                        tail
                    }
                };
                if !text.is_empty() {
                    return Ok(Some(Bytes::from(text)));
                }
            }))
        }
        (other, _) => Err(mismatch("string", other.type_name())),
    }
}

/// Бинарный поток из значения; строки преобразуются по `convert`.
pub fn pull_binary(
    value: &ValuePull,
    convert: Convert,
) -> ZvResult<BinaryPull> {
    match (value, convert) {
        (ValuePull::Binary(b), _) => Ok(b.clone()),
        (ValuePull::String(s), Convert::Cast) => {
            let s = s.clone();
            Ok(BinaryPull::from_fn(move || s.pull()))
        }
        (ValuePull::String(s), Convert::Base64) => {
            let s = s.clone();
            let mut decoder = Base64Decoder::default();
            Ok(BinaryPull::from_fn(move || loop {
                let bytes = match s.pull()? {
                    Some(chunk) => decoder.update(&chunk)?,
                    None => {
                        let tail = decoder.finish()?;
                        if tail.is_empty() {
                            return Ok(None);
                        }
                        tail
                    }
                };
                if !bytes.is_empty() {
                    return Ok(Some(Bytes::from(bytes)));
                }
            }))
        }
        (other, _) => Err(mismatch("binary", other.type_name())),
    }
}

pub fn pull_array(value: &ValuePull) -> ZvResult<ArrayPull> {
    match value {
        ValuePull::Array(a) => Ok(a.clone()),
        other => Err(mismatch("array", other.type_name())),
    }
}

pub fn pull_object(value: &ValuePull) -> ZvResult<ObjectPull> {
    match value {
        ValuePull::Object(o) => Ok(o.clone()),
        other => Err(mismatch("object", other.type_name())),
    }
}

/// Строковый вход для значения: если значение бинарное, строки, записанные
/// в возвращённый поток, превращаются в бинарные данные по `convert`.
pub fn get_string_pusher(
    target: &ValuePush,
    convert: Convert,
) -> ZvResult<StringPush> {
    match (target, convert) {
        (ValuePush::String(s), _) => Ok(s.clone()),
        (ValuePush::Binary(b), Convert::Cast) => {
            let b = b.clone();
            let adapter = StringPush::new();
            adapter.set_value_handler(move |item| b.push_opt(item))?;
            Ok(adapter)
        }
        (ValuePush::Binary(b), Convert::Base64) => {
            let b = b.clone();
            let mut decoder = Base64Decoder::default();
            let adapter = StringPush::new();
            adapter.set_value_handler(move |item| match item {
                Some(text) => {
                    let bytes = decoder.update(&text)?;
                    if bytes.is_empty() {
                        return Ok(());
                    }
                    b.push(Bytes::from(bytes))
                }
                None => {
                    let tail = decoder.finish()?;
                    if !tail.is_empty() {
                        b.push(Bytes::from(tail))?;
                    }
                    b.end()
                }
            })?;
            Ok(adapter)
        }
        (other, _) => Err(mismatch("string", other.type_name())),
    }
}

/// Бинарный вход для значения: если значение строковое, бинарные данные
/// превращаются в строку по `convert`.
pub fn get_binary_pusher(
    target: &ValuePush,
    convert: Convert,
) -> ZvResult<BinaryPush> {
    match (target, convert) {
        (ValuePush::Binary(b), _) => Ok(b.clone()),
        (ValuePush::String(s), Convert::Cast) => {
            let s = s.clone();
            let adapter = BinaryPush::new();
            adapter.set_value_handler(move |item| s.push_opt(item))?;
            Ok(adapter)
        }
        (ValuePush::String(s), Convert::Base64) => {
            let s = s.clone();
            let mut encoder = Base64Encoder::default();
            let adapter = BinaryPush::new();
            adapter.set_value_handler(move |item| match item {
                Some(bytes) => {
                    let text = encoder.update(&bytes);
                    if text.is_empty() {
                        return Ok(());
                    }
                    s.push(Bytes::from(text))
                }
                None => {
                    let tail = encoder.finish();
                    if !tail.is_empty() {
                        s.push(Bytes::from(tail))?;
                    }
                    s.end()
                }
            })?;
            Ok(adapter)
        }
        (other, _) => Err(mismatch("binary", other.type_name())),
    }
}

pub fn get_array_pusher(target: &ValuePush) -> ZvResult<ArrayPush> {
    match target {
        ValuePush::Array(a) => Ok(a.clone()),
        other => Err(mismatch("array", other.type_name())),
    }
}

pub fn get_object_pusher(target: &ValuePush) -> ZvResult<ObjectPush> {
    match target {
        ValuePush::Object(o) => Ok(o.clone()),
        other => Err(mismatch("object", other.type_name())),
    }
}
