//! Общие помощники интеграционных тестов.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use bytes::Bytes;
use zvalue::{
    lexicographic, push_decoder, DecodeOptions, DecoderInput, EncoderLimits, Format, Step, Value,
    ValuePull, ZvResult,
};

/// Декодирует `data`, подавая его кусками по `size` байт.
pub fn decode_chunked(
    format: Format,
    data: &[u8],
    size: usize,
) -> ZvResult<Value> {
    decode_chunked_with(format, data, size, DecodeOptions::default())
}

pub fn decode_chunked_with(
    format: Format,
    data: &[u8],
    size: usize,
    options: DecodeOptions,
) -> ZvResult<Value> {
    let out = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&out);
    let mut decoder = push_decoder(
        format,
        move |v| {
            *slot.borrow_mut() = Some(v);
            Ok(())
        },
        options,
    );
    for chunk in data.chunks(size.max(1)) {
        let mut input = DecoderInput::new(Bytes::copy_from_slice(chunk));
        if decoder.push_input(&mut input)? == Step::Done {
            break;
        }
    }
    if !decoder.is_complete() {
        decoder.push_input(&mut DecoderInput::end_of_input())?;
    }
    let root = out.borrow_mut().take().expect("root value announced");
    root.take_final(lexicographic)
}

/// Кодирует значение, собирая вывод по кускам.
pub fn encode_chunks(
    format: Format,
    value: &Value,
    limits: EncoderLimits,
) -> ZvResult<Vec<Bytes>> {
    let stream = zvalue::pull_encode(&ValuePull::from(value), format, limits)?;
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.pull()? {
        chunks.push(chunk);
    }
    Ok(chunks)
}

pub fn concat(chunks: &[Bytes]) -> Vec<u8> {
    chunks.iter().flat_map(|c| c.iter().copied()).collect()
}
