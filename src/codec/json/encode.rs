//! Pull-энкодер JSON.

use bytes::Bytes;
use zvalue_error::ZvResult;

use crate::{
    codec::output::{ByteSource, Carry, EncoderLimits, Fit},
    stream::{
        base64_stream::Base64Encoder, ArrayPull, ObjectPull, PullSource, StringPull, ValuePull,
    },
    value::number::write_json_real,
};

const MIN_BUFFER: usize = 32;
/// Места под скаляр: самое длинное целое или вещественное число.
const VALUE_ROOM: usize = 24;
/// Хвост base64 и закрывающая кавычка.
const BINARY_TAIL: usize = 5;

fn needs_escape(b: u8) -> bool {
    b < 0x20 || b == b'"' || b == b'\\'
}

/// Экранирует байты строки. Многобайтовые последовательности UTF-8
/// проходят как есть, поэтому кусок может резать символ пополам.
fn escape_bytes(
    out: &mut Vec<u8>,
    src: &[u8],
) {
    for &b in src {
        match b {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            b if b < 0x20 => out.extend_from_slice(format!("\\u{b:04x}").as_bytes()),
            b => out.push(b),
        }
    }
}

/// Кусок строки в JSON-виде; без спецсимволов - тот же буфер.
fn escape_chunk(chunk: Bytes) -> Bytes {
    if !chunk.iter().any(|b| needs_escape(*b)) {
        return chunk;
    }
    let mut out = Vec::with_capacity(chunk.len() + chunk.len() / 10 + 1);
    escape_bytes(&mut out, &chunk);
    Bytes::from(out)
}

/// Ключ с кавычками и двоеточием.
fn key_token(key: &str) -> Bytes {
    let mut out = Vec::with_capacity(key.len() + 3);
    out.push(b'"');
    escape_bytes(&mut out, key.as_bytes());
    out.extend_from_slice(b"\":");
    Bytes::from(out)
}

/// Строка в кавычках либо бинарные данные в base64.
struct TextState {
    source: ByteSource,
    base64: Option<Base64Encoder>,
    started: bool,
    ended: bool,
    carry: Carry,
}

impl TextState {
    fn new(source: ByteSource) -> Self {
        let base64 = match source {
            ByteSource::Binary(_) => Some(Base64Encoder::default()),
            ByteSource::String(_) => None,
        };
        Self {
            source,
            base64,
            started: false,
            ended: false,
            carry: Carry::default(),
        }
    }

    fn tail_room(&self) -> usize {
        if self.base64.is_some() {
            BINARY_TAIL
        } else {
            1
        }
    }

    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            dest.push(b'"');
        }
        let tail = self.tail_room();
        let Self {
            source,
            base64,
            ended,
            carry,
            ..
        } = self;
        while !*ended {
            let next = carry.next(|| {
                let Some(chunk) = source.pull()? else {
                    return Ok(None);
                };
                Ok(Some(match base64.as_mut() {
                    Some(encoder) => Bytes::from(encoder.update(&chunk)),
                    None => escape_chunk(chunk),
                }))
            })?;
            let Some((chunk, retried)) = next else {
                *ended = true;
                break;
            };
            match carry.place(dest, dest_size, copy_threshold, chunk, retried) {
                Fit::Copied => {
                    if dest.len() + tail > dest_size {
                        return Ok((None, false));
                    }
                }
                Fit::Deferred => return Ok((None, false)),
                Fit::Moved(chunk) => return Ok((Some(chunk), false)),
            }
        }
        if dest.len() + tail > dest_size {
            return Ok((None, false));
        }
        if let Some(encoder) = base64 {
            dest.extend_from_slice(encoder.finish().as_bytes());
        }
        dest.push(b'"');
        Ok((None, true))
    }
}

struct ArrayState {
    stream: ArrayPull,
    started: bool,
    child: Option<Box<JsonNode>>,
}

impl ArrayState {
    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.child = self.stream.pull()?.map(|v| Box::new(JsonNode::new(&v)));
            self.started = true;
            dest.push(b'[');
        }
        while let Some(child) = self.child.as_mut() {
            if !child.complete {
                if dest.len() + VALUE_ROOM > dest_size {
                    return Ok((None, false));
                }
                let moved = child.pull(dest, dest_size, copy_threshold)?;
                if moved.is_some() || !child.complete {
                    return Ok((moved, false));
                }
            }
            if dest.len() >= dest_size {
                return Ok((None, false));
            }
            match self.stream.pull()? {
                Some(value) => {
                    self.child = Some(Box::new(JsonNode::new(&value)));
                    dest.push(b',');
                }
                None => self.child = None,
            }
        }
        if dest.len() >= dest_size {
            return Ok((None, false));
        }
        dest.push(b']');
        Ok((None, true))
    }
}

struct ObjectState {
    stream: ObjectPull,
    started: bool,
    key: Option<Bytes>,
    child: Option<Box<JsonNode>>,
}

impl ObjectState {
    fn open(&mut self) -> ZvResult<bool> {
        match self.stream.pull()? {
            Some((key, value)) => {
                self.key = Some(key_token(&key));
                self.child = Some(Box::new(JsonNode::new(&value)));
                Ok(true)
            }
            None => {
                self.child = None;
                Ok(false)
            }
        }
    }

    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.open()?;
            self.started = true;
            dest.push(b'{');
        }
        while let Some(child) = self.child.as_mut() {
            if let Some(key) = self.key.take() {
                if key.len() >= copy_threshold || key.len() > dest_size {
                    return Ok((Some(key), false));
                }
                if dest.len() + key.len() > dest_size {
                    self.key = Some(key);
                    return Ok((None, false));
                }
                dest.extend_from_slice(&key);
            }
            if !child.complete {
                if dest.len() + VALUE_ROOM > dest_size {
                    return Ok((None, false));
                }
                let moved = child.pull(dest, dest_size, copy_threshold)?;
                if moved.is_some() || !child.complete {
                    return Ok((moved, false));
                }
            }
            if dest.len() >= dest_size {
                return Ok((None, false));
            }
            if self.open()? {
                dest.push(b',');
            }
        }
        if dest.len() >= dest_size {
            return Ok((None, false));
        }
        dest.push(b'}');
        Ok((None, true))
    }
}

enum State {
    Scalar(ValuePull),
    Text(TextState),
    Array(ArrayState),
    Object(ObjectState),
}

struct JsonNode {
    state: State,
    complete: bool,
}

impl JsonNode {
    fn new(value: &ValuePull) -> Self {
        let state = match value {
            ValuePull::String(s) => State::Text(TextState::new(ByteSource::String(s.clone()))),
            ValuePull::Binary(b) => State::Text(TextState::new(ByteSource::Binary(b.clone()))),
            ValuePull::Array(a) => State::Array(ArrayState {
                stream: a.clone(),
                started: false,
                child: None,
            }),
            ValuePull::Object(o) => State::Object(ObjectState {
                stream: o.clone(),
                started: false,
                key: None,
                child: None,
            }),
            scalar => State::Scalar(scalar.clone()),
        };
        Self {
            state,
            complete: false,
        }
    }

    /// Перед вызовом в `dest` должно оставаться не меньше
    /// `VALUE_ROOM` байт.
    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<Option<Bytes>> {
        let (moved, complete) = match &mut self.state {
            State::Scalar(value) => {
                match value {
                    ValuePull::Null => dest.extend_from_slice(b"null"),
                    ValuePull::Boolean(b) => {
                        dest.extend_from_slice(if *b { b"true" } else { b"false" })
                    }
                    ValuePull::Integer(i) => dest.extend_from_slice(i.to_string().as_bytes()),
                    ValuePull::Real(r) => {
                        let mut text = String::new();
                        write_json_real(&mut text, *r);
                        dest.extend_from_slice(text.as_bytes());
                    }
                    _ => {}
                }
                (None, true)
            }
            State::Text(state) => state.pull(dest, dest_size, copy_threshold)?,
            State::Array(state) => state.pull(dest, dest_size, copy_threshold)?,
            State::Object(state) => state.pull(dest, dest_size, copy_threshold)?,
        };
        self.complete = complete;
        Ok(moved)
    }
}

struct JsonEncoder {
    root: JsonNode,
    limits: EncoderLimits,
    extra: Option<Bytes>,
}

impl PullSource<Bytes> for JsonEncoder {
    fn next_item(&mut self) -> ZvResult<Option<Bytes>> {
        if let Some(extra) = self.extra.take() {
            return Ok(Some(extra));
        }
        let EncoderLimits {
            buffer_size,
            copy_threshold,
        } = self.limits;
        while !self.root.complete {
            let mut buf = Vec::with_capacity(buffer_size);
            let moved = self.root.pull(&mut buf, buffer_size, copy_threshold)?;
            if buf.is_empty() {
                if moved.is_some() {
                    return Ok(moved);
                }
                continue;
            }
            self.extra = moved;
            return Ok(Some(Bytes::from(buf)));
        }
        Ok(None)
    }
}

/// Кодирует значение в JSON по мере чтения результата. Бинарные данные
/// записываются строкой base64, NaN - как `null`.
pub fn pull_encoder(
    value: &ValuePull,
    limits: EncoderLimits,
) -> ZvResult<StringPull> {
    limits.validate("json", MIN_BUFFER)?;
    let encoder = JsonEncoder {
        root: JsonNode::new(value),
        limits,
        extra: None,
    };
    Ok(StringPull::from_source(encoder))
}
