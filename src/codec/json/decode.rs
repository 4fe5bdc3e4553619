//! Инкрементальный декодер JSON.
//!
//! Разбор снисходительный: `#` открывает комментарий до конца строки,
//! запятые внутри массива и запятые с двоеточиями внутри объекта
//! считаются пробельными символами.

use bytes::Bytes;
use tracing::warn;
use zvalue_error::{ParseError, ZvResult};

use crate::{
    codec::input::{
        hex_dump, DecodeOptions, DecoderInput, OutputFn, PushDecoder, RootDecode, Sink, Step,
    },
    stream::{ArrayPush, ObjectPush, StringPush, ValuePush},
};

const FORMAT: &str = "json";
const REPLACEMENT: char = '\u{fffd}';

/// Пропуск пробелов, комментариев и разделителей.
#[derive(Default)]
struct Blank {
    comment: bool,
}

impl Blank {
    /// Останавливается на первом значимом байте; `false`, если кусок
    /// закончился раньше.
    fn skip(
        &mut self,
        input: &mut DecoderInput,
        separators: &[u8],
    ) -> bool {
        while let Some(b) = input.peek() {
            if b.is_ascii_whitespace() {
                if b == b'\n' {
                    self.comment = false;
                }
            } else if b == b'#' {
                self.comment = true;
            } else if !self.comment && !separators.contains(&b) {
                return true;
            }
            input.advance();
        }
        false
    }
}

/// Содержимое строки после открывающей кавычки.
struct StrNode {
    target: StringPush,
    /// Байты начатой escape-последовательности после `\`.
    escape: Option<Vec<u8>>,
    /// Старшая половина суррогатной пары, ждущая младшую.
    high: Option<u16>,
}

impl StrNode {
    fn new(target: StringPush) -> Self {
        Self {
            target,
            escape: None,
            high: None,
        }
    }

    /// Непарная старшая половина превращается в U+FFFD.
    fn flush_high(
        &mut self,
        text: &mut Vec<u8>,
    ) {
        if self.high.take().is_some() {
            push_char(text, REPLACEMENT);
        }
    }

    /// Применяет законченную escape-последовательность; `false`, если
    /// её байты ещё не все пришли.
    fn unescape(
        &mut self,
        text: &mut Vec<u8>,
    ) -> ZvResult<bool> {
        let Some(escape) = &self.escape else {
            return Ok(true);
        };
        if escape[0] != b'u' {
            let c = match escape[0] {
                b'b' => b'\x08',
                b'f' => b'\x0c',
                b'n' => b'\n',
                b'r' => b'\r',
                b't' => b'\t',
                other => other,
            };
            self.flush_high(text);
            text.push(c);
            self.escape = None;
            return Ok(true);
        }
        if escape.len() < 5 {
            return Ok(false);
        }
        let unit = std::str::from_utf8(&escape[1..5])
            .ok()
            .and_then(|hex| u16::from_str_radix(hex, 16).ok())
            .ok_or(ParseError::InvalidJson {
                reason: "malformed \\u escape",
            })?;
        self.escape = None;
        match unit {
            0xd800..=0xdbff => {
                self.flush_high(text);
                self.high = Some(unit);
            }
            0xdc00..=0xdfff => match self.high.take() {
                Some(high) => {
                    let code = 0x10000
                        + ((u32::from(high) - 0xd800) << 10)
                        + (u32::from(unit) - 0xdc00);
                    push_char(text, char::from_u32(code).unwrap_or(REPLACEMENT));
                }
                None => push_char(text, REPLACEMENT),
            },
            _ => {
                self.flush_high(text);
                push_char(text, char::from_u32(u32::from(unit)).unwrap_or(REPLACEMENT));
            }
        }
        Ok(true)
    }

    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "json string" }.into());
        }
        let mut text = Vec::new();
        loop {
            if let Some(escape) = &mut self.escape {
                let Some(b) = input.next_byte() else {
                    break;
                };
                escape.push(b);
                if !self.unescape(&mut text)? {
                    continue;
                }
            }
            let run = input
                .remaining()
                .iter()
                .position(|b| *b == b'"' || *b == b'\\');
            let len = run.unwrap_or(input.remaining().len());
            if len > 0 {
                self.flush_high(&mut text);
                let chunk = input.take(len);
                if text.is_empty() {
                    sink.deliver(self.target.push(chunk))?;
                } else {
                    text.extend_from_slice(&chunk);
                }
            }
            match input.next_byte() {
                Some(b'"') => {
                    self.flush_high(&mut text);
                    if !text.is_empty() {
                        sink.deliver(self.target.push(Bytes::from(text)))?;
                    }
                    sink.deliver(self.target.end())?;
                    return Ok(Step::Done);
                }
                Some(_) => self.escape = Some(Vec::with_capacity(5)),
                None => break,
            }
        }
        if !text.is_empty() {
            sink.deliver(self.target.push(Bytes::from(text)))?;
        }
        Ok(Step::NeedMore)
    }
}

fn push_char(
    text: &mut Vec<u8>,
    c: char,
) {
    let mut buf = [0u8; 4];
    text.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Элементы массива после `[`.
struct ArrayNode {
    pusher: ArrayPush,
    blank: Blank,
    child: Option<Box<ValueNode>>,
}

impl ArrayNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "json array" }.into());
        }
        loop {
            if let Some(child) = &mut self.child {
                let step = child.step(input, sink)?;
                if let Some(value) = child.take_announced() {
                    sink.deliver(self.pusher.push(value))?;
                }
                if step == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                self.child = None;
            }
            if !self.blank.skip(input, b",") {
                return Ok(Step::NeedMore);
            }
            if input.peek() == Some(b']') {
                input.advance();
                sink.deliver(self.pusher.end())?;
                return Ok(Step::Done);
            }
            self.child = Some(Box::default());
        }
    }
}

/// Пары объекта после `{`.
struct ObjectNode {
    pusher: ObjectPush,
    blank: Blank,
    key_node: Option<StrNode>,
    key: Option<String>,
    child: Option<Box<ValueNode>>,
}

impl ObjectNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "json object" }.into());
        }
        loop {
            if let Some(child) = &mut self.child {
                let step = child.step(input, sink)?;
                if let Some(value) = child.take_announced() {
                    let key = self.key.clone().unwrap_or_default();
                    sink.deliver(self.pusher.push((key, value)))?;
                }
                if step == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                self.child = None;
                self.key = None;
            }
            if let Some(key_node) = &mut self.key_node {
                if key_node.step(input, sink)? == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                self.key = Some(key_node.target.final_value()?);
                self.key_node = None;
            }
            if !self.blank.skip(input, b",:") {
                return Ok(Step::NeedMore);
            }
            match (input.peek(), &self.key) {
                (Some(b'}'), None) => {
                    input.advance();
                    sink.deliver(self.pusher.end())?;
                    return Ok(Step::Done);
                }
                (Some(b'}'), Some(_)) => {
                    return Err(ParseError::InvalidJson {
                        reason: "object key without value",
                    }
                    .into());
                }
                (Some(b'"'), None) => {
                    input.advance();
                    self.key_node = Some(StrNode::new(StringPush::new()));
                }
                (_, None) => {
                    return Err(ParseError::InvalidJson {
                        reason: "object key must be a string",
                    }
                    .into());
                }
                (_, Some(_)) => self.child = Some(Box::default()),
            }
        }
    }
}

enum Body {
    Str(StrNode),
    Array(ArrayNode),
    Object(ObjectNode),
}

impl Body {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        match self {
            Self::Str(node) => node.step(input, sink),
            Self::Array(node) => node.step(input, sink),
            Self::Object(node) => node.step(input, sink),
        }
    }
}

/// Одно значение: пропускает пробелы, по первому байту выбирает тип.
/// Скаляр без кавычек копится до разделителя или конца входа.
#[derive(Default)]
struct ValueNode {
    blank: Blank,
    scalar: Option<Vec<u8>>,
    value: Option<ValuePush>,
    announced: bool,
    body: Option<Body>,
}

impl ValueNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if let Some(body) = &mut self.body {
            return body.step(input, sink);
        }
        if self.scalar.is_none() {
            if input.is_end_of_input() {
                return Err(ParseError::Truncated { what: "json value" }.into());
            }
            if !self.blank.skip(input, b"") {
                return Ok(Step::NeedMore);
            }
            let (value, body) = match input.peek() {
                Some(b'"') => {
                    let target = StringPush::new();
                    (ValuePush::String(target.clone()), Body::Str(StrNode::new(target)))
                }
                Some(b'[') => {
                    let pusher = ArrayPush::new();
                    let body = Body::Array(ArrayNode {
                        pusher: pusher.clone(),
                        blank: Blank::default(),
                        child: None,
                    });
                    (ValuePush::Array(pusher), body)
                }
                Some(b'{') => {
                    let pusher = ObjectPush::new();
                    let body = Body::Object(ObjectNode {
                        pusher: pusher.clone(),
                        blank: Blank::default(),
                        key_node: None,
                        key: None,
                        child: None,
                    });
                    (ValuePush::Object(pusher), body)
                }
                _ => {
                    self.scalar = Some(Vec::new());
                    return self.step(input, sink);
                }
            };
            input.advance();
            self.value = Some(value);
            return self.body.insert(body).step(input, sink);
        }
        let Some(buf) = &mut self.scalar else {
            return Ok(Step::NeedMore);
        };
        let end = input
            .remaining()
            .iter()
            .position(|b| matches!(b, b',' | b']' | b'}') || b.is_ascii_whitespace());
        match end {
            Some(n) => buf.extend_from_slice(&input.take(n)),
            None if input.is_end_of_input() => {}
            None => {
                buf.extend_from_slice(input.remaining());
                return Ok(Step::NeedMore);
            }
        }
        self.value = Some(parse_scalar(buf)?);
        Ok(Step::Done)
    }

    fn take_announced(&mut self) -> Option<ValuePush> {
        if self.announced {
            return None;
        }
        let value = self.value.clone()?;
        self.announced = true;
        Some(value)
    }
}

/// `null`, `true`, `false` или число. Целое без `.eE`, не влезающее в
/// i64, читается как double.
fn parse_scalar(buf: &[u8]) -> ZvResult<ValuePush> {
    match buf {
        b"" => return Err(ParseError::Truncated { what: "json value" }.into()),
        b"null" => return Ok(ValuePush::Null),
        b"true" => return Ok(ValuePush::Boolean(true)),
        b"false" => return Ok(ValuePush::Boolean(false)),
        _ => {}
    }
    if buf[0] != b'-' && !buf[0].is_ascii_digit() {
        warn!("json: invalid data [{}]", hex_dump(buf));
        return Err(ParseError::InvalidJson {
            reason: "invalid json value",
        }
        .into());
    }
    let text = String::from_utf8_lossy(buf);
    let invalid = || ParseError::InvalidNumber {
        text: text.to_string(),
    };
    if !buf.iter().any(|b| matches!(b, b'.' | b'e' | b'E')) {
        match text.parse::<i64>() {
            Ok(i) => return Ok(ValuePush::Integer(i)),
            Err(e) if matches!(
                e.kind(),
                std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow
            ) => {}
            Err(_) => return Err(invalid().into()),
        }
    }
    if text.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return Err(invalid().into());
    }
    text.parse::<f64>()
        .map(ValuePush::Real)
        .map_err(|_| invalid().into())
}

struct JsonRoot {
    sink: Sink,
    node: ValueNode,
}

impl RootDecode for JsonRoot {
    fn step(
        &mut self,
        input: &mut DecoderInput,
    ) -> ZvResult<Step> {
        self.node.step(input, &mut self.sink)
    }

    fn take_announced(&mut self) -> Option<ValuePush> {
        self.node.take_announced()
    }
}

/// Push-декодер JSON.
///
/// Скаляр без кавычек на верхнем уровне завершается только разделителем
/// или концом входа.
pub fn push_decoder(
    output: OutputFn,
    options: DecodeOptions,
) -> PushDecoder {
    let root = JsonRoot {
        sink: Sink::new(FORMAT, options.exception_handler),
        node: ValueNode::default(),
    };
    PushDecoder::new(FORMAT, Box::new(root), output)
}
