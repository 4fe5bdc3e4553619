//! Инкрементальный декодер CBOR.
//!
//! Каждый узел дерева декодирования хранит своё состояние явно и
//! продолжает с того же места при следующем куске входа.

use byteorder::{BigEndian, ByteOrder};
use tracing::{trace, warn};
use zvalue_error::{ParseError, ZvResult};

use crate::{
    codec::input::{
        hex_dump, DecodeOptions, DecoderInput, OutputFn, PushDecoder, RootDecode, Sink, Step,
    },
    stream::{
        get_binary_pusher, ArrayPush, BinaryPush, Convert, ObjectPush, StringPush, ValuePush,
    },
    value::{lexicographic, Value},
};

const BREAK: u8 = 0xff;
const FORMAT: &str = "cbor";

/// Длина токена (заголовок и аргумент) по байту заголовка.
fn token_size(header: u8) -> ZvResult<usize> {
    match header & 0x1f {
        0..=23 | 31 => Ok(1),
        24 => Ok(2),
        25 => Ok(3),
        26 => Ok(5),
        27 => Ok(9),
        _ => Err(ParseError::InvalidLength { what: "cbor argument" }.into()),
    }
}

/// Заголовок с аргументом, собираемый по байту.
#[derive(Default)]
struct Token {
    buf: Vec<u8>,
}

impl Token {
    /// Дочитывает токен; `false`, если кусок закончился раньше.
    fn fill(
        &mut self,
        input: &mut DecoderInput,
    ) -> ZvResult<bool> {
        if self.buf.is_empty() {
            match input.next_byte() {
                Some(b) => self.buf.push(b),
                None => return Ok(false),
            }
        }
        let needed = token_size(self.buf[0])?;
        while self.buf.len() < needed {
            match input.next_byte() {
                Some(b) => self.buf.push(b),
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn header(&self) -> u8 {
        self.buf[0]
    }

    fn major(&self) -> u8 {
        self.buf[0] >> 5
    }

    fn is_indefinite(&self) -> bool {
        self.buf[0] & 0x1f == 31
    }

    fn unsigned(&self) -> ZvResult<u64> {
        match self.buf[0] & 0x1f {
            arg @ 0..=23 => Ok(u64::from(arg)),
            24..=27 => Ok(self.buf[1..]
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))),
            _ => Err(ParseError::InvalidLength { what: "cbor argument" }.into()),
        }
    }

    /// Число элементов контейнера; `None` для неопределённой длины.
    fn count(&self) -> ZvResult<Option<usize>> {
        if self.is_indefinite() {
            return Ok(None);
        }
        let n = self.unsigned()?;
        usize::try_from(n)
            .map(Some)
            .map_err(|_| ParseError::InvalidLength { what: "cbor container" }.into())
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Строка или бинарные данные известной длины.
struct BytesNode {
    remaining: u64,
    target: BinaryPush,
    ends_stream: bool,
}

impl BytesNode {
    fn new(
        target: BinaryPush,
        len: u64,
        ends_stream: bool,
    ) -> Self {
        Self {
            remaining: len,
            target,
            ends_stream,
        }
    }

    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if self.remaining > 0 {
            if input.is_end_of_input() {
                return Err(ParseError::Truncated { what: "cbor string" }.into());
            }
            let max = usize::try_from(self.remaining).unwrap_or(usize::MAX);
            let chunk = input.take(max);
            if chunk.is_empty() {
                return Ok(Step::NeedMore);
            }
            self.remaining -= chunk.len() as u64;
            sink.deliver(self.target.push(chunk))?;
            if self.remaining > 0 {
                return Ok(Step::NeedMore);
            }
        }
        if self.ends_stream {
            sink.deliver(self.target.end())?;
        }
        Ok(Step::Done)
    }
}

/// Строка или бинарные данные неопределённой длины: куски того же
/// основного типа до `0xff`.
struct ChunksNode {
    major: u8,
    target: BinaryPush,
    token: Token,
    chunk: Option<BytesNode>,
}

impl ChunksNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(ParseError::Truncated {
                what: "cbor chunked string",
            }
            .into());
        }
        loop {
            if let Some(chunk) = &mut self.chunk {
                if chunk.step(input, sink)? == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                self.chunk = None;
                continue;
            }
            if self.token.buf.is_empty() {
                match input.peek() {
                    None => return Ok(Step::NeedMore),
                    Some(BREAK) => {
                        input.advance();
                        sink.deliver(self.target.end())?;
                        return Ok(Step::Done);
                    }
                    Some(_) => {}
                }
            }
            if !self.token.fill(input)? {
                return Ok(Step::NeedMore);
            }
            if self.token.major() != self.major || self.token.is_indefinite() {
                return Err(ParseError::UnexpectedChunk {
                    major: self.token.major(),
                }
                .into());
            }
            let len = self.token.unsigned()?;
            self.token.clear();
            self.chunk = Some(BytesNode::new(self.target.clone(), len, false));
        }
    }
}

/// Массив; `remaining == None` для неопределённой длины.
struct ArrayNode {
    remaining: Option<usize>,
    pusher: ArrayPush,
    child: Option<Box<ValueNode>>,
}

impl ArrayNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if self.remaining == Some(0) && self.child.is_none() {
            sink.deliver(self.pusher.end())?;
            return Ok(Step::Done);
        }
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "cbor array" }.into());
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
            match &mut self.remaining {
                Some(0) => {
                    sink.deliver(self.pusher.end())?;
                    return Ok(Step::Done);
                }
                Some(n) => *n -= 1,
                None => match input.peek() {
                    None => return Ok(Step::NeedMore),
                    Some(BREAK) => {
                        input.advance();
                        sink.deliver(self.pusher.end())?;
                        return Ok(Step::Done);
                    }
                    Some(_) => {}
                },
            }
            self.child = Some(Box::default());
        }
    }
}

/// Отображение; ключи обязаны быть строками.
struct MapNode {
    remaining: Option<usize>,
    pusher: ObjectPush,
    key_node: Option<Box<ValueNode>>,
    key: Option<String>,
    child: Option<Box<ValueNode>>,
}

impl MapNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        if self.remaining == Some(0) && self.key_node.is_none() && self.child.is_none() {
            sink.deliver(self.pusher.end())?;
            return Ok(Step::Done);
        }
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "cbor map" }.into());
        }
        loop {
            if let Some(key_node) = &mut self.key_node {
                if key_node.step(input, sink)? == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                let key = match key_node.take_value()? {
                    Value::String(key) => key,
                    other => {
                        return Err(ParseError::NonStringKey {
                            type_name: other.type_name(),
                        }
                        .into())
                    }
                };
                self.key_node = None;
                self.key = Some(key);
                self.child = Some(Box::default());
            }
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
            match &mut self.remaining {
                Some(0) => {
                    sink.deliver(self.pusher.end())?;
                    return Ok(Step::Done);
                }
                Some(n) => *n -= 1,
                None => match input.peek() {
                    None => return Ok(Step::NeedMore),
                    Some(BREAK) => {
                        input.advance();
                        sink.deliver(self.pusher.end())?;
                        return Ok(Step::Done);
                    }
                    Some(_) => {}
                },
            }
            self.key_node = Some(Box::default());
        }
    }
}

enum Body {
    Bytes(BytesNode),
    Chunks(ChunksNode),
    Array(ArrayNode),
    Map(MapNode),
}

impl Body {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        sink: &mut Sink,
    ) -> ZvResult<Step> {
        match self {
            Self::Bytes(node) => node.step(input, sink),
            Self::Chunks(node) => node.step(input, sink),
            Self::Array(node) => node.step(input, sink),
            Self::Map(node) => node.step(input, sink),
        }
    }
}

/// Узел одного значения: читает заголовок, создаёт поток нужного типа и
/// дальше передаёт вход телу.
#[derive(Default)]
struct ValueNode {
    token: Token,
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
        if input.is_end_of_input() {
            return Err(ParseError::Truncated { what: "cbor value" }.into());
        }
        loop {
            if !self.token.fill(input)? {
                return Ok(Step::NeedMore);
            }
            if self.token.major() == 6 {
                trace!("cbor tag {} ignored", self.token.unsigned()?);
                self.token.clear();
                continue;
            }
            break;
        }
        let (value, body) = self.start()?;
        self.value = Some(value);
        match body {
            None => Ok(Step::Done),
            Some(body) => self.body.insert(body).step(input, sink),
        }
    }

    fn start(&self) -> ZvResult<(ValuePush, Option<Body>)> {
        let token = &self.token;
        match token.major() {
            0 => {
                let n = token.unsigned()?;
                let value = match i64::try_from(n) {
                    Ok(i) => ValuePush::Integer(i),
                    Err(_) => ValuePush::Real(n as f64),
                };
                Ok((value, None))
            }
            1 => {
                let n = token.unsigned()?;
                let value = match i64::try_from(n) {
                    Ok(i) => ValuePush::Integer(-1 - i),
                    Err(_) => ValuePush::Real(-1.0 - n as f64),
                };
                Ok((value, None))
            }
            2 | 3 => {
                let (value, target) = if token.major() == 2 {
                    let b = BinaryPush::new();
                    (ValuePush::Binary(b.clone()), b)
                } else {
                    let value = ValuePush::String(StringPush::new());
                    let target = get_binary_pusher(&value, Convert::Cast)?;
                    (value, target)
                };
                let body = if token.is_indefinite() {
                    Body::Chunks(ChunksNode {
                        major: token.major(),
                        target,
                        token: Token::default(),
                        chunk: None,
                    })
                } else {
                    Body::Bytes(BytesNode::new(target, token.unsigned()?, true))
                };
                Ok((value, Some(body)))
            }
            4 => {
                let remaining = token.count()?;
                let pusher = match remaining {
                    Some(n) => ArrayPush::with_final_size(n),
                    None => ArrayPush::new(),
                };
                let body = Body::Array(ArrayNode {
                    remaining,
                    pusher: pusher.clone(),
                    child: None,
                });
                Ok((ValuePush::Array(pusher), Some(body)))
            }
            5 => {
                let remaining = token.count()?;
                let pusher = match remaining {
                    Some(n) => ObjectPush::with_final_size(n),
                    None => ObjectPush::new(),
                };
                let body = Body::Map(MapNode {
                    remaining,
                    pusher: pusher.clone(),
                    key_node: None,
                    key: None,
                    child: None,
                });
                Ok((ValuePush::Object(pusher), Some(body)))
            }
            _ => self.simple().map(|value| (value, None)),
        }
    }

    /// Основной тип 7: простые значения и числа с плавающей точкой.
    fn simple(&self) -> ZvResult<ValuePush> {
        let buf = &self.token.buf;
        match buf[0] & 0x1f {
            20 => Ok(ValuePush::Boolean(false)),
            21 => Ok(ValuePush::Boolean(true)),
            22 | 23 => Ok(ValuePush::Null),
            24 => Err(ParseError::UnknownSimple { value: buf[1] }.into()),
            25 => Err(ParseError::Float16Unsupported.into()),
            26 => Ok(ValuePush::Real(f64::from(BigEndian::read_f32(&buf[1..5])))),
            27 => Ok(ValuePush::Real(BigEndian::read_f64(&buf[1..9]))),
            31 => {
                warn!("cbor: unexpected break [{}]", hex_dump(buf));
                Err(ParseError::InvalidMarker {
                    format: FORMAT,
                    marker: self.token.header(),
                }
                .into())
            }
            value => Err(ParseError::UnknownSimple { value }.into()),
        }
    }

    fn take_announced(&mut self) -> Option<ValuePush> {
        if self.announced {
            return None;
        }
        let value = self.value.clone()?;
        self.announced = true;
        Some(value)
    }

    /// Готовое значение завершённого узла (используется для ключей).
    fn take_value(&self) -> ZvResult<Value> {
        match &self.value {
            Some(value) => value.take_final(lexicographic),
            None => Err(ParseError::Truncated { what: "cbor key" }.into()),
        }
    }
}

struct CborRoot {
    sink: Sink,
    node: ValueNode,
}

impl RootDecode for CborRoot {
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

/// Push-декодер CBOR. Теги пропускаются, float16 не поддерживается.
pub fn push_decoder(
    output: OutputFn,
    options: DecodeOptions,
) -> PushDecoder {
    let root = CborRoot {
        sink: Sink::new(FORMAT, options.exception_handler),
        node: ValueNode::default(),
    };
    PushDecoder::new(FORMAT, Box::new(root), output)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use bytes::Bytes;
    use rstest::rstest;
    use zvalue_error::SinkError;

    use super::*;

    fn decoder() -> (PushDecoder, Rc<RefCell<Option<ValuePush>>>) {
        let out = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&out);
        let dec = push_decoder(
            Box::new(move |v| {
                *slot.borrow_mut() = Some(v);
                Ok(())
            }),
            DecodeOptions::default(),
        );
        (dec, out)
    }

    fn decode(data: &[u8]) -> ZvResult<Value> {
        let (mut dec, out) = decoder();
        let mut input = DecoderInput::new(Bytes::copy_from_slice(data));
        if dec.push_input(&mut input)? == Step::NeedMore {
            dec.push_input(&mut DecoderInput::end_of_input())?;
        }
        let value = out.borrow_mut().take().unwrap();
        value.take_final(lexicographic)
    }

    #[rstest]
    #[case(&[0x00], Value::Integer(0))]
    #[case(&[0x17], Value::Integer(23))]
    #[case(&[0x18, 0x18], Value::Integer(24))]
    #[case(&[0x19, 0x01, 0x00], Value::Integer(256))]
    #[case(&[0x20], Value::Integer(-1))]
    #[case(&[0x38, 0x63], Value::Integer(-100))]
    #[case(&[0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff], Value::Integer(i64::MIN))]
    #[case(&[0xf4], Value::Boolean(false))]
    #[case(&[0xf5], Value::Boolean(true))]
    #[case(&[0xf6], Value::Null)]
    #[case(&[0xf7], Value::Null)]
    #[case(&[0xfa, 0x3f, 0xa0, 0x00, 0x00], Value::Real(1.25))]
    #[case(&[0xfb, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18], Value::Real(std::f64::consts::PI))]
    #[case(&[0x63, b'a', b'b', b'c'], Value::from("abc"))]
    #[case(&[0x42, 0x01, 0x02], Value::Binary(Bytes::from_static(&[1, 2])))]
    #[case(&[0x40], Value::Binary(Bytes::new()))]
    #[case(&[0x80], Value::Array(vec![]))]
    #[case(&[0xc1, 0x18, 0x2a], Value::Integer(42))]
    fn test_decode_simple(
        #[case] data: &[u8],
        #[case] expected: Value,
    ) {
        assert_eq!(decode(data).unwrap(), expected);
    }

    /// Тест проверяет сборку строки неопределённой длины из кусков,
    /// включая пустой кусок.
    #[test]
    fn test_indefinite_string() {
        let data = [0x7f, 0x62, b'a', b'b', 0x60, 0x61, b'c', 0xff];
        assert_eq!(decode(&data).unwrap(), Value::from("abc"));
    }

    /// Тест проверяет, что кусок другого основного типа внутри строки
    /// неопределённой длины - ошибка.
    #[test]
    fn test_wrong_chunk_type() {
        let err = decode(&[0x7f, 0x41, 0x00, 0xff]).unwrap_err();
        assert!(err.to_string().contains("major type 2"), "{err}");
    }

    #[rstest]
    #[case(&[0xf9, 0x3c, 0x00], "float16")]
    #[case(&[0xf0], "simple value 16")]
    #[case(&[0xa1, 0x01, 0x02], "must be a string")]
    #[case(&[0x82, 0x01], "premature end")]
    #[case(&[], "premature end")]
    #[case(&[0x1c], "length encoding")]
    fn test_decode_errors(
        #[case] data: &[u8],
        #[case] message: &str,
    ) {
        let err = decode(data).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    /// Тест проверяет, что вход, поданный по одному байту, даёт
    /// NeedMore до последнего байта и Done на нём.
    #[test]
    fn test_byte_at_a_time() {
        let data = [
            0xbf, 0x61, b'k', 0x9f, 0x01, 0x7f, 0x61, b'x', 0xff, 0xff, 0xff,
        ];
        let (mut dec, out) = decoder();
        for (i, b) in data.iter().enumerate() {
            let mut input = DecoderInput::new(Bytes::copy_from_slice(&[*b]));
            let step = dec.push_input(&mut input).unwrap();
            if i + 1 < data.len() {
                assert_eq!(step, Step::NeedMore, "at byte {i}");
                assert!(input.is_end_of_input());
            } else {
                assert_eq!(step, Step::Done);
                assert_eq!(input.pos(), 1);
            }
        }
        let value = out.borrow_mut().take().unwrap();
        let expected: Value = Value::from(
            [("k", Value::from(vec![Value::from(1), Value::from("x")]))]
                .into_iter()
                .collect::<crate::value::Object>(),
        );
        assert_eq!(value.take_final(lexicographic).unwrap(), expected);
    }

    /// Тест проверяет, что значение объявляется до прихода содержимого.
    #[test]
    fn test_output_before_content() {
        let (mut dec, out) = decoder();
        let mut input = DecoderInput::new(Bytes::from_static(&[0x9f, 0x01]));
        assert_eq!(dec.push_input(&mut input).unwrap(), Step::NeedMore);
        assert!(matches!(*out.borrow(), Some(ValuePush::Array(_))));
        let mut input = DecoderInput::new(Bytes::from_static(&[0xff, 0x00]));
        assert_eq!(dec.push_input(&mut input).unwrap(), Step::Done);
        assert_eq!(input.remaining(), &[0x00]);
    }

    /// Тест проверяет перехват ошибки потребителя обработчиком.
    #[test]
    fn test_exception_handler_swallows_sink_error() {
        let failures = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&failures);
        let options = DecodeOptions::default().with_exception_handler(move |e| {
            *seen.borrow_mut() += 1;
            e.is_sink()
        });
        let mut dec = push_decoder(
            Box::new(|v| match v {
                ValuePush::Array(a) => a.set_value_handler(|item| match item {
                    Some(_) => Ok(()),
                    None => Err(SinkError::new("rejected").into()),
                }),
                _ => Ok(()),
            }),
            options,
        );
        let mut input = DecoderInput::new(Bytes::from_static(&[0x82]));
        assert_eq!(dec.push_input(&mut input).unwrap(), Step::NeedMore);
        let mut input = DecoderInput::new(Bytes::from_static(&[0x01, 0x02]));
        assert_eq!(dec.push_input(&mut input).unwrap(), Step::Done);
        assert_eq!(*failures.borrow(), 1);
    }
}
