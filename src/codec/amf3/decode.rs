//! Инкрементальный декодер AMF3.
//!
//! Таблицы ссылок (строки, описания классов, объекты) живут в сессии
//! декодера. Ячейка объекта резервируется при начале составного значения
//! и заполняется, когда оно прочитано целиком; ссылка на незаполненную
//! ячейку означает рекурсию.

use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use tracing::{debug, warn};
use zvalue_error::{ParseError, ZvResult};

use super::{marker, STREAM_ARRAY, STREAM_BINARY, STREAM_STRING};
use crate::{
    codec::input::{
        hex_dump, DecodeOptions, DecoderInput, OutputFn, PushDecoder, RootDecode, Sink, Step,
    },
    stream::{ArrayPush, BinaryPush, ObjectPush, StringPush, ValuePush},
    value::{lexicographic, Object, Value},
};

const FORMAT: &str = "amf3";

/// Описание класса объекта.
#[derive(Debug, Default)]
struct Traits {
    class_name: String,
    sealed: Vec<String>,
    dynamic: bool,
    externalizable: bool,
}

/// Таблицы ссылок одного сообщения.
struct History {
    strings: Vec<String>,
    traits: Vec<Rc<Traits>>,
    objects: Vec<Option<Value>>,
    store_objects: bool,
}

impl History {
    fn string(
        &self,
        index: usize,
    ) -> ZvResult<&String> {
        self.strings.get(index).ok_or_else(|| {
            ParseError::InvalidReference {
                table: "string",
                index,
            }
            .into()
        })
    }

    fn traits(
        &self,
        index: usize,
    ) -> ZvResult<Rc<Traits>> {
        self.traits.get(index).cloned().ok_or_else(|| {
            ParseError::InvalidReference {
                table: "traits",
                index,
            }
            .into()
        })
    }

    fn object(
        &self,
        index: usize,
    ) -> ZvResult<&Value> {
        match self.objects.get(index) {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(ParseError::RecursiveReference { index }.into()),
            None => Err(ParseError::InvalidReference {
                table: "object",
                index,
            }
            .into()),
        }
    }

    fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    /// Заполняет ячейку; без хранения объектов в ней остаётся `null`.
    fn fill(
        &mut self,
        slot: usize,
        value: Option<&Value>,
    ) {
        if let Some(cell) = self.objects.get_mut(slot) {
            *cell = Some(value.cloned().unwrap_or(Value::Null));
        }
    }
}

struct Session {
    sink: Sink,
    history: History,
}

fn truncated(what: &'static str) -> zvalue_error::StackError {
    ParseError::Truncated { what }.into()
}

/// Беззнаковое 29-битное целое переменной длины.
#[derive(Default)]
struct U29 {
    value: u32,
    count: u8,
}

impl U29 {
    /// Значение, как только прочитан последний байт.
    fn read(
        &mut self,
        input: &mut DecoderInput,
    ) -> Option<u32> {
        while let Some(b) = input.next_byte() {
            if self.count == 3 {
                let value = (self.value << 8) | u32::from(b);
                *self = Self::default();
                return Some(value);
            }
            self.value = (self.value << 7) | u32::from(b & 0x7f);
            self.count += 1;
            if b & 0x80 == 0 {
                let value = self.value;
                *self = Self::default();
                return Some(value);
            }
        }
        None
    }
}

/// Знаковое расширение 29-битного целого.
fn sign_extend(u: u32) -> i64 {
    if u & 0x1000_0000 != 0 {
        i64::from(u) - (1 << 29)
    } else {
        i64::from(u)
    }
}

/// Double, который на самом деле целое за пределами 29 бит.
fn narrow_double(d: f64) -> ValuePush {
    let limit = (1u64 << 28) as f64;
    let fits_i64 = d < 9_223_372_036_854_775_808.0 && d >= -9_223_372_036_854_775_808.0;
    if (d >= limit || d < -limit) && d.fract() == 0.0 && fits_i64 {
        ValuePush::Integer(d as i64)
    } else {
        ValuePush::Real(d)
    }
}

/// Строка с учётом таблицы строк; `target` получает содержимое по мере
/// чтения.
#[derive(Default)]
struct StrNode {
    header: U29,
    remaining: Option<usize>,
    text: Vec<u8>,
    target: Option<StringPush>,
}

impl StrNode {
    fn with_target(target: StringPush) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// Готовая строка или `None`, если нужен ещё вход.
    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Option<String>> {
        if input.is_end_of_input() {
            return Err(truncated("amf3 string"));
        }
        if self.remaining.is_none() {
            let Some(h) = self.header.read(input) else {
                return Ok(None);
            };
            let len = (h >> 1) as usize;
            if h & 1 == 0 {
                let s = session.history.string(len)?.clone();
                if let Some(target) = &self.target {
                    target.set_final_size(s.len())?;
                    if !s.is_empty() {
                        session.sink.deliver(target.push(Bytes::from(s.clone())))?;
                    }
                    session.sink.deliver(target.end())?;
                }
                return Ok(Some(s));
            }
            if let Some(target) = &self.target {
                target.set_final_size(len)?;
            }
            self.remaining = Some(len);
        }
        let remaining = self.remaining.unwrap_or(0);
        if remaining > 0 {
            let chunk = input.take(remaining);
            if chunk.is_empty() {
                return Ok(None);
            }
            let left = remaining - chunk.len();
            self.remaining = Some(left);
            self.text.extend_from_slice(&chunk);
            if let Some(target) = &self.target {
                session.sink.deliver(target.push(chunk))?;
            }
            if left > 0 {
                return Ok(None);
            }
        }
        let s = String::from_utf8(std::mem::take(&mut self.text)).map_err(|_| {
            ParseError::InvalidUtf8 {
                context: "amf3 string",
            }
        })?;
        if !s.is_empty() {
            session.history.strings.push(s.clone());
        }
        if let Some(target) = &self.target {
            session.sink.deliver(target.end())?;
        }
        Ok(Some(s))
    }
}

/// Массив байтов (0x0C).
struct BinNode {
    header: U29,
    remaining: Option<usize>,
    slot: usize,
    target: BinaryPush,
    acc: Vec<u8>,
    value: Option<Value>,
}

impl BinNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(truncated("amf3 byte array"));
        }
        if self.remaining.is_none() {
            let Some(h) = self.header.read(input) else {
                return Ok(Step::NeedMore);
            };
            let index = (h >> 1) as usize;
            if h & 1 == 0 {
                let stored = session.history.object(index)?;
                let Value::Binary(data) = stored else {
                    return Err(ParseError::WrongReferenceType {
                        expected: "binary",
                        found: stored.type_name(),
                    }
                    .into());
                };
                let data = data.clone();
                self.target.set_final_size(data.len())?;
                if !data.is_empty() {
                    session.sink.deliver(self.target.push(data.clone()))?;
                }
                session.sink.deliver(self.target.end())?;
                self.value = Some(Value::Binary(data));
                return Ok(Step::Done);
            }
            self.slot = session.history.reserve();
            self.target.set_final_size(index)?;
            self.remaining = Some(index);
        }
        let remaining = self.remaining.unwrap_or(0);
        if remaining > 0 {
            let chunk = input.take(remaining);
            if chunk.is_empty() {
                return Ok(Step::NeedMore);
            }
            let left = remaining - chunk.len();
            self.remaining = Some(left);
            if session.history.store_objects {
                self.acc.extend_from_slice(&chunk);
            }
            session.sink.deliver(self.target.push(chunk))?;
            if left > 0 {
                return Ok(Step::NeedMore);
            }
        }
        if session.history.store_objects {
            self.value = Some(Value::Binary(Bytes::from(std::mem::take(&mut self.acc))));
        }
        session.history.fill(self.slot, self.value.as_ref());
        session.sink.deliver(self.target.end())?;
        Ok(Step::Done)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ArrayPhase {
    Header,
    Dense,
    Items,
}

/// Массив (0x09); ассоциативная часть должна быть пустой.
struct ArrayNode {
    header: U29,
    phase: ArrayPhase,
    remaining: usize,
    slot: usize,
    pusher: ArrayPush,
    child: Option<Box<ValueNode>>,
    items: Vec<Value>,
    value: Option<Value>,
}

impl ArrayNode {
    fn new(pusher: ArrayPush) -> Self {
        Self {
            header: U29::default(),
            phase: ArrayPhase::Header,
            remaining: 0,
            slot: 0,
            pusher,
            child: None,
            items: Vec::new(),
            value: None,
        }
    }

    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(truncated("amf3 array"));
        }
        loop {
            match self.phase {
                ArrayPhase::Header => {
                    let Some(h) = self.header.read(input) else {
                        return Ok(Step::NeedMore);
                    };
                    let n = (h >> 1) as usize;
                    if h & 1 == 0 {
                        return self.replay(n, session);
                    }
                    self.slot = session.history.reserve();
                    self.pusher.set_final_size(n)?;
                    self.remaining = n;
                    self.phase = ArrayPhase::Dense;
                }
                ArrayPhase::Dense => {
                    let Some(b) = input.next_byte() else {
                        return Ok(Step::NeedMore);
                    };
                    if b != marker::NULL {
                        return Err(ParseError::SparseArray.into());
                    }
                    self.phase = ArrayPhase::Items;
                }
                ArrayPhase::Items => {
                    if let Some(child) = &mut self.child {
                        let step = child.step(input, session)?;
                        if let Some(value) = child.take_announced() {
                            session.sink.deliver(self.pusher.push(value))?;
                        }
                        if step == Step::NeedMore {
                            return Ok(Step::NeedMore);
                        }
                        if session.history.store_objects {
                            self.items.push(child.take_value());
                        }
                        self.child = None;
                    }
                    if self.remaining == 0 {
                        if session.history.store_objects {
                            self.value = Some(Value::Array(std::mem::take(&mut self.items)));
                        }
                        session.history.fill(self.slot, self.value.as_ref());
                        session.sink.deliver(self.pusher.end())?;
                        return Ok(Step::Done);
                    }
                    self.remaining -= 1;
                    self.child = Some(Box::default());
                }
            }
        }
    }

    /// Ссылка на ранее прочитанный массив: элементы повторяются из таблицы.
    fn replay(
        &mut self,
        index: usize,
        session: &mut Session,
    ) -> ZvResult<Step> {
        let stored = session.history.object(index)?.clone();
        let Value::Array(items) = &stored else {
            return Err(ParseError::WrongReferenceType {
                expected: "array",
                found: stored.type_name(),
            }
            .into());
        };
        self.pusher.set_final_size(items.len())?;
        for item in items {
            session.sink.deliver(self.pusher.push(ValuePush::from(item)))?;
        }
        session.sink.deliver(self.pusher.end())?;
        self.value = Some(stored);
        Ok(Step::Done)
    }
}

/// Куда пишутся куски внешнего потока строки или байтов.
enum ExtTarget {
    String(StringPush),
    Binary(BinaryPush),
}

/// Внешний поток строки/байтов: куски с длиной U29 до нулевого байта.
struct ExtBytesNode {
    len: U29,
    reading_len: bool,
    remaining: usize,
    target: ExtTarget,
    acc: Vec<u8>,
    value: Option<Value>,
}

impl ExtBytesNode {
    fn new(target: ExtTarget) -> Self {
        Self {
            len: U29::default(),
            reading_len: false,
            remaining: 0,
            target,
            acc: Vec::new(),
            value: None,
        }
    }

    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        loop {
            if self.remaining > 0 {
                let chunk = input.take(self.remaining);
                if chunk.is_empty() {
                    return Ok(Step::NeedMore);
                }
                self.remaining -= chunk.len();
                if session.history.store_objects {
                    self.acc.extend_from_slice(&chunk);
                }
                let pushed = match &self.target {
                    ExtTarget::String(s) => s.push(chunk),
                    ExtTarget::Binary(b) => b.push(chunk),
                };
                session.sink.deliver(pushed)?;
                continue;
            }
            if self.reading_len {
                let Some(n) = self.len.read(input) else {
                    return Ok(Step::NeedMore);
                };
                self.remaining = n as usize;
                self.reading_len = false;
                continue;
            }
            match input.peek() {
                None => return Ok(Step::NeedMore),
                Some(0) => {
                    input.advance();
                    return self.finish(session);
                }
                Some(_) => self.reading_len = true,
            }
        }
    }

    fn finish(
        &mut self,
        session: &mut Session,
    ) -> ZvResult<Step> {
        let acc = std::mem::take(&mut self.acc);
        let ended = match &self.target {
            ExtTarget::String(s) => {
                if session.history.store_objects {
                    let text = String::from_utf8(acc).map_err(|_| ParseError::InvalidUtf8 {
                        context: "amf3 string stream",
                    })?;
                    self.value = Some(Value::String(text));
                }
                s.end()
            }
            ExtTarget::Binary(b) => {
                if session.history.store_objects {
                    self.value = Some(Value::Binary(Bytes::from(acc)));
                }
                b.end()
            }
        };
        session.sink.deliver(ended)?;
        Ok(Step::Done)
    }
}

/// Внешний поток массива: значения до нулевого байта.
struct ExtArrayNode {
    pusher: ArrayPush,
    child: Option<Box<ValueNode>>,
    items: Vec<Value>,
    value: Option<Value>,
}

impl ExtArrayNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        loop {
            if let Some(child) = &mut self.child {
                let step = child.step(input, session)?;
                if let Some(value) = child.take_announced() {
                    session.sink.deliver(self.pusher.push(value))?;
                }
                if step == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                if session.history.store_objects {
                    self.items.push(child.take_value());
                }
                self.child = None;
            }
            match input.peek() {
                None => return Ok(Step::NeedMore),
                Some(0) => {
                    input.advance();
                    if session.history.store_objects {
                        self.value = Some(Value::Array(std::mem::take(&mut self.items)));
                    }
                    session.sink.deliver(self.pusher.end())?;
                    return Ok(Step::Done);
                }
                Some(_) => self.child = Some(Box::default()),
            }
        }
    }
}

/// Поля обычного объекта: сначала закрытые по описанию класса, затем
/// динамические пары до пустого ключа.
struct MembersNode {
    traits: Rc<Traits>,
    index: usize,
    pusher: ObjectPush,
    key: StrNode,
    current: Option<String>,
    child: Option<Box<ValueNode>>,
    entries: Vec<(String, Value)>,
    value: Option<Value>,
}

impl MembersNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        loop {
            if let Some(child) = &mut self.child {
                let step = child.step(input, session)?;
                if let Some(value) = child.take_announced() {
                    let key = self.current.clone().unwrap_or_default();
                    session.sink.deliver(self.pusher.push((key, value)))?;
                }
                if step == Step::NeedMore {
                    return Ok(Step::NeedMore);
                }
                let key = self.current.take().unwrap_or_default();
                if session.history.store_objects {
                    self.entries.push((key, child.take_value()));
                }
                self.child = None;
            }
            if let Some(name) = self.traits.sealed.get(self.index) {
                self.current = Some(name.clone());
                self.index += 1;
                self.child = Some(Box::default());
                continue;
            }
            if !self.traits.dynamic {
                return self.finish(session);
            }
            if input.is_end_of_input() {
                return Err(truncated("amf3 object"));
            }
            let Some(key) = self.key.step(input, session)? else {
                return Ok(Step::NeedMore);
            };
            self.key = StrNode::default();
            if key.is_empty() {
                return self.finish(session);
            }
            self.current = Some(key);
            self.child = Some(Box::default());
        }
    }

    fn finish(
        &mut self,
        session: &mut Session,
    ) -> ZvResult<Step> {
        if session.history.store_objects {
            let entries = std::mem::take(&mut self.entries);
            self.value = Some(Value::Object(Object::from_entries(lexicographic, entries)));
        }
        session.sink.deliver(self.pusher.end())?;
        Ok(Step::Done)
    }
}

enum Inner {
    ExtBytes(ExtBytesNode),
    ExtArray(ExtArrayNode),
    Members(MembersNode),
}

enum ObjectPhase {
    Header,
    ClassName { traits: Traits, sealed: usize },
    SealedNames { traits: Traits, left: usize },
    Body,
}

/// Объект (0x0A): ссылка, внешний поток или обычный объект.
struct ObjectNode {
    header: U29,
    phase: ObjectPhase,
    name: StrNode,
    slot: usize,
    announced: Option<ValuePush>,
    inner: Option<Inner>,
    value: Option<Value>,
}

impl ObjectNode {
    fn new() -> Self {
        Self {
            header: U29::default(),
            phase: ObjectPhase::Header,
            name: StrNode::default(),
            slot: 0,
            announced: None,
            inner: None,
            value: None,
        }
    }

    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        if input.is_end_of_input() {
            return Err(truncated("amf3 object"));
        }
        loop {
            match &mut self.phase {
                ObjectPhase::Header => {
                    let Some(h) = self.header.read(input) else {
                        return Ok(Step::NeedMore);
                    };
                    if h & 1 == 0 {
                        let stored = session.history.object((h >> 1) as usize)?.clone();
                        self.announced = Some(ValuePush::from(&stored));
                        self.value = Some(stored);
                        return Ok(Step::Done);
                    }
                    self.slot = session.history.reserve();
                    if h & 2 == 0 {
                        let traits = session.history.traits((h >> 2) as usize)?;
                        self.start(traits)?;
                    } else if h & 4 != 0 {
                        self.phase = ObjectPhase::ClassName {
                            traits: Traits {
                                externalizable: true,
                                ..Traits::default()
                            },
                            sealed: 0,
                        };
                    } else {
                        self.phase = ObjectPhase::ClassName {
                            traits: Traits {
                                dynamic: h & 8 != 0,
                                ..Traits::default()
                            },
                            sealed: (h >> 4) as usize,
                        };
                    }
                }
                ObjectPhase::ClassName { traits, sealed } => {
                    let Some(name) = self.name.step(input, session)? else {
                        return Ok(Step::NeedMore);
                    };
                    self.name = StrNode::default();
                    traits.class_name = name;
                    let traits = std::mem::take(traits);
                    let left = *sealed;
                    if left == 0 {
                        self.register(traits, session)?;
                    } else {
                        self.phase = ObjectPhase::SealedNames { traits, left };
                    }
                }
                ObjectPhase::SealedNames { traits, left } => {
                    let Some(name) = self.name.step(input, session)? else {
                        return Ok(Step::NeedMore);
                    };
                    self.name = StrNode::default();
                    traits.sealed.push(name);
                    *left -= 1;
                    if *left == 0 {
                        let traits = std::mem::take(traits);
                        self.register(traits, session)?;
                    }
                }
                ObjectPhase::Body => {
                    let (step, value) = match &mut self.inner {
                        Some(Inner::ExtBytes(node)) => (node.step(input, session)?, &mut node.value),
                        Some(Inner::ExtArray(node)) => (node.step(input, session)?, &mut node.value),
                        Some(Inner::Members(node)) => (node.step(input, session)?, &mut node.value),
                        None => return Err(truncated("amf3 object")),
                    };
                    if step == Step::Done {
                        self.value = value.take();
                        session.history.fill(self.slot, self.value.as_ref());
                    }
                    return Ok(step);
                }
            }
        }
    }

    fn register(
        &mut self,
        traits: Traits,
        session: &mut Session,
    ) -> ZvResult<()> {
        let traits = Rc::new(traits);
        session.history.traits.push(Rc::clone(&traits));
        self.start(traits)
    }

    /// Создаёт поток по описанию класса и переходит к содержимому.
    fn start(
        &mut self,
        traits: Rc<Traits>,
    ) -> ZvResult<()> {
        let inner = if traits.externalizable {
            debug!("amf3 externalizable object: {}", traits.class_name);
            match traits.class_name.as_str() {
                STREAM_STRING => {
                    let s = StringPush::new();
                    self.announced = Some(ValuePush::String(s.clone()));
                    Inner::ExtBytes(ExtBytesNode::new(ExtTarget::String(s)))
                }
                STREAM_BINARY => {
                    let b = BinaryPush::new();
                    self.announced = Some(ValuePush::Binary(b.clone()));
                    Inner::ExtBytes(ExtBytesNode::new(ExtTarget::Binary(b)))
                }
                STREAM_ARRAY => {
                    let a = ArrayPush::new();
                    self.announced = Some(ValuePush::Array(a.clone()));
                    Inner::ExtArray(ExtArrayNode {
                        pusher: a,
                        child: None,
                        items: Vec::new(),
                        value: None,
                    })
                }
                _ => {
                    return Err(ParseError::UnknownExternalizable {
                        class_name: traits.class_name.clone(),
                    }
                    .into())
                }
            }
        } else {
            let pusher = if traits.dynamic {
                ObjectPush::new()
            } else {
                ObjectPush::with_final_size(traits.sealed.len())
            };
            self.announced = Some(ValuePush::Object(pusher.clone()));
            Inner::Members(MembersNode {
                traits,
                index: 0,
                pusher,
                key: StrNode::default(),
                current: None,
                child: None,
                entries: Vec::new(),
                value: None,
            })
        };
        self.inner = Some(inner);
        self.phase = ObjectPhase::Body;
        Ok(())
    }
}

enum Body {
    Integer(U29),
    Double(Vec<u8>),
    String(StrNode),
    Binary(BinNode),
    Array(ArrayNode),
    Object(ObjectNode),
}

/// Узел одного значения: читает маркер и передаёт вход телу.
#[derive(Default)]
struct ValueNode {
    value: Option<ValuePush>,
    announced: bool,
    body: Option<Body>,
    complete: Option<Value>,
}

impl ValueNode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
        session: &mut Session,
    ) -> ZvResult<Step> {
        if self.body.is_none() {
            if input.is_end_of_input() {
                return Err(truncated("amf3 value"));
            }
            let Some(m) = input.peek() else {
                return Ok(Step::NeedMore);
            };
            let body = match m {
                marker::UNDEFINED | marker::NULL => {
                    input.advance();
                    return self.scalar(ValuePush::Null);
                }
                marker::FALSE | marker::TRUE => {
                    input.advance();
                    return self.scalar(ValuePush::Boolean(m == marker::TRUE));
                }
                marker::INTEGER => Body::Integer(U29::default()),
                marker::DOUBLE => Body::Double(Vec::with_capacity(8)),
                marker::STRING => {
                    let s = StringPush::new();
                    self.value = Some(ValuePush::String(s.clone()));
                    Body::String(StrNode::with_target(s))
                }
                marker::BYTE_ARRAY => {
                    let b = BinaryPush::new();
                    self.value = Some(ValuePush::Binary(b.clone()));
                    Body::Binary(BinNode {
                        header: U29::default(),
                        remaining: None,
                        slot: 0,
                        target: b,
                        acc: Vec::new(),
                        value: None,
                    })
                }
                marker::ARRAY => {
                    let a = ArrayPush::new();
                    self.value = Some(ValuePush::Array(a.clone()));
                    Body::Array(ArrayNode::new(a))
                }
                marker::OBJECT => Body::Object(ObjectNode::new()),
                marker::XML_DOC => return Err(unsupported("xml-doc")),
                marker::DATE => return Err(unsupported("date")),
                marker::XML => return Err(unsupported("xml")),
                _ => {
                    warn!("amf3: invalid marker [{}]", hex_dump(input.remaining()));
                    return Err(ParseError::InvalidMarker {
                        format: FORMAT,
                        marker: m,
                    }
                    .into());
                }
            };
            input.advance();
            self.body = Some(body);
        }
        let Some(body) = self.body.as_mut() else {
            return Err(truncated("amf3 value"));
        };
        match body {
            Body::Integer(u) => match u.read(input) {
                Some(u) => self.scalar(ValuePush::Integer(sign_extend(u))),
                None => Ok(Step::NeedMore),
            },
            Body::Double(buf) => {
                while buf.len() < 8 {
                    match input.next_byte() {
                        Some(b) => buf.push(b),
                        None => return Ok(Step::NeedMore),
                    }
                }
                let d = BigEndian::read_f64(&buf[..]);
                self.scalar(narrow_double(d))
            }
            Body::String(node) => match node.step(input, session)? {
                Some(s) => {
                    self.complete = Some(Value::String(s));
                    Ok(Step::Done)
                }
                None => Ok(Step::NeedMore),
            },
            Body::Binary(node) => {
                let step = node.step(input, session)?;
                if step == Step::Done {
                    self.complete = node.value.take();
                }
                Ok(step)
            }
            Body::Array(node) => {
                let step = node.step(input, session)?;
                if step == Step::Done {
                    self.complete = node.value.take();
                }
                Ok(step)
            }
            Body::Object(node) => {
                let step = node.step(input, session)?;
                if self.value.is_none() {
                    self.value = node.announced.clone();
                }
                if step == Step::Done {
                    self.complete = node.value.take();
                }
                Ok(step)
            }
        }
    }

    fn scalar(
        &mut self,
        value: ValuePush,
    ) -> ZvResult<Step> {
        self.complete = Some(value.final_value()?);
        self.value = Some(value);
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

    /// Прочитанное значение; без хранения объектов составные значения
    /// не собираются и заменяются `null`.
    fn take_value(&mut self) -> Value {
        self.complete.take().unwrap_or(Value::Null)
    }
}

fn unsupported(what: &'static str) -> zvalue_error::StackError {
    ParseError::Unsupported {
        format: FORMAT,
        what,
    }
    .into()
}

struct Amf3Root {
    session: Session,
    node: ValueNode,
}

impl RootDecode for Amf3Root {
    fn step(
        &mut self,
        input: &mut DecoderInput,
    ) -> ZvResult<Step> {
        self.node.step(input, &mut self.session)
    }

    fn take_announced(&mut self) -> Option<ValuePush> {
        self.node.take_announced()
    }
}

/// Push-декодер AMF3.
///
/// С `allow_object_refs == false` прочитанные составные значения не
/// хранятся, и ссылки на них дают `null`.
pub fn push_decoder(
    output: OutputFn,
    options: DecodeOptions,
) -> PushDecoder {
    let root = Amf3Root {
        session: Session {
            sink: Sink::new(FORMAT, options.exception_handler),
            history: History {
                strings: Vec::new(),
                traits: Vec::new(),
                objects: Vec::new(),
                store_objects: options.allow_object_refs,
            },
        },
        node: ValueNode::default(),
    };
    PushDecoder::new(FORMAT, Box::new(root), output)
}
