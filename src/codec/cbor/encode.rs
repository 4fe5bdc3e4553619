//! Pull-энкодер CBOR.

use bytes::Bytes;
use tracing::error;
use zvalue_error::ZvResult;

use crate::{
    codec::output::{emit, ByteSource, Carry, EncoderLimits, Fit},
    compression::is_compressed,
    stream::{ArrayPull, BinaryPull, ObjectPull, PullSource, ValuePull},
};

/// Самоописывающий тег 55799; ставится перед значением, первый байт
/// которого иначе не отличить от AMF3, JSON или zlib.
pub const MAGIC: [u8; 3] = [0xd9, 0xd9, 0xf7];

const BREAK: u8 = 0xff;
/// Самый длинный заголовок: байт типа и 8 байт аргумента.
const MAX_HEADER: usize = 9;
const MIN_BUFFER: usize = 16;

fn header_size(x: u64) -> usize {
    match x {
        0..=23 => 1,
        24..=0xff => 2,
        0x100..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Заголовок `major` с беззнаковым аргументом в кратчайшей форме.
pub(crate) fn write_unsigned(
    dest: &mut Vec<u8>,
    major: u8,
    x: u64,
) {
    match header_size(x) {
        1 => dest.push(major | x as u8),
        2 => {
            dest.push(major | 24);
            dest.push(x as u8);
        }
        3 => {
            dest.push(major | 25);
            dest.extend_from_slice(&(x as u16).to_be_bytes());
        }
        5 => {
            dest.push(major | 26);
            dest.extend_from_slice(&(x as u32).to_be_bytes());
        }
        _ => {
            dest.push(major | 27);
            dest.extend_from_slice(&x.to_be_bytes());
        }
    }
}

fn write_integer(
    dest: &mut Vec<u8>,
    i: i64,
) {
    if i >= 0 {
        write_unsigned(dest, 0x00, i as u64);
    } else {
        // -1 - n без переполнения для i64::MIN
        write_unsigned(dest, 0x20, !(i as u64));
    }
}

/// float32, если значение представимо без потерь, иначе float64.
fn write_real(
    dest: &mut Vec<u8>,
    r: f64,
) {
    let narrow = r as f32;
    if !r.is_nan() && f64::from(narrow) == r {
        dest.push(0xfa);
        dest.extend_from_slice(&narrow.to_be_bytes());
    } else {
        dest.push(0xfb);
        dest.extend_from_slice(&r.to_be_bytes());
    }
}

struct BytesState {
    source: ByteSource,
    major: u8,
    started: bool,
    /// Остаток объявленной длины; `None` - неопределённая длина.
    remaining: Option<usize>,
    carry: Carry,
}

impl BytesState {
    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            self.remaining = self.source.final_size();
            match self.remaining {
                Some(n) => write_unsigned(dest, self.major, n as u64),
                None => dest.push(self.major | 31),
            }
        }
        let source = &self.source;
        while let Some((mut chunk, retried)) = self.carry.next(|| source.pull())? {
            match &mut self.remaining {
                Some(remaining) => {
                    if !retried && chunk.len() > *remaining {
                        error!(
                            "cbor encoder: string longer than declared ({} > {})",
                            chunk.len(),
                            remaining
                        );
                        chunk.truncate(*remaining);
                    }
                    let len = chunk.len();
                    match self
                        .carry
                        .place(dest, dest_size, copy_threshold, chunk, retried)
                    {
                        Fit::Copied => *remaining -= len,
                        Fit::Deferred => return Ok((None, false)),
                        Fit::Moved(chunk) => {
                            *remaining -= len;
                            return Ok((Some(chunk), false));
                        }
                    }
                }
                None => {
                    let header = header_size(chunk.len() as u64);
                    if dest.len() + header > dest_size {
                        self.carry.defer(chunk);
                        return Ok((None, false));
                    }
                    write_unsigned(dest, self.major, chunk.len() as u64);
                    match self
                        .carry
                        .place(dest, dest_size, copy_threshold, chunk, retried)
                    {
                        Fit::Copied => {}
                        Fit::Deferred => {
                            dest.truncate(dest.len() - header);
                            return Ok((None, false));
                        }
                        Fit::Moved(chunk) => return Ok((Some(chunk), false)),
                    }
                }
            }
        }
        if self.remaining.is_none() {
            if dest.len() >= dest_size {
                return Ok((None, false));
            }
            dest.push(BREAK);
        }
        Ok((None, true))
    }
}

/// Массив или объект: длина берётся из `final_size` после первого
/// элемента, иначе неопределённая длина с `0xff` в конце.
struct ContainerState<S> {
    stream: S,
    major: u8,
    started: bool,
    remaining: Option<usize>,
    key: Option<Bytes>,
    child: Option<Box<CborNode>>,
}

/// Что умеют отдавать потоки контейнеров.
trait Entries {
    fn next_entry(&self) -> ZvResult<Option<(Option<String>, ValuePull)>>;
    fn final_size(&self) -> Option<usize>;
}

impl Entries for ArrayPull {
    fn next_entry(&self) -> ZvResult<Option<(Option<String>, ValuePull)>> {
        Ok(self.pull()?.map(|v| (None, v)))
    }

    fn final_size(&self) -> Option<usize> {
        ArrayPull::final_size(self)
    }
}

impl Entries for ObjectPull {
    fn next_entry(&self) -> ZvResult<Option<(Option<String>, ValuePull)>> {
        Ok(self.pull()?.map(|(k, v)| (Some(k), v)))
    }

    fn final_size(&self) -> Option<usize> {
        ObjectPull::final_size(self)
    }
}

impl<S: Entries> ContainerState<S> {
    fn new(
        stream: S,
        major: u8,
    ) -> Self {
        Self {
            stream,
            major,
            started: false,
            remaining: None,
            key: None,
            child: None,
        }
    }

    fn open(
        &mut self,
        entry: (Option<String>, ValuePull),
    ) {
        let (key, value) = entry;
        self.key = key.map(Bytes::from);
        self.child = Some(Box::new(CborNode::new(&value)));
    }

    fn write_key(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> Option<Option<Bytes>> {
        let key = self.key.take()?;
        let header = header_size(key.len() as u64);
        if dest.len() + header > dest_size {
            self.key = Some(key);
            return Some(None);
        }
        if !key.is_empty() && (key.len() >= copy_threshold || key.len() + header > dest_size) {
            write_unsigned(dest, 0x60, key.len() as u64);
            return Some(Some(key));
        }
        if dest.len() + header + key.len() > dest_size {
            self.key = Some(key);
            return Some(None);
        }
        write_unsigned(dest, 0x60, key.len() as u64);
        dest.extend_from_slice(&key);
        None
    }

    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            match self.stream.next_entry()? {
                Some(entry) => {
                    self.remaining = self.stream.final_size();
                    match &mut self.remaining {
                        Some(n) => {
                            write_unsigned(dest, self.major, *n as u64);
                            *n = n.saturating_sub(1);
                        }
                        None => dest.push(self.major | 31),
                    }
                    self.open(entry);
                }
                None => {
                    dest.push(self.major);
                    return Ok((None, true));
                }
            }
        }
        loop {
            if let Some(result) = self.write_key(dest, dest_size, copy_threshold) {
                return Ok((result, false));
            }
            let Some(child) = self.child.as_mut() else {
                return Ok((None, true));
            };
            if !child.complete {
                if dest.len() + MAX_HEADER > dest_size {
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
            match self.stream.next_entry()? {
                Some(entry) => {
                    if let Some(remaining) = &mut self.remaining {
                        if *remaining == 0 {
                            error!("cbor encoder: container longer than declared");
                            self.child = None;
                            continue;
                        }
                        *remaining -= 1;
                    }
                    self.open(entry);
                }
                None => {
                    if self.remaining.is_none() {
                        dest.push(BREAK);
                    }
                    self.child = None;
                }
            }
        }
    }
}

enum State {
    Scalar(ValuePull),
    Bytes(BytesState),
    Array(ContainerState<ArrayPull>),
    Object(ContainerState<ObjectPull>),
}

/// Узел дерева кодирования.
pub(crate) struct CborNode {
    state: State,
    complete: bool,
}

impl CborNode {
    pub(crate) fn new(value: &ValuePull) -> Self {
        let state = match value {
            ValuePull::String(s) => State::Bytes(BytesState {
                source: ByteSource::String(s.clone()),
                major: 0x60,
                started: false,
                remaining: None,
                carry: Carry::default(),
            }),
            ValuePull::Binary(b) => State::Bytes(BytesState {
                source: ByteSource::Binary(b.clone()),
                major: 0x40,
                started: false,
                remaining: None,
                carry: Carry::default(),
            }),
            ValuePull::Array(a) => State::Array(ContainerState::new(a.clone(), 0x80)),
            ValuePull::Object(o) => State::Object(ContainerState::new(o.clone(), 0xa0)),
            scalar => State::Scalar(scalar.clone()),
        };
        Self {
            state,
            complete: false,
        }
    }

    /// Дописывает в `dest` не больше `dest_size` байт. Возвращённый
    /// фрагмент следует за содержимым `dest` без копирования.
    pub(crate) fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
    ) -> ZvResult<Option<Bytes>> {
        let (moved, complete) = match &mut self.state {
            State::Scalar(value) => {
                match value {
                    ValuePull::Null => dest.push(0xf6),
                    ValuePull::Boolean(false) => dest.push(0xf4),
                    ValuePull::Boolean(true) => dest.push(0xf5),
                    ValuePull::Integer(i) => write_integer(dest, *i),
                    ValuePull::Real(r) => write_real(dest, *r),
                    _ => {}
                }
                (None, true)
            }
            State::Bytes(state) => state.pull(dest, dest_size, copy_threshold)?,
            State::Array(state) => state.pull(dest, dest_size, copy_threshold)?,
            State::Object(state) => state.pull(dest, dest_size, copy_threshold)?,
        };
        self.complete = complete;
        Ok(moved)
    }
}

/// Источник кусков закодированного значения.
struct CborEncoder {
    root: CborNode,
    limits: EncoderLimits,
    started: bool,
    extra: Option<Bytes>,
}

impl PullSource<Bytes> for CborEncoder {
    fn next_item(&mut self) -> ZvResult<Option<Bytes>> {
        if let Some(extra) = self.extra.take() {
            return Ok(Some(extra));
        }
        if self.root.complete {
            return Ok(None);
        }
        let EncoderLimits {
            buffer_size,
            copy_threshold,
        } = self.limits;
        let mut buf = Vec::with_capacity(buffer_size);
        if self.started {
            loop {
                let moved = self.root.pull(&mut buf, buffer_size, copy_threshold)?;
                if !buf.is_empty() || moved.is_some() {
                    return Ok(Some(emit(buf, moved, &mut self.extra)));
                }
                if self.root.complete {
                    return Ok(None);
                }
            }
        }
        self.started = true;
        let moved = self
            .root
            .pull(&mut buf, buffer_size - MAGIC.len(), copy_threshold)?;
        if buf.len() < 2 || buf[0] < 0x80 || is_compressed(buf[0], buf[1]) {
            buf.splice(0..0, MAGIC);
        }
        self.extra = moved;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Кодирует значение в CBOR по мере чтения результата.
pub fn pull_encoder(
    value: &ValuePull,
    limits: EncoderLimits,
) -> ZvResult<BinaryPull> {
    limits.validate("cbor", MIN_BUFFER)?;
    let encoder = CborEncoder {
        root: CborNode::new(value),
        limits,
        started: false,
        extra: None,
    };
    Ok(BinaryPull::from_source(encoder))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::value::{Object, Value};

    fn encode(value: &Value) -> Vec<u8> {
        pull_encoder(&ValuePull::from(value), EncoderLimits::default())
            .unwrap()
            .pull_final()
            .unwrap()
            .to_vec()
    }

    #[rstest]
    #[case(Value::Integer(0), &[0xd9, 0xd9, 0xf7, 0x00])]
    #[case(Value::Integer(-1), &[0xd9, 0xd9, 0xf7, 0x20])]
    #[case(Value::Integer(500), &[0xd9, 0xd9, 0xf7, 0x19, 0x01, 0xf4])]
    #[case(Value::Integer(i64::MIN), &[0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])]
    #[case(Value::Null, &[0xd9, 0xd9, 0xf7, 0xf6])]
    #[case(Value::Boolean(true), &[0xd9, 0xd9, 0xf7, 0xf5])]
    #[case(Value::Real(1.25), &[0xfa, 0x3f, 0xa0, 0x00, 0x00])]
    #[case(Value::from("a"), &[0xd9, 0xd9, 0xf7, 0x61, b'a'])]
    #[case(Value::Array(vec![Value::Null]), &[0x81, 0xf6])]
    #[case(Value::Array(vec![]), &[0xd9, 0xd9, 0xf7, 0x80])]
    #[case(Value::Object(Object::new()), &[0xd9, 0xd9, 0xf7, 0xa0])]
    fn test_encode_exact(
        #[case] value: Value,
        #[case] expected: &[u8],
    ) {
        assert_eq!(encode(&value), expected);
    }

    /// Тест проверяет выбор ширины числа с плавающей точкой.
    #[rstest]
    #[case(0.0, 5)]
    #[case(1.25, 5)]
    #[case(-2.0, 5)]
    #[case(-3.125, 5)]
    #[case(f64::INFINITY, 5)]
    #[case(std::f64::consts::PI, 9)]
    #[case(f64::NAN, 9)]
    fn test_real_width(
        #[case] r: f64,
        #[case] size: usize,
    ) {
        let mut dest = Vec::new();
        write_real(&mut dest, r);
        assert_eq!(dest.len(), size);
    }

    #[test]
    fn test_object_with_empty_key() {
        let obj: Object = [("", Value::from(0))].into_iter().collect();
        assert_eq!(encode(&Value::from(obj)), [0xa1, 0x60, 0x00]);
    }

    /// Тест проверяет неопределённую длину для потоков без объявленного
    /// размера.
    #[test]
    fn test_indefinite_lengths() {
        let s = crate::stream::StringPull::from_fn({
            let mut parts = vec![Bytes::from_static(b"cd"), Bytes::from_static(b"ab")];
            move || Ok(parts.pop())
        });
        let arr = ArrayPull::from_fn({
            let mut items = vec![ValuePull::String(s)];
            move || Ok(items.pop())
        });
        let out = pull_encoder(&ValuePull::Array(arr), EncoderLimits::default())
            .unwrap()
            .pull_final()
            .unwrap();
        assert_eq!(
            &out[..],
            &[0x9f, 0x7f, 0x62, b'a', b'b', 0x62, b'c', b'd', 0xff, 0xff]
        );
    }

    /// Тест проверяет, что крупная строка отдаётся отдельным куском без
    /// копирования.
    #[test]
    fn test_large_string_passthrough() {
        let text = "x".repeat(100);
        let stream = pull_encoder(
            &ValuePull::from(Value::from(text.as_str())),
            EncoderLimits::new(16, 16),
        )
        .unwrap();
        let first = stream.pull().unwrap().unwrap();
        assert_eq!(&first[..], &[0xd9, 0xd9, 0xf7, 0x78, 100]);
        let second = stream.pull().unwrap().unwrap();
        assert_eq!(second.len(), 100);
        assert!(stream.pull().unwrap().is_none());
    }

    #[test]
    fn test_small_buffer_rejected() {
        let err = pull_encoder(&ValuePull::Null, EncoderLimits::new(8, 4)).unwrap_err();
        assert!(err.to_string().contains("buffer size"));
    }
}
