//! Pull-энкодер AMF3.
//!
//! Длины строк, байтов и массивов пишутся заранее, поэтому их потоки
//! дочитываются до конца перед выводом заголовка. Все объекты кодируются
//! как анонимные динамические; описание класса отправляется один раз,
//! дальше на него ссылаются.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{error, warn};
use zvalue_error::{ProtocolViolation, ZvResult};

use super::marker;
use crate::{
    codec::output::{ByteSource, Carry, EncoderLimits, Fit},
    stream::{ArrayPull, BinaryPull, ObjectPull, PullSource, ValuePull},
};

const MIN_BUFFER: usize = 16;
/// Наибольший размер фрагмента при разбиении на куски.
const CHUNK_LIMIT: usize = 1 << 16;
/// Длины и индексы ссылок занимают 28 бит U29.
const MAX_LENGTH: usize = 1 << 28;
/// Маркер и double.
const MAX_SCALAR: usize = 9;
/// Самый длинный U29.
const MAX_U29: usize = 4;

/// Что уже отправлено в этом сообщении.
#[derive(Default)]
struct History {
    strings: HashMap<String, usize>,
    num_strings: usize,
    base_traits_sent: bool,
}

impl History {
    /// Пишет ссылку на ранее отправленную строку. Если строки в таблице
    /// нет, регистрирует её под следующим индексом и возвращает `false`.
    fn reference(
        &mut self,
        dest: &mut Vec<u8>,
        s: &str,
    ) -> bool {
        if let Some(&index) = self.strings.get(s) {
            write_u29(dest, (index << 1) as u32);
            return true;
        }
        if self.num_strings < MAX_LENGTH {
            self.strings.insert(s.to_owned(), self.num_strings);
        }
        self.num_strings += 1;
        false
    }
}

/// Беззнаковое 29-битное целое: до трёх байт по 7 бит со старшим битом
/// продолжения, четвёртый байт целиком.
pub(crate) fn write_u29(
    dest: &mut Vec<u8>,
    x: u32,
) {
    debug_assert!(x < 1 << 29);
    if x < 1 << 7 {
        dest.push(x as u8);
    } else if x < 1 << 14 {
        dest.push(0x80 | (x >> 7) as u8);
        dest.push((x & 0x7f) as u8);
    } else if x < 1 << 21 {
        dest.push(0x80 | (x >> 14) as u8);
        dest.push(0x80 | ((x >> 7) & 0x7f) as u8);
        dest.push((x & 0x7f) as u8);
    } else {
        dest.push(0x80 | (x >> 22) as u8);
        dest.push(0x80 | ((x >> 15) & 0x7f) as u8);
        dest.push(0x80 | ((x >> 8) & 0x7f) as u8);
        dest.push(x as u8);
    }
}

fn write_double(
    dest: &mut Vec<u8>,
    d: f64,
) {
    dest.push(marker::DOUBLE);
    dest.extend_from_slice(&d.to_be_bytes());
}

/// Целое, не помещающееся в 29 бит со знаком, уходит как double.
fn write_integer(
    dest: &mut Vec<u8>,
    i: i64,
) {
    match i >> 28 {
        0 | -1 => {
            dest.push(marker::INTEGER);
            write_u29(dest, (i as u32) & 0x1fff_ffff);
        }
        _ => write_double(dest, i as f64),
    }
}

fn length_header(
    len: usize,
    what: &'static str,
) -> ZvResult<u32> {
    if len >= MAX_LENGTH {
        return Err(ProtocolViolation::Unencodable { reason: what }.into());
    }
    Ok(((len << 1) | 1) as u32)
}

struct BytesState {
    source: ByteSource,
    started: bool,
    remaining: usize,
    carry: Carry,
}

impl BytesState {
    fn new(source: ByteSource) -> Self {
        Self {
            source,
            started: false,
            remaining: 0,
            carry: Carry::default(),
        }
    }

    /// Заголовок строки или байтов. `true` - значение целиком записано
    /// ссылкой на строку из таблицы.
    fn start(
        &mut self,
        dest: &mut Vec<u8>,
        history: &mut History,
    ) -> ZvResult<bool> {
        let len = match self.source.final_size() {
            Some(len) => len,
            None => self.source.pull_size()?,
        };
        match &self.source {
            ByteSource::String(s) => {
                dest.push(marker::STRING);
                if len > 0 && s.is_final() {
                    let text = s.pull_final()?;
                    if history.reference(dest, &text) {
                        return Ok(true);
                    }
                } else if len > 0 {
                    history.num_strings += 1;
                }
                write_u29(dest, length_header(len, "amf3 string too long")?);
            }
            ByteSource::Binary(_) => {
                dest.push(marker::BYTE_ARRAY);
                write_u29(dest, length_header(len, "amf3 byte array too long")?);
            }
        }
        self.remaining = len;
        Ok(false)
    }

    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        history: &mut History,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            if self.start(dest, history)? {
                return Ok((None, true));
            }
        }
        let source = &self.source;
        while let Some((mut chunk, retried)) = self.carry.next(|| source.pull())? {
            if !retried && chunk.len() > self.remaining {
                error!(
                    "amf3 encoder: data longer than declared ({} > {})",
                    chunk.len(),
                    self.remaining
                );
                chunk.truncate(self.remaining);
            }
            let len = chunk.len();
            match self
                .carry
                .place(dest, dest_size, copy_threshold, chunk, retried)
            {
                Fit::Copied => self.remaining -= len,
                Fit::Deferred => return Ok((None, false)),
                Fit::Moved(chunk) => {
                    self.remaining -= len;
                    return Ok((Some(chunk), false));
                }
            }
        }
        if self.remaining > 0 {
            warn!("amf3 encoder: data ended {} bytes short", self.remaining);
        }
        Ok((None, true))
    }
}

struct ArrayState {
    stream: ArrayPull,
    started: bool,
    remaining: usize,
    child: Option<Box<Amf3Node>>,
}

impl ArrayState {
    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        history: &mut History,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            let len = match self.stream.final_size() {
                Some(len) => len,
                None => self.stream.pull_size()?,
            };
            dest.push(marker::ARRAY);
            write_u29(dest, length_header(len, "amf3 array too long")?);
            // пустая ассоциативная часть
            dest.push(0x01);
            self.remaining = len;
            self.child = self.next_child()?;
        }
        while let Some(child) = self.child.as_mut() {
            if dest.len() + MAX_SCALAR > dest_size {
                return Ok((None, false));
            }
            let moved = child.pull(dest, dest_size, copy_threshold, history)?;
            if moved.is_some() || !child.complete {
                return Ok((moved, false));
            }
            self.child = self.next_child()?;
        }
        Ok((None, true))
    }

    fn next_child(&mut self) -> ZvResult<Option<Box<Amf3Node>>> {
        let Some(value) = self.stream.pull()? else {
            if self.remaining > 0 {
                warn!("amf3 encoder: array ended {} elements short", self.remaining);
            }
            return Ok(None);
        };
        if self.remaining == 0 {
            error!("amf3 encoder: array longer than declared");
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Box::new(Amf3Node::new(&value))))
    }
}

struct ObjectState {
    stream: ObjectPull,
    started: bool,
    key: Option<String>,
    child: Option<Box<Amf3Node>>,
    closed: bool,
}

impl ObjectState {
    /// Ключ ссылкой или строкой. Длинный ключ отдаётся без копирования.
    /// `Some(None)` - не хватило места.
    fn write_key(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        history: &mut History,
    ) -> ZvResult<Option<Option<Bytes>>> {
        let Some(key) = self.key.take() else {
            return Ok(None);
        };
        if dest.len() + MAX_U29 > dest_size {
            self.key = Some(key);
            return Ok(Some(None));
        }
        if key.is_empty() {
            return Err(ProtocolViolation::Unencodable {
                reason: "amf3 object key must not be empty",
            }
            .into());
        }
        let header = length_header(key.len(), "amf3 object key too long")?;
        let inline = key.len() < copy_threshold && key.len() + MAX_U29 <= dest_size;
        if inline && dest.len() + MAX_U29 + key.len() > dest_size {
            self.key = Some(key);
            return Ok(Some(None));
        }
        if history.reference(dest, &key) {
            return Ok(None);
        }
        write_u29(dest, header);
        if inline {
            dest.extend_from_slice(key.as_bytes());
            return Ok(None);
        }
        Ok(Some(Some(Bytes::from(key))))
    }

    fn open(&mut self) -> ZvResult<bool> {
        match self.stream.pull()? {
            Some((key, value)) => {
                self.key = Some(key);
                self.child = Some(Box::new(Amf3Node::new(&value)));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        history: &mut History,
    ) -> ZvResult<(Option<Bytes>, bool)> {
        if !self.started {
            self.started = true;
            dest.push(marker::OBJECT);
            if history.base_traits_sent {
                // ссылка на описание класса 0
                dest.push(0x01);
            } else {
                // динамический анонимный класс без полей
                dest.extend_from_slice(&[0x0b, 0x01]);
                history.base_traits_sent = true;
            }
            self.open()?;
        }
        loop {
            if let Some(moved) = self.write_key(dest, dest_size, copy_threshold, history)? {
                return Ok((moved, false));
            }
            if let Some(child) = self.child.as_mut() {
                if dest.len() + MAX_SCALAR > dest_size {
                    return Ok((None, false));
                }
                let moved = child.pull(dest, dest_size, copy_threshold, history)?;
                if moved.is_some() || !child.complete {
                    return Ok((moved, false));
                }
                self.child = None;
                if self.open()? {
                    continue;
                }
            }
            if !self.closed {
                if dest.len() >= dest_size {
                    return Ok((None, false));
                }
                // пустой ключ завершает динамические поля
                dest.push(0x01);
                self.closed = true;
            }
            return Ok((None, true));
        }
    }
}

enum State {
    Scalar(ValuePull),
    Bytes(BytesState),
    Array(ArrayState),
    Object(ObjectState),
}

struct Amf3Node {
    state: State,
    complete: bool,
}

impl Amf3Node {
    fn new(value: &ValuePull) -> Self {
        let state = match value {
            ValuePull::String(s) => State::Bytes(BytesState::new(ByteSource::String(s.clone()))),
            ValuePull::Binary(b) => State::Bytes(BytesState::new(ByteSource::Binary(b.clone()))),
            ValuePull::Array(a) => State::Array(ArrayState {
                stream: a.clone(),
                started: false,
                remaining: 0,
                child: None,
            }),
            ValuePull::Object(o) => State::Object(ObjectState {
                stream: o.clone(),
                started: false,
                key: None,
                child: None,
                closed: false,
            }),
            scalar => State::Scalar(scalar.clone()),
        };
        Self {
            state,
            complete: false,
        }
    }

    /// Дописывает в `dest` не больше `dest_size` байт; перед вызовом в
    /// буфере должно оставаться место под скаляр. Возвращённый фрагмент
    /// следует за содержимым `dest`.
    fn pull(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        history: &mut History,
    ) -> ZvResult<Option<Bytes>> {
        let (moved, complete) = match &mut self.state {
            State::Scalar(value) => {
                match value {
                    ValuePull::Null => dest.push(marker::NULL),
                    ValuePull::Boolean(false) => dest.push(marker::FALSE),
                    ValuePull::Boolean(true) => dest.push(marker::TRUE),
                    ValuePull::Integer(i) => write_integer(dest, *i),
                    ValuePull::Real(r) => write_double(dest, *r),
                    _ => {}
                }
                (None, true)
            }
            State::Bytes(state) => state.pull(dest, dest_size, copy_threshold, history)?,
            State::Array(state) => state.pull(dest, dest_size, copy_threshold, history)?,
            State::Object(state) => state.pull(dest, dest_size, copy_threshold, history)?,
        };
        self.complete = complete;
        Ok(moved)
    }
}

/// Источник кусков закодированного сообщения.
struct Amf3Encoder {
    root: Amf3Node,
    history: History,
    limits: EncoderLimits,
    chunked: bool,
    extra: Option<Bytes>,
}

impl Amf3Encoder {
    /// Содержимое буфера и фрагмент без копирования за ним; пусто
    /// только по завершении значения.
    fn fill(
        &mut self,
        buf: &mut Vec<u8>,
    ) -> ZvResult<Option<Bytes>> {
        let EncoderLimits {
            buffer_size,
            copy_threshold,
        } = self.limits;
        let start = buf.len();
        loop {
            let moved = self
                .root
                .pull(buf, buffer_size, copy_threshold, &mut self.history)?;
            if buf.len() > start || moved.is_some() || self.root.complete {
                return Ok(moved);
            }
        }
    }

    /// Кусок с двухбайтовым префиксом длины.
    fn frame(
        &mut self,
        mut buf: Vec<u8>,
        moved: Option<Bytes>,
    ) -> Bytes {
        let body = buf.len() - 2;
        let moved_len = moved.as_ref().map_or(0, Bytes::len);
        if body + moved_len < CHUNK_LIMIT {
            buf[..2].copy_from_slice(&((body + moved_len) as u16).to_be_bytes());
            if self.root.complete && body + moved_len > 0 {
                buf.extend_from_slice(&[0, 0]);
            }
            self.extra = moved;
            return Bytes::from(buf);
        }
        if body > 0 {
            buf[..2].copy_from_slice(&(body as u16).to_be_bytes());
        } else {
            // нулевая длина означала бы конец сообщения
            buf.clear();
        }
        let Some(moved) = moved else {
            return Bytes::from(buf);
        };
        if moved.len() < CHUNK_LIMIT {
            buf.extend_from_slice(&(moved.len() as u16).to_be_bytes());
            self.extra = Some(moved);
            return Bytes::from(buf);
        }
        let mut split = Vec::with_capacity(moved.len() + (moved.len() >> 15) + 2);
        for piece in moved.chunks(CHUNK_LIMIT - 1) {
            split.extend_from_slice(&(piece.len() as u16).to_be_bytes());
            split.extend_from_slice(piece);
        }
        self.extra = Some(Bytes::from(split));
        Bytes::from(buf)
    }
}

impl PullSource<Bytes> for Amf3Encoder {
    fn next_item(&mut self) -> ZvResult<Option<Bytes>> {
        if let Some(extra) = self.extra.take() {
            return Ok(Some(extra));
        }
        if self.root.complete {
            return Ok(None);
        }
        let mut buf = Vec::with_capacity(self.limits.buffer_size);
        if self.chunked {
            buf.extend_from_slice(&[0, 0]);
            let moved = self.fill(&mut buf)?;
            return Ok(Some(self.frame(buf, moved)));
        }
        let moved = self.fill(&mut buf)?;
        if buf.is_empty() {
            return Ok(moved);
        }
        self.extra = moved;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Кодирует значение в AMF3 по мере чтения результата.
///
/// С `chunked` каждый кусок предваряется длиной (два байта, big endian),
/// а сообщение завершается куском нулевой длины.
pub fn pull_encoder(
    value: &ValuePull,
    limits: EncoderLimits,
    chunked: bool,
) -> ZvResult<BinaryPull> {
    limits.validate("amf3", MIN_BUFFER)?;
    if chunked && limits.buffer_size > CHUNK_LIMIT {
        return Err(ProtocolViolation::InvalidConfig {
            reason: format!(
                "amf3 chunked buffer size {} exceeds {CHUNK_LIMIT}",
                limits.buffer_size
            ),
        }
        .into());
    }
    let encoder = Amf3Encoder {
        root: Amf3Node::new(value),
        history: History::default(),
        limits,
        chunked,
        extra: None,
    };
    Ok(BinaryPull::from_source(encoder))
}
