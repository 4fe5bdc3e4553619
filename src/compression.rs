//! Сжатие zlib: разовые функции и адаптеры pull/push-потоков.
//!
//! Любой сбой движка фатален: поток считается повреждённым, повторов
//! нет.

use std::{collections::VecDeque, mem};

use bytes::Bytes;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::{trace, warn};
use zvalue_error::{CompressionError, CompressionOp, ZvResult};

use crate::stream::{
    BinaryPull, BinaryPush, PullSource, PullStream, PushKind, PushStream, StringPull,
};

/// Размер выходного буфера по умолчанию.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Похожи ли два первых байта на заголовок zlib.
pub fn is_compressed(
    b0: u8,
    b1: u8,
) -> bool {
    (b0 & 0x0f) == 8 && (u16::from(b0) * 256 + u16::from(b1)) % 31 == 0
}

fn engine_error(
    op: CompressionOp,
    reason: impl ToString,
) -> zvalue_error::StackError {
    CompressionError::Engine {
        op,
        reason: reason.to_string(),
    }
    .into()
}

type Emit<'a> = &'a mut dyn FnMut(Bytes) -> ZvResult<()>;

/// Буфер вывода фиксированной ёмкости.
struct OutBuf {
    buf: Vec<u8>,
    size: usize,
}

impl OutBuf {
    fn new(size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size),
            size,
        }
    }

    fn is_full(&self) -> bool {
        self.buf.len() >= self.size
    }

    fn take(&mut self) -> Bytes {
        Bytes::from(mem::replace(&mut self.buf, Vec::with_capacity(self.size)))
    }

    /// Отдаёт накопленное, если оно есть.
    fn flush(
        &mut self,
        emit: Emit<'_>,
    ) -> ZvResult<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        emit(self.take())
    }
}

struct Deflater {
    engine: Compress,
    out: OutBuf,
    done: bool,
}

impl Deflater {
    fn new(buffer_size: usize) -> Self {
        Self {
            engine: Compress::new(Compression::default(), true),
            out: OutBuf::new(buffer_size.max(1)),
            done: false,
        }
    }

    fn feed(
        &mut self,
        mut input: &[u8],
        flush: FlushCompress,
        emit: Emit<'_>,
    ) -> ZvResult<()> {
        loop {
            if self.out.is_full() {
                emit(self.out.take())?;
            }
            let (in0, out0) = (self.engine.total_in(), self.engine.total_out());
            self.engine
                .compress_vec(input, &mut self.out.buf, flush)
                .map_err(|e| engine_error(CompressionOp::Deflate, e))?;
            let consumed = (self.engine.total_in() - in0) as usize;
            input = &input[consumed..];
            if input.is_empty() && !self.out.is_full() {
                return Ok(());
            }
            if consumed == 0 && self.engine.total_out() == out0 && !self.out.is_full() {
                return Err(engine_error(CompressionOp::Deflate, "no progress"));
            }
        }
    }

    fn finish(
        &mut self,
        emit: Emit<'_>,
    ) -> ZvResult<()> {
        while !self.done {
            if self.out.is_full() {
                emit(self.out.take())?;
            }
            let out0 = self.engine.total_out();
            let status = self
                .engine
                .compress_vec(&[], &mut self.out.buf, FlushCompress::Finish)
                .map_err(|e| engine_error(CompressionOp::Deflate, e))?;
            if status == Status::StreamEnd {
                self.done = true;
            } else if self.engine.total_out() == out0 && !self.out.is_full() {
                return Err(engine_error(CompressionOp::Deflate, "no progress"));
            }
        }
        self.out.flush(emit)
    }
}

impl Drop for Deflater {
    fn drop(&mut self) {
        trace!(
            "zlib deflate: total {} in {} out",
            self.engine.total_in(),
            self.engine.total_out()
        );
    }
}

struct Inflater {
    engine: Decompress,
    out: OutBuf,
    done: bool,
}

impl Inflater {
    fn new(buffer_size: usize) -> Self {
        Self {
            engine: Decompress::new(true),
            out: OutBuf::new(buffer_size.max(1)),
            done: false,
        }
    }

    fn feed(
        &mut self,
        mut input: &[u8],
        emit: Emit<'_>,
    ) -> ZvResult<()> {
        if self.done {
            if !input.is_empty() {
                warn!("zlib inflate done with {} input bytes remaining", input.len());
            }
            return Ok(());
        }
        loop {
            if self.out.is_full() {
                emit(self.out.take())?;
            }
            let (in0, out0) = (self.engine.total_in(), self.engine.total_out());
            let status = self
                .engine
                .decompress_vec(input, &mut self.out.buf, FlushDecompress::None)
                .map_err(|e| engine_error(CompressionOp::Inflate, e))?;
            let consumed = (self.engine.total_in() - in0) as usize;
            input = &input[consumed..];
            if status == Status::StreamEnd {
                self.done = true;
                if !input.is_empty() {
                    warn!("zlib inflate done with {} input bytes remaining", input.len());
                }
                return self.out.flush(emit);
            }
            if input.is_empty() && !self.out.is_full() {
                return Ok(());
            }
            if consumed == 0 && self.engine.total_out() == out0 && !self.out.is_full() {
                return Err(engine_error(CompressionOp::Inflate, "no progress"));
            }
        }
    }

    /// Конец сжатого входа: поток zlib обязан быть завершён.
    fn finish(
        &mut self,
        emit: Emit<'_>,
    ) -> ZvResult<()> {
        while !self.done {
            if self.out.is_full() {
                emit(self.out.take())?;
            }
            let out0 = self.engine.total_out();
            let status = self
                .engine
                .decompress_vec(&[], &mut self.out.buf, FlushDecompress::Finish)
                .map_err(|_| CompressionError::PrematureEnd {
                    op: CompressionOp::Inflate,
                })?;
            if status == Status::StreamEnd {
                self.done = true;
            } else if self.engine.total_out() == out0 && !self.out.is_full() {
                warn!("zlib inflate error (premature end)");
                return Err(CompressionError::PrematureEnd {
                    op: CompressionOp::Inflate,
                }
                .into());
            }
        }
        self.out.flush(emit)
    }
}

impl Drop for Inflater {
    fn drop(&mut self) {
        trace!(
            "zlib inflate: total {} in {} out",
            self.engine.total_in(),
            self.engine.total_out()
        );
    }
}

fn concat(chunks: Vec<Bytes>) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.into_iter().next().unwrap_or_default(),
        _ => Bytes::from(chunks.concat()),
    }
}

/// Сжимает данные целиком.
pub fn deflate(data: &[u8]) -> ZvResult<Bytes> {
    let mut chunks = Vec::new();
    let mut emit = |b: Bytes| {
        chunks.push(b);
        Ok(())
    };
    let mut deflater = Deflater::new((data.len() / 2).max(DEFAULT_BUFFER_SIZE));
    deflater.feed(data, FlushCompress::None, &mut emit)?;
    deflater.finish(&mut emit)?;
    drop(deflater);
    Ok(concat(chunks))
}

/// Распаковывает поток zlib целиком. Байты после конца потока
/// игнорируются с предупреждением.
pub fn inflate(data: &[u8]) -> ZvResult<Bytes> {
    let mut chunks = Vec::new();
    let mut emit = |b: Bytes| {
        chunks.push(b);
        Ok(())
    };
    let mut inflater = Inflater::new((data.len() * 2).max(DEFAULT_BUFFER_SIZE));
    inflater.feed(data, &mut emit)?;
    inflater.finish(&mut emit)?;
    drop(inflater);
    Ok(concat(chunks))
}

/// Источник сжатых кусков поверх pull-потока.
struct DeflateSource {
    input: Option<BinaryPull>,
    deflater: Deflater,
    ready: VecDeque<Bytes>,
}

impl PullSource<Bytes> for DeflateSource {
    fn next_item(&mut self) -> ZvResult<Option<Bytes>> {
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Ok(Some(chunk));
            }
            let ready = &mut self.ready;
            let mut emit = |b: Bytes| {
                ready.push_back(b);
                Ok(())
            };
            let Some(input) = &self.input else {
                return Ok(None);
            };
            match input.pull()? {
                Some(chunk) if chunk.is_empty() => {}
                Some(chunk) => self.deflater.feed(&chunk, FlushCompress::None, &mut emit)?,
                None => {
                    self.deflater.finish(&mut emit)?;
                    self.input = None;
                }
            }
        }
    }
}

/// Источник распакованных кусков поверх pull-потока.
struct InflateSource {
    input: Option<BinaryPull>,
    inflater: Inflater,
    ready: VecDeque<Bytes>,
}

impl PullSource<Bytes> for InflateSource {
    fn next_item(&mut self) -> ZvResult<Option<Bytes>> {
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Ok(Some(chunk));
            }
            let ready = &mut self.ready;
            let mut emit = |b: Bytes| {
                ready.push_back(b);
                Ok(())
            };
            let Some(input) = &self.input else {
                return Ok(None);
            };
            if self.inflater.done {
                // дальше - мусор после потока zlib
                let mut rest = 0;
                while let Some(chunk) = input.pull()? {
                    rest += chunk.len();
                }
                if rest > 0 {
                    warn!("zlib inflate done with {rest} input bytes remaining");
                }
                self.input = None;
                continue;
            }
            match input.pull()? {
                Some(chunk) if chunk.is_empty() => {}
                Some(chunk) => self.inflater.feed(&chunk, &mut emit)?,
                None => {
                    self.inflater.finish(&mut emit)?;
                    self.input = None;
                }
            }
        }
    }
}

fn inflate_source(
    input: &BinaryPull,
    buffer_size: usize,
) -> InflateSource {
    InflateSource {
        input: Some(input.clone()),
        inflater: Inflater::new(buffer_size),
        ready: VecDeque::new(),
    }
}

/// Сжимает pull-поток кусками по `buffer_size` байт.
pub fn pull_deflate(
    input: &BinaryPull,
    buffer_size: usize,
) -> BinaryPull {
    PullStream::from_source(DeflateSource {
        input: Some(input.clone()),
        deflater: Deflater::new(buffer_size),
        ready: VecDeque::new(),
    })
}

/// Распаковывает pull-поток в бинарные данные.
pub fn pull_inflate_binary(
    input: &BinaryPull,
    buffer_size: usize,
) -> BinaryPull {
    PullStream::from_source(inflate_source(input, buffer_size))
}

/// Распаковывает pull-поток в строку.
pub fn pull_inflate_string(
    input: &BinaryPull,
    buffer_size: usize,
) -> StringPull {
    PullStream::from_source(inflate_source(input, buffer_size))
}

/// Поток, принимающий несжатые куски и передающий сжатые в `output`.
///
/// С `sync` после каждого куска вывод сбрасывается, чтобы получатель мог
/// распаковать всё, что уже отправлено.
pub fn push_deflate(
    output: BinaryPush,
    buffer_size: usize,
    sync: bool,
) -> ZvResult<BinaryPush> {
    let input = BinaryPush::new();
    let mut deflater = Deflater::new(buffer_size);
    input.set_value_handler(move |item: Option<Bytes>| {
        let mut emit = |b: Bytes| output.push(b);
        match item {
            Some(chunk) if chunk.is_empty() => Ok(()),
            Some(chunk) if sync => {
                deflater.feed(&chunk, FlushCompress::Sync, &mut emit)?;
                deflater.out.flush(&mut emit)
            }
            Some(chunk) => deflater.feed(&chunk, FlushCompress::None, &mut emit),
            None => {
                deflater.finish(&mut emit)?;
                output.end()
            }
        }
    })?;
    Ok(input)
}

/// Поток, принимающий сжатые куски и передающий распакованные в
/// `output` (строковый или бинарный).
pub fn push_inflate<K>(
    output: PushStream<K>,
    buffer_size: usize,
) -> ZvResult<BinaryPush>
where
    K: PushKind<Item = Bytes>,
{
    let input = BinaryPush::new();
    let mut inflater = Inflater::new(buffer_size);
    input.set_value_handler(move |item: Option<Bytes>| {
        let mut emit = |b: Bytes| output.push(b);
        match item {
            Some(chunk) => inflater.feed(&chunk, &mut emit),
            None => {
                inflater.finish(&mut emit)?;
                output.end()
            }
        }
    })?;
    Ok(input)
}
