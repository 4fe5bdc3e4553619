//! Вход push-декодеров и общий драйвер верхнего уровня.

use std::fmt;

use bytes::Bytes;
use tracing::{error, warn};
use zvalue_error::{ParseError, ProtocolViolation, StackError, ZvResult};

use crate::stream::ValuePush;

/// Очередной кусок входа и позиция в нём.
///
/// На входе в декодер `data == None` означает конец входа: декодер
/// обязан завершить значение или вернуть ошибку. После вызова `None`
/// означает, что кусок поглощён целиком и нужны ещё данные; если кусок
/// на месте, значение готово, а `pos` указывает на первый непрочитанный
/// байт.
#[derive(Clone, Default)]
pub struct DecoderInput {
    data: Option<Bytes>,
    pos: usize,
}

impl DecoderInput {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
            pos: 0,
        }
    }

    /// Сигнал конца входа.
    pub fn end_of_input() -> Self {
        Self::default()
    }

    pub fn is_end_of_input(&self) -> bool {
        self.data.is_none()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Непрочитанный остаток куска.
    pub fn remaining(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[self.pos..],
            None => &[],
        }
    }

    /// Непрочитанный остаток без копирования.
    pub fn rest(&self) -> Option<Bytes> {
        self.data.as_ref().map(|data| data.slice(self.pos..))
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    pub(crate) fn advance(&mut self) {
        if self.peek().is_some() {
            self.pos += 1;
        }
    }

    pub(crate) fn next_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// До `max` байт из куска без копирования.
    pub(crate) fn take(
        &mut self,
        max: usize,
    ) -> Bytes {
        let Some(data) = &self.data else {
            return Bytes::new();
        };
        let end = data.len().min(self.pos.saturating_add(max));
        let chunk = data.slice(self.pos..end);
        self.pos = end;
        chunk
    }

    fn consumed(&mut self) {
        self.data = None;
        self.pos = 0;
    }
}

impl fmt::Debug for DecoderInput {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DecoderInput")
            .field("len", &self.data.as_ref().map(Bytes::len))
            .field("pos", &self.pos)
            .finish()
    }
}

/// Итог одного шага декодера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Значение декодировано.
    Done,
    /// Вход исчерпан, значение ещё не готово.
    NeedMore,
}

/// Решает, проглотить ли ошибку потребителя (`true`) или прервать
/// декодирование.
pub type ExceptionHandler = Box<dyn FnMut(&StackError) -> bool>;

/// Получатель корневого значения. Вызывается один раз, как только
/// известен тип значения, до того как прочитано его содержимое.
pub type OutputFn = Box<dyn FnOnce(ValuePush) -> ZvResult<()>>;

/// Параметры push-декодера.
pub struct DecodeOptions {
    pub exception_handler: Option<ExceptionHandler>,
    /// Только AMF3: хранить завершённые значения для ссылок на объекты.
    pub allow_object_refs: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            exception_handler: None,
            allow_object_refs: true,
        }
    }
}

impl DecodeOptions {
    pub fn with_exception_handler(
        mut self,
        handler: impl FnMut(&StackError) -> bool + 'static,
    ) -> Self {
        self.exception_handler = Some(Box::new(handler));
        self
    }

    pub fn with_object_refs(
        mut self,
        allow: bool,
    ) -> Self {
        self.allow_object_refs = allow;
        self
    }
}

/// Доставка декодированных данных в потоки.
///
/// Через `deliver` проходят только ошибки записи в потоки; ошибки
/// формата пробрасываются напрямую.
pub(crate) struct Sink {
    format: &'static str,
    handler: Option<ExceptionHandler>,
}

impl Sink {
    pub(crate) fn new(
        format: &'static str,
        handler: Option<ExceptionHandler>,
    ) -> Self {
        Self { format, handler }
    }

    pub(crate) fn deliver(
        &mut self,
        result: ZvResult<()>,
    ) -> ZvResult<()> {
        let Err(err) = result else {
            return Ok(());
        };
        warn!("push_decode_{}: {}", self.format, err);
        let swallowed = match self.handler.as_mut() {
            Some(handler) => handler(&err),
            None => false,
        };
        if swallowed {
            Ok(())
        } else {
            Err(err)
        }
    }
}

/// Корневой узел формата.
pub(crate) trait RootDecode {
    fn step(
        &mut self,
        input: &mut DecoderInput,
    ) -> ZvResult<Step>;

    /// Значение корня, если оно стало известно и ещё не отдано.
    fn take_announced(&mut self) -> Option<ValuePush>;
}

/// Инкрементальный декодер одного значения.
pub struct PushDecoder {
    format: &'static str,
    root: Box<dyn RootDecode>,
    output: Option<OutputFn>,
    complete: bool,
}

impl PushDecoder {
    pub(crate) fn new(
        format: &'static str,
        root: Box<dyn RootDecode>,
        output: OutputFn,
    ) -> Self {
        Self {
            format,
            root,
            output: Some(output),
            complete: false,
        }
    }

    /// Передаёт декодеру очередной кусок входа (или конец входа).
    ///
    /// При [`Step::NeedMore`] кусок помечается поглощённым, при
    /// [`Step::Done`] в нём может остаться хвост за значением.
    pub fn push_input(
        &mut self,
        input: &mut DecoderInput,
    ) -> ZvResult<Step> {
        if self.complete {
            return Err(ProtocolViolation::AlreadyFinal { op: "push_input" }.into());
        }
        let end_of_input = input.is_end_of_input();
        let step = self.root.step(input)?;
        if let Some(value) = self.root.take_announced() {
            if let Some(output) = self.output.take() {
                output(value)?;
            }
        }
        match step {
            Step::Done => self.complete = true,
            Step::NeedMore if end_of_input => {
                return Err(ParseError::Truncated { what: self.format }.into());
            }
            Step::NeedMore => input.consumed(),
        }
        Ok(step)
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl Drop for PushDecoder {
    fn drop(&mut self) {
        if !self.complete && self.output.is_none() {
            error!("push_decode_{}: destructed before value complete", self.format);
        }
    }
}

impl fmt::Debug for PushDecoder {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PushDecoder")
            .field("format", &self.format)
            .field("complete", &self.complete)
            .finish()
    }
}

/// Шестнадцатеричный дамп начала входа для диагностики.
pub(crate) fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_bounded_by_chunk() {
        let mut input = DecoderInput::new(Bytes::from_static(b"abcdef"));
        assert_eq!(input.next_byte(), Some(b'a'));
        assert_eq!(&input.take(3)[..], b"bcd");
        assert_eq!(&input.take(100)[..], b"ef");
        assert!(input.take(1).is_empty());
        assert_eq!(input.pos(), 6);
        assert!(input.peek().is_none());
    }

    /// Тест проверяет, что обработчик исключений может проглотить ошибку
    /// потребителя.
    #[test]
    fn test_sink_handler_swallows() {
        let mut sink = Sink::new("test", Some(Box::new(|_: &StackError| true)));
        let err: StackError = zvalue_error::SinkError::new("boom").into();
        assert!(sink.deliver(Err(err.clone())).is_ok());

        let mut strict = Sink::new("test", None);
        assert!(strict.deliver(Err(err)).unwrap_err().is_sink());
    }

    /// Тест проверяет изменяемый обработчик: он видит каждую ошибку и
    /// проглатывает только первые две.
    #[test]
    fn test_sink_handler_with_state() {
        let mut seen = 0;
        let mut sink = Sink::new(
            "test",
            Some(Box::new(move |_: &StackError| {
                seen += 1;
                seen <= 2
            })),
        );
        let err: StackError = zvalue_error::SinkError::new("boom").into();
        assert!(sink.deliver(Err(err.clone())).is_ok());
        assert!(sink.deliver(Ok(())).is_ok());
        assert!(sink.deliver(Err(err.clone())).is_ok());
        assert!(sink.deliver(Err(err)).is_err());
    }

    #[test]
    fn test_hex_dump_limit() {
        let dump = hex_dump(&[0xab; 20]);
        assert_eq!(dump.split(' ').count(), 16);
        assert!(dump.starts_with("ab ab"));
    }
}
