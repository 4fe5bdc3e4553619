//! Общие части pull-энкодеров: буфер вывода и параметры.

use bytes::Bytes;
use zvalue_error::{ProtocolViolation, ZvResult};

use crate::stream::{BinaryPull, StringPull};

/// Размер выходного буфера и порог, начиная с которого фрагменты
/// отдаются потребителю без копирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderLimits {
    pub buffer_size: usize,
    pub copy_threshold: usize,
}

impl Default for EncoderLimits {
    fn default() -> Self {
        Self {
            buffer_size: 8192,
            copy_threshold: 512,
        }
    }
}

impl EncoderLimits {
    pub fn new(
        buffer_size: usize,
        copy_threshold: usize,
    ) -> Self {
        Self {
            buffer_size,
            copy_threshold,
        }
    }

    /// Проверяет параметры для формата с минимальным буфером `min_buffer`.
    pub(crate) fn validate(
        &self,
        format: &str,
        min_buffer: usize,
    ) -> ZvResult<()> {
        if self.buffer_size < min_buffer {
            return Err(ProtocolViolation::InvalidConfig {
                reason: format!(
                    "{format} buffer size {} is below {min_buffer}",
                    self.buffer_size
                ),
            }
            .into());
        }
        if self.copy_threshold > self.buffer_size {
            return Err(ProtocolViolation::InvalidConfig {
                reason: format!(
                    "copy threshold {} exceeds buffer size {}",
                    self.copy_threshold, self.buffer_size
                ),
            }
            .into());
        }
        Ok(())
    }
}

/// Строка или бинарные данные как источник байтов.
///
/// Держит исходный поток, чтобы не потерять объявленный размер.
pub(crate) enum ByteSource {
    String(StringPull),
    Binary(BinaryPull),
}

impl ByteSource {
    pub(crate) fn pull(&self) -> ZvResult<Option<Bytes>> {
        match self {
            Self::String(s) => s.pull(),
            Self::Binary(b) => b.pull(),
        }
    }

    pub(crate) fn final_size(&self) -> Option<usize> {
        match self {
            Self::String(s) => s.final_size(),
            Self::Binary(b) => b.final_size(),
        }
    }

    /// Размер, при необходимости дочитанный в буфер потока.
    pub(crate) fn pull_size(&self) -> ZvResult<usize> {
        match self {
            Self::String(s) => s.pull_size(),
            Self::Binary(b) => b.pull_size(),
        }
    }
}

/// Куда попал фрагмент.
pub(crate) enum Fit {
    /// Скопирован в буфер.
    Copied,
    /// Не поместился и отложен до следующего вызова.
    Deferred,
    /// Отдаётся потребителю целиком, вслед за буфером.
    Moved(Bytes),
}

/// Фрагмент, отложенный из-за нехватки места в буфере.
#[derive(Default)]
pub(crate) struct Carry {
    chunk: Option<Bytes>,
}

impl Carry {
    /// Отложенный фрагмент либо следующий из `pull`. Второй элемент
    /// пары - фрагмент уже откладывался.
    pub(crate) fn next(
        &mut self,
        pull: impl FnOnce() -> ZvResult<Option<Bytes>>,
    ) -> ZvResult<Option<(Bytes, bool)>> {
        if let Some(chunk) = self.chunk.take() {
            return Ok(Some((chunk, true)));
        }
        Ok(pull()?.map(|chunk| (chunk, false)))
    }

    pub(crate) fn defer(
        &mut self,
        chunk: Bytes,
    ) {
        self.chunk = Some(chunk);
    }

    /// Копирует фрагмент в `dest`, если он мал и помещается. Крупный
    /// фрагмент, как и отложенный, который снова не поместился, уходит
    /// без копирования.
    pub(crate) fn place(
        &mut self,
        dest: &mut Vec<u8>,
        dest_size: usize,
        copy_threshold: usize,
        chunk: Bytes,
        retried: bool,
    ) -> Fit {
        let overflow = dest.len() + chunk.len() > dest_size;
        if !chunk.is_empty() && (chunk.len() >= copy_threshold || (retried && overflow)) {
            return Fit::Moved(chunk);
        }
        if overflow {
            self.defer(chunk);
            return Fit::Deferred;
        }
        dest.extend_from_slice(&chunk);
        Fit::Copied
    }
}

/// Следующий выходной фрагмент: буфер либо, если буфер пуст, фрагмент
/// без копирования. Фрагмент при непустом буфере откладывается в
/// `extra`.
pub(crate) fn emit(
    buf: Vec<u8>,
    moved: Option<Bytes>,
    extra: &mut Option<Bytes>,
) -> Bytes {
    if buf.is_empty() {
        return moved.unwrap_or_default();
    }
    *extra = moved;
    Bytes::from(buf)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Тест проверяет правила размещения фрагмента в буфере.
    #[rstest]
    #[case(b"abc", false, 10, 8, "copied")]
    #[case(b"abcdefgh", false, 10, 8, "moved")]
    #[case(b"abcdef", false, 4, 8, "deferred")]
    #[case(b"abcdef", true, 4, 8, "moved")]
    #[case(b"", false, 0, 0, "copied")]
    fn test_place(
        #[case] chunk: &'static [u8],
        #[case] retried: bool,
        #[case] dest_size: usize,
        #[case] threshold: usize,
        #[case] expected: &str,
    ) {
        let mut carry = Carry::default();
        let mut dest = Vec::new();
        let got = match carry.place(
            &mut dest,
            dest_size,
            threshold,
            Bytes::from_static(chunk),
            retried,
        ) {
            Fit::Copied => "copied",
            Fit::Deferred => "deferred",
            Fit::Moved(_) => "moved",
        };
        assert_eq!(got, expected);
    }

    #[test]
    fn test_carry_returns_deferred_first() {
        let mut carry = Carry::default();
        carry.defer(Bytes::from_static(b"x"));
        let (chunk, retried) = carry
            .next(|| Ok(Some(Bytes::from_static(b"y"))))
            .unwrap()
            .unwrap();
        assert_eq!(&chunk[..], b"x");
        assert!(retried);
        let (chunk, retried) = carry
            .next(|| Ok(Some(Bytes::from_static(b"y"))))
            .unwrap()
            .unwrap();
        assert_eq!(&chunk[..], b"y");
        assert!(!retried);
    }

    #[test]
    fn test_limits_validation() {
        assert!(EncoderLimits::new(16, 8).validate("cbor", 16).is_ok());
        assert!(EncoderLimits::new(8, 4).validate("cbor", 16).is_err());
        assert!(EncoderLimits::new(32, 64).validate("json", 32).is_err());
    }
}
