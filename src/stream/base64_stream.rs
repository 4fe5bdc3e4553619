//! Потоковый base64 с переносом неполных групп между фрагментами.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use zvalue_error::{ParseError, ZvResult};

fn invalid(reason: impl ToString) -> zvalue_error::StackError {
    ParseError::InvalidBase64 {
        reason: reason.to_string(),
    }
    .into()
}

/// Кодирует байты кусками; хвост короче трёх байт ждёт следующего куска.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    carry: Vec<u8>,
}

impl Base64Encoder {
    pub fn update(
        &mut self,
        src: &[u8],
    ) -> String {
        let mut out = String::new();
        let mut src = src;
        if !self.carry.is_empty() {
            let take = (3 - self.carry.len()).min(src.len());
            self.carry.extend_from_slice(&src[..take]);
            src = &src[take..];
            if self.carry.len() < 3 {
                return out;
            }
            STANDARD.encode_string(&self.carry, &mut out);
            self.carry.clear();
        }
        let whole = src.len() / 3 * 3;
        STANDARD.encode_string(&src[..whole], &mut out);
        self.carry.extend_from_slice(&src[whole..]);
        out
    }

    /// Последняя группа с дополнением `=`.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        if !self.carry.is_empty() {
            STANDARD.encode_string(&self.carry, &mut out);
            self.carry.clear();
        }
        out
    }
}

/// Декодирует текст кусками по четыре символа.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    carry: Vec<u8>,
}

impl Base64Decoder {
    pub fn update(
        &mut self,
        src: &[u8],
    ) -> ZvResult<Vec<u8>> {
        let mut out = Vec::with_capacity((self.carry.len() + src.len()) / 4 * 3);
        let mut src = src;
        if !self.carry.is_empty() {
            let take = (4 - self.carry.len()).min(src.len());
            self.carry.extend_from_slice(&src[..take]);
            src = &src[take..];
            if self.carry.len() < 4 {
                return Ok(out);
            }
            STANDARD
                .decode_vec(&self.carry, &mut out)
                .map_err(invalid)?;
            self.carry.clear();
        }
        for group in src.chunks(4) {
            if group.len() < 4 {
                self.carry.extend_from_slice(group);
                break;
            }
            STANDARD.decode_vec(group, &mut out).map_err(invalid)?;
        }
        Ok(out)
    }

    /// Недостающие символы последней группы считаются `=`; одиночный символ
    /// не может быть корректным base64.
    pub fn finish(&mut self) -> ZvResult<Vec<u8>> {
        let mut out = Vec::new();
        match self.carry.len() {
            0 => {}
            1 => return Err(invalid("dangling base64 character")),
            _ => {
                self.carry.resize(4, b'=');
                STANDARD
                    .decode_vec(&self.carry, &mut out)
                    .map_err(invalid)?;
                self.carry.clear();
            }
        }
        Ok(out)
    }
}
