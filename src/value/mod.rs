//! Материализованная модель значения: дерево из восьми вариантов с полным
//! порядком между типами.

pub mod number;
pub mod object;

use std::{cmp::Ordering, fmt, ops::Index};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use zvalue_error::{ParseError, ValueError, ZvResult};

pub use number::{format_real, write_json_real};
pub use object::{lexicographic, KeyCompare, Object};

/// Полностью материализованное значение.
///
/// Значения разных типов сравниваются по рангу (null < boolean < integer <
/// real < string < binary < array < object), внутри типа - естественным
/// порядком. Вещественные сравниваются через [`OrderedFloat`]: `NaN` равен
/// себе, и порядок остаётся полным.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Binary(Bytes),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Ранг варианта при сравнении разных типов.
    pub fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Real(_) => 3,
            Value::String(_) => 4,
            Value::Binary(_) => 5,
            Value::Array(_) => 6,
            Value::Object(_) => 7,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    fn mismatch(
        &self,
        expected: &'static str,
    ) -> ValueError {
        ValueError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Истинность: пустые контейнеры, нули и строки `""` и `"0"` ложны.
    pub fn make_boolean(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::String(s) => !s.is_empty() && s != "0",
            Value::Binary(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Целое; строка разбирается нестрого (ведущее целое, иначе 0).
    pub fn make_integer(&self) -> ZvResult<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::String(s) => Ok(number::parse_integer_prefix(s)),
            other => Err(other.mismatch("integer").into()),
        }
    }

    /// Вещественное; целые расширяются, строки разбираются нестрого.
    pub fn make_real(&self) -> ZvResult<f64> {
        match self {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            Value::String(s) => Ok(number::parse_real_prefix(s)),
            other => Err(other.mismatch("real").into()),
        }
    }

    /// Строка; бинарные данные кодируются в base64.
    pub fn make_string(&self) -> ZvResult<String> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Binary(b) => Ok(STANDARD.encode(b)),
            other => Err(other.mismatch("string").into()),
        }
    }

    /// Бинарные данные; строка декодируется из base64.
    pub fn make_binary(&self) -> ZvResult<Bytes> {
        match self {
            Value::Binary(b) => Ok(b.clone()),
            Value::String(s) => STANDARD
                .decode(s)
                .map(Bytes::from)
                .map_err(|e| {
                    ParseError::InvalidBase64 {
                        reason: e.to_string(),
                    }
                    .into()
                }),
            other => Err(other.mismatch("binary").into()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Сравнение
////////////////////////////////////////////////////////////////////////////////

impl Ord for Value {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Index<&str> for Value {
    type Output = Value;

    /// Поле объекта; у не-объекта и при отсутствии ключа - `Null`.
    fn index(
        &self,
        key: &str,
    ) -> &Value {
        static NULL: Value = Value::Null;
        match self {
            Value::Object(o) => &o[key],
            _ => &NULL,
        }
    }
}

impl fmt::Display for Value {
    /// Компактный текст в духе JSON, бинарные данные - base64.
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut out = String::new();
        crate::stream::describe::write_value(
            &mut out,
            self,
            &crate::stream::FormatOptions::default(),
            "",
        );
        f.write_str(&out)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Конверсии
////////////////////////////////////////////////////////////////////////////////

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i.into())
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Integer(i.into())
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Binary(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Binary(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Array(iter.into_iter().map(Into::into).collect())
    }
}
