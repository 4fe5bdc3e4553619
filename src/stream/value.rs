//! Значения, часть которых может ещё находиться в пути: скаляры хранятся
//! сразу, контейнеры и строки представлены потоками.

use std::fmt;

use zvalue_error::{ProtocolViolation, ValueError, ZvResult};

use super::{
    describe::FormatOptions,
    ArrayPull, ArrayPush, BinaryPull, BinaryPush, ObjectPull, ObjectPush, StringPull, StringPush,
};
use crate::value::{format_real, KeyCompare, Value};

/// Значение для чтения по запросу.
#[derive(Clone, Debug)]
pub enum ValuePull {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(StringPull),
    Binary(BinaryPull),
    Array(ArrayPull),
    Object(ObjectPull),
}

/// Значение, доставляемое производителем.
#[derive(Clone, Debug)]
pub enum ValuePush {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(StringPush),
    Binary(BinaryPush),
    Array(ArrayPush),
    Object(ObjectPush),
}

fn mismatch(
    expected: &'static str,
    found: &'static str,
) -> zvalue_error::StackError {
    ValueError::TypeMismatch { expected, found }.into()
}

impl ValuePull {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Скаляры финальны всегда, потоки - после конца данных.
    pub fn is_final(&self) -> bool {
        match self {
            Self::String(s) => s.is_final(),
            Self::Binary(b) => b.is_final(),
            Self::Array(a) => a.is_final(),
            Self::Object(o) => o.is_final(),
            _ => true,
        }
    }

    /// Вытягивает все вложенные потоки и собирает значение.
    pub fn pull_final(&self) -> ZvResult<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Integer(i) => Value::Integer(*i),
            Self::Real(r) => Value::Real(*r),
            Self::String(s) => Value::String(s.pull_final()?),
            Self::Binary(b) => Value::Binary(b.pull_final()?),
            Self::Array(a) => Value::Array(a.pull_final()?),
            Self::Object(o) => Value::Object(o.pull_final()?),
        })
    }

    /// Целые расширяются до вещественных.
    pub fn make_real(&self) -> ZvResult<f64> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Real(r) => Ok(*r),
            other => Err(mismatch("real", other.type_name())),
        }
    }

    pub fn describe(
        &self,
        out: &mut String,
        opts: &FormatOptions,
        indent: &str,
    ) {
        match self {
            Self::Null => out.push_str("null"),
            Self::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Integer(i) => out.push_str(&i.to_string()),
            Self::Real(r) => crate::value::write_json_real(out, *r),
            Self::String(s) => s.describe(out, opts, indent),
            Self::Binary(b) => b.describe(out, opts, indent),
            Self::Array(a) => a.describe(out, opts, indent),
            Self::Object(o) => o.describe(out, opts, indent),
        }
    }

    /// Диагностический текст с заданными параметрами.
    pub fn to_string_with(
        &self,
        opts: &FormatOptions,
    ) -> String {
        let mut out = String::new();
        self.describe(&mut out, opts, "");
        out
    }
}

impl fmt::Display for ValuePull {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.to_string_with(&FormatOptions::default()))
    }
}

impl From<Value> for ValuePull {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(b),
            Value::Integer(i) => Self::Integer(i),
            Value::Real(r) => Self::Real(r),
            Value::String(s) => Self::String(StringPull::from_final(s)),
            Value::Binary(b) => Self::Binary(BinaryPull::from_final(b)),
            Value::Array(a) => Self::Array(ArrayPull::from_final(a)),
            Value::Object(o) => Self::Object(ObjectPull::from_final(o)),
        }
    }
}

impl From<&Value> for ValuePull {
    fn from(v: &Value) -> Self {
        Self::from(v.clone())
    }
}

impl From<StringPull> for ValuePull {
    fn from(s: StringPull) -> Self {
        Self::String(s)
    }
}

impl From<BinaryPull> for ValuePull {
    fn from(b: BinaryPull) -> Self {
        Self::Binary(b)
    }
}

impl From<ArrayPull> for ValuePull {
    fn from(a: ArrayPull) -> Self {
        Self::Array(a)
    }
}

impl From<ObjectPull> for ValuePull {
    fn from(o: ObjectPull) -> Self {
        Self::Object(o)
    }
}

impl ValuePush {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    pub fn is_final(&self) -> bool {
        match self {
            Self::String(s) => s.is_final(),
            Self::Binary(b) => b.is_final(),
            Self::Array(a) => a.is_final(),
            Self::Object(o) => o.is_final(),
            _ => true,
        }
    }

    /// Продолжение после завершения вложенного потока. Скаляры уже
    /// финальны, поэтому для них это ошибка.
    pub fn set_parent_handler(
        &self,
        handler: super::ParentHandler,
    ) -> ZvResult<()> {
        match self {
            Self::String(s) => s.set_parent_handler(handler),
            Self::Binary(b) => b.set_parent_handler(handler),
            Self::Array(a) => a.set_parent_handler(handler),
            Self::Object(o) => o.set_parent_handler(handler),
            _ => Err(ProtocolViolation::AlreadyFinal {
                op: "set_parent_handler",
            }
            .into()),
        }
    }

    /// Копия собранного значения; поток должен быть финальным.
    pub fn final_value(&self) -> ZvResult<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Boolean(*b),
            Self::Integer(i) => Value::Integer(*i),
            Self::Real(r) => Value::Real(*r),
            Self::String(s) => Value::String(s.final_value()?),
            Self::Binary(b) => Value::Binary(b.final_value()?),
            Self::Array(a) => Value::Array(a.final_value()?),
            Self::Object(o) => Value::Object(o.final_value()?),
        })
    }

    /// Забирает собранное значение; объект упорядочивается по `order`.
    pub fn take_final(
        &self,
        order: KeyCompare,
    ) -> ZvResult<Value> {
        Ok(match self {
            Self::String(s) => Value::String(s.take_final()?),
            Self::Binary(b) => Value::Binary(b.take_final()?),
            Self::Array(a) => Value::Array(a.take_final()?),
            Self::Object(o) => Value::Object(o.take_final()?.reorder(order)),
            scalar => scalar.final_value()?,
        })
    }

    pub fn make_real(&self) -> ZvResult<f64> {
        match self {
            Self::Integer(i) => Ok(*i as f64),
            Self::Real(r) => Ok(*r),
            other => Err(mismatch("real", other.type_name())),
        }
    }
}

impl fmt::Display for ValuePush {
    /// Скаляры выводятся значением, потоки - только видом.
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => f.write_str(&format_real(*r)),
            Self::String(_) => f.write_str("<STRING>"),
            Self::Binary(_) => f.write_str("<BINARY>"),
            Self::Array(_) => f.write_str("<ARRAY>"),
            Self::Object(_) => f.write_str("<OBJECT>"),
        }
    }
}

impl From<Value> for ValuePush {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(b),
            Value::Integer(i) => Self::Integer(i),
            Value::Real(r) => Self::Real(r),
            Value::String(s) => Self::String(StringPush::from_final(s)),
            Value::Binary(b) => Self::Binary(BinaryPush::from_final(b)),
            Value::Array(a) => Self::Array(ArrayPush::from_final(a)),
            Value::Object(o) => Self::Object(ObjectPush::from_final(o)),
        }
    }
}

impl From<&Value> for ValuePush {
    fn from(v: &Value) -> Self {
        Self::from(v.clone())
    }
}

impl From<StringPush> for ValuePush {
    fn from(s: StringPush) -> Self {
        Self::String(s)
    }
}

impl From<BinaryPush> for ValuePush {
    fn from(b: BinaryPush) -> Self {
        Self::Binary(b)
    }
}

impl From<ArrayPush> for ValuePush {
    fn from(a: ArrayPush) -> Self {
        Self::Array(a)
    }
}

impl From<ObjectPush> for ValuePush {
    fn from(o: ObjectPush) -> Self {
        Self::Object(o)
    }
}
