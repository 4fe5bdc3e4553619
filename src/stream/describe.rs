//! Диагностический JSON-подобный вывод значений и потоков.
//!
//! Вывод потоков не вытягивает из них данные: для содержимого, которое ещё
//! не прочитано из производителя, печатается заглушка (`<STRING>`,
//! `<ARRAY>`, ...), а для незаконченного хвоста строк добавляется `++`.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::value::{write_json_real, Value};

/// Параметры форматирования диагностического вывода.
///
/// Передаются явно, глобального состояния нет.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Максимальная длина строки в байтах; 0 - без ограничения.
    pub max_string: usize,
    /// Максимальное число элементов массива; 0 - без ограничения.
    pub max_array: usize,
    /// Строка отступа; пустая строка - компактный вывод.
    pub indent: String,
    /// Замена для бинарных данных; `###` заменяется длиной в байтах.
    pub binary_subst: Option<String>,
}

impl FormatOptions {
    /// Многострочный вывод с отступом в два пробела.
    pub fn pretty() -> Self {
        Self {
            indent: "  ".to_string(),
            ..Self::default()
        }
    }

    pub fn with_max_string(
        mut self,
        max: usize,
    ) -> Self {
        self.max_string = max;
        self
    }

    pub fn with_max_array(
        mut self,
        max: usize,
    ) -> Self {
        self.max_array = max;
        self
    }

    pub fn with_indent(
        mut self,
        indent: impl Into<String>,
    ) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_binary_subst(
        mut self,
        subst: impl Into<String>,
    ) -> Self {
        self.binary_subst = Some(subst.into());
        self
    }
}

/// Диагностический вывод значения в новую строку.
pub fn to_string(
    value: &Value,
    opts: &FormatOptions,
) -> String {
    let mut out = String::new();
    write_value(&mut out, value, opts, "");
    out
}

/// Дописывает `s` как строковый литерал JSON с экранированием.
pub fn escape_into(
    out: &mut String,
    s: &str,
) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Строка с учётом `max_string`; `++` после кавычки означает, что строка
/// обрезана или ещё не дочитана.
pub fn write_string(
    out: &mut String,
    s: &str,
    opts: &FormatOptions,
    more: bool,
) {
    let mut more = more;
    let mut s = s;
    if opts.max_string > 0 && s.len() > opts.max_string {
        let mut end = opts.max_string;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s = &s[..end];
        more = true;
    }
    escape_into(out, s);
    if more {
        out.push_str("++");
    }
}

pub fn write_binary(
    out: &mut String,
    b: &[u8],
    opts: &FormatOptions,
) {
    match &opts.binary_subst {
        Some(subst) => out.push_str(&subst.replace("###", &b.len().to_string())),
        None => {
            out.push('"');
            STANDARD.encode_string(b, out);
            out.push('"');
        }
    }
}

/// Ключ объекта с двоеточием; в многострочном режиме после него пробел.
pub fn write_key(
    out: &mut String,
    key: &str,
    opts: &FormatOptions,
    prefix: &str,
) {
    write_string(out, key, opts, false);
    out.push(':');
    if !prefix.is_empty() {
        out.push(' ');
    }
}

/// Оформление контейнера при выводе.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    open: char,
    close: char,
    empty: &'static str,
    placeholder: &'static str,
    limited: bool,
    multiline: bool,
}

impl Layout {
    pub fn array(multiline: bool) -> Self {
        Self {
            open: '[',
            close: ']',
            empty: "[]",
            placeholder: "<ARRAY>",
            limited: true,
            multiline,
        }
    }

    pub fn object(multiline: bool) -> Self {
        Self {
            open: '{',
            close: '}',
            empty: "{}",
            placeholder: "<OBJECT>",
            limited: false,
            multiline,
        }
    }
}

/// Общий вывод массивов и объектов.
///
/// `base` - отступ текущего уровня, `more` - есть ли ещё не выведенные
/// элементы (тогда в конце печатается `...`). Элементу передаётся префикс
/// его уровня.
pub fn write_container<I, F>(
    out: &mut String,
    opts: &FormatOptions,
    base: &str,
    layout: Layout,
    items: I,
    more: bool,
    mut write_item: F,
) where
    I: IntoIterator,
    F: FnMut(&mut String, I::Item, &str),
{
    let mut iter = items.into_iter();
    let Some(first) = iter.next() else {
        out.push_str(if more {
            layout.placeholder
        } else {
            layout.empty
        });
        return;
    };

    let prefix = if layout.multiline && !opts.indent.is_empty() {
        format!("{base}{}", opts.indent)
    } else {
        String::new()
    };
    let separate = |out: &mut String| {
        if !prefix.is_empty() {
            out.push('\n');
            out.push_str(&prefix);
        }
    };

    let mut more = more;
    let mut count = 0usize;
    out.push(layout.open);
    separate(out);
    write_item(out, first, &prefix);
    for item in iter {
        count += 1;
        if layout.limited && opts.max_array > 0 && count >= opts.max_array {
            more = true;
            break;
        }
        out.push(',');
        separate(out);
        write_item(out, item, &prefix);
    }
    if more {
        out.push(',');
        separate(out);
        out.push_str("...");
    }
    if !prefix.is_empty() {
        out.push('\n');
        out.push_str(base);
    }
    out.push(layout.close);
}

/// Простое значение выводится в одну строку даже при заданном отступе:
/// скаляры, массивы из простых значений и объекты не более чем с одним
/// простым полем.
pub fn is_simple(value: &Value) -> bool {
    match value {
        Value::Array(a) => a.iter().all(is_simple),
        Value::Object(o) => o.is_empty() || (o.len() == 1 && o.values().all(is_simple)),
        _ => true,
    }
}

pub(crate) fn write_values<'a>(
    out: &mut String,
    values: impl ExactSizeIterator<Item = &'a Value> + Clone,
    opts: &FormatOptions,
    base: &str,
) {
    let simple = values.clone().all(is_simple);
    write_container(
        out,
        opts,
        base,
        Layout::array(!simple),
        values,
        false,
        |out, v, prefix| write_value(out, v, opts, prefix),
    );
}

pub(crate) fn write_entries<'a>(
    out: &mut String,
    entries: impl ExactSizeIterator<Item = &'a (String, Value)> + Clone,
    opts: &FormatOptions,
    base: &str,
) {
    let len = entries.len();
    let simple = len == 0 || (len == 1 && entries.clone().all(|(_, v)| is_simple(v)));
    write_container(
        out,
        opts,
        base,
        Layout::object(!simple),
        entries,
        false,
        |out, (k, v), prefix| {
            write_key(out, k, opts, prefix);
            write_value(out, v, opts, prefix);
        },
    );
}

/// Дописывает диагностический вывод готового значения.
pub fn write_value(
    out: &mut String,
    value: &Value,
    opts: &FormatOptions,
    indent: &str,
) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Real(r) => write_json_real(out, *r),
        Value::String(s) => write_string(out, s, opts, false),
        Value::Binary(b) => write_binary(out, b, opts),
        Value::Array(a) => write_values(out, a.iter(), opts, indent),
        Value::Object(o) => write_entries(out, o.iter(), opts, indent),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::value::Object;

    fn nested() -> Value {
        let inner: Object = [("x", 1), ("y", 2)].into_iter().collect();
        let outer: Object = [
            ("list", Value::from(vec![Value::from(1), Value::from(2)])),
            ("obj", Value::from(inner)),
        ]
        .into_iter()
        .collect();
        Value::from(outer)
    }

    #[test]
    fn test_compact() {
        assert_eq!(
            to_string(&nested(), &FormatOptions::default()),
            r#"{"list":[1,2],"obj":{"x":1,"y":2}}"#
        );
    }

    /// Тест проверяет многострочный вывод: простые подзначения остаются в
    /// одну строку.
    #[test]
    fn test_pretty() {
        let expected = "{\n  \"list\": [1,2],\n  \"obj\": {\n    \"x\": 1,\n    \"y\": 2\n  }\n}";
        assert_eq!(to_string(&nested(), &FormatOptions::pretty()), expected);
    }

    #[test]
    fn test_escapes() {
        let v = Value::from("a\"b\\c\n\u{01}");
        assert_eq!(
            to_string(&v, &FormatOptions::default()),
            r#""a\"b\\c\n\u0001""#
        );
    }

    /// Тест проверяет усечение строк и массивов.
    #[test]
    fn test_limits() {
        let opts = FormatOptions::default()
            .with_max_string(3)
            .with_max_array(2);
        assert_eq!(to_string(&Value::from("abcdef"), &opts), r#""abc"++"#);
        assert_eq!(to_string(&Value::from("abc"), &opts), r#""abc""#);

        let arr: Value = [1, 2, 3, 4].into_iter().collect();
        assert_eq!(to_string(&arr, &opts), "[1,2,...]");
    }

    #[test]
    fn test_max_string_respects_char_boundary() {
        let opts = FormatOptions::default().with_max_string(1);
        assert_eq!(to_string(&Value::from("жж"), &opts), r#"""++"#);
    }

    /// Тест проверяет подстановку вместо бинарных данных.
    #[test]
    fn test_binary() {
        let v = Value::from(Bytes::from_static(b"hello"));
        assert_eq!(to_string(&v, &FormatOptions::default()), r#""aGVsbG8=""#);

        let opts = FormatOptions::default().with_binary_subst("<### bytes>");
        assert_eq!(to_string(&v, &opts), "<5 bytes>");
    }

    #[test]
    fn test_reals_and_empty_containers() {
        let v: Value = vec![
            Value::Real(0.5),
            Value::Real(f64::NAN),
            Value::Array(vec![]),
            Value::Object(Object::new()),
        ]
        .into();
        assert_eq!(to_string(&v, &FormatOptions::pretty()), "[0.5,null,[],{}]");
    }
}
