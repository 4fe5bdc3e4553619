//! Поведение потоков через публичный интерфейс.

use std::{cell::RefCell, rc::Rc};

use bytes::Bytes;
use zvalue::{
    stream::{
        get_binary_pusher, get_string_pusher, pull_binary, pull_string, ArrayPush, ObjectPush,
        StringPull,
    },
    BinaryPush, Convert, FormatOptions, StringPush, Value, ValuePull, ValuePush,
};

type Log = Rc<RefCell<Vec<String>>>;

fn recording(array: &ArrayPush) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    array
        .set_value_handler(move |item| {
            sink.borrow_mut().push(match item {
                Some(ValuePush::Integer(i)) => i.to_string(),
                Some(other) => other.type_name().to_string(),
                None => "<end>".to_string(),
            });
            Ok(())
        })
        .unwrap();
    log
}

/// Тест проверяет, что незавершённый вложенный поток задерживает
/// следующие элементы, а после его завершения каждый элемент доставляется
/// ровно один раз в исходном порядке.
#[test]
fn test_push_stall_and_resume() {
    let array = ArrayPush::new();
    let log = recording(&array);
    let nested = StringPush::new();

    array.push(ValuePush::Integer(1)).unwrap();
    array.push(ValuePush::String(nested.clone())).unwrap();
    array.push(ValuePush::Integer(2)).unwrap();
    array.push(ValuePush::Integer(3)).unwrap();
    array.end().unwrap();
    assert_eq!(*log.borrow(), ["1", "string"]);
    assert!(!array.is_final());

    nested.push(Bytes::from_static(b"abc")).unwrap();
    assert_eq!(log.borrow().len(), 2);
    nested.end().unwrap();
    assert_eq!(*log.borrow(), ["1", "string", "2", "3", "<end>"]);
    assert!(array.is_final());
    assert_eq!(nested.final_value().unwrap(), "abc");
}

/// Тест проверяет сборку итогового значения из вложенных потоков, которые
/// завершаются в обратном порядке.
#[test]
fn test_final_value_with_nested_streams() {
    let object = ObjectPush::new();
    let first = StringPush::new();
    let second = ArrayPush::new();
    object.push(("b".to_string(), ValuePush::String(first.clone()))).unwrap();
    object.push(("a".to_string(), ValuePush::Array(second.clone()))).unwrap();
    object.end().unwrap();

    let done = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&done);
    object
        .set_final_handler(move |obj| {
            *slot.borrow_mut() = Some(obj.clone());
            Ok(())
        })
        .unwrap();
    assert!(done.borrow().is_none());

    second.push(ValuePush::Null).unwrap();
    second.end().unwrap();
    first.push(Bytes::from_static(b"x")).unwrap();
    first.end().unwrap();

    let obj = done.borrow_mut().take().expect("final handler called");
    assert_eq!(obj.get("b"), Some(&Value::from("x")));
    assert_eq!(obj.get("a"), Some(&Value::Array(vec![Value::Null])));
    assert_eq!(obj.keys().collect::<Vec<_>>(), ["a", "b"]);
}

/// Тест проверяет несимметричную политику размера: превышение - ошибка,
/// недобор при завершении - нет.
#[test]
fn test_size_policy() {
    let over = StringPush::with_final_size(3);
    over.push(Bytes::from_static(b"ab")).unwrap();
    let err = over.push(Bytes::from_static(b"cd")).unwrap_err();
    assert!(err.to_string().contains('3'), "{err}");

    let under = StringPush::with_final_size(10);
    under.push(Bytes::from_static(b"ab")).unwrap();
    under.end().unwrap();
    assert_eq!(under.final_size(), Some(2));
    assert_eq!(under.final_value().unwrap(), "ab");

    let conflict = BinaryPush::with_final_size(4);
    assert!(conflict.set_final_size(4).is_ok());
    assert!(conflict.set_final_size(5).is_err());

    let ended = BinaryPush::new();
    ended.end().unwrap();
    assert!(ended.push(Bytes::new()).is_err());
    assert!(ended.end().is_err());
}

#[test]
fn test_handler_attached_twice() {
    let s = StringPush::new();
    s.set_value_handler(|_| Ok(())).unwrap();
    assert!(s.set_batch_handler(|_| Ok(())).is_err());
    assert!(s.set_value_handler(|_| Ok(())).is_err());
}

/// Тест проверяет, что чтение части элементов не материализует остальные,
/// а объявленный размер сверяется с фактическим.
#[test]
fn test_pull_laziness_and_size() {
    let produced = Rc::new(RefCell::new(0usize));
    let counter = Rc::clone(&produced);
    let stream = StringPull::from_fn(move || {
        let mut n = counter.borrow_mut();
        *n += 1;
        Ok(if *n <= 100 { Some(Bytes::from_static(b"x")) } else { None })
    });
    stream.set_final_size(100).unwrap();
    for _ in 0..3 {
        assert!(stream.pull().unwrap().is_some());
    }
    assert_eq!(*produced.borrow(), 3);
    assert!(!stream.is_final());

    let rest = stream.pull_final().unwrap();
    assert_eq!(rest.len(), 97);
    assert!(stream.is_final());

    let short = StringPull::from_fn({
        let mut parts = vec![Bytes::from_static(b"ab")];
        move || Ok(parts.pop())
    });
    short.set_final_size(5).unwrap();
    assert!(short.pull_final().is_err());
}

/// Тест проверяет преобразование строк и байтов через base64 и как есть.
#[test]
fn test_conversions() {
    let text = StringPull::from_final("aGVsbG8gd29ybGQ=".to_string());
    let bytes = pull_binary(&ValuePull::String(text), Convert::Base64).unwrap();
    assert_eq!(bytes.pull_final().unwrap(), &b"hello world"[..]);

    let raw = ValuePull::from(Value::from(b"hello world".to_vec()));
    let encoded = pull_string(&raw, Convert::Base64).unwrap();
    assert_eq!(encoded.pull_final().unwrap(), "aGVsbG8gd29ybGQ=");
    assert!(pull_string(&raw, Convert::None).is_err());

    let target = ValuePush::String(StringPush::new());
    let input = get_binary_pusher(&target, Convert::Base64).unwrap();
    for part in [&b"he"[..], b"llo w", b"orld"] {
        input.push(Bytes::copy_from_slice(part)).unwrap();
    }
    input.end().unwrap();
    assert_eq!(target.final_value().unwrap(), Value::from("aGVsbG8gd29ybGQ="));

    let target = ValuePush::Binary(BinaryPush::new());
    let input = get_string_pusher(&target, Convert::Cast).unwrap();
    input.push(Bytes::from_static(b"as is")).unwrap();
    input.end().unwrap();
    assert_eq!(target.final_value().unwrap(), Value::from(b"as is".to_vec()));
}

/// Тест проверяет диагностический вывод: ограничения длины, замена
/// бинарных данных и заглушки для непрочитанного содержимого.
#[test]
fn test_describe() {
    let value = Value::Array(vec![
        Value::from("abcdefghij"),
        Value::from(vec![0u8; 12]),
        Value::Array((0..10).map(Value::Integer).collect()),
    ]);
    let opts = FormatOptions::default()
        .with_max_string(4)
        .with_max_array(3)
        .with_binary_subst("<### bytes>");
    let text = ValuePull::from(&value).to_string_with(&opts);
    assert!(text.contains("\"abcd\"++"), "{text}");
    assert!(text.contains("<12 bytes>"), "{text}");
    assert!(text.contains("..."), "{text}");

    let lazy = ValuePull::String(StringPull::from_fn(|| Ok(Some(Bytes::from_static(b"x")))));
    assert_eq!(lazy.to_string_with(&FormatOptions::default()), "<STRING>");
}
