use std::{cell::RefCell, rc::Rc};

use bytes::Bytes;
use rstest::rstest;
use zvalue::{
    compression::{pull_deflate, pull_inflate_binary, push_deflate, push_inflate},
    decode_auto, deflate, encode_compressed, inflate, is_compressed, BinaryPull, BinaryPush,
    Format, Object, Value,
};

fn document() -> Value {
    let rows: Vec<Value> = (0..300)
        .map(|i| {
            let row: Object = [
                ("id", Value::Integer(i)),
                ("label", Value::from(format!("row number {i}"))),
                ("even", Value::Boolean(i % 2 == 0)),
            ]
            .into_iter()
            .collect();
            Value::from(row)
        })
        .collect();
    Value::Array(rows)
}

fn pieces(
    data: &[u8],
    size: usize,
) -> BinaryPull {
    let mut parts: Vec<Bytes> = data.chunks(size).rev().map(Bytes::copy_from_slice).collect();
    BinaryPull::from_fn(move || Ok(parts.pop()))
}

/// Тест проверяет decode_auto для сжатого и несжатого входа всех форматов.
#[rstest]
#[case(Format::Json)]
#[case(Format::Cbor)]
#[case(Format::Amf3)]
fn test_decode_auto(#[case] format: Format) {
    let value = document();
    let packed = encode_compressed(&value, format).unwrap();
    assert!(is_compressed(packed[0], packed[1]));
    assert_eq!(decode_auto(packed.clone()).unwrap(), value);

    let plain = inflate(&packed).unwrap();
    assert!(!is_compressed(plain[0], plain[1]));
    assert_eq!(decode_auto(plain).unwrap(), value);
}

/// Тест проверяет pull-конвейер с разными размерами буферов.
#[rstest]
#[case(1, 1)]
#[case(17, 5)]
#[case(4096, 1024)]
fn test_pull_pipeline(
    #[case] input_chunk: usize,
    #[case] buffer: usize,
) {
    let data = zvalue::encode_json(&document()).unwrap().into_bytes();
    let packed = pull_deflate(&pieces(&data, 1000), buffer).pull_final().unwrap();
    assert_eq!(packed, deflate(&data).unwrap());
    let unpacked = pull_inflate_binary(&pieces(&packed, input_chunk), buffer)
        .pull_final()
        .unwrap();
    assert_eq!(unpacked, data);
}

/// Тест проверяет, что мусор после потока zlib игнорируется, а обрыв
/// потока - ошибка.
#[test]
fn test_trailing_and_truncated() {
    let data = b"compressible ".repeat(100);
    let mut packed = deflate(&data).unwrap().to_vec();
    let cut = packed[..packed.len() - 3].to_vec();
    packed.extend_from_slice(b"garbage");

    let unpacked = pull_inflate_binary(&pieces(&packed, 4), 64).pull_final().unwrap();
    assert_eq!(unpacked, data);

    let err = pull_inflate_binary(&pieces(&cut, 4), 64).pull_final().unwrap_err();
    assert!(err.to_string().contains("inflate"), "{err}");
    assert!(inflate(&cut).is_err());
    assert!(inflate(b"not zlib at all").is_err());
}

/// Тест проверяет push-конвейер: сжатие с синхронизацией, распаковка в
/// строку.
#[test]
fn test_push_pipeline() {
    let text = "строка для сжатия ".repeat(200);
    let target = zvalue::StringPush::new();
    let inflater = push_inflate(target.clone(), 32).unwrap();

    let compressed = Rc::new(RefCell::new(Vec::new()));
    let copy = Rc::clone(&compressed);
    let relay = BinaryPush::new();
    relay
        .set_value_handler(move |item: Option<Bytes>| {
            if let Some(chunk) = &item {
                copy.borrow_mut().extend_from_slice(chunk);
            }
            inflater.push_opt(item)
        })
        .unwrap();

    let deflater = push_deflate(relay, 128, true).unwrap();
    for part in text.as_bytes().chunks(333) {
        deflater.push(Bytes::copy_from_slice(part)).unwrap();
    }
    assert!(!target.is_final());
    deflater.end().unwrap();

    assert_eq!(target.final_value().unwrap(), text);
    assert_eq!(inflate(&compressed.borrow()).unwrap(), text.as_bytes());
}
