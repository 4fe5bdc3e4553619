use bytes::Bytes;
use rstest::rstest;
use zvalue::{
    decode_amf3, decode_any, encode_amf3, pull_encode_amf3, DecodeOptions, EncoderLimits, Format,
    Object, Value, ValuePull,
};

mod common;

use common::{concat, decode_chunked, decode_chunked_with, encode_chunks};

fn record(
    name: &str,
    score: i64,
) -> Value {
    let object: Object = [
        ("name", Value::from(name)),
        ("score", Value::Integer(score)),
        ("kind", Value::from("record")),
    ]
    .into_iter()
    .collect();
    Value::from(object)
}

/// Тест проверяет границу 29-битных целых: за её пределами пишется double,
/// а при чтении целый double снова становится целым.
#[rstest]
#[case((1 << 28) - 1, 0x04)]
#[case(-(1 << 28), 0x04)]
#[case(1 << 28, 0x05)]
#[case(-(1 << 28) - 1, 0x05)]
#[case(1 << 29, 0x05)]
#[case(1_000_000_000, 0x05)]
fn test_integer_boundary(
    #[case] n: i64,
    #[case] marker: u8,
) {
    let encoded = encode_amf3(&Value::Integer(n)).unwrap();
    assert_eq!(encoded[0], marker);
    assert_eq!(decode_amf3(encoded).unwrap(), Value::Integer(n));
}

/// Тест проверяет чтение double: целое значение от 2^28 по модулю
/// становится целым, остальное остаётся вещественным.
#[rstest]
#[case(&[0x05, 0x41, 0xcd, 0xcd, 0x65, 0x00, 0x00, 0x00, 0x00], Value::Integer(1_000_000_000))]
#[case(&[0x05, 0xc1, 0xcd, 0xcd, 0x65, 0x00, 0x00, 0x00, 0x00], Value::Integer(-1_000_000_000))]
#[case(&[0x05, 0x41, 0xb0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], Value::Integer(1 << 28))]
#[case(&[0x05, 0x41, 0xaf, 0xff, 0xff, 0xfe, 0x00, 0x00, 0x00], Value::Real(268_435_455.0))]
#[case(&[0x05, 0x41, 0xcd, 0xcd, 0x65, 0x00, 0x40, 0x00, 0x00], Value::Real(1_000_000_000.5))]
fn test_decode_large_double(
    #[case] data: &'static [u8],
    #[case] expected: Value,
) {
    assert_eq!(decode_amf3(Bytes::from_static(data)).unwrap(), expected);
}

fn stream_array(body: &[u8]) -> Bytes {
    let class = b"amf3.stream.array";
    let mut data = vec![0x0a, 0x07, ((class.len() << 1) | 1) as u8];
    data.extend_from_slice(class);
    data.extend_from_slice(body);
    Bytes::from(data)
}

/// Тест проверяет внешний поток-массив: маркер undefined завершает его,
/// а вложенные значения читаются как обычно.
#[rstest]
#[case(&[0x00], Value::Array(Vec::new()))]
#[case(&[0x04, 0x01, 0x06, 0x03, b'x', 0x00], Value::Array(vec![Value::Integer(1), Value::from("x")]))]
#[case(
    &[0x01, 0x09, 0x03, 0x01, 0x02, 0x00],
    Value::Array(vec![Value::Null, Value::Array(vec![Value::Boolean(false)])])
)]
fn test_stream_array_terminator(
    #[case] body: &'static [u8],
    #[case] expected: Value,
) {
    assert_eq!(decode_amf3(stream_array(body)).unwrap(), expected);
    let data = stream_array(body);
    assert_eq!(decode_chunked(Format::Amf3, &data, 1).unwrap(), expected);
}

/// Тест проверяет, что поток-массив без маркера конца - ошибка.
#[test]
fn test_stream_array_truncated() {
    let err = decode_amf3(stream_array(&[0x04, 0x01])).unwrap_err();
    assert!(err.to_string().contains("premature end"), "{err}");
}

#[rstest]
#[case(Value::Real(f64::INFINITY))]
#[case(Value::Real(f64::NEG_INFINITY))]
#[case(Value::Real(f64::NAN))]
#[case(Value::Real(-2.5))]
#[case(Value::from(""))]
#[case(Value::from("ascii and юникод"))]
#[case(Value::Binary(Bytes::new()))]
#[case(Value::Array(Vec::new()))]
#[case(Value::Object(Object::new()))]
fn test_scalar_round_trip(#[case] value: Value) {
    assert_eq!(decode_amf3(encode_amf3(&value).unwrap()).unwrap(), value);
}

/// Тест проверяет, что повторы строк и ключей кодируются ссылками и
/// восстанавливаются в равную структуру.
#[test]
fn test_duplicates_use_references() {
    let records: Vec<Value> = (0..50).map(|i| record("same name", i)).collect();
    let value = Value::Array(records);
    let encoded = encode_amf3(&value).unwrap();

    let once = encoded
        .windows("same name".len())
        .filter(|w| *w == b"same name")
        .count();
    assert_eq!(once, 1);
    let keys = encoded.windows(5).filter(|w| *w == b"score").count();
    assert_eq!(keys, 1);

    assert_eq!(decode_amf3(encoded.clone()).unwrap(), value);
    assert_eq!(decode_chunked(Format::Amf3, &encoded, 3).unwrap(), value);
}

#[test]
fn test_decode_any_dispatch() {
    let value = decode_any(Bytes::from_static(&[0x05, 0x40, 0x09, 0x21, 0xfb, 0x54, 0x44, 0x2d, 0x18]))
        .unwrap();
    assert_eq!(value, Value::Real(std::f64::consts::PI));
    let array = decode_any(Bytes::from_static(&[0x09, 0x03, 0x01, 0x03])).unwrap();
    assert_eq!(array, Value::Array(vec![Value::Boolean(true)]));
}

/// Тест проверяет, что без хранения объектов ссылка на объект читается как
/// null, а строки по-прежнему разыменовываются.
#[test]
fn test_without_object_refs() {
    let data = [
        0x09, 0x05, 0x01, // массив из двух
        0x0a, 0x0b, 0x01, 0x03, b'a', 0x06, 0x03, b'v', 0x01, // {"a":"v"}
        0x0a, 0x02, // ссылка на объект 1
    ];
    let options = DecodeOptions::default().with_object_refs(false);
    let value = decode_chunked_with(Format::Amf3, &data, data.len(), options).unwrap();
    let inner: Object = [("a", Value::from("v"))].into_iter().collect();
    assert_eq!(value, Value::Array(vec![Value::from(inner.clone()), Value::Null]));

    let value = decode_chunked(Format::Amf3, &data, 1).unwrap();
    assert_eq!(value, Value::Array(vec![Value::from(inner.clone()), Value::from(inner)]));
}

/// Снимает рамки кусков: двухбайтовая длина и данные, до куска нулевой
/// длины.
fn unframe(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let len = usize::from(u16::from_be_bytes([data[pos], data[pos + 1]]));
        pos += 2;
        if len == 0 {
            assert_eq!(pos, data.len(), "data after the final frame");
            return out;
        }
        out.extend_from_slice(&data[pos..pos + len]);
        pos += len;
    }
}

#[test]
fn test_chunked_output_decodes() {
    let records: Vec<Value> = (0..200).map(|i| record(&format!("name {i}"), i * 7)).collect();
    let value = Value::Array(records);
    let stream = pull_encode_amf3(&ValuePull::from(&value), EncoderLimits::new(256, 64), true).unwrap();
    let framed = stream.pull_final().unwrap();
    assert_eq!(&framed[framed.len() - 2..], &[0, 0]);
    let plain = unframe(&framed);
    assert_eq!(plain, encode_amf3(&value).unwrap());
    assert_eq!(decode_amf3(Bytes::from(plain)).unwrap(), value);
}

/// Тест проверяет, что буфер энкодера не влияет на результат.
#[rstest]
#[case(16, 4)]
#[case(64, 64)]
#[case(8192, 512)]
fn test_buffer_size_independence(
    #[case] buffer: usize,
    #[case] threshold: usize,
) {
    let blob = Value::Binary(Bytes::from(vec![0xabu8; 3000]));
    let value = Value::Array(vec![record("x", 1), blob, Value::from("y".repeat(700).as_str())]);
    let chunks = encode_chunks(Format::Amf3, &value, EncoderLimits::new(buffer, threshold)).unwrap();
    let data = concat(&chunks);
    assert_eq!(data, encode_amf3(&value).unwrap());
    assert_eq!(decode_chunked(Format::Amf3, &data, 5).unwrap(), value);
}
