//! Property-based тесты кодеков.
//!
//! Генерируют случайные деревья значений и проверяют, что
//! decode(encode(v)) == v для всех трёх форматов при любых размерах
//! буфера энкодера и кусков входа декодера. `Value` сравнивает вещественные
//! через `OrderedFloat`, так что NaN равен самому себе.

use proptest::prelude::*;
use zvalue::{EncoderLimits, Format, Value};

mod common;
mod generators;

use common::{concat, decode_chunked, encode_chunks};
use generators::*;

const PROPTEST_CASES: u32 = 256;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: PROPTEST_CASES,
        ..ProptestConfig::default()
    }
}

fn round_trip(
    format: Format,
    value: &Value,
    buffer: usize,
    chunk: usize,
) -> Result<(), TestCaseError> {
    let limits = EncoderLimits::new(buffer, buffer / 4);
    let chunks =
        encode_chunks(format, value, limits).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert!(chunks.iter().all(|c| !c.is_empty()), "empty chunk from {format} encoder");
    let data = concat(&chunks);
    let decoded =
        decode_chunked(format, &data, chunk).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&decoded, value);
    Ok(())
}

proptest! {
    #![proptest_config(config())]

    /// Тест проверяет круговое преобразование CBOR.
    #[test]
    fn prop_cbor_round_trip(
        value in value_strategy(Profile::Cbor),
        buffer in 16usize..512,
        chunk in 1usize..64,
    ) {
        round_trip(Format::Cbor, &value, buffer, chunk)?;
    }

    /// Тест проверяет круговое преобразование AMF3.
    #[test]
    fn prop_amf3_round_trip(
        value in value_strategy(Profile::Amf3),
        buffer in 16usize..512,
        chunk in 1usize..64,
    ) {
        round_trip(Format::Amf3, &value, buffer, chunk)?;
    }

    /// Тест проверяет круговое преобразование JSON.
    #[test]
    fn prop_json_round_trip(
        value in value_strategy(Profile::Json),
        buffer in 32usize..512,
        chunk in 1usize..64,
    ) {
        round_trip(Format::Json, &value, buffer, chunk)?;
    }

    /// Тест проверяет, что результат не зависит от размера кусков входа.
    #[test]
    fn prop_chunk_size_independence(value in value_strategy(Profile::Cbor)) {
        let data = zvalue::encode_cbor(&value).unwrap();
        let whole = decode_chunked(Format::Cbor, &data, data.len()).unwrap();
        let bytewise = decode_chunked(Format::Cbor, &data, 1).unwrap();
        prop_assert_eq!(&whole, &bytewise);
        prop_assert_eq!(&whole, &value);
    }

    /// Тест проверяет decode_auto поверх сжатого вывода двоичных форматов.
    #[test]
    fn prop_decode_auto_compressed(value in value_strategy(Profile::Amf3)) {
        for format in [Format::Cbor, Format::Amf3] {
            let packed = zvalue::encode_compressed(&value, format).unwrap();
            prop_assert_eq!(&zvalue::decode_auto(packed).unwrap(), &value);
        }
    }
}
