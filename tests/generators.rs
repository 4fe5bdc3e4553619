//! Генераторы значений для property-based тестов.
//!
//! Каждый формат теряет часть информации по-своему, поэтому генераторы
//! параметризованы профилем: JSON не знает бинарных данных и NaN, AMF3
//! хранит большие целые как double.

#![allow(dead_code)]

use proptest::{prelude::*, strategy::Union};
use zvalue::{Object, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Cbor,
    Amf3,
    Json,
}

/// Ключи объектов: AMF3 не допускает пустых.
pub fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}"
}

pub fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop::collection::vec(any::<char>(), 0..24).prop_map(String::from_iter),
        1 => "[a-zA-Z ]{100,700}",
    ]
}

pub fn integer_strategy(profile: Profile) -> BoxedStrategy<i64> {
    const SAFE: i64 = 1 << 53;
    match profile {
        Profile::Amf3 => prop_oneof![
            -(1i64 << 28)..(1i64 << 28),
            -SAFE..SAFE,
            Just((1 << 28) - 1),
            Just(1 << 28),
            Just(1 << 29),
            Just(-(1 << 28) - 1),
        ]
        .boxed(),
        _ => prop_oneof![any::<i64>(), -1000i64..1000, Just(i64::MIN), Just(i64::MAX)].boxed(),
    }
}

pub fn real_strategy(profile: Profile) -> BoxedStrategy<f64> {
    let specials = prop_oneof![Just(f64::INFINITY), Just(f64::NEG_INFINITY)];
    match profile {
        Profile::Cbor => prop_oneof![4 => any::<f64>(), 1 => Just(f64::NAN), 1 => specials].boxed(),
        Profile::Amf3 => prop_oneof![
            4 => -1.0e6..1.0e6f64,
            1 => Just(f64::NAN),
            1 => specials,
        ]
        .boxed(),
        // %.12g без потерь: полуцелые с небольшим модулем
        Profile::Json => prop_oneof![
            4 => (-100_000i32..100_000).prop_map(|n| f64::from(n) + 0.5),
            1 => specials,
        ]
        .boxed(),
    }
}

pub fn binary_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        3 => prop::collection::vec(any::<u8>(), 0..32),
        1 => prop::collection::vec(any::<u8>(), 500..1500),
    ]
}

fn leaf_strategy(profile: Profile) -> BoxedStrategy<Value> {
    let mut leaves = vec![
        Just(Value::Null).boxed(),
        any::<bool>().prop_map(Value::Boolean).boxed(),
        integer_strategy(profile).prop_map(Value::Integer).boxed(),
        real_strategy(profile).prop_map(Value::Real).boxed(),
        text_strategy().prop_map(Value::String).boxed(),
    ];
    if profile != Profile::Json {
        leaves.push(binary_strategy().prop_map(Value::from).boxed());
    }
    Union::new(leaves).boxed()
}

/// Дерево значений глубиной до четырёх уровней.
pub fn value_strategy(profile: Profile) -> impl Strategy<Value = Value> {
    leaf_strategy(profile).prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::vec((key_strategy(), inner), 0..8)
                .prop_map(|entries| Value::from(entries.into_iter().collect::<Object>())),
        ]
    })
}
