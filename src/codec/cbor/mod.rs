//! CBOR (RFC 8949): целые, float32/float64, строки и бинарные данные
//! определённой и неопределённой длины, массивы и отображения со
//! строковыми ключами.

pub mod decode;
pub mod encode;

pub use decode::push_decoder;
pub use encode::{pull_encoder, MAGIC};
