//! JSON: текстовый формат с base64 для бинарных данных.

pub mod decode;
pub mod encode;

pub use decode::push_decoder;
pub use encode::pull_encoder;
