//! AMF3 (Action Message Format 3): 29-битные целые, double, строки с
//! таблицей ссылок, байтовые массивы, плотные массивы и объекты с
//! описаниями классов.
//!
//! Xml, даты и ассоциативная часть массивов не поддерживаются. Внешние
//! (externalizable) объекты распознаются только для классов потоков
//! из этого модуля.

pub mod decode;
pub mod encode;

pub use decode::push_decoder;
pub use encode::pull_encoder;

/// Маркеры типов.
pub(crate) mod marker {
    pub const UNDEFINED: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const INTEGER: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const STRING: u8 = 0x06;
    pub const XML_DOC: u8 = 0x07;
    pub const DATE: u8 = 0x08;
    pub const ARRAY: u8 = 0x09;
    pub const OBJECT: u8 = 0x0a;
    pub const XML: u8 = 0x0b;
    pub const BYTE_ARRAY: u8 = 0x0c;
}

/// Внешний объект со строкой, переданной кусками: длина куска (U29)
/// и байты, до куска нулевой длины.
pub(crate) const STREAM_STRING: &str = "amf3.stream.string";
/// То же для байтов.
pub(crate) const STREAM_BINARY: &str = "amf3.stream.binary";
/// Внешний объект с элементами массива до маркера `0x00`.
pub(crate) const STREAM_ARRAY: &str = "amf3.stream.array";
