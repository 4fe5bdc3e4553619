//! Инкрементальное представление значений.
//!
//! [`PullStream`] отдаёт элементы по запросу потребителя, [`PushStream`]
//! принимает их от производителя и доставляет обработчикам. Оба
//! параметризованы видом контейнера (строка, бинарные данные, массив,
//! объект), а [`ValuePull`]/[`ValuePush`] собирают из них дерево, часть
//! которого может быть ещё не прочитана.
//!
//! Всё однопоточное: потоки - это `Rc`-дескрипторы, разделяемые родителем и
//! вложенным потоком на время приостановки.

pub mod base64_stream;
pub mod convert;
pub mod describe;
pub mod kind;
pub mod pull;
pub mod push;
pub mod value;

pub use convert::{
    get_array_pusher, get_binary_pusher, get_object_pusher, get_string_pusher, pull_array,
    pull_binary, pull_object, pull_string, Convert,
};
pub use describe::FormatOptions;
pub use kind::{ArrayKind, BinaryKind, ObjectKind, PullKind, PushKind, StringKind};
pub use pull::{PullSource, PullStream};
pub use push::{ParentHandler, PushStream};
pub use value::{ValuePull, ValuePush};

pub type StringPull = PullStream<StringKind>;
pub type BinaryPull = PullStream<BinaryKind>;
pub type ArrayPull = PullStream<ArrayKind>;
pub type ObjectPull = PullStream<ObjectKind>;

pub type StringPush = PushStream<StringKind>;
pub type BinaryPush = PushStream<BinaryKind>;
pub type ArrayPush = PushStream<ArrayKind>;
pub type ObjectPush = PushStream<ObjectKind>;
