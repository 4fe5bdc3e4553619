//! Закрытый набор видов содержимого потока.
//!
//! Маркерный тип задаёт тип элемента, тип собранного (финального) значения
//! и единицу счёта для объявленного размера: байты у строк и бинарных
//! данных, элементы у массивов и объектов.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use zvalue_error::{ParseError, ZvResult};

use super::{
    describe::{self, FormatOptions},
    pull::PullStream,
    push::ParentHandler,
    ValuePull, ValuePush,
};
use crate::value::{lexicographic, KeyCompare, Object, Value};

mod sealed {
    pub trait Sealed {}
}

/// Текст: байты UTF-8 произвольными кусками.
#[derive(Debug, Clone, Copy)]
pub struct StringKind;
/// Сырые байты.
#[derive(Debug, Clone, Copy)]
pub struct BinaryKind;
/// Последовательность вложенных значений.
#[derive(Debug, Clone, Copy)]
pub struct ArrayKind;
/// Пары `(ключ, вложенное значение)`.
#[derive(Debug, Clone, Copy)]
pub struct ObjectKind;

impl sealed::Sealed for StringKind {}
impl sealed::Sealed for BinaryKind {}
impl sealed::Sealed for ArrayKind {}
impl sealed::Sealed for ObjectKind {}

/// Поведение [`PullStream`], зависящее от вида.
pub trait PullKind: sealed::Sealed + Sized + 'static {
    type Item: Clone + 'static;
    type Final;

    const NAME: &'static str;
    /// Заглушка диагностического вывода для ещё не полученного содержимого.
    const PLACEHOLDER: &'static str;

    fn item_size(item: &Self::Item) -> usize;

    /// Собирает буферизованные элементы в итоговое значение.
    fn assemble(items: &VecDeque<Self::Item>) -> ZvResult<Self::Final>;

    /// Поток над готовым значением, сразу финальный.
    fn from_final(value: Self::Final) -> PullStream<Self>;

    fn describe_items(
        out: &mut String,
        opts: &FormatOptions,
        base: &str,
        items: &VecDeque<Self::Item>,
        more: bool,
    );
}

/// Поведение [`PushStream`](super::PushStream), зависящее от вида.
pub trait PushKind: sealed::Sealed + Sized + 'static {
    type Item: Clone + 'static;
    type Final: Clone + Default + 'static;

    const NAME: &'static str;

    fn item_size(item: &Self::Item) -> usize;

    /// Вложенный поток финален только после собственного конца.
    fn is_item_final(item: &Self::Item) -> bool;

    /// Ставит продолжение на вложенный, ещё не финальный элемент.
    fn set_item_parent_handler(
        item: &Self::Item,
        handler: ParentHandler,
    ) -> ZvResult<()>;

    fn assemble(
        items: &VecDeque<Self::Item>,
        order: KeyCompare,
    ) -> ZvResult<Self::Final>;

    /// Разбирает готовое значение обратно на элементы.
    fn split(value: Self::Final) -> Vec<Self::Item>;

    fn final_size(value: &Self::Final) -> usize;
}

fn concat(items: &VecDeque<Bytes>) -> Bytes {
    match items.len() {
        0 => Bytes::new(),
        1 => items[0].clone(),
        _ => {
            let total = items.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(total);
            for item in items {
                buf.extend_from_slice(item);
            }
            buf.freeze()
        }
    }
}

fn concat_utf8(items: &VecDeque<Bytes>) -> ZvResult<String> {
    let bytes = concat(items);
    match std::str::from_utf8(&bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => Err(ParseError::InvalidUtf8 {
            context: "string stream",
        }
        .into()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// строки
////////////////////////////////////////////////////////////////////////////////

impl PullKind for StringKind {
    type Item = Bytes;
    type Final = String;

    const NAME: &'static str = "string";
    const PLACEHOLDER: &'static str = "<STRING>";

    fn item_size(item: &Bytes) -> usize {
        item.len()
    }

    fn assemble(items: &VecDeque<Bytes>) -> ZvResult<String> {
        concat_utf8(items)
    }

    fn from_final(value: String) -> PullStream<Self> {
        PullStream::from_buffer(Bytes::from(value))
    }

    fn describe_items(
        out: &mut String,
        opts: &FormatOptions,
        _base: &str,
        items: &VecDeque<Bytes>,
        more: bool,
    ) {
        let first = items.front().map(|b| String::from_utf8_lossy(b));
        let first = first.as_deref().unwrap_or("");
        describe::write_string(out, first, opts, more || items.len() > 1);
    }
}

impl PushKind for StringKind {
    type Item = Bytes;
    type Final = String;

    const NAME: &'static str = "string";

    fn item_size(item: &Bytes) -> usize {
        item.len()
    }

    fn is_item_final(_: &Bytes) -> bool {
        true
    }

    fn set_item_parent_handler(
        _: &Bytes,
        _: ParentHandler,
    ) -> ZvResult<()> {
        Ok(())
    }

    fn assemble(
        items: &VecDeque<Bytes>,
        _: KeyCompare,
    ) -> ZvResult<String> {
        concat_utf8(items)
    }

    fn split(value: String) -> Vec<Bytes> {
        if value.is_empty() {
            Vec::new()
        } else {
            vec![Bytes::from(value)]
        }
    }

    fn final_size(value: &String) -> usize {
        value.len()
    }
}

////////////////////////////////////////////////////////////////////////////////
// байты
////////////////////////////////////////////////////////////////////////////////

impl PullKind for BinaryKind {
    type Item = Bytes;
    type Final = Bytes;

    const NAME: &'static str = "binary";
    const PLACEHOLDER: &'static str = "<BINARY>";

    fn item_size(item: &Bytes) -> usize {
        item.len()
    }

    fn assemble(items: &VecDeque<Bytes>) -> ZvResult<Bytes> {
        Ok(concat(items))
    }

    fn from_final(value: Bytes) -> PullStream<Self> {
        PullStream::from_buffer(value)
    }

    fn describe_items(
        out: &mut String,
        opts: &FormatOptions,
        _base: &str,
        items: &VecDeque<Bytes>,
        more: bool,
    ) {
        match items.front() {
            Some(bin) if !more && items.len() == 1 => describe::write_binary(out, bin, opts),
            None if !more => describe::write_binary(out, &[], opts),
            _ => out.push_str(Self::PLACEHOLDER),
        }
    }
}

impl PushKind for BinaryKind {
    type Item = Bytes;
    type Final = Bytes;

    const NAME: &'static str = "binary";

    fn item_size(item: &Bytes) -> usize {
        item.len()
    }

    fn is_item_final(_: &Bytes) -> bool {
        true
    }

    fn set_item_parent_handler(
        _: &Bytes,
        _: ParentHandler,
    ) -> ZvResult<()> {
        Ok(())
    }

    fn assemble(
        items: &VecDeque<Bytes>,
        _: KeyCompare,
    ) -> ZvResult<Bytes> {
        Ok(concat(items))
    }

    fn split(value: Bytes) -> Vec<Bytes> {
        if value.is_empty() {
            Vec::new()
        } else {
            vec![value]
        }
    }

    fn final_size(value: &Bytes) -> usize {
        value.len()
    }
}

////////////////////////////////////////////////////////////////////////////////
// массивы
////////////////////////////////////////////////////////////////////////////////

impl PullKind for ArrayKind {
    type Item = ValuePull;
    type Final = Vec<Value>;

    const NAME: &'static str = "array";
    const PLACEHOLDER: &'static str = "<ARRAY>";

    fn item_size(_: &ValuePull) -> usize {
        1
    }

    fn assemble(items: &VecDeque<ValuePull>) -> ZvResult<Vec<Value>> {
        items.iter().map(ValuePull::pull_final).collect()
    }

    fn from_final(value: Vec<Value>) -> PullStream<Self> {
        let size = value.len();
        PullStream::from_const_source(super::pull::ConstArray::new(value), size)
    }

    fn describe_items(
        out: &mut String,
        opts: &FormatOptions,
        base: &str,
        items: &VecDeque<ValuePull>,
        more: bool,
    ) {
        describe::write_container(
            out,
            opts,
            base,
            describe::Layout::array(true),
            items.iter(),
            more,
            |out, item, prefix| item.describe(out, opts, prefix),
        );
    }
}

impl PushKind for ArrayKind {
    type Item = ValuePush;
    type Final = Vec<Value>;

    const NAME: &'static str = "array";

    fn item_size(_: &ValuePush) -> usize {
        1
    }

    fn is_item_final(item: &ValuePush) -> bool {
        item.is_final()
    }

    fn set_item_parent_handler(
        item: &ValuePush,
        handler: ParentHandler,
    ) -> ZvResult<()> {
        item.set_parent_handler(handler)
    }

    fn assemble(
        items: &VecDeque<ValuePush>,
        _: KeyCompare,
    ) -> ZvResult<Vec<Value>> {
        items.iter().map(ValuePush::final_value).collect()
    }

    fn split(value: Vec<Value>) -> Vec<ValuePush> {
        value.into_iter().map(ValuePush::from).collect()
    }

    fn final_size(value: &Vec<Value>) -> usize {
        value.len()
    }
}

////////////////////////////////////////////////////////////////////////////////
// объекты
////////////////////////////////////////////////////////////////////////////////

impl PullKind for ObjectKind {
    type Item = (String, ValuePull);
    type Final = Object;

    const NAME: &'static str = "object";
    const PLACEHOLDER: &'static str = "<OBJECT>";

    fn item_size(_: &Self::Item) -> usize {
        1
    }

    fn assemble(items: &VecDeque<Self::Item>) -> ZvResult<Object> {
        let entries = items
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.pull_final()?)))
            .collect::<ZvResult<Vec<_>>>()?;
        Ok(Object::from_entries(lexicographic, entries))
    }

    fn from_final(value: Object) -> PullStream<Self> {
        let size = value.len();
        PullStream::from_const_source(super::pull::ConstObject::new(value), size)
    }

    fn describe_items(
        out: &mut String,
        opts: &FormatOptions,
        base: &str,
        items: &VecDeque<Self::Item>,
        more: bool,
    ) {
        describe::write_container(
            out,
            opts,
            base,
            describe::Layout::object(true),
            items.iter(),
            more,
            |out, (key, value), prefix| {
                describe::write_key(out, key, opts, prefix);
                value.describe(out, opts, prefix);
            },
        );
    }
}

impl PushKind for ObjectKind {
    type Item = (String, ValuePush);
    type Final = Object;

    const NAME: &'static str = "object";

    fn item_size(_: &Self::Item) -> usize {
        1
    }

    fn is_item_final(item: &Self::Item) -> bool {
        item.1.is_final()
    }

    fn set_item_parent_handler(
        item: &Self::Item,
        handler: ParentHandler,
    ) -> ZvResult<()> {
        item.1.set_parent_handler(handler)
    }

    fn assemble(
        items: &VecDeque<Self::Item>,
        order: KeyCompare,
    ) -> ZvResult<Object> {
        let entries = items
            .iter()
            .map(|(key, value)| Ok((key.clone(), value.final_value()?)))
            .collect::<ZvResult<Vec<_>>>()?;
        Ok(Object::from_entries(order, entries))
    }

    fn split(value: Object) -> Vec<Self::Item> {
        value
            .into_iter()
            .map(|(k, v)| (k, ValuePush::from(v)))
            .collect()
    }

    fn final_size(value: &Object) -> usize {
        value.len()
    }
}
