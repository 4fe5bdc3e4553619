//! Ленивые потоки, из которых потребитель сам вытягивает элементы.

use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc, vec};

use zvalue_error::{ProtocolViolation, ZvResult};

use super::{
    describe::{self, FormatOptions},
    kind::PullKind,
    ValuePull,
};
use crate::value::{Object, Value};

/// Производитель элементов для [`PullStream`].
///
/// `Ok(None)` означает конец потока. Ошибка пробрасывается потребителю, а
/// производитель остаётся на месте, так что следующий `pull` повторит вызов.
pub trait PullSource<T> {
    fn next_item(&mut self) -> ZvResult<Option<T>>;

    /// Диагностический вывод ещё не прочитанного содержимого. `false` -
    /// производитель не умеет себя описывать, печатается заглушка.
    fn describe(
        &self,
        _out: &mut String,
        _opts: &FormatOptions,
        _indent: &str,
    ) -> bool {
        false
    }
}

impl<T, F> PullSource<T> for F
where
    F: FnMut() -> ZvResult<Option<T>>,
{
    fn next_item(&mut self) -> ZvResult<Option<T>> {
        self()
    }
}

struct PullState<K: PullKind> {
    buffer: VecDeque<K::Item>,
    source: Option<Box<dyn PullSource<K::Item>>>,
    final_size: Option<usize>,
    size_thus_far: usize,
    is_final: bool,
}

impl<K: PullKind> PullState<K> {
    fn account(
        &mut self,
        item: &K::Item,
    ) -> ZvResult<()> {
        let got = self.size_thus_far + K::item_size(item);
        if let Some(limit) = self.final_size {
            if got > limit {
                return Err(ProtocolViolation::SizeExceeded { limit, got }.into());
            }
        }
        self.size_thus_far = got;
        Ok(())
    }

    fn make_final(&mut self) -> ZvResult<()> {
        if let Some(expected) = self.final_size {
            if expected != self.size_thus_far {
                return Err(ProtocolViolation::SizeMismatch {
                    expected,
                    got: self.size_thus_far,
                }
                .into());
            }
        }
        self.final_size = Some(self.size_thus_far);
        self.is_final = true;
        self.source = None;
        Ok(())
    }
}

/// Поток, элементы которого вытягиваются по запросу.
///
/// Клон разделяет то же состояние: это дескриптор, а не копия данных.
/// Элементы выдаются сначала из буфера (`push_back`, константы), затем из
/// производителя. Поток становится финальным, когда производитель сообщил о
/// конце; если размер был объявлен заранее, фактический обязан с ним
/// совпасть.
pub struct PullStream<K: PullKind> {
    state: Rc<RefCell<PullState<K>>>,
}

impl<K: PullKind> Clone for PullStream<K> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<K: PullKind> Default for PullStream<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PullKind> PullStream<K> {
    fn with_state(state: PullState<K>) -> Self {
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Пустой незавершённый поток без производителя.
    pub fn new() -> Self {
        Self::with_state(PullState {
            buffer: VecDeque::new(),
            source: None,
            final_size: None,
            size_thus_far: 0,
            is_final: false,
        })
    }

    /// Поток с заранее объявленным размером.
    pub fn with_final_size(size: usize) -> Self {
        let stream = Self::new();
        stream.state.borrow_mut().final_size = Some(size);
        stream
    }

    /// Поток, читающий из `source`.
    pub fn from_source(source: impl PullSource<K::Item> + 'static) -> Self {
        let stream = Self::new();
        stream.state.borrow_mut().source = Some(Box::new(source));
        stream
    }

    /// То же, что [`from_source`](Self::from_source), но для замыканий:
    /// сигнатура выводится из границы `FnMut`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> ZvResult<Option<K::Item>> + 'static,
    {
        Self::from_source(f)
    }

    /// Поток из готового контейнера.
    pub fn from_final(value: K::Final) -> Self {
        K::from_final(value)
    }

    /// Финальный поток из одного уже буферизованного элемента.
    pub(crate) fn from_buffer(item: K::Item) -> Self {
        let size = K::item_size(&item);
        let mut buffer = VecDeque::new();
        if size > 0 {
            buffer.push_back(item);
        }
        Self::with_state(PullState {
            buffer,
            source: None,
            final_size: Some(size),
            size_thus_far: size,
            is_final: true,
        })
    }

    /// Финальный поток заранее известного размера, элементы которого
    /// материализуются лениво.
    pub(crate) fn from_const_source(
        source: impl PullSource<K::Item> + 'static,
        size: usize,
    ) -> Self {
        Self::with_state(PullState {
            buffer: VecDeque::new(),
            source: Some(Box::new(source)),
            final_size: Some(size),
            size_thus_far: size,
            is_final: true,
        })
    }

    pub fn is_final(&self) -> bool {
        self.state.borrow().is_final
    }

    pub fn final_size(&self) -> Option<usize> {
        self.state.borrow().final_size
    }

    /// Объявляет итоговый размер. Повторное объявление того же размера
    /// допустимо, другого - нет.
    pub fn set_final_size(
        &self,
        size: usize,
    ) -> ZvResult<()> {
        let mut state = self.state.borrow_mut();
        if let Some(current) = state.final_size {
            if current != size {
                return Err(ProtocolViolation::FinalSizeConflict {
                    current,
                    requested: size,
                }
                .into());
            }
            return Ok(());
        }
        if state.size_thus_far > size {
            return Err(ProtocolViolation::SizeExceeded {
                limit: size,
                got: state.size_thus_far,
            }
            .into());
        }
        state.final_size = Some(size);
        Ok(())
    }

    /// Подключает производителя.
    pub fn set_source(
        &self,
        source: impl PullSource<K::Item> + 'static,
    ) -> ZvResult<()> {
        let mut state = self.state.borrow_mut();
        if state.is_final {
            return Err(ProtocolViolation::AlreadyFinal { op: "set_source" }.into());
        }
        if state.source.is_some() {
            return Err(ProtocolViolation::HandlerAttached { what: "pull" }.into());
        }
        state.source = Some(Box::new(source));
        Ok(())
    }

    /// Добавляет элемент в буфер; `None` завершает поток.
    pub fn push_back(
        &self,
        item: Option<K::Item>,
    ) -> ZvResult<()> {
        let mut state = self.state.borrow_mut();
        if state.is_final {
            return Err(ProtocolViolation::AlreadyFinal { op: "push_back" }.into());
        }
        if state.source.is_some() {
            return Err(ProtocolViolation::HandlerAttached { what: "pull" }.into());
        }
        match item {
            Some(item) => {
                state.account(&item)?;
                state.buffer.push_back(item);
                Ok(())
            }
            None => state.make_final(),
        }
    }

    /// Следующий элемент или `None` в конце потока.
    pub fn pull(&self) -> ZvResult<Option<K::Item>> {
        let mut state = self.state.borrow_mut();
        if let Some(item) = state.buffer.pop_front() {
            return Ok(Some(item));
        }
        let Some(mut source) = state.source.take() else {
            if !state.is_final {
                state.make_final()?;
            }
            return Ok(None);
        };
        drop(state);

        let next = source.next_item();
        let mut state = self.state.borrow_mut();
        match next {
            Ok(Some(item)) => {
                state.source = Some(source);
                if !state.is_final {
                    state.account(&item)?;
                }
                Ok(Some(item))
            }
            Ok(None) => {
                state.make_final()?;
                Ok(None)
            }
            Err(e) => {
                state.source = Some(source);
                Err(e)
            }
        }
    }

    /// Дочитывает производителя в буфер.
    fn pull_all(&self) -> ZvResult<()> {
        loop {
            let Some(mut source) = self.state.borrow_mut().source.take() else {
                return Ok(());
            };
            let next = source.next_item();
            let mut state = self.state.borrow_mut();
            match next {
                Ok(Some(item)) => {
                    state.source = Some(source);
                    if !state.is_final {
                        state.account(&item)?;
                    }
                    state.buffer.push_back(item);
                }
                Ok(None) => return state.make_final(),
                Err(e) => {
                    state.source = Some(source);
                    return Err(e);
                }
            }
        }
    }

    /// Итоговый размер; при необходимости дочитывает поток (элементы
    /// остаются в буфере).
    pub fn pull_size(&self) -> ZvResult<usize> {
        if !self.is_final() {
            self.pull_all()?;
            let mut state = self.state.borrow_mut();
            if !state.is_final {
                state.make_final()?;
            }
        }
        let state = self.state.borrow();
        Ok(state.final_size.unwrap_or(state.size_thus_far))
    }

    /// Собирает весь поток в контейнер. Буфер не расходуется, поэтому
    /// повторный вызов вернёт то же значение.
    pub fn pull_final(&self) -> ZvResult<K::Final> {
        self.pull_all()?;
        {
            let mut state = self.state.borrow_mut();
            if !state.is_final {
                state.make_final()?;
            }
        }
        let state = self.state.borrow();
        K::assemble(&state.buffer)
    }

    /// Диагностический вывод без чтения из производителя.
    pub fn describe(
        &self,
        out: &mut String,
        opts: &FormatOptions,
        indent: &str,
    ) {
        let state = self.state.borrow();
        if state.buffer.is_empty() {
            if let Some(source) = &state.source {
                if !source.describe(out, opts, indent) {
                    out.push_str(K::PLACEHOLDER);
                }
                return;
            }
        }
        let more = !state.is_final || state.source.is_some();
        K::describe_items(out, opts, indent, &state.buffer, more);
    }
}

impl<K: PullKind> fmt::Debug for PullStream<K> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("PullStream")
            .field("kind", &K::NAME)
            .field("buffered", &state.buffer.len())
            .field("final_size", &state.final_size)
            .field("is_final", &state.is_final)
            .finish()
    }
}

/// Ленивый производитель элементов готового массива.
pub(crate) struct ConstArray {
    values: vec::IntoIter<Value>,
}

impl ConstArray {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }
}

impl PullSource<ValuePull> for ConstArray {
    fn next_item(&mut self) -> ZvResult<Option<ValuePull>> {
        Ok(self.values.next().map(ValuePull::from))
    }

    fn describe(
        &self,
        out: &mut String,
        opts: &FormatOptions,
        indent: &str,
    ) -> bool {
        describe::write_values(out, self.values.as_slice().iter(), opts, indent);
        true
    }
}

/// Ленивый производитель полей готового объекта.
pub(crate) struct ConstObject {
    entries: vec::IntoIter<(String, Value)>,
}

impl ConstObject {
    pub(crate) fn new(object: Object) -> Self {
        Self {
            entries: object.into_iter(),
        }
    }
}

impl PullSource<(String, ValuePull)> for ConstObject {
    fn next_item(&mut self) -> ZvResult<Option<(String, ValuePull)>> {
        Ok(self.entries.next().map(|(k, v)| (k, ValuePull::from(v))))
    }

    fn describe(
        &self,
        out: &mut String,
        opts: &FormatOptions,
        indent: &str,
    ) -> bool {
        describe::write_entries(out, self.entries.as_slice().iter(), opts, indent);
        true
    }
}
