//! Потоки, в которые производитель сам проталкивает элементы.
//!
//! Элементы накапливаются в буфере, пока к потоку не подключён обработчик.
//! Вложенный поток, который ещё не завершён, приостанавливает доставку
//! следующих за ним элементов: родитель регистрирует у него продолжение и
//! возобновляется, когда вложенный поток станет финальным.

use std::{cell::RefCell, collections::VecDeque, fmt, rc::Rc};

use tracing::{error, info, warn};
use zvalue_error::{ProtocolViolation, ZvResult};

use super::kind::PushKind;
use crate::value::{lexicographic, KeyCompare, Object, Value};

/// Продолжение, которое вложенный поток вызывает после своего завершения.
pub type ParentHandler = Box<dyn FnOnce() -> ZvResult<()>>;

type ValueHandler<T> = Box<dyn FnMut(Option<T>) -> ZvResult<()>>;
type BatchHandler<T> = Box<dyn FnMut(Vec<T>) -> ZvResult<()>>;
type FinalHandler<F> = Box<dyn FnOnce(&F) -> ZvResult<()>>;

struct PushState<K: PushKind> {
    const_value: Option<K::Final>,
    buffer: VecDeque<K::Item>,
    stalled: bool,
    stalled_pos: Option<usize>,
    value_handler: Option<ValueHandler<K::Item>>,
    batch_handler: Option<BatchHandler<K::Item>>,
    final_handler: Option<FinalHandler<K::Final>>,
    key_order: KeyCompare,
    parent_handlers: VecDeque<ParentHandler>,
    final_size: Option<usize>,
    size_thus_far: usize,
    is_final: bool,
}

type Shared<K> = Rc<RefCell<PushState<K>>>;

impl<K: PushKind> PushState<K> {
    fn new(final_size: Option<usize>) -> Self {
        Self {
            const_value: None,
            buffer: VecDeque::new(),
            stalled: false,
            stalled_pos: None,
            value_handler: None,
            batch_handler: None,
            final_handler: None,
            key_order: lexicographic,
            parent_handlers: VecDeque::new(),
            final_size,
            size_thus_far: 0,
            is_final: false,
        }
    }

    fn check_complete(&self) -> ZvResult<()> {
        if !self.is_final || self.stalled {
            return Err(ProtocolViolation::NotFinal.into());
        }
        Ok(())
    }

    /// Собирает буфер в готовое значение.
    fn materialize(&mut self) -> ZvResult<()> {
        if !self.buffer.is_empty() {
            let value = K::assemble(&self.buffer, self.key_order)?;
            self.buffer.clear();
            self.const_value = Some(value);
        }
        Ok(())
    }

    fn accept(
        &mut self,
        size: usize,
    ) -> ZvResult<()> {
        if self.is_final {
            return Err(ProtocolViolation::AlreadyFinal { op: "push" }.into());
        }
        let got = self.size_thus_far + size;
        if let Some(limit) = self.final_size {
            if got > limit {
                return Err(ProtocolViolation::SizeExceeded { limit, got }.into());
            }
        }
        self.size_thus_far = got;
        Ok(())
    }
}

impl<K: PushKind> Drop for PushState<K> {
    fn drop(&mut self) {
        if !self.is_final || self.stalled {
            if !self.stalled && self.final_size.is_none() && self.size_thus_far == 0 {
                info!("pusher[{}] not used", K::NAME);
            } else {
                warn!("pusher[{}] destructed before complete", K::NAME);
            }
        }
    }
}

fn resume_handler<K: PushKind>(shared: &Shared<K>) -> ParentHandler {
    let shared = Rc::clone(shared);
    Box::new(move || {
        {
            let mut state = shared.borrow_mut();
            state.stalled = false;
            state.stalled_pos = None;
        }
        do_push(&shared)
    })
}

/// Ошибка обработчика при доставке конца потока: финальная стадия всё
/// равно выполняется, наружу уходит её ошибка либо исходная.
fn fail_at_end<K: PushKind>(
    shared: &Shared<K>,
    err: zvalue_error::StackError,
) -> ZvResult<()> {
    error!("pusher[{}] error during push: {}", K::NAME, err);
    do_final(shared)?;
    Err(err)
}

fn do_push<K: PushKind>(shared: &Shared<K>) -> ZvResult<()> {
    let mut state = shared.borrow_mut();
    if state.stalled && state.stalled_pos.is_none() {
        return Ok(());
    }

    if let Some(mut handler) = state.value_handler.take() {
        if let Some(value) = state.const_value.take() {
            for item in K::split(value).into_iter().rev() {
                state.buffer.push_front(item);
            }
        }

        if let Some(pos) = state.stalled_pos {
            for _ in 0..=pos {
                let Some(item) = state.buffer.front().cloned() else {
                    break;
                };
                drop(state);
                handler(Some(item))?;
                state = shared.borrow_mut();
                state.buffer.pop_front();
            }
            state.stalled_pos = None;
            state.value_handler = Some(handler);
            return Ok(());
        }

        loop {
            let Some(item) = state.buffer.front().cloned() else {
                break;
            };
            drop(state);
            handler(Some(item.clone()))?;
            state = shared.borrow_mut();
            state.buffer.pop_front();
            if !K::is_item_final(&item) {
                drop(state);
                K::set_item_parent_handler(&item, resume_handler(shared))?;
                state = shared.borrow_mut();
                state.stalled_pos = None;
                state.stalled = true;
                state.value_handler = Some(handler);
                return Ok(());
            }
        }

        if state.is_final {
            drop(state);
            if let Err(e) = handler(None) {
                return fail_at_end(shared, e);
            }
            return do_final(shared);
        }
        state.value_handler = Some(handler);
    } else if let Some(mut handler) = state.batch_handler.take() {
        if let Some(value) = state.const_value.take() {
            let items = K::split(value);
            if !items.is_empty() {
                drop(state);
                handler(items)?;
                state = shared.borrow_mut();
            }
        }

        if let Some(pos) = state.stalled_pos {
            let end = (pos + 1).min(state.buffer.len());
            let batch: Vec<_> = state.buffer.range(..end).cloned().collect();
            drop(state);
            handler(batch)?;
            state = shared.borrow_mut();
            state.buffer.drain(..end);
            state.stalled_pos = None;
            state.batch_handler = Some(handler);
            return Ok(());
        }

        while !state.buffer.is_empty() {
            let active = state.buffer.iter().position(|item| !K::is_item_final(item));
            let end = active.map_or(state.buffer.len(), |i| i + 1);
            let batch: Vec<_> = state.buffer.range(..end).cloned().collect();
            drop(state);
            handler(batch)?;
            state = shared.borrow_mut();
            let stalled_on = active
                .and_then(|i| state.buffer.get(i).cloned())
                .filter(|item| !K::is_item_final(item));
            state.buffer.drain(..end);
            if let Some(item) = stalled_on {
                drop(state);
                K::set_item_parent_handler(&item, resume_handler(shared))?;
                state = shared.borrow_mut();
                state.stalled_pos = None;
                state.stalled = true;
                state.batch_handler = Some(handler);
                return Ok(());
            }
        }

        if state.is_final {
            drop(state);
            if let Err(e) = handler(Vec::new()) {
                return fail_at_end(shared, e);
            }
            return do_final(shared);
        }
        state.batch_handler = Some(handler);
    } else if state.is_final && !state.stalled {
        let pending = state
            .buffer
            .iter()
            .position(|item| !K::is_item_final(item));
        if let Some(pos) = pending {
            let item = state.buffer[pos].clone();
            state.stalled_pos = Some(pos);
            state.stalled = true;
            drop(state);
            return K::set_item_parent_handler(&item, resume_handler(shared));
        }
        drop(state);
        return do_final(shared);
    }
    Ok(())
}

fn do_final<K: PushKind>(shared: &Shared<K>) -> ZvResult<()> {
    let handler = shared.borrow_mut().final_handler.take();
    let result = match handler {
        Some(handler) => {
            let mut state = shared.borrow_mut();
            let value = state
                .materialize()
                .map(|()| state.const_value.take().unwrap_or_default());
            drop(state);
            value.and_then(|value| {
                let result = handler(&value);
                shared.borrow_mut().const_value = Some(value);
                result
            })
        }
        None => Ok(()),
    };

    if let Err(e) = result {
        error!("pusher[{}] error during final: {}", K::NAME, e);
        do_parent(shared)?;
        return Err(e);
    }
    do_parent(shared)
}

fn do_parent<K: PushKind>(shared: &Shared<K>) -> ZvResult<()> {
    let mut result = Ok(());
    loop {
        let handler = shared.borrow_mut().parent_handlers.pop_front();
        let Some(handler) = handler else {
            break;
        };
        if let Err(e) = handler() {
            error!("pusher[{}] error from parent: {}", K::NAME, e);
            result = Err(e);
        }
    }
    result
}

/// Поток, в который данные проталкиваются производителем.
///
/// Клон разделяет то же состояние. Размер проверяется несимметрично:
/// превышение объявленного размера - ошибка, а недобор при `end` лишь
/// логируется, и итоговым размером становится фактический.
pub struct PushStream<K: PushKind> {
    state: Shared<K>,
}

impl<K: PushKind> Clone for PushStream<K> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<K: PushKind> Default for PushStream<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PushKind> PushStream<K> {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(PushState::new(None))),
        }
    }

    pub fn with_final_size(size: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(PushState::new(Some(size)))),
        }
    }

    /// Уже завершённый поток с готовым значением.
    pub fn from_final(value: K::Final) -> Self {
        let size = K::final_size(&value);
        let mut state = PushState::new(Some(size));
        state.size_thus_far = size;
        state.const_value = Some(value);
        state.is_final = true;
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

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

    pub fn final_size(&self) -> Option<usize> {
        self.state.borrow().final_size
    }

    /// Поток завершён и не ждёт вложенных потоков.
    pub fn is_final(&self) -> bool {
        let state = self.state.borrow();
        state.is_final && !state.stalled
    }

    /// Забирает итоговое значение; повторный вызов вернёт пустое значение.
    pub fn take_final(&self) -> ZvResult<K::Final> {
        let mut state = self.state.borrow_mut();
        state.check_complete()?;
        state.materialize()?;
        Ok(state.const_value.take().unwrap_or_default())
    }

    /// Копия итогового значения.
    pub fn final_value(&self) -> ZvResult<K::Final> {
        let mut state = self.state.borrow_mut();
        state.check_complete()?;
        state.materialize()?;
        Ok(state.const_value.clone().unwrap_or_default())
    }

    fn check_no_handler(state: &PushState<K>) -> ZvResult<()> {
        if state.value_handler.is_some() || state.batch_handler.is_some() {
            return Err(ProtocolViolation::HandlerAttached { what: "value" }.into());
        }
        Ok(())
    }

    /// Обработчик отдельных элементов; `None` означает конец потока.
    /// Уже накопленные элементы доставляются сразу.
    pub fn set_value_handler(
        &self,
        handler: impl FnMut(Option<K::Item>) -> ZvResult<()> + 'static,
    ) -> ZvResult<()> {
        {
            let mut state = self.state.borrow_mut();
            Self::check_no_handler(&state)?;
            state.value_handler = Some(Box::new(handler));
        }
        do_push(&self.state)
    }

    /// Обработчик пачек элементов; пустая пачка означает конец потока.
    pub fn set_batch_handler(
        &self,
        handler: impl FnMut(Vec<K::Item>) -> ZvResult<()> + 'static,
    ) -> ZvResult<()> {
        {
            let mut state = self.state.borrow_mut();
            Self::check_no_handler(&state)?;
            state.batch_handler = Some(Box::new(handler));
        }
        do_push(&self.state)
    }

    /// Обработчик итогового значения. Элементы, уже отданные обработчику
    /// значений, в итоговое значение не попадают.
    pub fn set_final_handler(
        &self,
        handler: impl FnOnce(&K::Final) -> ZvResult<()> + 'static,
    ) -> ZvResult<()> {
        self.set_final_handler_ordered(handler, lexicographic)
    }

    /// То же, с порядком ключей при сборке объекта.
    pub fn set_final_handler_ordered(
        &self,
        handler: impl FnOnce(&K::Final) -> ZvResult<()> + 'static,
        order: KeyCompare,
    ) -> ZvResult<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.final_handler.is_some() {
                return Err(ProtocolViolation::HandlerAttached { what: "final" }.into());
            }
            state.final_handler = Some(Box::new(handler));
            state.key_order = order;
        }
        do_push(&self.state)
    }

    /// Регистрирует продолжение, вызываемое после завершения потока.
    /// Последнее зарегистрированное вызывается первым.
    pub fn set_parent_handler(
        &self,
        handler: ParentHandler,
    ) -> ZvResult<()> {
        let mut state = self.state.borrow_mut();
        if state.is_final && !state.stalled {
            return Err(ProtocolViolation::AlreadyFinal {
                op: "set_parent_handler",
            }
            .into());
        }
        state.parent_handlers.push_front(handler);
        Ok(())
    }

    /// Конец потока.
    pub fn end(&self) -> ZvResult<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.is_final {
                return Err(ProtocolViolation::AlreadyFinal { op: "end" }.into());
            }
            if let Some(expected) = state.final_size {
                if expected != state.size_thus_far {
                    warn!(
                        "pusher[{}] short stream ({} < {})",
                        K::NAME,
                        state.size_thus_far,
                        expected
                    );
                }
            }
            state.is_final = true;
            state.final_size = Some(state.size_thus_far);
        }
        do_push(&self.state)
    }

    pub fn push(
        &self,
        item: K::Item,
    ) -> ZvResult<()> {
        {
            let mut state = self.state.borrow_mut();
            state.accept(K::item_size(&item))?;
            state.buffer.push_back(item);
        }
        do_push(&self.state)
    }

    /// Элемент или конец потока (`None`).
    pub fn push_opt(
        &self,
        item: Option<K::Item>,
    ) -> ZvResult<()> {
        match item {
            Some(item) => self.push(item),
            None => self.end(),
        }
    }

    /// Пачка элементов; пустая пачка завершает поток.
    pub fn push_batch(
        &self,
        items: Vec<K::Item>,
    ) -> ZvResult<()> {
        if items.is_empty() {
            return self.end();
        }
        {
            let mut state = self.state.borrow_mut();
            let size = items.iter().map(K::item_size).sum();
            state.accept(size)?;
            state.buffer.extend(items);
        }
        do_push(&self.state)
    }
}

impl PushStream<super::kind::ObjectKind> {
    /// Добавляет поле с готовым значением.
    pub fn push_value(
        &self,
        key: impl Into<String>,
        value: Value,
    ) -> ZvResult<()> {
        self.push((key.into(), super::ValuePush::from(value)))
    }

    /// Итоговый объект в заданном порядке ключей.
    pub fn final_value_ordered(
        &self,
        order: KeyCompare,
    ) -> ZvResult<Object> {
        self.final_value().map(|obj| obj.reorder(order))
    }
}

impl<K: PushKind> fmt::Debug for PushStream<K> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("PushStream")
            .field("kind", &K::NAME)
            .field("buffered", &state.buffer.len())
            .field("final_size", &state.final_size)
            .field("is_final", &state.is_final)
            .field("stalled", &state.stalled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use bytes::Bytes;

    use super::*;
    use crate::stream::{ArrayPush, StringPush, ValuePush};

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    /// Тест проверяет буферизацию до подключения обработчика.
    #[test]
    fn test_buffer_until_handler() {
        let s = StringPush::new();
        s.push(Bytes::from("ab")).unwrap();
        s.push(Bytes::from("cd")).unwrap();

        let seen = log();
        let sink = seen.clone();
        s.set_value_handler(move |item| {
            sink.borrow_mut().push(match item {
                Some(b) => String::from_utf8_lossy(&b).into_owned(),
                None => "<end>".into(),
            });
            Ok(())
        })
        .unwrap();
        assert_eq!(*seen.borrow(), vec!["ab", "cd"]);

        s.end().unwrap();
        assert_eq!(*seen.borrow(), vec!["ab", "cd", "<end>"]);
        assert!(s.is_final());
    }

    #[test]
    fn test_final_handler_gets_assembled_value() {
        let s = StringPush::new();
        let got = Rc::new(RefCell::new(String::new()));
        let sink = got.clone();
        s.set_final_handler(move |v| {
            *sink.borrow_mut() = v.clone();
            Ok(())
        })
        .unwrap();
        s.push(Bytes::from("he")).unwrap();
        s.push(Bytes::from("llo")).unwrap();
        assert!(got.borrow().is_empty());
        s.end().unwrap();
        assert_eq!(*got.borrow(), "hello");
        assert_eq!(s.final_value().unwrap(), "hello");
    }

    /// Тест проверяет несимметричную политику размеров: превышение -
    /// ошибка, недобор лишь усекает итоговый размер.
    #[test]
    fn test_size_policy() {
        let s = StringPush::with_final_size(3);
        assert!(s.push(Bytes::from("abcd")).is_err());
        s.push(Bytes::from("ab")).unwrap();
        s.end().unwrap();
        assert_eq!(s.final_size(), Some(2));
        assert_eq!(s.take_final().unwrap(), "ab");
    }

    #[test]
    fn test_push_after_end_fails() {
        let s = StringPush::new();
        s.end().unwrap();
        assert!(s.push(Bytes::from("x")).is_err());
        assert!(s.end().is_err());
    }

    #[test]
    fn test_second_handler_rejected() {
        let s = StringPush::new();
        s.set_value_handler(|_| Ok(())).unwrap();
        assert!(s.set_batch_handler(|_| Ok(())).is_err());
    }

    /// Тест проверяет, что значение недоступно до завершения потока.
    #[test]
    fn test_final_value_requires_final() {
        let s = StringPush::new();
        assert!(s.final_value().is_err());
    }

    /// Тест проверяет приостановку: элемент после незавершённого вложенного
    /// потока доставляется только после его завершения.
    #[test]
    fn test_stall_on_nested_stream() {
        let arr = ArrayPush::new();
        let seen = log();

        let sink = seen.clone();
        arr.set_value_handler(move |item| {
            let label = match item {
                Some(ValuePush::Integer(i)) => i.to_string(),
                Some(ValuePush::String(s)) => {
                    let inner = sink.clone();
                    s.set_final_handler(move |v| {
                        inner.borrow_mut().push(format!("str:{v}"));
                        Ok(())
                    })?;
                    "string".into()
                }
                Some(other) => other.type_name().into(),
                None => "<end>".into(),
            };
            sink.borrow_mut().push(label);
            Ok(())
        })
        .unwrap();

        let child = StringPush::new();
        arr.push(ValuePush::Integer(1)).unwrap();
        arr.push(ValuePush::String(child.clone())).unwrap();
        arr.push(ValuePush::Integer(2)).unwrap();
        arr.end().unwrap();

        assert_eq!(*seen.borrow(), vec!["1", "string"]);
        assert!(!arr.is_final());

        child.push(Bytes::from("x")).unwrap();
        child.end().unwrap();

        assert_eq!(*seen.borrow(), vec!["1", "string", "str:x", "2", "<end>"]);
        assert!(arr.is_final());
    }

    /// Тест проверяет сборку массива с незавершённым вложенным потоком без
    /// обработчика значений.
    #[test]
    fn test_final_waits_for_nested() {
        let arr = ArrayPush::new();
        let result = Rc::new(RefCell::new(None));
        let sink = result.clone();
        arr.set_final_handler(move |v| {
            *sink.borrow_mut() = Some(v.clone());
            Ok(())
        })
        .unwrap();

        let child = StringPush::new();
        arr.push(ValuePush::Boolean(true)).unwrap();
        arr.push(ValuePush::String(child.clone())).unwrap();
        arr.end().unwrap();
        assert!(result.borrow().is_none());

        child.push(Bytes::from("late")).unwrap();
        child.end().unwrap();
        assert_eq!(
            *result.borrow(),
            Some(vec![Value::Boolean(true), Value::from("late")])
        );
    }

    #[test]
    fn test_batch_handler() {
        let s = StringPush::new();
        let batches = Rc::new(RefCell::new(Vec::new()));
        let sink = batches.clone();
        s.push(Bytes::from("a")).unwrap();
        s.push(Bytes::from("b")).unwrap();
        s.set_batch_handler(move |items| {
            sink.borrow_mut().push(items.len());
            Ok(())
        })
        .unwrap();
        s.push(Bytes::from("c")).unwrap();
        s.end().unwrap();
        assert_eq!(*batches.borrow(), vec![2, 1, 0]);
    }

    /// Тест проверяет, что готовое значение отдаётся обработчику элементами.
    #[test]
    fn test_from_final_splits() {
        let arr = ArrayPush::from_final(vec![Value::from(1), Value::from(2)]);
        assert!(arr.is_final());
        let count = Rc::new(RefCell::new(0));
        let sink = count.clone();
        arr.set_value_handler(move |item| {
            if item.is_some() {
                *sink.borrow_mut() += 1;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(*count.borrow(), 2);
    }

    /// Тест проверяет, что ошибка обработчика в конце потока не мешает
    /// вызвать обработчик итогового значения.
    #[test]
    fn test_handler_error_still_finalizes() {
        let s = StringPush::new();
        let finished = Rc::new(RefCell::new(false));
        let flag = finished.clone();
        s.set_final_handler(move |_| {
            *flag.borrow_mut() = true;
            Ok(())
        })
        .unwrap();
        s.set_value_handler(|item| match item {
            None => Err(zvalue_error::SinkError::new("boom").into()),
            Some(_) => Ok(()),
        })
        .unwrap();
        let err = s.end().unwrap_err();
        assert!(err.is_sink());
        assert!(*finished.borrow());
    }

    #[test]
    fn test_object_push_value_ordered() {
        let obj = crate::stream::ObjectPush::new();
        obj.push_value("b", Value::from(1)).unwrap();
        obj.push_value("a", Value::from(2)).unwrap();
        obj.end().unwrap();
        let rev = obj
            .final_value_ordered(|a, b| b.cmp(a))
            .unwrap();
        assert_eq!(rev.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    /// Тест проверяет, что недобор элементов при `end` - предупреждение, а
    /// не ошибка.
    #[test]
    fn test_short_stream_warns() {
        use std::sync::{Arc, Mutex};

        use tracing_subscriber::fmt::MakeWriter;

        #[derive(Clone)]
        struct Capture(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for Capture {
            fn write(
                &mut self,
                buf: &[u8],
            ) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'a> MakeWriter<'a> for Capture {
            type Writer = Capture;

            fn make_writer(&'a self) -> Self::Writer {
                self.clone()
            }
        }

        let out = Capture(Arc::new(Mutex::new(Vec::new())));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(out.clone())
            .with_ansi(false)
            .finish();
        let s = StringPush::with_final_size(3);
        tracing::subscriber::with_default(subscriber, || {
            s.push(Bytes::from("a")).unwrap();
            s.end().unwrap();
        });
        assert_eq!(s.final_value().unwrap(), "a");

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        let line = text
            .lines()
            .find(|l| l.contains("short stream (1 < 3)"))
            .unwrap();
        assert!(line.contains("WARN"), "{line}");
    }
}
