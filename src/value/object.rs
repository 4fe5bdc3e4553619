use std::{cmp::Ordering, fmt, ops::Index};

use super::Value;

/// Компаратор, задающий порядок ключей объекта.
pub type KeyCompare = fn(&str, &str) -> Ordering;

/// Порядок по умолчанию: побайтовое сравнение.
pub fn lexicographic(
    a: &str,
    b: &str,
) -> Ordering {
    a.cmp(b)
}

static NULL: Value = Value::Null;

/// Отображение строковых ключей в значения.
///
/// Записи всегда отсортированы компаратором объекта, поэтому любой энкодер
/// видит ключи в его порядке независимо от порядка вставки.
#[derive(Clone)]
pub struct Object {
    entries: Vec<(String, Value)>,
    order: KeyCompare,
}

impl Object {
    pub fn new() -> Self {
        Self::with_order(lexicographic)
    }

    pub fn with_order(order: KeyCompare) -> Self {
        Self {
            entries: Vec::new(),
            order,
        }
    }

    /// Объект из записей в произвольном порядке за одну сортировку; из
    /// повторяющихся ключей остаётся последний.
    pub fn from_entries(
        order: KeyCompare,
        entries: Vec<(String, Value)>,
    ) -> Self {
        let mut obj = Self { entries, order };
        obj.normalize();
        obj
    }

    pub fn order(&self) -> KeyCompare {
        self.order
    }

    /// Пересортировка под другой компаратор.
    pub fn reorder(
        mut self,
        order: KeyCompare,
    ) -> Self {
        self.order = order;
        self.normalize();
        self
    }

    fn normalize(&mut self) {
        let order = self.order;
        // после разворота стабильная сортировка ставит последнюю вставку
        // первой среди равных, а dedup оставляет первую
        self.entries.reverse();
        self.entries.sort_by(|a, b| order(&a.0, &b.0));
        self.entries.dedup_by(|a, b| order(&a.0, &b.0) == Ordering::Equal);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(
        &self,
        key: &str,
    ) -> Result<usize, usize> {
        let order = self.order;
        self.entries.binary_search_by(|(k, _)| order(k, key))
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.find(key).ok().map(|i| &self.entries[i].1)
    }

    pub fn get_mut(
        &mut self,
        key: &str,
    ) -> Option<&mut Value> {
        match self.find(key) {
            Ok(i) => Some(&mut self.entries[i].1),
            Err(_) => None,
        }
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.find(key).is_ok()
    }

    /// Вставка или замена; возвращает прежнее значение.
    ///
    /// Одиночная вставка сдвигает хвост; для сборки большого объекта есть
    /// [`Object::from_entries`] и `extend`.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.find(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            Err(i) => {
                self.entries.insert(i, (key, value));
                None
            }
        }
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.find(key).ok().map(|i| self.entries.remove(i).1)
    }

    /// Записи в порядке ключей.
    pub fn iter(&self) -> std::slice::Iter<'_, (String, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn as_slice(&self) -> &[(String, Value)] {
        &self.entries
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Object {}

impl PartialOrd for Object {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Object {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.entries.cmp(&other.entries)
    }
}

impl fmt::Debug for Object {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl Index<&str> for Object {
    type Output = Value;

    /// Отсутствующий ключ читается как `Null`.
    fn index(
        &self,
        key: &str,
    ) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut obj = Object::new();
        obj.extend(iter);
        obj
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Object {
    fn extend<I: IntoIterator<Item = (K, V)>>(
        &mut self,
        iter: I,
    ) {
        let before = self.entries.len();
        self.entries
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
        if self.entries.len() > before {
            self.normalize();
        }
    }
}

impl IntoIterator for Object {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Object {
    type Item = &'a (String, Value);
    type IntoIter = std::slice::Iter<'a, (String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reverse(
        a: &str,
        b: &str,
    ) -> Ordering {
        b.cmp(a)
    }

    /// Тест проверяет, что ключи всегда идут в порядке компаратора вне
    /// зависимости от порядка вставки.
    #[test]
    fn test_keys_sorted_regardless_of_insertion() {
        let mut obj = Object::new();
        obj.insert("b", 2);
        obj.insert("c", 3);
        obj.insert("a", 1);
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let mut rev = Object::with_order(reverse);
        rev.insert("b", 2);
        rev.insert("a", 1);
        rev.insert("c", 3);
        assert_eq!(rev.keys().collect::<Vec<_>>(), vec!["c", "b", "a"]);
    }

    /// Тест проверяет замену значения и возврат предыдущего.
    #[test]
    fn test_insert_replaces() {
        let mut obj = Object::new();
        assert_eq!(obj.insert("k", 1), None);
        assert_eq!(obj.insert("k", "two"), Some(Value::Integer(1)));
        assert_eq!(obj.len(), 1);
        assert_eq!(obj["k"], Value::from("two"));
    }

    /// Тест проверяет, что отсутствующий ключ читается как Null.
    #[test]
    fn test_missing_key_is_null() {
        let obj: Object = [("a", 1)].into_iter().collect();
        assert_eq!(obj["zzz"], Value::Null);
        assert!(obj.get("zzz").is_none());
    }

    #[test]
    fn test_remove_and_reorder() {
        let mut obj: Object = [("x", 1), ("y", 2), ("z", 3)].into_iter().collect();
        assert_eq!(obj.remove("y"), Some(Value::Integer(2)));
        assert!(!obj.contains_key("y"));

        let obj = obj.reorder(reverse);
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["z", "x"]);
        assert_eq!(obj["x"], Value::Integer(1));
    }

    /// Тест проверяет массовую сборку: сортировка один раз, из повторов
    /// ключа побеждает последний, как при последовательных `insert`.
    #[test]
    fn test_bulk_build_keeps_last_duplicate() {
        let entries = vec![
            ("b".to_string(), Value::Integer(1)),
            ("a".to_string(), Value::Integer(2)),
            ("b".to_string(), Value::Integer(3)),
            ("c".to_string(), Value::Integer(4)),
            ("b".to_string(), Value::Integer(5)),
        ];
        let mut one_by_one = Object::new();
        for (k, v) in entries.clone() {
            one_by_one.insert(k, v);
        }
        let bulk = Object::from_entries(lexicographic, entries);
        assert_eq!(bulk, one_by_one);
        assert_eq!(bulk["b"], Value::Integer(5));

        let mut extended: Object = [("a", 0), ("z", 9)].into_iter().collect();
        extended.extend([("a", 7), ("m", 8)]);
        assert_eq!(extended.keys().collect::<Vec<_>>(), vec!["a", "m", "z"]);
        assert_eq!(extended["a"], Value::Integer(7));
    }

    /// Тест проверяет сборку большого объекта из записей в обратном порядке.
    #[test]
    fn test_bulk_build_large() {
        let entries: Vec<(String, Value)> = (0..50_000)
            .rev()
            .map(|i| (format!("k{i:06}"), Value::Integer(i)))
            .collect();
        let obj = Object::from_entries(lexicographic, entries);
        assert_eq!(obj.len(), 50_000);
        assert_eq!(obj.keys().next(), Some("k000000"));
        assert_eq!(obj["k049999"], Value::Integer(49_999));
    }
}
