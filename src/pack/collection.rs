//! Коллекционные операции над закодированными значениями.
//!
//! Статeless-функции высшего порядка поверх [`ValueView`] и [`Builder`]:
//! обход и преобразование массивов, выборка ключей и значений объекта,
//! фильтрация по набору ключей и рекурсивное слияние объектов. Каждая
//! функция выполняет один проход и возвращает либо производный скаляр,
//! либо новый запечатанный кодировщик.

use std::collections::{HashMap, HashSet};

use crate::error::{PackError, PackResult};

use super::{
    builder::Builder,
    iterator::{ArrayIter, ObjectIter},
    types::PackValue,
    view::ValueView,
};

/// Предел глубины рекурсии `merge` по умолчанию.
///
/// Ограничение намеренное: глубина рекурсии равна глубине вложенности
/// документа, и на враждебном входе она не должна упираться в стек.
pub const MAX_MERGE_DEPTH: usize = 64;

/// С какого размера набора ключей `keep`/`remove` переходят на множество.
const KEY_SET_HASH_THRESHOLD: usize = 4;

/// С какой длины объекта `keep`/`remove` переходят на множество.
const OBJECT_LEN_HASH_THRESHOLD: usize = 10;

/// Обходит элементы массива, пока колбэк возвращает `true`.
pub fn for_each<F>(
    slice: &ValueView<'_>,
    mut cb: F,
) -> PackResult<()>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    for (index, value) in ArrayIter::new(*slice)?.enumerate() {
        if !cb(&value, index) {
            return Ok(());
        }
    }
    Ok(())
}

/// Строит новый массив из результатов колбэка для каждого элемента.
pub fn map<F>(
    slice: &ValueView<'_>,
    mut cb: F,
) -> PackResult<Builder>
where
    F: FnMut(&ValueView<'_>, usize) -> PackValue,
{
    let mut b = Builder::new();
    b.open_array()?;
    for (index, value) in ArrayIter::new(*slice)?.enumerate() {
        b.add(cb(&value, index))?;
    }
    b.close()?;
    Ok(b)
}

/// Строит новый массив из элементов, прошедших предикат.
pub fn filter<F>(
    slice: &ValueView<'_>,
    mut cb: F,
) -> PackResult<Builder>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    let mut b = Builder::new();
    b.open_array()?;
    for (index, value) in ArrayIter::new(*slice)?.enumerate() {
        if cb(&value, index) {
            b.add_view(&value)?;
        }
    }
    b.close()?;
    Ok(b)
}

/// Первый элемент массива, удовлетворяющий предикату.
pub fn find<'a, F>(
    slice: &ValueView<'a>,
    mut cb: F,
) -> PackResult<Option<ValueView<'a>>>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    for (index, value) in ArrayIter::new(*slice)?.enumerate() {
        if cb(&value, index) {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// `true`, если хотя бы один элемент удовлетворяет предикату;
/// останавливается на первом совпадении.
pub fn contains<F>(
    slice: &ValueView<'_>,
    cb: F,
) -> PackResult<bool>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    Ok(find(slice, cb)?.is_some())
}

/// `true`, если предикат истинен для всех элементов; останавливается на
/// первом нарушении.
pub fn all<F>(
    slice: &ValueView<'_>,
    mut cb: F,
) -> PackResult<bool>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    for (index, value) in ArrayIter::new(*slice)?.enumerate() {
        if !cb(&value, index) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `true`, если предикат истинен хотя бы для одного элемента.
pub fn any<F>(
    slice: &ValueView<'_>,
    cb: F,
) -> PackResult<bool>
where
    F: FnMut(&ValueView<'_>, usize) -> bool,
{
    contains(slice, cb)
}

/// Имена всех атрибутов объекта в порядке хранения.
pub fn keys(slice: &ValueView<'_>) -> PackResult<Vec<String>> {
    let it = ObjectIter::new(*slice)?;
    let mut result = Vec::with_capacity(it.len());
    for (key, _) in it {
        result.push(key.get_str()?.to_string());
    }
    Ok(result)
}

/// Значения всех атрибутов объекта, собранные в массив.
pub fn values(slice: &ValueView<'_>) -> PackResult<Builder> {
    let mut b = Builder::new();
    b.open_array()?;
    for (_, value) in ObjectIter::new(*slice)? {
        b.add_view(&value)?;
    }
    b.close()?;
    Ok(b)
}

/// Новый объект только с атрибутами из `keys`.
pub fn keep(
    slice: &ValueView<'_>,
    keys: &[&str],
) -> PackResult<Builder> {
    filter_object_keys(slice, keys, true)
}

/// Новый объект без атрибутов из `keys`.
pub fn remove(
    slice: &ValueView<'_>,
    keys: &[&str],
) -> PackResult<Builder> {
    filter_object_keys(slice, keys, false)
}

/// Слияние двух объектов с пределом глубины по умолчанию.
///
/// Ключи, присутствующие только в одном из объектов, проходят без
/// изменений; при совпадении берётся значение из `right`, кроме случая,
/// когда `deep` установлен и обе стороны — объекты: тогда слияние
/// рекурсивно.
pub fn merge(
    left: &ValueView<'_>,
    right: &ValueView<'_>,
    deep: bool,
) -> PackResult<Builder> {
    merge_bounded(left, right, deep, MAX_MERGE_DEPTH)
}

/// Слияние с явным пределом глубины рекурсии.
pub fn merge_bounded(
    left: &ValueView<'_>,
    right: &ValueView<'_>,
    deep: bool,
    max_depth: usize,
) -> PackResult<Builder> {
    if !left.is_object() || !right.is_object() {
        return Err(PackError::InvalidValueType("Object"));
    }
    merge_impl(left, right, deep, max_depth, 1)
}

/// Фильтрация атрибутов объекта по набору ключей.
///
/// На больших наборах линейный поиск по `keys` дал бы квадратичное время,
/// поэтому с порога набор перекладывается в множество.
fn filter_object_keys(
    slice: &ValueView<'_>,
    keys: &[&str],
    retain_matching: bool,
) -> PackResult<Builder> {
    let use_set =
        keys.len() >= KEY_SET_HASH_THRESHOLD && slice.length()? > OBJECT_LEN_HASH_THRESHOLD;
    let key_set: HashSet<&str> = if use_set {
        keys.iter().copied().collect()
    } else {
        HashSet::new()
    };

    let mut b = Builder::new();
    b.open_object()?;
    for (key, value) in ObjectIter::new(*slice)? {
        let name = key.get_str()?;
        let matched = if use_set {
            key_set.contains(name)
        } else {
            keys.contains(&name)
        };
        if matched == retain_matching {
            b.add_keyed_view(name, &value)?;
        }
    }
    b.close()?;
    Ok(b)
}

fn merge_impl(
    left: &ValueView<'_>,
    right: &ValueView<'_>,
    deep: bool,
    max_depth: usize,
    depth: usize,
) -> PackResult<Builder> {
    if depth > max_depth {
        return Err(PackError::MaxMergeDepthExceeded(max_depth));
    }

    let mut right_values: HashMap<String, ValueView<'_>> = HashMap::new();
    for (key, value) in ObjectIter::new(*right)? {
        right_values.insert(key.get_str()?.to_string(), value);
    }

    let mut b = Builder::new();
    b.open_object()?;

    for (key, value) in ObjectIter::new(*left)? {
        let name = key.get_str()?;
        match right_values.remove(name) {
            None => b.add_keyed_view(name, &value)?,
            Some(right_value) => {
                if deep && value.is_object() && right_value.is_object() {
                    let sub = merge_impl(&value, &right_value, deep, max_depth, depth + 1)?;
                    b.add_keyed_view(name, &sub.view()?)?;
                } else {
                    b.add_keyed_view(name, &right_value)?;
                }
            }
        }
    }

    // Атрибуты, которые были только справа.
    for (name, value) in right_values {
        b.add_keyed_view(&name, &value)?;
    }

    b.close()?;
    Ok(b)
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
