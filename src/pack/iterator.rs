//! Итераторы по составным значениям.
//!
//! Число элементов фиксируется в момент создания; далее итератор выдаёт
//! представления подзначений по индексу. На повреждённых данных итерация
//! останавливается, не выдавая частично разобранных значений.

use crate::error::{PackError, PackResult};

use super::view::ValueView;

/// Итератор по элементам массива.
#[derive(Debug)]
pub struct ArrayIter<'a> {
    view: ValueView<'a>,
    size: usize,
    position: usize,
}

impl<'a> ArrayIter<'a> {
    /// Создаёт итератор; значение обязано быть массивом.
    pub fn new(view: ValueView<'a>) -> PackResult<Self> {
        if !view.is_array() {
            return Err(PackError::InvalidValueType("Array"));
        }
        Ok(ArrayIter {
            view,
            size: view.length()?,
            position: 0,
        })
    }

    /// Число элементов, зафиксированное при создании.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = ValueView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.size {
            return None;
        }
        let item = self.view.at(self.position).ok()?;
        self.position += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.size - self.position;
        (rest, Some(rest))
    }
}

/// Итератор по парам ключ-значение объекта.
#[derive(Debug)]
pub struct ObjectIter<'a> {
    view: ValueView<'a>,
    size: usize,
    position: usize,
}

impl<'a> ObjectIter<'a> {
    /// Создаёт итератор; значение обязано быть объектом.
    pub fn new(view: ValueView<'a>) -> PackResult<Self> {
        if !view.is_object() {
            return Err(PackError::InvalidValueType("Object"));
        }
        Ok(ObjectIter {
            view,
            size: view.length()?,
            position: 0,
        })
    }

    /// Число пар, зафиксированное при создании.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl<'a> Iterator for ObjectIter<'a> {
    type Item = (ValueView<'a>, ValueView<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.size {
            return None;
        }
        let key = self.view.key_at(self.position).ok()?;
        let value = self.view.value_at(self.position).ok()?;
        self.position += 1;
        Some((key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.size - self.position;
        (rest, Some(rest))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
