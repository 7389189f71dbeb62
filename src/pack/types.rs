//! Типы бинарного формата.
//!
//! Формат самоописываемый: первый байт значения («head») полностью
//! определяет его вид и способ интерпретации последующих байт. Этот модуль
//! определяет перечисление видов [`ValueKind`], владеющее значение
//! [`PackValue`] для удобной передачи скаляров в кодировщик, а также три
//! диспетчерские таблицы на 256 записей, по которым декодер классифицирует
//! любой head-байт за одно обращение.
//!
//! Таблицы генерируются один раз из тех же правил раскладки, которыми
//! пользуется кодировщик; расхождение между ними — это порча формата, а не
//! восстановимая ошибка, поэтому генератор проверяется тестами напрямую
//! против таблицы раскладки.

use std::fmt;

use once_cell::sync::Lazy;

/// Вид закодированного значения.
///
/// Закрытое перечисление, дискриминируемое head-байтом кодировки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Null,
    Bool,
    Double,
    UtcDate,
    External,
    MinKey,
    MaxKey,
    Int,
    UInt,
    SmallInt,
    String,
    Binary,
    Bcd,
    Array,
    Object,
    Custom,
}

impl ValueKind {
    /// Классифицирует head-байт через диспетчерскую таблицу.
    #[inline(always)]
    pub fn from_head(head: u8) -> Self {
        TYPE_TABLE[head as usize]
    }

    /// Имя вида для диагностики.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::None => "None",
            ValueKind::Null => "Null",
            ValueKind::Bool => "Bool",
            ValueKind::Double => "Double",
            ValueKind::UtcDate => "UtcDate",
            ValueKind::External => "External",
            ValueKind::MinKey => "MinKey",
            ValueKind::MaxKey => "MaxKey",
            ValueKind::Int => "Int",
            ValueKind::UInt => "UInt",
            ValueKind::SmallInt => "SmallInt",
            ValueKind::String => "String",
            ValueKind::Binary => "Binary",
            ValueKind::Bcd => "BCD",
            ValueKind::Array => "Array",
            ValueKind::Object => "Object",
            ValueKind::Custom => "Custom",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Владеющее значение для передачи в кодировщик.
///
/// Аналог «удобного» значения исходного движка: позволяет добавлять
/// скаляры, строки и бинарные данные одним вызовом, не заботясь о выборе
/// ширины кодирования — её выбирает сам кодировщик.
#[derive(Debug, Clone, PartialEq)]
pub enum PackValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    UtcDate(i64),
    Str(String),
    Binary(Vec<u8>),
    External(u64),
    MinKey,
    MaxKey,
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PackValue
////////////////////////////////////////////////////////////////////////////////

impl From<bool> for PackValue {
    fn from(v: bool) -> Self {
        PackValue::Bool(v)
    }
}

impl From<i64> for PackValue {
    fn from(v: i64) -> Self {
        PackValue::Int(v)
    }
}

impl From<i32> for PackValue {
    fn from(v: i32) -> Self {
        PackValue::Int(v as i64)
    }
}

impl From<u64> for PackValue {
    fn from(v: u64) -> Self {
        PackValue::UInt(v)
    }
}

impl From<f64> for PackValue {
    fn from(v: f64) -> Self {
        PackValue::Double(v)
    }
}

impl From<&str> for PackValue {
    fn from(v: &str) -> Self {
        PackValue::Str(v.to_string())
    }
}

impl From<String> for PackValue {
    fn from(v: String) -> Self {
        PackValue::Str(v)
    }
}

impl From<&[u8]> for PackValue {
    fn from(v: &[u8]) -> Self {
        PackValue::Binary(v.to_vec())
    }
}

impl From<Vec<u8>> for PackValue {
    fn from(v: Vec<u8>) -> Self {
        PackValue::Binary(v)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Диспетчерские таблицы
////////////////////////////////////////////////////////////////////////////////

/// Правило классификации head-байта. Единственный источник истины для
/// [`TYPE_TABLE`].
fn classify_head(head: u8) -> ValueKind {
    match head {
        0x00 => ValueKind::None,
        0x01..=0x09 => ValueKind::Array,
        0x0a..=0x12 => ValueKind::Object,
        0x13..=0x17 => ValueKind::None, // зарезервировано
        0x18 => ValueKind::Null,
        0x19 | 0x1a => ValueKind::Bool,
        0x1b => ValueKind::Double,
        0x1c => ValueKind::UtcDate,
        0x1d => ValueKind::External,
        0x1e => ValueKind::MinKey,
        0x1f => ValueKind::MaxKey,
        0x20..=0x27 => ValueKind::Int,
        0x28..=0x2f => ValueKind::UInt,
        0x30..=0x3f => ValueKind::SmallInt,
        0x40..=0xbf => ValueKind::String,
        0xc0..=0xc7 => ValueKind::Binary,
        0xc8..=0xd7 => ValueKind::Bcd,
        0xd8..=0xef => ValueKind::None, // зарезервировано
        0xf0..=0xff => ValueKind::Custom,
    }
}

/// Ширина поля длины/записи индексной таблицы для составных значений;
/// 0 для всех прочих видов.
fn index_entry_width_of(head: u8) -> u8 {
    match head {
        0x01 | 0x0a => 1,
        0x02 | 0x06 | 0x0b | 0x0f => 1,
        0x03 | 0x07 | 0x0c | 0x10 => 2,
        0x04 | 0x08 | 0x0d | 0x11 => 4,
        0x05 | 0x09 | 0x0e | 0x12 => 8,
        _ => 0,
    }
}

/// Нижняя граница смещения первого подзначения составного значения.
///
/// Это именно подсказка: читатель дополнительно пробует байты 2, 3 и 5 на
/// ненулевое значение, чтобы пропустить возможно отсутствующее поле счётчика
/// и хвост неуплотнённого заголовка (см. `ValueView::find_data_offset`).
fn first_sub_offset_of(head: u8) -> u8 {
    match head {
        0x01 | 0x0a => 1,
        0x02 => 2,
        0x03 => 3,
        0x04 => 5,
        0x05 => 9,
        0x06 | 0x0b | 0x0f => 3,
        0x07 | 0x0c | 0x10 => 5,
        0x08 | 0x09 | 0x0d | 0x0e | 0x11 | 0x12 => 8,
        _ => 0,
    }
}

/// `TypeOf[head]` — вид значения по head-байту.
pub(crate) static TYPE_TABLE: Lazy<[ValueKind; 256]> = Lazy::new(|| {
    let mut table = [ValueKind::None; 256];
    for (head, slot) in table.iter_mut().enumerate() {
        *slot = classify_head(head as u8);
    }
    table
});

/// `IndexEntryWidth[head]` — ширина смещений/длины составного значения.
pub(crate) static WIDTH_TABLE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (head, slot) in table.iter_mut().enumerate() {
        *slot = index_entry_width_of(head as u8);
    }
    table
});

/// `FirstElementOffsetHint[head]` — подсказка смещения первого подзначения.
pub(crate) static FIRST_SUB_TABLE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (head, slot) in table.iter_mut().enumerate() {
        *slot = first_sub_offset_of(head as u8);
    }
    table
});

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Генератор таблицы видов сверяется с таблицей раскладки напрямую,
    /// по граничным значениям каждого диапазона.
    #[test]
    fn test_type_table_matches_layout() {
        let expected: &[(u8, ValueKind)] = &[
            (0x00, ValueKind::None),
            (0x01, ValueKind::Array),
            (0x05, ValueKind::Array),
            (0x06, ValueKind::Array),
            (0x09, ValueKind::Array),
            (0x0a, ValueKind::Object),
            (0x0b, ValueKind::Object),
            (0x12, ValueKind::Object),
            (0x13, ValueKind::None),
            (0x17, ValueKind::None),
            (0x18, ValueKind::Null),
            (0x19, ValueKind::Bool),
            (0x1a, ValueKind::Bool),
            (0x1b, ValueKind::Double),
            (0x1c, ValueKind::UtcDate),
            (0x1d, ValueKind::External),
            (0x1e, ValueKind::MinKey),
            (0x1f, ValueKind::MaxKey),
            (0x20, ValueKind::Int),
            (0x27, ValueKind::Int),
            (0x28, ValueKind::UInt),
            (0x2f, ValueKind::UInt),
            (0x30, ValueKind::SmallInt),
            (0x39, ValueKind::SmallInt),
            (0x3a, ValueKind::SmallInt),
            (0x3f, ValueKind::SmallInt),
            (0x40, ValueKind::String),
            (0xbe, ValueKind::String),
            (0xbf, ValueKind::String),
            (0xc0, ValueKind::Binary),
            (0xc7, ValueKind::Binary),
            (0xc8, ValueKind::Bcd),
            (0xcf, ValueKind::Bcd),
            (0xd0, ValueKind::Bcd),
            (0xd7, ValueKind::Bcd),
            (0xd8, ValueKind::None),
            (0xef, ValueKind::None),
            (0xf0, ValueKind::Custom),
            (0xff, ValueKind::Custom),
        ];
        for &(head, kind) in expected {
            assert_eq!(
                TYPE_TABLE[head as usize], kind,
                "head 0x{head:02x} must classify as {kind}"
            );
        }
    }

    #[test]
    fn test_width_table_matches_layout() {
        // Семейства массивов: без таблицы (0x02..0x05) и с таблицей
        // (0x06..0x09), ширина 1/2/4/8.
        assert_eq!(WIDTH_TABLE[0x02], 1);
        assert_eq!(WIDTH_TABLE[0x03], 2);
        assert_eq!(WIDTH_TABLE[0x04], 4);
        assert_eq!(WIDTH_TABLE[0x05], 8);
        assert_eq!(WIDTH_TABLE[0x06], 1);
        assert_eq!(WIDTH_TABLE[0x07], 2);
        assert_eq!(WIDTH_TABLE[0x08], 4);
        assert_eq!(WIDTH_TABLE[0x09], 8);
        // Объекты: сортированные и несортированные.
        assert_eq!(WIDTH_TABLE[0x0b], 1);
        assert_eq!(WIDTH_TABLE[0x0e], 8);
        assert_eq!(WIDTH_TABLE[0x0f], 1);
        assert_eq!(WIDTH_TABLE[0x12], 8);
        // Скаляры ширины не имеют.
        assert_eq!(WIDTH_TABLE[0x00], 0);
        assert_eq!(WIDTH_TABLE[0x18], 0);
        assert_eq!(WIDTH_TABLE[0x40], 0);
    }

    #[test]
    fn test_first_sub_table_matches_layout() {
        assert_eq!(FIRST_SUB_TABLE[0x01], 1);
        assert_eq!(FIRST_SUB_TABLE[0x02], 2);
        assert_eq!(FIRST_SUB_TABLE[0x03], 3);
        assert_eq!(FIRST_SUB_TABLE[0x04], 5);
        assert_eq!(FIRST_SUB_TABLE[0x05], 9);
        assert_eq!(FIRST_SUB_TABLE[0x06], 3);
        assert_eq!(FIRST_SUB_TABLE[0x07], 5);
        assert_eq!(FIRST_SUB_TABLE[0x08], 8);
        assert_eq!(FIRST_SUB_TABLE[0x09], 8);
        assert_eq!(FIRST_SUB_TABLE[0x0a], 1);
        assert_eq!(FIRST_SUB_TABLE[0x0b], 3);
        assert_eq!(FIRST_SUB_TABLE[0x0c], 5);
        assert_eq!(FIRST_SUB_TABLE[0x0d], 8);
        assert_eq!(FIRST_SUB_TABLE[0x0e], 8);
        assert_eq!(FIRST_SUB_TABLE[0x0f], 3);
        assert_eq!(FIRST_SUB_TABLE[0x10], 5);
        assert_eq!(FIRST_SUB_TABLE[0x11], 8);
        assert_eq!(FIRST_SUB_TABLE[0x12], 8);
    }

    #[test]
    fn test_short_string_range_covers_126_bytes() {
        // 0x40 — пустая строка, 0xbe — 126 байт, 0xbf — длинная строка.
        assert_eq!(0xbeu8 - 0x40, 126);
        assert_eq!(ValueKind::from_head(0xbe), ValueKind::String);
        assert_eq!(ValueKind::from_head(0xbf), ValueKind::String);
    }

    #[test]
    fn test_pack_value_from_impls() {
        assert_eq!(PackValue::from(true), PackValue::Bool(true));
        assert_eq!(PackValue::from(-5i64), PackValue::Int(-5));
        assert_eq!(PackValue::from(5u64), PackValue::UInt(5));
        assert_eq!(PackValue::from("ab"), PackValue::Str("ab".into()));
        assert_eq!(
            PackValue::from(vec![1u8, 2]),
            PackValue::Binary(vec![1, 2])
        );
    }
}
