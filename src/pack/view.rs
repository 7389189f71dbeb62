//! Представление закодированного значения — курсор чтения без владения.
//!
//! [`ValueView`] держит заимствованный срез байт и не выполняет ни одной
//! аллокации: навигация по массивам и объектам, извлечение скаляров и поиск
//! по ключу — всё это чистые функции над байтовым диапазоном. Представление
//! корректно, пока байты живы и не изменяются; это обеспечивается временем
//! жизни заимствования.
//!
//! Классификация head-байтов выполняется по трём таблицам на 256 записей
//! (вид, ширина индексной записи, подсказка смещения первого подзначения),
//! см. [`super::types`].

use std::fmt;

use xxhash_rust::xxh64::xxh64;

use crate::error::{PackError, PackResult};

use super::types::{ValueKind, FIRST_SUB_TABLE, TYPE_TABLE, WIDTH_TABLE};

/// Seed для хеширования байтового диапазона значения.
pub const HASH_SEED: u64 = 0xdead_beef;

/// Минимальное число записей сортированного объекта, при котором поиск по
/// ключу переключается с линейного на двоичный.
const SORTED_SEARCH_THRESHOLD: usize = 4;

/// Кодировка отсутствующего значения (вид `None`).
static NONE_VALUE: [u8; 1] = [0x00];

/// Обработчик значений вида `Custom`.
///
/// Передаётся явно при конструировании представления; без него запрос
/// размера Custom-значения завершается ошибкой `NeedCustomTypeHandler`.
pub trait CustomTypeHandler {
    /// Полный размер Custom-значения в байтах, включая head-байт.
    fn byte_size(
        &self,
        value: &ValueView<'_>,
    ) -> PackResult<usize>;
}

/// Курсор чтения поверх ранее закодированных байт.
///
/// Лёгкая копируемая структура: срез байт плюс необязательный обработчик
/// Custom-значений. Байтовый срез может быть длиннее самого значения —
/// фактическую границу определяет [`ValueView::byte_size`].
#[derive(Clone, Copy)]
pub struct ValueView<'a> {
    bytes: &'a [u8],
    handler: Option<&'a dyn CustomTypeHandler>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<'a> ValueView<'a> {
    /// Создаёт представление поверх байтового среза.
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        ValueView {
            bytes,
            handler: None,
        }
    }

    /// Создаёт представление с обработчиком Custom-значений.
    #[inline]
    pub fn with_handler(
        bytes: &'a [u8],
        handler: &'a dyn CustomTypeHandler,
    ) -> Self {
        ValueView {
            bytes,
            handler: Some(handler),
        }
    }

    /// Представление отсутствующего значения (вид `None`).
    #[inline]
    pub fn none() -> ValueView<'static> {
        ValueView {
            bytes: &NONE_VALUE,
            handler: None,
        }
    }

    /// Head-байт значения.
    #[inline(always)]
    pub fn head(&self) -> u8 {
        self.bytes[0]
    }

    /// Вид значения по диспетчерской таблице.
    #[inline(always)]
    pub fn kind(&self) -> ValueKind {
        TYPE_TABLE[self.head() as usize]
    }

    /// Сырой байтовый срез, на который смотрит представление.
    ///
    /// Может быть длиннее самого значения; точная граница — `byte_size()`.
    #[inline]
    pub fn start(&self) -> &'a [u8] {
        self.bytes
    }

    /// Байтовый диапазон ровно одного закодированного значения.
    pub fn encoded_bytes(&self) -> PackResult<&'a [u8]> {
        let size = self.byte_size()?;
        Ok(&self.bytes[..size])
    }

    pub fn is_none(&self) -> bool {
        self.kind() == ValueKind::None
    }

    pub fn is_null(&self) -> bool {
        self.kind() == ValueKind::Null
    }

    pub fn is_bool(&self) -> bool {
        self.kind() == ValueKind::Bool
    }

    pub fn is_double(&self) -> bool {
        self.kind() == ValueKind::Double
    }

    pub fn is_utc_date(&self) -> bool {
        self.kind() == ValueKind::UtcDate
    }

    pub fn is_external(&self) -> bool {
        self.kind() == ValueKind::External
    }

    pub fn is_min_key(&self) -> bool {
        self.kind() == ValueKind::MinKey
    }

    pub fn is_max_key(&self) -> bool {
        self.kind() == ValueKind::MaxKey
    }

    pub fn is_int(&self) -> bool {
        self.kind() == ValueKind::Int
    }

    pub fn is_uint(&self) -> bool {
        self.kind() == ValueKind::UInt
    }

    pub fn is_small_int(&self) -> bool {
        self.kind() == ValueKind::SmallInt
    }

    pub fn is_string(&self) -> bool {
        self.kind() == ValueKind::String
    }

    pub fn is_binary(&self) -> bool {
        self.kind() == ValueKind::Binary
    }

    pub fn is_bcd(&self) -> bool {
        self.kind() == ValueKind::Bcd
    }

    pub fn is_array(&self) -> bool {
        self.kind() == ValueKind::Array
    }

    pub fn is_object(&self) -> bool {
        self.kind() == ValueKind::Object
    }

    pub fn is_custom(&self) -> bool {
        self.kind() == ValueKind::Custom
    }

    /// Любой целочисленный вид: Int, UInt или SmallInt.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.kind(),
            ValueKind::Int | ValueKind::UInt | ValueKind::SmallInt
        )
    }

    /// Любой числовой вид, включая Double.
    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_double()
    }

    /// Объект с индексной таблицей, отсортированной по ключам.
    #[inline]
    pub fn is_sorted(&self) -> bool {
        let h = self.head();
        (0x0b..=0x0e).contains(&h)
    }

    /// Полный размер значения в байтах, включая head-байт.
    ///
    /// Чистая функция head-байта и, для переменных видов, нескольких
    /// следующих за ним байт длины; заглядывания вперёд за пределы самого
    /// значения не требуется.
    pub fn byte_size(&self) -> PackResult<usize> {
        let h = self.head();
        match self.kind() {
            ValueKind::None
            | ValueKind::Null
            | ValueKind::Bool
            | ValueKind::MinKey
            | ValueKind::MaxKey
            | ValueKind::SmallInt => Ok(1),

            ValueKind::Double | ValueKind::UtcDate | ValueKind::External => Ok(1 + 8),

            ValueKind::Array | ValueKind::Object => {
                if h == 0x01 || h == 0x0a {
                    return Ok(1);
                }
                let w = WIDTH_TABLE[h as usize] as usize;
                Ok(self.read_uint(1, w) as usize)
            }

            ValueKind::Int => Ok(1 + (h - 0x1f) as usize),

            ValueKind::UInt => Ok(1 + (h - 0x27) as usize),

            ValueKind::String => {
                if h == 0xbf {
                    Ok(1 + 8 + self.read_uint(1, 8) as usize)
                } else {
                    Ok(1 + (h - 0x40) as usize)
                }
            }

            ValueKind::Binary => {
                let lw = (h - 0xbf) as usize;
                Ok(1 + lw + self.read_uint(1, lw) as usize)
            }

            ValueKind::Bcd => {
                let lw = if h <= 0xcf {
                    (h - 0xc7) as usize
                } else {
                    (h - 0xcf) as usize
                };
                Ok(1 + lw + self.read_uint(1, lw) as usize)
            }

            ValueKind::Custom => match self.handler {
                Some(handler) => handler.byte_size(self),
                None => Err(PackError::NeedCustomTypeHandler),
            },
        }
    }

    /// Число элементов массива или пар объекта.
    pub fn length(&self) -> PackResult<usize> {
        if !self.is_array() && !self.is_object() {
            return Err(PackError::InvalidValueType("Array or Object"));
        }
        let h = self.head();
        if h == 0x01 || h == 0x0a {
            return Ok(0);
        }

        let w = WIDTH_TABLE[h as usize] as usize;
        let end = self.read_uint(1, w) as usize;

        if h <= 0x05 {
            // Индексной таблицы и счётчика нет: все элементы одной длины,
            // число восстанавливается делением.
            let data_offset = self.find_data_offset();
            let first = self.subview(data_offset);
            Ok((end - data_offset) / first.byte_size()?)
        } else if w < 8 {
            Ok(self.read_uint(1 + w, w) as usize)
        } else {
            Ok(self.read_uint(end - 8, 8) as usize)
        }
    }

    /// Элемент массива по индексу.
    pub fn at(
        &self,
        index: usize,
    ) -> PackResult<ValueView<'a>> {
        if !self.is_array() {
            return Err(PackError::InvalidValueType("Array"));
        }
        self.get_nth(index)
    }

    /// Ключ пары объекта по индексу.
    pub fn key_at(
        &self,
        index: usize,
    ) -> PackResult<ValueView<'a>> {
        if !self.is_object() {
            return Err(PackError::InvalidValueType("Object"));
        }
        self.get_nth(index)
    }

    /// Значение пары объекта по индексу.
    ///
    /// Значение лежит сразу за своим ключом.
    pub fn value_at(
        &self,
        index: usize,
    ) -> PackResult<ValueView<'a>> {
        let key = self.key_at(index)?;
        let key_size = key.byte_size()?;
        Ok(key.subview(key_size))
    }

    /// Поиск атрибута в объекте по имени.
    ///
    /// Отсутствие ключа — не ошибка: возвращается представление вида
    /// `None`, которое вызывающая сторона проверяет через `is_none()`.
    pub fn get(
        &self,
        attribute: &str,
    ) -> PackResult<ValueView<'a>> {
        if !self.is_object() {
            return Err(PackError::InvalidValueType("Object"));
        }
        let h = self.head();
        if h == 0x0a {
            return Ok(ValueView::none());
        }

        let w = WIDTH_TABLE[h as usize] as usize;
        let end = self.read_uint(1, w) as usize;
        let n = if w < 8 {
            self.read_uint(1 + w, w) as usize
        } else {
            self.read_uint(end - 8, 8) as usize
        };

        if n == 1 {
            // Единственная пара хранится без индексной таблицы; ключ
            // находится сразу за заголовком.
            let key = self.subview(self.find_data_offset());
            if !key.is_string() {
                return Ok(ValueView::none());
            }
            let key_bytes = key.string_slice()?;
            if key_bytes != attribute.as_bytes() {
                return Ok(ValueView::none());
            }
            return Ok(key.subview(key.byte_size()?));
        }

        let ie_base = end - n * w - if w == 8 { 8 } else { 0 };

        if self.is_sorted() && n >= SORTED_SEARCH_THRESHOLD {
            self.search_key_binary(attribute, ie_base, w, n)
        } else {
            self.search_key_linear(attribute, ie_base, w, n)
        }
    }

    /// Поиск по пути атрибутов: `get(["a", "b"])` эквивалентен
    /// `get("a")` и затем `get("b")` на промежуточном объекте.
    pub fn get_path(
        &self,
        attributes: &[&str],
    ) -> PackResult<ValueView<'a>> {
        let n = attributes.len();
        if n == 0 {
            return Err(PackError::InvalidAttributePath);
        }

        let mut last = *self;
        for (i, attribute) in attributes.iter().enumerate() {
            last = last.get(attribute)?;
            // Прерываемся как можно раньше.
            if last.is_none() || (i + 1 < n && !last.is_object()) {
                return Ok(ValueView::none());
            }
        }
        Ok(last)
    }

    /// Проверяет наличие ключа в объекте.
    pub fn has_key(
        &self,
        attribute: &str,
    ) -> PackResult<bool> {
        Ok(!self.get(attribute)?.is_none())
    }

    /// Значение Bool-объекта.
    pub fn get_bool(&self) -> PackResult<bool> {
        if !self.is_bool() {
            return Err(PackError::InvalidValueType("Bool"));
        }
        // 0x19 == false, 0x1a == true
        Ok(self.head() == 0x1a)
    }

    /// Значение Double-объекта: точный битовый паттерн из 8 байт.
    pub fn get_double(&self) -> PackResult<f64> {
        if !self.is_double() {
            return Err(PackError::InvalidValueType("Double"));
        }
        Ok(f64::from_bits(self.read_uint(1, 8)))
    }

    /// Знаковое целое значение.
    ///
    /// Принимает Int, SmallInt и UInt, помещающийся в `i64`; слишком
    /// большой UInt — ошибка `NumberOutOfRange`.
    pub fn get_int(&self) -> PackResult<i64> {
        let h = self.head();

        if (0x20..=0x27).contains(&h) {
            let len = (h - 0x1f) as usize;
            let v = self.read_uint(1, len);
            if len == 8 {
                return Ok(v as i64);
            }
            // Восстановление знака из дополнительного кода неполной ширины.
            let shift = 1i64 << (len * 8 - 1);
            let vv = v as i64;
            return Ok(if vv < shift { vv } else { vv - (shift << 1) });
        }

        if (0x28..=0x2f).contains(&h) {
            let v = self.get_uint()?;
            if v > i64::MAX as u64 {
                return Err(PackError::NumberOutOfRange);
            }
            return Ok(v as i64);
        }

        if (0x30..=0x3f).contains(&h) {
            return self.get_small_int();
        }

        Err(PackError::InvalidValueType("Int"))
    }

    /// Беззнаковое целое значение.
    ///
    /// Принимает UInt, неотрицательные Int и SmallInt; отрицательное
    /// значение — ошибка `NumberOutOfRange`.
    pub fn get_uint(&self) -> PackResult<u64> {
        let h = self.head();

        if (0x28..=0x2f).contains(&h) {
            return Ok(self.read_uint(1, (h - 0x27) as usize));
        }

        if (0x20..=0x27).contains(&h) {
            let v = self.get_int()?;
            if v < 0 {
                return Err(PackError::NumberOutOfRange);
            }
            return Ok(v as u64);
        }

        if (0x30..=0x39).contains(&h) {
            return Ok((h - 0x30) as u64);
        }

        if (0x3a..=0x3f).contains(&h) {
            return Err(PackError::NumberOutOfRange);
        }

        Err(PackError::InvalidValueType("UInt"))
    }

    /// Значение SmallInt; также принимает Int и UInt.
    pub fn get_small_int(&self) -> PackResult<i64> {
        let h = self.head();

        if (0x30..=0x39).contains(&h) {
            return Ok((h - 0x30) as i64);
        }

        if (0x3a..=0x3f).contains(&h) {
            return Ok((h - 0x3a) as i64 - 6);
        }

        if (0x20..=0x2f).contains(&h) {
            return self.get_int();
        }

        Err(PackError::InvalidValueType("SmallInt"))
    }

    /// Значение UTCDate: миллисекунды от эпохи, знаковые.
    pub fn get_utc_date(&self) -> PackResult<i64> {
        if !self.is_utc_date() {
            return Err(PackError::InvalidValueType("UTCDate"));
        }
        Ok(self.read_uint(1, 8) as i64)
    }

    /// Полезная нагрузка External-значения: непрозрачные 8 байт.
    ///
    /// Ядро никогда не разыменовывает это значение; интерпретация — на
    /// вызывающей стороне.
    pub fn get_external(&self) -> PackResult<u64> {
        if !self.is_external() {
            return Err(PackError::InvalidValueType("External"));
        }
        Ok(self.read_uint(1, 8))
    }

    /// Строковое значение как `&str`.
    pub fn get_str(&self) -> PackResult<&'a str> {
        Ok(std::str::from_utf8(self.string_slice()?)?)
    }

    /// Байты строкового значения без проверки UTF-8.
    pub fn get_string_bytes(&self) -> PackResult<&'a [u8]> {
        self.string_slice()
    }

    /// Байты Binary-значения.
    pub fn get_binary(&self) -> PackResult<&'a [u8]> {
        let h = self.head();
        if !self.is_binary() {
            return Err(PackError::InvalidValueType("Binary"));
        }
        let lw = (h - 0xbf) as usize;
        let len = self.read_uint(1, lw) as usize;
        Ok(&self.bytes[1 + lw..1 + lw + len])
    }

    /// Некриптографический хеш байтового диапазона значения.
    ///
    /// Используется для дедупликации, не для защиты.
    pub fn hash(&self) -> PackResult<u64> {
        Ok(xxh64(self.encoded_bytes()?, HASH_SEED))
    }

    /// Побайтовое сравнение двух закодированных значений.
    pub fn binary_eq(
        &self,
        other: &ValueView<'_>,
    ) -> bool {
        if self.head() != other.head() {
            return false;
        }
        match (self.encoded_bytes(), other.encoded_bytes()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    ////////////////////////////////////////////////////////////////////////
    // Внутренняя навигация
    ////////////////////////////////////////////////////////////////////////

    /// Представление подзначения по смещению от начала текущего.
    #[inline]
    pub(crate) fn subview(
        &self,
        offset: usize,
    ) -> ValueView<'a> {
        ValueView {
            bytes: &self.bytes[offset..],
            handler: self.handler,
        }
    }

    /// Смещение первого подзначения непустого составного значения.
    ///
    /// Таблица даёт нижнюю границу; дальше пробуем байты 2, 3 и 5 на
    /// ненулевое значение, чтобы пропустить возможно отсутствующее поле
    /// счётчика и нулевой хвост неуплотнённого заголовка.
    fn find_data_offset(&self) -> usize {
        let hint = FIRST_SUB_TABLE[self.head() as usize] as usize;
        if hint <= 2 && self.bytes[2] != 0 {
            return 2;
        }
        if hint <= 3 && self.bytes[3] != 0 {
            return 3;
        }
        if hint <= 5 && self.bytes[5] != 0 {
            return 5;
        }
        9
    }

    /// `index`-е подзначение массива или объекта (для объекта — ключ).
    fn get_nth(
        &self,
        index: usize,
    ) -> PackResult<ValueView<'a>> {
        let h = self.head();
        if h == 0x01 || h == 0x0a {
            return Err(PackError::IndexOutOfBounds);
        }

        let w = WIDTH_TABLE[h as usize] as usize;
        let end = self.read_uint(1, w) as usize;
        let data_offset = self.find_data_offset();

        let n = if h <= 0x05 {
            let first = self.subview(data_offset);
            (end - data_offset) / first.byte_size()?
        } else if w < 8 {
            self.read_uint(1 + w, w) as usize
        } else {
            self.read_uint(end - 8, 8) as usize
        };

        if index >= n {
            return Err(PackError::IndexOutOfBounds);
        }

        if h <= 0x05 || n == 1 {
            // Без индексной таблицы: все элементы одной длины либо элемент
            // единственный.
            let first = self.subview(data_offset);
            let element_size = first.byte_size()?;
            return Ok(self.subview(data_offset + index * element_size));
        }

        let ie_base = end - n * w + index * w - if w == 8 { 8 } else { 0 };
        let offset = self.read_uint(ie_base, w) as usize;
        Ok(self.subview(offset))
    }

    /// Линейный поиск ключа по индексной таблице.
    ///
    /// Записи с длиной ключа, отличной от искомой, пропускаются без
    /// побайтового сравнения.
    fn search_key_linear(
        &self,
        attribute: &str,
        ie_base: usize,
        w: usize,
        n: usize,
    ) -> PackResult<ValueView<'a>> {
        for index in 0..n {
            let offset = self.read_uint(ie_base + index * w, w) as usize;
            let key = self.subview(offset);
            if !key.is_string() {
                // повреждённый объект
                return Ok(ValueView::none());
            }
            let key_bytes = key.string_slice()?;
            if key_bytes != attribute.as_bytes() {
                continue;
            }
            return Ok(key.subview(key.byte_size()?));
        }

        Ok(ValueView::none())
    }

    /// Двоичный поиск ключа по отсортированной индексной таблице.
    ///
    /// Сравнение побайтовое до меньшей из длин; при равном префиксе
    /// больший ключ — более длинный. Совпадением считается только полное
    /// равенство байт и длины: ключ-префикс искомого (и наоборот) — не
    /// совпадение.
    fn search_key_binary(
        &self,
        attribute: &str,
        ie_base: usize,
        w: usize,
        n: usize,
    ) -> PackResult<ValueView<'a>> {
        let target = attribute.as_bytes();

        let mut l = 0usize;
        let mut r = n - 1;

        loop {
            let index = l + (r - l) / 2;
            let offset = self.read_uint(ie_base + index * w, w) as usize;
            let key = self.subview(offset);
            if !key.is_string() {
                // повреждённый объект
                return Ok(ValueView::none());
            }

            let key_bytes = key.string_slice()?;
            let common = key_bytes.len().min(target.len());
            let cmp = key_bytes[..common].cmp(&target[..common]);

            if cmp == std::cmp::Ordering::Equal && key_bytes.len() == target.len() {
                return Ok(key.subview(key.byte_size()?));
            }

            let probe_greater = cmp == std::cmp::Ordering::Greater
                || (cmp == std::cmp::Ordering::Equal && key_bytes.len() > target.len());

            if probe_greater {
                if index == 0 {
                    return Ok(ValueView::none());
                }
                r = index - 1;
            } else {
                l = index + 1;
            }
            if r < l {
                return Ok(ValueView::none());
            }
        }
    }

    /// Байты строкового значения (короткая или длинная форма).
    fn string_slice(&self) -> PackResult<&'a [u8]> {
        let h = self.head();
        if (0x40..=0xbe).contains(&h) {
            let len = (h - 0x40) as usize;
            return Ok(&self.bytes[1..1 + len]);
        }
        if h == 0xbf {
            let len = self.read_uint(1, 8) as usize;
            return Ok(&self.bytes[1 + 8..1 + 8 + len]);
        }
        Err(PackError::InvalidValueType("String"))
    }

    /// Читает беззнаковое little-endian целое шириной `n` байт по смещению
    /// `offset`.
    #[inline(always)]
    fn read_uint(
        &self,
        offset: usize,
        n: usize,
    ) -> u64 {
        let mut value = 0u64;
        for (i, &byte) in self.bytes[offset..offset + n].iter().enumerate() {
            value |= (byte as u64) << (8 * i);
        }
        value
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для ValueView
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for ValueView<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl PartialEq for ValueView<'_> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.bytes == other.bytes
            && self.handler.is_some() == other.handler.is_some()
    }
}

impl fmt::Display for ValueView<'_> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.byte_size() {
            Ok(size) => write!(
                f,
                "[ValueView {} (0x{:02x}), byteSize: {}]",
                self.kind(),
                self.head(),
                size
            ),
            Err(_) => write!(f, "[ValueView {} (0x{:02x})]", self.kind(), self.head()),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
