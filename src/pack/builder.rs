//! Кодировщик `Builder` — пошаговая сборка бинарного значения.
//!
//! Результат накапливается в [`PackBuffer`]. Открытие массива или объекта
//! резервирует заголовок-заглушку (head-байт плюс восемь байт под длину) и
//! кладёт стартовую позицию в стек открытых составных значений; параллельно
//! для каждого уровня ведётся список относительных смещений добавленных
//! подзначений. `close()` снимает верхний уровень и переписывает заголовок
//! на месте: сортирует ключи объекта, выбирает минимальную ширину смещений,
//! уплотняет заголовок и дописывает индексную таблицу.
//!
//! Пустой стек означает, что в буфере лежит готовая последовательность
//! запечатанных значений, доступная через `view()`/`sealed_bytes()`.

use std::collections::HashSet;

use crate::error::{PackError, PackResult};

use super::{
    buffer::PackBuffer,
    types::PackValue,
    view::ValueView,
};

/// Заглушки head-байтов открытых составных значений; переписываются при
/// закрытии.
const OPEN_ARRAY: u8 = 0x06;
const OPEN_OBJECT: u8 = 0x0b;

/// Размер заголовка-заглушки: head-байт плюс восемь байт под длину.
const PLACEHOLDER: usize = 9;

/// Настройки кодировщика.
#[derive(Debug, Clone, Copy)]
pub struct BuilderOptions {
    /// Сортировать ли ключи объектов при закрытии. Несортированные объекты
    /// получают собственное семейство head-байтов и ищутся линейно.
    pub sort_keys: bool,
    /// Проверять ли уникальность ключей объекта при закрытии.
    pub check_duplicate_keys: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            sort_keys: true,
            check_duplicate_keys: true,
        }
    }
}

/// Пошаговый кодировщик бинарных значений.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    buf: PackBuffer,
    /// Стартовые позиции открытых массивов/объектов.
    stack: Vec<usize>,
    /// Смещения подзначений для каждого уровня вложенности. Векторы
    /// переживают закрытие уровня, чтобы не аллоцировать заново.
    index: Vec<Vec<usize>>,
    pub options: BuilderOptions,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        Builder {
            options,
            ..Self::default()
        }
    }

    /// `true`, когда ни один массив или объект не открыт и результат готов
    /// к чтению.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.stack.is_empty()
    }

    /// Добавляет значение: на верхний уровень либо элементом открытого
    /// массива.
    ///
    /// Если верхний открытый уровень — объект, значение без ключа
    /// недопустимо (`NeedOpenArray`).
    pub fn add(
        &mut self,
        value: PackValue,
    ) -> PackResult<()> {
        self.report_unkeyed_add()?;
        self.write_value(&value);
        Ok(())
    }

    /// Добавляет пару ключ-значение в открытый объект.
    ///
    /// Ключ записывается строковым значением непосредственно перед
    /// значением; в список смещений уровня попадает смещение ключа.
    pub fn add_keyed(
        &mut self,
        key: &str,
        value: PackValue,
    ) -> PackResult<()> {
        self.report_keyed_add()?;
        self.write_string(key);
        self.write_value(&value);
        Ok(())
    }

    /// Вклеивает готовое закодированное значение элементом открытого
    /// массива или верхнего уровня.
    pub fn add_view(
        &mut self,
        value: &ValueView<'_>,
    ) -> PackResult<()> {
        let bytes = value.encoded_bytes()?;
        self.report_unkeyed_add()?;
        self.buf.append(bytes);
        Ok(())
    }

    /// Вклеивает готовое закодированное значение под ключом открытого
    /// объекта.
    pub fn add_keyed_view(
        &mut self,
        key: &str,
        value: &ValueView<'_>,
    ) -> PackResult<()> {
        let bytes = value.encoded_bytes()?;
        self.report_keyed_add()?;
        self.write_string(key);
        self.buf.append(bytes);
        Ok(())
    }

    /// Открывает массив на верхнем уровне или элементом открытого массива.
    pub fn open_array(&mut self) -> PackResult<()> {
        self.report_unkeyed_add()?;
        self.begin_compound(OPEN_ARRAY);
        Ok(())
    }

    /// Открывает объект на верхнем уровне или элементом открытого массива.
    pub fn open_object(&mut self) -> PackResult<()> {
        self.report_unkeyed_add()?;
        self.begin_compound(OPEN_OBJECT);
        Ok(())
    }

    /// Открывает массив под ключом открытого объекта.
    pub fn open_keyed_array(
        &mut self,
        key: &str,
    ) -> PackResult<()> {
        self.report_keyed_add()?;
        self.write_string(key);
        self.begin_compound(OPEN_ARRAY);
        Ok(())
    }

    /// Открывает объект под ключом открытого объекта.
    pub fn open_keyed_object(
        &mut self,
        key: &str,
    ) -> PackResult<()> {
        self.report_keyed_add()?;
        self.write_string(key);
        self.begin_compound(OPEN_OBJECT);
        Ok(())
    }

    /// Запечатывает внутренний открытый массив или объект, переписывая его
    /// заголовок на месте.
    pub fn close(&mut self) -> PackResult<()> {
        let tos = *self.stack.last().ok_or(PackError::NeedOpenCompound)?;
        let depth = self.stack.len() - 1;
        let is_object = self.buf.as_slice()[tos] == OPEN_OBJECT;
        let n = self.index[depth].len();

        if n == 0 {
            self.buf.as_mut_slice()[tos] = if is_object { 0x0a } else { 0x01 };
            self.buf.truncate(tos + 1);
            self.stack.pop();
            return Ok(());
        }

        let mut offsets = self.index[depth].clone();

        let sorted = is_object && self.options.sort_keys;
        if is_object {
            if sorted && n > 1 {
                let data = self.buf.as_slice();
                offsets.sort_by(|&a, &b| {
                    attr_key_bytes(data, tos + a).cmp(attr_key_bytes(data, tos + b))
                });
            }
            if self.options.check_duplicate_keys && n > 1 {
                self.check_duplicate_keys(tos, &offsets, sorted && n > 1)?;
            }
        }

        // Элементы лежат вплотную, поэтому их размеры — это разности
        // соседних смещений; равенство всех размеров позволяет массиву
        // обойтись без индексной таблицы.
        let content_size = self.buf.len() - tos - PLACEHOLDER;
        let need_table = if is_object {
            true
        } else if n == 1 {
            false
        } else {
            let spacing = offsets[1] - offsets[0];
            let last_size = (self.buf.len() - tos) - offsets[n - 1];
            !(last_size == spacing
                && offsets.windows(2).all(|pair| pair[1] - pair[0] == spacing))
        };
        let entry_count = if is_object && n == 1 {
            0
        } else if need_table {
            n
        } else {
            0
        };
        let has_count = is_object || need_table;

        // Минимальная ширина смещений, при которой итоговая длина
        // представима этой же шириной.
        let mut width = 0usize;
        let mut total = 0usize;
        for w in [1usize, 2, 4, 8] {
            let header = 1 + w + if has_count && w < 8 { w } else { 0 };
            let trailer = entry_count * w + if has_count && w == 8 { 8 } else { 0 };
            let candidate = header + content_size + trailer;
            let max = match w {
                1 => 0xff,
                2 => 0xffff,
                4 => 0xffff_ffff,
                _ => usize::MAX,
            };
            if candidate <= max {
                width = w;
                total = candidate;
                break;
            }
        }
        let header = 1 + width + if has_count && width < 8 { width } else { 0 };

        // Уплотняем заголовок-заглушку до фактического размера.
        let gap = PLACEHOLDER - header;
        if gap > 0 {
            let end = self.buf.len();
            self.buf.copy_within(tos + PLACEHOLDER, end, tos + header);
            self.buf.truncate(end - gap);
            for offset in offsets.iter_mut() {
                *offset -= gap;
            }
        }

        let head = compound_head(is_object, sorted, need_table, width);
        self.buf.as_mut_slice()[tos] = head;
        self.write_uint_at(tos + 1, total as u64, width);
        if has_count && width < 8 {
            self.write_uint_at(tos + 1 + width, n as u64, width);
        }

        for &offset in &offsets[..entry_count] {
            let bytes = (offset as u64).to_le_bytes();
            self.buf.append(&bytes[..width]);
        }
        if has_count && width == 8 {
            self.buf.append(&(n as u64).to_le_bytes());
        }

        debug_assert_eq!(self.buf.len() - tos, total);

        self.stack.pop();
        tracing::trace!(
            head,
            len = n,
            width,
            total,
            "compound value sealed"
        );
        Ok(())
    }

    /// Отменяет последнее добавленное подзначение внутри открытого
    /// составного значения.
    pub fn remove_last(&mut self) -> PackResult<()> {
        let tos = *self.stack.last().ok_or(PackError::NeedOpenCompound)?;
        let depth = self.stack.len() - 1;
        let last = self.index[depth].pop().ok_or(PackError::NeedSubvalue)?;
        self.buf.truncate(tos + last);
        Ok(())
    }

    /// Представление первого запечатанного значения.
    pub fn view(&self) -> PackResult<ValueView<'_>> {
        Ok(ValueView::new(self.sealed_bytes()?))
    }

    /// Байты запечатанного результата (одно значение или их
    /// последовательность).
    pub fn sealed_bytes(&self) -> PackResult<&[u8]> {
        if !self.is_sealed() {
            return Err(PackError::BuilderNotSealed);
        }
        Ok(self.buf.as_slice())
    }

    /// Смещение начала результата; ноль, пока кодировщик не переиспользуют.
    pub fn start(&self) -> PackResult<usize> {
        if !self.is_sealed() {
            return Err(PackError::BuilderNotSealed);
        }
        Ok(0)
    }

    /// Размер запечатанного результата в байтах.
    pub fn size(&self) -> PackResult<usize> {
        Ok(self.sealed_bytes()?.len())
    }

    /// Забирает запечатанный результат, потребляя кодировщик.
    pub fn into_bytes(self) -> PackResult<Vec<u8>> {
        if !self.is_sealed() {
            return Err(PackError::BuilderNotSealed);
        }
        Ok(self.buf.into())
    }

    /// Сбрасывает кодировщик к пустому состоянию, переиспользуя буфер и
    /// списки смещений.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.stack.clear();
    }

    ////////////////////////////////////////////////////////////////////////
    // Внутренняя запись
    ////////////////////////////////////////////////////////////////////////

    /// Фиксирует добавление подзначения без ключа: верхний открытый
    /// уровень обязан быть массивом.
    fn report_unkeyed_add(&mut self) -> PackResult<()> {
        if let Some(&tos) = self.stack.last() {
            if self.buf.as_slice()[tos] != OPEN_ARRAY {
                return Err(PackError::NeedOpenArray);
            }
            let depth = self.stack.len() - 1;
            let offset = self.buf.len() - tos;
            self.index[depth].push(offset);
        }
        Ok(())
    }

    /// Фиксирует добавление пары ключ-значение: верхний открытый уровень
    /// обязан быть объектом.
    fn report_keyed_add(&mut self) -> PackResult<()> {
        match self.stack.last() {
            Some(&tos) if self.buf.as_slice()[tos] == OPEN_OBJECT => {
                let depth = self.stack.len() - 1;
                let offset = self.buf.len() - tos;
                self.index[depth].push(offset);
                Ok(())
            }
            _ => Err(PackError::NeedOpenObject),
        }
    }

    /// Пишет заголовок-заглушку составного значения и заводит новый
    /// уровень.
    fn begin_compound(
        &mut self,
        head: u8,
    ) {
        self.stack.push(self.buf.len());
        while self.stack.len() > self.index.len() {
            self.index.push(Vec::new());
        }
        self.index[self.stack.len() - 1].clear();
        self.buf.push(head);
        self.buf.append_zeros(PLACEHOLDER - 1);
    }

    fn write_value(
        &mut self,
        value: &PackValue,
    ) {
        match value {
            PackValue::Null => self.buf.push(0x18),
            PackValue::Bool(false) => self.buf.push(0x19),
            PackValue::Bool(true) => self.buf.push(0x1a),
            PackValue::Int(v) => self.write_int(*v),
            PackValue::UInt(v) => self.write_uint(*v),
            PackValue::Double(v) => {
                self.buf.push(0x1b);
                self.buf.append(&v.to_bits().to_le_bytes());
            }
            PackValue::UtcDate(v) => {
                self.buf.push(0x1c);
                self.buf.append(&(*v as u64).to_le_bytes());
            }
            PackValue::Str(s) => self.write_string(s),
            PackValue::Binary(b) => self.write_binary(b),
            PackValue::External(p) => {
                self.buf.push(0x1d);
                self.buf.append(&p.to_le_bytes());
            }
            PackValue::MinKey => self.buf.push(0x1e),
            PackValue::MaxKey => self.buf.push(0x1f),
        }
    }

    /// Знаковое целое: значения `[-6, 9]` целиком в head-байте, остальные —
    /// минимальным числом байт дополнительного кода.
    fn write_int(
        &mut self,
        v: i64,
    ) {
        if (0..=9).contains(&v) {
            self.buf.push(0x30 + v as u8);
        } else if (-6..=-1).contains(&v) {
            self.buf.push((0x40 + v) as u8);
        } else {
            self.append_int(v, 0x1f);
        }
    }

    /// Беззнаковое целое: маленькие значения в head-байте, остальные —
    /// минимальным числом байт со своим диапазоном head-байтов.
    fn write_uint(
        &mut self,
        v: u64,
    ) {
        if v <= 9 {
            self.buf.push(0x30 + v as u8);
        } else {
            self.append_uint(v, 0x27);
        }
    }

    /// Число байт дополнительного кода, необходимое знаковому значению.
    fn int_length(v: i64) -> usize {
        if (-0x80..=0x7f).contains(&v) {
            // быстрый путь для типичного диапазона
            return 1;
        }
        let mut x = if v >= 0 { v as u64 } else { (-(v + 1)) as u64 };
        let mut size = 0usize;
        loop {
            size += 1;
            x >>= 8;
            if x < 0x80 {
                break;
            }
        }
        size + 1
    }

    fn append_int(
        &mut self,
        v: i64,
        base: u8,
    ) {
        let size = Self::int_length(v);
        let x: u64 = if size == 8 {
            v as u64
        } else {
            let shift = 1i64 << (size * 8 - 1);
            if v >= 0 {
                v as u64
            } else {
                ((v + shift) + shift) as u64
            }
        };
        self.buf.push(base + size as u8);
        self.buf.append(&x.to_le_bytes()[..size]);
    }

    fn append_uint(
        &mut self,
        v: u64,
        base: u8,
    ) {
        let bytes = v.to_le_bytes();
        let size = (8 - v.leading_zeros() as usize / 8).max(1);
        self.buf.push(base + size as u8);
        self.buf.append(&bytes[..size]);
    }

    /// Строка: до 126 байт длина кодируется в head-байте, длиннее — с
    /// явным восьмибайтовым полем длины.
    fn write_string(
        &mut self,
        s: &str,
    ) {
        let bytes = s.as_bytes();
        if bytes.len() > 126 {
            self.buf.push(0xbf);
            self.buf.append(&(bytes.len() as u64).to_le_bytes());
        } else {
            self.buf.push(0x40 + bytes.len() as u8);
        }
        self.buf.append(bytes);
    }

    fn write_binary(
        &mut self,
        bytes: &[u8],
    ) {
        let len = bytes.len() as u64;
        let width: usize = if len <= 0xff {
            1
        } else if len <= 0xffff {
            2
        } else if len <= 0xffff_ffff {
            4
        } else {
            8
        };
        self.buf.push(0xbf + width as u8);
        self.buf.append(&len.to_le_bytes()[..width]);
        self.buf.append(bytes);
    }

    fn write_uint_at(
        &mut self,
        pos: usize,
        value: u64,
        width: usize,
    ) {
        let slice = self.buf.as_mut_slice();
        for (i, slot) in slice[pos..pos + width].iter_mut().enumerate() {
            *slot = ((value >> (8 * i)) & 0xff) as u8;
        }
    }

    /// Проверка уникальности ключей закрываемого объекта.
    ///
    /// После сортировки дубликаты соседствуют; для несортированного
    /// объекта используется множество.
    fn check_duplicate_keys(
        &self,
        tos: usize,
        offsets: &[usize],
        sorted: bool,
    ) -> PackResult<()> {
        let data = self.buf.as_slice();
        if sorted {
            for pair in offsets.windows(2) {
                let a = attr_key_bytes(data, tos + pair[0]);
                let b = attr_key_bytes(data, tos + pair[1]);
                if a == b {
                    return Err(PackError::DuplicateAttributeName(
                        String::from_utf8_lossy(a).into_owned(),
                    ));
                }
            }
        } else {
            let mut seen = HashSet::with_capacity(offsets.len());
            for &offset in offsets {
                let key = attr_key_bytes(data, tos + offset);
                if !seen.insert(key) {
                    return Err(PackError::DuplicateAttributeName(
                        String::from_utf8_lossy(key).into_owned(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Head-байт запечатанного составного значения.
fn compound_head(
    is_object: bool,
    sorted: bool,
    need_table: bool,
    width: usize,
) -> u8 {
    let wlog = match width {
        1 => 0u8,
        2 => 1,
        4 => 2,
        _ => 3,
    };
    if is_object {
        if sorted {
            0x0b + wlog
        } else {
            0x0f + wlog
        }
    } else if need_table {
        0x06 + wlog
    } else {
        0x02 + wlog
    }
}

/// Байты имени атрибута по стартовой позиции его строкового значения.
fn attr_key_bytes(
    data: &[u8],
    start: usize,
) -> &[u8] {
    let h = data[start];
    if (0x40..=0xbe).contains(&h) {
        let len = (h - 0x40) as usize;
        &data[start + 1..start + 1 + len]
    } else if h == 0xbf {
        let mut len = 0usize;
        for i in 0..8 {
            len |= (data[start + 1 + i] as usize) << (8 * i);
        }
        &data[start + 9..start + 9 + len]
    } else {
        // ключ не является строкой: сравнивать нечего
        &data[start..start]
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(b: &Builder) -> &[u8] {
        b.sealed_bytes().expect("builder must be sealed")
    }

    #[test]
    fn test_scalar_encodings() {
        let cases: &[(PackValue, &[u8])] = &[
            (PackValue::Null, &[0x18]),
            (PackValue::Bool(false), &[0x19]),
            (PackValue::Bool(true), &[0x1a]),
            (PackValue::Int(0), &[0x30]),
            (PackValue::Int(9), &[0x39]),
            (PackValue::Int(-1), &[0x3f]),
            (PackValue::Int(-6), &[0x3a]),
            (PackValue::Int(10), &[0x20, 0x0a]),
            (PackValue::Int(-7), &[0x20, 0xf9]),
            (PackValue::Int(-300), &[0x21, 0xd4, 0xfe]),
            (PackValue::UInt(7), &[0x37]),
            (PackValue::UInt(0x1234), &[0x29, 0x34, 0x12]),
            (PackValue::MinKey, &[0x1e]),
            (PackValue::MaxKey, &[0x1f]),
        ];
        for (value, expected) in cases {
            let mut b = Builder::new();
            b.add(value.clone()).unwrap();
            assert_eq!(&sealed(&b), expected, "encoding of {value:?}");
        }
    }

    #[test]
    fn test_double_encoding() {
        let mut b = Builder::new();
        b.add(PackValue::Double(1.5)).unwrap();
        let bytes = sealed(&b);
        assert_eq!(bytes[0], 0x1b);
        assert_eq!(bytes.len(), 9);
        assert_eq!(&bytes[1..], &1.5f64.to_bits().to_le_bytes());
    }

    #[test]
    fn test_short_and_long_strings() {
        let mut b = Builder::new();
        b.add(PackValue::from("ab")).unwrap();
        assert_eq!(sealed(&b), &[0x42, b'a', b'b']);

        let long = "x".repeat(127);
        let mut b = Builder::new();
        b.add(PackValue::from(long.as_str())).unwrap();
        let bytes = sealed(&b);
        assert_eq!(bytes[0], 0xbf);
        assert_eq!(bytes.len(), 1 + 8 + 127);
        assert_eq!(&bytes[1..9], &127u64.to_le_bytes());
    }

    #[test]
    fn test_string_at_126_boundary_stays_short() {
        let s = "y".repeat(126);
        let mut b = Builder::new();
        b.add(PackValue::from(s.as_str())).unwrap();
        let bytes = sealed(&b);
        assert_eq!(bytes[0], 0xbe);
        assert_eq!(bytes.len(), 127);
    }

    #[test]
    fn test_binary_minimal_length_width() {
        let mut b = Builder::new();
        b.add(PackValue::Binary(vec![1, 2, 3])).unwrap();
        assert_eq!(sealed(&b), &[0xc0, 0x03, 1, 2, 3]);

        let big = vec![0u8; 300];
        let mut b = Builder::new();
        b.add(PackValue::Binary(big)).unwrap();
        let bytes = sealed(&b);
        assert_eq!(bytes[0], 0xc1);
        assert_eq!(&bytes[1..3], &300u16.to_le_bytes());
    }

    /// Массив `[1, "ab", true]`: элементы разной длины, значит нужна
    /// индексная таблица с записями, указывающими на 0x31, 0x42 'a' 'b' и
    /// 0x1a.
    #[test]
    fn test_mixed_array_layout() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        b.add(PackValue::Int(1)).unwrap();
        b.add(PackValue::from("ab")).unwrap();
        b.add(PackValue::Bool(true)).unwrap();
        b.close().unwrap();

        let bytes = sealed(&b);
        assert_eq!(
            bytes,
            &[
                0x06, // массив с 1-байтовой индексной таблицей
                11,   // полная длина
                3,    // число элементов
                0x31, // 1
                0x42, b'a', b'b', // "ab"
                0x1a, // true
                3, 4, 7, // смещения элементов от head-байта
            ]
        );
    }

    #[test]
    fn test_uniform_array_has_no_index_table() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        for v in 1..=4 {
            b.add(PackValue::Int(v)).unwrap();
        }
        b.close().unwrap();

        let bytes = sealed(&b);
        // [head 0x02][len][0x31 0x32 0x33 0x34]
        assert_eq!(bytes, &[0x02, 6, 0x31, 0x32, 0x33, 0x34]);
    }

    #[test]
    fn test_empty_array_and_object() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        b.close().unwrap();
        assert_eq!(sealed(&b), &[0x01]);

        let mut b = Builder::new();
        b.open_object().unwrap();
        b.close().unwrap();
        assert_eq!(sealed(&b), &[0x0a]);
    }

    #[test]
    fn test_single_pair_object_has_count_but_no_table() {
        let mut b = Builder::new();
        b.open_object().unwrap();
        b.add_keyed("a", PackValue::Int(1)).unwrap();
        b.close().unwrap();

        let bytes = sealed(&b);
        assert_eq!(
            bytes,
            &[
                0x0b, // сортированный объект, ширина 1
                6,    // полная длина
                1,    // число пар
                0x41, b'a', // ключ "a"
                0x31, // значение 1
            ]
        );
    }

    #[test]
    fn test_object_keys_are_sorted_on_close() {
        let mut b = Builder::new();
        b.open_object().unwrap();
        b.add_keyed("b", PackValue::Int(2)).unwrap();
        b.add_keyed("a", PackValue::Int(1)).unwrap();
        b.close().unwrap();

        let view = b.view().unwrap();
        assert!(view.is_sorted());
        assert_eq!(view.key_at(0).unwrap().get_str().unwrap(), "a");
        assert_eq!(view.key_at(1).unwrap().get_str().unwrap(), "b");
        assert_eq!(view.value_at(0).unwrap().get_int().unwrap(), 1);
        assert_eq!(view.value_at(1).unwrap().get_int().unwrap(), 2);
    }

    #[test]
    fn test_unsorted_object_emission() {
        let mut b = Builder::with_options(BuilderOptions {
            sort_keys: false,
            ..Default::default()
        });
        b.open_object().unwrap();
        b.add_keyed("b", PackValue::Int(2)).unwrap();
        b.add_keyed("a", PackValue::Int(1)).unwrap();
        b.close().unwrap();

        let view = b.view().unwrap();
        assert!(!view.is_sorted());
        assert_eq!(view.head(), 0x0f);
        // порядок вставки сохранён
        assert_eq!(view.key_at(0).unwrap().get_str().unwrap(), "b");
        assert_eq!(view.get("a").unwrap().get_int().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut b = Builder::new();
        b.open_object().unwrap();
        b.add_keyed("x", PackValue::Int(1)).unwrap();
        b.add_keyed("x", PackValue::Int(2)).unwrap();
        assert_eq!(
            b.close(),
            Err(PackError::DuplicateAttributeName("x".into()))
        );
    }

    #[test]
    fn test_duplicate_keys_rejected_unsorted() {
        let mut b = Builder::with_options(BuilderOptions {
            sort_keys: false,
            ..Default::default()
        });
        b.open_object().unwrap();
        b.add_keyed("x", PackValue::Int(1)).unwrap();
        b.add_keyed("x", PackValue::Int(2)).unwrap();
        assert!(matches!(
            b.close(),
            Err(PackError::DuplicateAttributeName(_))
        ));
    }

    #[test]
    fn test_bare_value_into_object_is_error() {
        let mut b = Builder::new();
        b.open_object().unwrap();
        assert_eq!(b.add(PackValue::Int(1)), Err(PackError::NeedOpenArray));
    }

    #[test]
    fn test_keyed_value_needs_object() {
        let mut b = Builder::new();
        assert_eq!(
            b.add_keyed("k", PackValue::Int(1)),
            Err(PackError::NeedOpenObject)
        );
        b.open_array().unwrap();
        assert_eq!(
            b.add_keyed("k", PackValue::Int(1)),
            Err(PackError::NeedOpenObject)
        );
    }

    #[test]
    fn test_reads_require_sealed_builder() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        assert_eq!(b.sealed_bytes().unwrap_err(), PackError::BuilderNotSealed);
        assert_eq!(b.view().unwrap_err(), PackError::BuilderNotSealed);
        assert_eq!(b.size().unwrap_err(), PackError::BuilderNotSealed);
        assert_eq!(b.start().unwrap_err(), PackError::BuilderNotSealed);
        b.close().unwrap();
        assert!(b.view().is_ok());
    }

    #[test]
    fn test_close_without_open_compound() {
        let mut b = Builder::new();
        assert_eq!(b.close(), Err(PackError::NeedOpenCompound));
    }

    #[test]
    fn test_remove_last() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        b.add(PackValue::Int(1)).unwrap();
        b.add(PackValue::from("oops")).unwrap();
        b.remove_last().unwrap();
        b.add(PackValue::Int(2)).unwrap();
        b.close().unwrap();

        let view = b.view().unwrap();
        assert_eq!(view.length().unwrap(), 2);
        assert_eq!(view.at(1).unwrap().get_int().unwrap(), 2);
    }

    #[test]
    fn test_remove_last_errors() {
        let mut b = Builder::new();
        assert_eq!(b.remove_last(), Err(PackError::NeedOpenCompound));
        b.open_array().unwrap();
        assert_eq!(b.remove_last(), Err(PackError::NeedSubvalue));
    }

    #[test]
    fn test_nested_compounds() {
        let mut b = Builder::new();
        b.open_object().unwrap();
        b.open_keyed_array("items").unwrap();
        b.add(PackValue::Int(1)).unwrap();
        b.add(PackValue::from("two")).unwrap();
        b.close().unwrap();
        b.open_keyed_object("meta").unwrap();
        b.add_keyed("count", PackValue::Int(2)).unwrap();
        b.close().unwrap();
        b.close().unwrap();

        let view = b.view().unwrap();
        assert_eq!(view.length().unwrap(), 2);
        let items = view.get("items").unwrap();
        assert!(items.is_array());
        assert_eq!(items.length().unwrap(), 2);
        assert_eq!(items.at(1).unwrap().get_str().unwrap(), "two");
        let meta = view.get("meta").unwrap();
        assert_eq!(meta.get("count").unwrap().get_int().unwrap(), 2);
    }

    #[test]
    fn test_two_byte_width_selection() {
        // Содержимое больше 255 байт вынуждает 2-байтовые смещения.
        let mut b = Builder::new();
        b.open_array().unwrap();
        b.add(PackValue::Str("z".repeat(300))).unwrap();
        b.add(PackValue::Int(1)).unwrap();
        b.close().unwrap();

        let view = b.view().unwrap();
        assert_eq!(view.head(), 0x07);
        assert_eq!(view.length().unwrap(), 2);
        assert_eq!(view.at(1).unwrap().get_int().unwrap(), 1);
    }

    #[test]
    fn test_sequence_of_top_level_values() {
        let mut b = Builder::new();
        b.add(PackValue::Int(1)).unwrap();
        b.add(PackValue::from("ab")).unwrap();
        let bytes = sealed(&b);
        assert_eq!(bytes, &[0x31, 0x42, b'a', b'b']);
        // view() отдаёт первое значение
        assert_eq!(b.view().unwrap().get_int().unwrap(), 1);
    }

    #[test]
    fn test_clear_reuses_builder() {
        let mut b = Builder::new();
        b.open_array().unwrap();
        b.add(PackValue::Int(1)).unwrap();
        b.clear();
        assert!(b.is_sealed());
        b.add(PackValue::Int(5)).unwrap();
        assert_eq!(sealed(&b), &[0x35]);
    }

    #[test]
    fn test_add_view_splices_encoded_value() {
        let mut inner = Builder::new();
        inner.open_array().unwrap();
        inner.add(PackValue::Int(1)).unwrap();
        inner.add(PackValue::from("ab")).unwrap();
        inner.close().unwrap();

        let mut outer = Builder::new();
        outer.open_object().unwrap();
        outer
            .add_keyed_view("payload", &inner.view().unwrap())
            .unwrap();
        outer.close().unwrap();

        let view = outer.view().unwrap();
        let payload = view.get("payload").unwrap();
        assert!(payload.is_array());
        assert_eq!(payload.at(1).unwrap().get_str().unwrap(), "ab");
    }

    #[test]
    fn test_int_length() {
        assert_eq!(Builder::int_length(0), 1);
        assert_eq!(Builder::int_length(127), 1);
        assert_eq!(Builder::int_length(-128), 1);
        assert_eq!(Builder::int_length(128), 2);
        assert_eq!(Builder::int_length(-129), 2);
        assert_eq!(Builder::int_length(32767), 2);
        assert_eq!(Builder::int_length(32768), 3);
        assert_eq!(Builder::int_length(i64::MAX), 8);
        assert_eq!(Builder::int_length(i64::MIN), 8);
    }

    #[test]
    fn test_int_roundtrip_widths() {
        for &v in &[
            10i64,
            -7,
            127,
            -128,
            128,
            -129,
            32767,
            -32768,
            1 << 23,
            -(1 << 23) - 1,
            1 << 47,
            i64::MAX,
            i64::MIN,
        ] {
            let mut b = Builder::new();
            b.add(PackValue::Int(v)).unwrap();
            let view = b.view().unwrap();
            assert_eq!(view.get_int().unwrap(), v, "roundtrip of {v}");
        }
    }
}
