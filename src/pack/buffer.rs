//! Байтовый буфер `PackBuffer` — хранилище результата кодирования.
//!
//! Короткие значения размещаются в стековом (inline) буфере без обращения к
//! куче; при переполнении буфер переключается на heap-представление с
//! геометрическим ростом ёмкости. Операции чтения и записи одинаковы для
//! обоих представлений.

/// Представление буфера: в стеке (короткое содержимое) или в куче.
#[derive(Debug, Clone)]
enum Repr {
    Inline {
        len: u16,
        buf: [u8; PackBuffer::INLINE_CAP],
    },
    Heap {
        buf: Vec<u8>,
    },
}

/// Растущий непрерывный байтовый контейнер с inline-оптимизацией.
///
/// Ёмкость растёт геометрически (фактор 1.25), так что добавление `N` байт
/// по одному выполняет `O(log N)` реаллокаций и копирует `O(N)` байт всего.
/// Любая операция, способная увеличить буфер, делает недействительными
/// ранее полученные срезы — это обеспечивается заимствованием.
#[derive(Debug, Clone)]
pub struct PackBuffer(Repr);

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PackBuffer {
    /// Ёмкость inline-представления в байтах.
    pub const INLINE_CAP: usize = 192;

    /// Фактор геометрического роста heap-представления (25%).
    const GROWTH_NUM: usize = 5;
    const GROWTH_DEN: usize = 4;

    /// Создаёт новый пустой буфер в inline-представлении.
    #[inline]
    pub fn new() -> Self {
        PackBuffer(Repr::Inline {
            len: 0,
            buf: [0u8; Self::INLINE_CAP],
        })
    }

    /// Создаёт буфер с заранее зарезервированной ёмкостью.
    pub fn with_capacity(cap: usize) -> Self {
        let mut b = Self::new();
        if cap > Self::INLINE_CAP {
            b.reserve(cap);
        }
        b
    }

    /// Возвращает текущее содержимое как срез байт.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        match &self.0 {
            Repr::Inline { len, buf } => &buf[..*len as usize],
            Repr::Heap { buf } => buf.as_slice(),
        }
    }

    /// Возвращает изменяемый срез текущего содержимого.
    ///
    /// Безопасно изменять только диапазон `[0, len())`; длина при этом не
    /// меняется.
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.0 {
            Repr::Inline { len, buf } => &mut buf[..*len as usize],
            Repr::Heap { buf } => buf.as_mut_slice(),
        }
    }

    /// Возвращает текущую длину содержимого в байтах.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.0 {
            Repr::Inline { len, .. } => *len as usize,
            Repr::Heap { buf } => buf.len(),
        }
    }

    /// Возвращает `true`, если буфер пуст.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Возвращает текущую ёмкость буфера.
    #[inline]
    pub fn capacity(&self) -> usize {
        match &self.0 {
            Repr::Inline { .. } => Self::INLINE_CAP,
            Repr::Heap { buf } => buf.capacity(),
        }
    }

    /// Возвращает `true`, если содержимое хранится в inline-буфере.
    #[inline]
    pub fn is_inline(&self) -> bool {
        matches!(self.0, Repr::Inline { .. })
    }

    /// Резервирует место под как минимум `additional` дополнительных байт,
    /// при необходимости переключаясь на heap-представление.
    pub fn reserve(
        &mut self,
        additional: usize,
    ) {
        let required = self.len() + additional;
        if required <= self.capacity() {
            return;
        }
        self.grow_to(required);
    }

    /// Добавляет один байт в конец буфера.
    #[inline(always)]
    pub fn push(
        &mut self,
        byte: u8,
    ) {
        if self.len() == self.capacity() {
            let need = self.len() + 1;
            self.grow_to(need);
        }
        match &mut self.0 {
            Repr::Inline { len, buf } => {
                buf[*len as usize] = byte;
                *len += 1;
            }
            Repr::Heap { buf } => buf.push(byte),
        }
    }

    /// Добавляет байтовую последовательность в конец буфера.
    #[inline(always)]
    pub fn append(
        &mut self,
        other: &[u8],
    ) {
        let total = self.len() + other.len();
        if total > self.capacity() {
            self.grow_to(total);
        }
        match &mut self.0 {
            Repr::Inline { len, buf } => {
                let cur = *len as usize;
                buf[cur..total].copy_from_slice(other);
                *len = total as u16;
            }
            Repr::Heap { buf } => buf.extend_from_slice(other),
        }
    }

    /// Добавляет `n` нулевых байт в конец буфера.
    pub fn append_zeros(
        &mut self,
        n: usize,
    ) {
        let total = self.len() + n;
        if total > self.capacity() {
            self.grow_to(total);
        }
        match &mut self.0 {
            Repr::Inline { len, buf } => {
                let cur = *len as usize;
                buf[cur..total].fill(0);
                *len = total as u16;
            }
            Repr::Heap { buf } => buf.resize(total, 0),
        }
    }

    /// Обрезает содержимое до `new_len` байт; ёмкость не меняется.
    pub fn truncate(
        &mut self,
        new_len: usize,
    ) {
        match &mut self.0 {
            Repr::Inline { len, .. } => {
                if new_len < *len as usize {
                    *len = new_len as u16;
                }
            }
            Repr::Heap { buf } => {
                if new_len < buf.len() {
                    buf.truncate(new_len);
                }
            }
        }
    }

    /// Сдвигает байты диапазона `[src_start, src_end)` на позицию `dest`
    /// внутри текущего содержимого.
    ///
    /// Используется при уплотнении заголовка составного значения.
    #[inline]
    pub fn copy_within(
        &mut self,
        src_start: usize,
        src_end: usize,
        dest: usize,
    ) {
        self.as_mut_slice().copy_within(src_start..src_end, dest);
    }

    /// Очищает содержимое, сохраняя выделенную ёмкость.
    pub fn clear(&mut self) {
        match &mut self.0 {
            Repr::Inline { len, .. } => *len = 0,
            Repr::Heap { buf } => buf.clear(),
        }
    }

    /// Полный сброс: освобождает heap-аллокацию и возвращает буфер в
    /// inline-представление.
    ///
    /// В debug-сборке inline-буфер затирается паттерном `0xa5`, чтобы
    /// чтение устаревшего содержимого было заметно сразу.
    pub fn reset(&mut self) {
        #[cfg(debug_assertions)]
        let poisoned = [0xa5u8; Self::INLINE_CAP];
        #[cfg(not(debug_assertions))]
        let poisoned = [0u8; Self::INLINE_CAP];

        self.0 = Repr::Inline {
            len: 0,
            buf: poisoned,
        };
    }

    /// Переносит содержимое в heap-представление с ёмкостью не меньше
    /// `required`, с учётом геометрического роста.
    fn grow_to(
        &mut self,
        required: usize,
    ) {
        let grown = self
            .capacity()
            .saturating_mul(Self::GROWTH_NUM)
            / Self::GROWTH_DEN;
        let new_cap = required.max(grown).max(Self::INLINE_CAP);

        match &mut self.0 {
            Repr::Inline { len, buf } => {
                tracing::trace!(new_cap, "pack buffer promoted to heap");
                let mut vec = Vec::with_capacity(new_cap);
                vec.extend_from_slice(&buf[..*len as usize]);
                self.0 = Repr::Heap { buf: vec };
            }
            Repr::Heap { buf } => {
                buf.reserve_exact(new_cap - buf.len());
            }
        }
    }

    /// Проверяет внутренние инварианты структуры.
    #[cfg(debug_assertions)]
    pub fn debug_assert_invariants(&self) {
        match &self.0 {
            Repr::Inline { len, buf } => {
                assert!(
                    (*len as usize) <= Self::INLINE_CAP,
                    "PackBuffer invariant violation: Inline len ({}) > INLINE_CAP ({})",
                    len,
                    Self::INLINE_CAP
                );
                let _ = &buf[..*len as usize];
            }
            Repr::Heap { buf } => {
                assert!(
                    buf.len() <= buf.capacity(),
                    "PackBuffer invariant violation: Heap buf.len() ({}) > buf.capacity() ({})",
                    buf.len(),
                    buf.capacity()
                );
            }
        }
    }

    /// No-op в release-сборке.
    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn debug_assert_invariants(&self) {}
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для PackBuffer
////////////////////////////////////////////////////////////////////////////////

impl Default for PackBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<PackBuffer> for Vec<u8> {
    fn from(b: PackBuffer) -> Self {
        match b.0 {
            Repr::Inline { len, buf } => buf[..len as usize].to_vec(),
            Repr::Heap { buf } => buf,
        }
    }
}

impl AsRef<[u8]> for PackBuffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
