//! Модуль `pack` реализует бинарный формат значений.
//!
//! Он включает в себя:
//! - Субмодуль `buffer` — растущий байтовый буфер с inline-оптимизацией,
//!   в котором накапливается результат кодирования.
//! - Субмодуль `types` — виды значений, head-байты и диспетчерские
//!   таблицы формата.
//! - Субмодуль `builder` — пошаговый кодировщик вложенных значений.
//! - Субмодуль `view` — чтение закодированных байт без копирования.
//! - Субмодуль `iterator` — обход массивов и объектов.
//! - Субмодуль `collection` — производные операции (map, filter, merge и
//!   другие).

pub mod buffer;
pub mod builder;
pub mod collection;
pub mod iterator;
pub mod types;
pub mod view;

pub use buffer::PackBuffer;
pub use builder::{Builder, BuilderOptions};
pub use iterator::{ArrayIter, ObjectIter};
pub use types::{PackValue, ValueKind};
pub use view::{CustomTypeHandler, ValueView, HASH_SEED};
