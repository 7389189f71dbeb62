/// Common error types: encoding preconditions, navigation, conversions.
pub mod error;
/// Binary value format: buffer, builder, views, iterators, collection ops.
pub mod pack;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Operation errors and result type.
pub use error::{PackError, PackResult};
/// Core format types: buffer, builder, views, iterators, collection module.
pub use pack::{
    collection, ArrayIter, Builder, BuilderOptions, CustomTypeHandler, ObjectIter, PackBuffer,
    PackValue, ValueKind, ValueView, HASH_SEED,
};
