pub mod pack;

pub use pack::{PackError, PackResult};
