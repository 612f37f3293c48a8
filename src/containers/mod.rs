pub mod densemap;
pub mod map_ref;

pub use densemap::{DenseIntMap, Slot};
pub use map_ref::DenseIntMapRef;
