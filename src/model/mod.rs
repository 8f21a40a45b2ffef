//src/model/mod.rs
pub mod property;
pub mod simbox;
pub mod structure;
pub mod system;

// Re-exports for cleaner imports
pub use property::{DType, PropertyInfo, PropertyTable, Value};
pub use simbox::SimBox;
pub use structure::{Atom, AtomRecord};
pub use system::System;
