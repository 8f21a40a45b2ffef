// src/io/mod.rs
pub mod neighbor_list;

pub use neighbor_list::{load, read, save, write};
