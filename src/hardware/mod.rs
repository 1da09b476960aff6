// file: src/hardware/mod.rs
// version: 1.0.0
// guid: e2f3a4b5-c6d7-8901-2345-678901efabcd

//! Hardware model enumeration and capability predicates

pub mod models;

pub use models::{HwModel, ModelCategory};
