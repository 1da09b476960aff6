// file: src/cli/mod.rs
// version: 1.0.0
// guid: e5f6a7b8-c9d0-1234-5678-901234efabcd

//! Command line interface module

pub mod args;

pub use args::Cli;
