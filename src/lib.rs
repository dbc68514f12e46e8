#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod address;
pub mod code;
pub mod convention;
pub mod emit;
pub mod extract;
pub mod signature;
pub mod stub;
