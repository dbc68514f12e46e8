//! # Code
//!
//! Architecture specific instruction models used to build stubs

pub mod x86;
