//! Cursor types shared by the quire crates.
//!
//! This crate is not meant for external consumption.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bit;
pub mod byte;
