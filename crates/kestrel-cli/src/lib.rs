//! Kestrel checker
//!
//! Library half of the `kestrel-check` binary, split out so the commands can
//! be exercised from integration tests.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod commands;
