#![doc = include_str!("../README.md")]
//!

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod constants;
pub mod encoding;
pub mod permissions;
pub mod signature;
pub mod token;
