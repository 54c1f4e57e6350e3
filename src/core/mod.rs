//! Configuration, document discovery and the shared error type.

pub mod config;
pub mod document;
pub mod error;
pub mod paths;
