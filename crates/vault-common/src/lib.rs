#![allow(dead_code)]
#![allow(clippy::needless_return, clippy::collapsible_if, clippy::collapsible_else_if,
         clippy::float_cmp, clippy::needless_range_loop, clippy::manual_range_contains,
         clippy::field_reassign_with_default)]

pub mod types;
pub mod console;
pub mod error;
pub mod segment;
pub mod compression;
pub mod assets;
