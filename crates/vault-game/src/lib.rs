#![allow(dead_code)]
#![allow(clippy::needless_return, clippy::collapsible_if, clippy::collapsible_else_if,
         clippy::float_cmp, clippy::needless_range_loop, clippy::too_many_arguments,
         clippy::type_complexity)]

pub mod fields;
pub mod game_info;
pub mod writer;
pub mod reader;
pub mod entity;
pub mod level;
pub mod global_state;
pub mod blocks;
pub mod entity_block;
pub mod saverestore;

#[cfg(test)]
pub mod test_entities;
