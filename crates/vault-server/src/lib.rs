#![allow(dead_code)]
#![allow(clippy::needless_return, clippy::collapsible_if, clippy::collapsible_else_if,
         clippy::float_cmp)]

pub mod sv_save;
