pub mod diff;
pub mod list;
pub mod seed;
pub mod tree;
pub mod validate;
