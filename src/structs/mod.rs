pub mod bit_chance;
pub mod context_tree;
pub mod predictors;
pub mod range_coder;
pub mod symbol_coder;

pub(crate) mod pass;
