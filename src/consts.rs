//! Named constants shared across the codec.

/// Number of learn-pass sweeps run while growing the context trees.
pub const TREE_LEARN_REPEATS: u32 = 100;

/// Number of deepest zoom levels left out of the "rough" warmup pass.
pub const NB_NOLEARN_ZOOMS: i32 = 2;

/// Effective residual bit budget the codec is hard-wired to support.
pub const RESIDUAL_BIT_BUDGET: u32 = 10;

/// Alphabet used to encode transform/format names: A-Z, 0-9, then `_`.
pub const NAME_ALPHABET: &[u8; 37] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

/// Magic bytes for scanline-order streams.
pub const MAGIC_SCANLINE: &str = "FLI1";
/// Magic bytes for zoom-order streams.
pub const MAGIC_ZOOM: &str = "FLI2";

/// Margin (in estimated bits saved) a context-tree split must clear before `simplify()` commits it.
pub const TREE_SPLIT_MARGIN_BITS: f64 = 2.0;

/// Minimum number of observations at a leaf before a split is even considered.
pub const TREE_MIN_COUNT: u64 = 8;
