//! Error taxonomy: format errors and capacity errors are fatal;
//! truncation and checksum mismatches are reported but do not fail decode.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unrecognized magic bytes {0:?}")]
    UnknownMagic(String),

    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    #[error("transform '{0}' failed to initialize against the current ranges")]
    TransformInitFailed(String),

    #[error("invalid geometry: {what} = {value} is outside the admitted range")]
    InvalidGeometry { what: &'static str, value: i64 },

    #[error("residual bit budget exceeded: {needed} bits > {budget} bit budget")]
    CapacityExceeded { needed: u32, budget: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = anyhow::Result<T>;

/// Non-fatal outcome of a decode: truncation and checksum mismatch are
/// reported to the caller, but the (partially reconstructed) image is still
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeReport {
    /// True if the main data loop hit EOF (zoom mode) or a caller-supplied
    /// `last_step` before the whole pyramid/plane set was decoded.
    pub truncated: bool,
    /// `None` if the checksum was not checked (truncated decode); otherwise
    /// whether the recomputed checksum matched the stored one.
    pub checksum_ok: Option<bool>,
}
