//! Lossless multi-plane image codec: range coding, adaptive bit-chance
//! models, property-tree-routed symbol coders, median predictors, and a
//! scanline/zoom pass orchestrator, behind a small encode/decode API.

pub mod consts;
pub mod error;
pub mod image;
pub mod metrics;
pub mod pnm;
pub mod structs;
pub mod transform;

pub use error::{CodecError, DecodeReport};
pub use image::{ColorRanges, ColorVal, Image, Plane, StaticColorRanges};
pub use structs::pass::Mode;
pub use transform::{BoundsTransform, Transform};

use std::io::{Read, Write};

/// Encoder configuration: scanline or zoom pixel ordering, plus the
/// transform chain run before pixels hit the pass orchestrator.
pub struct EncodeOptions {
    pub mode: Mode,
    pub transforms: Vec<Box<dyn Transform>>,
}

impl Default for EncodeOptions {
    /// Zoom ordering with the one transform this crate ships
    /// ([`BoundsTransform`]), matching `flic_util`'s default chain.
    fn default() -> Self {
        EncodeOptions { mode: Mode::Zoom, transforms: vec![Box::new(BoundsTransform::new())] }
    }
}

/// Encodes `image` (whose per-plane bounds are given by `ranges`) to `out`.
pub fn encode<W: Write>(image: &Image, ranges: &dyn ColorRanges, opts: EncodeOptions, out: W) -> error::Result<()> {
    structs::pass::encode(image, ranges, structs::pass::EncodeOptions { mode: opts.mode, transforms: opts.transforms }, out)
}

/// Decodes a full stream from `input`.
pub fn decode<R: Read>(input: R) -> error::Result<(Image, DecodeReport)> {
    structs::pass::decode(input, None)
}

/// Decodes `input`, stopping reconstruction after zoom-schedule step
/// `last_step` and filling everything after it by interpolation. No-op
/// distinction from [`decode`] in scanline mode, where there is no
/// intermediate schedule to truncate into.
pub fn decode_truncated<R: Read>(input: R, last_step: u64) -> error::Result<(Image, DecodeReport)> {
    structs::pass::decode(input, Some(last_step))
}
