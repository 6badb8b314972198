//! Transform chain: reversible per-image adapters applied before pixel
//! coding, each narrowing the [`ColorRanges`] the predictors and context
//! trees see. Object-safe so the pass orchestrator can hold a
//! `Vec<Box<dyn Transform>>` built from metadata read off the wire.

use crate::image::{ColorRanges, ColorVal, Image, StaticColorRanges};
use crate::structs::range_coder::{RacGet, RacPut};
use std::io;

/// One reversible, invertible step in the transform chain.
///
/// `init`/`process` run at encode time only, to decide whether the transform
/// applies and to let it inspect the image before `data` runs. `save`/`load`
/// carry whatever per-image parameters the transform computed (or, on
/// decode, read back) across the wire. `data`/`inv_data` do the actual
/// forward/inverse pixel rewrite.
pub trait Transform {
    fn name(&self) -> &'static str;

    /// Returns `false` if this transform does not apply to `ranges` (wrong
    /// plane count, wrong bit depth, etc.); the pass orchestrator skips it.
    fn init(&mut self, ranges: &dyn ColorRanges) -> bool;

    /// Inspects the image to decide (and record) per-image parameters.
    /// Returns `false` if, having looked at the actual pixels, the
    /// transform turns out not to help and should be dropped.
    fn process(&mut self, ranges: &dyn ColorRanges, image: &Image) -> bool;

    fn save(&self, rac: &mut dyn RacPut) -> io::Result<()>;
    fn load(&mut self, ranges: &dyn ColorRanges, rac: &mut dyn RacGet) -> io::Result<()>;

    /// The `ColorRanges` pixel coding sees after this transform is applied.
    fn meta(&self, image: &Image, incoming: &dyn ColorRanges) -> Box<dyn ColorRanges>;

    /// Forward pixel rewrite, run once at encode time after `process`.
    fn data(&self, image: &mut Image);

    /// Inverse pixel rewrite, run once at decode time after `load`.
    fn inv_data(&self, image: &mut Image);
}

/// Narrows each plane's declared range to the tight `[min,max]` actually
/// present in the image. The only concrete transform this codec ships;
/// additional transforms (palettization, YCoCg, ...) would implement the
/// same trait.
#[derive(Debug, Default)]
pub struct BoundsTransform {
    bounds: Vec<(ColorVal, ColorVal)>,
    /// The range each plane was declared over before this transform
    /// narrowed it, recorded at `init` time. `save`/`load` code the
    /// narrowed bounds against this (finite, already-known-to-both-sides)
    /// domain rather than the full `i32` range, since `write_uniform_int`'s
    /// bisection needs `hi - lo + 1` to fit in a `u32` denominator.
    incoming: Vec<(ColorVal, ColorVal)>,
}

impl BoundsTransform {
    pub fn new() -> Self {
        BoundsTransform { bounds: Vec::new(), incoming: Vec::new() }
    }
}

impl Transform for BoundsTransform {
    fn name(&self) -> &'static str {
        "BOUNDS"
    }

    fn init(&mut self, ranges: &dyn ColorRanges) -> bool {
        self.incoming = (0..ranges.num_planes()).map(|p| (ranges.min(p), ranges.max(p))).collect();
        self.bounds = self.incoming.clone();
        true
    }

    fn process(&mut self, ranges: &dyn ColorRanges, image: &Image) -> bool {
        let mut changed = false;
        for p in 0..ranges.num_planes() {
            let mut lo = ranges.max(p);
            let mut hi = ranges.min(p);
            for &v in image.planes[p].data() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
            if lo > hi {
                // fully empty plane (zero-size image); keep the declared range
                lo = ranges.min(p);
                hi = ranges.max(p);
            }
            if lo != ranges.min(p) || hi != ranges.max(p) {
                changed = true;
            }
            self.bounds[p] = (lo, hi);
        }
        changed
    }

    fn save(&self, rac: &mut dyn RacPut) -> io::Result<()> {
        use crate::structs::symbol_coder::write_uniform_int;
        for (&(lo, hi), &(in_lo, in_hi)) in self.bounds.iter().zip(&self.incoming) {
            write_uniform_int(rac, in_lo as i64, in_hi as i64, lo as i64)?;
            write_uniform_int(rac, lo as i64, in_hi as i64, hi as i64)?;
        }
        Ok(())
    }

    fn load(&mut self, ranges: &dyn ColorRanges, rac: &mut dyn RacGet) -> io::Result<()> {
        use crate::structs::symbol_coder::read_uniform_int;
        self.bounds.clear();
        for p in 0..ranges.num_planes() {
            let (in_lo, in_hi) = (ranges.min(p) as i64, ranges.max(p) as i64);
            let lo = read_uniform_int(rac, in_lo, in_hi)? as ColorVal;
            let hi = read_uniform_int(rac, lo as i64, in_hi)? as ColorVal;
            self.bounds.push((lo, hi));
        }
        Ok(())
    }

    fn meta(&self, _image: &Image, _incoming: &dyn ColorRanges) -> Box<dyn ColorRanges> {
        Box::new(StaticColorRanges::new(self.bounds.clone()))
    }

    fn data(&self, _image: &mut Image) {
        // pixel values are already within bounds; only the declared range narrows
    }

    fn inv_data(&self, _image: &mut Image) {
        // inverse of a pure range narrowing is the identity on pixel data
    }
}
