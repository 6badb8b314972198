//! Encode/decode orchestration: header I/O, the transform-chain bit-loop,
//! the two-pass (learn then emit) tree-growth flow, zoom-mode rough warmup,
//! checksumming, and truncated-decode recovery.
//!
//! Tree metadata and pixel payload share one range-coder instance end to
//! end (`RacConfig40`): the generic `ContextTree::write_tree`/`read_tree`
//! and `write_int`/`read_int` helpers don't care which `RacConfig` they run
//! against, so there is no need for a second, separately-flushed RC24
//! stream embedded in the file. `RacConfig24` stays implemented and tested
//! in [`crate::structs::range_coder`] as a supported configuration; this
//! pipeline simply doesn't need it. See DESIGN.md for the full rationale.

use crate::consts::{NAME_ALPHABET, NB_NOLEARN_ZOOMS, RESIDUAL_BIT_BUDGET, TREE_LEARN_REPEATS};
use crate::error::{CodecError, DecodeReport};
use crate::image::{grey_values, image_checksum, ColorRanges, ColorVal, Image, StaticColorRanges};
use crate::structs::bit_chance::SimpleBitChance;
use crate::structs::context_tree::{ContextTree, PropRange};
use crate::structs::predictors::{self, ZoomSchedule};
use crate::structs::range_coder::{RacConfig40, RacGet, RacInput, RacOutput, RacPut};
use crate::structs::symbol_coder::{read_int, read_uniform_int, write_int, write_uniform_int, IntegerChances};
use crate::transform::{BoundsTransform, Transform};
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Scanline,
    Zoom,
}

impl Mode {
    fn magic(self) -> &'static str {
        match self {
            Mode::Scanline => crate::consts::MAGIC_SCANLINE,
            Mode::Zoom => crate::consts::MAGIC_ZOOM,
        }
    }
}

fn name_alphabet_index(byte: u8) -> Option<i64> {
    NAME_ALPHABET.iter().position(|&b| b == byte).map(|i| i as i64)
}

fn write_name<RC: RacPut + ?Sized>(rac: &mut RC, name: &str) -> std::io::Result<()> {
    debug_assert!((3..=8).contains(&name.len()));
    write_uniform_int(rac, 3, 8, name.len() as i64)?;
    for &b in name.as_bytes() {
        let idx = name_alphabet_index(b).expect("transform/format names must be drawn from NAME_ALPHABET");
        write_uniform_int(rac, 0, NAME_ALPHABET.len() as i64 - 1, idx)?;
    }
    Ok(())
}

fn read_name<RC: RacGet + ?Sized>(rac: &mut RC) -> std::io::Result<String> {
    let len = read_uniform_int(rac, 3, 8)? as usize;
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        let idx = read_uniform_int(rac, 0, NAME_ALPHABET.len() as i64 - 1)? as usize;
        s.push(NAME_ALPHABET[idx] as char);
    }
    Ok(s)
}

/// One fixed (non-tree-routed) bit-chance context per header field, shared
/// across the handful of ints the header and transform chain need.
struct HeaderCoder {
    chances: IntegerChances<SimpleBitChance>,
}

impl HeaderCoder {
    fn new() -> Self {
        HeaderCoder { chances: IntegerChances::new(16) }
    }

    fn write<RC: RacPut + ?Sized>(&mut self, rac: &mut RC, min: i64, max: i64, value: i64) -> std::io::Result<()> {
        write_int(rac, &mut self.chances, min, max, value)
    }

    fn read<RC: RacGet + ?Sized>(&mut self, rac: &mut RC, min: i64, max: i64) -> std::io::Result<i64> {
        read_int(rac, &mut self.chances, min, max)
    }
}

fn bits_needed(min: ColorVal, max: ColorVal) -> u32 {
    let span = ((max - min) as i64 * 2 - 1).max(1);
    64 - (span as u64).leading_zeros()
}

/// Builds a fresh transform instance by name, for the decode-side chain.
fn transform_by_name(name: &str) -> Option<Box<dyn Transform>> {
    match name {
        "BOUNDS" => Some(Box::new(BoundsTransform::new())),
        _ => None,
    }
}

fn prop_ranges(mode: Mode, ranges: &dyn ColorRanges, num_planes: usize, p: usize) -> Vec<PropRange> {
    match mode {
        Mode::Scanline => predictors::scanline_prop_ranges(ranges, num_planes, p),
        Mode::Zoom => predictors::zoom_prop_ranges(ranges, num_planes, p),
    }
}

fn new_forest(mode: Mode, ranges: &dyn ColorRanges) -> Vec<ContextTree> {
    let num_planes = ranges.num_planes();
    (0..num_planes)
        .map(|p| {
            ContextTree::new(
                prop_ranges(mode, ranges, num_planes, p),
                ranges.min(p) as i64,
                ranges.max(p) as i64,
            )
        })
        .collect()
}

/// Fills every fully-transparent pixel's color planes with the
/// interpolation predictor's own guess, at encode time only. Because the
/// fill makes the pixel equal to what the predictor would have guessed
/// anyway, decode reconstructs it for free: the coded residual is zero, and
/// `guess + 0` reproduces the same fill value the predictor would compute
/// from whatever's already been decoded around it. Zoom mode additionally
/// skips coding these pixels outright (`zoom_level_decode`'s own zero-alpha
/// check) instead of spending a zero-residual symbol on them; scanline mode
/// does not (see DESIGN.md's pass-orchestrator entry for why).
fn fill_transparent(image: &mut Image, ranges: &dyn ColorRanges, grey: &[ColorVal]) {
    if image.num_planes() <= 3 {
        return;
    }
    let (rows, cols) = (image.rows(), image.cols());
    for r in 0..rows {
        for c in 0..cols {
            if !image.is_fully_transparent(r, c) {
                continue;
            }
            for p in 0..3.min(image.num_planes()) {
                let guess = predictors::scanline_interpolate(image, ranges, grey, p, r, c);
                image.set(p, r, c, guess);
            }
        }
    }
}

pub struct EncodeOptions {
    pub mode: Mode,
    pub transforms: Vec<Box<dyn Transform>>,
}

pub fn encode<W: Write>(image: &Image, input_ranges: &dyn ColorRanges, opts: EncodeOptions, out: W) -> crate::error::Result<()> {
    let EncodeOptions { mode, transforms } = opts;
    let mut image = image.clone();
    let mut rac = RacOutput::<RacConfig40, _>::new(out);

    write_name(&mut rac, mode.magic())?;

    let num_planes = input_ranges.num_planes();
    let mut header = HeaderCoder::new();
    header.write(&mut rac, 1, 16, num_planes as i64)?;
    header.write(&mut rac, 1, 65536, image.cols() as i64)?;
    header.write(&mut rac, 1, 65536, image.rows() as i64)?;
    for p in 0..num_planes {
        let span = input_ranges.max(p) - input_ranges.min(p);
        let bitdepth = (32 - (span.max(1) as u32).leading_zeros()).max(1);
        header.write(&mut rac, 1, 16, bitdepth as i64)?;
    }

    let mut ranges: Box<dyn ColorRanges> =
        Box::new(StaticColorRanges::new((0..num_planes).map(|p| (input_ranges.min(p), input_ranges.max(p))).collect()));

    for mut transform in transforms {
        if !transform.init(ranges.as_ref()) || !transform.process(ranges.as_ref(), &image) {
            rac.put_uniform(false)?;
            continue;
        }
        rac.put_uniform(true)?;
        write_name(&mut rac, transform.name())?;
        transform.save(&mut rac as &mut dyn RacPut)?;
        ranges = transform.meta(&image, ranges.as_ref());
        transform.data(&mut image);
    }
    rac.put_uniform(false)?;

    for p in 0..ranges.num_planes() {
        let bits = bits_needed(ranges.min(p), ranges.max(p));
        if bits > RESIDUAL_BIT_BUDGET {
            return Err(CodecError::CapacityExceeded { needed: bits, budget: RESIDUAL_BIT_BUDGET }.into());
        }
    }

    let grey = grey_values(ranges.as_ref());
    fill_transparent(&mut image, ranges.as_ref(), &grey);
    let checksum = image_checksum(&image);

    match mode {
        Mode::Scanline => encode_scanline_main(&mut rac, &image, ranges.as_ref(), &grey)?,
        Mode::Zoom => encode_zoom_main(&mut rac, &image, ranges.as_ref(), &grey)?,
    }

    header.write(&mut rac, 0, 0xFFFF, (checksum >> 16) as i64)?;
    header.write(&mut rac, 0, 0xFFFF, (checksum & 0xFFFF) as i64)?;
    rac.flush()?;
    Ok(())
}

fn encode_scanline_main<W: Write>(
    rac: &mut RacOutput<RacConfig40, W>,
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
) -> std::io::Result<()> {
    let num_planes = image.num_planes();
    let mut forest = new_forest(Mode::Scanline, ranges);
    let mut dummy = crate::structs::range_coder::RacDummy;
    for _ in 0..TREE_LEARN_REPEATS {
        for p in 0..num_planes {
            for r in 0..image.rows() {
                for c in 0..image.cols() {
                    let (guess, min, max, props) = predictors::scanline_predict(image, ranges, grey, p, r, c);
                    let value = image.get(p, r, c) as i64 - guess as i64;
                    forest[p].learn(&mut dummy, &props, min as i64 - guess as i64, max as i64 - guess as i64, value)?;
                }
            }
        }
        for tree in &mut forest {
            tree.simplify();
        }
    }
    for tree in &mut forest {
        tree.freeze();
    }
    for tree in &forest {
        tree.write_tree(rac)?;
    }
    for p in 0..num_planes {
        for r in 0..image.rows() {
            for c in 0..image.cols() {
                let (guess, min, max, props) = predictors::scanline_predict(image, ranges, grey, p, r, c);
                let value = image.get(p, r, c) as i64 - guess as i64;
                forest[p].encode(rac, &props, min as i64 - guess as i64, max as i64 - guess as i64, value)?;
            }
        }
    }
    Ok(())
}

fn encode_zoom_main<W: Write>(
    rac: &mut RacOutput<RacConfig40, W>,
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
) -> std::io::Result<()> {
    let num_planes = image.num_planes();
    let top_z = Image::zooms(image.rows(), image.cols());
    let rough_zl = (top_z - NB_NOLEARN_ZOOMS - 1).max(0);

    // root pixel of every plane, coded through the header coder, not the tree
    let mut header = HeaderCoder::new();
    for p in 0..num_planes {
        let v = image.get_z(p, top_z, 0, 0);
        header.write(rac, ranges.min(p) as i64, ranges.max(p) as i64, v as i64)?;
    }

    // rough warmup: single pass, trivial (never-simplified) forest
    let mut rough_forest = new_forest(Mode::Zoom, ranges);
    let mut z = top_z - 1;
    while z >= rough_zl + 1 {
        for p in priority_plane_order(num_planes) {
            zoom_level_encode(rac, image, ranges, grey, &mut rough_forest[p], p, z)?;
        }
        z -= 1;
    }

    // learn + emit over the remaining levels
    let mut forest = new_forest(Mode::Zoom, ranges);
    let mut dummy = crate::structs::range_coder::RacDummy;
    for _ in 0..TREE_LEARN_REPEATS {
        let mut sched = ZoomSchedule::new(num_planes, rough_zl, 0);
        let mut step = 0usize;
        while let Some((p, zl)) = sched.next(step) {
            step += 1;
            zoom_level_learn(&mut dummy, image, ranges, grey, &mut forest[p], p, zl)?;
        }
        for tree in &mut forest {
            tree.simplify();
        }
    }
    for tree in &mut forest {
        tree.freeze();
    }
    for tree in &forest {
        tree.write_tree(rac)?;
    }

    let mut sched = ZoomSchedule::new(num_planes, rough_zl, 0);
    let mut step = 0usize;
    while let Some((p, zl)) = sched.next(step) {
        step += 1;
        zoom_level_encode(rac, image, ranges, grey, &mut forest[p], p, zl)?;
    }
    Ok(())
}

/// Plane visit order for the rough warmup pass: the alpha/priority plane
/// (3 if present, else 0) first, so that by the time a level's color planes
/// run their zero-alpha skip check (`zoom_level_encode`/`zoom_level_decode`),
/// that same level's alpha has already been written. Mirrors the priority
/// plane `ZoomSchedule` uses for the learn+emit schedule, but applied to the
/// rough pass's "one full level across all planes" shape instead of
/// `ZoomSchedule`'s per-(plane,level)-step interleaving.
fn priority_plane_order(num_planes: usize) -> Vec<usize> {
    let priority = if num_planes > 3 { 3 } else { 0 };
    let mut order = vec![priority];
    order.extend((0..num_planes).filter(|&p| p != priority));
    order
}

fn zoom_positions(image: &Image, p: usize, z: i32) -> Vec<(usize, usize)> {
    let rows_z = Image::zoom_rows(image.planes[p].rows, z);
    let cols_z = Image::zoom_cols(image.planes[p].cols, z);
    if predictors::zoom_fills_rows(z) {
        (0..rows_z).filter(|r| r % 2 == 1).flat_map(|r| (0..cols_z).map(move |c| (r, c))).collect()
    } else {
        (0..cols_z).filter(|c| c % 2 == 1).flat_map(|c| (0..rows_z).map(move |r| (r, c))).collect()
    }
}

fn zoom_level_learn<RC: RacPut + ?Sized>(
    rac: &mut RC,
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    tree: &mut ContextTree,
    p: usize,
    z: i32,
) -> std::io::Result<()> {
    for (r, c) in zoom_positions(image, p, z) {
        if p < 3 && image.num_planes() > 3 && image.get_z(3, z, r, c) == 0 {
            continue;
        }
        let (guess, min, max, props) = predictors::zoom_predict(image, ranges, grey, p, z, r, c);
        let value = image.get_z(p, z, r, c) as i64 - guess as i64;
        tree.learn(rac, &props, min as i64 - guess as i64, max as i64 - guess as i64, value)?;
    }
    Ok(())
}

fn zoom_level_encode<W: Write>(
    rac: &mut RacOutput<RacConfig40, W>,
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    tree: &mut ContextTree,
    p: usize,
    z: i32,
) -> std::io::Result<()> {
    for (r, c) in zoom_positions(image, p, z) {
        if p < 3 && image.num_planes() > 3 && image.get_z(3, z, r, c) == 0 {
            continue;
        }
        let (guess, min, max, props) = predictors::zoom_predict(image, ranges, grey, p, z, r, c);
        let value = image.get_z(p, z, r, c) as i64 - guess as i64;
        tree.encode(rac, &props, min as i64 - guess as i64, max as i64 - guess as i64, value)?;
    }
    Ok(())
}

pub fn decode<R: Read>(input: R, last_step: Option<u64>) -> crate::error::Result<(Image, DecodeReport)> {
    let mut rac = RacInput::<RacConfig40, _>::new(input)?;
    let mut report = DecodeReport::default();

    let magic = read_name(&mut rac)?;
    let mode = if magic == crate::consts::MAGIC_SCANLINE {
        Mode::Scanline
    } else if magic == crate::consts::MAGIC_ZOOM {
        Mode::Zoom
    } else {
        return Err(CodecError::UnknownMagic(magic).into());
    };

    let mut header = HeaderCoder::new();
    let num_planes = header.read(&mut rac, 1, 16)? as usize;
    if !(1..=4).contains(&num_planes) {
        return Err(CodecError::InvalidGeometry { what: "numPlanes", value: num_planes as i64 }.into());
    }
    let cols = header.read(&mut rac, 1, 65536)? as usize;
    let rows = header.read(&mut rac, 1, 65536)? as usize;
    let mut bounds = Vec::with_capacity(num_planes);
    for _ in 0..num_planes {
        let bitdepth = header.read(&mut rac, 1, 16)?;
        bounds.push((0, (1i32 << bitdepth) - 1));
    }
    let mut ranges: Box<dyn ColorRanges> = Box::new(StaticColorRanges::new(bounds));

    let mut image = Image::new((0..num_planes).map(|_| crate::image::Plane::new(rows, cols, 0, 0)).collect());

    let mut chain: Vec<Box<dyn Transform>> = Vec::new();
    loop {
        if !rac.get_uniform()? {
            break;
        }
        let name = read_name(&mut rac)?;
        let mut transform =
            transform_by_name(&name).ok_or_else(|| CodecError::UnknownTransform(name.clone()))?;
        if !transform.init(ranges.as_ref()) {
            return Err(CodecError::TransformInitFailed(name).into());
        }
        transform.load(ranges.as_ref(), &mut rac as &mut dyn RacGet)?;
        ranges = transform.meta(&image, ranges.as_ref());
        chain.push(transform);
    }

    for p in 0..ranges.num_planes() {
        let bits = bits_needed(ranges.min(p), ranges.max(p));
        if bits > RESIDUAL_BIT_BUDGET {
            return Err(CodecError::CapacityExceeded { needed: bits, budget: RESIDUAL_BIT_BUDGET }.into());
        }
        image.planes[p] = crate::image::Plane::new(rows, cols, ranges.min(p), ranges.max(p));
    }
    let grey = grey_values(ranges.as_ref());

    match mode {
        Mode::Scanline => {
            decode_scanline_main(&mut rac, &mut image, ranges.as_ref(), &grey)?;
        }
        Mode::Zoom => {
            decode_zoom_main(&mut rac, &mut image, ranges.as_ref(), &grey, last_step, &mut report)?;
        }
    }

    for transform in chain.into_iter().rev() {
        transform.inv_data(&mut image);
    }

    if !report.truncated {
        let stored_hi = header.read(&mut rac, 0, 0xFFFF)? as u32;
        let stored_lo = header.read(&mut rac, 0, 0xFFFF)? as u32;
        let stored = (stored_hi << 16) | stored_lo;
        report.checksum_ok = Some(stored == image_checksum(&image));
    }

    Ok((image, report))
}

fn decode_scanline_main<R: Read>(
    rac: &mut RacInput<RacConfig40, R>,
    image: &mut Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
) -> std::io::Result<()> {
    let num_planes = image.num_planes();
    let mut forest: Vec<ContextTree> = Vec::with_capacity(num_planes);
    for p in 0..num_planes {
        let ranges_vec = prop_ranges(Mode::Scanline, ranges, num_planes, p);
        forest.push(ContextTree::read_tree(rac, ranges_vec, ranges.min(p) as i64, ranges.max(p) as i64)?);
    }
    for p in 0..num_planes {
        for r in 0..image.rows() {
            for c in 0..image.cols() {
                let (guess, min, max, props) = predictors::scanline_predict(image, ranges, grey, p, r, c);
                let residual = forest[p].decode(rac, &props, min as i64 - guess as i64, max as i64 - guess as i64)?;
                image.set(p, r, c, guess + residual as ColorVal);
            }
        }
    }
    Ok(())
}

fn decode_zoom_main<R: Read>(
    rac: &mut RacInput<RacConfig40, R>,
    image: &mut Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    last_step: Option<u64>,
    report: &mut DecodeReport,
) -> std::io::Result<()> {
    let num_planes = image.num_planes();
    let top_z = Image::zooms(image.rows(), image.cols());
    let rough_zl = (top_z - NB_NOLEARN_ZOOMS - 1).max(0);

    let mut header = HeaderCoder::new();
    for p in 0..num_planes {
        let v = header.read(rac, ranges.min(p) as i64, ranges.max(p) as i64)?;
        image.set_z(p, top_z, 0, 0, v as ColorVal);
    }

    let mut rough_forest = new_forest(Mode::Zoom, ranges);
    let mut z = top_z - 1;
    while z >= rough_zl + 1 {
        for p in priority_plane_order(num_planes) {
            zoom_level_decode(rac, image, ranges, grey, &mut rough_forest[p], p, z)?;
        }
        z -= 1;
    }

    let mut forest: Vec<ContextTree> = Vec::with_capacity(num_planes);
    for p in 0..num_planes {
        let ranges_vec = prop_ranges(Mode::Zoom, ranges, num_planes, p);
        forest.push(ContextTree::read_tree(rac, ranges_vec, ranges.min(p) as i64, ranges.max(p) as i64)?);
    }

    // materialize the full schedule so a truncation partway through only
    // reconstructs the steps that were never reached, not every low-zoom
    // pixel regardless of whether it already decoded successfully
    let mut schedule_steps = Vec::new();
    {
        let mut sched = ZoomSchedule::new(num_planes, rough_zl, 0);
        let mut step = 0usize;
        while let Some((p, zl)) = sched.next(step) {
            schedule_steps.push((p, zl));
            step += 1;
        }
    }

    let mut truncated_from = None;
    for (step, &(p, zl)) in schedule_steps.iter().enumerate() {
        if let Some(limit) = last_step {
            if step as u64 > limit {
                truncated_from = Some(step);
                break;
            }
        }
        if zoom_level_decode(rac, image, ranges, grey, &mut forest[p], p, zl).is_err() {
            truncated_from = Some(step);
            break;
        }
    }

    if let Some(from) = truncated_from {
        report.truncated = true;
        for &(p, zl) in &schedule_steps[from..] {
            for (r, c) in zoom_positions(image, p, zl) {
                let guess = predictors::zoom_interpolate(image, ranges, grey, p, zl, r, c);
                image.set_z(p, zl, r, c, guess);
            }
        }
    }
    Ok(())
}

fn zoom_level_decode<R: Read>(
    rac: &mut RacInput<RacConfig40, R>,
    image: &mut Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    tree: &mut ContextTree,
    p: usize,
    z: i32,
) -> std::io::Result<()> {
    for (r, c) in zoom_positions(image, p, z) {
        if p < 3 && image.num_planes() > 3 && image.get_z(3, z, r, c) == 0 {
            let guess = predictors::zoom_interpolate(image, ranges, grey, p, z, r, c);
            image.set_z(p, z, r, c, guess);
            continue;
        }
        let (guess, min, max, props) = predictors::zoom_predict(image, ranges, grey, p, z, r, c);
        let residual = tree.decode(rac, &props, min as i64 - guess as i64, max as i64 - guess as i64)?;
        image.set_z(p, z, r, c, guess + residual as ColorVal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Plane;

    fn single_plane_image(rows: usize, cols: usize, fill: impl Fn(usize, usize) -> ColorVal, max: ColorVal) -> (Image, StaticColorRanges) {
        let mut plane = Plane::new(rows, cols, 0, max);
        for r in 0..rows {
            for c in 0..cols {
                plane.set(r, c, fill(r, c));
            }
        }
        (Image::new(vec![plane]), StaticColorRanges::new(vec![(0, max)]))
    }

    #[test]
    fn scanline_roundtrip_small_image() {
        let (image, ranges) = single_plane_image(2, 2, |r, c| if (r + c) % 2 == 0 { 0 } else { 255 }, 255);
        let mut buf = Vec::new();
        encode(&image, &ranges, EncodeOptions { mode: Mode::Scanline, transforms: vec![] }, &mut buf).unwrap();
        let (decoded, report) = decode(buf.as_slice(), None).unwrap();
        assert_eq!(report.checksum_ok, Some(true));
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(decoded.get(0, r, c), image.get(0, r, c));
            }
        }
    }

    #[test]
    fn zoom_roundtrip_gradient_image() {
        let (image, ranges) = single_plane_image(8, 8, |r, c| (r * 8 + c) as ColorVal, 63);
        let mut buf = Vec::new();
        encode(&image, &ranges, EncodeOptions { mode: Mode::Zoom, transforms: vec![] }, &mut buf).unwrap();
        let (decoded, report) = decode(buf.as_slice(), None).unwrap();
        assert_eq!(report.checksum_ok, Some(true));
        for r in 0..8 {
            for c in 0..8 {
                assert_eq!(decoded.get(0, r, c), image.get(0, r, c));
            }
        }
    }
}
