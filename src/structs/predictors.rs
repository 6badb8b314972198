//! Median-of-three gradient predictors and the property vectors that key
//! the context tree, for both iteration orders.
//!
//! Grounded on `examples/original_source/flif.cpp`'s
//! `predict_and_calcProps_scanlines`, `predict_and_calcProps`, `predict`, and
//! `plane_zoomlevel`. The zoom-mode even/odd fill direction is resolved
//! against the row/col step formulas in [`crate::image::Image`] rather than
//! against the prose's literal parity labels, since the two disagree under a
//! direct reading and the formulas are the binding contract (see DESIGN.md).

use crate::image::{ColorRanges, ColorVal, Image};
use crate::structs::context_tree::PropRange;

fn median3(a: ColorVal, b: ColorVal, c: ColorVal) -> ColorVal {
    a + b + c - a.max(b).max(c) - a.min(b).min(c)
}

fn pix(image: &Image, grey: &[ColorVal], p: usize, r: isize, c: isize) -> ColorVal {
    let rows = image.planes[p].rows as isize;
    let cols = image.planes[p].cols as isize;
    if r < 0 || c < 0 || r >= rows || c >= cols {
        grey[p]
    } else {
        image.get(p, r as usize, c as usize)
    }
}

fn diff_range(ranges: &dyn ColorRanges, p: usize) -> PropRange {
    PropRange { min: ranges.min(p) - ranges.max(p), max: ranges.max(p) - ranges.min(p) }
}

/// Number of scanline-mode property-vector entries for plane `p`.
pub fn scanline_prop_len(num_planes: usize, p: usize) -> usize {
    if num_planes > 3 { [8, 9, 10, 7][p] } else { [7, 8, 9, 7][p] }
}

pub fn scanline_prop_ranges(ranges: &dyn ColorRanges, num_planes: usize, p: usize) -> Vec<PropRange> {
    let mut v = Vec::with_capacity(scanline_prop_len(num_planes, p));
    if p != 3 {
        for p2 in 0..p {
            v.push(PropRange { min: ranges.min(p2), max: ranges.max(p2) });
        }
        if num_planes > 3 {
            v.push(PropRange { min: ranges.min(3), max: ranges.max(3) });
        }
    }
    v.push(PropRange { min: ranges.min(p), max: ranges.max(p) }); // guess
    v.push(PropRange { min: 0, max: 3 }); // which — kept at [0,3] even though only 0..=2 is ever produced
    v.push(diff_range(ranges, p)); // L-TL
    v.push(diff_range(ranges, p)); // TL-T
    v.push(diff_range(ranges, p)); // T-topright
    v.push(diff_range(ranges, p)); // toptop-T
    v.push(diff_range(ranges, p)); // leftleft-L
    v
}

/// Predicts pixel `(p,r,c)` in raster order and builds its property vector.
/// Returns `(guess, min, max, properties)`.
pub fn scanline_predict(
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    p: usize,
    r: usize,
    c: usize,
) -> (ColorVal, ColorVal, ColorVal, Vec<ColorVal>) {
    let (ri, ci) = (r as isize, c as isize);
    let l = pix(image, grey, p, ri, ci - 1);
    let t = pix(image, grey, p, ri - 1, ci);
    let tl = pix(image, grey, p, ri - 1, ci - 1);
    let grad = l + t - tl;
    let guess0 = median3(grad, l, t);
    let which: ColorVal = if guess0 == grad { 0 } else if guess0 == l { 1 } else { 2 };

    let num_planes = image.num_planes();
    let mut props = Vec::with_capacity(scanline_prop_len(num_planes, p));
    if p != 3 {
        for p2 in 0..p {
            props.push(image.get(p2, r, c));
        }
        if num_planes > 3 {
            props.push(image.get(3, r, c));
        }
    }
    props.push(guess0);
    props.push(which);
    props.push(l - tl);
    props.push(tl - t);
    let topright = pix(image, grey, p, ri - 1, ci + 1);
    let toptop = pix(image, grey, p, ri - 2, ci);
    let leftleft = pix(image, grey, p, ri, ci - 2);
    props.push(t - topright);
    props.push(toptop - t);
    props.push(leftleft - l);

    let (min, max, guess) = ranges.snap(p, &props, ranges.min(p), ranges.max(p), guess0);
    (guess, min, max, props)
}

/// Whether zoom level `z` fills in new rows (vertical neighbors) as opposed
/// to new columns (horizontal neighbors), derived from
/// [`Image::zoom_row_step`]/[`Image::zoom_col_step`] rather than assumed
/// from `z`'s parity directly.
pub fn zoom_fills_rows(z: i32) -> bool {
    Image::zoom_row_step(z) < Image::zoom_row_step(z + 1)
}

fn zoom_pix(image: &Image, grey: &[ColorVal], p: usize, z: i32, r: isize, c: isize) -> ColorVal {
    let rows = Image::zoom_rows(image.planes[p].rows, z) as isize;
    let cols = Image::zoom_cols(image.planes[p].cols, z) as isize;
    if r < 0 || c < 0 || r >= rows || c >= cols {
        grey[p]
    } else {
        image.get_z(p, z, r as usize, c as usize)
    }
}

/// Number of zoom-mode property-vector entries for plane `p`.
pub fn zoom_prop_len(num_planes: usize, p: usize) -> usize {
    if num_planes > 3 { [9, 8, 9, 8][p] } else { [8, 7, 8, 8][p] }
}

pub fn zoom_prop_ranges(ranges: &dyn ColorRanges, num_planes: usize, p: usize) -> Vec<PropRange> {
    let mut v = Vec::with_capacity(zoom_prop_len(num_planes, p));
    if p != 3 {
        for p2 in 0..p {
            v.push(PropRange { min: ranges.min(p2), max: ranges.max(p2) });
        }
        if num_planes > 3 {
            v.push(PropRange { min: ranges.min(3), max: ranges.max(3) });
        }
    }
    v.push(diff_range(ranges, p)); // T-B (or L-R)
    v.push(PropRange { min: ranges.min(p), max: ranges.max(p) }); // guess
    v.push(PropRange { min: 0, max: 3 }); // which
    v.push(diff_range(ranges, p)); // standard diff 1
    v.push(diff_range(ranges, p)); // standard diff 2
    v.push(diff_range(ranges, p)); // standard diff 3
    if p == 0 || p == 3 {
        v.push(diff_range(ranges, p)); // second-neighbor diff a
        v.push(diff_range(ranges, p)); // second-neighbor diff b
    }
    v
}

/// Predicts zoom-grid pixel `(p,z,r,c)` and builds its property vector.
pub fn zoom_predict(
    image: &Image,
    ranges: &dyn ColorRanges,
    grey: &[ColorVal],
    p: usize,
    z: i32,
    r: usize,
    c: usize,
) -> (ColorVal, ColorVal, ColorVal, Vec<ColorVal>) {
    let (ri, ci) = (r as isize, c as isize);
    let vertical = zoom_fills_rows(z);
    let at = |dr: isize, dc: isize| zoom_pix(image, grey, p, z, ri + dr, ci + dc);

    let (guess0, which, primary_diff, standard_diffs, second_diffs);
    if vertical {
        let (l, t, tl, b, bl) = (at(0, -1), at(-1, 0), at(-1, -1), at(1, 0), at(1, -1));
        let gradient_tl = l + t - tl;
        let gradient_bl = l + b - bl;
        let avg = (t + b) / 2;
        guess0 = median3(gradient_tl, gradient_bl, avg);
        which = if guess0 == gradient_tl { 0 } else if guess0 == gradient_bl { 1 } else { 2 };
        primary_diff = t - b;
        standard_diffs = [tl - t, b - bl, l - tl];
        second_diffs = [at(-2, 0) - t, b - at(2, 0)];
    } else {
        let (t, l, tl, r_, tr) = (at(-1, 0), at(0, -1), at(-1, -1), at(0, 1), at(-1, 1));
        let gradient_tl = t + l - tl;
        let gradient_tr = t + r_ - tr;
        let avg = (l + r_) / 2;
        guess0 = median3(gradient_tl, gradient_tr, avg);
        which = if guess0 == gradient_tl { 0 } else if guess0 == gradient_tr { 1 } else { 2 };
        primary_diff = l - r_;
        standard_diffs = [tl - l, r_ - tr, t - tl];
        second_diffs = [at(0, -2) - l, r_ - at(0, 2)];
    }

    let num_planes = image.num_planes();
    let mut props = Vec::with_capacity(zoom_prop_len(num_planes, p));
    if p != 3 {
        for p2 in 0..p {
            props.push(image.get_z(p2, z, r, c));
        }
        if num_planes > 3 {
            props.push(image.get_z(3, z, r, c));
        }
    }
    props.push(primary_diff);
    props.push(guess0);
    props.push(which);
    props.extend_from_slice(&standard_diffs);
    if p == 0 || p == 3 {
        props.extend_from_slice(&second_diffs);
    }

    let (min, max, guess) = ranges.snap(p, &props, ranges.min(p), ranges.max(p), guess0);
    (guess, min, max, props)
}

/// Interpolation-only guess at `(p,r,c)`, used for zero-alpha fill at encode
/// time and for reconstructing pixels past a truncated decode.
pub fn scanline_interpolate(image: &Image, ranges: &dyn ColorRanges, grey: &[ColorVal], p: usize, r: usize, c: usize) -> ColorVal {
    scanline_predict(image, ranges, grey, p, r, c).0
}

pub fn zoom_interpolate(image: &Image, ranges: &dyn ColorRanges, grey: &[ColorVal], p: usize, z: i32, r: usize, c: usize) -> ColorVal {
    zoom_predict(image, ranges, grey, p, z, r, c).0
}

/// Priority-plane interleaving schedule across zoom levels and planes.
/// `max_behind[p]` bounds how far plane `p`'s current zoom level may lag
/// behind the priority plane's before it gets scheduled anyway.
const MAX_BEHIND: [i32; 8] = [0, 2, 4, 0, 16, 18, 20, 22];

pub struct ZoomSchedule {
    czl: Vec<i32>,
    end_zl: i32,
    begin_zl: i32,
    priority: usize,
}

impl ZoomSchedule {
    pub fn new(num_planes: usize, begin_zl: i32, end_zl: i32) -> Self {
        let priority = if num_planes > 3 { 3 } else { 0 };
        ZoomSchedule { czl: vec![begin_zl + 1; num_planes], end_zl, begin_zl, priority }
    }

    /// Advances the schedule and returns the `(plane, zoom_level)` to code
    /// next, or `None` once every plane has reached `end_zl`.
    pub fn next(&mut self, step: usize) -> Option<(usize, i32)> {
        let num_planes = self.czl.len();
        if num_planes > 7 {
            let p = step % num_planes;
            let z = self.begin_zl - (step / num_planes) as i32;
            return if z < self.end_zl { None } else { Some((p, z)) };
        }

        let mut chosen = self.priority;
        if self.czl[self.priority] <= self.end_zl {
            // priority plane is done; hand off to whichever plane still has work
            chosen = (0..num_planes).find(|&p| self.czl[p] > self.end_zl)?;
        } else {
            for p in 0..num_planes {
                if p == self.priority || self.czl[p] <= self.end_zl {
                    continue;
                }
                if self.czl[p] > self.czl[self.priority] + MAX_BEHIND[p] {
                    chosen = p;
                    break;
                }
            }
        }
        self.czl[chosen] -= 1;
        Some((chosen, self.czl[chosen]))
    }
}
