//! PGM/PPM (binary P5/P6) load/save. CLI-only glue: not part of the codec's
//! public API, not exercised by the core's own tests, and deliberately
//! minimal (no comment lines, no ASCII P2/P3 variants).

use crate::image::{Image, Plane};
use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Read, Write};

/// Reads a whitespace-separated ASCII token from a binary PNM header,
/// stopping right before the single mandatory whitespace byte that
/// precedes the pixel data.
fn read_token<R: BufRead>(r: &mut R) -> Result<String> {
    let mut tok = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        let n = r.read(&mut byte).context("reading PNM header token")?;
        if n == 0 {
            bail!("unexpected EOF while reading PNM header");
        }
        let b = byte[0];
        if b.is_ascii_whitespace() {
            if tok.is_empty() {
                continue;
            }
            break;
        }
        tok.push(b);
    }
    String::from_utf8(tok).context("non-ASCII PNM header token")
}

/// Loads a binary grayscale (P5) or RGB (P6) PNM file into a 1- or
/// 3-plane [`Image`] with per-plane bounds `[0, maxval]`.
pub fn load(bytes: &[u8]) -> Result<Image> {
    let mut r = BufReader::new(bytes);
    let magic = read_token(&mut r)?;
    let num_planes = match magic.as_str() {
        "P5" => 1,
        "P6" => 3,
        other => bail!("unsupported PNM magic {other:?} (only P5/P6 are supported)"),
    };
    let cols: usize = read_token(&mut r)?.parse().context("PNM width")?;
    let rows: usize = read_token(&mut r)?.parse().context("PNM height")?;
    let maxval: i32 = read_token(&mut r)?.parse().context("PNM maxval")?;
    if !(1..=65535).contains(&maxval) {
        bail!("PNM maxval {maxval} out of range");
    }

    let mut planes: Vec<Plane> = (0..num_planes).map(|_| Plane::new(rows, cols, 0, maxval)).collect();
    let bytes_per_sample = if maxval > 255 { 2 } else { 1 };
    let mut sample = [0u8; 2];
    for row in 0..rows {
        for col in 0..cols {
            for p in 0..num_planes {
                r.read_exact(&mut sample[..bytes_per_sample]).context("PNM pixel data")?;
                let v = if bytes_per_sample == 2 {
                    ((sample[0] as i32) << 8) | sample[1] as i32
                } else {
                    sample[0] as i32
                };
                planes[p].set(row, col, v);
            }
        }
    }
    Ok(Image::new(planes))
}

/// Writes `image` as a binary P5 (1 plane) or P6 (3 planes) PNM file.
pub fn save<W: Write>(image: &Image, mut out: W) -> Result<()> {
    let num_planes = image.num_planes();
    let magic = match num_planes {
        1 => "P5",
        3 => "P6",
        n => bail!("PNM output only supports 1 or 3 planes, image has {n}"),
    };
    let maxval = image.planes.iter().map(|p| p.max).max().unwrap_or(255).max(1);
    write!(out, "{magic}\n{} {}\n{maxval}\n", image.cols(), image.rows())?;
    let bytes_per_sample = if maxval > 255 { 2 } else { 1 };
    for row in 0..image.rows() {
        for col in 0..image.cols() {
            for p in 0..num_planes {
                let v = image.get(p, row, col);
                if bytes_per_sample == 2 {
                    out.write_all(&[(v >> 8) as u8, v as u8])?;
                } else {
                    out.write_all(&[v as u8])?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Plane;

    #[test]
    fn grayscale_roundtrips_through_bytes() {
        let mut plane = Plane::new(2, 3, 0, 255);
        for r in 0..2 {
            for c in 0..3 {
                plane.set(r, c, (r * 3 + c) as i32 * 10);
            }
        }
        let image = Image::new(vec![plane]);
        let mut buf = Vec::new();
        save(&image, &mut buf).unwrap();
        let loaded = load(&buf).unwrap();
        for r in 0..2 {
            for c in 0..3 {
                assert_eq!(loaded.get(0, r, c), image.get(0, r, c));
            }
        }
    }

    #[test]
    fn rgb_roundtrips_through_bytes() {
        let planes = (0..3)
            .map(|p| {
                let mut plane = Plane::new(2, 2, 0, 255);
                plane.set(0, 0, p * 50);
                plane.set(1, 1, 255 - p * 10);
                plane
            })
            .collect();
        let image = Image::new(planes);
        let mut buf = Vec::new();
        save(&image, &mut buf).unwrap();
        let loaded = load(&buf).unwrap();
        for p in 0..3 {
            for r in 0..2 {
                for c in 0..2 {
                    assert_eq!(loaded.get(p, r, c), image.get(p, r, c));
                }
            }
        }
    }

    #[test]
    fn rejects_unknown_magic() {
        assert!(load(b"P3\n1 1\n255\n0").is_err());
    }
}
