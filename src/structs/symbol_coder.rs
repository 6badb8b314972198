//! Bounded signed-integer coding on top of the range coder and the bit-chance
//! models: every payload symbol (header ints, transform metadata, pixel
//! residuals) goes through the same zero-bit / sign-bit / unary-exponent /
//! binary-magnitude breakdown, only the chance storage differs by caller:
//!
//! - [`write_uniform_int`]/[`read_uniform_int`]: no adaptive state at all,
//!   just bisection against the range coder's fractional `put_frac`/`get_frac`
//!   (used for the transform-name alphabet and other equiprobable symbols).
//! - [`IntegerChances`] + [`write_int`]/[`read_int`]: one fixed set of
//!   per-bit-position chances (used directly for header ints, and as the
//!   per-leaf storage the context tree routes pixel residuals through).

use crate::structs::bit_chance::BitChance;
use crate::structs::range_coder::{RacGet, RacPut};
use std::io;

/// Encodes `value`, known to lie in `min..=max`, without any adaptive state:
/// each step bisects the remaining range and asks the range coder to decide
/// which half `value` falls in under the uniform (count-based) probability
/// of that split.
pub fn write_uniform_int<RC: RacPut + ?Sized>(
    rac: &mut RC,
    min: i64,
    max: i64,
    value: i64,
) -> io::Result<()> {
    debug_assert!(min <= value && value <= max);
    let mut lo = min;
    let mut hi = max;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let denom = (hi - lo + 1) as u32;
        let num = (mid - lo + 1) as u32;
        let bit = value > mid;
        rac.put_frac(num, denom, bit)?;
        if bit {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(())
}

pub fn read_uniform_int<RC: RacGet + ?Sized>(rac: &mut RC, min: i64, max: i64) -> io::Result<i64> {
    let mut lo = min;
    let mut hi = max;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let denom = (hi - lo + 1) as u32;
        let num = (mid - lo + 1) as u32;
        if rac.get_frac(num, denom)? {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

fn exponent_of(magnitude: u64) -> u32 {
    debug_assert!(magnitude >= 1);
    63 - magnitude.leading_zeros()
}

/// Largest exponent an [`IntegerChances`] table must budget for if it will
/// ever be asked to code a value in `min..=max`.
pub fn max_exponent_for(min: i64, max: i64) -> usize {
    let m = min.unsigned_abs().max(max.unsigned_abs()).max(1);
    exponent_of(m) as usize
}

/// Per-bit-position adaptive state needed to code one bounded signed integer:
/// a zero flag, a sign flag, one chance per unary exponent level, and one
/// chance per (exponent, mantissa bit) pair.
#[derive(Debug, Clone)]
pub struct IntegerChances<B: BitChance> {
    zero: B,
    sign: B,
    exp: Vec<B>,
    mant: Vec<Vec<B>>,
}

impl<B: BitChance> IntegerChances<B> {
    /// `max_exponent` must be at least `exponent_of(largest magnitude this
    /// table will ever be asked to code)`.
    pub fn new(max_exponent: usize) -> Self {
        let exp = vec![B::new(); max_exponent + 1];
        let mant = (0..=max_exponent).map(|e| vec![B::new(); e]).collect();
        IntegerChances { zero: B::new(), sign: B::new(), exp, mant }
    }
}

fn encode_bit<B: BitChance, RC: RacPut + ?Sized>(rac: &mut RC, chance: &mut B, bit: bool) -> io::Result<()> {
    rac.put_b16(chance.get_p(), bit)?;
    chance.update(bit);
    Ok(())
}

fn decode_bit<B: BitChance, RC: RacGet + ?Sized>(rac: &mut RC, chance: &mut B) -> io::Result<bool> {
    let bit = rac.get_b16(chance.get_p())?;
    chance.update(bit);
    Ok(bit)
}

/// Encodes a value known to lie in `min..=max` (with `min <= 0 <= max` or
/// entirely one-sided), routing each structural bit through its own chance
/// in `chances`.
pub fn write_int<B: BitChance, RC: RacPut + ?Sized>(
    rac: &mut RC,
    chances: &mut IntegerChances<B>,
    min: i64,
    max: i64,
    value: i64,
) -> io::Result<()> {
    debug_assert!(min <= value && value <= max);
    if min == max {
        return Ok(());
    }
    let can_be_zero = min <= 0 && 0 <= max;
    if can_be_zero {
        let is_zero = value == 0;
        encode_bit(rac, &mut chances.zero, is_zero)?;
        if is_zero {
            return Ok(());
        }
    }
    let can_be_negative = min < 0;
    let can_be_positive = max > 0;
    let negative = value < 0;
    if can_be_negative && can_be_positive {
        encode_bit(rac, &mut chances.sign, negative)?;
    }

    let max_magnitude = if negative { min.unsigned_abs() } else { max as u64 };
    let max_exp = exponent_of(max_magnitude.max(1));
    let magnitude = value.unsigned_abs();
    let e = exponent_of(magnitude);

    for i in 0..e {
        encode_bit(rac, &mut chances.exp[i as usize], true)?;
    }
    if e < max_exp {
        encode_bit(rac, &mut chances.exp[e as usize], false)?;
    }

    // Magnitude bits, MSB-first, each under its own per-position context, but
    // only when the bit is actually undetermined: once `e` pins the bucket
    // to `[2^e, max_magnitude]` (the top bucket may be partial), a high-order
    // bit whose minimum completion already exceeds `max_magnitude` can only
    // be 0, so it costs nothing to code and is skipped on both ends.
    let bucket_hi = if e == max_exp { max_magnitude } else { (1u64 << (e + 1)) - 1 };
    let offset_hi = bucket_hi - (1u64 << e);
    let offset = magnitude - (1u64 << e);
    let mut built: u64 = 0;
    for k in 0..e {
        let bitpos = e - 1 - k;
        if built | (1u64 << bitpos) > offset_hi {
            continue;
        }
        let bit = (offset >> bitpos) & 1 == 1;
        encode_bit(rac, &mut chances.mant[e as usize][k as usize], bit)?;
        if bit {
            built |= 1u64 << bitpos;
        }
    }
    Ok(())
}

pub fn read_int<B: BitChance, RC: RacGet + ?Sized>(
    rac: &mut RC,
    chances: &mut IntegerChances<B>,
    min: i64,
    max: i64,
) -> io::Result<i64> {
    if min == max {
        return Ok(min);
    }
    let can_be_zero = min <= 0 && 0 <= max;
    if can_be_zero && decode_bit(rac, &mut chances.zero)? {
        return Ok(0);
    }
    let can_be_negative = min < 0;
    let can_be_positive = max > 0;
    let negative = if can_be_negative && can_be_positive {
        decode_bit(rac, &mut chances.sign)?
    } else {
        can_be_negative
    };

    let max_magnitude = if negative { min.unsigned_abs() } else { max as u64 };
    let max_exp = exponent_of(max_magnitude.max(1));

    let mut e = 0u32;
    while e < max_exp && decode_bit(rac, &mut chances.exp[e as usize])? {
        e += 1;
    }

    let bucket_hi = if e == max_exp { max_magnitude } else { (1u64 << (e + 1)) - 1 };
    let offset_hi = bucket_hi - (1u64 << e);
    let mut built: u64 = 0;
    for k in 0..e {
        let bitpos = e - 1 - k;
        if built | (1u64 << bitpos) > offset_hi {
            continue;
        }
        let bit = decode_bit(rac, &mut chances.mant[e as usize][k as usize])?;
        if bit {
            built |= 1u64 << bitpos;
        }
    }
    let magnitude = (1u64 << e) + built;
    Ok(if negative { -(magnitude as i64) } else { magnitude as i64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::bit_chance::SimpleBitChance;
    use crate::structs::range_coder::{RacConfig40, RacInput, RacOutput};

    fn max_exp_for(min: i64, max: i64) -> usize {
        let m = min.unsigned_abs().max(max.unsigned_abs()).max(1);
        exponent_of(m) as usize
    }

    #[test]
    fn roundtrip_symmetric_range() {
        let (min, max) = (-300i64, 300i64);
        let values: Vec<i64> = (min..=max).step_by(7).collect();

        let mut buf = Vec::new();
        let mut enc_chances = IntegerChances::<SimpleBitChance>::new(max_exp_for(min, max));
        {
            let mut enc = RacOutput::<RacConfig40, _>::new(&mut buf);
            for &v in &values {
                write_int(&mut enc, &mut enc_chances, min, max, v).unwrap();
            }
            enc.flush().unwrap();
        }

        let mut dec_chances = IntegerChances::<SimpleBitChance>::new(max_exp_for(min, max));
        let mut dec = RacInput::<RacConfig40, _>::new(buf.as_slice()).unwrap();
        for &v in &values {
            assert_eq!(read_int(&mut dec, &mut dec_chances, min, max).unwrap(), v);
        }
    }

    #[test]
    fn roundtrip_one_sided_range() {
        let (min, max) = (0i64, 1023i64);
        let values: Vec<i64> = (min..=max).collect();

        let mut buf = Vec::new();
        let mut enc_chances = IntegerChances::<SimpleBitChance>::new(max_exp_for(min, max));
        {
            let mut enc = RacOutput::<RacConfig40, _>::new(&mut buf);
            for &v in &values {
                write_int(&mut enc, &mut enc_chances, min, max, v).unwrap();
            }
            enc.flush().unwrap();
        }

        let mut dec_chances = IntegerChances::<SimpleBitChance>::new(max_exp_for(min, max));
        let mut dec = RacInput::<RacConfig40, _>::new(buf.as_slice()).unwrap();
        for &v in &values {
            assert_eq!(read_int(&mut dec, &mut dec_chances, min, max).unwrap(), v);
        }
    }

    #[test]
    fn roundtrip_uniform_alphabet() {
        let mut buf = Vec::new();
        {
            let mut enc = RacOutput::<RacConfig40, _>::new(&mut buf);
            for v in 0..36 {
                write_uniform_int(&mut enc, 0, 35, v).unwrap();
            }
            enc.flush().unwrap();
        }
        let mut dec = RacInput::<RacConfig40, _>::new(buf.as_slice()).unwrap();
        for v in 0..36 {
            assert_eq!(read_uniform_int(&mut dec, 0, 35).unwrap(), v);
        }
    }

    #[test]
    fn constant_range_writes_nothing() {
        let mut buf = Vec::new();
        let mut chances = IntegerChances::<SimpleBitChance>::new(0);
        {
            let mut enc = RacOutput::<RacConfig40, _>::new(&mut buf);
            write_int(&mut enc, &mut chances, 5, 5, 5).unwrap();
            enc.flush().unwrap();
        }
        let mut dec = RacInput::<RacConfig40, _>::new(buf.as_slice()).unwrap();
        assert_eq!(read_int(&mut dec, &mut chances, 5, 5).unwrap(), 5);
    }
}
