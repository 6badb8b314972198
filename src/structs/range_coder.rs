//! Carry-propagating binary range coder, bit-exact with
//! `examples/original_source/maniac/rac.h`'s `RacInput`/`RacOutput`/`RacDummy`.
//!
//! Two configurations share this implementation: [`RacConfig24`] (tree
//! metadata) and [`RacConfig40`] (payload). Both are carried as zero-sized
//! marker types so the bit widths are compile-time constants, but the
//! arithmetic itself runs in `u64` regardless of configuration — `u64`
//! safely holds the 24-bit and 40-bit ranges this coder ever manipulates, so
//! there is no need for the reference's `data_t` template parameter.

use std::io::{self, Read, Write};
use std::marker::PhantomData;

/// Per-configuration range-coder constants.
pub trait RacConfig: Copy + Clone + 'static {
    const MAX_RANGE_BITS: u32;
    const MIN_RANGE_BITS: u32;
}

#[derive(Debug, Clone, Copy)]
pub struct RacConfig24;
impl RacConfig for RacConfig24 {
    const MAX_RANGE_BITS: u32 = 24;
    const MIN_RANGE_BITS: u32 = 16;
}

#[derive(Debug, Clone, Copy)]
pub struct RacConfig40;
impl RacConfig for RacConfig40 {
    const MAX_RANGE_BITS: u32 = 40;
    const MIN_RANGE_BITS: u32 = 32;
}

#[inline(always)]
fn min_range<C: RacConfig>() -> u64 {
    1u64 << C::MIN_RANGE_BITS
}

#[inline(always)]
fn base_range<C: RacConfig>() -> u64 {
    1u64 << C::MAX_RANGE_BITS
}

/// Encoder-side operations shared by [`RacOutput`] and [`RacDummy`].
pub trait RacPut {
    /// Encodes `bit` under the fractional probability `num/denom` of `bit == false`.
    fn put_frac(&mut self, num: u32, denom: u32, bit: bool) -> io::Result<()>;
    /// Encodes `bit` under the 16-bit fixed-point chance `b16/65536` of `bit == true`.
    fn put_b16(&mut self, b16: u16, bit: bool) -> io::Result<()>;
    /// Encodes `bit` uniformly (chance = range/2).
    fn put_uniform(&mut self, bit: bool) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Decoder-side operations implemented by [`RacInput`].
pub trait RacGet {
    fn get_frac(&mut self, num: u32, denom: u32) -> io::Result<bool>;
    fn get_b16(&mut self, b16: u16) -> io::Result<bool>;
    fn get_uniform(&mut self) -> io::Result<bool>;
}

/// Range-coding arithmetic encoder writing to an underlying byte sink.
pub struct RacOutput<C: RacConfig, W: Write> {
    io: W,
    range: u64,
    low: u64,
    /// -1 means "no byte buffered yet", matching the reference's sentinel.
    delayed_byte: i64,
    delayed_count: u64,
    _cfg: PhantomData<C>,
}

impl<C: RacConfig, W: Write> RacOutput<C, W> {
    pub fn new(io: W) -> Self {
        RacOutput {
            io,
            range: base_range::<C>(),
            low: 0,
            delayed_byte: -1,
            delayed_count: 0,
            _cfg: PhantomData,
        }
    }

    pub fn into_inner(self) -> W {
        self.io
    }

    fn output(&mut self) -> io::Result<()> {
        let min_range = min_range::<C>();
        while self.range <= min_range {
            let byte = (self.low >> C::MIN_RANGE_BITS) as i64;
            if self.delayed_byte < 0 {
                self.delayed_byte = byte;
            } else if ((self.low + self.range) >> 8) < min_range {
                self.io.write_all(&[self.delayed_byte as u8])?;
                while self.delayed_count > 0 {
                    self.io.write_all(&[0xFF])?;
                    self.delayed_count -= 1;
                }
                self.delayed_byte = byte;
            } else if (self.low >> 8) >= min_range {
                self.io.write_all(&[(self.delayed_byte + 1) as u8])?;
                while self.delayed_count > 0 {
                    self.io.write_all(&[0])?;
                    self.delayed_count -= 1;
                }
                self.delayed_byte = byte & 0xFF;
            } else {
                self.delayed_count += 1;
            }
            self.low = (self.low & (min_range - 1)) << 8;
            self.range <<= 8;
        }
        Ok(())
    }

    fn put(&mut self, chance: u64, bit: bool) -> io::Result<()> {
        debug_assert!(chance > 0, "chance must be positive");
        debug_assert!(chance < self.range, "chance must be below range");
        if bit {
            self.low += self.range - chance;
            self.range = chance;
        } else {
            self.range -= chance;
        }
        self.output()
    }
}

impl<C: RacConfig, W: Write> RacPut for RacOutput<C, W> {
    fn put_frac(&mut self, num: u32, denom: u32, bit: bool) -> io::Result<()> {
        debug_assert!(num < denom && denom > 1);
        let chance = (self.range * num as u64 + denom as u64 / 2) / denom as u64;
        self.put(chance.max(1), bit)
    }

    fn put_b16(&mut self, b16: u16, bit: bool) -> io::Result<()> {
        debug_assert!(b16 > 0);
        let chance = (self.range * b16 as u64 + 0x8000) >> 16;
        self.put(chance.max(1).min(self.range - 1), bit)
    }

    fn put_uniform(&mut self, bit: bool) -> io::Result<()> {
        self.put(self.range / 2, bit)
    }

    fn flush(&mut self) -> io::Result<()> {
        let min_range = min_range::<C>();
        self.low += min_range - 1;
        self.range = min_range - 1;
        self.output()?;
        self.range = min_range - 1;
        self.output()?;
        self.io.flush()
    }
}

/// Range-coding arithmetic decoder reading from an underlying byte source.
///
/// Past EOF, byte reads silently return `0`, allowing a truncated stream to
/// be decoded with graceful degradation.
pub struct RacInput<C: RacConfig, R: Read> {
    io: R,
    range: u64,
    low: u64,
    _cfg: PhantomData<C>,
}

impl<C: RacConfig, R: Read> RacInput<C, R> {
    pub fn new(mut io: R) -> io::Result<Self> {
        let mut low = 0u64;
        let mut r = base_range::<C>();
        while r > 1 {
            low <<= 8;
            low |= Self::read_byte(&mut io)? as u64;
            r >>= 8;
        }
        Ok(RacInput {
            io,
            range: base_range::<C>(),
            low,
            _cfg: PhantomData,
        })
    }

    fn read_byte(io: &mut R) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        match io.read(&mut buf)? {
            0 => Ok(0),
            _ => Ok(buf[0]),
        }
    }

    fn input(&mut self) -> io::Result<()> {
        let min_range = min_range::<C>();
        while self.range <= min_range {
            self.low <<= 8;
            self.range <<= 8;
            self.low |= Self::read_byte(&mut self.io)? as u64;
        }
        Ok(())
    }

    fn get(&mut self, chance: u64) -> io::Result<bool> {
        debug_assert!(chance > 0, "chance must be positive");
        debug_assert!(chance < self.range, "chance must be below range");
        if self.low >= self.range - chance {
            self.low -= self.range - chance;
            self.range = chance;
            self.input()?;
            Ok(true)
        } else {
            self.range -= chance;
            self.input()?;
            Ok(false)
        }
    }
}

impl<C: RacConfig, R: Read> RacGet for RacInput<C, R> {
    fn get_frac(&mut self, num: u32, denom: u32) -> io::Result<bool> {
        debug_assert!(num < denom && denom > 1);
        let chance = (self.range * num as u64 + denom as u64 / 2) / denom as u64;
        self.get(chance.max(1))
    }

    fn get_b16(&mut self, b16: u16) -> io::Result<bool> {
        debug_assert!(b16 > 0);
        let chance = (self.range * b16 as u64 + 0x8000) >> 16;
        self.get(chance.max(1).min(self.range - 1))
    }

    fn get_uniform(&mut self) -> io::Result<bool> {
        self.get(self.range / 2)
    }
}

/// No-op encoder used during tree-learning passes: accumulates no bytes, but
/// satisfies [`RacPut`] so the same symbol-coder code path can run the
/// pass twice (once to learn, once to emit) without branching on mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct RacDummy;

impl RacPut for RacDummy {
    fn put_frac(&mut self, num: u32, denom: u32, _bit: bool) -> io::Result<()> {
        debug_assert!(num < denom && denom > 1);
        Ok(())
    }

    fn put_b16(&mut self, b16: u16, _bit: bool) -> io::Result<()> {
        debug_assert!(b16 > 0);
        Ok(())
    }

    fn put_uniform(&mut self, _bit: bool) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_random_bits() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let bits: Vec<bool> = (0..5000).map(|_| rng.gen_bool(0.5)).collect();
        let chances: Vec<u16> = (0..5000).map(|_| rng.gen_range(1u16..=65535)).collect();

        let mut buf = Vec::new();
        {
            let mut enc = RacOutput::<RacConfig40, _>::new(&mut buf);
            for (b, c) in bits.iter().zip(chances.iter()) {
                enc.put_b16(*c, *b).unwrap();
            }
            enc.flush().unwrap();
        }

        let mut dec = RacInput::<RacConfig40, _>::new(buf.as_slice()).unwrap();
        for (b, c) in bits.iter().zip(chances.iter()) {
            assert_eq!(dec.get_b16(*c).unwrap(), *b);
        }
    }

    #[test]
    fn roundtrip_uniform_24() {
        let values: Vec<u32> = (0..300).collect();
        let denom = 300u32;

        let mut buf = Vec::new();
        {
            let mut enc = RacOutput::<RacConfig24, _>::new(&mut buf);
            for &v in &values {
                // encode v as a sequence of binary-search comparisons against denom
                enc.put_frac(v, denom, v % 2 == 0).unwrap();
            }
            enc.flush().unwrap();
        }

        let mut dec = RacInput::<RacConfig24, _>::new(buf.as_slice()).unwrap();
        for &v in &values {
            assert_eq!(dec.get_frac(v, denom).unwrap(), v % 2 == 0);
        }
    }

    #[test]
    fn empty_stream_decodes_as_zero_fill() {
        let mut dec = RacInput::<RacConfig40, _>::new(&b""[..]).unwrap();
        // should not panic; EOF reads come back as zero bytes
        let _ = dec.get_uniform();
    }
}
