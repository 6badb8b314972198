//! Optional per-component coding-cost accounting, gated by the
//! `compression_stats` feature. Mirrors the bookkeeping shape of
//! `VPXBoolReader`'s `Metrics`/`ModelComponent`, adapted to this codec's
//! model components (range coder normalization shifts spent per
//! symbol-coder role).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelComponent {
    Zero,
    Sign,
    Exponent,
    Mantissa,
    TreeMeta,
    Header,
    Dummy,
}

#[derive(Debug, Default, Clone)]
pub struct Metrics {
    #[cfg(feature = "compression_stats")]
    bits_by_component: std::collections::HashMap<ModelComponent, (u64, i64)>,
}

impl Metrics {
    #[cfg(feature = "compression_stats")]
    pub fn record_compression_stats(&mut self, cmp: ModelComponent, count: u64, shift_bits: i64) {
        let entry = self.bits_by_component.entry(cmp).or_insert((0, 0));
        entry.0 += count;
        entry.1 += shift_bits;
    }

    #[cfg(not(feature = "compression_stats"))]
    pub fn record_compression_stats(&mut self, _cmp: ModelComponent, _count: u64, _shift_bits: i64) {
    }

    /// Takes the accumulated statistics, leaving this `Metrics` empty.
    pub fn drain(&mut self) -> Metrics {
        std::mem::take(self)
    }

    #[cfg(feature = "compression_stats")]
    pub fn log_summary(&self) {
        for (cmp, (count, bits)) in &self.bits_by_component {
            log::info!("{:?}: {} symbols, ~{} bits", cmp, count, bits);
        }
    }
}
