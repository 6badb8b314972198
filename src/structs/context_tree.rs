//! Per-plane binary decision tree ("context tree") routing pixel residuals
//! to one of several adaptive chance tables based on a property vector.
//!
//! Growth happens in two phases: a learn phase runs candidate pixels through
//! [`ContextTree::learn`] (coded against a [`crate::structs::range_coder::RacDummy`]
//! so it costs no bytes) which both adapts the visited leaf's chances and
//! accumulates per-property split statistics; [`ContextTree::simplify`] then
//! greedily commits whichever splits reduce the estimated coding cost by
//! more than a fixed margin. Once the caller stops calling `simplify`, the
//! tree shape is frozen and [`ContextTree::encode`]/[`ContextTree::decode`]
//! drive the real range coder.
//!
//! Serialization (`write_tree`/`read_tree`) mirrors `flif.cpp`'s
//! `encode_tree`/`decode_tree`: a pre-order walk, one "is this a split"
//! marker bit per node, and uniformly-coded property index/threshold pairs
//! at each split.

use crate::consts::{TREE_MIN_COUNT, TREE_SPLIT_MARGIN_BITS};
use crate::structs::bit_chance::MultiscaleBitChance;
use crate::structs::range_coder::{RacGet, RacPut};
use crate::structs::symbol_coder::{
    max_exponent_for, read_int, read_uniform_int, write_int, write_uniform_int, IntegerChances,
};
use std::io;

/// The bit-chance bank used at every context-tree leaf: six independently
/// adapting estimators per bit position, ranked by running cost.
pub type LeafBitChance = MultiscaleBitChance<6>;

#[derive(Debug, Clone, Copy)]
pub struct PropRange {
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SplitAccum {
    left_n: u64,
    left_sum: i64,
    left_sumsq: i64,
    right_n: u64,
    right_sum: i64,
    right_sumsq: i64,
}

#[derive(Debug, Clone)]
struct LeafStats {
    accum: Vec<Vec<SplitAccum>>,
    n: u64,
    sum: i64,
    sumsq: i64,
}

impl LeafStats {
    fn new(prop_ranges: &[PropRange]) -> Self {
        let accum = prop_ranges
            .iter()
            .map(|r| vec![SplitAccum::default(); (r.max - r.min).max(0) as usize])
            .collect();
        LeafStats { accum, n: 0, sum: 0, sumsq: 0 }
    }

    fn record(&mut self, props: &[i32], value: i64, prop_ranges: &[PropRange]) {
        self.n += 1;
        self.sum += value;
        self.sumsq += value * value;
        for (p_idx, range) in prop_ranges.iter().enumerate() {
            let pv = props[p_idx];
            for (t_off, acc) in self.accum[p_idx].iter_mut().enumerate() {
                let t = range.min + t_off as i32;
                if pv <= t {
                    acc.left_n += 1;
                    acc.left_sum += value;
                    acc.left_sumsq += value * value;
                } else {
                    acc.right_n += 1;
                    acc.right_sum += value;
                    acc.right_sumsq += value * value;
                }
            }
        }
    }

    /// Greedily picks the (property, threshold) pair whose split reduces
    /// estimated coding cost the most, gated by a minimum observation count
    /// on both sides and a minimum margin of estimated savings.
    fn best_split(&self, prop_ranges: &[PropRange]) -> Option<(usize, i32)> {
        if self.n < TREE_MIN_COUNT {
            return None;
        }
        let total_cost = variance_cost(self.n, self.sum, self.sumsq);
        let mut best: Option<(usize, i32, f64)> = None;
        for (p_idx, buckets) in self.accum.iter().enumerate() {
            for (t_off, acc) in buckets.iter().enumerate() {
                if acc.left_n < TREE_MIN_COUNT || acc.right_n < TREE_MIN_COUNT {
                    continue;
                }
                let left_cost = variance_cost(acc.left_n, acc.left_sum, acc.left_sumsq);
                let right_cost = variance_cost(acc.right_n, acc.right_sum, acc.right_sumsq);
                let savings = total_cost - (left_cost + right_cost);
                if savings > TREE_SPLIT_MARGIN_BITS
                    && best.map_or(true, |(_, _, best_savings)| savings > best_savings)
                {
                    best = Some((p_idx, prop_ranges[p_idx].min + t_off as i32, savings));
                }
            }
        }
        best.map(|(p, t, _)| (p, t))
    }
}

/// Gaussian-entropy estimate of the bit cost of coding `n` samples with the
/// given sum/sum-of-squares, used only to rank candidate splits against each
/// other and against not splitting at all.
fn variance_cost(n: u64, sum: i64, sumsq: i64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mean = sum as f64 / nf;
    let var = (sumsq as f64 / nf) - mean * mean;
    0.5 * nf * (var.max(1.0 / 12.0) + 1.0).log2()
}

#[derive(Debug, Clone)]
struct Leaf {
    chances: IntegerChances<LeafBitChance>,
    stats: LeafStats,
}

impl Leaf {
    fn new(prop_ranges: &[PropRange], max_exponent: usize) -> Self {
        Leaf {
            chances: IntegerChances::new(max_exponent),
            stats: LeafStats::new(prop_ranges),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(Box<Leaf>),
    Split { prop: usize, threshold: i32, left: usize, right: usize },
}

/// One plane's context tree: owns all nodes in a flat `Vec`, indexed by
/// position rather than linked through `Box`/`Rc`, so growth during learning
/// never requires an allocator dance beyond `Vec::push`.
#[derive(Debug, Clone)]
pub struct ContextTree {
    nodes: Vec<Node>,
    root: usize,
    prop_ranges: Vec<PropRange>,
    min: i64,
    max: i64,
}

impl ContextTree {
    pub fn new(prop_ranges: Vec<PropRange>, min: i64, max: i64) -> Self {
        let max_exponent = max_exponent_for(min, max);
        let root_leaf = Leaf::new(&prop_ranges, max_exponent);
        ContextTree {
            nodes: vec![Node::Leaf(Box::new(root_leaf))],
            root: 0,
            prop_ranges,
            min,
            max,
        }
    }

    fn locate_leaf(&self, props: &[i32]) -> usize {
        let mut idx = self.root;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(_) => return idx,
                Node::Split { prop, threshold, left, right } => {
                    idx = if props[*prop] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn leaf_mut(&mut self, idx: usize) -> &mut Leaf {
        match &mut self.nodes[idx] {
            Node::Leaf(leaf) => leaf,
            Node::Split { .. } => unreachable!("locate_leaf never returns a split node"),
        }
    }

    /// Learn-pass step: codes `value` (already relative to the caller's
    /// predictor guess, bounded to `min..=max`) against a (typically dummy)
    /// encoder under the current leaf's chances, and folds the observation
    /// into that leaf's split statistics for the next [`Self::simplify`]
    /// call. `min..=max` must fit inside the symmetric bound the tree was
    /// constructed with, since that bound sized every leaf's chance tables.
    pub fn learn<RC: RacPut + ?Sized>(
        &mut self,
        rac: &mut RC,
        props: &[i32],
        min: i64,
        max: i64,
        value: i64,
    ) -> io::Result<()> {
        let idx = self.locate_leaf(props);
        let ContextTree { nodes, prop_ranges, .. } = self;
        let leaf = match &mut nodes[idx] {
            Node::Leaf(leaf) => leaf,
            Node::Split { .. } => unreachable!("locate_leaf never returns a split node"),
        };
        write_int(rac, &mut leaf.chances, min, max, value)?;
        leaf.stats.record(props, value, prop_ranges);
        Ok(())
    }

    /// Final-pass encode: tree shape is assumed frozen, only the leaf's
    /// chances continue to adapt. `value` is relative to the caller's
    /// predictor guess, same convention as [`Self::learn`].
    pub fn encode<RC: RacPut + ?Sized>(
        &mut self,
        rac: &mut RC,
        props: &[i32],
        min: i64,
        max: i64,
        value: i64,
    ) -> io::Result<()> {
        let idx = self.locate_leaf(props);
        write_int(rac, &mut self.leaf_mut(idx).chances, min, max, value)
    }

    pub fn decode<RC: RacGet + ?Sized>(
        &mut self,
        rac: &mut RC,
        props: &[i32],
        min: i64,
        max: i64,
    ) -> io::Result<i64> {
        let idx = self.locate_leaf(props);
        read_int(rac, &mut self.leaf_mut(idx).chances, min, max)
    }

    /// Commits whichever current leaves have a profitable candidate split,
    /// replacing each with a `Split` node and two fresh leaves. Safe to call
    /// repeatedly across learn sweeps; leaves with no qualifying split are
    /// left untouched.
    pub fn simplify(&mut self) {
        let leaf_indices: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| matches!(n, Node::Leaf(_)).then_some(i))
            .collect();
        let max_exponent = max_exponent_for(self.min, self.max);
        for idx in leaf_indices {
            let candidate = match &self.nodes[idx] {
                Node::Leaf(leaf) => leaf.stats.best_split(&self.prop_ranges),
                Node::Split { .. } => continue,
            };
            if let Some((prop, threshold)) = candidate {
                let left = Node::Leaf(Box::new(Leaf::new(&self.prop_ranges, max_exponent)));
                let right = Node::Leaf(Box::new(Leaf::new(&self.prop_ranges, max_exponent)));
                let left_idx = self.nodes.len();
                self.nodes.push(left);
                let right_idx = self.nodes.len();
                self.nodes.push(right);
                self.nodes[idx] = Node::Split { prop, threshold, left: left_idx, right: right_idx };
            }
        }
    }

    /// Resets every leaf's adaptive chances to fresh default state, keeping
    /// the tree shape (inner-node splits, decided by the learn sweeps'
    /// `simplify()` calls) intact. Must run once learning is done and
    /// before the frozen emit pass: the decoder's `read_tree` always
    /// constructs leaves via `Leaf::new` (never sees the learn pass's
    /// `RacDummy`-adapted state), so the encoder's emit-pass leaves have to
    /// start from that same fresh state or the two sides' chance sequences
    /// — and thus the arithmetic coder's bit stream — diverge immediately.
    pub fn freeze(&mut self) {
        let max_exponent = max_exponent_for(self.min, self.max);
        for node in &mut self.nodes {
            if let Node::Leaf(leaf) = node {
                leaf.chances = IntegerChances::new(max_exponent);
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf(_))).count()
    }

    pub fn write_tree<RC: RacPut + ?Sized>(&self, rac: &mut RC) -> io::Result<()> {
        self.write_node(rac, self.root)
    }

    fn write_node<RC: RacPut + ?Sized>(&self, rac: &mut RC, idx: usize) -> io::Result<()> {
        match &self.nodes[idx] {
            Node::Leaf(_) => rac.put_uniform(false),
            Node::Split { prop, threshold, left, right } => {
                rac.put_uniform(true)?;
                write_uniform_int(rac, 0, (self.prop_ranges.len() - 1) as i64, *prop as i64)?;
                let range = self.prop_ranges[*prop];
                write_uniform_int(rac, range.min as i64, range.max as i64, *threshold as i64)?;
                self.write_node(rac, *left)?;
                self.write_node(rac, *right)
            }
        }
    }

    pub fn read_tree<RC: RacGet + ?Sized>(
        rac: &mut RC,
        prop_ranges: Vec<PropRange>,
        min: i64,
        max: i64,
    ) -> io::Result<Self> {
        let mut tree = ContextTree { nodes: Vec::new(), root: 0, prop_ranges, min, max };
        tree.root = tree.read_node(rac)?;
        Ok(tree)
    }

    fn read_node<RC: RacGet + ?Sized>(&mut self, rac: &mut RC) -> io::Result<usize> {
        let max_exponent = max_exponent_for(self.min, self.max);
        if rac.get_uniform()? {
            let prop = read_uniform_int(rac, 0, (self.prop_ranges.len() - 1) as i64)? as usize;
            let range = self.prop_ranges[prop];
            let threshold = read_uniform_int(rac, range.min as i64, range.max as i64)? as i32;
            let left = self.read_node(rac)?;
            let right = self.read_node(rac)?;
            let idx = self.nodes.len();
            self.nodes.push(Node::Split { prop, threshold, left, right });
            Ok(idx)
        } else {
            let idx = self.nodes.len();
            self.nodes.push(Node::Leaf(Box::new(Leaf::new(&self.prop_ranges, max_exponent))));
            Ok(idx)
        }
    }
}
