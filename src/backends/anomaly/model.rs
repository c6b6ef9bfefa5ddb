// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Adaptive bit model used to estimate how many bits a payload carries.
//!
//! Three hashed context tables (order 0, 1 and 2 bytes of history) each predict
//! the next bit; their predictions are mixed in the logistic domain by a single
//! online-trained neuron. The cost of a byte string is the sum of `-log2 p` over
//! its bits, and the model adapts as it goes, so payloads that look like what a
//! context has already seen get cheaper.

/// Slots per context table, as a power of two.
pub const TABLE_BITS: u32 = 14;
const TABLE_SIZE: usize = 1 << TABLE_BITS;
const ORDERS: usize = 3;

/// Probabilities are stored as 12-bit integers.
const PROB_ONE: i32 = 4096;
const ADAPT_SHIFT: u32 = 4;
const LEARNING_RATE: f64 = 0.02;

pub struct ComplexityModel {
    tables: Vec<Vec<u16>>,
    weights: [f64; ORDERS],
    history: [u8; 2],
}

impl ComplexityModel {
    pub fn new() -> Self {
        Self {
            tables: vec![vec![(PROB_ONE / 2) as u16; TABLE_SIZE]; ORDERS],
            weights: [0.3; ORDERS],
            history: [0; 2],
        }
    }

    /// Bits needed to code `data` under the current model, learning from it as it
    /// is coded.
    pub fn cost(&mut self, data: &[u8]) -> f64 {
        self.history = [0; 2];
        let mut bits = 0.0;

        for &byte in data {
            let mut partial: u64 = 1;
            for shift in (0..8).rev() {
                let bit = (byte >> shift) & 1;
                bits += self.code_bit(partial, bit);
                partial = (partial << 1) | u64::from(bit);
            }
            self.history = [byte, self.history[0]];
        }

        bits
    }

    fn code_bit(&mut self, partial: u64, bit: u8) -> f64 {
        let slots = self.slots(partial);

        let mut inputs = [0.0; ORDERS];
        for (order, slot) in slots.iter().enumerate() {
            inputs[order] = stretch(f64::from(self.tables[order][*slot]) / f64::from(PROB_ONE));
        }

        let dot: f64 = inputs.iter().zip(self.weights.iter()).map(|(x, w)| x * w).sum();
        let p = squash(dot).clamp(1e-6, 1.0 - 1e-6);
        let cost = -(if bit == 1 { p } else { 1.0 - p }).log2();

        let error = f64::from(bit) - p;
        for (weight, input) in self.weights.iter_mut().zip(inputs.iter()) {
            *weight += LEARNING_RATE * error * input;
        }

        let target = if bit == 1 { PROB_ONE - 1 } else { 0 };
        for (order, slot) in slots.iter().enumerate() {
            let current = i32::from(self.tables[order][*slot]);
            self.tables[order][*slot] = (current + ((target - current) >> ADAPT_SHIFT)) as u16;
        }

        cost
    }

    fn slots(&self, partial: u64) -> [usize; ORDERS] {
        let one = u64::from(self.history[0]);
        let two = u64::from(self.history[1]);
        [
            hash(0, partial),
            hash(1, (one << 9) | partial),
            hash(2, (((two << 8) | one) << 9) | partial),
        ]
    }
}

impl Default for ComplexityModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComplexityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplexityModel")
            .field("weights", &self.weights)
            .finish()
    }
}

fn hash(order: u64, key: u64) -> usize {
    ((key ^ (order << 40)).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> (64 - TABLE_BITS)) as usize
}

fn stretch(p: f64) -> f64 {
    let p = p.clamp(1.0 / f64::from(PROB_ONE), 1.0 - 1.0 / f64::from(PROB_ONE));
    (p / (1.0 - p)).ln()
}

fn squash(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Streaming mean and variance (Welford).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance; zero until there are two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard score of `x`, or zero while the spread is zero.
    pub fn z_score(&self, x: f64) -> f64 {
        let sd = self.std_dev();
        if sd > 0.0 {
            (x - self.mean) / sd
        } else {
            0.0
        }
    }
}
