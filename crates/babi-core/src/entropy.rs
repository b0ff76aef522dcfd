use uuid::Uuid;

/// Source of uniform randomness in `[0, 1)`, injected so idea picking and
/// the decline tease are reproducible in tests.
pub trait Entropy: Send {
    fn next_unit(&mut self) -> f64;

    /// Uniform index below `len`; `None` when `len` is zero.
    fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let index = (self.next_unit() * len as f64).floor() as usize;
        Some(index.min(len - 1))
    }
}

/// Draws from the v4 UUID generator's random bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidEntropy;

impl Entropy for UuidEntropy {
    fn next_unit(&mut self) -> f64 {
        // Low 53 bits sit below the variant field, so all of them are random.
        let bits = Uuid::new_v4().as_u128() as u64 & ((1u64 << 53) - 1);
        bits as f64 / (1u64 << 53) as f64
    }
}

/// Replays a fixed sequence, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct SequenceEntropy {
    values: Vec<f64>,
    next: usize,
}

impl SequenceEntropy {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, next: 0 }
    }
}

impl Entropy for SequenceEntropy {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }
}
