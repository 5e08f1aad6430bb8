// PCG-LCG random number stream with skip-ahead
//
// Every history gets its own stream, positioned `history * stride` steps past
// the master seed, so results do not depend on which worker ran the history.

use rand::{RngCore, SeedableRng};

const PRN_MULT: u64 = 6364136223846793005;
const PRN_ADD: u64 = 1442695040888963407;
/// Random numbers reserved for one history.
pub const DEFAULT_STRIDE: u64 = 152_917;

/// Uniform random source for the tracking loop.
///
/// An LCG state with the RXS-M-XS output permutation of the PCG family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastRng {
    seed: u64,
}

impl FastRng {
    #[inline]
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Stream of history `history` under `master_seed`.
    pub fn for_history(master_seed: u64, history: u64, stride: u64) -> Self {
        Self::new(future_seed(history.wrapping_mul(stride), master_seed))
    }

    /// Uniform f64 in [0, 1)
    #[inline(always)]
    pub fn random(&mut self) -> f64 {
        (self.next_u64() as f64) * 5.421010862427522e-20
    }

    /// Uniform f64 in (0, 1), safe to take the logarithm of.
    #[inline]
    pub fn random_open(&mut self) -> f64 {
        loop {
            let r = self.random();
            if r > 0.0 {
                return r;
            }
        }
    }

    /// Jump `n` steps ahead in O(log n).
    pub fn skip(&mut self, n: u64) {
        self.seed = future_seed(n, self.seed);
    }

    #[inline]
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn state(&self) -> u64 {
        self.seed
    }
}

/// LCG state `n` steps after `seed` (Brown, "Random number generation with
/// arbitrary strides").
pub fn future_seed(mut n: u64, seed: u64) -> u64 {
    let mut g = PRN_MULT;
    let mut c = PRN_ADD;
    let mut g_new: u64 = 1;
    let mut c_new: u64 = 0;
    while n > 0 {
        if n & 1 == 1 {
            g_new = g_new.wrapping_mul(g);
            c_new = c_new.wrapping_mul(g).wrapping_add(c);
        }
        c = g.wrapping_add(1).wrapping_mul(c);
        g = g.wrapping_mul(g);
        n >>= 1;
    }
    g_new.wrapping_mul(seed).wrapping_add(c_new)
}

impl SeedableRng for FastRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self {
            seed: u64::from_le_bytes(seed),
        }
    }
}

impl RngCore for FastRng {
    #[inline(always)]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline(always)]
    fn next_u64(&mut self) -> u64 {
        self.seed = PRN_MULT.wrapping_mul(self.seed).wrapping_add(PRN_ADD);
        let word = ((self.seed >> ((self.seed >> 59) + 5)) ^ self.seed)
            .wrapping_mul(12605985483714917081);
        (word >> 43) ^ word
    }

    #[inline]
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    #[inline]
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
