//! Seeded pseudo-random number generator
//!
//! Deterministic PRNG for reproducible tournaments. A tournament seed is
//! expanded into one stream per (repetition, pairing), and each match forks
//! that stream into independent sub-streams for length sampling, each player
//! and noise. Serial and parallel runs therefore draw identical numbers.

/// 32-byte tournament seed
pub type Seed = [u8; 32];

/// Seeded random number generator
///
/// Deterministic: same seed + stream = same sequence
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    /// Create a new RNG from a 32-byte seed and stream index
    pub fn new(seed: &Seed, stream: u64) -> Self {
        let mut state = 0u64;
        for (i, chunk) in seed.chunks(8).enumerate() {
            let mut bytes = [0u8; 8];
            bytes[..chunk.len()].copy_from_slice(chunk);
            state ^= u64::from_le_bytes(bytes).wrapping_add(i as u64);
        }

        state ^= stream.wrapping_mul(0x517cc1b727220a95);

        let mut rng = Self::from_state(state);
        for _ in 0..8 {
            rng.next_u64();
        }

        rng
    }

    /// Derive an independent sub-stream
    pub fn fork(&self, stream: u64) -> Self {
        let mut new_state = self.state;
        new_state ^= stream.wrapping_add(1).wrapping_mul(0x9e3779b97f4a7c15);

        let mut rng = Self::from_state(new_state);
        rng.next_u64();
        rng
    }

    fn from_state(state: u64) -> Self {
        // xorshift never leaves the all-zero state
        let state = if state == 0 { 0x2545f4914f6cdd1d } else { state };
        Self { state }
    }

    /// Generate next u64
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64*
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545f4914f6cdd1d)
    }

    /// Generate next u32
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform draw in [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// True with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Generate a value 0-99 (for percentage checks)
    pub fn next_percent(&mut self) -> u8 {
        (self.next_u32() % 100) as u8
    }
}

/// Expand a 64-bit seed into a full tournament seed (splitmix64).
pub fn seed_from_u64(seed: u64) -> Seed {
    let mut out = [0u8; 32];
    let mut x = seed;
    for chunk in out.chunks_mut(8) {
        x = x.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = x;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^= z >> 31;
        chunk.copy_from_slice(&z.to_le_bytes());
    }
    out
}

/// A fresh seed from the operating system's entropy source.
pub fn entropy_seed() -> Seed {
    seed_from_u64(rand::random::<u64>())
}
