//! xorshift1024* nonce streams for the work loop.
//!
//! Each worker owns one stream, seeded from the OS once at thread start, so
//! the hot loop never touches a shared RNG.

use rand::RngCore;

pub(crate) struct XorShift1024Star {
    state: [u64; 16],
    p: usize,
}

impl XorShift1024Star {
    pub fn seeded() -> Self {
        let mut state = [0u64; 16];
        let mut rng = rand::rngs::OsRng;
        for word in state.iter_mut() {
            *word = rng.next_u64();
        }
        // An all-zero state would be a fixed point.
        if state.iter().all(|&w| w == 0) {
            state[0] = 1;
        }
        Self { state, p: 0 }
    }

    pub fn next(&mut self) -> u64 {
        let s0 = self.state[self.p];
        self.p = (self.p + 1) & 15;
        let mut s1 = self.state[self.p];
        s1 ^= s1 << 31;
        self.state[self.p] = s1 ^ s0 ^ (s1 >> 11) ^ (s0 >> 30);
        self.state[self.p].wrapping_mul(1181783497276652981)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_varied_output() {
        let mut rng = XorShift1024Star::seeded();
        let first = rng.next();
        let mut different = false;
        for _ in 0..16 {
            if rng.next() != first {
                different = true;
                break;
            }
        }
        assert!(different);
    }

    #[test]
    fn streams_are_independent() {
        let mut a = XorShift1024Star::seeded();
        let mut b = XorShift1024Star::seeded();
        let same = (0..8).all(|_| a.next() == b.next());
        assert!(!same);
    }
}
