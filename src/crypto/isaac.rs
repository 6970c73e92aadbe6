//! ISAAC stream cipher
//!
//! Bob Jenkins' ISAAC generator, as keyed by the RS login block. The server
//! obfuscates outgoing opcodes with a generator seeded from the client's four
//! login seeds, each offset by 50.
//!
//! Reference: http://www.burtleburtle.net/bob/rand/isaacafa.html

use std::fmt;

use super::{StreamCipher, StreamCipherProvider};

const SIZE: usize = 256;
const MASK: u32 = (SIZE as u32 - 1) << 2;
const GOLDEN_RATIO: u32 = 0x9e37_79b9;

/// Offset added to each login seed for the server-to-client direction
pub const SERVER_SEED_OFFSET: u32 = 50;

/// ISAAC generator state
#[derive(Clone)]
pub struct Isaac {
    rsl: [u32; SIZE],
    mem: [u32; SIZE],
    a: u32,
    b: u32,
    c: u32,
    cursor: usize,
}

impl Isaac {
    /// Key a generator with up to 256 seed words
    pub fn new(seed: &[u32]) -> Self {
        let mut isaac = Self {
            rsl: [0; SIZE],
            mem: [0; SIZE],
            a: 0,
            b: 0,
            c: 0,
            cursor: 0,
        };
        for (slot, &word) in isaac.rsl.iter_mut().zip(seed) {
            *slot = word;
        }
        isaac.seed();
        isaac
    }

    fn seed(&mut self) {
        let mut s = [GOLDEN_RATIO; 8];
        for _ in 0..4 {
            scramble(&mut s);
        }

        for pass in 0..2 {
            for i in (0..SIZE).step_by(8) {
                let source = if pass == 0 { &self.rsl } else { &self.mem };
                for (j, word) in s.iter_mut().enumerate() {
                    *word = word.wrapping_add(source[i + j]);
                }
                scramble(&mut s);
                self.mem[i..i + 8].copy_from_slice(&s);
            }
        }

        self.refill();
        self.cursor = SIZE;
    }

    fn refill(&mut self) {
        self.c = self.c.wrapping_add(1);
        self.b = self.b.wrapping_add(self.c);

        for i in 0..SIZE {
            let x = self.mem[i];
            self.a ^= match i & 3 {
                0 => self.a << 13,
                1 => self.a >> 6,
                2 => self.a << 2,
                _ => self.a >> 16,
            };
            self.a = self.mem[(i + SIZE / 2) & (SIZE - 1)].wrapping_add(self.a);
            let y = self
                .indirect(x)
                .wrapping_add(self.a)
                .wrapping_add(self.b);
            self.mem[i] = y;
            self.b = self.indirect(y >> 8).wrapping_add(x);
            self.rsl[i] = self.b;
        }
    }

    #[inline]
    fn indirect(&self, x: u32) -> u32 {
        self.mem[((x & MASK) >> 2) as usize]
    }

    /// Next keystream word; results are consumed from the top of the block down
    pub fn next_word(&mut self) -> u32 {
        if self.cursor == 0 {
            self.refill();
            self.cursor = SIZE;
        }
        self.cursor -= 1;
        self.rsl[self.cursor]
    }
}

fn scramble(s: &mut [u32; 8]) {
    const SHIFTS: [(bool, u32); 8] = [
        (true, 11),
        (false, 2),
        (true, 8),
        (false, 16),
        (true, 10),
        (false, 4),
        (true, 8),
        (false, 9),
    ];
    for (i, &(left, amount)) in SHIFTS.iter().enumerate() {
        let next = s[(i + 1) & 7];
        s[i] ^= if left { next << amount } else { next >> amount };
        s[(i + 3) & 7] = s[(i + 3) & 7].wrapping_add(s[i]);
        s[(i + 1) & 7] = s[(i + 1) & 7].wrapping_add(s[(i + 2) & 7]);
    }
}

impl StreamCipher for Isaac {
    fn next_int(&mut self) -> u32 {
        self.next_word()
    }
}

impl fmt::Debug for Isaac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isaac")
            .field("cursor", &self.cursor)
            .field("a", &self.a)
            .field("b", &self.b)
            .field("c", &self.c)
            .finish()
    }
}

/// Provides the server-side (encoding) ISAAC generator for a login seed
#[derive(Debug, Default, Clone, Copy)]
pub struct IsaacProvider;

impl StreamCipherProvider for IsaacProvider {
    fn provide(&self, seed: &[u32; 4]) -> Box<dyn StreamCipher> {
        let offset = seed.map(|word| word.wrapping_add(SERVER_SEED_OFFSET));
        Box::new(Isaac::new(&offset))
    }
}
