//! Seeded random number generators.
//!
//! Location-id assignment and site sampling must be reproducible: rebuilding
//! the same artifact with the same seed and ratio has to instrument the same
//! sites with the same ids. So everything here is explicitly seeded and
//! deterministic; nothing pulls entropy from the environment. Not
//! cryptographically secure, which is fine for fuzzing.

use core::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The default generator used for site selection.
pub type StdRand = RomuDuoJrRand;

/// Faster and almost unbiased alternative to `rand % n`.
///
/// See: [An optimal algorithm for bounded random integers](https://github.com/apple/swift/pull/39143).
#[inline]
#[must_use]
pub fn fast_bound(rand: u64, n: u64) -> u64 {
    debug_assert_ne!(n, 0);
    let mul = u128::from(rand).wrapping_mul(u128::from(n));
    (mul >> 64) as u64
}

/// A deterministic, seedable source of randomness.
pub trait Rand: Debug + Serialize + DeserializeOwned {
    /// Sets the seed of this Rand
    fn set_seed(&mut self, seed: u64);

    /// Gets the next 64 bit value
    fn next(&mut self) -> u64;

    /// Gets a value below the given 64 bit val (exclusive)
    #[inline]
    fn below(&mut self, upper_bound_excl: u64) -> u64 {
        fast_bound(self.next(), upper_bound_excl)
    }

    /// Gets a value between the given lower bound (inclusive) and upper bound (inclusive)
    #[inline]
    fn between(&mut self, lower_bound_incl: u64, upper_bound_incl: u64) -> u64 {
        debug_assert!(lower_bound_incl <= upper_bound_incl);
        lower_bound_incl + self.below(upper_bound_incl - lower_bound_incl + 1)
    }
}

// https://prng.di.unimi.it/splitmix64.c
fn splitmix64(x: &mut u64) -> u64 {
    *x = x.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = *x;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Extremely quick rand implementation
/// see <https://arxiv.org/pdf/2002.11331.pdf>
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct RomuDuoJrRand {
    x_state: u64,
    y_state: u64,
}

impl RomuDuoJrRand {
    /// Creates a new `RomuDuoJrRand` with the given seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        let mut rand = Self {
            x_state: 0,
            y_state: 0,
        };
        rand.set_seed(seed);
        rand
    }
}

impl Default for RomuDuoJrRand {
    /// A fixed-seed default; use [`RomuDuoJrRand::with_seed`] to pick your own.
    fn default() -> Self {
        Self::with_seed(0xAF1)
    }
}

impl Rand for RomuDuoJrRand {
    fn set_seed(&mut self, mut seed: u64) {
        self.x_state = splitmix64(&mut seed);
        self.y_state = splitmix64(&mut seed);
    }

    #[inline]
    #[allow(clippy::unreadable_literal)]
    fn next(&mut self) -> u64 {
        let xp = self.x_state;
        self.x_state = 15241094284759029579_u64.wrapping_mul(self.y_state);
        self.y_state = self.y_state.wrapping_sub(xp).rotate_left(27);
        xp
    }
}

/// A rand that always returns the same value, for testing.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
pub struct FixedRand {
    val: u64,
}

impl FixedRand {
    /// Creates a rand that returns `val` from every call to `next`.
    #[must_use]
    pub fn with_value(val: u64) -> Self {
        Self { val }
    }
}

impl Rand for FixedRand {
    fn set_seed(&mut self, mut seed: u64) {
        self.val = splitmix64(&mut seed);
    }

    fn next(&mut self) -> u64 {
        self.val
    }
}
