//! Decides which eligible sites get instrumented and which location id each
//! one is assigned.
//!
//! The instrumentation pass walks the target's basic blocks and asks the
//! selector once per eligible site. Inclusion is an independent uniform draw
//! against the configured instrumentation ratio; included sites then draw
//! their location id from the same seeded generator. With a fixed seed and
//! ratio the whole assignment is reproducible across rebuilds.

use core::fmt;

use edgecov::{
    rands::{Rand, StdRand},
    Error,
};
use serde::{Deserialize, Serialize};

/// Default location-id space: the classic 2^16 AFL map.
pub const DEFAULT_LOC_SPACE: u32 = 65536;

/// Build hardening context, carried into the selection summary line.
/// Informational only; never changes what gets instrumented.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardenMode {
    /// Hardened build
    Hardened,
    /// ASAN/MSAN-style sanitized build
    Sanitized,
    /// Plain build
    NonHardened,
}

impl fmt::Display for HardenMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Hardened => write!(f, "hardened"),
            Self::Sanitized => write!(f, "ASAN/MSAN"),
            Self::NonHardened => write!(f, "non-hardened"),
        }
    }
}

/// What a finished selection pass did, for reporting and for tests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSummary {
    /// Sites that received a trace call.
    pub instrumented: usize,
    /// Eligible sites skipped by the ratio draw.
    pub skipped: usize,
    /// The configured instrumentation ratio, in percent.
    pub inst_ratio: u32,
    /// Hardening context of the build.
    pub mode: HardenMode,
}

/// Per-pass site selection state: the seeded generator, the instrumentation
/// ratio and the running site counts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteSelector<R = StdRand> {
    rand: R,
    inst_ratio: u32,
    loc_space: u32,
    instrumented: usize,
    skipped: usize,
}

impl SiteSelector<StdRand> {
    /// Creates a selector over the default 2^16 location space.
    ///
    /// `inst_ratio` is the percentage of eligible sites to instrument. Values
    /// outside `[1, 100]` are a configuration error and are rejected here,
    /// before any site is processed.
    pub fn new(seed: u64, inst_ratio: u32) -> Result<Self, Error> {
        Self::with_loc_space(seed, inst_ratio, DEFAULT_LOC_SPACE)
    }

    /// Creates a selector drawing location ids from `0..loc_space`.
    pub fn with_loc_space(seed: u64, inst_ratio: u32, loc_space: u32) -> Result<Self, Error> {
        Self::from_rand(StdRand::with_seed(seed), inst_ratio, loc_space)
    }
}

impl<R> SiteSelector<R>
where
    R: Rand,
{
    /// Creates a selector from an already-seeded generator.
    pub fn from_rand(rand: R, inst_ratio: u32, loc_space: u32) -> Result<Self, Error> {
        if !(1..=100).contains(&inst_ratio) {
            return Err(Error::illegal_argument(format!(
                "bad instrumentation ratio {inst_ratio} (must be between 1 and 100)"
            )));
        }
        if loc_space == 0 || !loc_space.is_power_of_two() {
            return Err(Error::illegal_argument(format!(
                "location space {loc_space} is not a power of two"
            )));
        }
        Ok(Self {
            rand,
            inst_ratio,
            loc_space,
            instrumented: 0,
            skipped: 0,
        })
    }

    /// Decides one eligible site.
    ///
    /// Returns the location id to bake into the site if it is instrumented,
    /// `None` if the ratio draw skipped it. A skipped site consumes only the
    /// inclusion draw, so skipping does not leave "holes" that would
    /// reshuffle every later assignment relative to the original scheme.
    pub fn next_site(&mut self) -> Option<u32> {
        if self.rand.below(100) as u32 >= self.inst_ratio {
            self.skipped += 1;
            return None;
        }
        let cur_loc = self.rand.below(u64::from(self.loc_space)) as u32;
        self.instrumented += 1;
        Some(cur_loc)
    }

    /// Sites instrumented so far.
    #[must_use]
    pub fn instrumented(&self) -> usize {
        self.instrumented
    }

    /// Eligible sites skipped so far.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// The configured instrumentation ratio, in percent.
    #[must_use]
    pub fn inst_ratio(&self) -> u32 {
        self.inst_ratio
    }

    /// Wraps up the pass: logs what happened and returns the counts.
    ///
    /// Zero instrumented sites is not an error, the artifact just carries no
    /// coverage feedback; it is reported as a warning. Quiet builds simply
    /// configure their logger to drop these records.
    #[must_use = "the summary carries the instrumented-site counts"]
    pub fn summary(&self, mode: HardenMode) -> SelectionSummary {
        let summary = SelectionSummary {
            instrumented: self.instrumented,
            skipped: self.skipped,
            inst_ratio: self.inst_ratio,
            mode,
        };
        if summary.instrumented == 0 {
            log::warn!("No instrumentation targets found.");
        } else {
            log::info!(
                "Instrumented {} locations ({} mode, ratio {}%).",
                summary.instrumented,
                summary.mode,
                summary.inst_ratio
            );
        }
        summary
    }
}
