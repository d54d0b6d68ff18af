//! Configuration knobs for building, solving and simulating a layer model.
//!
//! Each stage takes its own struct; all of them serialise with serde so the
//! model folder can record the parameters it was built with.

use serde::{Deserialize, Serialize};

use crate::engine::BOARD_SIZES;

/// Exponents are stored in a nibble and merging needs one spare value.
pub const MAX_SUPPORTED_EXPONENT: u8 = 14;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("bad state board size: {0}")]
    UnsupportedBoardSize(usize),
    #[error("bad state array size: {0}")]
    UnsupportedStateArraySize(usize),
    #[error("tile exponent out of range: {0}")]
    TileOutOfRange(u8),
    #[error("max exponent {0} outside 2..=14")]
    MaxExponentOutOfRange(u8),
    #[error("discount must be in (0, 1], got {0}")]
    InvalidDiscount(f64),
    #[error("tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
    #[error("{0} must be positive")]
    ZeroParameter(&'static str),
}

/// Identity of a layer model: the game being solved.
///
/// - `board_size`: board edge, 2 to 4.
/// - `max_exponent`: the game is won on reaching a tile of `2^max_exponent`.
/// - `max_depth`: horizon of the terminal resolver, in moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelConfig {
    pub board_size: usize,
    pub max_exponent: u8,
    pub max_depth: u8,
}

impl ModelConfig {
    pub fn new(board_size: usize, max_exponent: u8, max_depth: u8) -> Result<Self, ConfigError> {
        let config = Self { board_size, max_exponent, max_depth };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !BOARD_SIZES.contains(&self.board_size) {
            return Err(ConfigError::UnsupportedBoardSize(self.board_size));
        }
        if !(2..=MAX_SUPPORTED_EXPONENT).contains(&self.max_exponent) {
            return Err(ConfigError::MaxExponentOutOfRange(self.max_exponent));
        }
        Ok(())
    }

    /// Folder name for this model, e.g. `board_size-2.max_exponent-5.max_depth-0`.
    pub fn folder_name(&self) -> String {
        format!(
            "board_size-{}.max_exponent-{}.max_depth-{}",
            self.board_size, self.max_exponent, self.max_depth
        )
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { board_size: 2, max_exponent: 5, max_depth: 0 }
    }
}

/// Terminal resolver strategy. All strategies classify states identically
/// where they classify them at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ResolverStrategy {
    /// Full AND/OR search to the horizon.
    #[default]
    Exact,
    /// Exact search that gives up after `max_expansions` nodes per query.
    Bounded { max_expansions: u64 },
    /// Search that leaves spawned tile values undecided until they matter.
    UnknownZeros,
}

/// Knobs for the layer builder.
///
/// - `max_states`: states a tranche worker holds per output part before it
///   flushes a fragment.
/// - `partitions`: upper bound on tranche tasks per input part.
/// - `threads`: worker threads (0 means available parallelism).
/// - `index_stride`: states between index entries in compacted parts.
/// - `resolver_cache_size`: per-worker LRU capacity for resolver answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub max_states: usize,
    pub partitions: usize,
    pub threads: usize,
    pub index_stride: usize,
    pub resolver_cache_size: usize,
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_states == 0 {
            return Err(ConfigError::ZeroParameter("max_states"));
        }
        if self.partitions == 0 {
            return Err(ConfigError::ZeroParameter("partitions"));
        }
        if self.index_stride == 0 {
            return Err(ConfigError::ZeroParameter("index_stride"));
        }
        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_states: 1 << 20,
            partitions: 8,
            threads: 0,
            index_stride: 1 << 14,
            resolver_cache_size: 1 << 16,
        }
    }
}

/// Knobs for the layer solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Per-move discount factor.
    pub discount: f64,
    /// Actions within this much of the best Q value are recorded as alternates.
    pub alternate_action_tolerance: f64,
    /// Also write the full action-value table for each part.
    pub write_q_values: bool,
    /// Per-thread LRU capacity for resolver answers.
    pub value_cache_size: usize,
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.discount > 0.0 && self.discount <= 1.0) {
            return Err(ConfigError::InvalidDiscount(self.discount));
        }
        if !(self.alternate_action_tolerance.is_finite() && self.alternate_action_tolerance >= 0.0) {
            return Err(ConfigError::InvalidTolerance(self.alternate_action_tolerance));
        }
        Ok(())
    }

    /// Folder name for a solution, e.g. `discount-0.99.tolerance-1e-6`.
    pub fn folder_name(&self) -> String {
        format!("discount-{}.tolerance-{:e}", self.discount, self.alternate_action_tolerance)
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            discount: 1.0,
            alternate_action_tolerance: 1e-9,
            write_q_values: false,
            value_cache_size: 1 << 14,
        }
    }
}

/// Knobs for the policy simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub batch_size: usize,
    pub batches: usize,
    pub seed: u64,
    /// Pick uniformly among alternate actions instead of always the primary one.
    pub use_alternate_actions: bool,
    /// Solved parts each batch keeps in memory.
    pub policy_cache_size: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            batches: 1,
            seed: 42,
            use_alternate_actions: false,
            policy_cache_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_validation() {
        assert!(ModelConfig::new(2, 5, 0).is_ok());
        assert_eq!(ModelConfig::new(5, 5, 0), Err(ConfigError::UnsupportedBoardSize(5)));
        assert_eq!(ModelConfig::new(1, 5, 0), Err(ConfigError::UnsupportedBoardSize(1)));
        assert_eq!(ModelConfig::new(4, 15, 0), Err(ConfigError::MaxExponentOutOfRange(15)));
    }

    #[test]
    fn folder_names() {
        let m = ModelConfig::new(3, 6, 1).unwrap();
        assert_eq!(m.folder_name(), "board_size-3.max_exponent-6.max_depth-1");
        let s = SolverConfig { discount: 0.99, alternate_action_tolerance: 1e-6, ..Default::default() };
        assert_eq!(s.folder_name(), "discount-0.99.tolerance-1e-6");
    }

    #[test]
    fn solver_config_validation() {
        let mut s = SolverConfig::default();
        assert!(s.validate().is_ok());
        s.discount = 0.0;
        assert!(matches!(s.validate(), Err(ConfigError::InvalidDiscount(_))));
        s.discount = 0.9;
        s.alternate_action_tolerance = f64::NAN;
        assert!(matches!(s.validate(), Err(ConfigError::InvalidTolerance(_))));
    }
}
