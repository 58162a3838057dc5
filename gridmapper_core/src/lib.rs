pub mod board;
pub mod error;
pub mod rng;
pub mod sampler;
pub mod search;

pub use crate::board::{MineLayout, SavedRound, BOARD_SIDE, TILE_COUNT};
pub use crate::error::{Error, Result};
pub use crate::rng::{bytes_to_float, derive_hash_hex, ByteStream, FloatStream, RngParams};
pub use crate::sampler::{derive_positions, sample_positions};
pub use crate::search::{
    CancelToken, CandidateSource, EngineState, OsSeedSource, SearchEngine, SearchEvent,
    SearchOutcome, SearchTarget, DEFAULT_YIELD_EVERY,
};
