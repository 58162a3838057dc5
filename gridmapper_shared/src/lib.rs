use std::io::Read;

use chrono::{DateTime, Utc};
use gridmapper_core::{MineLayout, SavedRound, SearchOutcome};
use serde::{Deserialize, Serialize};

/// A saved round as the front end stores it. Integers are unchecked until [`RoundRecord::into_round`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRecord {
    pub mines: i64,
    pub nonce: i64,
    pub selected_tiles: Vec<i64>,
}

impl RoundRecord {
    pub fn into_round(self) -> RecordResult<SavedRound> {
        let invalid =
            |msg: String| RecordError::Invalid(gridmapper_core::Error::InvalidParameter(msg));
        let mines = usize::try_from(self.mines)
            .map_err(|_| invalid(format!("mine count {} is negative", self.mines)))?;
        let nonce = u64::try_from(self.nonce)
            .map_err(|_| invalid(format!("nonce {} is negative", self.nonce)))?;
        let tiles = self
            .selected_tiles
            .iter()
            .map(|&t| u8::try_from(t).map_err(|_| invalid(format!("tile {t} is out of range"))))
            .collect::<RecordResult<Vec<u8>>>()?;
        Ok(SavedRound::new(mines, nonce, MineLayout::new(tiles)?)?)
    }
}

impl From<&SavedRound> for RoundRecord {
    fn from(round: &SavedRound) -> Self {
        Self {
            mines: round.mine_count() as i64,
            nonce: round.nonce() as i64,
            selected_tiles: round
                .selected_tiles()
                .tiles()
                .iter()
                .map(|&t| i64::from(t))
                .collect(),
        }
    }
}

/// Parses a JSON array of round records and validates every entry.
pub fn parse_rounds(json: &str) -> RecordResult<Vec<SavedRound>> {
    let records: Vec<RoundRecord> = serde_json::from_str(json)?;
    records.into_iter().map(RoundRecord::into_round).collect()
}

pub fn load_rounds<R: Read>(reader: R) -> RecordResult<Vec<SavedRound>> {
    let records: Vec<RoundRecord> = serde_json::from_reader(reader)?;
    records.into_iter().map(RoundRecord::into_round).collect()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Found,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SearchReport {
    pub client_seed: String,
    pub status: SearchStatus,
    pub attempts: u64,
    pub server_seed: Option<String>,
    pub server_seed_hash: Option<String>,
    pub layout: Option<Vec<u8>>,
    pub finished_at: DateTime<Utc>,
}

impl SearchReport {
    pub fn from_outcome(
        client_seed: &str,
        outcome: &SearchOutcome,
        finished_at: DateTime<Utc>,
    ) -> Self {
        match outcome {
            SearchOutcome::Found {
                server_seed,
                attempts,
                layout,
            } => Self {
                client_seed: client_seed.to_string(),
                status: SearchStatus::Found,
                attempts: *attempts,
                server_seed: Some(server_seed.clone()),
                server_seed_hash: Some(gridmapper_core::derive_hash_hex(server_seed.as_bytes())),
                layout: layout.as_ref().map(|l| l.tiles().to_vec()),
                finished_at,
            },
            SearchOutcome::Cancelled { attempts } => Self {
                client_seed: client_seed.to_string(),
                status: SearchStatus::Cancelled,
                attempts: *attempts,
                server_seed: None,
                server_seed_hash: None,
                layout: None,
                finished_at,
            },
        }
    }
}

/// Derived mines next to the tiles a player picked.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RevealReport {
    pub mines: Vec<u8>,
    /// Picked tiles that hold a mine.
    pub hits: Vec<u8>,
    /// Picked tiles that are safe.
    pub misses: Vec<u8>,
}

impl RevealReport {
    pub fn new(mines: &MineLayout, picks: &MineLayout) -> Self {
        let (hits, misses): (Vec<u8>, Vec<u8>) = picks.tiles().iter().partition(|&&t| mines.contains(t));
        Self {
            mines: mines.tiles().to_vec(),
            hits,
            misses,
        }
    }
}

/// One line of a verification export.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VerifyRow {
    pub nonce: u64,
    pub mines: usize,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("malformed rounds file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] gridmapper_core::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;
