//! Brute-force search for a server seed that reproduces known mine layouts.
//!
//! The loop is cooperative: it checks a [`CancelToken`] once per attempt and yields to the
//! tokio scheduler every `yield_every` attempts, emitting a progress event at the same point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::{
    board::{check_mine_count, MineLayout, SavedRound},
    error::{invalid, Error, Result},
    rng::RngParams,
    sampler::derive_positions,
};

pub const DEFAULT_YIELD_EVERY: u64 = 500;

/// Supplies candidate server seeds.
pub trait CandidateSource {
    fn next_candidate(&mut self) -> String;
}

impl<F> CandidateSource for F
where
    F: FnMut() -> String,
{
    fn next_candidate(&mut self) -> String {
        self()
    }
}

/// 32 bytes from the operating system RNG, hex encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSeedSource;

impl CandidateSource for OsSeedSource {
    fn next_candidate(&mut self) -> String {
        let mut buf = [0u8; 32];
        OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

/// Shared cancellation flag. Cloning hands out another handle to the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// One layout seen at a known nonce.
    Single {
        nonce: u64,
        mine_count: usize,
        layout: MineLayout,
    },
    /// Several rounds that all came from the same server seed.
    Rounds(Vec<SavedRound>),
}

impl SearchTarget {
    pub fn single(nonce: u64, mine_count: usize, layout: MineLayout) -> Result<Self> {
        let target = Self::Single {
            nonce,
            mine_count,
            layout,
        };
        target.validate()?;
        Ok(target)
    }

    pub fn rounds(rounds: Vec<SavedRound>) -> Result<Self> {
        let target = Self::Rounds(rounds);
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Single {
                mine_count, layout, ..
            } => {
                check_mine_count(*mine_count)?;
                if layout.len() != *mine_count {
                    return Err(invalid(format!(
                        "target layout has {} tiles but {mine_count} mines",
                        layout.len()
                    )));
                }
                Ok(())
            }
            Self::Rounds(rounds) if rounds.is_empty() => Err(invalid("no saved rounds to match")),
            Self::Rounds(_) => Ok(()),
        }
    }

    /// Whether `server_seed` reproduces the target.
    ///
    /// Round targets stop at the first round that disagrees.
    pub fn matches(&self, server_seed: &str, client_seed: &str) -> Result<bool> {
        match self {
            Self::Single {
                nonce,
                mine_count,
                layout,
            } => {
                let params = RngParams::new(server_seed, client_seed, *nonce)?;
                Ok(derive_positions(&params, *mine_count)? == *layout)
            }
            Self::Rounds(rounds) => {
                for round in rounds {
                    let params = RngParams::new(server_seed, client_seed, round.nonce())?;
                    if derive_positions(&params, round.mine_count())? != *round.selected_tiles() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// The layout a match is reported with; round targets have none.
    fn found_layout(&self) -> Option<MineLayout> {
        match self {
            Self::Single { layout, .. } => Some(layout.clone()),
            Self::Rounds(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchEvent {
    Progress {
        attempts: u64,
    },
    Found {
        server_seed: String,
        attempts: u64,
        layout: Option<MineLayout>,
    },
    Cancelled {
        attempts: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found {
        server_seed: String,
        attempts: u64,
        /// The matched layout, single-target searches only.
        layout: Option<MineLayout>,
    },
    Cancelled {
        attempts: u64,
    },
}

impl SearchOutcome {
    pub fn attempts(&self) -> u64 {
        match self {
            Self::Found { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

impl From<&SearchOutcome> for SearchEvent {
    fn from(outcome: &SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Found {
                server_seed,
                attempts,
                layout,
            } => SearchEvent::Found {
                server_seed: server_seed.clone(),
                attempts: *attempts,
                layout: layout.clone(),
            },
            SearchOutcome::Cancelled { attempts } => SearchEvent::Cancelled {
                attempts: *attempts,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Searching,
}

/// Runs at most one search at a time.
#[derive(Debug)]
pub struct SearchEngine {
    searching: AtomicBool,
    yield_every: u64,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Puts the engine back to idle however the search ends, including a dropped future.
struct ActiveSearch<'a>(&'a AtomicBool);

impl Drop for ActiveSearch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SearchEngine {
    pub fn new() -> Self {
        Self::with_yield_every(DEFAULT_YIELD_EVERY)
    }

    pub fn with_yield_every(yield_every: u64) -> Self {
        Self {
            searching: AtomicBool::new(false),
            yield_every: yield_every.max(1),
        }
    }

    pub fn yield_every(&self) -> u64 {
        self.yield_every
    }

    pub fn state(&self) -> EngineState {
        if self.searching.load(Ordering::Acquire) {
            EngineState::Searching
        } else {
            EngineState::Idle
        }
    }

    fn begin(&self) -> Result<ActiveSearch<'_>> {
        self.searching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::SearchInProgress)?;
        Ok(ActiveSearch(&self.searching))
    }

    /// Pulls candidates until one satisfies `target` or `cancel` is raised.
    ///
    /// Any error while deriving a candidate's layout ends the whole search.
    pub async fn search<S>(
        &self,
        client_seed: &str,
        target: &SearchTarget,
        source: &mut S,
        cancel: &CancelToken,
        events: Option<&UnboundedSender<SearchEvent>>,
    ) -> Result<SearchOutcome>
    where
        S: CandidateSource + ?Sized,
    {
        let _active = self.begin()?;
        if client_seed.is_empty() {
            return Err(invalid("client seed is empty"));
        }
        target.validate()?;

        let emit = |event: SearchEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        debug!(client_seed, yield_every = self.yield_every, "seed search started");
        let mut attempts = 0u64;
        loop {
            if cancel.is_cancelled() {
                info!(attempts, "seed search cancelled");
                let outcome = SearchOutcome::Cancelled { attempts };
                emit(SearchEvent::from(&outcome));
                return Ok(outcome);
            }

            let candidate = source.next_candidate();
            attempts += 1;
            if target.matches(&candidate, client_seed)? {
                info!(attempts, "seed search found a match");
                let outcome = SearchOutcome::Found {
                    server_seed: candidate,
                    attempts,
                    layout: target.found_layout(),
                };
                emit(SearchEvent::from(&outcome));
                return Ok(outcome);
            }

            if attempts % self.yield_every == 0 {
                debug!(attempts, "seed search progress");
                emit(SearchEvent::Progress { attempts });
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn layout_for(server: &str, client: &str, nonce: u64, mines: usize) -> MineLayout {
        derive_positions(&RngParams::new(server, client, nonce).unwrap(), mines).unwrap()
    }

    fn round_for(server: &str, client: &str, nonce: u64, mines: usize) -> SavedRound {
        SavedRound::new(mines, nonce, layout_for(server, client, nonce, mines)).unwrap()
    }

    #[tokio::test]
    async fn own_seed_matches_on_first_attempt() {
        let seed = OsSeedSource.next_candidate();
        let layout = layout_for(&seed, "client", 3, 5);
        let target = SearchTarget::single(3, 5, layout.clone()).unwrap();
        let engine = SearchEngine::new();
        let mut source = {
            let seed = seed.clone();
            move || seed.clone()
        };
        let outcome = engine
            .search("client", &target, &mut source, &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Found {
                server_seed: seed,
                attempts: 1,
                layout: Some(layout),
            }
        );
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn attempts_count_every_candidate() {
        let target =
            SearchTarget::single(1, 3, MineLayout::new([13, 16, 24]).unwrap()).unwrap();
        let mut candidates = vec!["first", "second", "abc"].into_iter();
        let mut source = || candidates.next().unwrap_or("unused").to_string();
        let outcome = SearchEngine::new()
            .search("xproject", &target, &mut source, &CancelToken::new(), None)
            .await
            .unwrap();
        assert!(outcome.is_found());
        assert_eq!(outcome.attempts(), 3);
    }

    #[tokio::test]
    async fn rounds_must_all_match() {
        let rounds = vec![
            round_for("abc", "client", 1, 3),
            round_for("abc", "client", 2, 3),
            round_for("abc", "client", 3, 3),
        ];
        let all = SearchTarget::rounds(rounds.clone()).unwrap();
        assert!(all.matches("abc", "client").unwrap());

        let mut mixed = rounds[..2].to_vec();
        mixed.push(round_for("other-seed", "client", 3, 3));
        assert_ne!(
            mixed[2].selected_tiles(),
            round_for("abc", "client", 3, 3).selected_tiles()
        );
        let mixed = SearchTarget::rounds(mixed).unwrap();
        assert!(!mixed.matches("abc", "client").unwrap());

        // The candidate satisfies two of three rounds, then the search is called off.
        let cancel = CancelToken::new();
        let mut source = {
            let cancel = cancel.clone();
            move || {
                cancel.cancel();
                "abc".to_string()
            }
        };
        let outcome = SearchEngine::new()
            .search("client", &mixed, &mut source, &cancel, None)
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled { attempts: 1 });
    }

    #[tokio::test]
    async fn rounds_search_finds_shared_seed() {
        let rounds = vec![round_for("abc", "client", 1, 4), round_for("abc", "client", 9, 2)];
        let target = SearchTarget::rounds(rounds).unwrap();
        let mut candidates = vec!["nope", "abc"].into_iter();
        let mut source = || candidates.next().unwrap_or("unused").to_string();
        let outcome = SearchEngine::new()
            .search("client", &target, &mut source, &CancelToken::new(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::Found {
                server_seed: "abc".into(),
                attempts: 2,
                layout: None,
            }
        );
    }

    #[tokio::test]
    async fn cancel_before_start_reports_zero_attempts() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        cancel.cancel();
        let target = SearchTarget::single(0, 1, MineLayout::new([0]).unwrap()).unwrap();
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            "seed".to_string()
        };
        let outcome = SearchEngine::new()
            .search("client", &target, &mut source, &cancel, Some(&tx))
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled { attempts: 0 });
        assert_eq!(calls, 0);
        assert_eq!(rx.recv().await, Some(SearchEvent::Cancelled { attempts: 0 }));
    }

    #[tokio::test]
    async fn progress_is_reported_at_yield_points() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        // None of seed-1..seed-5 puts its single mine on tile 0.
        let target = SearchTarget::single(0, 1, MineLayout::new([0]).unwrap()).unwrap();
        let mut n = 0;
        let mut source = {
            let cancel = cancel.clone();
            move || {
                n += 1;
                if n == 5 {
                    cancel.cancel();
                }
                format!("seed-{n}")
            }
        };
        let outcome = SearchEngine::with_yield_every(2)
            .search("client", &target, &mut source, &cancel, Some(&tx))
            .await
            .unwrap();
        assert_eq!(outcome, SearchOutcome::Cancelled { attempts: 5 });

        drop(tx);
        let mut events = Vec::new();
        while let Some(e) = rx.recv().await {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                SearchEvent::Progress { attempts: 2 },
                SearchEvent::Progress { attempts: 4 },
                SearchEvent::Cancelled { attempts: 5 },
            ]
        );
    }

    #[tokio::test]
    async fn second_search_is_rejected_while_busy() {
        let engine = SearchEngine::with_yield_every(1);
        let cancel = CancelToken::new();
        let target = SearchTarget::single(0, 0, MineLayout::default()).unwrap();
        // candidate-1 lands on [2, 16], so the first search is still running after one attempt.
        let busy_target = SearchTarget::single(0, 2, MineLayout::new([0, 1]).unwrap()).unwrap();
        let mut n = 0u64;
        let mut first_source = || {
            n += 1;
            format!("candidate-{n}")
        };
        let mut second_source = || "abc".to_string();

        let first = engine.search("client", &busy_target, &mut first_source, &cancel, None);
        let second = async {
            let r = engine
                .search("client", &target, &mut second_source, &CancelToken::new(), None)
                .await;
            cancel.cancel();
            r
        };
        let (first, second) = tokio::join!(first, second);
        assert_eq!(second, Err(Error::SearchInProgress));
        assert_eq!(first, Ok(SearchOutcome::Cancelled { attempts: 1 }));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn bad_candidate_aborts_search() {
        let engine = SearchEngine::new();
        let target = SearchTarget::single(0, 1, MineLayout::new([0]).unwrap()).unwrap();
        let mut source = String::new;
        let result = engine
            .search("client", &target, &mut source, &CancelToken::new(), None)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn invalid_targets_never_pull_candidates() {
        let mut calls = 0;
        let mut source = || {
            calls += 1;
            "seed".to_string()
        };
        let engine = SearchEngine::new();
        let empty = SearchTarget::Rounds(Vec::new());
        let result = engine
            .search("client", &empty, &mut source, &CancelToken::new(), None)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        let short = SearchTarget::Single {
            nonce: 0,
            mine_count: 3,
            layout: MineLayout::new([1]).unwrap(),
        };
        let result = engine
            .search("client", &short, &mut source, &CancelToken::new(), None)
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(calls, 0);
    }
}
