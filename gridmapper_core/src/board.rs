use serde::{Deserialize, Serialize};

use crate::error::{invalid, Result};

/// Number of tiles on the board.
pub const TILE_COUNT: usize = 25;
/// Tiles per row when the board is rendered as a square.
pub const BOARD_SIDE: usize = 5;

/// Sorted set of mine positions, each in `0..TILE_COUNT`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct MineLayout(Vec<u8>);

impl MineLayout {
    /// Build a layout from tiles in any order. Rejects out-of-range and repeated tiles.
    pub fn new(tiles: impl IntoIterator<Item = u8>) -> Result<Self> {
        let mut tiles: Vec<u8> = tiles.into_iter().collect();
        if tiles.len() > TILE_COUNT {
            return Err(invalid(format!(
                "layout has {} tiles, board only has {TILE_COUNT}",
                tiles.len()
            )));
        }
        if let Some(t) = tiles.iter().find(|&&t| t as usize >= TILE_COUNT) {
            return Err(invalid(format!("tile {t} is outside 0..{TILE_COUNT}")));
        }
        tiles.sort_unstable();
        if let Some(w) = tiles.windows(2).find(|w| w[0] == w[1]) {
            return Err(invalid(format!("tile {} appears more than once", w[0])));
        }
        Ok(Self(tiles))
    }

    /// Caller guarantees the tiles are distinct and in range.
    pub(crate) fn from_distinct(mut tiles: Vec<u8>) -> Self {
        tiles.sort_unstable();
        Self(tiles)
    }

    pub fn tiles(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tile: u8) -> bool {
        self.0.binary_search(&tile).is_ok()
    }

    /// Rows of the 5x5 board, `true` where a mine sits.
    pub fn grid(&self) -> [[bool; BOARD_SIDE]; BOARD_SIDE] {
        let mut grid = [[false; BOARD_SIDE]; BOARD_SIDE];
        for &t in &self.0 {
            let t = t as usize;
            grid[t / BOARD_SIDE][t % BOARD_SIDE] = true;
        }
        grid
    }
}

impl TryFrom<Vec<u8>> for MineLayout {
    type Error = crate::Error;

    fn try_from(tiles: Vec<u8>) -> Result<Self> {
        Self::new(tiles)
    }
}

impl From<MineLayout> for Vec<u8> {
    fn from(layout: MineLayout) -> Self {
        layout.0
    }
}

impl std::fmt::Display for MineLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

pub(crate) fn check_mine_count(mine_count: usize) -> Result<()> {
    if mine_count > TILE_COUNT {
        return Err(invalid(format!(
            "mine count {mine_count} is outside 0..={TILE_COUNT}"
        )));
    }
    Ok(())
}

/// A round the player committed to: the nonce it was played under and the tiles marked as mines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRound {
    mine_count: usize,
    nonce: u64,
    selected_tiles: MineLayout,
}

impl SavedRound {
    pub fn new(mine_count: usize, nonce: u64, selected_tiles: MineLayout) -> Result<Self> {
        check_mine_count(mine_count)?;
        if selected_tiles.len() != mine_count {
            return Err(invalid(format!(
                "round at nonce {nonce} marks {} tiles but has {mine_count} mines",
                selected_tiles.len()
            )));
        }
        Ok(Self {
            mine_count,
            nonce,
            selected_tiles,
        })
    }

    pub fn mine_count(&self) -> usize {
        self.mine_count
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn selected_tiles(&self) -> &MineLayout {
        &self.selected_tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_sorted() {
        let layout = MineLayout::new([24, 3, 11]).unwrap();
        assert_eq!(layout.tiles(), &[3, 11, 24]);
        assert!(layout.contains(11));
        assert!(!layout.contains(12));
    }

    #[test]
    fn layout_rejects_bad_tiles() {
        assert!(MineLayout::new([25]).is_err());
        assert!(MineLayout::new([4, 7, 4]).is_err());
        assert!(MineLayout::new(0..26).is_err());
    }

    #[test]
    fn grid_is_row_major() {
        let grid = MineLayout::new([0, 6, 24]).unwrap().grid();
        assert!(grid[0][0]);
        assert!(grid[1][1]);
        assert!(grid[4][4]);
        assert_eq!(grid.iter().flatten().filter(|&&m| m).count(), 3);
    }

    #[test]
    fn saved_round_needs_matching_count() {
        let tiles = MineLayout::new([1, 2]).unwrap();
        assert!(SavedRound::new(2, 0, tiles.clone()).is_ok());
        assert!(SavedRound::new(3, 0, tiles.clone()).is_err());
        assert!(SavedRound::new(26, 0, tiles).is_err());
    }
}
