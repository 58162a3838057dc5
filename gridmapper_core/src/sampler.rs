use crate::{
    board::{check_mine_count, MineLayout, TILE_COUNT},
    error::Result,
    rng::{FloatStream, RngParams},
};

/// Draws `mine_count` distinct tiles from the stream, weighted sampling without replacement.
///
/// Each float picks a slot among the tiles still in the pool. The pool keeps its order after
/// every removal, so later draws index into the same sequence a verifier would see.
/// A zero count never touches the stream.
pub fn sample_positions(floats: &mut FloatStream, mine_count: usize) -> Result<MineLayout> {
    check_mine_count(mine_count)?;
    let mut pool: Vec<u8> = (0..TILE_COUNT as u8).collect();
    let mut picked = Vec::with_capacity(mine_count);
    for i in 0..mine_count {
        let remaining = TILE_COUNT - i;
        let f = floats.next_float();
        // f < 1, so the slot is always below `remaining`
        let slot = (f * remaining as f64).floor() as usize;
        picked.push(pool.remove(slot));
    }
    Ok(MineLayout::from_distinct(picked))
}

/// Mine layout for the given seeds and nonce.
pub fn derive_positions(params: &RngParams, mine_count: usize) -> Result<MineLayout> {
    check_mine_count(mine_count)?;
    let mut floats = params.floats()?;
    sample_positions(&mut floats, mine_count)
}
