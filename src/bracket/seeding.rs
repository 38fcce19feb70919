// Standard tournament seeding onto a power-of-two bracket.

use crate::error::EngineError;

/// Smallest power of two that holds `entrant_count` entrants (at least 2).
pub fn bracket_size(entrant_count: usize) -> usize {
    entrant_count.next_power_of_two().max(2)
}

/// Number of elimination rounds for a bracket: `ceil(log2(entrant_count))`.
pub fn rounds_for(entrant_count: usize) -> u32 {
    bracket_size(entrant_count).trailing_zeros()
}

/// Seed (0-indexed) occupying each slot of a bracket of `size` slots.
///
/// Built by repeated doubling: every seed `s` already placed is followed by
/// its mirror `2n - 1 - s` in the doubled bracket. Slots `2i` and `2i + 1`
/// meet in round 1, seed `i` always meets seed `size - 1 - i` there, and the
/// top two seeds land in opposite halves so they can only meet in the final.
pub fn seed_order(size: usize) -> Vec<usize> {
    let mut order = vec![0];
    while order.len() < size {
        let doubled = order.len() * 2;
        order = order
            .iter()
            .flat_map(|&s| [s, doubled - 1 - s])
            .collect();
    }
    order
}

/// Map ranked entrants (index 0 = top seed) onto bracket slots. Empty slots
/// (`None`) are byes.
pub fn seed_slots(entrants: &[i64]) -> Result<Vec<Option<i64>>, EngineError> {
    if entrants.len() < 2 {
        return Err(EngineError::invalid_input(format!(
            "a bracket needs at least 2 entrants, got {}",
            entrants.len()
        )));
    }

    let size = bracket_size(entrants.len());
    Ok(seed_order(size)
        .into_iter()
        .map(|seed| entrants.get(seed).copied())
        .collect())
}
