//! Rating updates applied when a ranked duel finalizes.

use shared::{PlayerId, Winner};

pub const DEFAULT_K_FACTOR: f64 = 32.0;
pub const MIN_RATING: i32 = 0;
pub const MAX_RATING: i32 = 4000;

/// Bounds a rating reported by a client.
pub fn clamp_rating(rating: i32) -> i32 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

/// Computes the rating change of each player of a finished ranked duel.
pub trait RatingStrategy: Send + Sync {
    /// `players` holds `(id, rating before the match)` for both duelists.
    fn deltas(&self, players: &[(PlayerId, i32)], winner: Winner) -> Vec<(PlayerId, i32)>;
}

/// Fixed-K Elo update.
#[derive(Debug, Clone, Copy)]
pub struct EloRating {
    k_factor: f64,
}

impl EloRating {
    pub fn new(k_factor: f64) -> Self {
        Self { k_factor }
    }

    /// Expected score for a player rated `rating` against `opponent`.
    pub fn expected_score(rating: i32, opponent: i32) -> f64 {
        1.0 / (1.0 + 10_f64.powf((f64::from(opponent) - f64::from(rating)) / 400.0))
    }

    /// `actual` is 1.0 for a win, 0.5 for a draw and 0.0 for a loss.
    pub fn rating_change(&self, rating: i32, opponent: i32, actual: f64) -> i32 {
        let expected = Self::expected_score(rating, opponent);
        (self.k_factor * (actual - expected)).round() as i32
    }
}

impl Default for EloRating {
    fn default() -> Self {
        Self::new(DEFAULT_K_FACTOR)
    }
}

impl RatingStrategy for EloRating {
    fn deltas(&self, players: &[(PlayerId, i32)], winner: Winner) -> Vec<(PlayerId, i32)> {
        let [(a, rating_a), (b, rating_b)] = match players {
            [first, second] => [*first, *second],
            _ => return Vec::new(),
        };

        let (actual_a, actual_b) = match winner {
            Winner::Player(id) if id == a => (1.0, 0.0),
            Winner::Player(id) if id == b => (0.0, 1.0),
            Winner::Draw => (0.5, 0.5),
            _ => return Vec::new(),
        };

        vec![
            (a, self.rating_change(rating_a, rating_b, actual_a)),
            (b, self.rating_change(rating_b, rating_a, actual_b)),
        ]
    }
}
