//! Round scoring.
//!
//! A correct answer earns `base_points` plus an optional speed bonus of
//! `speed_bonus * (limit - elapsed) / limit`, computed in whole milliseconds
//! and rounded down. Incorrect and missing answers earn nothing. Points depend
//! only on the question and the answer itself, so scoring a round gives the
//! same result whatever order the answers arrived in.

use crate::result::{Answer, ScoredAnswer};
use shared::Question;

pub const DEFAULT_BASE_POINTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRule {
    pub base_points: u32,
    pub speed_bonus: u32,
}

impl Default for ScoringRule {
    fn default() -> Self {
        Self {
            base_points: DEFAULT_BASE_POINTS,
            speed_bonus: 0,
        }
    }
}

impl ScoringRule {
    pub fn new(base_points: u32, speed_bonus: u32) -> Self {
        Self {
            base_points,
            speed_bonus,
        }
    }

    /// Points for one answer to `question`.
    pub fn points_for(&self, question: &Question, answer: &Answer) -> u32 {
        let correct = answer.choice.map_or(false, |c| question.is_correct(c));
        if !correct {
            return 0;
        }

        let limit = question.time_limit_ms.max(1);
        let remaining = limit.saturating_sub(answer.elapsed_ms);
        let bonus = u64::from(self.speed_bonus) * remaining / limit;

        self.base_points
            .saturating_add(u32::try_from(bonus).unwrap_or(u32::MAX))
    }

    /// Scores a closed round. The returned answers are ordered by player id.
    pub fn score_round(&self, question: &Question, answers: &[Answer]) -> Vec<ScoredAnswer> {
        let mut scored: Vec<ScoredAnswer> = answers
            .iter()
            .map(|answer| ScoredAnswer {
                correct: answer.choice.map_or(false, |c| question.is_correct(c)),
                points: self.points_for(question, answer),
                answer: answer.clone(),
            })
            .collect();

        scored.sort_by_key(|s| s.answer.player_id);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Difficulty;

    fn question() -> Question {
        Question {
            text: "2 + 2?".into(),
            choices: vec!["3".into(), "4".into(), "5".into(), "22".into()],
            correct_choice: 1,
            time_limit_ms: 10_000,
            difficulty: Difficulty::Easy,
            category: "Math".into(),
        }
    }

    fn answer(player_id: u32, choice: Option<usize>, elapsed_ms: u64) -> Answer {
        Answer {
            player_id,
            question_index: 0,
            choice,
            elapsed_ms,
        }
    }

    #[test]
    fn test_correct_answer_earns_base_points() {
        let rule = ScoringRule::default();
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 2_000)), 100);
    }

    #[test]
    fn test_wrong_and_missing_answers_earn_nothing() {
        let rule = ScoringRule::new(100, 50);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(0), 0)), 0);
        assert_eq!(rule.points_for(&question(), &answer(1, None, 10_000)), 0);
    }

    #[test]
    fn test_speed_bonus_is_linear_and_floored() {
        let rule = ScoringRule::new(100, 50);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 0)), 150);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 5_000)), 125);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 9_999)), 100);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 20_000)), 100);
    }

    #[test]
    fn test_faster_never_scores_less() {
        let rule = ScoringRule::new(100, 50);
        let q = question();
        let mut previous = u32::MAX;
        for elapsed in (0..=10_000).step_by(250) {
            let points = rule.points_for(&q, &answer(1, Some(1), elapsed));
            assert!(points <= previous);
            assert!(points >= rule.base_points);
            previous = points;
        }
    }

    #[test]
    fn test_round_scoring_is_commutative() {
        let rule = ScoringRule::new(100, 50);
        let q = question();
        let a = answer(1, Some(1), 1_200);
        let b = answer(2, Some(3), 800);

        let forward = rule.score_round(&q, &[a.clone(), b.clone()]);
        let reverse = rule.score_round(&q, &[b, a]);

        assert_eq!(forward, reverse);
        assert_eq!(forward[0].answer.player_id, 1);
        assert!(forward[0].correct);
        assert!(!forward[1].correct);
        assert_eq!(forward[1].points, 0);
    }

    #[test]
    fn test_huge_base_points_saturate() {
        let rule = ScoringRule::new(u32::MAX, 50);
        assert_eq!(rule.points_for(&question(), &answer(1, Some(1), 0)), u32::MAX);
    }
}
