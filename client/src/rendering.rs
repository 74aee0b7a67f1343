use crate::game::GameView;
use shared::{PlayerScore, ServerEvent, Winner};

/// Formats server events as terminal text.
pub struct Renderer {
    player_id: shared::PlayerId,
}

impl Renderer {
    pub fn new(player_id: shared::PlayerId) -> Self {
        Self { player_id }
    }

    /// Text for `event`, given the view after the event was applied.
    pub fn render(&self, event: &ServerEvent, view: &GameView) -> String {
        match event {
            ServerEvent::Queued { mode } => format!("Waiting for a {} opponent...", mode),

            ServerEvent::MatchFound {
                session_id,
                mode,
                opponent_name,
            } => {
                let against = match opponent_name {
                    Some(name) => format!(" against {}", name),
                    None => String::new(),
                };
                format!(
                    "Match found: {} game{} (session {})",
                    mode, against, session_id
                )
            }

            ServerEvent::Resumed {
                round_index,
                cumulative_scores,
                ..
            } => format!(
                "Rejoined at question {}. {}",
                round_index + 1,
                self.scoreline(cumulative_scores)
            ),

            ServerEvent::QuestionIssued {
                round_index,
                text,
                choices,
                time_limit_ms,
            } => {
                let mut out = format!(
                    "\nQuestion {} ({}s)\n{}\n",
                    round_index + 1,
                    time_limit_ms / 1000,
                    text
                );
                for (i, choice) in choices.iter().enumerate() {
                    out.push_str(&format!("  {}) {}\n", i + 1, choice));
                }
                if !view.lifeline_used {
                    out.push_str("  (50 for fifty-fifty)\n");
                }
                out
            }

            ServerEvent::OpponentAnswered { .. } => "Your opponent has answered.".to_string(),

            ServerEvent::FiftyFiftyResult { .. } => {
                let remaining: Vec<String> = match &view.question {
                    Some(q) => view
                        .available_choices()
                        .iter()
                        .map(|i| format!("{}) {}", i + 1, q.choices[*i]))
                        .collect(),
                    None => Vec::new(),
                };
                format!("Fifty-fifty leaves: {}", remaining.join("   "))
            }

            ServerEvent::RoundResult {
                your_answer,
                correct_choice_index,
                points_awarded,
                cumulative_scores,
                ..
            } => {
                let verdict = match your_answer {
                    Some(choice) if choice == correct_choice_index => "Correct!".to_string(),
                    Some(_) => format!("Wrong, the answer was {}.", correct_choice_index + 1),
                    None => format!("Time's up, the answer was {}.", correct_choice_index + 1),
                };
                format!(
                    "{} +{} points. {}",
                    verdict,
                    points_awarded,
                    self.scoreline(cumulative_scores)
                )
            }

            ServerEvent::SessionEnded {
                final_scores,
                winner,
                rating_delta,
            } => {
                let mut out = format!("\nGame over. {}\n", self.scoreline(final_scores));
                out.push_str(&self.verdict(*winner, final_scores));
                if let Some(delta) = rating_delta {
                    out.push_str(&format!("\nRating change: {:+}", delta));
                }
                out
            }

            ServerEvent::Error { kind } => format!("Server: {}", kind),
        }
    }

    fn scoreline(&self, scores: &[PlayerScore]) -> String {
        let parts: Vec<String> = scores
            .iter()
            .map(|s| {
                let marker = if s.player_id == self.player_id { " (you)" } else { "" };
                format!("{}{}: {}", s.name, marker, s.score)
            })
            .collect();
        format!("Score - {}", parts.join(", "))
    }

    fn verdict(&self, winner: Winner, scores: &[PlayerScore]) -> String {
        match winner {
            Winner::Player(id) if id == self.player_id => "You win!".to_string(),
            Winner::Player(id) => {
                let name = scores
                    .iter()
                    .find(|s| s.player_id == id)
                    .map_or("Your opponent", |s| s.name.as_str());
                format!("{} wins.", name)
            }
            Winner::Draw => "It's a draw.".to_string(),
            Winner::Abandoned => "The game was abandoned.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ErrorKind, GameMode};

    fn scores() -> Vec<PlayerScore> {
        vec![
            PlayerScore {
                player_id: 1,
                name: "ada".into(),
                score: 200,
            },
            PlayerScore {
                player_id: 2,
                name: "bob".into(),
                score: 300,
            },
        ]
    }

    #[test]
    fn test_question_lists_numbered_choices() {
        let event = ServerEvent::QuestionIssued {
            round_index: 0,
            text: "Capital of France?".into(),
            choices: vec!["Paris".into(), "Lyon".into()],
            time_limit_ms: 15_000,
        };
        let mut view = GameView::new(1);
        view.apply(&event);

        let text = Renderer::new(1).render(&event, &view);
        assert!(text.contains("Question 1 (15s)"));
        assert!(text.contains("1) Paris"));
        assert!(text.contains("2) Lyon"));
    }

    #[test]
    fn test_round_result_verdicts() {
        let renderer = Renderer::new(1);
        let view = GameView::new(1);
        let result = |your_answer| ServerEvent::RoundResult {
            round_index: 0,
            your_answer,
            correct_choice_index: 2,
            points_awarded: 0,
            cumulative_scores: scores(),
        };

        assert!(renderer.render(&result(Some(2)), &view).starts_with("Correct!"));
        assert!(renderer.render(&result(Some(0)), &view).contains("the answer was 3"));
        assert!(renderer.render(&result(None), &view).starts_with("Time's up"));
        assert!(renderer.render(&result(None), &view).contains("ada (you): 200"));
    }

    #[test]
    fn test_session_end_names_winner() {
        let renderer = Renderer::new(1);
        let view = GameView::new(1);
        let ended = ServerEvent::SessionEnded {
            final_scores: scores(),
            winner: Winner::Player(2),
            rating_delta: Some(-16),
        };

        let text = renderer.render(&ended, &view);
        assert!(text.contains("bob wins."));
        assert!(text.contains("Rating change: -16"));
    }

    #[test]
    fn test_simple_events() {
        let renderer = Renderer::new(1);
        let view = GameView::new(1);
        assert_eq!(
            renderer.render(&ServerEvent::Queued { mode: GameMode::Ranked }, &view),
            "Waiting for a ranked opponent..."
        );
        assert_eq!(
            renderer.render(
                &ServerEvent::Error {
                    kind: ErrorKind::RoundClosed
                },
                &view
            ),
            "Server: round is closed"
        );
    }
}
