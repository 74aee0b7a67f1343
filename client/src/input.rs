//! Terminal input handling and the automatic player

use crate::game::GameView;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::ClientEvent;
use std::time::Duration;

/// A line typed by the player, before it is checked against the game view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Zero-based choice index
    Answer(usize),
    FiftyFifty,
    Leave,
    Help,
}

/// Parses one input line. Choices are numbered from 1 on screen; `50` (or
/// `ff`) asks for the fifty-fifty lifeline and `q` leaves.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim().to_ascii_lowercase();
    match line.as_str() {
        "" => None,
        "50" | "ff" => Some(Command::FiftyFifty),
        "q" | "quit" | "leave" => Some(Command::Leave),
        "h" | "?" | "help" => Some(Command::Help),
        number => match number.parse::<usize>() {
            Ok(n) if n >= 1 => Some(Command::Answer(n - 1)),
            _ => None,
        },
    }
}

/// Turns commands into client events, refusing the ones the view already
/// shows to be pointless.
#[derive(Debug, Default)]
pub struct InputManager {
    lifeline_requested: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_for(&mut self, command: Command, view: &GameView) -> Result<ClientEvent, &'static str> {
        match command {
            Command::Leave => Ok(ClientEvent::Leave),
            Command::Help => Err("type a choice number, 50 for fifty-fifty, q to leave"),

            Command::Answer(choice) => {
                let question = view.question.as_ref().ok_or("no question is open")?;
                if question.answered.is_some() {
                    return Err("you already answered this question");
                }
                if choice >= question.choices.len() || question.removed.contains(&choice) {
                    return Err("that choice is not available");
                }
                Ok(ClientEvent::Answer {
                    question_index: question.round_index,
                    choice_index: choice,
                })
            }

            Command::FiftyFifty => {
                if self.lifeline_requested || view.lifeline_used {
                    return Err("fifty-fifty was already used");
                }
                let question = view.question.as_ref().ok_or("no question is open")?;
                if question.answered.is_some() {
                    return Err("you already answered this question");
                }
                self.lifeline_requested = true;
                Ok(ClientEvent::FiftyFifty {
                    question_index: question.round_index,
                })
            }
        }
    }
}

/// Answers every question on its own after a random think time.
#[derive(Debug, Clone, Copy)]
pub struct AutoPlayer {
    min_delay: Duration,
    max_delay: Duration,
}

impl AutoPlayer {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    pub fn think_time(&self) -> Duration {
        if self.max_delay == self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..=self.max_delay)
    }

    /// A random still-available choice, if a question is waiting for an answer.
    pub fn pick(&self, view: &GameView) -> Option<usize> {
        if !view.can_answer() {
            return None;
        }
        view.available_choices().choose(&mut rand::thread_rng()).copied()
    }
}

impl Default for AutoPlayer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(2500))
    }
}
