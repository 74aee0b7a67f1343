//! Question sources.
//!
//! A session pulls its whole batch once, while forming. The bundled
//! [`QuestionBank`] serves batches from an in-memory list of open-trivia style
//! entries, either loaded from a JSON file or from the sample bank compiled
//! into the binary.

use crate::error::SourceError;
use async_trait::async_trait;
use log::{debug, info};
use rand::seq::SliceRandom;
use serde::Deserialize;
use shared::{Difficulty, Question};
use std::path::Path;
use std::time::Duration;

const SAMPLE_BANK: &str = include_str!("../data/questions.json");

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilters {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl BatchFilters {
    fn accepts(&self, entry: &BankEntry) -> bool {
        let category_ok = self
            .category
            .as_ref()
            .map_or(true, |c| c.eq_ignore_ascii_case(&entry.category));
        let difficulty_ok = self.difficulty.map_or(true, |d| d == entry.difficulty);
        category_ok && difficulty_ok
    }
}

/// Ordered, immutable questions for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBatch {
    questions: Vec<Question>,
}

impl QuestionBatch {
    pub fn new(questions: Vec<Question>) -> Result<Self, SourceError> {
        if let Some(index) = questions.iter().position(|q| !q.is_well_formed()) {
            return Err(SourceError::MalformedQuestion(index));
        }
        Ok(Self { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }
}

#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_batch(
        &self,
        size: usize,
        filters: &BatchFilters,
    ) -> Result<QuestionBatch, SourceError>;
}

/// One question as stored in a bank file.
#[derive(Debug, Clone, Deserialize)]
pub struct BankEntry {
    pub category: String,
    pub difficulty: Difficulty,
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answers: Vec<String>,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BankFile {
    Wrapped { results: Vec<BankEntry> },
    Bare(Vec<BankEntry>),
}

/// In-memory question bank.
///
/// With shuffling enabled, entries are sampled at random and the correct
/// answer is mixed into the choices. Without it, entries are served in file
/// order and the correct answer is always the first choice.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    entries: Vec<BankEntry>,
    default_time_limit: Duration,
    shuffle: bool,
}

impl QuestionBank {
    pub fn new(entries: Vec<BankEntry>, default_time_limit: Duration) -> Self {
        Self {
            entries,
            default_time_limit,
            shuffle: true,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn from_json(json: &str, default_time_limit: Duration) -> Result<Self, SourceError> {
        let file: BankFile =
            serde_json::from_str(json).map_err(|e| SourceError::Load(e.to_string()))?;
        let entries = match file {
            BankFile::Wrapped { results } => results,
            BankFile::Bare(entries) => entries,
        };
        Ok(Self::new(entries, default_time_limit))
    }

    pub fn load(path: &Path, default_time_limit: Duration) -> Result<Self, SourceError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Load(format!("{}: {}", path.display(), e)))?;
        let bank = Self::from_json(&json, default_time_limit)?;
        info!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    /// The sample bank bundled with the server.
    pub fn sample(default_time_limit: Duration) -> Result<Self, SourceError> {
        Self::from_json(SAMPLE_BANK, default_time_limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_question(&self, entry: &BankEntry) -> Question {
        let mut choices = Vec::with_capacity(entry.incorrect_answers.len() + 1);
        choices.push(entry.correct_answer.clone());
        choices.extend(entry.incorrect_answers.iter().cloned());

        if self.shuffle {
            choices.shuffle(&mut rand::thread_rng());
        }
        let correct_choice = choices
            .iter()
            .position(|c| *c == entry.correct_answer)
            .unwrap_or(0);

        let time_limit_ms = entry
            .time_limit_ms
            .unwrap_or(self.default_time_limit.as_millis() as u64);

        Question {
            text: entry.question.clone(),
            choices,
            correct_choice,
            time_limit_ms,
            difficulty: entry.difficulty,
            category: entry.category.clone(),
        }
    }

    fn draw(&self, size: usize, filters: &BatchFilters) -> Result<QuestionBatch, SourceError> {
        let matching: Vec<&BankEntry> = self.entries.iter().filter(|e| filters.accepts(e)).collect();
        if matching.len() < size {
            return Err(SourceError::NotEnoughQuestions {
                requested: size,
                available: matching.len(),
            });
        }

        let picked: Vec<&BankEntry> = if self.shuffle {
            matching
                .choose_multiple(&mut rand::thread_rng(), size)
                .copied()
                .collect()
        } else {
            matching.into_iter().take(size).collect()
        };

        debug!("Drew {} questions from a bank of {}", picked.len(), self.entries.len());
        QuestionBatch::new(picked.into_iter().map(|e| self.to_question(e)).collect())
    }
}

#[async_trait]
impl QuestionSource for QuestionBank {
    async fn fetch_batch(
        &self,
        size: usize,
        filters: &BatchFilters,
    ) -> Result<QuestionBatch, SourceError> {
        self.draw(size, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn entry(question: &str, difficulty: Difficulty, category: &str) -> BankEntry {
        BankEntry {
            category: category.into(),
            difficulty,
            question: question.into(),
            correct_answer: "right".into(),
            incorrect_answers: vec!["wrong 1".into(), "wrong 2".into(), "wrong 3".into()],
            time_limit_ms: None,
        }
    }

    fn bank() -> QuestionBank {
        QuestionBank::new(
            vec![
                entry("q1", Difficulty::Easy, "History"),
                entry("q2", Difficulty::Hard, "History"),
                entry("q3", Difficulty::Easy, "Science"),
            ],
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_sample_bank_parses() {
        let bank = assert_ok!(QuestionBank::sample(Duration::from_secs(15)));
        assert!(bank.len() >= 10);
    }

    #[test]
    fn test_bare_array_bank_parses() {
        let json = r#"[{"category":"Art","difficulty":"medium","question":"?","correct_answer":"a","incorrect_answers":["b"]}]"#;
        let bank = assert_ok!(QuestionBank::from_json(json, Duration::from_secs(5)));
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn test_invalid_json_is_a_load_error() {
        let result = QuestionBank::from_json("{not json", Duration::from_secs(5));
        assert!(matches!(result, Err(SourceError::Load(_))));
    }

    #[tokio::test]
    async fn test_unshuffled_batch_keeps_order_and_puts_answer_first() {
        let bank = bank().with_shuffle(false);
        let batch = assert_ok!(bank.fetch_batch(2, &BatchFilters::default()).await);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get(0).unwrap().text, "q1");
        assert_eq!(batch.get(1).unwrap().text, "q2");
        for question in batch.iter() {
            assert_eq!(question.correct_choice, 0);
            assert_eq!(question.choices[0], "right");
            assert_eq!(question.time_limit_ms, 10_000);
        }
    }

    #[tokio::test]
    async fn test_shuffled_batch_tracks_correct_choice() {
        let batch = assert_ok!(bank().fetch_batch(3, &BatchFilters::default()).await);
        for question in batch.iter() {
            assert_eq!(question.choices.len(), 4);
            assert_eq!(question.choices[question.correct_choice], "right");
        }
    }

    #[tokio::test]
    async fn test_filters_apply() {
        let filters = BatchFilters {
            category: Some("history".into()),
            difficulty: Some(Difficulty::Easy),
        };
        let batch = assert_ok!(bank().fetch_batch(1, &filters).await);
        assert_eq!(batch.get(0).unwrap().text, "q1");
    }

    #[tokio::test]
    async fn test_not_enough_questions() {
        let filters = BatchFilters {
            category: Some("Science".into()),
            difficulty: None,
        };
        let err = assert_err!(bank().fetch_batch(2, &filters).await);
        assert!(matches!(
            err,
            SourceError::NotEnoughQuestions {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_batch_rejects_malformed_questions() {
        let question = Question {
            text: "broken".into(),
            choices: vec!["only".into()],
            correct_choice: 0,
            time_limit_ms: 1_000,
            difficulty: Difficulty::Easy,
            category: "x".into(),
        };
        assert!(matches!(
            QuestionBatch::new(vec![question]),
            Err(SourceError::MalformedQuestion(0))
        ));
    }
}
