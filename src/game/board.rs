use super::Question;
use super::buzzer::ActiveQuestion;
use crate::models::{ConnectionId, QuestionView};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use strum::Display;

/// Surprise outcome that can replace a quiz-board question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LuckEffect {
  DoubleValue,
  LoseValue,
  KeepValue,
  HalveScore,
  DoubleScore,
  Nothing,
}

impl LuckEffect {
  const ALL: [LuckEffect; 6] = [
    Self::DoubleValue,
    Self::LoseValue,
    Self::KeepValue,
    Self::HalveScore,
    Self::DoubleScore,
    Self::Nothing,
  ];

  pub fn roll(rng: &mut impl Rng) -> Self {
    Self::ALL[rng.gen_range(0..Self::ALL.len())]
  }

  /// New score after the effect hits a player holding `score` who picked a
  /// question worth `value`.
  pub fn apply(self, score: i64, value: i64) -> i64 {
    match self {
      Self::DoubleValue => score.saturating_add(value.saturating_mul(2)),
      Self::LoseValue => score.saturating_sub(value),
      Self::KeepValue => score.saturating_add(value),
      Self::HalveScore => score / 2,
      Self::DoubleScore => score.saturating_mul(2),
      Self::Nothing => score,
    }
  }
}

pub struct QuizBoard {
  candidates: Vec<Question>,
  pub questions: Vec<Question>,
  pub selected_category: Option<String>,
  pub active: Option<ActiveQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
  pub categories: Vec<String>,
  pub questions: Vec<QuestionView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub selected_category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active_question: Option<QuestionView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub buzzed_player_id: Option<ConnectionId>,
  pub attempts: Vec<ConnectionId>,
}

impl QuizBoard {
  pub fn new(candidates: Vec<Question>) -> Self {
    Self {
      candidates,
      questions: vec![],
      selected_category: None,
      active: None,
    }
  }

  /// Builds the board: per category, a random pick of questions with distinct
  /// values, capped at `per_category` and ordered by value. Returns the size.
  pub fn lay_out(&mut self, per_category: usize, rng: &mut impl Rng) -> usize {
    let mut order: Vec<String> = vec![];
    let mut groups: HashMap<String, Vec<Question>> = HashMap::new();
    for q in &self.candidates {
      if !groups.contains_key(&q.category) {
        order.push(q.category.clone());
      }
      groups.entry(q.category.clone()).or_default().push(q.clone());
    }

    let mut laid = vec![];
    for category in order {
      let mut items = groups.remove(&category).unwrap_or_default();
      items.shuffle(rng);
      let mut seen = HashSet::new();
      items.retain(|q| seen.insert(q.value));
      items.truncate(per_category);
      items.sort_by_key(|q| q.value);
      laid.extend(items);
    }
    for q in &mut laid {
      q.is_answered = false;
    }
    self.questions = laid;
    self.selected_category = None;
    self.active = None;
    self.questions.len()
  }

  pub fn categories(&self) -> Vec<String> {
    let mut out: Vec<String> = vec![];
    for q in &self.questions {
      if !out.contains(&q.category) {
        out.push(q.category.clone());
      }
    }
    out
  }

  pub fn has_open(&self, category: &str) -> bool {
    self
      .questions
      .iter()
      .any(|q| q.category == category && !q.is_answered)
  }

  pub fn find_open(&self, category: &str, value: i64) -> Option<usize> {
    self
      .questions
      .iter()
      .position(|q| q.category == category && q.value == value && !q.is_answered)
  }

  pub fn mark_answered(&mut self, id: &str) {
    if let Some(q) = self.questions.iter_mut().find(|q| q.id == id) {
      q.is_answered = true;
    }
  }

  pub fn exhausted(&self) -> bool {
    self.questions.iter().all(|q| q.is_answered)
  }

  pub fn clear_turn(&mut self) {
    self.selected_category = None;
    self.active = None;
  }

  pub fn view(&self) -> BoardView {
    BoardView {
      categories: self.categories(),
      questions: self.questions.iter().map(Question::view).collect(),
      selected_category: self.selected_category.clone(),
      active_question: self.active.as_ref().map(ActiveQuestion::view),
      buzzed_player_id: self.active.as_ref().and_then(|a| a.buzzed),
      attempts: self
        .active
        .as_ref()
        .map(|a| a.attempts.clone())
        .unwrap_or_default(),
    }
  }
}
