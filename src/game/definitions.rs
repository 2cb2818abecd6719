use super::normalize::{answers_match, normalize_arabic};
use super::room::Player;
use super::{Question, Rejection};
use crate::models::{ConnectionId, QuestionView};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;

pub const CORRECT_POINTS: i64 = 50;
const OPTION_COUNT: usize = 4;

pub struct DefinitionRound {
  pub question: Question,
  pub options: Vec<String>,
  pub answers: HashMap<ConnectionId, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiceOutcome {
  pub player_id: ConnectionId,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub answer: Option<String>,
  pub is_correct: bool,
  pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionResult {
  pub round: u32,
  pub word: String,
  pub answer: String,
  pub players: Vec<ChoiceOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DefinitionsView {
  pub current_round: u32,
  pub round_count: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub question: Option<QuestionView>,
  pub answered: Vec<ConnectionId>,
  pub results: Vec<DefinitionResult>,
}

pub struct WordDefinition {
  pool: Vec<Question>,
  pub current_round: u32,
  pub round_count: u32,
  pub current: Option<DefinitionRound>,
  pub results: Vec<DefinitionResult>,
}

impl WordDefinition {
  pub fn new(pool: Vec<Question>) -> Self {
    Self {
      pool,
      current_round: 0,
      round_count: 0,
      current: None,
      results: vec![],
    }
  }

  /// Prepares a fresh game. Returns the number of rounds that will be played,
  /// capped by the questions available.
  pub fn reset(&mut self, round_count: u32) -> u32 {
    for q in &mut self.pool {
      q.is_answered = false;
    }
    let available = u32::try_from(self.pool.len()).unwrap_or(u32::MAX);
    self.round_count = round_count.min(available);
    self.current_round = 0;
    self.current = None;
    self.results.clear();
    self.round_count
  }

  pub fn has_more_rounds(&self) -> bool {
    self.current_round < self.round_count
  }

  /// Draws an unused word. Returns false when none is left.
  pub fn begin_round(&mut self, rng: &mut impl Rng) -> bool {
    let unused: Vec<usize> = (0..self.pool.len())
      .filter(|&i| !self.pool[i].is_answered)
      .collect();
    let Some(&idx) = unused.choose(rng) else {
      return false;
    };
    self.pool[idx].is_answered = true;
    let question = self.pool[idx].clone();
    let options = self.build_options(&question, rng);
    self.current_round += 1;
    self.current = Some(DefinitionRound {
      question,
      options,
      answers: HashMap::new(),
    });
    true
  }

  /// The correct meaning plus three other meanings from the pool, topped up
  /// from the question's own options.
  fn build_options(&self, question: &Question, rng: &mut impl Rng) -> Vec<String> {
    let correct = normalize_arabic(&question.answer);
    let mut seen = vec![correct];
    let mut others: Vec<String> = vec![];
    let candidates = self
      .pool
      .iter()
      .filter(|q| q.id != question.id)
      .map(|q| &q.answer)
      .chain(question.options.iter());
    for answer in candidates {
      let folded = normalize_arabic(answer);
      if !folded.is_empty() && !seen.contains(&folded) {
        seen.push(folded);
        others.push(answer.trim().to_string());
      }
    }
    others.shuffle(rng);
    others.truncate(OPTION_COUNT - 1);
    others.push(question.answer.trim().to_string());
    others.shuffle(rng);
    others
  }

  /// Records a player's single choice for the running round.
  pub fn submit(&mut self, player: ConnectionId, answer: &str) -> Result<(), Rejection> {
    let round = self.current.as_mut().ok_or(Rejection::NoQuestions)?;
    if round.answers.contains_key(&player) {
      return Err(Rejection::AlreadyAnswered);
    }
    if !round.options.iter().any(|o| answers_match(answer, o, true)) {
      return Err(Rejection::UnknownOption);
    }
    round.answers.insert(player, answer.to_string());
    Ok(())
  }

  pub fn all_answered(&self, players: &[Player]) -> bool {
    let Some(round) = &self.current else {
      return false;
    };
    let mut online = players.iter().filter(|p| p.connected).peekable();
    online.peek().is_some() && online.all(|p| round.answers.contains_key(&p.id))
  }

  /// Closes the running round: credits correct choices and records the reveal.
  pub fn close_round(&mut self, players: &mut [Player]) {
    let Some(round) = &self.current else {
      return;
    };
    let mut result = DefinitionResult {
      round: self.current_round,
      word: round.question.question.clone(),
      answer: round.question.answer.clone(),
      players: vec![],
    };
    for player in players.iter_mut() {
      let answer = round.answers.get(&player.id).cloned();
      let is_correct = answer
        .as_deref()
        .is_some_and(|a| answers_match(a, &round.question.answer, true));
      let points = if is_correct { CORRECT_POINTS } else { 0 };
      player.score = player.score.saturating_add(points);
      result.players.push(ChoiceOutcome {
        player_id: player.id,
        name: player.name.clone(),
        answer,
        is_correct,
        points,
      });
    }
    self.results.push(result);
  }

  pub fn rebind(&mut self, old: ConnectionId, new: ConnectionId) {
    if let Some(round) = self.current.as_mut() {
      if let Some(answer) = round.answers.remove(&old) {
        round.answers.insert(new, answer);
      }
    }
    for result in &mut self.results {
      for p in result.players.iter_mut().filter(|p| p.player_id == old) {
        p.player_id = new;
      }
    }
  }

  pub fn view(&self) -> DefinitionsView {
    DefinitionsView {
      current_round: self.current_round,
      round_count: self.round_count,
      question: self.current.as_ref().map(|r| {
        let mut view = r.question.view();
        view.options = r.options.clone();
        view
      }),
      answered: self
        .current
        .as_ref()
        .map(|r| r.answers.keys().copied().collect())
        .unwrap_or_default(),
      results: self.results.clone(),
    }
  }
}
