use super::letters::{ALPHABET, HAMZA};
use super::normalize::{first_letter, fold_letter, normalize_arabic};
use super::room::Player;
use crate::models::{ConnectionId, WordCategory};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use strum::IntoEnumIterator;

pub const UNIQUE_POINTS: u32 = 10;
pub const SHARED_POINTS: u32 = 5;

/// Letters a round can start with. The standalone hamza never begins a word.
fn round_letters() -> Vec<char> {
  ALPHABET.into_iter().filter(|&l| l != HAMZA).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
  pub category: WordCategory,
  pub answer: String,
  pub points: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerRoundScore {
  pub player_id: ConnectionId,
  pub name: String,
  pub scores: Vec<CategoryScore>,
  pub total: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundResult {
  pub round: u32,
  pub letter: char,
  pub players: Vec<PlayerRoundScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WordsView {
  pub current_round: u32,
  pub round_count: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub current_letter: Option<char>,
  pub categories: Vec<WordCategory>,
  /// Players who have sent answers for the current round.
  pub submitted: Vec<ConnectionId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_by: Option<ConnectionId>,
  pub results: Vec<RoundResult>,
}

type Answers = HashMap<WordCategory, String>;

#[derive(Default)]
pub struct WordBuilder {
  pub current_round: u32,
  pub round_count: u32,
  pub used_letters: Vec<char>,
  pub current_letter: Option<char>,
  pub submissions: BTreeMap<u32, HashMap<ConnectionId, Answers>>,
  pub results: Vec<RoundResult>,
  pub finished_by: Option<ConnectionId>,
}

pub fn is_valid_answer(letter: char, answer: &str) -> bool {
  let folded = normalize_arabic(answer);
  folded.chars().count() >= 2 && first_letter(&folded) == Some(fold_letter(letter))
}

/// Scores one category across players: 10 for a valid answer nobody else
/// gave, 5 for a valid answer shared with someone, 0 otherwise.
pub fn score_category(letter: char, answers: &[(ConnectionId, &str)]) -> HashMap<ConnectionId, u32> {
  let mut counts: HashMap<String, usize> = HashMap::new();
  for (_, answer) in answers {
    if is_valid_answer(letter, answer) {
      *counts.entry(normalize_arabic(answer)).or_default() += 1;
    }
  }
  answers
    .iter()
    .map(|(player, answer)| {
      let points = if !is_valid_answer(letter, answer) {
        0
      } else if counts.get(&normalize_arabic(answer)).copied().unwrap_or(0) > 1 {
        SHARED_POINTS
      } else {
        UNIQUE_POINTS
      };
      (*player, points)
    })
    .collect()
}

impl WordBuilder {
  pub fn reset(&mut self, round_count: u32) {
    *self = Self {
      round_count: round_count.max(1),
      ..Self::default()
    };
  }

  /// Draws an unused letter and opens the next round.
  pub fn begin_round(&mut self, rng: &mut impl Rng) -> char {
    let all = round_letters();
    let mut available: Vec<char> = all
      .iter()
      .copied()
      .filter(|l| !self.used_letters.contains(l))
      .collect();
    if available.is_empty() {
      self.used_letters.clear();
      available = all;
    }
    let letter = available.choose(rng).copied().unwrap_or('ا');
    self.used_letters.push(letter);
    self.current_round += 1;
    self.current_letter = Some(letter);
    self.finished_by = None;
    self.submissions.entry(self.current_round).or_default();
    letter
  }

  /// Stores the player's latest answers for the current round.
  pub fn submit(&mut self, player: ConnectionId, answers: Answers) {
    self
      .submissions
      .entry(self.current_round)
      .or_default()
      .insert(player, answers);
  }

  /// Scores the current round and credits totals to `players`.
  pub fn score_round(&mut self, players: &mut [Player]) {
    let Some(letter) = self.current_letter else {
      return;
    };
    let empty = HashMap::new();
    let round = self.submissions.get(&self.current_round).unwrap_or(&empty);

    let mut per_player: HashMap<ConnectionId, Vec<CategoryScore>> = HashMap::new();
    for category in WordCategory::iter() {
      let answers: Vec<(ConnectionId, &str)> = players
        .iter()
        .map(|p| {
          let answer = round
            .get(&p.id)
            .and_then(|a| a.get(&category))
            .map(String::as_str)
            .unwrap_or("");
          (p.id, answer)
        })
        .collect();
      let points = score_category(letter, &answers);
      for (player, answer) in answers {
        per_player.entry(player).or_default().push(CategoryScore {
          category,
          answer: answer.trim().to_string(),
          points: points.get(&player).copied().unwrap_or(0),
        });
      }
    }

    let mut result = RoundResult {
      round: self.current_round,
      letter,
      players: vec![],
    };
    for player in players.iter_mut() {
      let scores = per_player.remove(&player.id).unwrap_or_default();
      let total: u32 = scores.iter().map(|s| s.points).sum();
      player.score = player.score.saturating_add(i64::from(total));
      result.players.push(PlayerRoundScore {
        player_id: player.id,
        name: player.name.clone(),
        scores,
        total,
      });
    }
    self.results.push(result);
  }

  pub fn has_more_rounds(&self) -> bool {
    self.current_round < self.round_count
  }

  pub fn rebind(&mut self, old: ConnectionId, new: ConnectionId) {
    for round in self.submissions.values_mut() {
      if let Some(answers) = round.remove(&old) {
        round.insert(new, answers);
      }
    }
    for result in &mut self.results {
      for p in result.players.iter_mut().filter(|p| p.player_id == old) {
        p.player_id = new;
      }
    }
    if self.finished_by == Some(old) {
      self.finished_by = Some(new);
    }
  }

  pub fn view(&self) -> WordsView {
    WordsView {
      current_round: self.current_round,
      round_count: self.round_count,
      current_letter: self.current_letter,
      categories: WordCategory::iter().collect(),
      submitted: self
        .submissions
        .get(&self.current_round)
        .map(|r| r.keys().copied().collect())
        .unwrap_or_default(),
      finished_by: self.finished_by,
      results: self.results.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use std::time::Instant;
  use uuid::Uuid;

  fn player(name: &str) -> Player {
    Player {
      id: ConnectionId::new(),
      name: name.into(),
      score: 0,
      number: 1,
      team: None,
      token: Uuid::now_v7(),
      connected: true,
      last_seen: Instant::now(),
    }
  }

  #[test]
  fn validity_needs_letter_and_length() {
    assert!(is_valid_answer('ا', "أحمد"));
    assert!(is_valid_answer('ب', " بطة "));
    assert!(!is_valid_answer('ب', "ب"));
    assert!(!is_valid_answer('ب', "تفاح"));
    assert!(!is_valid_answer('ب', ""));
  }

  #[test]
  fn unique_shared_and_invalid() {
    let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
    let points = score_category('م', &[(a, "محمد"), (b, "مُحمد"), (c, "مازن")]);
    assert_eq!(points[&a], SHARED_POINTS);
    assert_eq!(points[&b], SHARED_POINTS);
    assert_eq!(points[&c], UNIQUE_POINTS);

    let points = score_category('م', &[(a, "خالد"), (b, "")]);
    assert_eq!(points[&a], 0);
    assert_eq!(points[&b], 0);
  }

  #[test]
  fn letters_do_not_repeat_until_exhausted() {
    let mut game = WordBuilder::default();
    game.reset(40);
    let mut rng = StdRng::seed_from_u64(11);
    let letters = round_letters().len();
    let drawn: Vec<char> = (0..letters).map(|_| game.begin_round(&mut rng)).collect();
    let mut unique = drawn.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), letters);
    assert!(!drawn.contains(&'ء'));
    // Pool refills once empty.
    game.begin_round(&mut rng);
    assert_eq!(game.used_letters.len(), 1);
  }

  #[test]
  fn round_scoring_credits_players() {
    let mut players = vec![player("Sara"), player("Omar")];
    let mut game = WordBuilder::default();
    game.reset(2);
    game.begin_round(&mut StdRng::seed_from_u64(1));
    game.current_letter = Some('ب');

    game.submit(
      players[0].id,
      HashMap::from([
        (WordCategory::Girl, "بسمة".to_string()),
        (WordCategory::Animal, "بطة".to_string()),
      ]),
    );
    game.submit(
      players[1].id,
      HashMap::from([
        (WordCategory::Girl, "بشرى".to_string()),
        (WordCategory::Animal, "بطه".to_string()),
        (WordCategory::Food, "تمر".to_string()),
      ]),
    );
    game.score_round(&mut players);

    assert_eq!(players[0].score, 15);
    assert_eq!(players[1].score, 15);
    let result = &game.results[0];
    assert_eq!(result.letter, 'ب');
    assert_eq!(result.players[0].scores.len(), 6);
    assert!(game.has_more_rounds());
  }
}
