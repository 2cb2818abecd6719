use super::room::Player;
use super::{Question, Rejection};
use crate::models::{ConnectionId, QuestionView};

/// The question currently open for buzzing, shared by the quiz board and
/// the letter grid. At most one player holds the buzzer; a player who
/// answered wrong is locked out until the question closes.
#[derive(Debug, Clone)]
pub struct ActiveQuestion {
  pub question: Question,
  pub options: Vec<String>,
  pub buzzed: Option<ConnectionId>,
  pub attempts: Vec<ConnectionId>,
}

impl ActiveQuestion {
  pub fn new(question: Question, options: Vec<String>) -> Self {
    Self {
      question,
      options,
      buzzed: None,
      attempts: vec![],
    }
  }

  pub fn buzz(&mut self, player: ConnectionId) -> Result<(), Rejection> {
    if self.attempts.contains(&player) {
      return Err(Rejection::AlreadyAttempted);
    }
    if self.buzzed.is_some() {
      return Err(Rejection::BuzzerTaken);
    }
    self.buzzed = Some(player);
    Ok(())
  }

  pub fn ensure_holder(&self, player: ConnectionId) -> Result<(), Rejection> {
    if self.buzzed == Some(player) {
      Ok(())
    } else {
      Err(Rejection::NotBuzzed)
    }
  }

  /// Releases the buzzer and locks `player` out of this question.
  pub fn record_miss(&mut self, player: ConnectionId) {
    self.buzzed = None;
    if !self.attempts.contains(&player) {
      self.attempts.push(player);
    }
  }

  /// True when every connected player has had a go.
  pub fn everyone_tried(&self, players: &[Player]) -> bool {
    players
      .iter()
      .filter(|p| p.connected)
      .all(|p| self.attempts.contains(&p.id))
  }

  pub fn forget(&mut self, player: ConnectionId) {
    if self.buzzed == Some(player) {
      self.buzzed = None;
    }
    self.attempts.retain(|id| *id != player);
  }

  pub fn rebind(&mut self, old: ConnectionId, new: ConnectionId) {
    if self.buzzed == Some(old) {
      self.buzzed = Some(new);
    }
    for id in self.attempts.iter_mut().filter(|id| **id == old) {
      *id = new;
    }
  }

  pub fn view(&self) -> QuestionView {
    let mut view = self.question.view();
    view.options = self.options.clone();
    view
  }
}
