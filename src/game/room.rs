use super::board::{LuckEffect, QuizBoard};
use super::buzzer::ActiveQuestion;
use super::definitions::WordDefinition;
use super::letters::LetterClaim;
use super::normalize::{answers_match, normalize};
use super::timer::{Deadline, Schedule, Tick};
use super::words::WordBuilder;
use super::{Feedback, FeedbackKind, Question, Rejection, Winner};
use crate::models::*;
use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn valid_name(name: &str) -> bool {
  let re = NAME_RE.get_or_init(|| {
    Regex::new(r"^[\p{L}\p{M}\p{N}_ .'-]{1,24}$").expect("name pattern compiles")
  });
  re.is_match(name)
}

/// Phase lengths, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timing {
  pub question_secs: u32,
  pub retry_secs: u32,
  pub countdown_secs: u32,
  pub word_round_secs: u32,
  pub finish_grace_secs: u32,
  pub word_scoring_secs: u32,
  pub definition_round_secs: u32,
  pub definition_reveal_secs: u32,
}

impl Default for Timing {
  fn default() -> Self {
    Self {
      question_secs: 15,
      retry_secs: 10,
      countdown_secs: 3,
      word_round_secs: 60,
      finish_grace_secs: 3,
      word_scoring_secs: 5,
      definition_round_secs: 15,
      definition_reveal_secs: 3,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSettings {
  pub questions_per_category: usize,
  pub round_count: u32,
  pub luck_rate: f64,
  pub topology: Topology,
  pub timing: Timing,
}

impl Default for RoomSettings {
  fn default() -> Self {
    Self {
      questions_per_category: 5,
      round_count: 5,
      luck_rate: 0.10,
      topology: Topology::Square,
      timing: Timing::default(),
    }
  }
}

impl RoomSettings {
  pub fn apply(&mut self, patch: &SettingsPatch) {
    if let Some(n) = patch.questions_per_category {
      self.questions_per_category = n.clamp(1, 10);
    }
    if let Some(n) = patch.round_count {
      self.round_count = n.clamp(1, 30);
    }
    if let Some(rate) = patch.luck_rate {
      self.luck_rate = if rate.is_finite() { rate.clamp(0.0, 1.0) } else { 0.0 };
    }
    if let Some(topology) = patch.topology {
      self.topology = topology;
    }
  }
}

#[derive(Debug, Clone)]
pub struct Player {
  pub id: ConnectionId,
  pub name: String,
  pub score: i64,
  pub number: usize,
  pub team: Option<Team>,
  pub token: Uuid,
  pub connected: bool,
  pub last_seen: Instant,
}

impl Player {
  pub fn view(&self) -> PlayerView {
    PlayerView {
      id: self.id,
      name: self.name.clone(),
      score: self.score,
      number: self.number,
      team: self.team,
      is_online: self.connected,
    }
  }
}

pub enum ModeState {
  QuizBoard(QuizBoard),
  LetterClaim(LetterClaim),
  WordBuilder(WordBuilder),
  WordDefinition(WordDefinition),
}

fn active_of(mode: &mut ModeState) -> Option<&mut ActiveQuestion> {
  match mode {
    ModeState::QuizBoard(b) => b.active.as_mut(),
    ModeState::LetterClaim(l) => l.active.as_mut(),
    _ => None,
  }
}

fn active_ref(mode: &ModeState) -> Option<&ActiveQuestion> {
  match mode {
    ModeState::QuizBoard(b) => b.active.as_ref(),
    ModeState::LetterClaim(l) => l.active.as_ref(),
    _ => None,
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinReceipt {
  pub name: String,
  pub token: Uuid,
  pub rejoined: bool,
}

pub struct Room {
  pub id: String,
  pub game_type: GameType,
  pub phase: Phase,
  pub players: Vec<Player>,
  pub current_player_index: usize,
  pub creator_id: Option<ConnectionId>,
  pub settings: RoomSettings,
  pub feedback: Option<Feedback>,
  pub winner: Option<Winner>,
  pub mode: ModeState,
  pub schedule: Schedule,
  pub tx: broadcast::Sender<InternalMsg>,
  rng: StdRng,
}

impl Room {
  pub fn new(id: String, game_type: GameType, questions: Vec<Question>, settings: RoomSettings) -> Self {
    Self::with_rng(id, game_type, questions, settings, StdRng::from_entropy())
  }

  /// Same as `new` with a caller-supplied random source.
  pub fn with_rng(
    id: String,
    game_type: GameType,
    questions: Vec<Question>,
    settings: RoomSettings,
    mut rng: StdRng,
  ) -> Self {
    let (tx, _) = broadcast::channel(100);
    let mode = match game_type {
      GameType::QuizBoard => ModeState::QuizBoard(QuizBoard::new(questions)),
      GameType::LetterClaim => {
        ModeState::LetterClaim(LetterClaim::new(questions, settings.topology, &mut rng))
      }
      GameType::WordBuilder => ModeState::WordBuilder(WordBuilder::default()),
      GameType::WordDefinition => ModeState::WordDefinition(WordDefinition::new(questions)),
    };
    Self {
      id,
      game_type,
      phase: Phase::Lobby,
      players: vec![],
      current_player_index: 0,
      creator_id: None,
      settings,
      feedback: None,
      winner: None,
      mode,
      schedule: Schedule::default(),
      tx,
      rng,
    }
  }

  pub fn notify(&self) {
    let _ = self.tx.send(InternalMsg::StateUpdated);
  }

  fn send_log(&self, who: &str, text: String) {
    let _ = self.tx.send(InternalMsg::Log {
      who: who.into(),
      text,
      time: Local::now().format("%H:%M:%S").to_string(),
    });
  }

  pub fn player_index(&self, conn: ConnectionId) -> Option<usize> {
    self.players.iter().position(|p| p.id == conn)
  }

  pub fn player(&self, conn: ConnectionId) -> Option<&Player> {
    self.players.iter().find(|p| p.id == conn)
  }

  pub fn current_player(&self) -> Option<&Player> {
    self.players.get(self.current_player_index)
  }

  pub fn is_empty(&self) -> bool {
    self.players.is_empty()
  }

  pub fn is_host(&self, conn: ConnectionId) -> bool {
    self.creator_id == Some(conn)
  }

  fn member(&self, conn: ConnectionId) -> Result<usize, Rejection> {
    self.player_index(conn).ok_or(Rejection::NotInRoom)
  }

  fn ensure_phase(&self, allowed: &[Phase]) -> Result<(), Rejection> {
    if allowed.contains(&self.phase) {
      Ok(())
    } else {
      Err(Rejection::WrongPhase(self.phase))
    }
  }

  fn ensure_turn(&self, conn: ConnectionId) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    if idx == self.current_player_index {
      Ok(())
    } else {
      Err(Rejection::NotYourTurn)
    }
  }

  // ---------------------------------------------------------------------------
  // Membership
  // ---------------------------------------------------------------------------

  /// Adds a player or re-binds an offline one. A matching token wins over a
  /// matching name; a name held by a connected player is refused.
  pub fn join(
    &mut self,
    conn: ConnectionId,
    name: &str,
    token: Option<Uuid>,
    now: Instant,
  ) -> Result<JoinReceipt, Rejection> {
    let name = name.trim();
    if !valid_name(name) {
      return Err(Rejection::InvalidName);
    }
    if let Some(p) = self.player(conn) {
      return Ok(JoinReceipt {
        name: p.name.clone(),
        token: p.token,
        rejoined: true,
      });
    }

    let by_token = token.and_then(|t| self.players.iter().position(|p| p.token == t));
    let by_name = self
      .players
      .iter()
      .position(|p| normalize(&p.name) == normalize(name));
    let existing = match (by_token, by_name) {
      (Some(idx), _) => Some(idx),
      (None, Some(idx)) if !self.players[idx].connected => Some(idx),
      (None, Some(_)) => return Err(Rejection::NameTaken),
      (None, None) => None,
    };

    if let Some(idx) = existing {
      let old = self.players[idx].id;
      self.rebind(old, conn);
      let player = &mut self.players[idx];
      player.connected = true;
      player.last_seen = now;
      let receipt = JoinReceipt {
        name: player.name.clone(),
        token: player.token,
        rejoined: true,
      };
      tracing::info!(room_id = %self.id, player = %receipt.name, "player reconnected");
      self.send_log("System", format!("{} reconnected", receipt.name));
      self.notify();
      return Ok(receipt);
    }

    let team = (self.game_type == GameType::LetterClaim).then(|| {
      let reds = self.players.iter().filter(|p| p.team == Some(Team::Red)).count();
      let blues = self.players.len() - reds;
      if reds <= blues { Team::Red } else { Team::Blue }
    });
    let player = Player {
      id: conn,
      name: name.to_string(),
      score: 0,
      number: self.players.len() + 1,
      team,
      token: Uuid::now_v7(),
      connected: true,
      last_seen: now,
    };
    let receipt = JoinReceipt {
      name: player.name.clone(),
      token: player.token,
      rejoined: false,
    };
    self.players.push(player);
    if self.creator_id.is_none() {
      self.creator_id = Some(conn);
    }
    tracing::info!(room_id = %self.id, player = %receipt.name, "player joined");
    self.send_log("System", format!("{} joined", receipt.name));
    self.notify();
    Ok(receipt)
  }

  /// Moves every reference to `old` over to `new`.
  fn rebind(&mut self, old: ConnectionId, new: ConnectionId) {
    for p in self.players.iter_mut().filter(|p| p.id == old) {
      p.id = new;
    }
    if self.creator_id == Some(old) {
      self.creator_id = Some(new);
    }
    if let Some(f) = self.feedback.as_mut() {
      if f.player_id == Some(old) {
        f.player_id = Some(new);
      }
    }
    if let Some(Winner::Player { id, .. }) = self.winner.as_mut() {
      if *id == old {
        *id = new;
      }
    }
    if let Some(active) = active_of(&mut self.mode) {
      active.rebind(old, new);
    }
    match &mut self.mode {
      ModeState::LetterClaim(l) => l.grid.rebind(old, new),
      ModeState::WordBuilder(w) => w.rebind(old, new),
      ModeState::WordDefinition(d) => d.rebind(old, new),
      ModeState::QuizBoard(_) => {}
    }
  }

  /// Explicit leave: the player is dropped at once.
  pub fn leave(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    let removed = self.remove_player(idx);
    tracing::info!(room_id = %self.id, player = %removed.name, "player left");
    self.send_log("System", format!("{} left", removed.name));
    self.settle();
    self.notify();
    Ok(())
  }

  /// Connection lost: the player stays listed, offline, until they rejoin or
  /// the reconnect grace runs out.
  pub fn disconnect(&mut self, conn: ConnectionId, now: Instant) {
    let Some(idx) = self.player_index(conn) else {
      return;
    };
    let player = &mut self.players[idx];
    player.connected = false;
    player.last_seen = now;
    let name = player.name.clone();
    if let Some(active) = active_of(&mut self.mode) {
      if active.buzzed == Some(conn) {
        active.buzzed = None;
      }
    }
    tracing::info!(room_id = %self.id, player = %name, "player disconnected");
    self.send_log("System", format!("{} disconnected", name));
    self.settle();
    self.notify();
  }

  /// Drops players offline for longer than `grace`. Returns whether any were removed.
  fn sweep_offline(&mut self, now: Instant, grace: Duration) -> bool {
    let expired: Vec<ConnectionId> = self
      .players
      .iter()
      .filter(|p| !p.connected && now.saturating_duration_since(p.last_seen) >= grace)
      .map(|p| p.id)
      .collect();
    for id in &expired {
      if let Some(idx) = self.player_index(*id) {
        let removed = self.remove_player(idx);
        tracing::info!(room_id = %self.id, player = %removed.name, "player timed out");
        self.send_log("System", format!("{} timed out", removed.name));
      }
    }
    if !expired.is_empty() {
      self.settle();
    }
    !expired.is_empty()
  }

  fn remove_player(&mut self, idx: usize) -> Player {
    let removed = self.players.remove(idx);
    if self.players.is_empty() {
      self.schedule.cancel();
      self.current_player_index = 0;
      self.creator_id = None;
      return removed;
    }

    if self.current_player_index > idx {
      self.current_player_index -= 1;
    } else if self.current_player_index == idx {
      self.current_player_index = 0;
      if matches!(self.phase, Phase::SelectingValue | Phase::Question) {
        self.schedule.cancel();
        self.clear_turn();
        self.feedback = None;
        self.enter_selection();
      }
    }
    if self.current_player_index >= self.players.len() {
      self.current_player_index = 0;
    }

    if let Some(active) = active_of(&mut self.mode) {
      active.forget(removed.id);
    }
    for (i, p) in self.players.iter_mut().enumerate() {
      p.number = i + 1;
    }
    if self.creator_id == Some(removed.id) {
      self.creator_id = self.players.first().map(|p| p.id);
    }
    removed
  }

  /// Closes whatever is waiting on players who are no longer there.
  fn settle(&mut self) {
    match self.phase {
      Phase::Question => {
        let question = active_ref(&self.mode)
          .filter(|a| !a.attempts.is_empty() && a.everyone_tried(&self.players))
          .map(|a| a.question.clone());
        if let Some(question) = question {
          self.close_all_wrong(&question);
        }
      }
      Phase::RoundActive => {
        let done = matches!(&self.mode, ModeState::WordDefinition(d) if d.all_answered(&self.players));
        if done {
          self.close_round();
        }
      }
      _ => {}
    }
  }

  // ---------------------------------------------------------------------------
  // Lobby
  // ---------------------------------------------------------------------------

  pub fn update_settings(&mut self, conn: ConnectionId, patch: &SettingsPatch) -> Result<(), Rejection> {
    self.member(conn)?;
    if !self.is_host(conn) {
      return Err(Rejection::NotHost);
    }
    self.ensure_phase(&[Phase::Lobby])?;
    self.settings.apply(patch);
    if let ModeState::LetterClaim(l) = &mut self.mode {
      l.set_topology(self.settings.topology);
    }
    self.notify();
    Ok(())
  }

  pub fn start(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
    self.member(conn)?;
    if !self.is_host(conn) {
      return Err(Rejection::NotHost);
    }
    self.ensure_phase(&[Phase::Lobby])?;

    let per_category = self.settings.questions_per_category;
    let rounds = self.settings.round_count;
    match &mut self.mode {
      ModeState::QuizBoard(board) => {
        if board.lay_out(per_category, &mut self.rng) == 0 {
          return Err(Rejection::NoQuestions);
        }
        self.phase = Phase::SelectingCategory;
      }
      ModeState::LetterClaim(letters) => {
        if !letters.has_questions() {
          return Err(Rejection::NoQuestions);
        }
        self.phase = Phase::SelectingLetter;
      }
      ModeState::WordBuilder(words) => {
        words.reset(rounds);
        self.begin_countdown();
      }
      ModeState::WordDefinition(defs) => {
        if defs.reset(rounds) == 0 {
          return Err(Rejection::NoQuestions);
        }
        self.begin_countdown();
      }
    }
    self.current_player_index = 0;
    self.feedback = None;
    self.winner = None;
    tracing::info!(room_id = %self.id, game_type = %self.game_type, "game started");
    self.send_log("System", "Game started".into());
    self.notify();
    Ok(())
  }

  // ---------------------------------------------------------------------------
  // Turn-based modes
  // ---------------------------------------------------------------------------

  pub fn pick_category(&mut self, conn: ConnectionId, category: &str) -> Result<(), Rejection> {
    self.ensure_phase(&[Phase::SelectingCategory])?;
    self.ensure_turn(conn)?;
    let game_type = self.game_type;
    let ModeState::QuizBoard(board) = &mut self.mode else {
      return Err(Rejection::WrongGameType(game_type));
    };
    if !board.has_open(category) {
      return Err(Rejection::UnknownCategory);
    }
    board.selected_category = Some(category.to_string());
    self.feedback = None;
    self.phase = Phase::SelectingValue;
    self.notify();
    Ok(())
  }

  /// Poses the chosen question, or resolves a luck event in its place.
  pub fn pick_value(&mut self, conn: ConnectionId, value: i64) -> Result<(), Rejection> {
    self.ensure_phase(&[Phase::SelectingValue])?;
    self.ensure_turn(conn)?;
    let game_type = self.game_type;
    let luck_rate = self.settings.luck_rate.clamp(0.0, 1.0);
    let question_secs = self.settings.timing.question_secs;
    let current = self.current_player_index;

    let ModeState::QuizBoard(board) = &mut self.mode else {
      return Err(Rejection::WrongGameType(game_type));
    };
    let category = board
      .selected_category
      .clone()
      .ok_or(Rejection::UnknownCategory)?;
    let idx = board
      .find_open(&category, value)
      .ok_or(Rejection::UnknownValue)?;

    if self.rng.gen_bool(luck_rate) {
      let effect = LuckEffect::roll(&mut self.rng);
      let question = &mut board.questions[idx];
      question.is_answered = true;
      let worth = question.value;
      board.selected_category = None;

      let player = &mut self.players[current];
      let before = player.score;
      player.score = effect.apply(before, worth);
      let (pid, name, delta) = (player.id, player.name.clone(), player.score - before);
      self.feedback = Some(Feedback {
        kind: FeedbackKind::Luck,
        player_id: Some(pid),
        points: delta,
        answer: None,
        luck: Some(effect),
      });
      self.phase = Phase::Feedback;
      self.send_log("Game", format!("{name} hit a luck event: {effect}"));
    } else {
      let question = board.questions[idx].clone();
      let options = question.options.clone();
      board.active = Some(ActiveQuestion::new(question, options));
      self.feedback = None;
      self.phase = Phase::Question;
      self
        .schedule
        .arm(Phase::Question, Deadline::QuestionTimeout, question_secs);
    }
    self.notify();
    Ok(())
  }

  pub fn pick_letter(&mut self, conn: ConnectionId, cell_id: usize) -> Result<(), Rejection> {
    self.ensure_phase(&[Phase::SelectingLetter])?;
    self.ensure_turn(conn)?;
    let game_type = self.game_type;
    let question_secs = self.settings.timing.question_secs;
    let ModeState::LetterClaim(letters) = &mut self.mode else {
      return Err(Rejection::WrongGameType(game_type));
    };
    letters.pose(cell_id, &mut self.rng)?;
    self.feedback = None;
    self.phase = Phase::Question;
    self
      .schedule
      .arm(Phase::Question, Deadline::QuestionTimeout, question_secs);
    self.notify();
    Ok(())
  }

  pub fn buzz(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    self.ensure_phase(&[Phase::Question])?;
    let phase = self.phase;
    let active = active_of(&mut self.mode).ok_or(Rejection::WrongPhase(phase))?;
    active.buzz(conn)?;
    tracing::debug!(room_id = %self.id, player = %self.players[idx].name, "buzz accepted");
    self.notify();
    Ok(())
  }

  pub fn submit_answer(&mut self, conn: ConnectionId, answer: &str) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    self.ensure_phase(&[Phase::Question])?;
    let phase = self.phase;
    let arabic = self.game_type == GameType::LetterClaim;
    let active = active_of(&mut self.mode).ok_or(Rejection::WrongPhase(phase))?;
    active.ensure_holder(conn)?;
    let question = active.question.clone();
    let name = self.players[idx].name.clone();

    if answers_match(answer, &question.answer, arabic) {
      self.schedule.cancel();
      let score = &mut self.players[idx].score;
      *score = score.saturating_add(question.value);
      self.feedback = Some(Feedback {
        kind: FeedbackKind::Correct,
        player_id: Some(conn),
        points: question.value,
        answer: Some(question.answer.clone()),
        luck: None,
      });
      let team = self.players[idx].team;
      self.resolve_question(&question.id, Some((conn, team)));
      self.send_log("Game", format!("{name} answered correctly (+{})", question.value));
      if self.grid_winner().is_some() {
        self.clear_turn();
        self.finish();
      } else {
        self.phase = Phase::Feedback;
      }
    } else {
      let score = &mut self.players[idx].score;
      *score = score.saturating_sub(question.value);
      let everyone = match active_of(&mut self.mode) {
        Some(active) => {
          active.record_miss(conn);
          active.everyone_tried(&self.players)
        }
        None => true,
      };
      self.send_log("Game", format!("{name} answered wrong (-{})", question.value));
      if everyone {
        self.close_all_wrong(&question);
      } else {
        self.feedback = Some(Feedback {
          kind: FeedbackKind::Wrong,
          player_id: Some(conn),
          points: question.value.saturating_neg(),
          answer: None,
          luck: None,
        });
        self.schedule.arm(
          Phase::Question,
          Deadline::QuestionTimeout,
          self.settings.timing.retry_secs,
        );
      }
    }
    self.notify();
    Ok(())
  }

  /// Judge or timeout decision for the current player, skipping the buzzer.
  pub fn answer_question(&mut self, conn: ConnectionId, is_correct: bool) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    self.ensure_phase(&[Phase::Question])?;
    if !self.is_host(conn) && idx != self.current_player_index {
      return Err(Rejection::NotHost);
    }
    self.resolve_for_current(is_correct, FeedbackKind::Override);
    self.notify();
    Ok(())
  }

  pub fn close_feedback(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
    self.member(conn)?;
    self.ensure_phase(&[Phase::Feedback])?;
    self.feedback = None;
    self.clear_turn();
    if self.exhausted() {
      self.finish();
    } else {
      self.advance_turn();
      self.enter_selection();
    }
    self.notify();
    Ok(())
  }

  pub fn forfeit(&mut self, conn: ConnectionId) -> Result<(), Rejection> {
    let idx = self.member(conn)?;
    if matches!(self.phase, Phase::Lobby | Phase::GameOver) {
      return Err(Rejection::WrongPhase(self.phase));
    }
    self.schedule.cancel();
    self.clear_turn();
    self.winner = self.top_scorer(Some(conn)).or_else(|| self.top_scorer(None));
    self.phase = Phase::GameOver;
    let name = self.players[idx].name.clone();
    tracing::info!(room_id = %self.id, player = %name, "player forfeited");
    self.send_log("System", format!("{name} forfeited"));
    self.notify();
    Ok(())
  }

  fn close_all_wrong(&mut self, question: &Question) {
    self.schedule.cancel();
    self.feedback = Some(Feedback {
      kind: FeedbackKind::AllWrong,
      player_id: None,
      points: 0,
      answer: Some(question.answer.clone()),
      luck: None,
    });
    self.resolve_question(&question.id, None);
    self.phase = Phase::Feedback;
  }

  /// Scores the current player directly and moves on to the next pick.
  fn resolve_for_current(&mut self, correct: bool, kind: FeedbackKind) {
    let Some(question) = active_ref(&self.mode).map(|a| a.question.clone()) else {
      return;
    };
    self.schedule.cancel();
    let current = self.current_player_index;
    let Some(player) = self.players.get_mut(current) else {
      return;
    };
    let points = if correct { question.value } else { 0 };
    player.score = player.score.saturating_add(points);
    let (pid, team) = (player.id, player.team);
    self.feedback = Some(Feedback {
      kind,
      player_id: Some(pid),
      points,
      answer: Some(question.answer.clone()),
      luck: None,
    });
    self.resolve_question(&question.id, correct.then_some((pid, team)));
    if self.grid_winner().is_some() {
      self.clear_turn();
      self.finish();
      return;
    }
    self.clear_turn();
    if self.exhausted() {
      self.finish();
    } else {
      self.advance_turn();
      self.enter_selection();
    }
  }

  /// Marks the question as used and, on a letter grid, claims the cell.
  fn resolve_question(&mut self, question_id: &str, claimant: Option<(ConnectionId, Option<Team>)>) {
    match &mut self.mode {
      ModeState::QuizBoard(board) => board.mark_answered(question_id),
      ModeState::LetterClaim(letters) => {
        letters.mark_used(question_id);
        if let (Some((id, Some(team))), Some(cell)) = (claimant, letters.selected_cell) {
          letters.grid.claim(cell, id, team);
        }
      }
      _ => {}
    }
  }

  fn clear_turn(&mut self) {
    match &mut self.mode {
      ModeState::QuizBoard(board) => board.clear_turn(),
      ModeState::LetterClaim(letters) => letters.clear_turn(),
      _ => {}
    }
  }

  fn grid_winner(&self) -> Option<Team> {
    match &self.mode {
      ModeState::LetterClaim(letters) => letters.grid.winner(),
      _ => None,
    }
  }

  fn exhausted(&self) -> bool {
    match &self.mode {
      ModeState::QuizBoard(board) => board.exhausted(),
      ModeState::LetterClaim(letters) => letters.grid.is_full(),
      _ => false,
    }
  }

  /// Next player in join order; on the letter grid, the next player of the
  /// other team when there is one.
  fn advance_turn(&mut self) {
    let n = self.players.len();
    if n == 0 {
      self.current_player_index = 0;
      return;
    }
    let from = self.current_player_index.min(n - 1);
    let mut next = (from + 1) % n;
    if self.game_type == GameType::LetterClaim {
      let team = self.players[from].team;
      if let Some(other) = (1..n)
        .map(|k| (from + k) % n)
        .find(|&i| self.players[i].team != team)
      {
        next = other;
      }
    }
    self.current_player_index = next;
  }

  fn enter_selection(&mut self) {
    if self.exhausted() {
      self.finish();
      return;
    }
    self.phase = match self.game_type {
      GameType::LetterClaim => Phase::SelectingLetter,
      _ => Phase::SelectingCategory,
    };
  }

  fn top_scorer(&self, excluding: Option<ConnectionId>) -> Option<Winner> {
    self
      .players
      .iter()
      .filter(|p| Some(p.id) != excluding)
      .rev()
      .max_by_key(|p| p.score)
      .map(|p| Winner::Player {
        id: p.id,
        name: p.name.clone(),
        score: p.score,
      })
  }

  fn finish(&mut self) {
    self.schedule.cancel();
    let team = match &self.mode {
      ModeState::LetterClaim(letters) => letters.grid.winner().or_else(|| letters.grid.majority()),
      _ => None,
    };
    self.winner = match team {
      Some(team) => Some(Winner::Team { team }),
      None => self.top_scorer(None),
    };
    self.phase = Phase::GameOver;
    tracing::info!(room_id = %self.id, "game over");
    self.send_log("System", "Game over".into());
  }

  // ---------------------------------------------------------------------------
  // Round-based modes
  // ---------------------------------------------------------------------------

  fn begin_countdown(&mut self) {
    self.phase = Phase::Countdown;
    self.schedule.arm(
      Phase::Countdown,
      Deadline::CountdownOver,
      self.settings.timing.countdown_secs,
    );
  }

  pub fn submit_round(
    &mut self,
    conn: ConnectionId,
    answers: &HashMap<String, String>,
    finished: bool,
  ) -> Result<(), Rejection> {
    self.member(conn)?;
    self.ensure_phase(&[Phase::RoundActive])?;
    let game_type = self.game_type;
    let grace = self.settings.timing.finish_grace_secs;
    let ModeState::WordBuilder(words) = &mut self.mode else {
      return Err(Rejection::WrongGameType(game_type));
    };
    let parsed = answers
      .iter()
      .filter_map(|(k, v)| WordCategory::from_str(k).ok().map(|c| (c, v.clone())))
      .collect();
    words.submit(conn, parsed);
    if finished && words.finished_by.is_none() {
      words.finished_by = Some(conn);
      self.schedule.collapse(grace);
    }
    self.notify();
    Ok(())
  }

  pub fn submit_choice(&mut self, conn: ConnectionId, answer: &str) -> Result<(), Rejection> {
    self.member(conn)?;
    self.ensure_phase(&[Phase::RoundActive])?;
    let game_type = self.game_type;
    let ModeState::WordDefinition(defs) = &mut self.mode else {
      return Err(Rejection::WrongGameType(game_type));
    };
    defs.submit(conn, answer)?;
    if defs.all_answered(&self.players) {
      self.close_round();
    }
    self.notify();
    Ok(())
  }

  fn begin_round(&mut self) {
    let timing = self.settings.timing;
    let started = match &mut self.mode {
      ModeState::WordBuilder(words) => {
        let letter = words.begin_round(&mut self.rng);
        tracing::debug!(room_id = %self.id, %letter, "word round started");
        self
          .schedule
          .arm(Phase::RoundActive, Deadline::RoundOver, timing.word_round_secs);
        true
      }
      ModeState::WordDefinition(defs) => {
        let ok = defs.begin_round(&mut self.rng);
        if ok {
          self.schedule.arm(
            Phase::RoundActive,
            Deadline::RoundOver,
            timing.definition_round_secs,
          );
        }
        ok
      }
      _ => false,
    };
    if started {
      self.phase = Phase::RoundActive;
    } else {
      self.finish();
    }
  }

  fn close_round(&mut self) {
    let timing = self.settings.timing;
    let reveal = match &mut self.mode {
      ModeState::WordBuilder(words) => {
        words.score_round(&mut self.players);
        timing.word_scoring_secs
      }
      ModeState::WordDefinition(defs) => {
        defs.close_round(&mut self.players);
        timing.definition_reveal_secs
      }
      _ => return,
    };
    self.phase = Phase::RoundScoring;
    self
      .schedule
      .arm(Phase::RoundScoring, Deadline::ScoringOver, reveal);
  }

  fn next_round_or_finish(&mut self) {
    let more = match &self.mode {
      ModeState::WordBuilder(words) => words.has_more_rounds(),
      ModeState::WordDefinition(defs) => defs.has_more_rounds(),
      _ => false,
    };
    if more {
      self.begin_countdown();
    } else {
      self.finish();
    }
  }

  // ---------------------------------------------------------------------------
  // Clock
  // ---------------------------------------------------------------------------

  fn on_deadline(&mut self, deadline: Deadline) {
    tracing::debug!(room_id = %self.id, ?deadline, "deadline reached");
    match deadline {
      Deadline::QuestionTimeout => {
        self.resolve_for_current(false, FeedbackKind::TimeUp);
      }
      Deadline::CountdownOver => self.begin_round(),
      Deadline::RoundOver => self.close_round(),
      Deadline::ScoringOver => self.next_round_or_finish(),
    }
  }

  /// One scheduler second. Returns whether anything changed; changes are broadcast.
  pub fn tick(&mut self, now: Instant, grace: Duration) -> bool {
    let mut changed = self.sweep_offline(now, grace);
    match self.schedule.tick(self.phase) {
      Tick::Idle => {}
      Tick::Running(_) => changed = true,
      Tick::Fired(deadline) => {
        self.on_deadline(deadline);
        changed = true;
      }
    }
    if changed && !self.players.is_empty() {
      self.notify();
    }
    changed
  }

  // ---------------------------------------------------------------------------
  // Views
  // ---------------------------------------------------------------------------

  pub fn snapshot(&self) -> RoomSnapshot {
    RoomSnapshot {
      id: self.id.clone(),
      game_type: self.game_type,
      status: self.phase,
      players: self.players.iter().map(Player::view).collect(),
      current_player_index: self.current_player_index,
      creator_id: self.creator_id,
      timer: self.schedule.remaining(),
      settings: self.settings.clone(),
      feedback: self.feedback.clone(),
      winner: self.winner.clone(),
      board: match &self.mode {
        ModeState::QuizBoard(b) => Some(b.view()),
        _ => None,
      },
      letters: match &self.mode {
        ModeState::LetterClaim(l) => Some(l.view()),
        _ => None,
      },
      words: match &self.mode {
        ModeState::WordBuilder(w) => Some(w.view()),
        _ => None,
      },
      definitions: match &self.mode {
        ModeState::WordDefinition(d) => Some(d.view()),
        _ => None,
      },
    }
  }

  pub fn summary(&self) -> RoomSummary {
    RoomSummary {
      id: self.id.clone(),
      game_type: self.game_type,
      phase: self.phase,
      player_count: self.players.len(),
    }
  }
}
