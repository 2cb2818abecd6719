use super::buzzer::ActiveQuestion;
use super::normalize::{first_letter, fold_letter, normalize_arabic};
use super::{Question, Rejection};
use crate::models::{ConnectionId, QuestionView, Team, Topology};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::VecDeque;

/// The 28 letters plus the standalone hamza.
pub const ALPHABET: [char; 29] = [
  'ا', 'ب', 'ت', 'ث', 'ج', 'ح', 'خ', 'د', 'ذ', 'ر', 'ز', 'س', 'ش', 'ص', 'ض', 'ط', 'ظ', 'ع', 'غ', 'ف',
  'ق', 'ك', 'ل', 'م', 'ن', 'ه', 'و', 'ي', 'ء',
];

pub const HAMZA: char = 'ء';
pub const GRID_SIDE: usize = 5;
pub const GRID_CELLS: usize = GRID_SIDE * GRID_SIDE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
  TopToBottom,
  LeftToRight,
}

impl Team {
  /// Red links the left and right edges, blue links top and bottom.
  pub fn axis(self) -> Axis {
    match self {
      Team::Red => Axis::LeftToRight,
      Team::Blue => Axis::TopToBottom,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
  pub id: usize,
  pub letter: char,
  pub owner_id: Option<ConnectionId>,
  pub owner_team: Option<Team>,
}

#[derive(Debug, Clone)]
pub struct Grid {
  pub topology: Topology,
  pub cells: Vec<Cell>,
}

impl Grid {
  pub fn new(topology: Topology, rng: &mut impl Rng) -> Self {
    let mut letters = ALPHABET.to_vec();
    letters.shuffle(rng);
    let cells = letters
      .into_iter()
      .take(GRID_CELLS)
      .enumerate()
      .map(|(id, letter)| Cell {
        id,
        letter,
        owner_id: None,
        owner_team: None,
      })
      .collect();
    Self { topology, cells }
  }

  pub fn cell(&self, id: usize) -> Option<&Cell> {
    self.cells.get(id)
  }

  pub fn is_open(&self, id: usize) -> bool {
    self.cell(id).is_some_and(|c| c.owner_team.is_none())
  }

  /// Claims an unowned cell. Returns false if the cell is missing or taken.
  pub fn claim(&mut self, id: usize, owner: ConnectionId, team: Team) -> bool {
    match self.cells.get_mut(id) {
      Some(cell) if cell.owner_team.is_none() => {
        cell.owner_id = Some(owner);
        cell.owner_team = Some(team);
        true
      }
      _ => false,
    }
  }

  pub fn is_full(&self) -> bool {
    self.cells.iter().all(|c| c.owner_team.is_some())
  }

  pub fn neighbors(&self, id: usize) -> Vec<usize> {
    let (row, col) = ((id / GRID_SIDE) as isize, (id % GRID_SIDE) as isize);
    let offsets: &[(isize, isize)] = match self.topology {
      Topology::Square => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
      Topology::Hex if row % 2 == 0 => &[(-1, -1), (-1, 0), (0, -1), (0, 1), (1, -1), (1, 0)],
      Topology::Hex => &[(-1, 0), (-1, 1), (0, -1), (0, 1), (1, 0), (1, 1)],
    };
    let side = GRID_SIDE as isize;
    offsets
      .iter()
      .map(|(dr, dc)| (row + dr, col + dc))
      .filter(|&(r, c)| (0..side).contains(&r) && (0..side).contains(&c))
      .map(|(r, c)| (r * side + c) as usize)
      .collect()
  }

  /// Breadth-first search from one edge of `axis` to the opposite edge over
  /// cells owned by `team`.
  pub fn has_connected_path(&self, team: Team, axis: Axis) -> bool {
    let owned = |id: usize| self.cells.get(id).is_some_and(|c| c.owner_team == Some(team));
    let is_goal = |id: usize| match axis {
      Axis::TopToBottom => id / GRID_SIDE == GRID_SIDE - 1,
      Axis::LeftToRight => id % GRID_SIDE == GRID_SIDE - 1,
    };

    let mut seen = [false; GRID_CELLS];
    let mut queue = VecDeque::new();
    for i in 0..GRID_SIDE {
      let start = match axis {
        Axis::TopToBottom => i,
        Axis::LeftToRight => i * GRID_SIDE,
      };
      if owned(start) {
        seen[start] = true;
        queue.push_back(start);
      }
    }

    while let Some(id) = queue.pop_front() {
      if is_goal(id) {
        return true;
      }
      for next in self.neighbors(id) {
        if !seen[next] && owned(next) {
          seen[next] = true;
          queue.push_back(next);
        }
      }
    }
    false
  }

  pub fn winner(&self) -> Option<Team> {
    [Team::Red, Team::Blue]
      .into_iter()
      .find(|&team| self.has_connected_path(team, team.axis()))
  }

  /// Team holding more cells, if any.
  pub fn majority(&self) -> Option<Team> {
    let red = self
      .cells
      .iter()
      .filter(|c| c.owner_team == Some(Team::Red))
      .count();
    let blue = self
      .cells
      .iter()
      .filter(|c| c.owner_team == Some(Team::Blue))
      .count();
    match red.cmp(&blue) {
      std::cmp::Ordering::Greater => Some(Team::Red),
      std::cmp::Ordering::Less => Some(Team::Blue),
      std::cmp::Ordering::Equal => None,
    }
  }

  pub fn rebind(&mut self, old: ConnectionId, new: ConnectionId) {
    for cell in self.cells.iter_mut().filter(|c| c.owner_id == Some(old)) {
      cell.owner_id = Some(new);
    }
  }
}

pub struct LetterClaim {
  pub grid: Grid,
  pool: Vec<Question>,
  pub selected_cell: Option<usize>,
  pub active: Option<ActiveQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LettersView {
  pub topology: Topology,
  pub grid: Vec<Cell>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub selected_cell: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active_question: Option<QuestionView>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub buzzed_player_id: Option<ConnectionId>,
  pub attempts: Vec<ConnectionId>,
}

fn starts_with(text: &str, letter: char) -> bool {
  first_letter(text) == Some(letter)
}

impl LetterClaim {
  pub fn new(pool: Vec<Question>, topology: Topology, rng: &mut impl Rng) -> Self {
    Self {
      grid: Grid::new(topology, rng),
      pool,
      selected_cell: None,
      active: None,
    }
  }

  pub fn has_questions(&self) -> bool {
    !self.pool.is_empty()
  }

  /// Opens the question for `cell_id`.
  pub fn pose(&mut self, cell_id: usize, rng: &mut impl Rng) -> Result<(), Rejection> {
    let letter = match self.grid.cell(cell_id) {
      Some(cell) if cell.owner_team.is_none() => cell.letter,
      _ => return Err(Rejection::CellUnavailable(cell_id)),
    };
    let question = self.pick_question(letter, rng).ok_or(Rejection::NoQuestions)?;
    let options = self.build_options(letter, &question, rng);
    self.selected_cell = Some(cell_id);
    self.active = Some(ActiveQuestion::new(question, options));
    Ok(())
  }

  /// Prefers unused questions whose prompt or answer starts with the letter,
  /// then used ones, then anything unused, then anything.
  fn pick_question(&self, letter: char, rng: &mut impl Rng) -> Option<Question> {
    let letter = fold_letter(letter);
    let matches = |q: &&Question| starts_with(&q.answer, letter) || starts_with(&q.question, letter);
    let tiers: [Vec<&Question>; 4] = [
      self.pool.iter().filter(|q| !q.is_answered).filter(matches).collect(),
      self.pool.iter().filter(matches).collect(),
      self.pool.iter().filter(|q| !q.is_answered).collect(),
      self.pool.iter().collect(),
    ];
    tiers
      .iter()
      .find(|tier| !tier.is_empty())
      .and_then(|tier| tier.choose(rng))
      .map(|q| (*q).clone())
  }

  /// Correct answer plus three distractors sharing its first letter, or the
  /// question's own options when the pool has too few.
  fn build_options(&self, letter: char, question: &Question, rng: &mut impl Rng) -> Vec<String> {
    let letter = fold_letter(letter);
    let correct = normalize_arabic(&question.answer);
    let mut distractors: Vec<&str> = vec![];
    for q in &self.pool {
      let folded = normalize_arabic(&q.answer);
      if q.id != question.id
        && !folded.is_empty()
        && folded != correct
        && starts_with(&q.answer, letter)
        && !distractors.iter().any(|d| normalize_arabic(d) == folded)
      {
        distractors.push(&q.answer);
      }
    }
    if distractors.len() < 3 || question.answer.trim().is_empty() {
      return question.options.clone();
    }
    let mut options: Vec<String> = distractors
      .choose_multiple(rng, 3)
      .map(|d| d.to_string())
      .collect();
    options.push(question.answer.clone());
    options.shuffle(rng);
    options
  }

  pub fn mark_used(&mut self, id: &str) {
    for q in self.pool.iter_mut().filter(|q| q.id == id) {
      q.is_answered = true;
    }
  }

  pub fn clear_turn(&mut self) {
    self.selected_cell = None;
    self.active = None;
  }

  pub fn set_topology(&mut self, topology: Topology) {
    self.grid.topology = topology;
  }

  pub fn view(&self) -> LettersView {
    LettersView {
      topology: self.grid.topology,
      grid: self.grid.cells.clone(),
      selected_cell: self.selected_cell,
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
