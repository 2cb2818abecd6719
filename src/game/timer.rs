use crate::models::Phase;

/// What a room does when its countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
  QuestionTimeout,
  CountdownOver,
  RoundOver,
  ScoringOver,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
  phase: Phase,
  deadline: Deadline,
  remaining: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
  Idle,
  Running(u32),
  Fired(Deadline),
}

/// The single countdown a room may have. Arming replaces whatever was armed,
/// and a countdown armed for one phase never fires in another.
#[derive(Debug, Default)]
pub struct Schedule {
  armed: Option<Armed>,
}

impl Schedule {
  pub fn arm(&mut self, phase: Phase, deadline: Deadline, seconds: u32) {
    self.armed = Some(Armed {
      phase,
      deadline,
      remaining: seconds,
    });
  }

  pub fn cancel(&mut self) {
    self.armed = None;
  }

  pub fn is_armed(&self) -> bool {
    self.armed.is_some()
  }

  pub fn remaining(&self) -> u32 {
    self.armed.map_or(0, |a| a.remaining)
  }

  /// Shortens the running countdown to at most `seconds`.
  pub fn collapse(&mut self, seconds: u32) {
    if let Some(armed) = self.armed.as_mut() {
      armed.remaining = armed.remaining.min(seconds);
    }
  }

  /// Advances one second. `phase` is the room's current phase; a countdown
  /// armed for another phase is discarded without firing.
  pub fn tick(&mut self, phase: Phase) -> Tick {
    let Some(armed) = self.armed.as_mut() else {
      return Tick::Idle;
    };
    if armed.phase != phase {
      self.armed = None;
      return Tick::Idle;
    }
    armed.remaining = armed.remaining.saturating_sub(1);
    if armed.remaining == 0 {
      let deadline = armed.deadline;
      self.armed = None;
      Tick::Fired(deadline)
    } else {
      Tick::Running(armed.remaining)
    }
  }
}
