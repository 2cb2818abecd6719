use crate::game::Question;
use crate::models::GameType;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_VALUE: i64 = 100;

fn new_id() -> String {
  Uuid::now_v7().to_string()
}

fn default_value() -> Option<i64> {
  Some(DEFAULT_VALUE)
}

/// One stored question. Every field may be missing on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolEntry {
  #[serde(default = "new_id")]
  pub id: String,
  #[serde(default)]
  pub game: GameType,
  #[serde(default)]
  pub category: String,
  #[serde(default = "default_value")]
  pub value: Option<i64>,
  #[serde(default)]
  pub question: String,
  #[serde(default)]
  pub answer: Option<String>,
  #[serde(default)]
  pub options: Option<Vec<String>>,
}

impl PoolEntry {
  pub fn to_question(&self) -> Question {
    Question {
      id: self.id.clone(),
      category: self.category.trim().to_string(),
      value: self.value.unwrap_or(DEFAULT_VALUE),
      question: self.question.clone(),
      answer: self.answer.clone().unwrap_or_default(),
      options: self.options.clone().unwrap_or_default(),
      is_answered: false,
    }
  }
}

/// The question bank, loaded once at startup and edited through the admin API.
pub struct QuestionPool {
  path: PathBuf,
  entries: Vec<PoolEntry>,
}

impl QuestionPool {
  /// Reads the pool file. A missing file yields an empty pool.
  pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let path = path.as_ref().to_path_buf();
    let entries = match std::fs::read_to_string(&path) {
      Ok(text) => serde_json::from_str::<Vec<PoolEntry>>(&text)
        .with_context(|| format!("malformed question pool {}", path.display()))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::warn!(path = %path.display(), "question pool not found, starting empty");
        vec![]
      }
      Err(e) => {
        return Err(e).with_context(|| format!("failed to read {}", path.display()));
      }
    };
    tracing::info!(path = %path.display(), count = entries.len(), "question pool loaded");
    Ok(Self { path, entries })
  }

  pub fn from_entries(path: impl Into<PathBuf>, entries: Vec<PoolEntry>) -> Self {
    Self {
      path: path.into(),
      entries,
    }
  }

  pub async fn save(&self) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&self.entries)?;
    tokio::fs::write(&self.path, json)
      .await
      .with_context(|| format!("failed to write {}", self.path.display()))?;
    tracing::debug!(path = %self.path.display(), count = self.entries.len(), "question pool saved");
    Ok(())
  }

  /// Applies `change` and writes the pool out. If the write fails the change is
  /// rolled back, so memory never runs ahead of disk.
  pub async fn edit<T>(&mut self, change: impl FnOnce(&mut Self) -> T) -> anyhow::Result<T> {
    let before = self.entries.clone();
    let out = change(self);
    if let Err(e) = self.save().await {
      self.entries = before;
      return Err(e);
    }
    Ok(out)
  }

  pub fn list(&self) -> &[PoolEntry] {
    &self.entries
  }

  pub fn get(&self, id: &str) -> Option<&PoolEntry> {
    self.entries.iter().find(|e| e.id == id)
  }

  pub fn insert(&mut self, entry: PoolEntry) -> &PoolEntry {
    self.entries.retain(|e| e.id != entry.id);
    self.entries.push(entry);
    &self.entries[self.entries.len() - 1]
  }

  /// Replaces the entry with `id`, keeping the id. Returns false when absent.
  pub fn update(&mut self, id: &str, mut entry: PoolEntry) -> bool {
    let Some(slot) = self.entries.iter_mut().find(|e| e.id == id) else {
      return false;
    };
    entry.id = id.to_string();
    *slot = entry;
    true
  }

  pub fn remove(&mut self, id: &str) -> bool {
    let before = self.entries.len();
    self.entries.retain(|e| e.id != id);
    self.entries.len() != before
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Snapshot of the questions a new room of `game_type` plays with.
  pub fn questions_for(&self, game_type: GameType) -> Vec<Question> {
    self
      .entries
      .iter()
      .filter(|e| e.game == game_type)
      .map(PoolEntry::to_question)
      .collect()
  }
}
