//! Identity of a cacheable, pollable unit of server data.

use std::fmt;

/// Kind of resource behind a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
  /// Notes of a single board
  Notes,
  /// Boards visible to the current user
  Boards,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::Notes => "notes",
      ResourceKind::Boards => "boards",
    }
  }
}

/// (resource type, identifier, pagination) tuple.
///
/// Two keys are equal only when all three parts match, so different pages of
/// the same board are cached and polled independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
  pub kind: ResourceKind,
  pub id: String,
  pub page: Option<u32>,
}

impl ResourceKey {
  pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
    Self {
      kind,
      id: id.into(),
      page: None,
    }
  }

  pub fn notes(board_id: impl Into<String>) -> Self {
    Self::new(ResourceKind::Notes, board_id)
  }

  pub fn boards() -> Self {
    Self::new(ResourceKind::Boards, "")
  }

}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.kind.as_str())?;
    if !self.id.is_empty() {
      write!(f, "/{}", self.id)?;
    }
    if let Some(page) = self.page {
      write!(f, "/{}", page)?;
    }
    Ok(())
  }
}
