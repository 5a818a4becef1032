//! Multi-select over the current list, ahead of a batch delete.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{projection::CurrentEntry, subject::SubjectKey};

/// The rows an operator has ticked, by subject key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection {
  keys: BTreeSet<SubjectKey>,
}

impl Selection {
  pub fn new() -> Self { Self::default() }

  /// Tick or untick one row; returns whether it is now selected.
  pub fn toggle(&mut self, key: SubjectKey) -> bool {
    if self.keys.remove(&key) {
      false
    } else {
      self.keys.insert(key);
      true
    }
  }

  /// Select every row of `view`. Legacy rows without a key are skipped;
  /// they can only be deleted one event at a time.
  pub fn select_all(&mut self, view: &[CurrentEntry]) {
    self.keys.extend(
      view
        .iter()
        .filter(|row| !row.latest.subject_key.is_blank())
        .map(|row| row.latest.subject_key.clone()),
    );
  }

  pub fn clear(&mut self) { self.keys.clear(); }

  /// Drop selected keys that are no longer in `view`, e.g. after another
  /// terminal deleted them.
  pub fn retain_visible(&mut self, view: &[CurrentEntry]) {
    self
      .keys
      .retain(|k| view.iter().any(|row| &row.latest.subject_key == k));
  }

  pub fn is_selected(&self, key: &SubjectKey) -> bool { self.keys.contains(key) }

  pub fn len(&self) -> usize { self.keys.len() }

  pub fn is_empty(&self) -> bool { self.keys.is_empty() }

  pub fn keys(&self) -> impl Iterator<Item = &SubjectKey> + '_ { self.keys.iter() }
}

impl FromIterator<SubjectKey> for Selection {
  fn from_iter<I: IntoIterator<Item = SubjectKey>>(iter: I) -> Self {
    Self { keys: iter.into_iter().collect() }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::{
    event::{Direction, NewEvent, VisitContext, VisitEvent},
    projection::current_view,
    subject::SubjectKind,
  };

  fn view(keys: &[&str]) -> Vec<CurrentEntry> {
    let events: Vec<VisitEvent> = keys
      .iter()
      .map(|k| {
        VisitEvent::from_new(NewEvent {
          subject_key:  SubjectKey::from_raw(*k),
          kind:         SubjectKind::Visitor,
          direction:    Direction::Entry,
          recorded_at:  Utc::now(),
          visit_id:     None,
          display_name: (*k).to_owned(),
          context:      VisitContext::default(),
        })
      })
      .collect();
    current_view(&events)
  }

  #[test]
  fn toggle_selects_and_unselects() {
    let mut sel = Selection::new();
    let key = SubjectKey::visitor("123");
    assert!(sel.toggle(key.clone()));
    assert!(sel.is_selected(&key));
    assert!(!sel.toggle(key.clone()));
    assert!(sel.is_empty());
  }

  #[test]
  fn select_all_skips_legacy_rows() {
    let mut sel = Selection::new();
    sel.select_all(&view(&["person_1", "person_2", ""]));
    assert_eq!(sel.len(), 2);
  }

  #[test]
  fn retain_visible_drops_vanished_rows() {
    let mut sel = Selection::new();
    sel.select_all(&view(&["person_1", "person_2"]));
    sel.retain_visible(&view(&["person_2"]));
    assert_eq!(sel.len(), 1);
    assert!(sel.is_selected(&SubjectKey::from_raw("person_2")));
  }
}
