//! The BOB board: typed entries in three columns with directed links
//! from later layers to earlier ones (decision → judgment → assessment).
//!
//! Boards hold a few dozen entries at most, so every query is a linear scan.

use serde::{Deserialize, Serialize};

use crate::error::LinkError;
use crate::model::{BobEntry, EntryType};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BobBoard {
    entries: Vec<BobEntry>,
}

impl BobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<BobEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BobEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&BobEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Adds an entry, replacing any entry with the same id in place.
    pub fn insert(&mut self, entry: BobEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == entry.id) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Removes an entry and every link pointing at it.
    pub fn remove(&mut self, id: &str) -> Option<BobEntry> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        let removed = self.entries.remove(pos);
        for entry in &mut self.entries {
            entry.linked_to.retain(|target| target != id);
        }
        Some(removed)
    }

    pub fn of_type(&self, entry_type: EntryType) -> impl Iterator<Item = &BobEntry> {
        self.entries.iter().filter(move |e| e.entry_type == entry_type)
    }

    /// Column-major walk: all assessments, then judgments, then decisions.
    fn layered(&self) -> impl Iterator<Item = &BobEntry> {
        EntryType::ALL.into_iter().flat_map(move |t| self.of_type(t))
    }

    /// Entries `entry` may link to, assessments first.
    pub fn available_targets(&self, entry: &BobEntry) -> Vec<&BobEntry> {
        entry
            .entry_type
            .permitted_targets()
            .iter()
            .flat_map(|t| self.of_type(*t))
            .collect()
    }

    /// What the link dialog offers: permitted targets not linked yet.
    pub fn link_candidates(&self, entry: &BobEntry) -> Vec<&BobEntry> {
        self.available_targets(entry)
            .into_iter()
            .filter(|target| !entry.linked_to.contains(&target.id))
            .collect()
    }

    pub fn linked_entries(&self, entry_id: &str) -> Vec<&BobEntry> {
        let Some(entry) = self.get(entry_id) else {
            return Vec::new();
        };
        self.layered()
            .filter(|candidate| entry.linked_to.contains(&candidate.id))
            .collect()
    }

    pub fn has_incoming_links(&self, entry_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.linked_to.iter().any(|target| target == entry_id))
    }

    /// Links `from_id` to each of `to_ids`, skipping edges that already exist.
    ///
    /// Every target is checked before anything is written, so a rejected call
    /// leaves the board untouched. Returns the ids that were newly linked.
    pub fn create_link<S: AsRef<str>>(
        &mut self,
        from_id: &str,
        to_ids: &[S],
    ) -> Result<Vec<String>, LinkError> {
        let source_type = self
            .get(from_id)
            .map(|e| e.entry_type)
            .ok_or_else(|| LinkError::UnknownEntry(from_id.to_string()))?;

        for to_id in to_ids {
            let to_id = to_id.as_ref();
            let target = self
                .get(to_id)
                .ok_or_else(|| LinkError::UnknownEntry(to_id.to_string()))?;
            if !source_type.can_link_to(target.entry_type) {
                return Err(LinkError::NotPermitted {
                    from: source_type,
                    to: target.entry_type,
                });
            }
        }

        let Some(source) = self.entries.iter_mut().find(|e| e.id == from_id) else {
            return Err(LinkError::UnknownEntry(from_id.to_string()));
        };
        let mut added = Vec::new();
        for to_id in to_ids {
            let to_id = to_id.as_ref();
            if !source.linked_to.iter().any(|t| t == to_id) {
                source.linked_to.push(to_id.to_string());
                added.push(to_id.to_string());
            }
        }
        Ok(added)
    }

    pub fn remove_link(&mut self, from_id: &str, to_id: &str) -> bool {
        let Some(source) = self.entries.iter_mut().find(|e| e.id == from_id) else {
            return false;
        };
        let before = source.linked_to.len();
        source.linked_to.retain(|t| t != to_id);
        source.linked_to.len() != before
    }

    pub fn columns(&self) -> Vec<BoardColumn> {
        EntryType::ALL
            .into_iter()
            .map(|entry_type| BoardColumn {
                entry_type,
                title: entry_type.column_title().to_string(),
                cards: self.of_type(entry_type).map(|e| self.card(e)).collect(),
            })
            .collect()
    }

    fn card(&self, entry: &BobEntry) -> BoardCard {
        BoardCard {
            entry: entry.clone(),
            has_incoming_links: self.has_incoming_links(&entry.id),
            linked_entries: self
                .linked_entries(&entry.id)
                .into_iter()
                .map(LinkedRef::from)
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub entry_type: EntryType,
    pub title: String,
    pub cards: Vec<BoardCard>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCard {
    pub entry: BobEntry,
    pub has_incoming_links: bool,
    pub linked_entries: Vec<LinkedRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRef {
    pub id: String,
    pub entry_type: EntryType,
    pub content: String,
}

impl From<&BobEntry> for LinkedRef {
    fn from(entry: &BobEntry) -> Self {
        Self {
            id: entry.id.clone(),
            entry_type: entry.entry_type,
            content: entry.content.clone(),
        }
    }
}

/// Targets ticked in the link dialog, in the order they were ticked.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetSelection {
    targets: Vec<String>,
}

impl TargetSelection {
    pub fn toggle(&mut self, target_id: &str) {
        if let Some(pos) = self.targets.iter().position(|t| t == target_id) {
            self.targets.remove(pos);
        } else {
            self.targets.push(target_id.to_string());
        }
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.targets.iter().any(|t| t == target_id)
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(id: &str, entry_type: EntryType, content: &str) -> BobEntry {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).single().expect("time");
        BobEntry {
            id: id.into(),
            crisis_id: None,
            user_id: "u1".into(),
            entry_type,
            content: content.into(),
            created_at: at,
            updated_at: at,
            linked_to: Vec::new(),
        }
    }

    fn sample_board() -> BobBoard {
        BobBoard::from_entries(vec![
            entry("d1", EntryType::Decision, "Evacuate east wing"),
            entry("a1", EntryType::Assessment, "Fire reported"),
            entry("j1", EntryType::Judgment, "Building unsafe"),
            entry("a2", EntryType::Assessment, "Smoke on floor 3"),
        ])
    }

    #[test]
    fn assessments_have_no_targets() {
        let board = sample_board();
        let a1 = board.get("a1").expect("a1").clone();
        assert!(board.available_targets(&a1).is_empty());
    }

    #[test]
    fn judgments_target_only_assessments() {
        let board = sample_board();
        let j1 = board.get("j1").expect("j1").clone();
        let ids: Vec<_> = board.available_targets(&j1).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn decisions_target_assessments_then_judgments() {
        let board = sample_board();
        let d1 = board.get("d1").expect("d1").clone();
        let targets = board.available_targets(&d1);
        let ids: Vec<_> = targets.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2", "j1"]);
        assert!(targets.iter().all(|t| t.entry_type != EntryType::Decision));
    }

    #[test]
    fn link_dialog_offers_only_unlinked_targets() {
        let mut board = sample_board();
        board.create_link("d1", &["a1", "j1"]).expect("link");
        let d1 = board.get("d1").expect("d1").clone();
        let ids: Vec<_> = board.link_candidates(&d1).iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a2"]);

        // A fresh dialog starts empty; submitting it changes nothing.
        let selection = TargetSelection::default();
        assert!(selection.is_empty());
        let before = board.clone();
        assert!(board.create_link("d1", selection.targets()).expect("no-op").is_empty());
        assert_eq!(board, before);
    }

    #[test]
    fn judgment_linked_to_assessment_is_visible_both_ways() {
        let mut board = sample_board();
        board.create_link("j1", &["a1"]).expect("link");

        let linked: Vec<_> = board.linked_entries("j1").iter().map(|e| e.content.clone()).collect();
        assert_eq!(linked, vec!["Fire reported".to_string()]);
        assert!(board.has_incoming_links("a1"));
        assert!(!board.has_incoming_links("a2"));
        assert!(!board.has_incoming_links("j1"));
    }

    #[test]
    fn relinking_does_not_duplicate_edges() {
        let mut board = sample_board();
        let first = board.create_link("d1", &["a1", "j1", "a1"]).expect("link");
        assert_eq!(first, vec!["a1".to_string(), "j1".to_string()]);

        let second = board.create_link("d1", &["j1"]).expect("relink");
        assert!(second.is_empty());
        assert_eq!(board.get("d1").expect("d1").linked_to, vec!["a1", "j1"]);
    }

    #[test]
    fn forbidden_links_leave_board_unchanged() {
        let mut board = sample_board();
        let before = board.clone();

        assert_eq!(
            board.create_link("j1", &["a1", "d1"]),
            Err(LinkError::NotPermitted {
                from: EntryType::Judgment,
                to: EntryType::Decision
            })
        );
        assert_eq!(
            board.create_link("a1", &["a2"]),
            Err(LinkError::NotPermitted {
                from: EntryType::Assessment,
                to: EntryType::Assessment
            })
        );
        assert_eq!(
            board.create_link("j1", &["missing"]),
            Err(LinkError::UnknownEntry("missing".into()))
        );
        assert_eq!(
            board.create_link("ghost", &["a1"]),
            Err(LinkError::UnknownEntry("ghost".into()))
        );
        assert_eq!(board, before);
    }

    #[test]
    fn incoming_links_track_every_source() {
        let mut board = sample_board();
        board.create_link("j1", &["a2"]).expect("link");
        board.create_link("d1", &["a2"]).expect("link");
        assert!(board.has_incoming_links("a2"));

        assert!(board.remove_link("j1", "a2"));
        assert!(board.has_incoming_links("a2"));
        assert!(board.remove_link("d1", "a2"));
        assert!(!board.has_incoming_links("a2"));
        assert!(!board.remove_link("d1", "a2"));
    }

    #[test]
    fn removing_an_entry_drops_links_to_it() {
        let mut board = sample_board();
        board.create_link("d1", &["a1", "j1"]).expect("link");
        board.remove("j1").expect("removed");
        assert_eq!(board.get("d1").expect("d1").linked_to, vec!["a1"]);
        assert!(board.linked_entries("j1").is_empty());
    }

    #[test]
    fn linked_entries_of_unknown_entry_is_empty() {
        assert!(sample_board().linked_entries("nope").is_empty());
    }

    #[test]
    fn columns_follow_board_layout() {
        let mut board = sample_board();
        board.create_link("d1", &["j1"]).expect("link");
        let columns = board.columns();

        let titles: Vec<_> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Situation Assessment", "Judgment", "Decision"]);
        assert_eq!(columns[0].cards.len(), 2);
        assert!(columns[1].cards[0].has_incoming_links);
        assert_eq!(columns[2].cards[0].linked_entries[0].id, "j1");
    }

    #[test]
    fn selection_toggles_targets() {
        let mut selection = TargetSelection::default();
        selection.toggle("a1");
        selection.toggle("j1");
        selection.toggle("a1");
        assert_eq!(selection.targets(), ["j1".to_string()]);
        assert!(selection.contains("j1"));
        selection.clear();
        assert!(selection.is_empty());
    }
}
