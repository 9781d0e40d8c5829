use chrono::{DateTime, Duration, Utc};
use crisis_core::{CrisisStatus, DocumentType, EntryType, NewActivity, NewBobEntry};

use crate::store::{Store, StoreError};

const SEED_USER: &str = "system";

pub fn seed_demo_data(store: &Store, now: DateTime<Utc>) -> Result<String, StoreError> {
    let crisis_id = store.insert_crisis(
        "Warehouse fire, north site",
        &CrisisStatus::Active,
        now - Duration::minutes(135),
    )?;

    for (minutes_ago, description) in [
        (130, "Crisis opened by duty manager"),
        (110, "Crisis team convened in room 2.14"),
        (95, "Fire brigade on site"),
        (40, "Press holding statement approved"),
        (20, "Staff headcount completed"),
    ] {
        store.insert_activity(&NewActivity {
            crisis_id: Some(crisis_id.clone()),
            description: description.into(),
            timestamp: Some(now - Duration::minutes(minutes_ago)),
        })?;
    }

    store.insert_card(
        "Crisis Manager",
        &["Chair the crisis team", "Decide on escalation level", "Approve external statements"],
        Some("Owns the overall response and its decisions."),
    )?;
    store.insert_card(
        "Communications Lead",
        &["Draft press holding lines", "Brief staff every hour"],
        Some("Single voice towards press and staff."),
    )?;
    store.insert_card(
        "Logistics Lead",
        &["Arrange shelter for evacuated staff", "Track resources on site"],
        None,
    )?;

    store.insert_document(
        "Site crisis plan",
        DocumentType::CrisisPlan,
        Some("Escalation levels, contacts and team composition."),
        None,
    )?;
    store.insert_document("Evacuation procedure", DocumentType::Procedure, None, None)?;
    store.insert_document(
        "Floor plans north site",
        DocumentType::Reference,
        Some("All levels, including hazardous storage."),
        Some("https://example.org/docs/floor-plans.pdf"),
    )?;

    let entry = |entry_type, content: &str, linked_to: Vec<String>| {
        store.create_bob_entry(
            SEED_USER,
            &NewBobEntry {
                crisis_id: Some(crisis_id.clone()),
                entry_type,
                content: content.into(),
                linked_to,
            },
        )
    };
    let fire = entry(EntryType::Assessment, "Fire reported in storage hall B", vec![])?;
    let smoke = entry(EntryType::Assessment, "Smoke drifting towards the residential area", vec![])?;
    let unsafe_hall = entry(EntryType::Judgment, "Building unsafe until cleared by the brigade", vec![fire.clone()])?;
    entry(
        EntryType::Decision,
        "Keep the site closed for the night shift and inform residents",
        vec![fire, smoke, unsafe_hall],
    )?;

    tracing::info!(%crisis_id, "seeded demo crisis");
    Ok(crisis_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crisis_core::BobBoard;

    #[test]
    fn demo_seed_is_consistent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("seed.db")).expect("open");
        assert!(!store.has_crises().expect("count"));

        let now = Utc::now();
        let crisis_id = seed_demo_data(&store, now).expect("seed");
        assert!(store.has_crises().expect("count"));
        assert_eq!(store.current_crisis(now).expect("crisis").map(|c| c.id), Some(crisis_id.clone()));

        let board = BobBoard::from_entries(store.bob_entries(Some(crisis_id.as_str())).expect("entries"));
        let columns = board.columns();
        let sizes: Vec<usize> = columns.iter().map(|c| c.cards.len()).collect();
        assert_eq!(sizes, [2, 1, 1]);
        let decision = &columns[2].cards[0];
        assert_eq!(decision.linked_entries.len(), 3);
    }
}
