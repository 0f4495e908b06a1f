use std::{sync::Arc, time::Duration};

use armemo_lib::{
    Database, FlatScene, InMemoryAnchorService, NoteContent, NoteEvent, Pose, SessionConfig,
    SessionController, SyncState, Vec3,
};
use tempfile::tempdir;
use tokio::runtime::Handle;

const SETTLE: Duration = Duration::from_secs(5);

fn scene() -> FlatScene {
    FlatScene::new(1000.0, 1000.0)
}

fn session(service: &Arc<InMemoryAnchorService>, db: &Database) -> SessionController {
    let config = SessionConfig {
        default_content: NoteContent::plain("MEMO"),
        ..SessionConfig::default()
    };
    SessionController::new(config, service.clone(), db.clone(), Handle::current())
}

fn at(x: f32, z: f32) -> Pose {
    Pose::at(Vec3::new(x, 0.0, z))
}

#[tokio::test]
async fn hosted_note_round_trips_through_the_index() {
    let service = Arc::new(InMemoryAnchorService::new().with_latency(5, 20));
    let db = Database::in_memory().unwrap();
    let scene = scene();

    let mut first = session(&service, &db);
    let note_id = first.create_note_at(at(0.2, 0.3));
    assert_eq!(
        first.registry().get(note_id).unwrap().sync_state,
        SyncState::Hosting
    );
    first.run_until_idle(&scene, SETTLE).await.unwrap();

    let note = first.registry().get(note_id).unwrap().clone();
    assert_eq!(note.sync_state, SyncState::Hosted);
    assert_eq!(note.status_text, "Saved");
    let anchor_id = note.anchor_id.clone().unwrap();

    let record = db.get_anchor(&anchor_id).await.unwrap().unwrap();
    assert_eq!(NoteContent::from_payload(&record.note_content).text, "MEMO");
    assert_eq!(db.list_anchor_ids().await.unwrap(), vec![anchor_id.clone()]);

    first.shutdown();

    let mut second = session(&service, &db);
    second.load();
    second.run_until_idle(&scene, SETTLE).await.unwrap();

    let restored = second.registry().notes();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].content.text, "MEMO");
    assert_eq!(restored[0].sync_state, SyncState::Hosted);
    assert_eq!(restored[0].anchor_id.as_deref(), Some(anchor_id.as_str()));
    assert_eq!(restored[0].transform.position, Vec3::new(0.2, 0.0, 0.3));
    assert_eq!(second.registry().selected(), None);
}

#[tokio::test]
async fn deleted_note_is_not_restored() {
    let service = Arc::new(InMemoryAnchorService::new());
    let db = Database::in_memory().unwrap();
    let scene = scene();

    let mut first = session(&service, &db);
    let kept = first.create_note_at(at(0.1, 0.1));
    first.deselect();
    let dropped = first.create_note_at(at(0.5, 0.5));
    first.run_until_idle(&scene, SETTLE).await.unwrap();

    let dropped_anchor = first.registry().get(dropped).unwrap().anchor_id.clone().unwrap();
    let kept_anchor = first.registry().get(kept).unwrap().anchor_id.clone().unwrap();

    assert!(first.delete_selected());
    assert!(!first.registry().contains(dropped));
    let removed = first
        .take_note_events()
        .into_iter()
        .any(|event| event == NoteEvent::Removed {
            note_id: dropped,
            anchor_id: Some(dropped_anchor.clone()),
        });
    assert!(removed);
    first.shutdown();

    let mut second = session(&service, &db);
    second.load();
    second.run_until_idle(&scene, SETTLE).await.unwrap();

    let anchors: Vec<_> = second
        .registry()
        .notes()
        .iter()
        .filter_map(|note| note.anchor_id.clone())
        .collect();
    assert_eq!(anchors, vec![kept_anchor]);
    assert!(db.get_anchor(&dropped_anchor).await.unwrap().is_none());
}

#[tokio::test]
async fn one_failed_resolve_does_not_stop_the_others() {
    let service = Arc::new(InMemoryAnchorService::new().with_latency(1, 30));
    let db = Database::in_memory().unwrap();

    for (index, anchor_id) in ["ua-1", "ua-2", "ua-3"].iter().enumerate() {
        service
            .insert_anchor(anchor_id, at(index as f32 * 0.1, 0.0))
            .unwrap();
        let payload = NoteContent::plain(format!("note {}", index + 1))
            .to_payload()
            .unwrap();
        db.put_anchor(anchor_id, &payload).await.unwrap();
    }
    service.fail_resolve("ua-2").unwrap();

    let mut session = session(&service, &db);
    session.load();
    session.run_until_idle(&scene(), SETTLE).await.unwrap();

    let mut texts: Vec<_> = session
        .registry()
        .notes()
        .iter()
        .map(|note| note.content.text.clone())
        .collect();
    texts.sort();
    assert_eq!(texts, vec!["note 1", "note 3"]);
    assert_eq!(session.stats().resolved, 2);
    assert_eq!(session.stats().resolve_failures, 1);

    // The failed anchor stays in the index for a later attempt.
    assert_eq!(db.list_anchor_ids().await.unwrap().len(), 3);
}

#[tokio::test]
async fn host_failure_keeps_the_note_as_failed() {
    let service = Arc::new(InMemoryAnchorService::new());
    service.set_host_failure(true).unwrap();
    let db = Database::in_memory().unwrap();

    let mut session = session(&service, &db);
    let note_id = session.create_note_at(at(0.4, 0.4));
    session.run_until_idle(&scene(), SETTLE).await.unwrap();

    let note = session.registry().get(note_id).unwrap();
    assert_eq!(note.sync_state, SyncState::Failed);
    assert_eq!(note.status_text, "Save failed");
    assert!(note.anchor_id.is_none());
    assert_eq!(note.transform.position, Vec3::new(0.4, 0.0, 0.4));
    assert_eq!(session.stats().host_failures, 1);
    assert!(db.list_anchor_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn host_completing_after_delete_is_discarded() {
    let service = Arc::new(InMemoryAnchorService::new().with_latency(30, 30));
    let db = Database::in_memory().unwrap();

    let mut session = session(&service, &db);
    let note_id = session.create_note_at(at(0.3, 0.3));
    assert!(session.delete_note(note_id));
    session.run_until_idle(&scene(), SETTLE).await.unwrap();

    assert!(session.registry().is_empty());
    assert_eq!(session.stats().discarded, 1);
    assert_eq!(session.stats().hosted, 0);
    assert!(db.list_anchor_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn edits_rewrite_the_stored_payload() {
    let service = Arc::new(InMemoryAnchorService::new().with_latency(10, 10));
    let db = Database::in_memory().unwrap();
    let scene = scene();

    let mut session = session(&service, &db);
    let note_id = session.create_note_at(at(0.1, 0.2));
    // Still hosting: applied once the anchor id arrives.
    assert!(session.edit_selected("first draft"));
    session.run_until_idle(&scene, SETTLE).await.unwrap();

    let anchor_id = session.registry().get(note_id).unwrap().anchor_id.clone().unwrap();
    let stored = db.get_anchor(&anchor_id).await.unwrap().unwrap();
    assert_eq!(NoteContent::from_payload(&stored.note_content).text, "first draft");

    assert!(session.edit_note(note_id, "final"));
    assert_eq!(session.registry().get(note_id).unwrap().status_text, "Saving...");
    session.run_until_idle(&scene, SETTLE).await.unwrap();

    assert_eq!(session.registry().get(note_id).unwrap().status_text, "Saved");
    let stored = db.get_anchor(&anchor_id).await.unwrap().unwrap();
    assert_eq!(NoteContent::from_payload(&stored.note_content).text, "final");
}

#[tokio::test]
async fn notes_survive_a_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("armemo.sqlite3");
    let service = Arc::new(InMemoryAnchorService::new());
    let scene = scene();

    {
        let db = Database::new(db_path.clone()).unwrap();
        let mut session = session(&service, &db);
        session.create_note_at(at(0.1, 0.1));
        session.deselect();
        session.create_note_at(at(0.6, 0.2));
        session.run_until_idle(&scene, SETTLE).await.unwrap();
        assert_eq!(session.stats().hosted, 2);
        session.shutdown();
    }

    let db = Database::new(db_path).unwrap();
    assert_eq!(db.list_anchor_ids().await.unwrap().len(), 2);

    let mut session = session(&service, &db);
    session.load();
    session.run_until_idle(&scene, SETTLE).await.unwrap();

    assert_eq!(session.registry().len(), 2);
    assert!(session
        .registry()
        .notes()
        .iter()
        .all(|note| note.sync_state == SyncState::Hosted && note.content.text == "MEMO"));

    // Loading twice never duplicates a live note.
    session.load();
    session.run_until_idle(&scene, SETTLE).await.unwrap();
    assert_eq!(session.registry().len(), 2);
}

#[tokio::test]
async fn shutdown_abandons_pending_hosts() {
    let service = Arc::new(InMemoryAnchorService::new().with_latency(200, 200));
    let db = Database::in_memory().unwrap();

    let mut session = session(&service, &db);
    session.create_note_at(at(0.2, 0.2));
    session.shutdown();
    session.run_until_idle(&scene(), SETTLE).await.unwrap();

    assert!(session.registry().is_empty());
    assert_eq!(service.anchor_count(), 0);
    assert!(db.list_anchor_ids().await.unwrap().is_empty());
}

async fn drop_index_table(db: &Database) {
    db.execute(|conn| Ok(conn.execute_batch("DROP TABLE anchors")?))
        .await
        .unwrap();
}

#[tokio::test]
async fn unrecorded_host_stays_hosted_but_not_saved() {
    let service = Arc::new(InMemoryAnchorService::new());
    let db = Database::in_memory().unwrap();
    drop_index_table(&db).await;

    let mut session = session(&service, &db);
    let note_id = session.create_note_at(at(0.2, 0.2));
    session.run_until_idle(&scene(), SETTLE).await.unwrap();

    let note = session.registry().get(note_id).unwrap();
    assert_eq!(note.sync_state, SyncState::Hosted);
    assert!(note.anchor_id.is_some());
    assert_eq!(note.status_text, "Not saved");
    assert_eq!(session.stats().hosted, 1);
    assert_eq!(service.anchor_count(), 1);
}

#[tokio::test]
async fn failed_rewrite_marks_the_note_not_saved() {
    let service = Arc::new(InMemoryAnchorService::new());
    let db = Database::in_memory().unwrap();
    let scene = scene();

    let mut session = session(&service, &db);
    let note_id = session.create_note_at(at(0.2, 0.2));
    session.run_until_idle(&scene, SETTLE).await.unwrap();
    assert_eq!(session.registry().get(note_id).unwrap().status_text, "Saved");

    drop_index_table(&db).await;
    assert!(session.edit_note(note_id, "lost edit"));
    session.run_until_idle(&scene, SETTLE).await.unwrap();

    let note = session.registry().get(note_id).unwrap();
    assert_eq!(note.sync_state, SyncState::Hosted);
    assert_eq!(note.content.text, "lost edit");
    assert_eq!(note.status_text, "Not saved");
}
