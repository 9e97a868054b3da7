//! End-to-end context manager behavior with an in-memory store and a fake agent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use loam_core::{
    Agent, AgentError, AgentReply, ContextBundle, ContextManager, LoamError, NoteWrite, VaultIndex,
};
use loam_models::{FolderPath, Role, UserId};
use loam_persistence::{JsonRecordStore, RetentionPolicy, SessionStore};
use tempfile::TempDir;

const USER: UserId = UserId(1001);

/// Echoes messages back and records every bundle it sees.
///
/// A message of the form `note <file>: <body>` is answered with a note
/// proposal.
#[derive(Default)]
struct FakeAgent {
    fail: AtomicBool,
    folder_listing: bool,
    calls: AtomicUsize,
    bundles: Mutex<Vec<ContextBundle>>,
}

#[async_trait]
impl Agent for FakeAgent {
    async fn respond(&self, bundle: &ContextBundle) -> Result<AgentReply, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bundles.lock().unwrap().push(bundle.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(AgentError::Timeout(std::time::Duration::from_secs(120)));
        }
        let reply = AgentReply::text(format!("echo: {}", bundle.message));
        match bundle.message.strip_prefix("note ").and_then(|rest| rest.split_once(": ")) {
            Some((file, body)) => Ok(reply.with_proposal(file, body)),
            None => Ok(reply),
        }
    }

    fn wants_folder_listing(&self) -> bool {
        self.folder_listing
    }
}

struct Harness {
    _dir: TempDir,
    agent: Arc<FakeAgent>,
    manager: ContextManager,
}

fn harness_with(agent: FakeAgent, store: SessionStore) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let vault = VaultIndex::open(dir.path().join("vault")).unwrap();
    let agent = Arc::new(agent);
    let manager = ContextManager::new(Arc::new(vault), Arc::new(store), agent.clone());
    Harness {
        _dir: dir,
        agent,
        manager,
    }
}

fn harness() -> Harness {
    harness_with(FakeAgent::default(), SessionStore::in_memory())
}

fn folder(raw: &str) -> FolderPath {
    FolderPath::parse(raw).unwrap()
}

#[tokio::test]
async fn message_without_folder_is_rejected() {
    let h = harness();

    let err = h.manager.handle_message(USER, "a stray thought").await.unwrap_err();

    assert!(matches!(err, LoamError::NoContext));
    assert_eq!(h.agent.calls.load(Ordering::SeqCst), 0);
    assert!(h.manager.vault().list_folders().unwrap().is_empty());
    assert!(h.manager.store().get_current(USER).unwrap().is_none());
}

#[tokio::test]
async fn create_then_new_then_message() {
    let h = harness();

    let created = h.manager.create_folder(USER, "philosophy").unwrap();
    assert!(created.folder_created);
    assert!(!created.resumed);

    let opened = h.manager.new_session(USER, Some("philosophy")).unwrap();
    assert!(!opened.folder_created);
    assert_ne!(opened.session, created.session);

    let exchange = h.manager.handle_message(USER, "Does free will exist?").await.unwrap();
    assert_eq!(exchange.reply.text, "echo: Does free will exist?");

    let pointer = h.manager.store().get_current(USER).unwrap().unwrap();
    assert_eq!(pointer.folder, folder("philosophy"));
    assert_eq!(pointer.session, opened.session);

    let session = h
        .manager
        .store()
        .session(USER, &pointer.folder, &pointer.session)
        .unwrap();
    let roles: Vec<Role> = session.turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Agent]);
    assert_eq!(session.turns[0].text, "Does free will exist?");
}

#[tokio::test]
async fn starred_session_survives_archival() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.handle_message(USER, "keep this").await.unwrap();
    let starred = h.manager.star(USER).unwrap().session;

    // Move on so the starred session is no longer current
    h.manager.new_session(USER, None).unwrap();

    let policy = RetentionPolicy {
        max_unstarred_per_folder: Some(0),
        archive_after: Some(Duration::days(30)),
    };
    h.manager
        .apply_retention(&policy, Utc::now() + Duration::days(365))
        .unwrap();

    let listed = h.manager.switch_candidates(USER, false).unwrap();
    let kept = listed.iter().find(|s| s.id == starred).unwrap();
    assert!(kept.starred);
    assert_eq!(kept.turn_count, 2);

    let session = h
        .manager
        .store()
        .session(USER, &folder("philosophy"), &starred)
        .unwrap();
    assert_eq!(session.turns[0].text, "keep this");
}

#[tokio::test]
async fn agent_failure_keeps_user_turn() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    h.agent.fail.store(true, Ordering::SeqCst);

    let err = h.manager.handle_message(USER, "an important idea").await.unwrap_err();
    assert!(matches!(err, LoamError::Agent(AgentError::Timeout(_))));

    let status = h.manager.status(USER).unwrap().unwrap();
    assert_eq!(status.turn_count, 1);

    let session = h
        .manager
        .store()
        .session(USER, &status.folder, &status.id)
        .unwrap();
    assert_eq!(session.turns[0].role, Role::User);
    assert_eq!(session.turns[0].text, "an important idea");
}

#[tokio::test]
async fn long_session_keeps_every_turn() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.handle_message(USER, "the first idea").await.unwrap();
    for i in 0..150 {
        h.manager.handle_message(USER, &format!("m{}", i)).await.unwrap();
    }
    h.agent.fail.store(true, Ordering::SeqCst);
    h.manager.handle_message(USER, "the last idea").await.unwrap_err();

    let status = h.manager.status(USER).unwrap().unwrap();
    let session = h
        .manager
        .store()
        .session(USER, &status.folder, &status.id)
        .unwrap();
    assert_eq!(session.turns.len(), 303);
    assert_eq!(session.turns[0].text, "the first idea");
    assert_eq!(session.turns[302].text, "the last idea");
}

#[tokio::test]
async fn history_window_bounds_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let vault = VaultIndex::open(dir.path().join("vault")).unwrap();
    let agent = Arc::new(FakeAgent::default());
    let manager = ContextManager::new(Arc::new(vault), Arc::new(SessionStore::in_memory()), agent.clone())
        .with_context_window(3);

    manager.create_folder(USER, "science").unwrap();
    for i in 0..4 {
        manager.handle_message(USER, &format!("m{}", i)).await.unwrap();
    }

    let bundles = agent.bundles.lock().unwrap();
    assert!(bundles[0].history.is_empty());
    let last = bundles.last().unwrap();
    assert_eq!(last.message, "m3");
    let texts: Vec<&str> = last.history.iter().map(|t| t.text.as_str()).collect();
    // Oldest turns drop first
    assert_eq!(texts, vec!["echo: m1", "m2", "echo: m2"]);
}

#[tokio::test]
async fn linked_notes_are_read_fresh() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    let note = h.manager.vault().root().join("philosophy/free_will.md");
    std::fs::write(&note, "version one").unwrap();

    h.manager.handle_message(USER, "what about [[free_will]]?").await.unwrap();
    std::fs::write(&note, "version two").unwrap();
    h.manager.handle_message(USER, "and now [[free_will]]?").await.unwrap();

    let bundles = h.agent.bundles.lock().unwrap();
    assert_eq!(bundles[0].referenced[0].content, "version one");
    assert_eq!(bundles[1].referenced[0].content, "version two");
    assert!(bundles[0].notes.is_none());
}

#[tokio::test]
async fn folder_listing_only_when_requested() {
    let agent = FakeAgent {
        folder_listing: true,
        ..FakeAgent::default()
    };
    let h = harness_with(agent, SessionStore::in_memory());
    h.manager.create_folder(USER, "philosophy").unwrap();
    std::fs::write(h.manager.vault().root().join("philosophy/ethics.md"), "x").unwrap();

    h.manager.handle_message(USER, "hello").await.unwrap();

    let bundles = h.agent.bundles.lock().unwrap();
    let notes = bundles[0].notes.as_ref().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].name, "ethics.md");
}

#[tokio::test]
async fn deleted_folder_reports_not_found() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    std::fs::remove_dir_all(h.manager.vault().root().join("philosophy")).unwrap();

    let err = h.manager.handle_message(USER, "hello?").await.unwrap_err();
    assert!(matches!(err, LoamError::NotFound { .. }));
    assert_eq!(h.agent.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn create_resumes_latest_session() {
    let h = harness();
    let first = h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.create_folder(USER, "science").unwrap();

    let back = h.manager.create_folder(USER, "philosophy").unwrap();
    assert!(back.resumed);
    assert_eq!(back.session, first.session);
    assert_eq!(h.manager.store().get_current(USER).unwrap().unwrap().folder, folder("philosophy"));
}

#[tokio::test]
async fn switch_by_handle_and_stale_handle() {
    let h = harness();
    let first = h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.create_folder(USER, "science").unwrap();

    let summary = h
        .manager
        .switch(USER, &format!("philosophy#{}", first.session))
        .unwrap();
    assert_eq!(summary.id, first.session);

    let err = h.manager.switch(USER, "philosophy#s-deadbeef").unwrap_err();
    assert!(matches!(err, LoamError::NotFound { .. }));
    // Failed switch leaves the pointer alone
    assert_eq!(h.manager.store().get_current(USER).unwrap().unwrap().session, first.session);
}

#[tokio::test]
async fn new_rejects_invalid_folder() {
    let h = harness();
    let err = h.manager.new_session(USER, Some("../outside")).unwrap_err();
    assert!(matches!(err, LoamError::InvalidPath { .. }));
    assert!(h.manager.store().get_current(USER).unwrap().is_none());

    let err = h.manager.new_session(USER, None).unwrap_err();
    assert!(matches!(err, LoamError::NoContext));
}

#[tokio::test]
async fn search_matches_titles() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.rename(USER, "Free will debate").unwrap();
    h.manager.create_folder(USER, "cooking").unwrap();
    h.manager.rename(USER, "Sourdough").unwrap();

    let hits = h.manager.search(USER, "freewill").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].display_name(), "Free will debate");
}

#[tokio::test]
async fn state_survives_restart() {
    let state = tempfile::tempdir().unwrap();
    let open_store = || SessionStore::new(Arc::new(JsonRecordStore::open(state.path()).unwrap()));

    let h = harness_with(FakeAgent::default(), open_store());
    h.manager.create_folder(USER, "philosophy").unwrap();
    h.manager.handle_message(USER, "remember me").await.unwrap();
    let before = h.manager.status(USER).unwrap().unwrap();

    let reopened = open_store();
    let pointer = reopened.get_current(USER).unwrap().unwrap();
    assert_eq!(pointer.session, before.id);
    let session = reopened.session(USER, &pointer.folder, &pointer.session).unwrap();
    assert_eq!(session.turns.len(), 2);
}

#[tokio::test]
async fn proposed_note_written_only_on_approval() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    let path = h.manager.vault().root().join("philosophy/free_will.md");

    let exchange = h
        .manager
        .handle_message(USER, "note free_will.md: Compatibilism, see https://example.com/fw")
        .await
        .unwrap();
    assert_eq!(exchange.proposals.len(), 1);
    assert!(!path.exists());

    let id = exchange.proposals[0].id;
    let (note, outcome) = h.manager.approve_note(USER, id).unwrap();
    assert_eq!(note.as_str(), "philosophy/free_will.md");
    assert_eq!(outcome, NoteWrite::Created);
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("source: https://example.com/fw"));
    assert!(content.contains("Compatibilism"));

    // Approving twice does not write twice
    let err = h.manager.approve_note(USER, id).unwrap_err();
    assert!(matches!(err, LoamError::NotFound { .. }));
}

#[tokio::test]
async fn cancelled_note_is_never_written() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();

    let exchange = h.manager.handle_message(USER, "note scratch.md: maybe").await.unwrap();
    let id = exchange.proposals[0].id;
    assert_eq!(h.manager.pending_notes(USER).len(), 1);

    let dropped = h.manager.cancel_note(USER, id).unwrap();
    assert_eq!(dropped.file, "scratch.md");
    assert!(h.manager.pending_notes(USER).is_empty());
    assert!(!h.manager.vault().root().join("philosophy/scratch.md").exists());
    assert!(matches!(h.manager.approve_note(USER, id), Err(LoamError::NotFound { .. })));
}

#[tokio::test]
async fn approval_writes_where_the_note_was_proposed() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    let exchange = h.manager.handle_message(USER, "note ethics/virtue.md: Virtue first").await.unwrap();

    // Moving elsewhere before approving does not move the note
    h.manager.create_folder(USER, "cooking").unwrap();
    let (note, _) = h.manager.approve_note(USER, exchange.proposals[0].id).unwrap();

    assert_eq!(note.as_str(), "philosophy/ethics/virtue.md");
    assert!(h.manager.vault().root().join("philosophy/ethics/virtue.md").is_file());
}

#[tokio::test]
async fn proposals_belong_to_their_user() {
    let h = harness();
    h.manager.create_folder(USER, "philosophy").unwrap();
    let exchange = h.manager.handle_message(USER, "note mine.md: private").await.unwrap();

    let other = UserId(2002);
    let err = h.manager.approve_note(other, exchange.proposals[0].id).unwrap_err();
    assert!(matches!(err, LoamError::NotFound { .. }));
    assert_eq!(h.manager.pending_notes(USER).len(), 1);
}

#[tokio::test]
async fn starred_listing_spans_folders() {
    let h = harness();
    h.manager.create_folder(USER, "science").unwrap();
    let science = h.manager.star(USER).unwrap().session;
    h.manager.new_session(USER, None).unwrap();
    h.manager.create_folder(USER, "cooking").unwrap();
    h.manager.new_session(USER, None).unwrap();
    let cooking = h.manager.star(USER).unwrap().session;

    let starred = h.manager.starred(USER).unwrap();
    let ids: Vec<_> = starred.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![cooking, science]);
    assert!(starred.iter().all(|s| s.starred));
}
