use linenote_core::db::open_db_in_memory;
use linenote_core::{
    AutosaveConfig, DocumentConfig, DocumentError, ManualClock, OutlineDocument, PollOutcome,
    SqliteSubjectRepository, SubjectRepository,
};
use std::time::Duration;

fn document_with_clock() -> (OutlineDocument, ManualClock) {
    let conn = open_db_in_memory().unwrap();
    SqliteSubjectRepository::try_new(&conn)
        .unwrap()
        .create_subject("Notes")
        .unwrap();
    let clock = ManualClock::new();
    let doc = OutlineDocument::with_clock(
        conn,
        DocumentConfig::default(),
        Box::new(clock.clone()),
    )
    .unwrap();
    (doc, clock)
}

fn content_rows(doc: &OutlineDocument) -> i64 {
    doc.connection()
        .query_row("SELECT COUNT(*) FROM content;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn line_debounce_flushes_after_quiet_period() {
    let (mut doc, clock) = document_with_clock();
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "draft").unwrap();

    clock.advance(Duration::from_millis(999));
    assert_eq!(doc.poll_timers().lines_flushed, 0);
    assert_eq!(content_rows(&doc), 0);

    clock.advance(Duration::from_millis(1));
    assert_eq!(doc.poll_timers().lines_flushed, 1);
    assert_eq!(content_rows(&doc), 1);
    assert!(!doc.line(line).unwrap().is_dirty());
}

#[test]
fn typing_rearms_line_debounce() {
    let (mut doc, clock) = document_with_clock();
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "d").unwrap();
    clock.advance(Duration::from_millis(600));
    doc.set_line_content(line, "dr").unwrap();

    clock.advance(Duration::from_millis(600));
    assert_eq!(doc.poll_timers().lines_flushed, 0);

    clock.advance(Duration::from_millis(400));
    assert_eq!(doc.poll_timers().lines_flushed, 1);
}

#[test]
fn idle_autosave_runs_after_threshold() {
    let (mut doc, clock) = document_with_clock();
    doc.add_line().unwrap();

    clock.advance(Duration::from_secs(4));
    assert_eq!(doc.poll_timers(), PollOutcome::default());

    clock.advance(Duration::from_secs(1));
    let outcome = doc.poll_timers();
    let report = outcome.autosave.expect("idle autosave should run");
    assert_eq!(report.contents_inserted, 2);
    assert!(!doc.has_unsaved_changes());
}

#[test]
fn idle_autosave_skips_clean_documents() {
    let (mut doc, clock) = document_with_clock();
    doc.save_all_changes().unwrap();

    clock.advance(Duration::from_secs(6));
    assert_eq!(doc.poll_timers().autosave, None);
}

#[test]
fn failed_autosave_is_retried_next_idle_period() {
    let (mut doc, clock) = document_with_clock();
    doc.connection()
        .execute_batch(
            "CREATE TEMP TRIGGER reject_content BEFORE INSERT ON content
             BEGIN
                SELECT RAISE(ABORT, 'content writes disabled');
             END;",
        )
        .unwrap();

    clock.advance(Duration::from_secs(5));
    let outcome = doc.poll_timers();
    assert_eq!(outcome.failures, 1);
    assert!(doc.has_unsaved_changes());

    doc.connection()
        .execute_batch("DROP TRIGGER reject_content;")
        .unwrap();
    clock.advance(Duration::from_secs(2));
    assert_eq!(doc.poll_timers().autosave, None);

    clock.advance(Duration::from_secs(3));
    assert!(doc.poll_timers().autosave.is_some());
    assert!(!doc.has_unsaved_changes());
}

#[test]
fn custom_autosave_timing_is_honoured() {
    let conn = open_db_in_memory().unwrap();
    SqliteSubjectRepository::try_new(&conn)
        .unwrap()
        .create_subject("Notes")
        .unwrap();
    let clock = ManualClock::new();
    let config = DocumentConfig {
        autosave: AutosaveConfig {
            line_debounce: Duration::from_millis(200),
            idle_tick: Duration::from_millis(100),
            idle_threshold: Duration::from_millis(500),
        },
        ..DocumentConfig::default()
    };
    let mut doc = OutlineDocument::with_clock(conn, config, Box::new(clock.clone())).unwrap();
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "quick").unwrap();

    clock.advance(Duration::from_millis(200));
    assert_eq!(doc.poll_timers().lines_flushed, 1);
}

#[test]
fn closing_cancels_timers_and_flushes() {
    let (mut doc, clock) = document_with_clock();
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "unsaved").unwrap();

    let report = doc.on_view_closing().unwrap();
    assert_eq!(report.contents_inserted, 1);
    assert_eq!(content_rows(&doc), 1);

    clock.advance(Duration::from_secs(10));
    assert_eq!(doc.poll_timers(), PollOutcome::default());
    assert!(matches!(
        doc.set_line_content(line, "late"),
        Err(DocumentError::Closed)
    ));
    assert!(doc.on_view_closing().unwrap().is_empty());
}

#[test]
fn closing_reports_save_failure() {
    let (mut doc, _clock) = document_with_clock();
    doc.connection()
        .execute_batch(
            "CREATE TEMP TRIGGER reject_content BEFORE INSERT ON content
             BEGIN
                SELECT RAISE(ABORT, 'content writes disabled');
             END;",
        )
        .unwrap();

    assert!(matches!(
        doc.on_view_closing(),
        Err(DocumentError::Transaction(_))
    ));
}
