use linenote_core::db::open_db_in_memory;
use linenote_core::{
    DocumentConfig, DocumentEvent, LineKind, ManualClock, OutlineDocument,
    SqliteSubjectRepository, SubjectRepository,
};
use rusqlite::params;

fn new_document(config: DocumentConfig) -> OutlineDocument {
    let conn = open_db_in_memory().unwrap();
    SqliteSubjectRepository::try_new(&conn)
        .unwrap()
        .create_subject("Notes")
        .unwrap();
    OutlineDocument::with_clock(conn, config, Box::new(ManualClock::new())).unwrap()
}

fn count(doc: &OutlineDocument, table: &str) -> i64 {
    doc.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })
        .unwrap()
}

fn contents(doc: &OutlineDocument) -> Vec<String> {
    doc.lines()
        .iter()
        .map(|line| line.content().to_string())
        .collect()
}

#[test]
fn nothing_to_undo_on_fresh_document() {
    let mut doc = new_document(DocumentConfig::default());
    assert!(!doc.can_undo());
    assert!(!doc.undo().unwrap());
    assert!(!doc.redo().unwrap());
}

#[test]
fn typing_on_one_line_undoes_as_one_step() {
    let mut doc = new_document(DocumentConfig::default());
    let line = doc.lines()[0].id();
    for text in ["h", "he", "hel", "hello"] {
        doc.set_line_content(line, text).unwrap();
    }

    assert!(doc.undo().unwrap());
    assert_eq!(contents(&doc), vec![""]);
    assert!(!doc.can_undo());

    assert!(doc.redo().unwrap());
    assert_eq!(contents(&doc), vec!["hello"]);
}

#[test]
fn undo_content_edit_resyncs_store_on_save() {
    let mut doc = new_document(DocumentConfig::default());
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "first").unwrap();
    doc.save_all_changes().unwrap();
    let text_id = doc.line(line).unwrap().text_id();

    doc.set_line_content(line, "second").unwrap();
    doc.save_all_changes().unwrap();
    assert!(doc.undo().unwrap());
    assert!(doc.line(line).unwrap().is_dirty());
    assert_eq!(doc.line(line).unwrap().text_id(), text_id);
    assert!(doc.drain_events().contains(&DocumentEvent::HistoryRestored));

    doc.save_all_changes().unwrap();
    let stored: String = doc
        .connection()
        .query_row(
            "SELECT content FROM content WHERE text_id = ?1;",
            params![text_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stored, "first");
    assert_eq!(count(&doc, "content"), 1);
}

#[test]
fn undo_insert_and_redo_it() {
    let mut doc = new_document(DocumentConfig::default());
    let added = doc.add_line().unwrap();
    assert_eq!(doc.len(), 2);

    doc.undo().unwrap();
    assert_eq!(doc.len(), 1);
    assert!(doc.line(added).is_none());

    doc.redo().unwrap();
    assert_eq!(doc.len(), 2);
    assert!(doc.line(added).is_some());
}

#[test]
fn undo_removal_recreates_deleted_row() {
    let mut doc = new_document(DocumentConfig::default());
    let first = doc.lines()[0].id();
    doc.set_line_content(first, "keep me").unwrap();
    let second = doc.add_line().unwrap();
    doc.set_line_content(second, "other").unwrap();
    doc.save_all_changes().unwrap();

    doc.remove_line(first).unwrap();
    assert_eq!(count(&doc, "content"), 1);

    doc.undo().unwrap();
    let restored = doc.line(first).unwrap();
    assert_eq!(restored.content(), "keep me");
    assert_eq!(restored.text_id(), 0);

    doc.save_all_changes().unwrap();
    assert_eq!(count(&doc, "content"), 2);
    assert!(doc.line(first).unwrap().text_id() > 0);
}

#[test]
fn undo_heading_transition_keeps_original_row() {
    let mut doc = new_document(DocumentConfig::default());
    let line = doc.lines()[0].id();
    doc.set_line_content(line, "hello").unwrap();
    doc.save_all_changes().unwrap();
    let text_id = doc.line(line).unwrap().text_id();

    doc.set_line_content(line, "# hello").unwrap();
    doc.undo().unwrap();

    let restored = doc.line(line).unwrap();
    assert_eq!(restored.kind(), LineKind::PlainText);
    assert_eq!(restored.text_id(), text_id);

    let report = doc.save_all_changes().unwrap();
    assert_eq!(report.contents_deleted, 0);
    assert_eq!(report.categories_inserted, 0);
    assert_eq!(count(&doc, "content"), 1);
    assert_eq!(count(&doc, "category"), 1);
}

#[test]
fn undo_of_saved_heading_dissolves_its_category() {
    let mut doc = new_document(DocumentConfig::default());
    let heading = doc.lines()[0].id();
    doc.set_line_content(heading, "# Chapter").unwrap();
    let body = doc.add_line().unwrap();
    doc.set_line_content(body, "body").unwrap();
    doc.save_all_changes().unwrap();
    assert_eq!(count(&doc, "category"), 2);

    // Back past the body edit, the insert and the heading edit.
    while doc.can_undo() {
        doc.undo().unwrap();
    }
    assert_eq!(contents(&doc), vec![""]);

    doc.save_all_changes().unwrap();
    assert_eq!(count(&doc, "category"), 1);
    assert_eq!(count(&doc, "content"), 1);
    let line = &doc.lines()[0];
    assert_eq!(line.category_id(), doc.default_category_id());
    assert!(line.text_id() > 0);
}

#[test]
fn redo_is_cleared_by_new_edit() {
    let mut doc = new_document(DocumentConfig::default());
    doc.add_line().unwrap();
    doc.undo().unwrap();
    assert!(doc.can_redo());

    doc.add_line().unwrap();
    assert!(!doc.can_redo());
}

#[test]
fn history_limit_bounds_undo_depth() {
    let mut doc = new_document(DocumentConfig {
        history_limit: 2,
        ..DocumentConfig::default()
    });
    for _ in 0..4 {
        doc.add_line().unwrap();
    }

    assert!(doc.undo().unwrap());
    assert!(doc.undo().unwrap());
    assert!(!doc.undo().unwrap());
    assert_eq!(doc.len(), 3);
}
