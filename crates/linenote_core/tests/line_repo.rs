use linenote_core::db::open_db_in_memory;
use linenote_core::model::outline::{CategoryDraft, ContentDraft, OutlineRow};
use linenote_core::{
    LineRepository, RepoError, SqliteLineRepository, SqliteSubjectRepository, SubjectRepository,
};
use rusqlite::Connection;

fn store_with_subject() -> Connection {
    let conn = open_db_in_memory().unwrap();
    SqliteSubjectRepository::try_new(&conn)
        .unwrap()
        .create_subject("Notes")
        .unwrap();
    conn
}

fn heading<'a>(title: &'a str, level: u8, order: i64) -> CategoryDraft<'a> {
    CategoryDraft {
        title,
        parent_category_id: None,
        level,
        display_order: order,
    }
}

fn text(content: &str, category_id: i64, order: i64) -> ContentDraft<'_> {
    ContentDraft {
        content,
        category_id,
        display_order: order,
    }
}

#[test]
fn try_new_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let result = SqliteLineRepository::try_new(&conn, 1);
    assert!(matches!(
        result,
        Err(RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));
}

#[test]
fn create_subject_creates_default_category_one() {
    let conn = open_db_in_memory().unwrap();
    let subjects = SqliteSubjectRepository::try_new(&conn).unwrap();
    let subject = subjects.create_subject("  Notes  ").unwrap();
    assert_eq!(subject.title, "Notes");

    let repo = SqliteLineRepository::try_new(&conn, subject.subject_id).unwrap();
    assert_eq!(repo.ensure_default_category().unwrap(), 1);
    assert_eq!(repo.ensure_default_category().unwrap(), 1);

    let categories = repo.list_categories().unwrap();
    assert_eq!(categories.len(), 1);
    assert!(categories[0].is_default());

    assert!(matches!(
        subjects.create_subject("   "),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn ensure_default_category_requires_existing_subject() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteLineRepository::try_new(&conn, 9).unwrap();
    assert!(matches!(
        repo.ensure_default_category(),
        Err(RepoError::SubjectNotFound(9))
    ));
}

#[test]
fn next_display_order_spans_both_tables() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    assert_eq!(repo.next_display_order().unwrap(), 1);

    let category_id = repo.insert_category(&heading("# A", 1, 4)).unwrap();
    assert_eq!(repo.next_display_order().unwrap(), 5);

    repo.insert_content(&text("x", category_id, 9)).unwrap();
    assert_eq!(repo.next_display_order().unwrap(), 10);
}

#[test]
fn shift_display_orders_after_moves_both_tables_and_skips_default() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    repo.insert_content(&text("one", 1, 1)).unwrap();
    let category_id = repo.insert_category(&heading("# Two", 1, 2)).unwrap();
    repo.insert_content(&text("three", category_id, 3)).unwrap();

    assert_eq!(repo.shift_display_orders_after(1).unwrap(), 2);

    let orders: Vec<i64> = repo
        .list_outline_rows()
        .unwrap()
        .iter()
        .map(OutlineRow::display_order)
        .collect();
    assert_eq!(orders, vec![0, 1, 3, 4]);
}

#[test]
fn statements_are_scoped_by_subject() {
    let conn = open_db_in_memory().unwrap();
    let subjects = SqliteSubjectRepository::try_new(&conn).unwrap();
    let first = subjects.create_subject("First").unwrap();
    let second = subjects.create_subject("Second").unwrap();

    let first_repo = SqliteLineRepository::try_new(&conn, first.subject_id).unwrap();
    let second_repo = SqliteLineRepository::try_new(&conn, second.subject_id).unwrap();
    let second_default = second_repo.ensure_default_category().unwrap();
    let text_id = second_repo
        .insert_content(&text("theirs", second_default, 1))
        .unwrap();

    assert_eq!(first_repo.delete_content(text_id).unwrap(), 0);
    assert!(!first_repo.content_exists(text_id).unwrap());
    assert!(second_repo.content_exists(text_id).unwrap());
    assert_eq!(first_repo.next_display_order().unwrap(), 1);
    assert_eq!(subjects.list_subjects().unwrap().len(), 2);
}

#[test]
fn missing_rows_are_noops() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();

    assert_eq!(repo.update_content(77, &text("x", 1, 1)).unwrap(), 0);
    assert_eq!(repo.delete_content(77).unwrap(), 0);
    assert_eq!(repo.update_category(77, &heading("# X", 1, 1)).unwrap(), 0);
    assert_eq!(repo.delete_category(77, false).unwrap(), 0);
}

#[test]
fn default_category_is_protected() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    assert!(matches!(
        repo.delete_category(1, true),
        Err(RepoError::ProtectedCategory(1))
    ));
    assert_eq!(repo.update_category(1, &heading("# Hijack", 1, 5)).unwrap(), 0);
    assert!(repo.category_exists(1).unwrap());
}

#[test]
fn invalid_heading_level_is_rejected() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    assert!(matches!(
        repo.insert_category(&heading("# Zero", 0, 1)),
        Err(RepoError::InvalidData(_))
    ));
    assert!(matches!(
        repo.insert_category(&heading("# Seven", 7, 1)),
        Err(RepoError::InvalidData(_))
    ));
}

#[test]
fn delete_category_without_cascade_requires_reassignment() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    let category_id = repo.insert_category(&heading("# A", 1, 1)).unwrap();
    repo.insert_content(&text("a1", category_id, 2)).unwrap();
    repo.insert_content(&text("a2", category_id, 3)).unwrap();

    assert!(repo.delete_category(category_id, false).is_err());
    assert!(repo.category_exists(category_id).unwrap());

    assert_eq!(repo.reassign_content(category_id, 1).unwrap(), 2);
    assert_eq!(repo.delete_category(category_id, false).unwrap(), 1);

    let contents = repo.list_contents().unwrap();
    assert_eq!(contents.len(), 2);
    assert!(contents.iter().all(|row| row.category_id == 1));
}

#[test]
fn delete_category_with_cascade_removes_content() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    let category_id = repo.insert_category(&heading("# A", 1, 1)).unwrap();
    repo.insert_content(&text("a1", category_id, 2)).unwrap();

    assert_eq!(repo.delete_category(category_id, true).unwrap(), 1);
    assert!(repo.list_contents().unwrap().is_empty());
}

#[test]
fn reassign_to_missing_category_fails() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    assert!(matches!(
        repo.reassign_content(1, 55),
        Err(RepoError::CategoryNotFound(55))
    ));
}

#[test]
fn primitives_join_the_callers_transaction() {
    let mut conn = store_with_subject();
    {
        let tx = conn.transaction().unwrap();
        let repo = SqliteLineRepository::try_new(&tx, 1).unwrap();
        repo.insert_content(&text("rolled back", 1, 1)).unwrap();
        repo.shift_display_orders_after(0).unwrap();
        drop(repo);
        tx.rollback().unwrap();
    }

    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    assert!(repo.list_contents().unwrap().is_empty());
}

#[test]
fn outline_rows_merge_by_display_order() {
    let conn = store_with_subject();
    let repo = SqliteLineRepository::try_new(&conn, 1).unwrap();
    repo.insert_content(&text("intro", 1, 1)).unwrap();
    let chapter = repo.insert_category(&heading("# Chapter", 1, 2)).unwrap();
    repo.insert_content(&text("body", chapter, 3)).unwrap();

    let rows = repo.list_outline_rows().unwrap();
    let kinds: Vec<&str> = rows
        .iter()
        .map(|row| match row {
            OutlineRow::Category(category) if category.is_default() => "default",
            OutlineRow::Category(_) => "category",
            OutlineRow::Content(_) => "content",
        })
        .collect();
    assert_eq!(kinds, vec!["default", "content", "category", "content"]);

    let json = serde_json::to_value(&rows[2]).unwrap();
    assert_eq!(json["row_type"], "category");
    assert_eq!(json["title"], "# Chapter");
}
