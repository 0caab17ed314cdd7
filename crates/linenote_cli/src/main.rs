//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a store, hydrate one subject and print its outline.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `linenote_cli <db-path> [subject-id]`. Set `LINENOTE_LOG_DIR` to an
//! absolute directory to enable file logging.

use linenote_core::{
    default_log_level, extract_heading_text, init_logging, load_document, open_db,
    DocumentConfig, SqliteSubjectRepository, SubjectRepository,
};
use log::error;
use std::process::ExitCode;

const DEFAULT_SUBJECT_TITLE: &str = "Notes";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("LINENOTE_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let mut args = std::env::args().skip(1);
    let Some(db_path) = args.next() else {
        eprintln!("usage: linenote_cli <db-path> [subject-id]");
        return ExitCode::from(2);
    };
    let subject_id = match args.next().map(|raw| raw.parse::<i64>()) {
        None => None,
        Some(Ok(id)) if id > 0 => Some(id),
        Some(_) => {
            eprintln!("subject-id must be a positive integer");
            return ExitCode::from(2);
        }
    };

    match run(&db_path, subject_id) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("linenote_cli: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: &str, subject_id: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_db(db_path)?;
    let subject_id = match subject_id {
        Some(id) => id,
        None => {
            let subjects = SqliteSubjectRepository::try_new(&conn)?;
            match subjects.list_subjects()?.first() {
                Some(subject) => subject.subject_id,
                None => subjects.create_subject(DEFAULT_SUBJECT_TITLE)?.subject_id,
            }
        }
    };

    let document = load_document(conn, DocumentConfig::for_subject(subject_id))?;
    println!("linenote_core version={}", linenote_core::core_version());
    println!(
        "subject={} default_category={} lines={}",
        document.subject_id(),
        document.default_category_id(),
        document.len()
    );
    for line in document.lines() {
        if line.is_heading_line() {
            let indent = "  ".repeat(usize::from(line.level().saturating_sub(1)));
            println!(
                "{indent}[{}] {}",
                line.category_id(),
                extract_heading_text(line.content())
            );
        } else {
            println!("    {:>4}  {}", line.display_order(), line.content());
        }
    }
    Ok(())
}
