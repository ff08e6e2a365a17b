/// Single consumer of the audit queue.
///
/// One dedicated thread owns the only write connection and drains jobs in
/// submission order, so persisted ordering always matches enqueue ordering
/// and producers never wait on storage latency. A failed single write is
/// logged and skipped; the loop keeps going.

use std::path::PathBuf;
use std::sync::mpsc::Sender as AckSender;
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedReceiver;

use super::db::{insert_event, open_connection};
use super::AuditEvent;
use crate::logger::{self, LogTag};

pub(super) enum Job {
    Event(AuditEvent),
    /// Round-trip marker: acknowledged once everything enqueued before it has
    /// been persisted.
    Flush(AckSender<()>),
    /// Stop after acknowledging; everything enqueued earlier is drained first.
    Shutdown(AckSender<()>),
}

pub(super) fn spawn(db_path: PathBuf, rx: UnboundedReceiver<Job>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("audit-writer".to_string())
        .spawn(move || worker_loop(db_path, rx))
}

fn worker_loop(db_path: PathBuf, mut rx: UnboundedReceiver<Job>) {
    // If the database cannot be opened the worker keeps draining so producers
    // and flush callers never hang; events are dropped with an error log.
    let conn = match open_connection(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            logger::error(
                LogTag::Audit,
                &format!("Audit writer has no database, events will be dropped: {:#}", e),
            );
            None
        }
    };

    while let Some(job) = rx.blocking_recv() {
        match job {
            Job::Event(event) => {
                if let Some(conn) = conn.as_ref() {
                    if let Err(e) = insert_event(conn, &event) {
                        logger::error(LogTag::Audit, &format!("Audit write failed: {}", e));
                    }
                }
            }
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
            Job::Shutdown(ack) => {
                let _ = ack.send(());
                break;
            }
        }
    }
}
