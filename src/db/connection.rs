use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::{Connection, ErrorCode};
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the durable anchor index.
///
/// A single worker thread owns the SQLite connection and runs queued tasks in order, so
/// every write is serialized and a task enqueued earlier is always applied before one
/// enqueued later. Cloning is cheap; the thread stops when the last clone drops.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let inner = match open_file(&db_path) {
            Ok(inner) => inner,
            Err(err) if is_unreadable(&err) => {
                warn!(
                    "Anchor index at {} is unreadable ({err:#}); starting with no saved notes",
                    db_path.display()
                );
                let aside = set_aside(&db_path)?;
                warn!("Unreadable index moved to {}", aside.display());
                open_file(&db_path)?
            }
            Err(err) => return Err(err),
        };

        info!("Anchor index opened at {}", db_path.display());

        Ok(Self {
            inner,
            db_path: Some(Arc::new(db_path)),
        })
    }

    /// Index that lives only as long as this handle; used by tests and throwaway sessions.
    pub fn in_memory() -> Result<Self> {
        let inner = spawn_worker(Connection::open_in_memory)?;
        Ok(Self {
            inner,
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref().map(PathBuf::as_path)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let reply_rx = self.enqueue(task)?;
        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Enqueues `task` now and hands back the receiver for its result, so the caller fixes
    /// the write order synchronously and awaits the outcome later.
    pub fn enqueue<F, T>(&self, task: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        Ok(reply_rx)
    }

    /// Enqueues a task without waiting for it. Ordering relative to other tasks is fixed at
    /// the moment of this call; failures are only logged.
    pub fn submit<F>(&self, label: &'static str, task: F) -> Result<()>
    where
        F: FnOnce(&mut Connection) -> Result<()> + Send + 'static,
    {
        let command = DbCommand::Execute(Box::new(move |conn| {
            if let Err(err) = task(conn) {
                error!("Queued DB task '{label}' failed: {err:#}");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))
    }
}

fn open_file(db_path: &Path) -> Result<Arc<DatabaseInner>> {
    let path_for_thread = db_path.to_path_buf();
    spawn_worker(move || Connection::open(&path_for_thread))
}

/// Whether opening failed because the file is not a usable SQLite database.
fn is_unreadable(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<rusqlite::Error>())
        .any(|cause| {
            matches!(
                cause,
                rusqlite::Error::SqliteFailure(failure, _)
                    if matches!(failure.code, ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
            )
        })
}

/// Renames `db_path` (and any WAL sidecar files) to `<name>.corrupt`. Returns the new path
/// of the main file.
fn set_aside(db_path: &Path) -> Result<PathBuf> {
    let mut main_aside = None;
    for suffix in ["", "-wal", "-shm"] {
        let mut from = OsString::from(db_path.as_os_str());
        from.push(suffix);
        let from = PathBuf::from(from);
        if !from.exists() {
            continue;
        }

        let mut to = from.clone().into_os_string();
        to.push(".corrupt");
        let to = PathBuf::from(to);
        std::fs::rename(&from, &to).with_context(|| {
            format!("failed to move unreadable index {} aside", from.display())
        })?;
        if suffix.is_empty() {
            main_aside = Some(to);
        }
    }
    main_aside.ok_or_else(|| anyhow!("unreadable index {} vanished", db_path.display()))
}

fn spawn_worker<O>(open: O) -> Result<Arc<DatabaseInner>>
where
    O: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
    let (ready_tx, ready_rx) = mpsc::channel();

    let worker = thread::Builder::new()
        .name("armemo-db".into())
        .spawn(move || {
            let mut conn = match open() {
                Ok(connection) => connection,
                Err(err) => {
                    let _ = ready_tx.send(Err(
                        anyhow::Error::new(err).context("failed to open SQLite database")
                    ));
                    return;
                }
            };

            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                error!("Failed to enable WAL mode: {err}");
            }

            let init_result =
                run_migrations(&mut conn).context("failed to run database migrations");
            let init_failed = init_result.is_err();
            if ready_tx.send(init_result).is_err() {
                error!("DB initialization receiver dropped before ready signal");
                return;
            }
            if init_failed {
                return;
            }

            while let Ok(command) = command_rx.recv() {
                match command {
                    DbCommand::Execute(task) => {
                        task(&mut conn);
                    }
                    DbCommand::Shutdown => break,
                }
            }

            info!("Database thread shutting down");
        })
        .with_context(|| "failed to spawn database worker thread")?;

    let ready = ready_rx
        .recv()
        .context("database worker exited before signaling readiness")
        .and_then(|init| init);
    if let Err(err) = ready {
        // The connection must be closed before the caller touches the file again.
        if worker.join().is_err() {
            error!("DB thread panicked during initialization");
        }
        return Err(err);
    }

    Ok(Arc::new(DatabaseInner {
        sender: command_tx,
        worker: Mutex::new(Some(worker)),
    }))
}
