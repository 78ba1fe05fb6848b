use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};

use super::{migrations::run_migrations, PersistenceGateway};

type KvTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum KvCommand {
    Execute(KvTask),
    Shutdown,
}

struct GatewayInner {
    sender: Mutex<mpsc::Sender<KvCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for GatewayInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            let sender = self.sender.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(err) = sender.send(KvCommand::Shutdown) {
                error!("Failed to send shutdown to kv thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join kv thread: {join_err:?}");
            }
        }
    }
}

/// SQLite-backed key-value store. One connection lives on a dedicated thread;
/// calls block the caller until the thread replies.
#[derive(Clone)]
pub struct SqliteGateway {
    inner: Arc<GatewayInner>,
    db_path: Arc<PathBuf>,
}

impl SqliteGateway {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create storage directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<KvCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("tubeplay-kv".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite kv store")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run kv store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("kv initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        KvCommand::Execute(task) => task(&mut conn),
                        KvCommand::Shutdown => break,
                    }
                }

                info!("kv store thread shutting down");
            })
            .with_context(|| "failed to spawn kv worker thread")?;

        ready_rx
            .recv()
            .context("kv worker exited before signaling readiness")??;

        info!("kv store initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(GatewayInner {
                sender: Mutex::new(command_tx),
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();

        let command = KvCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("kv caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .send(command)
            .map_err(|err| anyhow!("failed to send command to kv thread: {err}"))?;

        reply_rx
            .recv()
            .map_err(|_| anyhow!("kv thread terminated unexpectedly"))?
    }
}

impl PersistenceGateway for SqliteGateway {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("failed to read '{key}'"))
        })
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write '{key}'"))?;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete '{key}'"))?;
            Ok(())
        })
    }
}
