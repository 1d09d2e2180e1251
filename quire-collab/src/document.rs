//! Document actor: the single serialization point for one document.
//!
//! ```text
//!  DocumentHandle ──┐
//!  DocumentHandle ──┼── mpsc (bounded) ──► actor (own OS thread)
//!  DocumentHandle ──┘                        │ rebase ─► apply ─► push ─► reply
//!                                             │
//!                    watch<DocumentState> ◄───┘
//! ```
//!
//! Requests are processed one at a time in arrival order, so an operation's
//! rebase, apply and append are never interleaved with another request.
//! An operation is acknowledged only after its log push has returned.
//!
//! Every actor owns a dedicated thread, so open documents never hold
//! threads from the runtime's blocking pool.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use quire_ot::{Operation, OtError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use uuid::Uuid;

use crate::config::DocumentConfig;
use crate::history::{History, HistoryError};
use crate::storage::{LogProvider, OperationLog};

/// Lifecycle of a document actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Loading,
    Running,
    Closing,
    Closed,
}

/// Errors surfaced to callers of a [`DocumentHandle`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// The rebased operation does not fit the document. Resynchronize from
    /// a fresh snapshot.
    #[error("Operation rejected (document at index {current:?}): {source}")]
    Rejected { source: OtError, current: Option<u64> },
    #[error("Base index {base} is ahead of the document (last index {current:?})")]
    InvalidBase { base: u64, current: Option<u64> },
    #[error("Document is closed")]
    DocumentClosed,
    /// Durability failure. The document has been shut down.
    #[error("Document unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to load document: {0}")]
    Load(String),
    #[error("Invalid document name '{0}'")]
    InvalidName(String),
}

/// An operation accepted into the history.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    /// The operation as rebased onto the document, for broadcast.
    pub op: Operation,
    pub index: u64,
}

/// Consistent view of the content and the last index it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub content: Vec<u8>,
    pub index: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Rebases that read evicted entries back from the log
    pub history_seeks: u64,
    pub content_len: usize,
}

type Reply<T> = oneshot::Sender<Result<T, DocumentError>>;

enum Request {
    Apply {
        op: Operation,
        author: Uuid,
        base: Option<u64>,
        reply: Reply<Accepted>,
    },
    Snapshot {
        reply: Reply<Snapshot>,
    },
    Stats {
        reply: Reply<DocumentStats>,
    },
    Close,
}

impl Request {
    fn fail(self, err: DocumentError) {
        match self {
            Request::Apply { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(Err(err));
            }
            Request::Stats { reply } => {
                let _ = reply.send(Err(err));
            }
            Request::Close => {}
        }
    }
}

/// Cloneable handle to a running document actor.
#[derive(Clone)]
pub struct DocumentHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Request>,
    /// Held shared while a request is enqueued, exclusively by `close`.
    gate: Arc<RwLock<()>>,
    closing: Arc<AtomicBool>,
    state: watch::Receiver<DocumentState>,
}

impl DocumentHandle {
    /// Recover `name` from `provider` and start its actor. Resolves once
    /// replay has finished.
    pub async fn open<P: LogProvider>(
        provider: Arc<P>,
        name: &str,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        validate_name(name)?;

        let name: Arc<str> = Arc::from(name);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(DocumentState::Loading);
        let closing = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let actor_name = name.clone();
        let actor_closing = closing.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("quire-doc-{name}"))
            .spawn(move || {
                let loaded = load(provider.as_ref(), &actor_name, &config);
                drop(provider);
                match loaded {
                    Ok((history, content)) => {
                        state_tx.send_replace(DocumentState::Running);
                        let _ = ready_tx.send(Ok(()));
                        DocumentActor {
                            name: actor_name,
                            history,
                            content,
                            rx,
                            state: state_tx,
                            closing: actor_closing,
                            root_dir: config.root_dir,
                            accepted: 0,
                            rejected: 0,
                        }
                        .run();
                    }
                    Err(e) => {
                        error!("Failed to load document '{actor_name}': {e}");
                        actor_closing.store(true, Ordering::SeqCst);
                        state_tx.send_replace(DocumentState::Closed);
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });
        if let Err(e) = spawned {
            return Err(DocumentError::Load(format!("spawning actor thread: {e}")));
        }

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self {
                name,
                tx,
                gate: Arc::new(RwLock::new(())),
                closing,
                state: state_rx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DocumentError::Load("actor exited while loading".into())),
        }
    }

    /// Rebase `op` from `base`, apply it and record it durably.
    pub async fn apply(
        &self,
        op: Operation,
        author: Uuid,
        base: Option<u64>,
    ) -> Result<Accepted, DocumentError> {
        self.request(|reply| Request::Apply {
            op,
            author,
            base,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, DocumentError> {
        self.request(|reply| Request::Snapshot { reply }).await
    }

    pub async fn stats(&self) -> Result<DocumentStats, DocumentError> {
        self.request(|reply| Request::Stats { reply }).await
    }

    /// Stop accepting requests and wait for the actor to finish. Requests
    /// issued before `close` still complete, including ones still waiting
    /// for a queue slot. Safe to call more than once.
    pub async fn close(&self) {
        {
            let _gate = self.gate.write().await;
            if !self.closing.swap(true, Ordering::SeqCst) {
                // A send error means the actor is already gone.
                let _ = self.tx.send(Request::Close).await;
            }
        }
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == DocumentState::Closed).await;
    }

    pub fn state(&self) -> DocumentState {
        *self.state.borrow()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether both handles talk to the same actor.
    pub fn same_actor(&self, other: &DocumentHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, DocumentError> {
        let (reply, rx) = oneshot::channel();
        {
            let _gate = self.gate.read().await;
            if self.closing.load(Ordering::SeqCst) {
                return Err(DocumentError::DocumentClosed);
            }
            self.tx
                .send(make(reply))
                .await
                .map_err(|_| DocumentError::DocumentClosed)?;
        }
        rx.await.map_err(|_| DocumentError::DocumentClosed)?
    }
}

/// Document names double as file names under the root directory.
fn validate_name(name: &str) -> Result<(), DocumentError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(DocumentError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn backing_path(root_dir: &Option<PathBuf>, name: &str) -> Option<PathBuf> {
    root_dir.as_ref().map(|root| root.join(name))
}

fn load<P: LogProvider>(
    provider: &P,
    name: &str,
    config: &DocumentConfig,
) -> Result<(History<P::Log>, Vec<u8>), DocumentError> {
    let mut log = provider.recover(name).map_err(load_error)?;
    if config.seed_from_file {
        seed_from_file(&mut log, name, config)?;
    }
    let (history, content) =
        History::recover(log, config.history_window).map_err(load_error)?;

    info!(
        "Opened document '{name}' at index {:?} ({} bytes)",
        history.last_index(),
        content.len()
    );
    Ok((history, content))
}

/// Use the backing file as base content of a log that has neither records
/// nor a base yet. Later file edits are never read back.
fn seed_from_file<L: OperationLog>(
    log: &mut L,
    name: &str,
    config: &DocumentConfig,
) -> Result<(), DocumentError> {
    if !log.is_empty() || log.base_content().map_err(load_error)?.is_some() {
        return Ok(());
    }
    let Some(path) = backing_path(&config.root_dir, name) else {
        return Ok(());
    };
    match fs::read(&path) {
        Ok(bytes) if !bytes.is_empty() => {
            log.set_base_content(&bytes).map_err(load_error)?;
            info!("Seeded '{name}' from {} ({} bytes)", path.display(), bytes.len());
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DocumentError::Load(format!("reading {}: {e}", path.display()))),
    }
}

fn load_error(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Load(e.to_string())
}

struct DocumentActor<L: OperationLog> {
    name: Arc<str>,
    history: History<L>,
    content: Vec<u8>,
    rx: mpsc::Receiver<Request>,
    state: watch::Sender<DocumentState>,
    closing: Arc<AtomicBool>,
    root_dir: Option<PathBuf>,
    accepted: u64,
    rejected: u64,
}

impl<L: OperationLog> DocumentActor<L> {
    fn run(mut self) {
        while let Some(request) = self.rx.blocking_recv() {
            match request {
                Request::Apply {
                    op,
                    author,
                    base,
                    reply,
                } => {
                    let result = self.apply(op, author, base);
                    let fatal = match &result {
                        Err(DocumentError::Unavailable(reason)) => Some(reason.clone()),
                        _ => None,
                    };
                    let _ = reply.send(result);
                    if let Some(reason) = fatal {
                        self.fail(reason);
                        return;
                    }
                }
                Request::Snapshot { reply } => {
                    let _ = reply.send(Ok(Snapshot {
                        content: self.content.clone(),
                        index: self.history.last_index(),
                    }));
                }
                Request::Stats { reply } => {
                    let _ = reply.send(Ok(DocumentStats {
                        accepted: self.accepted,
                        rejected: self.rejected,
                        history_seeks: self.history.seeks(),
                        content_len: self.content.len(),
                    }));
                }
                Request::Close => break,
            }
        }
        self.shutdown();
    }

    fn apply(
        &mut self,
        op: Operation,
        author: Uuid,
        base: Option<u64>,
    ) -> Result<Accepted, DocumentError> {
        let current = self.history.last_index();
        let rebased = match self.history.rebase(op, author, base) {
            Ok(op) => op,
            Err(HistoryError::InvalidBase { base, .. }) => {
                self.rejected += 1;
                warn!("'{}': base {base} from {author} is ahead of {current:?}", self.name);
                return Err(DocumentError::InvalidBase { base, current });
            }
            Err(HistoryError::Transform(source)) => {
                return Err(self.reject(author, source, current));
            }
            Err(e) => {
                error!("'{}': history read failed: {e}", self.name);
                return Err(DocumentError::Unavailable(e.to_string()));
            }
        };

        let content = match rebased.apply(&self.content) {
            Ok(content) => content,
            Err(source) => return Err(self.reject(author, source, current)),
        };

        let index = match self.history.append(author, base, rebased.clone()) {
            Ok(index) => index,
            Err(e) => {
                error!("'{}': log push failed: {e}", self.name);
                return Err(DocumentError::Unavailable(e.to_string()));
            }
        };
        self.content = content;
        self.accepted += 1;
        debug!("'{}': accepted index {index} from {author}", self.name);

        Ok(Accepted { op: rebased, index })
    }

    fn reject(&mut self, author: Uuid, source: OtError, current: Option<u64>) -> DocumentError {
        self.rejected += 1;
        warn!("'{}': rejected operation from {author}: {source}", self.name);
        DocumentError::Rejected { source, current }
    }

    /// Stop intake and fail everything still queued.
    fn drain(&mut self, err: DocumentError) {
        self.closing.store(true, Ordering::SeqCst);
        self.state.send_replace(DocumentState::Closing);
        self.rx.close();
        while let Ok(request) = self.rx.try_recv() {
            request.fail(err.clone());
        }
    }

    /// Orderly close: flush the backing file, then close the log.
    fn shutdown(mut self) {
        self.drain(DocumentError::DocumentClosed);

        if let Err(e) = self.flush() {
            error!("'{}': failed to write backing file: {e}", self.name);
        }
        if let Err(e) = self.history.close() {
            error!("'{}': failed to close log: {e}", self.name);
        }
        info!(
            "Closed document '{}' at index {:?}",
            self.name,
            self.history.last_index()
        );
        self.finish();
    }

    /// Durability failure: close the log and leave the backing file alone.
    fn fail(mut self, reason: String) {
        self.drain(DocumentError::Unavailable(reason));
        if let Err(e) = self.history.close() {
            error!("'{}': failed to close log: {e}", self.name);
        }
        error!("Document '{}' shut down after a durability failure", self.name);
        self.finish();
    }

    /// Drop the log before publishing `Closed` so a reopen never overlaps
    /// the old handle.
    fn finish(self) {
        let state = self.state;
        drop(self.history);
        state.send_replace(DocumentState::Closed);
    }

    fn flush(&self) -> io::Result<()> {
        let Some(path) = backing_path(&self.root_dir, &self.name) else {
            return Ok(());
        };
        if let Some(root) = &self.root_dir {
            fs::create_dir_all(root)?;
        }
        let tmp = path.with_file_name(format!(".{}.tmp", self.name));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("'{}': wrote {} bytes to {}", self.name, self.content.len(), path.display());
        Ok(())
    }
}
