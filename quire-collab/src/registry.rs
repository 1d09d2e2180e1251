//! Process-scoped registry of open documents.
//!
//! Maps document names to running actors with a reference count per name.
//! Every name has its own slot, locked across that document's open and
//! close, so a log never has two actors writing to it. The map lock only
//! guards slot lookup and is never held while an actor starts or stops.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use tokio::sync::Mutex;

use crate::config::DocumentConfig;
use crate::document::{DocumentError, DocumentHandle, DocumentState};
use crate::storage::LogProvider;

#[derive(Default)]
struct Slot {
    handle: Option<DocumentHandle>,
    refs: usize,
}

type SharedSlot = Arc<Mutex<Slot>>;

pub struct DocumentRegistry<P: LogProvider> {
    provider: Arc<P>,
    config: DocumentConfig,
    documents: Mutex<HashMap<String, SharedSlot>>,
}

impl<P: LogProvider> DocumentRegistry<P> {
    pub fn new(provider: P, config: DocumentConfig) -> Self {
        Self::with_provider(Arc::new(provider), config)
    }

    pub fn with_provider(provider: Arc<P>, config: DocumentConfig) -> Self {
        Self {
            provider,
            config,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Return the running actor for `name`, starting it if needed. Every
    /// successful call must be paired with a [`release`](Self::release).
    pub async fn open(&self, name: &str) -> Result<DocumentHandle, DocumentError> {
        let slot = self
            .documents
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .clone();
        let result = {
            let mut slot = slot.lock().await;
            self.open_in(&mut slot, name).await
        };
        drop(slot);
        if result.is_err() {
            self.prune(name).await;
        }
        result
    }

    async fn open_in(
        &self,
        slot: &mut Slot,
        name: &str,
    ) -> Result<DocumentHandle, DocumentError> {
        if let Some(handle) = &slot.handle {
            if handle.state() == DocumentState::Running {
                slot.refs += 1;
                return Ok(handle.clone());
            }
        }
        // The actor shut itself down; wait for it to release the log.
        if let Some(stale) = slot.handle.take() {
            info!("Replacing stopped actor for '{name}'");
            stale.close().await;
        }
        slot.refs = 0;

        let handle =
            DocumentHandle::open(self.provider.clone(), name, self.config.clone()).await?;
        slot.handle = Some(handle.clone());
        slot.refs = 1;
        Ok(handle)
    }

    /// Drop one reference. The last release closes the document (flushing
    /// its backing file) before returning `true`.
    pub async fn release(&self, handle: &DocumentHandle) -> bool {
        let Some(slot) = self.documents.lock().await.get(handle.name()).cloned() else {
            return false;
        };
        let closed = {
            let mut slot = slot.lock().await;
            release_in(&mut slot, handle).await
        };
        drop(slot);
        if closed {
            self.prune(handle.name()).await;
        }
        closed
    }

    /// Names with a registered or starting actor, sorted.
    pub async fn open_documents(&self) -> Vec<String> {
        let documents = self.documents.lock().await;
        let mut names: Vec<String> = documents.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn ref_count(&self, name: &str) -> Option<usize> {
        let slot = self.documents.lock().await.get(name).cloned()?;
        let slot = slot.lock().await;
        slot.handle.as_ref().map(|_| slot.refs)
    }

    /// Close every document regardless of outstanding references.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, SharedSlot)> = self
            .documents
            .lock()
            .await
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();

        let mut count = 0;
        for (name, slot) in slots {
            {
                let mut slot = slot.lock().await;
                if let Some(handle) = slot.handle.take() {
                    handle.close().await;
                    count += 1;
                }
                slot.refs = 0;
            }
            drop(slot);
            self.prune(&name).await;
        }
        info!("Registry shut down ({count} documents closed)");
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Forget an empty slot nobody else is waiting on.
    async fn prune(&self, name: &str) {
        let mut documents = self.documents.lock().await;
        let idle = documents.get(name).is_some_and(|slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|s| s.handle.is_none())
        });
        if idle {
            documents.remove(name);
        }
    }
}

async fn release_in(slot: &mut Slot, handle: &DocumentHandle) -> bool {
    match &slot.handle {
        Some(current) if current.same_actor(handle) => {}
        _ => return false,
    }
    slot.refs = slot.refs.saturating_sub(1);
    if slot.refs > 0 {
        return false;
    }
    if let Some(current) = slot.handle.take() {
        current.close().await;
    }
    true
}
