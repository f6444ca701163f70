//! In-memory reference `Storage` implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use airdispatch_core::envelope::EncryptedMessage;

use super::{DataBlob, Storage, StorageError, StoredMail};

#[derive(Debug, Default)]
struct Mailbox {
    outgoing: HashMap<String, StoredMail>,
    incoming: Vec<EncryptedMessage>,
    public: Vec<StoredMail>,
    data: HashMap<String, DataBlob>,
}

#[derive(Debug, Default)]
struct MemoryStorageInner {
    mailboxes: HashMap<String, Mailbox>,
}

/// A `Storage` backed entirely by an in-process map.
///
/// Good enough for tests and for single-process deployments; every account's
/// post office lives behind one global mutex, which trivially satisfies the
/// requirement that modifications to a given mailbox never interleave.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with at least one populated mailbox field.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn mailbox_count(&self) -> usize {
        let inner = self.inner.lock().expect("mutex poisoned");
        inner.mailboxes.len()
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn store_outgoing(
        &self,
        owner: &str,
        name: &str,
        mail: StoredMail,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.mailboxes.entry(owner.to_string()).or_default().outgoing.insert(name.to_string(), mail);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_outgoing(&self, owner: &str, name: &str) -> Result<Option<StoredMail>, StorageError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        Ok(inner.mailboxes.get(owner).and_then(|mailbox| mailbox.outgoing.get(name)).cloned())
    }

    #[allow(clippy::expect_used)]
    fn push_incoming(&self, owner: &str, message: EncryptedMessage) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.mailboxes.entry(owner.to_string()).or_default().incoming.push(message);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn drain_incoming(&self, owner: &str) -> Result<Vec<EncryptedMessage>, StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        Ok(inner.mailboxes.entry(owner.to_string()).or_default().incoming.drain(..).collect())
    }

    #[allow(clippy::expect_used)]
    fn push_public(&self, owner: &str, mail: StoredMail) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.mailboxes.entry(owner.to_string()).or_default().public.push(mail);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn public_feed_since(&self, owner: &str, since: u64) -> Result<Vec<StoredMail>, StorageError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        Ok(inner
            .mailboxes
            .get(owner)
            .map(|mailbox| {
                mailbox.public.iter().filter(|item| item.stored_at > since).cloned().collect()
            })
            .unwrap_or_default())
    }

    #[allow(clippy::expect_used)]
    fn store_data(&self, owner: &str, name: &str, blob: DataBlob) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.mailboxes.entry(owner.to_string()).or_default().data.insert(name.to_string(), blob);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn load_data(&self, owner: &str, name: &str) -> Result<Option<DataBlob>, StorageError> {
        let inner = self.inner.lock().expect("mutex poisoned");
        Ok(inner.mailboxes.get(owner).and_then(|mailbox| mailbox.data.get(name)).cloned())
    }
}
