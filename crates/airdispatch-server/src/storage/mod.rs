//! The mailserver's storage delegate.
//!
//! The dispatcher never touches a database directly; every persistent
//! effect of handling a connection goes through this trait. Swap in a
//! different impl (a database, a chaos-injecting wrapper for testing) without
//! touching dispatch logic.

mod error;
mod memory;

pub use error::StorageError;
pub use memory::MemoryStorage;

use airdispatch_core::envelope::EncryptedMessage;
use airdispatch_proto::wire::WireData;

/// A stored large-payload stream: its descriptor plus the raw `iv ‖
/// AES-CFB(plaintext)` bytes exactly as they arrived on the wire.
///
/// The server never holds the decrypted payload at rest — only the
/// ciphertext it already verified against `descriptor.hash` at push time.
#[derive(Debug, Clone)]
pub struct DataBlob {
    /// The `Data` descriptor, with `name` set to the name it was stored under.
    pub descriptor: WireData,
    /// `iv ‖ AES-CFB(plaintext)`, unmodified since it was received.
    pub ciphertext: Vec<u8>,
}

/// A stored message plus the time it was stored.
///
/// The stored `message` already carries its own per-recipient header table,
/// built at send time; that table doubles as the approved-recipient set, so
/// `StoredMail` does not duplicate it.
#[derive(Debug, Clone)]
pub struct StoredMail {
    /// The encrypted envelope as the sender submitted it.
    pub message: EncryptedMessage,
    /// Unix-seconds timestamp at the time of storage.
    pub stored_at: u64,
}

/// Backend for a mailserver's post office.
///
/// Must be `Clone` (shared across connection tasks), `Send + Sync` (accessed
/// concurrently), and synchronous (storage calls are expected to be quick;
/// async backends can wrap their own runtime internally).
///
/// All methods are keyed by `owner`, the hex fingerprint of the account whose
/// mailbox is being touched. A single-tenant dispatcher always passes its own
/// fingerprint, but the trait itself does not assume that — nothing prevents
/// one backend from hosting several accounts.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Stores a just-sent message under a server-chosen `name`, so it can
    /// later be retrieved by `(owner, name)` via a transfer request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to persist the entry.
    fn store_outgoing(&self, owner: &str, name: &str, mail: StoredMail) -> Result<(), StorageError>;

    /// Loads a previously stored outgoing message, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to read.
    fn load_outgoing(&self, owner: &str, name: &str) -> Result<Option<StoredMail>, StorageError>;

    /// Appends a notification (or any other incoming record) to `owner`'s
    /// incoming queue.
    ///
    /// This has no wire-visible counterpart: the protocol only ever pushes
    /// into a queue on `owner`'s behalf; draining it is a purely local
    /// operation exposed to the account holder, not a network request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to persist the entry.
    fn push_incoming(&self, owner: &str, message: EncryptedMessage) -> Result<(), StorageError>;

    /// Drains (removes and returns) everything currently queued for `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to read.
    fn drain_incoming(&self, owner: &str) -> Result<Vec<EncryptedMessage>, StorageError>;

    /// Appends a message to `owner`'s public feed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to persist the entry.
    fn push_public(&self, owner: &str, mail: StoredMail) -> Result<(), StorageError>;

    /// Returns every feed item stored strictly after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to read.
    fn public_feed_since(&self, owner: &str, since: u64) -> Result<Vec<StoredMail>, StorageError>;

    /// Stores a verified large-payload stream under a server-chosen `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to persist the entry.
    fn store_data(&self, owner: &str, name: &str, blob: DataBlob) -> Result<(), StorageError>;

    /// Loads a previously stored large-payload stream, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to read.
    fn load_data(&self, owner: &str, name: &str) -> Result<Option<DataBlob>, StorageError>;
}
