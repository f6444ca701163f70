//! AirDispatch mailserver: the dispatcher wired to a plain TCP accept loop.
//!
//! ```text
//! airdispatch-core   (identity, envelope, router)
//!        |
//! airdispatch-server (storage, dispatch, accept loop) <- you are here
//! ```
//!
//! The protocol has no transport security of its own (section 1: "no
//! transport security; all confidentiality, integrity, and authentication
//! are done inside the envelope"), so this crate speaks plain TCP.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod storage;

use std::io;
use std::net::SocketAddr;

use airdispatch_core::identity::{Address, Identity};
use airdispatch_core::router::Router;
use tokio::net::TcpListener;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, ErrorCode};
pub use storage::{DataBlob, MemoryStorage, Storage, StorageError, StoredMail};

/// A bound mailserver: a listening socket paired with its dispatcher.
pub struct Server<S: Storage, R: Router + Clone> {
    listener: TcpListener,
    dispatcher: Dispatcher<S, R>,
}

impl<S: Storage, R: Router + Clone + 'static> Server<S, R> {
    /// Binds `bind_address` and wires up a dispatcher serving `identity`'s
    /// account over `storage`, resolving other accounts through `router`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the address cannot be bound.
    pub async fn bind(
        bind_address: &str,
        identity: Identity,
        storage: S,
        router: R,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        Ok(Self { listener, dispatcher: Dispatcher::new(identity, storage, router) })
    }

    /// The address this server actually bound to (useful when
    /// `bind_address` used an ephemeral port, e.g. `"127.0.0.1:0"` in
    /// tests).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the listener's local address can't be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// This server's own address (signing key, encryption key, location).
    #[must_use]
    pub fn address(&self) -> Address {
        self.dispatcher.address()
    }

    /// Runs the accept loop forever: every connection is handled on its own
    /// task (section 5: "each accepted connection is handled on its own
    /// task"). A single connection's failure is logged by the dispatcher and
    /// never stops the loop.
    ///
    /// # Errors
    ///
    /// Returns an I/O error only if `accept` itself fails (the listening
    /// socket is broken).
    pub async fn run(&self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                tracing::debug!(%peer, "accepted connection");
                dispatcher.handle_connection(stream).await;
            });
        }
    }
}
