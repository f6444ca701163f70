//! End-to-end `Client` tests against real `airdispatch-server` instances.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use airdispatch_client::Client;
use airdispatch_core::error::{RouterError, RouterResult};
use airdispatch_core::identity::{Address, Identity};
use airdispatch_core::router::Router;
use airdispatch_crypto::address::Fingerprint;
use airdispatch_proto::wire::{WireMail, WireMailComponent};
use airdispatch_server::storage::Storage;
use airdispatch_server::{MemoryStorage, Server};

/// A fixed address book standing in for a tracker network.
#[derive(Clone, Default)]
struct DirectoryRouter {
    entries: Arc<Mutex<HashMap<String, Address>>>,
}

impl DirectoryRouter {
    fn new() -> Self {
        Self::default()
    }

    fn insert(&self, address: Address) {
        self.entries.lock().unwrap().insert(address.fingerprint_hex(), address);
    }
}

impl Router for DirectoryRouter {
    async fn lookup(
        &self,
        _requester: &Identity,
        fingerprint: Fingerprint,
        _kind: &str,
    ) -> RouterResult<Address> {
        self.entries
            .lock()
            .unwrap()
            .get(&fingerprint.to_hex())
            .cloned()
            .ok_or(RouterError::AddressNotFound)
    }

    async fn lookup_alias(&self, _requester: &Identity, _alias: &str, _kind: &str) -> RouterResult<Address> {
        Err(RouterError::AddressNotFound)
    }

    async fn register(
        &self,
        _identity: &Identity,
        _alias: Option<&str>,
        _redirects: &[(String, String)],
    ) -> RouterResult<()> {
        Ok(())
    }
}

async fn spawn_server(
    port: u16,
    identity: Identity,
    storage: MemoryStorage,
    router: DirectoryRouter,
) -> Address {
    let bind = format!("127.0.0.1:{port}");
    let identity = identity.with_location(bind.clone());
    let server = Server::bind(&bind, identity, storage, router).await.unwrap();
    let address = server.address();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    address
}

fn greeting() -> WireMail {
    WireMail {
        components: vec![WireMailComponent { ty: "test".to_string(), data: b"hello world".to_vec() }],
    }
}

/// S1: `A` sends `B` a Mail through `Client::send`; `B` drains its own
/// server's incoming queue, decodes the notification with `Client`, and
/// pulls the real content with `Client::pull`.
#[tokio::test]
async fn send_then_pull_round_trips_the_mail() {
    let a = Identity::generate().unwrap();
    let b = Identity::generate().unwrap();
    let router = DirectoryRouter::new();

    let storage_a = MemoryStorage::new();
    let storage_b = MemoryStorage::new();
    let a_address = spawn_server(27201, a.clone(), storage_a, router.clone()).await;
    let b_address = spawn_server(27202, b.clone(), storage_b.clone(), router.clone()).await;
    router.insert(a_address.clone());
    router.insert(b_address.clone());

    let client_a = Client::new(a, a_address.location().unwrap().to_string(), router.clone());
    let client_b = Client::new(b, b_address.location().unwrap().to_string(), router.clone());

    let description = client_a.send(&b_address, &greeting()).await.unwrap();
    assert_eq!(description.location, a_address.location().unwrap());

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let queued = storage_b.drain_incoming(&b_address.fingerprint_hex()).unwrap();
    assert_eq!(queued.len(), 1);

    let notification = client_b.decode_notification(&queued[0].encode().unwrap()).unwrap();
    assert_eq!(notification.author.fingerprint_hex(), a_address.fingerprint_hex());
    assert_eq!(notification.description.name, description.name);

    let (header, mail) = client_b.pull(&notification).await.unwrap();
    assert_eq!(header.from.fingerprint_hex(), a_address.fingerprint_hex());
    assert_eq!(mail.components.len(), 1);
    assert_eq!(mail.components[0].ty, "test");
    assert_eq!(mail.components[0].data, b"hello world");
}

/// Property 9 as seen through the client API: pulling a message you were
/// never addressed to fails with `NotAuthorized`.
#[tokio::test]
async fn pull_rejects_an_uninvited_requester() {
    let a = Identity::generate().unwrap();
    let b = Identity::generate().unwrap();
    let stranger = Identity::generate().unwrap();
    let router = DirectoryRouter::new();

    let a_address = spawn_server(27203, a.clone(), MemoryStorage::new(), router.clone()).await;
    let b_address = spawn_server(27204, b, MemoryStorage::new(), router.clone()).await;
    router.insert(a_address.clone());
    router.insert(b_address.clone());

    let client_a = Client::new(a, a_address.location().unwrap().to_string(), router.clone());
    let description = client_a.send(&b_address, &greeting()).await.unwrap();

    let client_stranger = Client::new(stranger, a_address.location().unwrap().to_string(), router.clone());
    let notification = airdispatch_client::Notification { author: a_address.clone(), description };
    let error = client_stranger.pull(&notification).await.unwrap_err();
    assert!(matches!(error, airdispatch_client::ClientError::ReceivedError { .. }));
}

/// `DAT` through the client API: `send_data` streams a payload to `A`'s own
/// server, which verifies and stores it; `pull_data` fetches it back by name
/// and verifies it again on the way out, recovering the original plaintext.
#[tokio::test]
async fn send_data_then_pull_data_round_trips_the_payload() {
    let a = Identity::generate().unwrap();
    let b = Identity::generate().unwrap();
    let router = DirectoryRouter::new();

    let a_address = spawn_server(27206, a.clone(), MemoryStorage::new(), router.clone()).await;
    let b_address = spawn_server(27207, b.clone(), MemoryStorage::new(), router.clone()).await;
    router.insert(a_address.clone());
    router.insert(b_address.clone());

    let client_a = Client::new(a, a_address.location().unwrap().to_string(), router.clone());
    let client_b = Client::new(b, b_address.location().unwrap().to_string(), router.clone());

    let plaintext = b"attachment bytes, pretend they're large".to_vec();
    let descriptor = client_a.send_data(&b_address, "notes.txt", &plaintext).await.unwrap();
    assert!(!descriptor.name.is_empty());
    assert_eq!(descriptor.filename, "notes.txt");

    let (pulled_descriptor, pulled_plaintext) = client_b
        .pull_data(&a_address, a_address.location().unwrap(), &descriptor.name)
        .await
        .unwrap();
    assert_eq!(pulled_descriptor.hash, descriptor.hash);
    assert_eq!(pulled_plaintext, plaintext);
}

/// S2: the public feed only returns items stored strictly after `since`.
#[tokio::test]
async fn list_feed_only_returns_items_after_since() {
    let a = Identity::generate().unwrap();
    let router = DirectoryRouter::new();
    let a_address = spawn_server(27205, a.clone(), MemoryStorage::new(), router.clone()).await;
    router.insert(a_address.clone());

    let client_a = Client::new(a, a_address.location().unwrap().to_string(), router.clone());
    client_a.send(&Address::public(), &greeting()).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let cutoff = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    client_a.send(&Address::public(), &greeting()).await.unwrap();

    let reader = Identity::generate().unwrap();
    let client_reader = Client::new(reader, a_address.location().unwrap().to_string(), router);
    let feed = client_reader.list_feed(&a_address, cutoff).await.unwrap();
    assert_eq!(feed.len(), 1);
}
