//! Router, Tracker, and TrackerList: resolving addresses through the
//! tracker network, with DNS TXT fingerprint pinning and parallel fan-out.

use std::future::Future;
use std::time::Duration;

use airdispatch_crypto::address::Fingerprint;
use airdispatch_crypto::keys::{AdRsaPublicKey, EcdsaPublicKey};
use airdispatch_proto::wire::{
    WireAddressRegistration, WireAddressRequest, WireAddressResponse, WireRedirect, type_tag,
};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use tokio::net::TcpStream;

use crate::connection;
use crate::env::{Environment, TokioEnvironment};
use crate::envelope::{Container, Header, SignedMessage};
use crate::error::{EnvelopeError, RouterError, RouterResult};
use crate::identity::{Address, Identity};

/// How long a `TrackerList` fan-out waits before giving up on every tracker.
pub const DEFAULT_FAN_OUT_TIMEOUT: Duration = Duration::from_secs(30);

/// DNS TXT record prefix pinning a tracker's signing-key fingerprint.
pub const PIN_TXT_PREFIX: &str = "adtp__cert:";

/// Redirect-table selector for a lookup or registration.
pub mod kind {
    /// Mail delivery.
    pub const MAIL: &str = "MAIL";
    /// Alias resolution.
    pub const ALIAS: &str = "ALE";
    /// Large-payload transfer.
    pub const TRANSFER: &str = "TX";
    /// Matches any kind; used when an identity has not set up redirects.
    pub const ANY: &str = "*";
}

/// Extracts the pinned fingerprint hex string from a tracker host's TXT
/// records, if present. Kept as a pure function over already-fetched
/// records so the pinning rule itself is unit-testable without a resolver.
#[must_use]
pub fn extract_pinned_fingerprint(txt_records: &[String]) -> Option<String> {
    txt_records
        .iter()
        .find_map(|record| record.strip_prefix(PIN_TXT_PREFIX).map(str::to_string))
}

/// Resolves addresses and publishes self-registrations through the tracker
/// network. `identity` signs the outgoing query or registration, which may
/// differ from the address being looked up.
pub trait Router: Send + Sync {
    /// Looks up an address by its fingerprint.
    fn lookup(
        &self,
        identity: &Identity,
        fingerprint: Fingerprint,
        kind: &str,
    ) -> impl Future<Output = RouterResult<Address>> + Send;

    /// Looks up an address by its human-readable alias.
    fn lookup_alias(
        &self,
        identity: &Identity,
        alias: &str,
        kind: &str,
    ) -> impl Future<Output = RouterResult<Address>> + Send;

    /// Publishes `identity`'s address, alias, and redirects.
    fn register(
        &self,
        identity: &Identity,
        alias: Option<&str>,
        redirects: &[(String, String)],
    ) -> impl Future<Output = RouterResult<()>> + Send;
}

/// A single tracker, addressed by `host:port`.
#[derive(Clone)]
pub struct Tracker {
    location: String,
    resolver: TokioAsyncResolver,
}

impl Tracker {
    /// Builds a tracker handle for `location` (`host:port`), using the
    /// system's configured DNS resolver for pin lookups.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Network`] if the system's resolver
    /// configuration (e.g. `/etc/resolv.conf`) cannot be read.
    pub fn new(location: impl Into<String>) -> RouterResult<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| RouterError::Network(e.to_string()))?;
        Ok(Self {
            location: location.into(),
            resolver,
        })
    }

    /// Builds a tracker handle with an explicit resolver, for tests that
    /// need a non-system configuration.
    #[must_use]
    pub fn with_resolver(location: impl Into<String>, resolver: TokioAsyncResolver) -> Self {
        Self {
            location: location.into(),
            resolver,
        }
    }

    /// The tracker's `host:port`.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    fn host(&self) -> &str {
        self.location.split(':').next().unwrap_or(&self.location)
    }

    async fn send_and_receive(&self, request: &SignedMessage) -> RouterResult<SignedMessage> {
        let mut stream = TcpStream::connect(&self.location)
            .await
            .map_err(|e| RouterError::Network(e.to_string()))?;

        let payload = request.encode()?;
        connection::write_record(&mut stream, &payload)
            .await
            .map_err(|e| RouterError::Network(e.to_string()))?;

        let response = connection::read_record(&mut stream)
            .await
            .map_err(|e| RouterError::Network(e.to_string()))?;

        Ok(SignedMessage::decode(&response)?)
    }

    async fn verify_pin(&self, signer: &Address) -> RouterResult<()> {
        let Ok(lookup) = self.resolver.txt_lookup(self.host()).await else {
            return Ok(());
        };
        let records: Vec<String> = lookup.iter().map(ToString::to_string).collect();
        match extract_pinned_fingerprint(&records) {
            Some(pinned) if pinned == signer.fingerprint_hex() => Ok(()),
            Some(_) => Err(RouterError::TrackerVerificationError),
            None => Ok(()),
        }
    }

    async fn query(&self, identity: &Identity, query: &str, is_alias: bool, kind: &str) -> RouterResult<Address> {
        let request = WireAddressRequest {
            query: query.to_string(),
            is_alias,
            kind: kind.to_string(),
        };
        let payload = request.encode().map_err(EnvelopeError::Proto)?;
        let header = Header::new(identity.address(), Address::public());
        let container = Container::new(header, payload, type_tag::QUERY);
        let signed = SignedMessage::sign(&container, identity)?;

        let response = self.send_and_receive(&signed).await?;
        let verified = response.verify().ok_or(EnvelopeError::InvalidSignature)?;
        let signer = verified.first().ok_or(EnvelopeError::InvalidSignature)?;
        self.verify_pin(signer).await?;

        let (tag, payload, _) = response.reconstruct(None)?;
        if tag != type_tag::RESPONSE {
            return Err(EnvelopeError::UnexpectedMessageType {
                expected: type_tag::RESPONSE,
                got: tag,
            }
            .into());
        }

        let resolved = WireAddressResponse::decode(&payload).map_err(EnvelopeError::Proto)?;
        let signing_key = EcdsaPublicKey::from_bytes(&resolved.signing_key).map_err(EnvelopeError::Crypto)?;
        let encryption_key = AdRsaPublicKey::from_bytes(&resolved.public_key).map_err(EnvelopeError::Crypto)?;

        Ok(Address::from_signing_key(signing_key)
            .with_location(resolved.location)
            .with_encryption_key(encryption_key))
    }

    async fn send_registration(
        &self,
        identity: &Identity,
        alias: Option<&str>,
        redirects: &[(String, String)],
    ) -> RouterResult<()> {
        let address = identity.address();
        let registration = WireAddressRegistration {
            fingerprint: address.fingerprint_bytes(),
            public_key: identity.encryption_key_pair().public_key().to_bytes(),
            signing_key: identity.signing_key_pair().public_key().to_bytes().to_vec(),
            location: address.location().unwrap_or_default().to_string(),
            alias: alias.unwrap_or_default().to_string(),
            redirects: redirects
                .iter()
                .map(|(kind, location)| WireRedirect {
                    kind: kind.clone(),
                    location: location.clone(),
                })
                .collect(),
        };

        let payload = registration.encode().map_err(EnvelopeError::Proto)?;
        let header = Header::new(address, Address::public());
        let container = Container::new(header, payload, type_tag::REGISTRATION);
        let signed = SignedMessage::sign(&container, identity)?;
        self.send_and_receive(&signed).await?;
        Ok(())
    }
}

impl Router for Tracker {
    async fn lookup(&self, identity: &Identity, fingerprint: Fingerprint, kind: &str) -> RouterResult<Address> {
        self.query(identity, &fingerprint.to_hex(), false, kind).await
    }

    async fn lookup_alias(&self, identity: &Identity, alias: &str, kind: &str) -> RouterResult<Address> {
        self.query(identity, alias, true, kind).await
    }

    async fn register(&self, identity: &Identity, alias: Option<&str>, redirects: &[(String, String)]) -> RouterResult<()> {
        self.send_registration(identity, alias, redirects).await
    }
}

/// Fans a query out to every tracker concurrently, resolving on the first
/// success. Fails with [`RouterError::TrackerListQueryError`] only once every
/// tracker has returned an error, or [`RouterError::Timeout`] after the
/// configured deadline.
pub struct TrackerList<E: Environment = TokioEnvironment> {
    trackers: Vec<Tracker>,
    env: E,
    timeout: Duration,
}

impl TrackerList<TokioEnvironment> {
    /// Builds a tracker list with the default 30-second fan-out timeout.
    #[must_use]
    pub fn new(trackers: Vec<Tracker>) -> Self {
        Self {
            trackers,
            env: TokioEnvironment,
            timeout: DEFAULT_FAN_OUT_TIMEOUT,
        }
    }
}

impl<E: Environment> TrackerList<E> {
    /// Builds a tracker list with an explicit environment and timeout, for
    /// deterministic tests.
    #[must_use]
    pub fn with_environment(trackers: Vec<Tracker>, env: E, timeout: Duration) -> Self {
        Self { trackers, env, timeout }
    }

    async fn fan_out<F, Fut>(&self, spawn_one: F) -> RouterResult<Address>
    where
        F: Fn(Tracker) -> Fut,
        Fut: Future<Output = RouterResult<Address>> + Send + 'static,
    {
        if self.trackers.is_empty() {
            return Err(RouterError::AddressNotFound);
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel(self.trackers.len());
        for tracker in &self.trackers {
            let tx = tx.clone();
            let fut = spawn_one(tracker.clone());
            tokio::spawn(async move {
                let _ = tx.send(fut.await).await;
            });
        }
        drop(tx);

        let total = self.trackers.len();
        let mut errors = 0usize;
        let sleep = self.env.sleep(self.timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(Ok(address)) => return Ok(address),
                    Some(Err(_)) => {
                        errors += 1;
                        if errors == total {
                            return Err(RouterError::TrackerListQueryError);
                        }
                    }
                    None => return Err(RouterError::TrackerListQueryError),
                },
                () = &mut sleep => return Err(RouterError::Timeout),
            }
        }
    }
}

impl<E: Environment> Router for TrackerList<E> {
    async fn lookup(&self, identity: &Identity, fingerprint: Fingerprint, kind: &str) -> RouterResult<Address> {
        let identity = identity.clone();
        let kind = kind.to_string();
        self.fan_out(move |tracker| {
            let identity = identity.clone();
            let kind = kind.clone();
            async move { tracker.lookup(&identity, fingerprint, &kind).await }
        })
        .await
    }

    async fn lookup_alias(&self, identity: &Identity, alias: &str, kind: &str) -> RouterResult<Address> {
        let identity = identity.clone();
        let alias = alias.to_string();
        let kind = kind.to_string();
        self.fan_out(move |tracker| {
            let identity = identity.clone();
            let alias = alias.clone();
            let kind = kind.clone();
            async move { tracker.lookup_alias(&identity, &alias, &kind).await }
        })
        .await
    }

    async fn register(&self, identity: &Identity, alias: Option<&str>, redirects: &[(String, String)]) -> RouterResult<()> {
        // Fire-and-forget: every tracker gets the registration in parallel,
        // and an individual tracker's failure does not fail the call.
        let alias = alias.map(str::to_string);
        let redirects = redirects.to_vec();
        let mut handles = Vec::with_capacity(self.trackers.len());
        for tracker in &self.trackers {
            let tracker = tracker.clone();
            let identity = identity.clone();
            let alias = alias.clone();
            let redirects = redirects.clone();
            handles.push(tokio::spawn(async move {
                let _ = tracker.register(&identity, alias.as_deref(), &redirects).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_extraction_finds_the_prefixed_record() {
        let records = vec![
            "unrelated".to_string(),
            "adtp__cert:abcdef0123".to_string(),
        ];
        assert_eq!(extract_pinned_fingerprint(&records).as_deref(), Some("abcdef0123"));
    }

    #[test]
    fn pin_extraction_returns_none_without_a_match() {
        let records = vec!["v=spf1 -all".to_string()];
        assert_eq!(extract_pinned_fingerprint(&records), None);
    }

    #[derive(Clone)]
    struct ManualEnvironment {
        sleep_tx: tokio::sync::mpsc::UnboundedSender<()>,
        sleep_rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::UnboundedReceiver<()>>>,
    }

    impl Environment for ManualEnvironment {
        async fn sleep(&self, _duration: Duration) {
            self.sleep_rx.lock().await.recv().await;
        }
    }

    #[tokio::test]
    async fn fan_out_times_out_when_every_tracker_hangs_forever() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let env = ManualEnvironment {
            sleep_tx: tx,
            sleep_rx: std::sync::Arc::new(tokio::sync::Mutex::new(rx)),
        };

        let list = TrackerList::with_environment(
            vec![Tracker::with_resolver(
                "127.0.0.1:1",
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            )],
            env.clone(),
            Duration::from_secs(5),
        );

        let identity = Identity::generate().unwrap();
        let fingerprint = Fingerprint::derive(b"whatever");

        let task = tokio::spawn(async move { list.lookup(&identity, fingerprint, kind::ANY).await });

        // Let the never-connecting tracker task start, then fire the
        // manual "deadline" without ever letting the lookup succeed.
        tokio::task::yield_now().await;
        env.sleep_tx.send(()).unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(RouterError::Timeout) | Err(RouterError::TrackerListQueryError)));
    }
}
