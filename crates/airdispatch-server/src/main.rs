//! AirDispatch mailserver binary.

use std::fs;

use airdispatch_core::identity::{Identity, IdentityBlob};
use airdispatch_core::router::{Tracker, TrackerList};
use airdispatch_server::{MemoryStorage, Server, ServerConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let location = config.location.clone().unwrap_or_else(|| config.bind.clone());
    let identity = load_or_create_identity(&config.identity, &location)?;

    tracing::info!(address = %identity.address().fingerprint_hex(), %location, "airdispatch server starting");

    let trackers = config
        .trackers
        .iter()
        .map(|tracker| Tracker::new(tracker.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    if trackers.is_empty() {
        tracing::warn!("no trackers configured: other accounts will not be resolvable");
    }
    let router = TrackerList::new(trackers);

    let server = Server::bind(&config.bind, identity, MemoryStorage::new(), router).await?;
    tracing::info!(addr = %server.local_addr()?, "listening");
    server.run().await?;

    Ok(())
}

/// Loads this server's identity from `path`, generating and persisting a
/// fresh one on first run. The on-disk format is the opaque, versioned
/// [`IdentityBlob`] (section 6: "Persisted state").
fn load_or_create_identity(path: &str, location: &str) -> Result<Identity, Box<dyn std::error::Error>> {
    if let Ok(bytes) = fs::read(path) {
        let blob = IdentityBlob::decode(&bytes)?;
        return Ok(Identity::from_blob(&blob)?);
    }

    let identity = Identity::generate()?.with_location(location.to_string());
    let blob = identity.to_blob()?;
    fs::write(path, blob.encode()?)?;
    Ok(identity)
}
