//! AirDispatch client: send, pull, and public-feed helpers built on
//! [`airdispatch_core`]'s envelope and router layers.
//!
//! ```text
//! airdispatch-core   (identity, envelope, router)
//!        |
//! airdispatch-client (send/pull/list_feed conversations) <- you are here
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;

pub use client::{Client, Notification, exchange};
pub use error::ClientError;
