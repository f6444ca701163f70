//! The mailserver dispatcher: the connection-per-client state machine that
//! decrypts, authenticates, and dispatches every incoming record.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use airdispatch_core::connection::{read_record, write_record};
use airdispatch_core::envelope::{Container, EncryptedMessage, Header, SignedMessage};
use airdispatch_core::error::{EnvelopeError, RouterError};
use airdispatch_core::identity::{Address, Identity};
use airdispatch_core::router::{Router, kind};
use airdispatch_crypto::address::Fingerprint;
use airdispatch_crypto::hash::sha256;
use airdispatch_crypto::hybrid::{AES_KEY_LEN, AesKey, decrypt_aes};
use airdispatch_proto::wire::{
    WireData, WireMessageDescription, WireMessageList, WireTransferMessage,
    WireTransferMessageList, type_tag,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::DispatchError;
use crate::storage::{DataBlob, Storage, StoredMail};

/// What a dispatch handler hands back to [`Dispatcher::serve`] to write on
/// the connection.
enum Response {
    /// No response record (a bare notification).
    None,
    /// One response record, already signed and encoded.
    Single(Vec<u8>),
    /// A `MessageList` preamble followed by one record per matching `Mail`,
    /// all already signed and encoded.
    Stream(Vec<Vec<u8>>),
}

/// One account's mailserver: its identity, its post office, and the router
/// used to resolve other accounts' servers.
///
/// A `Dispatcher` serves exactly one account — `identity` is both the key
/// used to open envelopes addressed to this server and the key used to sign
/// everything this server sends on that account's behalf (outgoing mail,
/// notifications, error records). Cheap to clone: every accepted connection
/// gets its own clone to run on its own task.
pub struct Dispatcher<S: Storage, R: Router + Clone> {
    identity: Arc<Identity>,
    storage: S,
    router: R,
}

impl<S: Storage, R: Router + Clone> Clone for Dispatcher<S, R> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            storage: self.storage.clone(),
            router: self.router.clone(),
        }
    }
}

impl<S: Storage, R: Router + Clone> Dispatcher<S, R> {
    /// Builds a dispatcher serving `identity`'s account.
    pub fn new(identity: Identity, storage: S, router: R) -> Self {
        Self { identity: Arc::new(identity), storage, router }
    }

    /// This server's own address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.identity.address()
    }

    /// Runs one connection's full lifecycle: read one record, dispatch it,
    /// write one response, then let the connection close. Never propagates
    /// an error — a failed connection is logged and dropped, matching the
    /// "every connection open is paired with a guaranteed close" rule.
    pub async fn handle_connection<T>(&self, mut stream: T)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if let Err(error) = self.serve(&mut stream).await {
            tracing::warn!(%error, "connection failed");
        }
    }

    async fn serve<T>(&self, stream: &mut T) -> Result<(), DispatchError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let payload = read_record(stream).await?;
        let encrypted = EncryptedMessage::decode(&payload)?;
        // timestamp=false: inbound notifications must preserve the
        // originating client's timestamp as-is (section 4.5).
        let (tag, body, header) = encrypted.reconstruct(&self.identity, false)?;

        match self.dispatch(stream, &tag, &body, &header, &encrypted).await {
            Ok(Response::None) => {},
            Ok(Response::Single(record)) => write_record(stream, &record).await?,
            Ok(Response::Stream(records)) => {
                for record in &records {
                    write_record(stream, record).await?;
                }
            },
            Err(error) => {
                tracing::debug!(%error, from = %header.from.fingerprint_hex(), "dispatch failed");
                let record = error.to_encrypted_record(&self.identity, &header.from)?;
                write_record(stream, &record).await?;
            },
        }
        Ok(())
    }

    async fn dispatch<T>(
        &self,
        stream: &mut T,
        tag: &str,
        body: &[u8],
        header: &Header,
        encrypted: &EncryptedMessage,
    ) -> Result<Response, DispatchError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        match tag {
            type_tag::MESSAGE_DESCRIPTION => self.handle_message_description(header, encrypted),
            type_tag::TRANSFER_MESSAGE => self.handle_transfer_message(body, header),
            type_tag::TRANSFER_MESSAGE_LIST => self.handle_transfer_message_list(body, header),
            type_tag::MAIL => self.handle_send(header, encrypted).await,
            type_tag::DATA => self.handle_data(stream, body, header).await,
            other => Err(DispatchError::UnexpectedMessageType(other.to_string())),
        }
    }

    /// `MDE`: append the original envelope to the recipient's incoming queue.
    fn handle_message_description(
        &self,
        header: &Header,
        encrypted: &EncryptedMessage,
    ) -> Result<Response, DispatchError> {
        let owner = header.to.fingerprint_hex();
        self.storage.push_incoming(&owner, encrypted.clone())?;
        Ok(Response::None)
    }

    /// `XFM`: look up a previously stored outgoing message by name and
    /// return it verbatim if the requester is an approved recipient.
    fn handle_transfer_message(
        &self,
        body: &[u8],
        header: &Header,
    ) -> Result<Response, DispatchError> {
        let request = WireTransferMessage::decode(body).map_err(EnvelopeError::Proto)?;
        let owner = self.identity.address().fingerprint_hex();

        let stored = self
            .storage
            .load_outgoing(&owner, &request.name)?
            .ok_or(DispatchError::MessageNotFound)?;

        let requester = header.from.fingerprint_hex();
        if !stored.message.recipient_fingerprints().iter().any(|fp| fp == &requester) {
            return Err(DispatchError::NotAuthorized);
        }

        Ok(Response::Single(stored.message.encode()?))
    }

    /// `XFL`: stream every public-feed item stored after `since`.
    fn handle_transfer_message_list(
        &self,
        body: &[u8],
        header: &Header,
    ) -> Result<Response, DispatchError> {
        let request = WireTransferMessageList::decode(body).map_err(EnvelopeError::Proto)?;
        let owner = self.identity.address().fingerprint_hex();
        let items = self.storage.public_feed_since(&owner, request.since)?;

        let preamble = WireMessageList { length: items.len() as u64 };
        let preamble_payload = preamble.encode().map_err(EnvelopeError::Proto)?;

        let mut records = Vec::with_capacity(items.len() + 1);
        records.push(self.sign_and_wrap(type_tag::MESSAGE_LIST, preamble_payload, &header.from)?);
        for item in items {
            records.push(item.message.encode()?);
        }
        Ok(Response::Stream(records))
    }

    /// Outgoing `Mail` (a send): store the message, fan a notification out
    /// to every other recipient's server, and reply with the assigned name.
    async fn handle_send(
        &self,
        header: &Header,
        encrypted: &EncryptedMessage,
    ) -> Result<Response, DispatchError> {
        let name = fresh_name()?;
        let owner = self.identity.address().fingerprint_hex();
        let stored_at = unix_now();

        self.storage.store_outgoing(
            &owner,
            &name,
            StoredMail { message: encrypted.clone(), stored_at },
        )?;
        if header.to.is_public() {
            self.storage.push_public(
                &owner,
                StoredMail { message: encrypted.clone(), stored_at },
            )?;
        }

        let recipients: Vec<String> = encrypted
            .recipient_fingerprints()
            .into_iter()
            .filter(|fingerprint| *fingerprint != owner)
            .collect();

        let mut tasks = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let dispatcher = self.clone();
            let name = name.clone();
            tasks.push(tokio::spawn(async move {
                dispatcher.notify_recipient(&recipient, &name).await
            }));
        }
        for task in tasks {
            match task.await {
                Ok(Err(error)) => tracing::warn!(%error, "notification delivery failed"),
                Err(error) => tracing::warn!(%error, "notification task panicked"),
                Ok(Ok(())) => {},
            }
        }

        let description = WireMessageDescription {
            name,
            location: self.identity.address().location().unwrap_or_default().to_string(),
            nonce: 0,
        };
        let payload = description.encode().map_err(EnvelopeError::Proto)?;
        Ok(Response::Single(self.sign_and_wrap(
            type_tag::MESSAGE_DESCRIPTION,
            payload,
            &header.from,
        )?))
    }

    /// Resolves `recipient`'s server through the router and ships it a
    /// `MessageDescription` pointing back at this server's copy of `name`.
    /// A per-recipient failure is logged by the caller and never rolls back
    /// the store (section 4.5: "does not roll back the store").
    async fn notify_recipient(&self, recipient_hex: &str, name: &str) -> Result<(), DispatchError> {
        let fingerprint = Fingerprint::from_hex(recipient_hex)
            .ok_or_else(|| DispatchError::Internal(format!("malformed fingerprint {recipient_hex:?}")))?;
        let recipient = self.router.lookup(&self.identity, fingerprint, kind::MAIL).await?;
        let location = recipient
            .location()
            .ok_or(RouterError::AddressNotFound)?
            .to_string();

        let description = WireMessageDescription {
            name: name.to_string(),
            location: self.identity.address().location().unwrap_or_default().to_string(),
            nonce: 0,
        };
        let payload = description.encode().map_err(EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::MESSAGE_DESCRIPTION, payload, &recipient)?;

        let mut stream = TcpStream::connect(&location).await?;
        write_record(&mut stream, &record).await?;
        Ok(())
    }

    /// `DAT`: either store a freshly streamed large payload (a push) or
    /// replay a previously stored one (a pull by name).
    ///
    /// A push descriptor carries a real `hash`/`length`; a pull descriptor
    /// carries only `name`, with `hash` empty and `length` zero. On a push,
    /// the `iv ‖ AES-CFB(plaintext)` body follows immediately as its own
    /// record on this same connection (section 9: "Data"); the dispatcher
    /// reads exactly that record, decrypts it, and verifies
    /// `sha256(decrypted) == hash` before accepting and storing it.
    async fn handle_data<T>(
        &self,
        stream: &mut T,
        body: &[u8],
        header: &Header,
    ) -> Result<Response, DispatchError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let request = WireData::decode(body).map_err(EnvelopeError::Proto)?;
        let owner = self.identity.address().fingerprint_hex();

        if request.hash.is_empty() && request.length == 0 {
            let stored = self
                .storage
                .load_data(&owner, &request.name)?
                .ok_or(DispatchError::MessageNotFound)?;

            let payload = stored.descriptor.encode().map_err(EnvelopeError::Proto)?;
            let header_record = self.sign_and_wrap(type_tag::DATA, payload, &header.from)?;
            write_record(stream, &header_record).await?;
            write_record(stream, &stored.ciphertext).await?;
            return Ok(Response::None);
        }

        let streamed = read_record(stream).await?;
        if streamed.len() as u64 != request.length {
            return Err(DispatchError::IntegrityMismatch(format!(
                "declared length {} does not match {} streamed bytes",
                request.length,
                streamed.len()
            )));
        }

        let key = aes_key_from_slice(&request.key)?;
        let decrypted = decrypt_aes(&streamed, &key).map_err(EnvelopeError::Crypto)?;
        if sha256(&decrypted).as_slice() != request.hash.as_slice() {
            return Err(DispatchError::IntegrityMismatch(
                "sha256(decrypted) does not match the declared hash".to_string(),
            ));
        }

        let name = fresh_name()?;
        let descriptor = WireData { name: name.clone(), ..request };
        self.storage.store_data(
            &owner,
            &name,
            DataBlob { descriptor: descriptor.clone(), ciphertext: streamed },
        )?;

        let payload = descriptor.encode().map_err(EnvelopeError::Proto)?;
        Ok(Response::Single(self.sign_and_wrap(type_tag::DATA, payload, &header.from)?))
    }

    /// Signs `payload` under this server's identity and wraps it as an
    /// `EncryptedMessage` addressed to `to`, ready to write on the wire.
    fn sign_and_wrap(&self, tag: &str, payload: Vec<u8>, to: &Address) -> Result<Vec<u8>, DispatchError> {
        let header = Header::new(self.identity.address(), to.clone());
        let container = Container::new(header, payload, tag);
        let signed = SignedMessage::sign(&container, &self.identity)?;

        let encrypted = if to.is_public() {
            EncryptedMessage::unencrypted(&signed)?
        } else {
            let mut encrypted = EncryptedMessage::encrypt(&signed)?;
            encrypted.add_recipient(to)?;
            encrypted
        };
        Ok(encrypted.encode()?)
    }
}

fn aes_key_from_slice(bytes: &[u8]) -> Result<AesKey, DispatchError> {
    let array: [u8; AES_KEY_LEN] = bytes.try_into().map_err(|_| {
        DispatchError::IntegrityMismatch(format!(
            "data key was {} bytes, expected {AES_KEY_LEN}",
            bytes.len()
        ))
    })?;
    Ok(AesKey::from_bytes(array))
}

fn fresh_name() -> Result<String, DispatchError> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|error| DispatchError::Internal(error.to_string()))?;
    Ok(hex::encode(bytes))
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_secs()).unwrap_or(0)
}
