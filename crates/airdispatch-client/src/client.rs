//! Convenience client: send, pull, and public-feed operations over a plain
//! TCP connection per request, mirroring the mailserver's own
//! connection-per-exchange model.

use airdispatch_core::connection::{read_record, write_record};
use airdispatch_core::envelope::{Container, EncryptedMessage, Header, SignedMessage};
use airdispatch_core::identity::{Address, Identity};
use airdispatch_core::router::{Router, kind};
use airdispatch_crypto::hash::sha256;
use airdispatch_crypto::hybrid::{AES_KEY_LEN, AesKey, decrypt_aes, encrypt_aes};
use airdispatch_proto::wire::{
    WireData, WireError, WireMail, WireMessageDescription, WireMessageList, WireTransferMessage,
    WireTransferMessageList, type_tag,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::ClientError;

/// A decoded notification: the sender's address and the pointer telling a
/// recipient where to pull the real `Mail` from.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The message's author, as attested by their server's signature.
    pub author: Address,
    /// Where to send the follow-up `TransferMessage` pull.
    pub description: WireMessageDescription,
}

/// A single account's outward-facing operations: send a Mail via this
/// account's own server, pull a Mail another server is holding, decode a
/// notification, and read a server's public feed.
///
/// Holds no open connections: every operation dials a fresh TCP connection,
/// matching the one-request-per-connection shape of the conversations it
/// drives (section 6: "External interfaces").
pub struct Client<R: Router> {
    identity: Identity,
    home_server: String,
    router: R,
}

impl<R: Router> Client<R> {
    /// Builds a client for `identity`, sending through `home_server` (this
    /// account's own mailserver) and resolving other accounts via `router`.
    #[must_use]
    pub fn new(identity: Identity, home_server: impl Into<String>, router: R) -> Self {
        Self { identity, home_server: home_server.into(), router }
    }

    /// This client's own address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.identity.address()
    }

    /// Sends `mail` to `to` via this account's own server. Returns the
    /// assigned [`WireMessageDescription`] naming where the stored copy
    /// lives (section 6: "Send").
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ReceivedError`] if the server answers with an
    /// `ERR` record, and [`ClientError::Io`] if the connection fails.
    pub async fn send(&self, to: &Address, mail: &WireMail) -> Result<WireMessageDescription, ClientError> {
        let payload = mail.encode().map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::MAIL, payload, to)?;

        let mut stream = TcpStream::connect(&self.home_server).await?;
        write_record(&mut stream, &record).await?;
        let response = read_record(&mut stream).await?;

        let (tag, body, _header) = self.open(&response)?;
        match tag.as_str() {
            type_tag::MESSAGE_DESCRIPTION => Ok(WireMessageDescription::decode(&body)
                .map_err(airdispatch_core::error::EnvelopeError::Proto)?),
            type_tag::ERROR => Err(self.error_from_body(&body)?),
            other => Err(ClientError::UnexpectedResponseType(other.to_string())),
        }
    }

    /// Streams `plaintext` to this account's own server as a large payload:
    /// a `Data` descriptor followed by `iv ‖ AES-CFB(plaintext)` on the same
    /// connection (section 9: "Data"). Returns the assigned descriptor,
    /// naming where the stored copy lives.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ReceivedError`] if the server answers with an
    /// `ERR` record, and [`ClientError::Io`] if the connection fails.
    pub async fn send_data(
        &self,
        to: &Address,
        filename: impl Into<String>,
        plaintext: &[u8],
    ) -> Result<WireData, ClientError> {
        let key = AesKey::generate();
        let streamed = encrypt_aes(plaintext, &key);
        let descriptor = WireData {
            hash: sha256(plaintext).to_vec(),
            length: streamed.len() as u64,
            key: key.as_bytes().to_vec(),
            name: String::new(),
            filename: filename.into(),
        };
        let payload = descriptor.encode().map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::DATA, payload, to)?;

        let mut stream = TcpStream::connect(&self.home_server).await?;
        write_record(&mut stream, &record).await?;
        write_record(&mut stream, &streamed).await?;
        let response = read_record(&mut stream).await?;

        let (tag, body, _header) = self.open(&response)?;
        match tag.as_str() {
            type_tag::DATA => Ok(WireData::decode(&body)
                .map_err(airdispatch_core::error::EnvelopeError::Proto)?),
            type_tag::ERROR => Err(self.error_from_body(&body)?),
            other => Err(ClientError::UnexpectedResponseType(other.to_string())),
        }
    }

    /// Pulls a previously streamed large payload by name from `author`'s
    /// server at `location`, decrypting and verifying it against the
    /// descriptor's declared hash before returning the plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::IntegrityMismatch`] if the streamed bytes do
    /// not match the descriptor's declared length or hash, and the usual
    /// I/O, envelope, and `ERR`-response errors otherwise.
    pub async fn pull_data(
        &self,
        author: &Address,
        location: &str,
        name: &str,
    ) -> Result<(WireData, Vec<u8>), ClientError> {
        let request = WireData {
            hash: Vec::new(),
            length: 0,
            key: Vec::new(),
            name: name.to_string(),
            filename: String::new(),
        };
        let payload = request.encode().map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::DATA, payload, author)?;

        let mut stream = TcpStream::connect(location).await?;
        write_record(&mut stream, &record).await?;

        let response = read_record(&mut stream).await?;
        let (tag, body, _header) = self.open(&response)?;
        let descriptor = match tag.as_str() {
            type_tag::DATA => {
                WireData::decode(&body).map_err(airdispatch_core::error::EnvelopeError::Proto)?
            },
            type_tag::ERROR => return Err(self.error_from_body(&body)?),
            other => return Err(ClientError::UnexpectedResponseType(other.to_string())),
        };

        let streamed = read_record(&mut stream).await?;
        if streamed.len() as u64 != descriptor.length {
            return Err(ClientError::IntegrityMismatch(format!(
                "declared length {} does not match {} streamed bytes",
                descriptor.length,
                streamed.len()
            )));
        }

        let key = aes_key_from_slice(&descriptor.key)?;
        let decrypted = decrypt_aes(&streamed, &key)
            .map_err(airdispatch_core::error::EnvelopeError::Crypto)?;
        if sha256(&decrypted).as_slice() != descriptor.hash.as_slice() {
            return Err(ClientError::IntegrityMismatch(
                "sha256(decrypted) does not match the declared hash".to_string(),
            ));
        }

        Ok((descriptor, decrypted))
    }

    /// Decodes a notification record this account's server queued, yielding
    /// the author's address and the pointer to the real content.
    ///
    /// Draining the queue itself has no wire opcode (section 4.5): callers
    /// read raw records out of their own server's incoming queue through
    /// whatever local interface that server exposes, then hand each one to
    /// this method.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnexpectedResponseType`] if `record` is not an
    /// `MDE`, and the usual envelope errors if it fails to decode or verify.
    pub fn decode_notification(&self, record: &[u8]) -> Result<Notification, ClientError> {
        let (tag, body, header) = self.open(record)?;
        if tag != type_tag::MESSAGE_DESCRIPTION {
            return Err(ClientError::UnexpectedResponseType(tag));
        }
        let description = WireMessageDescription::decode(&body)
            .map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        Ok(Notification { author: header.from, description })
    }

    /// Pulls the real `Mail` a notification points at, connecting directly
    /// to the author's server named in `notification.description.location`
    /// (section 6: "Inbox pull").
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ReceivedError`] if the author's server answers
    /// `NotAuthorized` or `MessageNotFound`, and the usual I/O and envelope
    /// errors otherwise.
    pub async fn pull(&self, notification: &Notification) -> Result<(Header, WireMail), ClientError> {
        let request = WireTransferMessage {
            name: notification.description.name.clone(),
            author: notification.author.fingerprint_hex(),
        };
        let payload = request.encode().map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::TRANSFER_MESSAGE, payload, &notification.author)?;

        let mut stream = TcpStream::connect(&notification.description.location).await?;
        write_record(&mut stream, &record).await?;
        let response = read_record(&mut stream).await?;
        self.open_mail(&response)
    }

    /// Resolves `fingerprint` through the router and pulls the account's
    /// entire public feed stored strictly after `since` (section 6: "Public
    /// feed pull").
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Router`] if the account can't be resolved, and
    /// the usual I/O and envelope errors otherwise.
    pub async fn list_feed(
        &self,
        author: &Address,
        since: u64,
    ) -> Result<Vec<(Header, WireMail)>, ClientError> {
        let location = author.location().ok_or(airdispatch_core::error::RouterError::AddressNotFound)?;

        let request = WireTransferMessageList { author: author.fingerprint_hex(), since };
        let payload = request.encode().map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        let record = self.sign_and_wrap(type_tag::TRANSFER_MESSAGE_LIST, payload, author)?;

        let mut stream = TcpStream::connect(location).await?;
        write_record(&mut stream, &record).await?;

        let preamble = read_record(&mut stream).await?;
        let (tag, body, _header) = self.open(&preamble)?;
        let length = match tag.as_str() {
            type_tag::MESSAGE_LIST => {
                WireMessageList::decode(&body).map_err(airdispatch_core::error::EnvelopeError::Proto)?.length
            },
            type_tag::ERROR => return Err(self.error_from_body(&body)?),
            other => return Err(ClientError::UnexpectedResponseType(other.to_string())),
        };

        let mut items = Vec::with_capacity(length as usize);
        for _ in 0..length {
            let record = read_record(&mut stream).await?;
            items.push(self.open_mail(&record)?);
        }
        Ok(items)
    }

    /// Looks up `fingerprint` through the configured router — e.g. to learn
    /// another account's server before sending it mail for the first time.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Router`] if no tracker resolves the address.
    pub async fn resolve(
        &self,
        fingerprint: airdispatch_crypto::address::Fingerprint,
    ) -> Result<Address, ClientError> {
        Ok(self.router.lookup(&self.identity, fingerprint, kind::MAIL).await?)
    }

    fn sign_and_wrap(&self, tag: &str, payload: Vec<u8>, to: &Address) -> Result<Vec<u8>, ClientError> {
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

    /// Decrypts, verifies, and reconstructs one record addressed to this
    /// client, without enforcing the timestamp window (responses on an
    /// already-open connection are not notifications replayed later).
    fn open(&self, record: &[u8]) -> Result<(String, Vec<u8>, Header), ClientError> {
        let encrypted = EncryptedMessage::decode(record)?;
        Ok(encrypted.reconstruct(&self.identity, false)?)
    }

    fn open_mail(&self, record: &[u8]) -> Result<(Header, WireMail), ClientError> {
        let (tag, body, header) = self.open(record)?;
        match tag.as_str() {
            type_tag::MAIL => {
                let mail =
                    WireMail::decode(&body).map_err(airdispatch_core::error::EnvelopeError::Proto)?;
                Ok((header, mail))
            },
            type_tag::ERROR => Err(self.error_from_body(&body)?),
            other => Err(ClientError::UnexpectedResponseType(other.to_string())),
        }
    }

    fn error_from_body(&self, body: &[u8]) -> Result<ClientError, ClientError> {
        let error =
            WireError::decode(body).map_err(airdispatch_core::error::EnvelopeError::Proto)?;
        Ok(ClientError::from_wire(error))
    }
}

fn aes_key_from_slice(bytes: &[u8]) -> Result<AesKey, ClientError> {
    let array: [u8; AES_KEY_LEN] = bytes.try_into().map_err(|_| {
        ClientError::IntegrityMismatch(format!(
            "data key was {} bytes, expected {AES_KEY_LEN}",
            bytes.len()
        ))
    })?;
    Ok(AesKey::from_bytes(array))
}

/// Opens a single outbound connection and drives one record-request/record-
/// response exchange. Used by callers that need finer control than
/// [`Client`]'s fixed conversations (e.g. a tracker `REG`/`QUE`).
pub async fn exchange<T>(stream: &mut T, request: &[u8]) -> Result<Vec<u8>, ClientError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    write_record(stream, request).await?;
    Ok(read_record(stream).await?)
}
