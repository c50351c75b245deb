//! Opaque, stateless result tokens.
//!
//! A token carries a subset of an [`ImageResult`] encrypted with AES-256-GCM
//! under a key derived from the configured secret. The viewer flow decodes it
//! back without any server-side index.
//!
//! Wire form: `base64url( base64url(nonce) ":" base64url(ciphertext) )`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Copyright, ImageResult, Result, SearchError};

const NONCE_LEN: usize = 12;
const DELIMITER: char = ':';

/// Fields of a result that survive the round trip through a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub id: String,
    pub title: String,
    pub download_url: String,
    pub source_page_url: String,
    pub source: String,
    pub sources: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub size_estimate: String,
    pub photographer: String,
    pub copyright: Copyright,
}

impl From<&ImageResult> for TokenPayload {
    fn from(result: &ImageResult) -> Self {
        Self {
            id: result.id.clone(),
            title: result.title.clone(),
            download_url: result.download_url.clone(),
            source_page_url: result.source_page_url.clone(),
            source: result.source.clone(),
            sources: result.sources.clone(),
            width: result.width,
            height: result.height,
            size_estimate: result.size_estimate.clone(),
            photographer: result.photographer.clone(),
            copyright: result.copyright.clone(),
        }
    }
}

/// Encodes and decodes opaque tokens.
#[derive(Clone)]
pub struct TokenCodec {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec keyed by SHA-256 of `secret`.
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Encrypts `payload`. A fresh nonce is drawn on every call, so equal
    /// payloads give different tokens.
    pub fn encode(&self, payload: &TokenPayload) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| SearchError::InvalidToken(format!("serialize: {}", e)))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| SearchError::InvalidToken("encryption failed".into()))?;

        let joined = format!(
            "{}{}{}",
            URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            DELIMITER,
            URL_SAFE_NO_PAD.encode(ciphertext)
        );
        Ok(URL_SAFE_NO_PAD.encode(joined))
    }

    /// Encrypts the token subset of a result.
    pub fn encode_result(&self, result: &ImageResult) -> Result<String> {
        self.encode(&TokenPayload::from(result))
    }

    /// Decrypts a token. Any malformed or tampered input yields
    /// [`SearchError::InvalidToken`].
    pub fn decode(&self, token: &str) -> Result<TokenPayload> {
        let outer = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| invalid("not base64url"))?;
        let joined = String::from_utf8(outer).map_err(|_| invalid("not utf-8"))?;
        let (nonce_part, cipher_part) = joined
            .split_once(DELIMITER)
            .ok_or_else(|| invalid("missing delimiter"))?;

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_part)
            .map_err(|_| invalid("bad nonce encoding"))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(invalid("bad nonce length"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(cipher_part)
            .map_err(|_| invalid("bad ciphertext encoding"))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| invalid("decryption failed"))?;

        serde_json::from_slice(&plaintext).map_err(|_| invalid("bad payload"))
    }
}

fn invalid(reason: &str) -> SearchError {
    SearchError::InvalidToken(reason.to_string())
}
