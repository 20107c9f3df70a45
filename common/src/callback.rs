// Inbound callback verification for the platform's URL ownership check
//
// The platform signs the encrypted echo with SHA-1 over the sorted
// (token, timestamp, nonce, echostr) and encrypts it with AES-256-CBC under the
// configured EncodingAESKey. Decrypted layout:
//   16 random bytes | 4-byte big-endian length N | N payload bytes | receive id

use crate::errors::CallbackError;
use crate::models::{CallbackChallenge, CallbackSecrets};
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tracing::{debug, instrument, warn};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// Length of the configured EncodingAESKey
pub const AES_KEY_CHARS: usize = 43;

/// Padding block size used by the platform (not the AES block size)
pub const PAD_BLOCK_SIZE: usize = 32;

const RANDOM_PREFIX_LEN: usize = 16;
const LENGTH_FIELD_LEN: usize = 4;

/// The key is 43 base64 characters with the final `=` dropped, and its last
/// character is not guaranteed to have zero trailing bits
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode an EncodingAESKey into the 32-byte AES key
pub fn decode_aes_key(aes_key: &str) -> Result<[u8; 32], CallbackError> {
    if aes_key.len() != AES_KEY_CHARS {
        return Err(CallbackError::InvalidAesKey(format!(
            "expected {} characters, got {}",
            AES_KEY_CHARS,
            aes_key.len()
        )));
    }

    let bytes = KEY_ENGINE
        .decode(aes_key)
        .map_err(|e| CallbackError::InvalidAesKey(e.to_string()))?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        CallbackError::InvalidAesKey(format!("decoded to {} bytes, expected 32", bytes.len()))
    })
}

/// SHA-1 hex digest over the lexicographically sorted, concatenated parts
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, encrypted: &str) -> String {
    let mut parts = [token, timestamp, nonce, encrypted];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verifier bound to one set of callback secrets
#[derive(Clone)]
pub struct CallbackCrypto {
    token: String,
    key: [u8; 32],
    corp_id: String,
}

impl std::fmt::Debug for CallbackCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackCrypto")
            .field("corp_id", &self.corp_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl CallbackCrypto {
    /// Validate the secrets; empty values and malformed keys are configuration errors
    pub fn new(secrets: &CallbackSecrets) -> Result<Self, CallbackError> {
        if secrets.token.is_empty() || secrets.aes_key.is_empty() || secrets.corp_id.is_empty() {
            return Err(CallbackError::MissingConfig);
        }

        Ok(Self {
            token: secrets.token.clone(),
            key: decode_aes_key(&secrets.aes_key)?,
            corp_id: secrets.corp_id.clone(),
        })
    }

    /// Check the signature, then decrypt the echo. The signature is the only
    /// gate; nothing is decrypted for a request that fails it.
    #[instrument(skip(self, challenge), fields(timestamp = %challenge.timestamp, nonce = %challenge.nonce))]
    pub fn verify_and_decrypt(&self, challenge: &CallbackChallenge) -> Result<String, CallbackError> {
        let expected = compute_signature(
            &self.token,
            &challenge.timestamp,
            &challenge.nonce,
            &challenge.echostr,
        );
        debug!(
            calculated = %expected,
            received = %challenge.msg_signature,
            "Callback signature comparison"
        );

        let received = challenge.msg_signature.to_ascii_lowercase();
        if !constant_time_eq(expected.as_bytes(), received.as_bytes()) {
            warn!("Callback signature mismatch");
            return Err(CallbackError::InvalidSignature);
        }

        self.decrypt(&challenge.echostr).map_err(|e| {
            warn!(error = %e, "Callback echo rejected");
            e
        })
    }

    /// Encrypt `message` into the platform's envelope, addressed to our corp id.
    /// Used for encrypted replies; the inverse of `decrypt`.
    pub fn encrypt(&self, message: &str) -> Result<String, CallbackError> {
        let mut plain = vec![0u8; RANDOM_PREFIX_LEN];
        rand::thread_rng().fill_bytes(&mut plain);
        plain.extend_from_slice(&(message.len() as u32).to_be_bytes());
        plain.extend_from_slice(message.as_bytes());
        plain.extend_from_slice(self.corp_id.as_bytes());

        let pad = PAD_BLOCK_SIZE - plain.len() % PAD_BLOCK_SIZE;
        plain.extend(std::iter::repeat(pad as u8).take(pad));

        let len = plain.len();
        let cipher = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CallbackError::Decrypt(e.to_string()))?;
        let encrypted = cipher
            .encrypt_padded_mut::<NoPadding>(&mut plain, len)
            .map_err(|e| CallbackError::Decrypt(e.to_string()))?;
        Ok(STANDARD.encode(encrypted))
    }

    /// Signature the platform would attach to `encrypted`
    pub fn sign(&self, timestamp: &str, nonce: &str, encrypted: &str) -> String {
        compute_signature(&self.token, timestamp, nonce, encrypted)
    }

    /// Decrypt a base64 AES-256-CBC payload and check its receive id
    pub fn decrypt(&self, encrypted: &str) -> Result<String, CallbackError> {
        let mut buf = STANDARD
            .decode(encrypted.trim())
            .map_err(|e| CallbackError::Decrypt(format!("invalid base64: {}", e)))?;

        if buf.is_empty() || buf.len() % 16 != 0 {
            return Err(CallbackError::Decrypt(format!(
                "ciphertext length {} is not a positive multiple of 16",
                buf.len()
            )));
        }

        let cipher = Aes256CbcDec::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CallbackError::Decrypt(e.to_string()))?;
        let plain = cipher
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|e| CallbackError::Decrypt(e.to_string()))?;

        let content = strip_padding(plain)?;
        if content.len() < RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN {
            return Err(CallbackError::Decrypt("plaintext too short".to_string()));
        }

        let body = &content[RANDOM_PREFIX_LEN..];
        let mut length = [0u8; LENGTH_FIELD_LEN];
        length.copy_from_slice(&body[..LENGTH_FIELD_LEN]);
        let message_len = u32::from_be_bytes(length) as usize;

        let rest = &body[LENGTH_FIELD_LEN..];
        if message_len > rest.len() {
            return Err(CallbackError::Decrypt(format!(
                "length field {} exceeds remaining {} bytes",
                message_len,
                rest.len()
            )));
        }
        let (message, receive_id) = rest.split_at(message_len);

        if !constant_time_eq(receive_id, self.corp_id.as_bytes()) {
            return Err(CallbackError::CorpIdMismatch);
        }

        String::from_utf8(message.to_vec())
            .map_err(|e| CallbackError::Decrypt(format!("payload is not UTF-8: {}", e)))
    }
}

/// PKCS#7 removal over the platform's 32-byte padding block
fn strip_padding(plain: &[u8]) -> Result<&[u8], CallbackError> {
    let pad = match plain.last() {
        Some(&last) => last as usize,
        None => return Err(CallbackError::Decrypt("empty plaintext".to_string())),
    };

    if pad == 0 || pad > PAD_BLOCK_SIZE || pad > plain.len() {
        return Err(CallbackError::Decrypt(format!("bad padding value {}", pad)));
    }

    let (content, padding) = plain.split_at(plain.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(CallbackError::Decrypt("inconsistent padding bytes".to_string()));
    }

    Ok(content)
}

/// Verify a callback challenge against the configured secrets and return the
/// decrypted echo as text
pub fn verify_and_decrypt(
    challenge: &CallbackChallenge,
    secrets: &CallbackSecrets,
) -> Result<String, CallbackError> {
    CallbackCrypto::new(secrets)?.verify_and_decrypt(challenge)
}
