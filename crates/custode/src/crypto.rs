//! Cryptographic primitives.
//!
//! Random identifiers, SHA-256 hashing, AES-256-GCM encryption of grant
//! props, and the token-keyed AES-KW wrapping (RFC 3394) that binds a
//! grant's props key to possession of an unhashed token string.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use aes_kw::KekAes256;
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Domain-separation constant for wrapping-key derivation. Not a secret:
/// deriving a wrapping key additionally requires the unhashed token string.
/// Fixed for the lifetime of a deployment: changing it orphans every
/// wrapped key in storage.
const WRAP_PEPPER: &[u8; 32] = b"custode-token-wrap-pepper-v1\0\0\0\0";

/// AES-GCM nonce for props encryption: all zero. Each props key encrypts
/// exactly one plaintext (a fresh key is generated per grant and never
/// reused), so the nonce never repeats under a key.
const PROPS_NONCE: [u8; 12] = [0u8; 12];

/// Size in bytes of an RFC 3394 wrapping of a 32-byte key.
const WRAPPED_KEY_LEN: usize = 40;

/// 256-bit key material.
pub type KeyBytes = [u8; 32];

/// Generate a random string over `[A-Za-z0-9]` from the OS CSPRNG.
pub fn random_string(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a fresh 256-bit key from the OS CSPRNG.
pub fn random_key() -> KeyBytes {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// SHA-256 of `data`, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Constant-time string equality, for comparing secret hashes, token
/// hashes, and PKCE challenges.
pub fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Encrypt grant props under a per-grant AES-256-GCM key.
///
/// Returns base64 of the ciphertext (GCM tag included). The key MUST be
/// fresh for this grant and MUST NOT encrypt a second plaintext; that
/// contract is what makes the zero nonce sound.
pub fn encrypt_props(key: &KeyBytes, props: &serde_json::Value) -> Result<String> {
    let plaintext = serde_json::to_vec(props).context("failed to serialize props")?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&PROPS_NONCE), plaintext.as_ref())
        .map_err(|e| anyhow!("props encryption failed: {e}"))?;
    Ok(STANDARD.encode(ciphertext))
}

/// Decrypt a grant's stored props with its unwrapped key.
pub fn decrypt_props(key: &KeyBytes, encrypted: &str) -> Result<serde_json::Value> {
    let ciphertext = STANDARD
        .decode(encrypted)
        .context("encrypted props are not valid base64")?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&PROPS_NONCE), ciphertext.as_ref())
        .map_err(|e| anyhow!("props decryption failed: {e}"))?;
    serde_json::from_slice(&plaintext).context("decrypted props are not valid JSON")
}

/// Derive the AES-KW wrapping key for a token string:
/// `HMAC-SHA-256(pepper, token)`.
fn wrapping_key(token: &str) -> Result<KeyBytes> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(WRAP_PEPPER).context("invalid wrapping-key pepper")?;
    mac.update(token.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    Ok(key)
}

/// Wrap a props key under a token string. The result is only unwrappable
/// by presenting the same unhashed token string.
pub fn wrap_key(token: &str, props_key: &KeyBytes) -> Result<String> {
    let kek = KekAes256::from(wrapping_key(token)?);
    let mut wrapped = [0u8; WRAPPED_KEY_LEN];
    kek.wrap(props_key, &mut wrapped)
        .map_err(|e| anyhow!("key wrap failed: {e}"))?;
    Ok(STANDARD.encode(wrapped))
}

/// Unwrap a stored wrapped key using a presented token string.
///
/// Fails when the token is not the one the key was wrapped under (RFC 3394
/// embeds an integrity check).
pub fn unwrap_key(token: &str, wrapped_b64: &str) -> Result<KeyBytes> {
    let wrapped = STANDARD
        .decode(wrapped_b64)
        .context("wrapped key is not valid base64")?;
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(anyhow!(
            "wrapped key has unexpected length {}",
            wrapped.len()
        ));
    }
    let kek = KekAes256::from(wrapping_key(token)?);
    let mut key = [0u8; 32];
    kek.unwrap(&wrapped, &mut key)
        .map_err(|e| anyhow!("key unwrap failed: {e}"))?;
    Ok(key)
}

/// `base64url(SHA-256(verifier))`, the S256 transform of RFC 7636.
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Verify a PKCE code verifier against a stored challenge (RFC 7636).
///
/// Supports `S256` and `plain`; comparisons are constant-time.
pub fn verify_pkce(challenge: &str, method: &str, verifier: &str) -> bool {
    match method {
        "S256" => ct_eq(&s256_challenge(verifier), challenge),
        "plain" => ct_eq(verifier, challenge),
        _ => false,
    }
}
