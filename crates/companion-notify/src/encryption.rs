//! Message encryption for Web Push (RFC 8291, `aes128gcm` content coding).
//!
//! Each message uses a fresh P-256 key pair and salt. The body is
//! `salt | record size | key id length | sender public key | ciphertext`.

use aes_gcm::{
    Aes128Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hkdf::Hkdf;
use p256::PublicKey;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::Sha256;
use thiserror::Error;

pub const CONTENT_ENCODING: &str = "aes128gcm";

const RECORD_SIZE: u32 = 4096;
const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
/// Marks the final (and only) record.
const LAST_RECORD_DELIMITER: u8 = 0x02;

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("invalid subscription key: {0}")]
    Key(&'static str),
    #[error("key derivation failed")]
    Derivation,
    #[error("payload too large for a single record")]
    TooLarge,
    #[error("AES-GCM encryption failed")]
    Cipher,
}

pub(crate) struct Secrets {
    pub cek: [u8; 16],
    pub nonce: [u8; 12],
}

fn decode_key(raw: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(raw.trim().trim_end_matches('=')).ok()
}

/// Derive the content key and nonce shared by sender and receiver.
pub(crate) fn derive(
    ecdh_secret: &[u8],
    auth_secret: &[u8],
    receiver_public: &[u8],
    sender_public: &[u8],
    salt: &[u8],
) -> Result<Secrets, EncryptionError> {
    let mut key_info = Vec::with_capacity(14 + 2 * PUBLIC_KEY_LEN);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(receiver_public);
    key_info.extend_from_slice(sender_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&key_info, &mut ikm)
        .map_err(|_| EncryptionError::Derivation)?;

    let prk = Hkdf::<Sha256>::new(Some(salt), &ikm);
    let mut secrets = Secrets { cek: [0u8; 16], nonce: [0u8; 12] };
    prk.expand(b"Content-Encoding: aes128gcm\0", &mut secrets.cek)
        .map_err(|_| EncryptionError::Derivation)?;
    prk.expand(b"Content-Encoding: nonce\0", &mut secrets.nonce)
        .map_err(|_| EncryptionError::Derivation)?;
    Ok(secrets)
}

/// Encrypt `plaintext` for the browser identified by the subscription's
/// `p256dh` public key and `auth` secret (both base64url).
pub fn encrypt(p256dh: &str, auth: &str, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let receiver_public = decode_key(p256dh).ok_or(EncryptionError::Key("p256dh is not base64url"))?;
    let auth_secret = decode_key(auth).ok_or(EncryptionError::Key("auth is not base64url"))?;
    if auth_secret.len() != AUTH_SECRET_LEN {
        return Err(EncryptionError::Key("auth secret must be 16 bytes"));
    }
    let receiver = PublicKey::from_sec1_bytes(&receiver_public)
        .map_err(|_| EncryptionError::Key("p256dh is not a P-256 point"))?;
    // 16-byte tag plus the delimiter must fit in one record.
    if plaintext.len() + 17 + SALT_LEN + 5 + PUBLIC_KEY_LEN > RECORD_SIZE as usize {
        return Err(EncryptionError::TooLarge);
    }

    let sender = EphemeralSecret::random(&mut OsRng);
    let sender_public = sender.public_key().to_encoded_point(false);
    let shared = sender.diffie_hellman(&receiver);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let secrets = derive(
        shared.raw_secret_bytes().as_slice(),
        &auth_secret,
        &receiver_public,
        sender_public.as_bytes(),
        &salt,
    )?;

    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&secrets.cek));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&secrets.nonce), padded.as_slice())
        .map_err(|_| EncryptionError::Cipher)?;

    let mut body = Vec::with_capacity(SALT_LEN + 5 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(sender_public.as_bytes());
    body.extend_from_slice(&ciphertext);
    Ok(body)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use p256::SecretKey;

    /// A browser-side key pair in subscription form.
    pub struct Browser {
        pub secret: SecretKey,
        pub p256dh: String,
        pub auth: String,
        auth_secret: [u8; 16],
    }

    impl Browser {
        pub fn new() -> Self {
            let secret = SecretKey::random(&mut OsRng);
            let public = secret.public_key().to_encoded_point(false);
            let mut auth_secret = [0u8; 16];
            OsRng.fill_bytes(&mut auth_secret);
            Self {
                p256dh: URL_SAFE_NO_PAD.encode(public.as_bytes()),
                auth: URL_SAFE_NO_PAD.encode(auth_secret),
                secret,
                auth_secret,
            }
        }

        /// Decrypt a push body the way a user agent does.
        pub fn decrypt(&self, body: &[u8]) -> Vec<u8> {
            let salt = &body[..SALT_LEN];
            let id_len = body[SALT_LEN + 4] as usize;
            let sender_public = &body[SALT_LEN + 5..SALT_LEN + 5 + id_len];
            let ciphertext = &body[SALT_LEN + 5 + id_len..];

            let sender = PublicKey::from_sec1_bytes(sender_public).unwrap();
            let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), sender.as_affine());
            let receiver_public = self.secret.public_key().to_encoded_point(false);
            let secrets = derive(
                shared.raw_secret_bytes().as_slice(),
                &self.auth_secret,
                receiver_public.as_bytes(),
                sender_public,
                salt,
            )
            .unwrap();

            let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&secrets.cek));
            let mut plain = cipher.decrypt(Nonce::from_slice(&secrets.nonce), ciphertext).unwrap();
            assert_eq!(plain.pop(), Some(LAST_RECORD_DELIMITER));
            plain
        }
    }

    #[test]
    fn browser_can_decrypt() {
        let browser = Browser::new();
        let body = encrypt(&browser.p256dh, &browser.auth, b"{\"title\":\"Luna\"}").unwrap();

        assert_eq!(&body[SALT_LEN..SALT_LEN + 4], &RECORD_SIZE.to_be_bytes());
        assert_eq!(body[SALT_LEN + 4] as usize, PUBLIC_KEY_LEN);
        assert!(!body.windows(4).any(|w| w == b"Luna"));
        assert_eq!(browser.decrypt(&body), b"{\"title\":\"Luna\"}");
    }

    #[test]
    fn each_message_uses_fresh_keys() {
        let browser = Browser::new();
        let a = encrypt(&browser.p256dh, &browser.auth, b"same").unwrap();
        let b = encrypt(&browser.p256dh, &browser.auth, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_keys() {
        let browser = Browser::new();
        assert!(matches!(encrypt("key", &browser.auth, b"x"), Err(EncryptionError::Key(_))));
        assert!(matches!(encrypt(&browser.p256dh, "YQ", b"x"), Err(EncryptionError::Key(_))));
        assert!(matches!(
            encrypt(&browser.p256dh, &browser.auth, &[0u8; 4096]),
            Err(EncryptionError::TooLarge)
        ));
    }
}
