//! MPPE key material (RFC 2548, RFC 3079).

use rand::Rng;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::core::avp::AVPError;
use crate::core::mschap::{self, MschapError};
use crate::core::password;

pub const MPPE_KEY_LENGTH: usize = 16;

const MASTER_KEY_MAGIC: &[u8] = b"This is the MPPE Master Key";
const SEND_KEY_MAGIC_CLIENT: &[u8] =
    b"On the client side, this is the send key; on the server side, it is the receive key.";
const RECV_KEY_MAGIC_CLIENT: &[u8] =
    b"On the client side, this is the receive key; on the server side, it is the send key.";
const SHS_PAD1: [u8; 40] = [0x00; 40];
const SHS_PAD2: [u8; 40] = [0xf2; 40];

#[derive(Error, Debug, PartialEq)]
pub enum MppeError {
    #[error(transparent)]
    MschapError(#[from] MschapError),
    #[error(transparent)]
    PasswordError(#[from] AVPError),
    #[error("salt must have the most significant bit set: {0:#04x}")]
    InvalidSaltError(u8),
    #[error("encrypted key has an invalid length: {0} bytes")]
    InvalidCipherTextLengthError(usize),
    #[error("encrypted key declares {0} bytes but carries only {1}")]
    InvalidKeyLengthError(usize, usize),
}

/// MS-CHAP-MPPE-Keys for MS-CHAPv1: LM-hash[0..8] ‖ MD4(NT-hash) ‖ 8 zero bytes,
/// hidden the same way as User-Password.
pub fn mschap_mppe_keys(
    password: &str,
    secret: &[u8],
    request_authenticator: &[u8],
) -> Result<Vec<u8>, MppeError> {
    let blob = mschap_mppe_key_blob(password)?;
    Ok(password::encrypt(&blob, secret, request_authenticator)?)
}

fn mschap_mppe_key_blob(password: &str) -> Result<[u8; 32], MppeError> {
    let lm_hash = mschap::lm_password_hash(password)?;
    let hash_hash = mschap::hash_nt_password_hash(&mschap::nt_password_hash(password));

    let mut blob = [0u8; 32];
    blob[..8].copy_from_slice(&lm_hash[..8]);
    blob[8..24].copy_from_slice(&hash_hash);
    Ok(blob)
}

/// GetMasterKey (RFC 3079 section 3.4)
pub fn master_key(password: &str, nt_response: &[u8; mschap::RESPONSE_LENGTH]) -> [u8; 16] {
    let password_hash_hash = mschap::hash_nt_password_hash(&mschap::nt_password_hash(password));

    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MASTER_KEY_MAGIC);
    let digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// GetAsymmetricStartKey (RFC 3079 section 3.4) from the point of view of the server.
pub fn asymmetric_start_key(master_key: &[u8; 16], is_send: bool) -> [u8; MPPE_KEY_LENGTH] {
    let magic = if is_send {
        RECV_KEY_MAGIC_CLIENT
    } else {
        SEND_KEY_MAGIC_CLIENT
    };

    let mut hasher = Sha1::new();
    hasher.update(master_key);
    hasher.update(SHS_PAD1);
    hasher.update(magic);
    hasher.update(SHS_PAD2);
    let digest = hasher.finalize();

    let mut key = [0u8; MPPE_KEY_LENGTH];
    key.copy_from_slice(&digest[..MPPE_KEY_LENGTH]);
    key
}

/// Server side (send, receive) start keys for an MS-CHAPv2 session.
pub fn mschapv2_session_keys(
    password: &str,
    nt_response: &[u8; mschap::RESPONSE_LENGTH],
) -> ([u8; MPPE_KEY_LENGTH], [u8; MPPE_KEY_LENGTH]) {
    let master = master_key(password, nt_response);
    (
        asymmetric_start_key(&master, true),
        asymmetric_start_key(&master, false),
    )
}

/// Encrypts MS-MPPE-Send-Key / MS-MPPE-Recv-Key material with a fresh salt (RFC 2548 section 2.4.2).
pub fn encrypt_key(
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8],
) -> Result<Vec<u8>, MppeError> {
    let mut rng = rand::thread_rng();
    let salt = [rng.gen::<u8>() | 0x80, rng.gen::<u8>()];
    encrypt_key_with_salt(key, secret, request_authenticator, salt)
}

/// ```text
/// P = key-length ‖ key ‖ padding
/// b(1) = MD5(S + R + A)    c(1) = p(1) xor b(1)
/// b(i) = MD5(S + c(i-1))   c(i) = p(i) xor b(i)
/// ```
pub fn encrypt_key_with_salt(
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8],
    salt: [u8; 2],
) -> Result<Vec<u8>, MppeError> {
    if salt[0] & 0x80 == 0 {
        return Err(MppeError::InvalidSaltError(salt[0]));
    }
    if secret.is_empty() {
        return Err(AVPError::PasswordSecretMissingError().into());
    }
    if request_authenticator.len() != 16 {
        return Err(AVPError::InvalidRequestAuthenticatorLength().into());
    }

    let mut plain = vec![key.len() as u8];
    plain.extend(key);
    let rem = plain.len() % 16;
    if rem != 0 {
        plain.extend(vec![0; 16 - rem]);
    }

    let mut enc = salt.to_vec();
    let mut prev = [request_authenticator, &salt[..]].concat();
    for chunk in plain.chunks(16) {
        let b = md5::compute([secret, &prev[..]].concat());
        prev = b.iter().zip(chunk).map(|(b, p)| b ^ p).collect();
        enc.extend(&prev);
    }
    Ok(enc)
}

/// Inverse of `encrypt_key()`, used by peers and tests.
pub fn decrypt_key(
    value: &[u8],
    secret: &[u8],
    request_authenticator: &[u8],
) -> Result<Vec<u8>, MppeError> {
    if value.len() < 18 || (value.len() - 2) % 16 != 0 {
        return Err(MppeError::InvalidCipherTextLengthError(value.len()));
    }
    if value[0] & 0x80 == 0 {
        return Err(MppeError::InvalidSaltError(value[0]));
    }

    let (salt, cipher_text) = value.split_at(2);
    let mut plain: Vec<u8> = Vec::with_capacity(cipher_text.len());
    let mut prev = [request_authenticator, salt].concat();
    for chunk in cipher_text.chunks(16) {
        let b = md5::compute([secret, &prev[..]].concat());
        plain.extend(b.iter().zip(chunk).map(|(b, c)| b ^ c));
        prev = chunk.to_vec();
    }

    let key_len = plain[0] as usize;
    if key_len > plain.len() - 1 {
        return Err(MppeError::InvalidKeyLengthError(key_len, plain.len() - 1));
    }
    Ok(plain[1..=key_len].to_vec())
}
