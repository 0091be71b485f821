//! MS-CHAP (RFC 2433) and MS-CHAPv2 (RFC 2759) primitives.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use md4::{Digest, Md4};
use sha1::Sha1;
use thiserror::Error;

pub const CHALLENGE_LENGTH: usize = 8;
pub const V2_CHALLENGE_LENGTH: usize = 16;
pub const RESPONSE_LENGTH: usize = 24;

const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";
const AUTH_MAGIC1: &[u8] = b"Magic server to client signing constant";
const AUTH_MAGIC2: &[u8] = b"Pad to make it do more than one iteration";

#[derive(Error, Debug, PartialEq)]
pub enum MschapError {
    #[error("invalid challenge length: expected={0}, actual={1} bytes")]
    InvalidChallengeLengthError(usize, usize),
    #[error("failed to set up DES key: {0}")]
    CipherError(String),
}

/// NtPasswordHash: MD4 over the UTF-16LE encoded password.
pub fn nt_password_hash(password: &str) -> [u8; 16] {
    let unicode: Vec<u8> = password
        .encode_utf16()
        .flat_map(|c| c.to_le_bytes())
        .collect();
    Md4::digest(unicode).into()
}

/// HashNtPasswordHash
pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    Md4::digest(password_hash).into()
}

/// LmPasswordHash: the upper-cased password, truncated or NUL padded to 14 bytes,
/// keys two DES encryptions of the LM magic.
pub fn lm_password_hash(password: &str) -> Result<[u8; 16], MschapError> {
    let mut ucase = [0u8; 14];
    for (dst, src) in ucase.iter_mut().zip(password.to_uppercase().bytes()) {
        *dst = src;
    }

    let mut hash = [0u8; 16];
    hash[..8].copy_from_slice(&des_encrypt(&ucase[..7], LM_MAGIC)?);
    hash[8..].copy_from_slice(&des_encrypt(&ucase[7..], LM_MAGIC)?);
    Ok(hash)
}

/// Spreads 56 key bits over 8 bytes, leaving the low (parity) bit of each byte clear.
fn expand_des_key(key: &[u8]) -> [u8; 8] {
    [
        key[0] >> 1,
        ((key[0] & 0x01) << 6) | (key[1] >> 2),
        ((key[1] & 0x03) << 5) | (key[2] >> 3),
        ((key[2] & 0x07) << 4) | (key[3] >> 4),
        ((key[3] & 0x0f) << 3) | (key[4] >> 5),
        ((key[4] & 0x1f) << 2) | (key[5] >> 6),
        ((key[5] & 0x3f) << 1) | (key[6] >> 7),
        key[6] & 0x7f,
    ]
    .map(|b| b << 1)
}

fn des_encrypt(key: &[u8], clear: &[u8; 8]) -> Result<[u8; 8], MschapError> {
    let cipher = Des::new_from_slice(&expand_des_key(key))
        .map_err(|e| MschapError::CipherError(e.to_string()))?;
    let mut block = GenericArray::clone_from_slice(clear);
    cipher.encrypt_block(&mut block);
    Ok(block.into())
}

/// ChallengeResponse: three DES encryptions of the challenge keyed by the zero padded hash.
pub fn challenge_response(
    challenge: &[u8; CHALLENGE_LENGTH],
    password_hash: &[u8; 16],
) -> Result<[u8; RESPONSE_LENGTH], MschapError> {
    let mut z_password_hash = [0u8; 21];
    z_password_hash[..16].copy_from_slice(password_hash);

    let mut response = [0u8; RESPONSE_LENGTH];
    for (i, key) in z_password_hash.chunks(7).enumerate() {
        response[i * 8..(i + 1) * 8].copy_from_slice(&des_encrypt(key, challenge)?);
    }
    Ok(response)
}

/// MS-CHAPv1 NT-Response for the given challenge.
pub fn nt_challenge_response(
    challenge: &[u8],
    password: &str,
) -> Result<[u8; RESPONSE_LENGTH], MschapError> {
    let challenge: &[u8; CHALLENGE_LENGTH] = challenge.try_into().map_err(|_| {
        MschapError::InvalidChallengeLengthError(CHALLENGE_LENGTH, challenge.len())
    })?;
    challenge_response(challenge, &nt_password_hash(password))
}

/// ChallengeHash: the 8-byte challenge MS-CHAPv2 actually feeds to `challenge_response()`.
pub fn challenge_hash(
    peer_challenge: &[u8; V2_CHALLENGE_LENGTH],
    authenticator_challenge: &[u8; V2_CHALLENGE_LENGTH],
    user_name: &str,
) -> [u8; CHALLENGE_LENGTH] {
    let mut hasher = Sha1::new();
    hasher.update(peer_challenge);
    hasher.update(authenticator_challenge);
    hasher.update(user_name.as_bytes());
    let digest = hasher.finalize();

    let mut challenge = [0u8; CHALLENGE_LENGTH];
    challenge.copy_from_slice(&digest[..CHALLENGE_LENGTH]);
    challenge
}

fn v2_challenge(authenticator_challenge: &[u8]) -> Result<&[u8; V2_CHALLENGE_LENGTH], MschapError> {
    authenticator_challenge.try_into().map_err(|_| {
        MschapError::InvalidChallengeLengthError(V2_CHALLENGE_LENGTH, authenticator_challenge.len())
    })
}

/// GenerateNTResponse
pub fn generate_nt_response(
    authenticator_challenge: &[u8],
    peer_challenge: &[u8; V2_CHALLENGE_LENGTH],
    user_name: &str,
    password: &str,
) -> Result<[u8; RESPONSE_LENGTH], MschapError> {
    let challenge = challenge_hash(peer_challenge, v2_challenge(authenticator_challenge)?, user_name);
    challenge_response(&challenge, &nt_password_hash(password))
}

/// GenerateAuthenticatorResponse: `"S="` followed by 40 upper-case hex digits.
pub fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; RESPONSE_LENGTH],
    peer_challenge: &[u8; V2_CHALLENGE_LENGTH],
    authenticator_challenge: &[u8],
    user_name: &str,
) -> Result<String, MschapError> {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));

    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(AUTH_MAGIC1);
    let digest = hasher.finalize();

    let challenge = challenge_hash(peer_challenge, v2_challenge(authenticator_challenge)?, user_name);

    let mut hasher = Sha1::new();
    hasher.update(digest);
    hasher.update(challenge);
    hasher.update(AUTH_MAGIC2);
    let digest = hasher.finalize();

    let hex: String = digest.iter().map(|b| format!("{:02X}", b)).collect();
    Ok(format!("S={}", hex))
}
