//! User-Password hiding as described in RFC 2865 section 5.2.
//!
//! Call the shared secret S and the pseudo-random 128-bit Request
//! Authenticator RA. The password is broken into 16-octet chunks p1, p2,
//! etc. with the last one padded at the end with nulls.
//!
//! ```text
//!    b1 = MD5(S + RA)       c(1) = p1 xor b1
//!    b2 = MD5(S + c(1))     c(2) = p2 xor b2
//!    bi = MD5(S + c(i-1))   c(i) = pi xor bi
//! ```

use crate::core::avp::AVPError;

pub const MAX_PLAIN_TEXT_LENGTH: usize = 128;
const BLOCK_LENGTH: usize = 16;

fn check_parameters(secret: &[u8], request_authenticator: &[u8]) -> Result<(), AVPError> {
    if secret.is_empty() {
        return Err(AVPError::PasswordSecretMissingError());
    }
    if request_authenticator.len() != BLOCK_LENGTH {
        return Err(AVPError::InvalidRequestAuthenticatorLength());
    }
    Ok(())
}

/// Hides the plain text. The result is always a non-empty multiple of 16 bytes.
pub fn encrypt(
    plain_text: &[u8],
    secret: &[u8],
    request_authenticator: &[u8],
) -> Result<Vec<u8>, AVPError> {
    if plain_text.len() > MAX_PLAIN_TEXT_LENGTH {
        return Err(AVPError::UserPasswordPlainTextMaximumLengthExceededError(
            plain_text.len(),
        ));
    }
    check_parameters(secret, request_authenticator)?;

    let mut padded = plain_text.to_vec();
    let rem = padded.len() % BLOCK_LENGTH;
    if padded.is_empty() || rem != 0 {
        padded.extend(vec![0; BLOCK_LENGTH - rem]);
    }

    let mut enc: Vec<u8> = Vec::with_capacity(padded.len());
    let mut prev = request_authenticator.to_vec();
    for chunk in padded.chunks(BLOCK_LENGTH) {
        let key = md5::compute([secret, &prev[..]].concat());
        prev = key.iter().zip(chunk).map(|(k, p)| k ^ p).collect();
        enc.extend(&prev);
    }

    Ok(enc)
}

/// Recovers the plain text and trims the trailing NUL padding.
pub fn decrypt(
    cipher_text: &[u8],
    secret: &[u8],
    request_authenticator: &[u8],
) -> Result<Vec<u8>, AVPError> {
    if cipher_text.is_empty()
        || cipher_text.len() % BLOCK_LENGTH != 0
        || cipher_text.len() > MAX_PLAIN_TEXT_LENGTH
    {
        return Err(AVPError::InvalidUserPasswordCipherTextLength(
            cipher_text.len(),
        ));
    }
    check_parameters(secret, request_authenticator)?;

    let mut dec: Vec<u8> = Vec::with_capacity(cipher_text.len());
    let mut prev: &[u8] = request_authenticator;
    for chunk in cipher_text.chunks(BLOCK_LENGTH) {
        let key = md5::compute([secret, prev].concat());
        dec.extend(key.iter().zip(chunk).map(|(k, c)| k ^ c));
        prev = chunk;
    }

    while dec.last() == Some(&0) {
        dec.pop();
    }
    Ok(dec)
}
