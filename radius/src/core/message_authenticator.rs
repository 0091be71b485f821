//! Message-Authenticator (RFC 2869 section 5.14, RFC 3579 section 3.2).
//!
//! ```text
//!    Message-Authenticator = HMAC-MD5 (Type, Identifier, Length,
//!    Request Authenticator, Attributes)
//! ```
//!
//! When the message integrity check is calculated the signature string is
//! considered to be sixteen octets of zero. Replies are signed with the
//! Request Authenticator of the request they answer, and the digest is
//! inserted before the Response Authenticator is calculated.

use std::fmt;

use hmac::{Hmac, Mac};
use md5_digest::Md5;
use thiserror::Error;

use crate::core::rfc2869::{MESSAGE_AUTHENTICATOR_LENGTH, MESSAGE_AUTHENTICATOR_TYPE};

type HmacMd5 = Hmac<Md5>;

const HEADER_LENGTH: usize = 20;

#[derive(Error, Debug, PartialEq)]
pub enum MessageAuthenticatorError {
    #[error("message-authenticator must have 16 bytes, but the given value has {0} bytes")]
    InvalidLengthError(usize),
    #[error("failed to initialize hmac-md5: {0}")]
    KeyError(String),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MessageAuthenticator {
    pub value: [u8; MESSAGE_AUTHENTICATOR_LENGTH],
}

impl MessageAuthenticator {
    /// Computes the digest over an encoded packet whose header authenticator
    /// is substituted with `authenticator` and whose Message-Authenticator
    /// value (at `offset`) is zeroed.
    fn mac(
        encoded: &[u8],
        offset: usize,
        secret: &[u8],
        authenticator: &[u8],
    ) -> Result<HmacMd5, MessageAuthenticatorError> {
        let mut mac = HmacMd5::new_from_slice(secret)
            .map_err(|e| MessageAuthenticatorError::KeyError(e.to_string()))?;
        mac.update(&encoded[..4]);
        mac.update(authenticator);
        mac.update(&encoded[HEADER_LENGTH..offset]);
        mac.update(&[0; MESSAGE_AUTHENTICATOR_LENGTH]);
        mac.update(&encoded[offset + MESSAGE_AUTHENTICATOR_LENGTH..]);
        Ok(mac)
    }

    /// Computes the Message-Authenticator of an encoded packet.
    /// It returns `None` when the packet carries no Message-Authenticator.
    pub fn compute(
        encoded: &[u8],
        secret: &[u8],
        authenticator: &[u8],
    ) -> Result<Option<Self>, MessageAuthenticatorError> {
        let offset = match locate(encoded)? {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let digest = Self::mac(encoded, offset, secret, authenticator)?
            .finalize()
            .into_bytes();
        let mut value = [0; MESSAGE_AUTHENTICATOR_LENGTH];
        value.copy_from_slice(&digest);
        Ok(Some(MessageAuthenticator { value }))
    }

    /// Patches the digest into the encoded packet in place.
    /// It returns whether the packet carries a Message-Authenticator.
    pub fn sign(
        encoded: &mut [u8],
        secret: &[u8],
        authenticator: &[u8],
    ) -> Result<bool, MessageAuthenticatorError> {
        let offset = match locate(encoded)? {
            Some(offset) => offset,
            None => return Ok(false),
        };
        if let Some(ma) = Self::compute(encoded, secret, authenticator)? {
            encoded[offset..offset + MESSAGE_AUTHENTICATOR_LENGTH].copy_from_slice(&ma.value);
        }
        Ok(true)
    }

    /// Verifies the Message-Authenticator of an encoded packet in constant time.
    /// A packet without the attribute verifies trivially.
    pub fn verify(
        encoded: &[u8],
        secret: &[u8],
        authenticator: &[u8],
    ) -> Result<bool, MessageAuthenticatorError> {
        let offset = match locate(encoded)? {
            Some(offset) => offset,
            None => return Ok(true),
        };
        let received = &encoded[offset..offset + MESSAGE_AUTHENTICATOR_LENGTH];
        Ok(Self::mac(encoded, offset, secret, authenticator)?
            .verify_slice(received)
            .is_ok())
    }
}

/// Returns the offset of the first Message-Authenticator value in an encoded packet.
fn locate(encoded: &[u8]) -> Result<Option<usize>, MessageAuthenticatorError> {
    let mut i = HEADER_LENGTH;
    while i + 2 <= encoded.len() {
        let typ = encoded[i];
        let length = encoded[i + 1] as usize;
        if length < 2 || i + length > encoded.len() {
            return Ok(None);
        }
        if typ == MESSAGE_AUTHENTICATOR_TYPE {
            if length - 2 != MESSAGE_AUTHENTICATOR_LENGTH {
                return Err(MessageAuthenticatorError::InvalidLengthError(length - 2));
            }
            return Ok(Some(i + 2));
        }
        i += length;
    }
    Ok(None)
}

impl fmt::Display for MessageAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X?}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::code::Code;
    use crate::core::message_authenticator::{MessageAuthenticator, MessageAuthenticatorError};
    use crate::core::packet::Packet;
    use crate::core::rfc2869;

    #[test]
    fn it_should_authenticate_access_request() -> Result<(), MessageAuthenticatorError> {
        let msg_bytes = hex::decode("01160049b3a5cd2de262bcdbb589752a212e0b2f01067465737404067f00010105060000000150121ca1999b24d5224ddeca96fd7dabac270706000000014f0b023100090174657374").unwrap();
        let secret = b"somesecretval";
        assert!(MessageAuthenticator::verify(&msg_bytes, secret, &msg_bytes[4..20])?);

        let ma = MessageAuthenticator::compute(&msg_bytes, secret, &msg_bytes[4..20])?.unwrap();
        assert_eq!(
            hex::encode(ma.value),
            "1ca1999b24d5224ddeca96fd7dabac27"
        );
        Ok(())
    }

    #[test]
    fn it_should_authenticate_other_access_request() -> Result<(), MessageAuthenticatorError> {
        let msg_bytes = hex::decode("019800436b2bbaa41b9081834827599838d2822001067465737404067f00010105060000000150127524cccba729c4ee2fa9f48c645a15294f0b022a00090174657374").unwrap();
        assert!(MessageAuthenticator::verify(
            &msg_bytes,
            b"somesecretval",
            &msg_bytes[4..20]
        )?);
        assert!(!MessageAuthenticator::verify(
            &msg_bytes,
            b"othersecret",
            &msg_bytes[4..20]
        )?);
        Ok(())
    }

    #[test]
    fn it_should_detect_any_altered_byte() {
        let msg_bytes = hex::decode("01160049b3a5cd2de262bcdbb589752a212e0b2f01067465737404067f00010105060000000150121ca1999b24d5224ddeca96fd7dabac270706000000014f0b023100090174657374").unwrap();
        let secret = b"somesecretval";
        assert!(Packet::decode(&msg_bytes, secret).is_ok());

        let mut accepted = Vec::new();
        for i in 0..msg_bytes.len() {
            let mut altered = msg_bytes.clone();
            altered[i] ^= 0x01;
            if let Ok(packet) = Packet::decode(&altered, secret) {
                accepted.push((i, packet));
            }
        }

        // only two flips decode, and neither leaves a signed request behind:
        // byte 0 turns the code into 0, byte 38 turns the attribute into type 81
        assert_eq!(
            accepted.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 38]
        );
        assert_eq!(accepted[0].1.get_code(), Code::Invalid);
        assert!(!accepted[0].1.get_code().is_request());
        assert_eq!(accepted[1].1.get_code(), Code::AccessRequest);
        assert!(rfc2869::lookup_message_authenticator(&accepted[1].1).is_none());
    }

    #[test]
    fn it_should_sign_in_place() -> Result<(), MessageAuthenticatorError> {
        let mut msg_bytes = hex::decode("01160049b3a5cd2de262bcdbb589752a212e0b2f01067465737404067f00010105060000000150121ca1999b24d5224ddeca96fd7dabac270706000000014f0b023100090174657374").unwrap();
        let expected = msg_bytes.clone();
        for b in &mut msg_bytes[40..56] {
            *b = 0;
        }
        let authenticator = msg_bytes[4..20].to_vec();
        assert!(MessageAuthenticator::sign(
            &mut msg_bytes,
            b"somesecretval",
            &authenticator
        )?);
        assert_eq!(msg_bytes, expected);
        Ok(())
    }
}
