//! CHAP verification (RFC 1994, RFC 2865 section 5.3).

use subtle::ConstantTimeEq;
use thiserror::Error;

pub const CHAP_PASSWORD_LENGTH: usize = 17;

#[derive(Error, Debug, PartialEq)]
pub enum ChapError {
    #[error("CHAP-Password must have 17 bytes, but the given value has {0} bytes")]
    InvalidLengthError(usize),
}

/// Value of the CHAP-Password attribute: the CHAP identifier and the 16-byte response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapPassword {
    pub ident: u8,
    pub response: [u8; 16],
}

impl ChapPassword {
    pub fn decode(bs: &[u8]) -> Result<Self, ChapError> {
        if bs.len() != CHAP_PASSWORD_LENGTH {
            return Err(ChapError::InvalidLengthError(bs.len()));
        }
        let mut response = [0; 16];
        response.copy_from_slice(&bs[1..]);
        Ok(ChapPassword {
            ident: bs[0],
            response,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bs = vec![self.ident];
        bs.extend(self.response);
        bs
    }
}

/// MD5(ident ‖ password ‖ challenge)
pub fn response(ident: u8, password: &[u8], challenge: &[u8]) -> [u8; 16] {
    md5::compute([&[ident][..], password, challenge].concat()).0
}

/// Checks a CHAP response against the clear-text password.
pub fn verify(chap_password: &ChapPassword, password: &[u8], challenge: &[u8]) -> bool {
    response(chap_password.ident, password, challenge)
        .ct_eq(&chap_password.response)
        .into()
}

#[cfg(test)]
mod tests {
    use crate::core::chap::{response, verify, ChapError, ChapPassword};

    #[test]
    fn it_should_compute_known_response() {
        let challenge: Vec<u8> = (0..16).collect();
        assert_eq!(
            hex::encode(response(1, b"clientPass", &challenge)),
            "0c884e678b2a0e30bda259086e9b4ebf"
        );
    }

    #[test]
    fn it_should_verify_chap_password() -> Result<(), ChapError> {
        let challenge: Vec<u8> = (0..16).collect();
        let encoded = ChapPassword {
            ident: 1,
            response: response(1, b"clientPass", &challenge),
        }
        .encode();

        let chap_password = ChapPassword::decode(&encoded)?;
        assert!(verify(&chap_password, b"clientPass", &challenge));
        assert!(!verify(&chap_password, b"otherPass", &challenge));
        assert_eq!(
            ChapPassword::decode(&encoded[..16]),
            Err(ChapError::InvalidLengthError(16))
        );
        Ok(())
    }
}
