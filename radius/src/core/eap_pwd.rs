//! EAP-PWD framing (RFC 5931 section 3).
//!
//! ```text
//!  0 1 2 3 4 5 6 7 8
//! +-+-+-+-+-+-+-+-+
//! |L|M|  PWD-Exch |  Total-Length (only when L is set)
//! +-+-+-+-+-+-+-+-+
//! ```

use std::convert::TryFrom;

use num_enum::TryFromPrimitive;
use thiserror::Error;

pub const GROUP_NIST_P256: u16 = 19;
pub const RANDOM_FUNCTION_HMAC_SHA256: u8 = 1;
pub const PRF_HMAC_SHA256: u8 = 1;
pub const PREP_NONE: u8 = 0;

pub const ELEMENT_LENGTH: usize = 64;
pub const SCALAR_LENGTH: usize = 32;
pub const CONFIRM_LENGTH: usize = 32;

const LENGTH_BIT: u8 = 0x80;
const MORE_BIT: u8 = 0x40;
const EXCH_MASK: u8 = 0x3f;
const ID_FIXED_LENGTH: usize = 9;

#[derive(Error, Debug, PartialEq)]
pub enum PwdError {
    #[error("EAP-PWD payload is empty")]
    EmptyError(),
    #[error("fragmented EAP-PWD messages are not supported")]
    FragmentedError(),
    #[error("unknown EAP-PWD exchange: {0}")]
    UnknownExchangeError(u8),
    #[error("EAP-PWD total length mismatch: declared={0}, actual={1}")]
    TotalLengthMismatchError(usize, usize),
    #[error("invalid EAP-PWD {0} payload length: {1} bytes")]
    InvalidPayloadLengthError(&'static str, usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum PwdExch {
    Id = 1,
    Commit = 2,
    Confirm = 3,
}

impl PwdExch {
    pub fn string(&self) -> &'static str {
        match self {
            PwdExch::Id => "PWD-ID",
            PwdExch::Commit => "PWD-Commit",
            PwdExch::Confirm => "PWD-Confirm",
        }
    }
}

/// Type-Data of an EAP-PWD packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PwdMessage {
    pub exch: PwdExch,
    pub payload: Vec<u8>,
}

impl PwdMessage {
    pub fn new(exch: PwdExch, payload: Vec<u8>) -> Self {
        PwdMessage { exch, payload }
    }

    pub fn decode(bs: &[u8]) -> Result<Self, PwdError> {
        let (&header, rest) = bs.split_first().ok_or(PwdError::EmptyError())?;
        if header & MORE_BIT != 0 {
            return Err(PwdError::FragmentedError());
        }
        let exch = PwdExch::try_from(header & EXCH_MASK)
            .map_err(|_| PwdError::UnknownExchangeError(header & EXCH_MASK))?;

        let payload = if header & LENGTH_BIT != 0 {
            if rest.len() < 2 {
                return Err(PwdError::TotalLengthMismatchError(0, rest.len()));
            }
            let total = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            if total != rest.len() - 2 {
                return Err(PwdError::TotalLengthMismatchError(total, rest.len() - 2));
            }
            &rest[2..]
        } else {
            rest
        };

        Ok(PwdMessage {
            exch,
            payload: payload.to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bs = Vec::with_capacity(1 + self.payload.len());
        bs.push(self.exch as u8);
        bs.extend(&self.payload);
        bs
    }
}

/// PWD-ID payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PwdId {
    pub group: u16,
    pub random_function: u8,
    pub prf: u8,
    pub token: u32,
    pub prep: u8,
    pub identity: Vec<u8>,
}

impl PwdId {
    pub fn new(token: u32, identity: &[u8]) -> Self {
        PwdId {
            group: GROUP_NIST_P256,
            random_function: RANDOM_FUNCTION_HMAC_SHA256,
            prf: PRF_HMAC_SHA256,
            token,
            prep: PREP_NONE,
            identity: identity.to_vec(),
        }
    }

    pub fn decode(bs: &[u8]) -> Result<Self, PwdError> {
        if bs.len() < ID_FIXED_LENGTH {
            return Err(PwdError::InvalidPayloadLengthError(
                PwdExch::Id.string(),
                bs.len(),
            ));
        }
        Ok(PwdId {
            group: u16::from_be_bytes([bs[0], bs[1]]),
            random_function: bs[2],
            prf: bs[3],
            token: u32::from_be_bytes([bs[4], bs[5], bs[6], bs[7]]),
            prep: bs[8],
            identity: bs[ID_FIXED_LENGTH..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bs = Vec::with_capacity(ID_FIXED_LENGTH + self.identity.len());
        bs.extend(self.group.to_be_bytes());
        bs.push(self.random_function);
        bs.push(self.prf);
        bs.extend(self.token.to_be_bytes());
        bs.push(self.prep);
        bs.extend(&self.identity);
        bs
    }

    /// Group ‖ Random-Function ‖ PRF, as bound into the confirm and key derivation.
    pub fn ciphersuite(&self) -> [u8; 4] {
        let group = self.group.to_be_bytes();
        [group[0], group[1], self.random_function, self.prf]
    }

    /// Whether a peer's PWD-ID agrees with the parameters we offered.
    pub fn matches_offer(&self, offer: &PwdId) -> bool {
        self.ciphersuite() == offer.ciphersuite()
            && self.token == offer.token
            && self.prep == offer.prep
    }
}

/// PWD-Commit payload: Element (x ‖ y) followed by Scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct PwdCommit {
    pub element: [u8; ELEMENT_LENGTH],
    pub scalar: [u8; SCALAR_LENGTH],
}

impl PwdCommit {
    pub fn decode(bs: &[u8]) -> Result<Self, PwdError> {
        if bs.len() != ELEMENT_LENGTH + SCALAR_LENGTH {
            return Err(PwdError::InvalidPayloadLengthError(
                PwdExch::Commit.string(),
                bs.len(),
            ));
        }
        let mut element = [0u8; ELEMENT_LENGTH];
        let mut scalar = [0u8; SCALAR_LENGTH];
        element.copy_from_slice(&bs[..ELEMENT_LENGTH]);
        scalar.copy_from_slice(&bs[ELEMENT_LENGTH..]);
        Ok(PwdCommit { element, scalar })
    }

    pub fn encode(&self) -> Vec<u8> {
        [&self.element[..], &self.scalar[..]].concat()
    }
}

pub fn decode_confirm(bs: &[u8]) -> Result<[u8; CONFIRM_LENGTH], PwdError> {
    bs.try_into().map_err(|_| {
        PwdError::InvalidPayloadLengthError(PwdExch::Confirm.string(), bs.len())
    })
}
