use std::convert::TryFrom;
use std::fmt;

use num_enum::TryFromPrimitive;
use thiserror::Error;

/// From https://datatracker.ietf.org/doc/html/rfc3748#section-4
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Code      |  Identifier   |            Length             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     Type      |  Type-Data ...
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-
//
// Success and Failure packets stop after the Length field.
// Octets beyond Length are link layer padding and are ignored.

const EAP_HEADER_LENGTH: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum EAPError {
    #[error("EAP packet is too short: {0} bytes")]
    TooShortError(usize),
    #[error("EAP length field mismatch: declared={0}, actual={1}")]
    LengthMismatchError(usize, usize),
    #[error("EAP {0} packet has no type field")]
    MissingTypeError(&'static str),
    #[error("EAP packet is too large: {0} bytes")]
    TooLargeError(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum EAPCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
    Invalid = 0,
}

impl EAPCode {
    pub fn string(&self) -> &'static str {
        match self {
            EAPCode::Request => "EAP-Request",
            EAPCode::Response => "EAP-Response",
            EAPCode::Success => "EAP-Success",
            EAPCode::Failure => "EAP-Failure",
            EAPCode::Invalid => "EAP-Invalid",
        }
    }

    pub fn from(value: u8) -> Self {
        EAPCode::try_from(value).unwrap_or(EAPCode::Invalid)
    }

    fn has_type(&self) -> bool {
        matches!(self, EAPCode::Request | EAPCode::Response)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum EAPType {
    Identity = 1,
    Notification = 2,
    Nak = 3,
    MD5Challenge = 4,
    OneTimePass = 5,
    TokenCard = 6,
    TLS = 13,
    PEAP = 25,
    MSCHAPv2 = 26,
    PWD = 52,
    Invalid = 0,
}

impl EAPType {
    pub fn string(&self) -> &'static str {
        match self {
            EAPType::Identity => "EAP-Identity",
            EAPType::Notification => "EAP-Notification",
            EAPType::Nak => "EAP-Nak",
            EAPType::MD5Challenge => "EAP-MD5Challenge",
            EAPType::OneTimePass => "EAP-OneTimePass",
            EAPType::TokenCard => "EAP-TokenCard",
            EAPType::TLS => "EAP-TLS",
            EAPType::PEAP => "EAP-PEAP",
            EAPType::MSCHAPv2 => "EAP-MSCHAPv2",
            EAPType::PWD => "EAP-PWD",
            EAPType::Invalid => "EAP-Invalid",
        }
    }

    pub fn from(value: u8) -> Self {
        EAPType::try_from(value).unwrap_or(EAPType::Invalid)
    }
}

/// A single EAP packet as carried by one or more EAP-Message attributes.
///
/// `typ` is `EAPType::Invalid` for Success and Failure, which have no type field.
#[derive(Debug, Clone, PartialEq)]
pub struct EAP {
    pub code: EAPCode,
    pub id: u8,
    pub typ: EAPType,
    pub data: Vec<u8>,
}

impl EAP {
    pub fn request(id: u8, typ: EAPType, data: Vec<u8>) -> Self {
        EAP {
            code: EAPCode::Request,
            id,
            typ,
            data,
        }
    }

    pub fn success(id: u8) -> Self {
        EAP {
            code: EAPCode::Success,
            id,
            typ: EAPType::Invalid,
            data: vec![],
        }
    }

    pub fn failure(id: u8) -> Self {
        EAP {
            code: EAPCode::Failure,
            id,
            typ: EAPType::Invalid,
            data: vec![],
        }
    }

    pub fn from_bytes(bs: &[u8]) -> Result<Self, EAPError> {
        if bs.len() < EAP_HEADER_LENGTH {
            return Err(EAPError::TooShortError(bs.len()));
        }

        let code = EAPCode::from(bs[0]);
        let id = bs[1];
        let len = u16::from_be_bytes([bs[2], bs[3]]) as usize;
        if len < EAP_HEADER_LENGTH || len > bs.len() {
            return Err(EAPError::LengthMismatchError(len, bs.len()));
        }

        if !code.has_type() {
            return Ok(EAP {
                code,
                id,
                typ: EAPType::Invalid,
                data: bs[EAP_HEADER_LENGTH..len].to_vec(),
            });
        }

        if len == EAP_HEADER_LENGTH {
            return Err(EAPError::MissingTypeError(code.string()));
        }
        Ok(EAP {
            code,
            id,
            typ: EAPType::from(bs[4]),
            data: bs[EAP_HEADER_LENGTH + 1..len].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EAPError> {
        let len = self.len();
        if len > u16::MAX as usize {
            return Err(EAPError::TooLargeError(len));
        }

        let mut bs = Vec::with_capacity(len);
        bs.push(self.code as u8);
        bs.push(self.id);
        bs.extend((len as u16).to_be_bytes());
        if self.code.has_type() {
            bs.push(self.typ as u8);
        }
        bs.extend(&self.data);
        Ok(bs)
    }

    /// Value of the Length field for the current contents.
    pub fn len(&self) -> usize {
        let typ_len = if self.code.has_type() { 1 } else { 0 };
        EAP_HEADER_LENGTH + typ_len + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == EAP_HEADER_LENGTH
    }
}

impl fmt::Display for EAP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Code: {}, ID: {}, Length: {}, Type: {}, Data Length: {}",
            self.code.string(),
            self.id,
            self.len(),
            self.typ.string(),
            self.data.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::core::eap::*;

    #[test]
    fn it_should_decode_eap_identity_response() -> Result<(), EAPError> {
        let eap_bytes = hex::decode("027200090174657374").unwrap();
        let eap = EAP::from_bytes(&eap_bytes)?;
        assert_eq!(114, eap.id);
        assert_eq!(EAPCode::Response, eap.code);
        assert_eq!(EAPType::Identity, eap.typ);
        assert_eq!("test".to_owned(), String::from_utf8(eap.data.clone()).unwrap());
        assert_eq!(eap_bytes, eap.to_bytes()?);
        Ok(())
    }

    #[test]
    fn it_should_decode_eap_pwd_id_request() -> Result<(), EAPError> {
        let eap_bytes = hex::decode(
            "01310024340100130101cf478f15007468657365727665724065786d706c652e636f6d",
        )
        .unwrap();
        let eap = EAP::from_bytes(&eap_bytes)?;
        assert_eq!(EAPCode::Request, eap.code);
        assert_eq!(49, eap.id);
        assert_eq!(EAPType::PWD, eap.typ);
        assert_eq!(eap.data.len(), 0x24 - 5);
        assert_eq!(eap_bytes, eap.to_bytes()?);
        Ok(())
    }

    #[test]
    fn it_should_encode_success_and_failure_without_type() -> Result<(), EAPError> {
        assert_eq!(EAP::success(7).to_bytes()?, vec![3, 7, 0, 4]);
        assert_eq!(EAP::failure(8).to_bytes()?, vec![4, 8, 0, 4]);

        let eap = EAP::from_bytes(&[3, 7, 0, 4])?;
        assert_eq!(eap, EAP::success(7));
        Ok(())
    }

    #[test]
    fn it_should_ignore_link_layer_padding() -> Result<(), EAPError> {
        let eap = EAP::from_bytes(&hex::decode("0272000901746573740000").unwrap())?;
        assert_eq!(eap.data, b"test".to_vec());
        Ok(())
    }

    #[test]
    fn it_should_reject_malformed_packets() {
        assert_eq!(EAP::from_bytes(&[2, 1, 0]), Err(EAPError::TooShortError(3)));
        assert_eq!(
            EAP::from_bytes(&[2, 1, 0, 9, 1]),
            Err(EAPError::LengthMismatchError(9, 5))
        );
        assert_eq!(
            EAP::from_bytes(&[2, 1, 0, 2, 1]),
            Err(EAPError::LengthMismatchError(2, 5))
        );
        assert_eq!(
            EAP::from_bytes(&[2, 1, 0, 4]),
            Err(EAPError::MissingTypeError("EAP-Response"))
        );
    }

    #[test]
    fn test_unknown_values() {
        assert_eq!(EAPCode::from(9), EAPCode::Invalid);
        assert_eq!(EAPType::from(200), EAPType::Invalid);
        assert_eq!(EAPType::from(52).string(), "EAP-PWD");
    }
}
