use std::convert::TryInto;
use std::net::Ipv4Addr;

use thiserror::Error;

use crate::core::password;

#[derive(Error, PartialEq, Debug)]
pub enum AVPError {
    /// This error is raised on the length of given plain text for user-password exceeds the maximum limit.
    #[error("the maximum length of the plain text for user-password is 128, but the given value has {0} bytes")]
    UserPasswordPlainTextMaximumLengthExceededError(usize),

    /// This error is raised when the cipher text of user-password is empty or not aligned to 16 bytes.
    #[error("the cipher text of user-password must be a non-empty multiple of 16 bytes up to 128, but the given value has {0} bytes")]
    InvalidUserPasswordCipherTextLength(usize),

    /// This error is raised when the given secret value for a password is empty.
    #[error("secret for password mustn't be empty, but the given value is empty")]
    PasswordSecretMissingError(),

    /// This error is raised when the given request-authenticator for the password doesn't have 16 bytes length exactly.
    #[error("request authenticator for password has to have 16-bytes payload, but the given value doesn't")]
    InvalidRequestAuthenticatorLength(),

    /// This error is raised when attribute length is conflicted with the expected.
    #[error("invalid attribute length: expected={0}, actual={1} bytes")]
    InvalidAttributeLengthError(String, usize),

    /// This error represents AVP decoding error.
    #[error("decoding error: {0}")]
    DecodingError(String),
}

pub type AVPType = u8;

/// This struct represents a attribute-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AVP {
    pub(crate) typ: AVPType,
    pub(crate) value: Vec<u8>,
}

impl AVP {
    /// (This method is for dictionary developers) make an AVP from a u32 value.
    pub fn from_u32(typ: AVPType, value: u32) -> Self {
        AVP {
            typ,
            value: u32::to_be_bytes(value).to_vec(),
        }
    }

    /// (This method is for dictionary developers) make an AVP from a string value.
    pub fn from_string(typ: AVPType, value: &str) -> Self {
        AVP {
            typ,
            value: value.as_bytes().to_vec(),
        }
    }

    /// (This method is for dictionary developers) make an AVP from bytes.
    pub fn from_bytes(typ: AVPType, value: &[u8]) -> Self {
        AVP {
            typ,
            value: value.to_vec(),
        }
    }

    /// (This method is for dictionary developers) make an AVP from a IPv4 value.
    pub fn from_ipv4(typ: AVPType, value: &Ipv4Addr) -> Self {
        AVP {
            typ,
            value: value.octets().to_vec(),
        }
    }

    /// (This method is for dictionary developers) make an AVP from a user-password value.
    /// see also: https://tools.ietf.org/html/rfc2865#section-5.2
    pub fn from_user_password(
        typ: AVPType,
        plain_text: &[u8],
        secret: &[u8],
        request_authenticator: &[u8],
    ) -> Result<Self, AVPError> {
        Ok(AVP {
            typ,
            value: password::encrypt(plain_text, secret, request_authenticator)?,
        })
    }

    pub fn get_type(&self) -> AVPType {
        self.typ
    }

    pub fn get_value(&self) -> &[u8] {
        &self.value
    }

    /// (This method is for dictionary developers) encode an AVP into a u32 value.
    pub fn encode_u32(&self) -> Result<u32, AVPError> {
        const U32_SIZE: usize = std::mem::size_of::<u32>();
        if self.value.len() != U32_SIZE {
            return Err(AVPError::InvalidAttributeLengthError(
                format!("{} bytes", U32_SIZE),
                self.value.len(),
            ));
        }

        let (int_bytes, _) = self.value.split_at(U32_SIZE);
        match int_bytes.try_into() {
            Ok(boxed_array) => Ok(u32::from_be_bytes(boxed_array)),
            Err(e) => Err(AVPError::DecodingError(e.to_string())),
        }
    }

    /// (This method is for dictionary developers) encode an AVP into a string value.
    pub fn encode_string(&self) -> Result<String, AVPError> {
        match String::from_utf8(self.value.to_vec()) {
            Ok(str) => Ok(str),
            Err(e) => Err(AVPError::DecodingError(e.to_string())),
        }
    }

    /// (This method is for dictionary developers) encode an AVP into bytes.
    pub fn encode_bytes(&self) -> Vec<u8> {
        self.value.to_vec()
    }

    /// (This method is for dictionary developers) encode an AVP into Ipv4 value.
    pub fn encode_ipv4(&self) -> Result<Ipv4Addr, AVPError> {
        const IPV4_SIZE: usize = std::mem::size_of::<Ipv4Addr>();
        if self.value.len() != IPV4_SIZE {
            return Err(AVPError::InvalidAttributeLengthError(
                format!("{} bytes", IPV4_SIZE),
                self.value.len(),
            ));
        }

        let (int_bytes, _) = self.value.split_at(IPV4_SIZE);
        match int_bytes.try_into() {
            Ok::<[u8; IPV4_SIZE], _>(boxed_array) => Ok(Ipv4Addr::from(boxed_array)),
            Err(e) => Err(AVPError::DecodingError(e.to_string())),
        }
    }

    /// (This method is for dictionary developers) encode an AVP into user-password value as bytes.
    pub fn encode_user_password(
        &self,
        secret: &[u8],
        request_authenticator: &[u8],
    ) -> Result<Vec<u8>, AVPError> {
        password::decrypt(&self.value, secret, request_authenticator)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::core::avp::{AVPError, AVP};

    #[test]
    fn it_should_convert_attribute_to_integer32() -> Result<(), AVPError> {
        let given_u32 = 16909060;
        let avp = AVP::from_u32(1, given_u32);
        assert_eq!(avp.encode_u32()?, given_u32);
        Ok(())
    }

    #[test]
    fn it_should_fail_converting_short_attribute_to_integer32() {
        let avp = AVP::from_bytes(40, &[0, 1]);
        assert_eq!(
            avp.encode_u32(),
            Err(AVPError::InvalidAttributeLengthError("4 bytes".to_owned(), 2))
        );
    }

    #[test]
    fn it_should_convert_attribute_to_string() -> Result<(), AVPError> {
        let given_str = "Hello, World";
        let avp = AVP::from_string(1, given_str);
        assert_eq!(avp.encode_string()?, given_str);
        Ok(())
    }

    #[test]
    fn it_should_convert_ipv4() -> Result<(), AVPError> {
        let given_ipv4 = Ipv4Addr::new(192, 0, 2, 1);
        let avp = AVP::from_ipv4(1, &given_ipv4);
        assert_eq!(avp.encode_ipv4()?, given_ipv4);
        Ok(())
    }

    #[test]
    fn it_should_convert_user_password() -> Result<(), AVPError> {
        let secret = b"12345".to_vec();
        let request_authenticator = vec![
            0x17, 0x83, 0x9a, 0x2b, 0x6b, 0x6a, 0x95, 0x6c, 0x11, 0x4b, 0x11, 0x07, 0x5a, 0x0f,
            0x2a, 0x77,
        ];

        let avp = AVP::from_user_password(1, b"p@ssw0rd", &secret, &request_authenticator)?;
        assert_eq!(avp.get_value().len(), 16);
        assert_eq!(
            avp.encode_user_password(&secret, &request_authenticator)?,
            b"p@ssw0rd"
        );
        Ok(())
    }
}
