use std::convert::TryInto;

use rand::Rng;
use thiserror::Error;

use crate::core::attributes::Attributes;
use crate::core::avp::{AVPType, AVP};
use crate::core::code::Code;
use crate::core::message_authenticator::MessageAuthenticator;

pub const MAX_PACKET_LENGTH: usize = 4096;
pub const RADIUS_PACKET_HEADER_LENGTH: usize = 20; // i.e. minimum packet length
const ZERO_AUTHENTICATOR: [u8; 16] = [0; 16];

#[derive(Error, Debug, PartialEq)]
pub enum PacketError {
    /// An error indicates the entire length of the given packet has insufficient length.
    #[error("RADIUS packet doesn't have enough length of bytes; it has to be at least {0} bytes, but actual length was {1}")]
    InsufficientPacketPayloadLengthError(usize, usize),

    /// An error indicates the length that is instructed by a header is insufficient.
    #[error("RADIUS packet header indicates the length as {0} bytes, but this is insufficient; this must have {1} bytes at least")]
    InsufficientHeaderDefinedPacketLengthError(usize, usize),

    /// An error indicates the length that is instructed by a header exceeds the maximum length of the RADIUS packet.
    #[error("RADIUS packet header indicates the length as {0} bytes, but this exceeds the maximum length {1} bytes")]
    HeaderDefinedPacketLengthExceedsMaximumLimitError(usize, usize),

    /// An error that is raised when an error has been occurred on decoding bytes for a packet.
    #[error("failed to decode the packet: {0}")]
    DecodingError(String),

    /// An error that is raised when an error has been occurred on encoding a packet into bytes.
    #[error("failed to encode the packet: {0}")]
    EncodingError(String),

    /// An error that is raised when it received unknown packet type code of RADIUS.
    #[error("Unknown RADIUS packet type code: {0}")]
    UnknownCodeError(String),

    /// The Message-Authenticator doesn't match the packet and the shared secret.
    #[error("message-authenticator mismatch")]
    MessageAuthenticatorMismatchError(),

    /// A reply doesn't belong to the request it was matched with.
    #[error("invalid response: {0}")]
    InvalidResponseError(String),
}

/// This struct represents a packet of RADIUS for request and response.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    code: Code,
    identifier: u8,
    authenticator: Vec<u8>,
    secret: Vec<u8>,
    attributes: Attributes,
}

impl Packet {
    /// Constructor for a Packet.
    ///
    /// By default, this constructor makes an instance with a random identifier value.
    pub fn new(code: Code, secret: &[u8]) -> Self {
        Self::_new(code, secret, None)
    }

    /// Constructor for a Packet with arbitrary identifier value.
    pub fn new_with_identifier(code: Code, secret: &[u8], identifier: u8) -> Self {
        Self::_new(code, secret, Some(identifier))
    }

    fn _new(code: Code, secret: &[u8], maybe_identifier: Option<u8>) -> Self {
        let mut rng = rand::thread_rng();
        let authenticator = (0..16).map(|_| rng.gen()).collect::<Vec<u8>>();
        Packet {
            code,
            identifier: match maybe_identifier {
                Some(ident) => ident,
                None => rng.gen(),
            },
            authenticator,
            secret: secret.to_owned(),
            attributes: Attributes(vec![]),
        }
    }

    pub fn get_code(&self) -> Code {
        self.code
    }

    pub fn get_identifier(&self) -> u8 {
        self.identifier
    }

    pub fn get_secret(&self) -> &Vec<u8> {
        &self.secret
    }

    pub fn get_authenticator(&self) -> &Vec<u8> {
        &self.authenticator
    }

    pub fn get_attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// This sets an identifier value to an instance.
    pub fn set_identifier(&mut self, identifier: u8) {
        self.identifier = identifier;
    }

    /// This decodes bytes into a Packet.
    ///
    /// A Message-Authenticator carried by a request is verified here; a request that fails
    /// the check is rejected with `MessageAuthenticatorMismatchError`.
    /// Replies are verified by `decode_response()` because they need the request they answer.
    pub fn decode(bs: &[u8], secret: &[u8]) -> Result<Self, PacketError> {
        if bs.len() < RADIUS_PACKET_HEADER_LENGTH {
            return Err(PacketError::InsufficientPacketPayloadLengthError(
                RADIUS_PACKET_HEADER_LENGTH,
                bs.len(),
            ));
        }

        let len = match bs[2..4].try_into() {
            Ok(v) => u16::from_be_bytes(v),
            Err(e) => return Err(PacketError::DecodingError(e.to_string())),
        } as usize;
        if len < RADIUS_PACKET_HEADER_LENGTH {
            return Err(PacketError::InsufficientHeaderDefinedPacketLengthError(
                len,
                RADIUS_PACKET_HEADER_LENGTH,
            ));
        }
        if len > MAX_PACKET_LENGTH {
            return Err(
                PacketError::HeaderDefinedPacketLengthExceedsMaximumLimitError(
                    len,
                    MAX_PACKET_LENGTH,
                ),
            );
        }
        if bs.len() < len {
            return Err(PacketError::InsufficientPacketPayloadLengthError(
                len,
                bs.len(),
            ));
        }
        let bs = &bs[..len];

        let attributes = match Attributes::decode(&bs[RADIUS_PACKET_HEADER_LENGTH..]) {
            Ok(attributes) => attributes,
            Err(e) => return Err(PacketError::DecodingError(e.to_string())),
        };

        let code = Code::from(bs[0]);
        let signing_authenticator: &[u8] = match code {
            Code::AccessRequest | Code::StatusServer => &bs[4..RADIUS_PACKET_HEADER_LENGTH],
            Code::AccountingRequest => &ZERO_AUTHENTICATOR,
            _ => &[],
        };
        if !signing_authenticator.is_empty() {
            let verified = MessageAuthenticator::verify(bs, secret, signing_authenticator)
                .map_err(|e| PacketError::DecodingError(e.to_string()))?;
            if !verified {
                return Err(PacketError::MessageAuthenticatorMismatchError());
            }
        }

        Ok(Packet {
            code,
            identifier: bs[1],
            authenticator: bs[4..RADIUS_PACKET_HEADER_LENGTH].to_owned(),
            secret: secret.to_owned(),
            attributes,
        })
    }

    /// This decodes a reply and checks that it authentically answers `request`:
    /// the identifier must match, the Response Authenticator must verify and so must
    /// the Message-Authenticator when present.
    pub fn decode_response(bs: &[u8], request: &Packet) -> Result<Self, PacketError> {
        let mut response = Self::decode(bs, &request.secret)?;
        if response.identifier != request.identifier {
            return Err(PacketError::InvalidResponseError(format!(
                "identifier mismatch: request={}, response={}",
                request.identifier, response.identifier
            )));
        }

        let len = bs.len().min(u16::from_be_bytes([bs[2], bs[3]]) as usize);
        let bs = &bs[..len];
        let expected = md5::compute(
            [
                &bs[..4],
                &request.authenticator[..],
                &bs[RADIUS_PACKET_HEADER_LENGTH..],
                &request.secret[..],
            ]
            .concat(),
        );
        if expected.0 != bs[4..RADIUS_PACKET_HEADER_LENGTH] {
            return Err(PacketError::InvalidResponseError(
                "response authenticator mismatch".to_owned(),
            ));
        }

        let verified = MessageAuthenticator::verify(bs, &request.secret, &request.authenticator)
            .map_err(|e| PacketError::DecodingError(e.to_string()))?;
        if !verified {
            return Err(PacketError::MessageAuthenticatorMismatchError());
        }

        // keep the request authenticator so that hidden attributes of the reply can be recovered
        response.authenticator = request.authenticator.clone();
        Ok(response)
    }

    /// This method makes a response packet according to self (i.e. request packet).
    pub fn make_response_packet(&self, code: Code) -> Self {
        Packet {
            code,
            identifier: self.identifier,
            authenticator: self.authenticator.clone(),
            secret: self.secret.clone(),
            attributes: Attributes(vec![]),
        }
    }

    /// This method encodes the Packet into bytes.
    ///
    /// A Message-Authenticator attribute, if any, is computed and patched in first;
    /// then the header authenticator is filled according to the packet code.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut bs = match self.marshal_binary() {
            Ok(bs) => bs,
            Err(e) => return Err(PacketError::EncodingError(e)),
        };

        match self.code {
            Code::AccessRequest | Code::StatusServer => {
                self.sign_message_authenticator(&mut bs, &self.authenticator)?;
                Ok(bs)
            }
            Code::AccessAccept
            | Code::AccessReject
            | Code::AccountingRequest
            | Code::AccountingResponse
            | Code::AccessChallenge => {
                // see "Request Authenticator" in https://tools.ietf.org/html/rfc2866#section-3
                let authenticator: &[u8] = match self.code {
                    Code::AccountingRequest => &ZERO_AUTHENTICATOR,
                    _ => &self.authenticator,
                };
                self.sign_message_authenticator(&mut bs, authenticator)?;

                let digest = md5::compute(
                    [
                        &bs[..4],
                        authenticator,
                        &bs[RADIUS_PACKET_HEADER_LENGTH..],
                        &self.secret[..],
                    ]
                    .concat(),
                );
                bs.splice(4..RADIUS_PACKET_HEADER_LENGTH, digest.0);

                Ok(bs)
            }
            _ => Err(PacketError::UnknownCodeError(format!("{:?}", self.code))),
        }
    }

    fn sign_message_authenticator(
        &self,
        bs: &mut [u8],
        authenticator: &[u8],
    ) -> Result<(), PacketError> {
        MessageAuthenticator::sign(bs, &self.secret, authenticator)
            .map(|_| ())
            .map_err(|e| PacketError::EncodingError(e.to_string()))
    }

    /*
     * Binary structure:
     *   0                   1                   2                   3
     *   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
     *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     *  |     Code      |  Identifier   |            Length             |
     *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     *  |                                                               |
     *  |                         Authenticator                         |
     *  |                                                               |
     *  |                                                               |
     *  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
     *  |  Attributes ...
     *  +-+-+-+-+-+-+-+-+-+-+-+-+-
     */
    fn marshal_binary(&self) -> Result<Vec<u8>, String> {
        let encoded_avp = self.attributes.encode().map_err(|e| e.to_string())?;

        let size = RADIUS_PACKET_HEADER_LENGTH + encoded_avp.len();
        if size > MAX_PACKET_LENGTH {
            return Err("packet is too large".to_owned());
        }

        let mut bs: Vec<u8> = Vec::with_capacity(size);
        bs.push(self.code as u8);
        bs.push(self.identifier);
        bs.extend(u16::to_be_bytes(size as u16));
        bs.extend(&self.authenticator);
        bs.extend(encoded_avp);
        Ok(bs)
    }

    /// Returns whether the Packet is authentic response or not.
    pub fn is_authentic_response(response: &[u8], request: &[u8], secret: &[u8]) -> bool {
        if response.len() < RADIUS_PACKET_HEADER_LENGTH
            || request.len() < RADIUS_PACKET_HEADER_LENGTH
            || secret.is_empty()
        {
            return false;
        }

        md5::compute(
            [
                &response[..4],
                &request[4..RADIUS_PACKET_HEADER_LENGTH],
                &response[RADIUS_PACKET_HEADER_LENGTH..],
                secret,
            ]
            .concat(),
        )
        .0
        .eq(&response[4..RADIUS_PACKET_HEADER_LENGTH])
    }

    /// Returns whether the Packet is authentic request or not.
    ///
    /// Access-Request carries a random authenticator, so only Accounting-Request can be checked.
    pub fn is_authentic_request(request: &[u8], secret: &[u8]) -> bool {
        if request.len() < RADIUS_PACKET_HEADER_LENGTH || secret.is_empty() {
            return false;
        }

        match Code::from(request[0]) {
            Code::AccessRequest | Code::StatusServer => true,
            Code::AccountingRequest => md5::compute(
                [
                    &request[..4],
                    &ZERO_AUTHENTICATOR,
                    &request[RADIUS_PACKET_HEADER_LENGTH..],
                    secret,
                ]
                .concat(),
            )
            .0
            .eq(&request[4..RADIUS_PACKET_HEADER_LENGTH]),
            _ => false,
        }
    }

    /// Add an AVP to the list of AVPs.
    pub fn add(&mut self, avp: AVP) {
        self.attributes.add(avp);
    }

    /// Add AVPs to the list of AVPs.
    pub fn extend(&mut self, avps: Vec<AVP>) {
        self.attributes.extend(avps)
    }

    /// Delete all of AVPs from the list according to given AVP type.
    pub fn delete(&mut self, typ: AVPType) {
        self.attributes.del(typ);
    }

    /// Returns an AVP that matches at first with the given AVP type. If there are not any matched ones, this returns `None`.
    pub fn lookup(&self, typ: AVPType) -> Option<&AVP> {
        self.attributes.lookup(typ)
    }

    /// Returns AVPs that match with the given AVP type.
    pub fn lookup_all(&self, typ: AVPType) -> Vec<&AVP> {
        self.attributes.lookup_all(typ)
    }
}
