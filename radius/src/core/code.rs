use std::convert::TryFrom;
use std::fmt;

use num_enum::TryFromPrimitive;

/// RADIUS packet type code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Code {
    AccessRequest = 1,
    AccessAccept = 2,
    AccessReject = 3,
    AccountingRequest = 4,
    AccountingResponse = 5,
    AccessChallenge = 11,
    StatusServer = 12,
    StatusClient = 13,
    Reserved = 255,
    Invalid = 0,
}

impl Code {
    pub fn string(&self) -> &'static str {
        match self {
            Code::AccessRequest => "Access-Request",
            Code::AccessAccept => "Access-Accept",
            Code::AccessReject => "Access-Reject",
            Code::AccountingRequest => "Accounting-Request",
            Code::AccountingResponse => "Accounting-Response",
            Code::AccessChallenge => "Access-Challenge",
            Code::StatusServer => "Status-Server",
            Code::StatusClient => "Status-Client",
            Code::Reserved => "Reserved",
            Code::Invalid => "Invalid",
        }
    }

    pub fn from(value: u8) -> Self {
        Code::try_from(value).unwrap_or(Code::Invalid)
    }

    /// Returns whether the code is one that a NAS sends to the server.
    pub fn is_request(&self) -> bool {
        matches!(self, Code::AccessRequest | Code::AccountingRequest)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}
