//! Structural checks applied before a request reaches its handler.

use thiserror::Error;

use crate::core::avp::AVPType;
use crate::core::packet::Packet;
use crate::core::rfc2865::{
    CHAP_PASSWORD_TYPE, NAS_IDENTIFIER_TYPE, NAS_IP_ADDRESS_TYPE, NAS_PORT_TYPE,
    NAS_PORT_TYPE_TYPE, REPLY_MESSAGE_TYPE, STATE_TYPE, USER_NAME_TYPE, USER_PASSWORD_TYPE,
    VENDOR_SPECIFIC_TYPE,
};
use crate::core::rfc2869::EAP_MESSAGE_TYPE;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("{0} missing")]
    MissingAttributeError(&'static str),
    #[error("{0} not allowed")]
    ForbiddenAttributeError(&'static str),
    #[error("UserPassword/CHAP-Password/VendorSpecific/EAP-Message missing")]
    MissingCredentialsError(),
    #[error("UserPassword and CHAP-Password are mutually exclusive")]
    AmbiguousCredentialsError(),
}

fn require(packet: &Packet, typ: AVPType, name: &'static str) -> Result<(), ValidationError> {
    match packet.lookup(typ) {
        Some(_) => Ok(()),
        None => Err(ValidationError::MissingAttributeError(name)),
    }
}

fn forbid(packet: &Packet, typ: AVPType, name: &'static str) -> Result<(), ValidationError> {
    match packet.lookup(typ) {
        Some(_) => Err(ValidationError::ForbiddenAttributeError(name)),
        None => Ok(()),
    }
}

pub fn validate_access_request(packet: &Packet) -> Result<(), ValidationError> {
    require(packet, USER_NAME_TYPE, "UserName")?;
    require(packet, NAS_IP_ADDRESS_TYPE, "NASIPAddress")?;
    require(packet, NAS_IDENTIFIER_TYPE, "NASIdentifier")?;

    let has = |typ| packet.lookup(typ).is_some();
    if has(USER_PASSWORD_TYPE) && has(CHAP_PASSWORD_TYPE) {
        return Err(ValidationError::AmbiguousCredentialsError());
    }
    if !(has(USER_PASSWORD_TYPE)
        || has(CHAP_PASSWORD_TYPE)
        || has(VENDOR_SPECIFIC_TYPE)
        || has(EAP_MESSAGE_TYPE))
    {
        return Err(ValidationError::MissingCredentialsError());
    }

    require(packet, NAS_PORT_TYPE, "NASPort")?;
    require(packet, NAS_PORT_TYPE_TYPE, "NASPortType")?;
    Ok(())
}

pub fn validate_accounting_request(packet: &Packet) -> Result<(), ValidationError> {
    forbid(packet, USER_PASSWORD_TYPE, "UserPassword")?;
    forbid(packet, CHAP_PASSWORD_TYPE, "CHAPPassword")?;
    forbid(packet, REPLY_MESSAGE_TYPE, "ReplyMessage")?;
    forbid(packet, STATE_TYPE, "State")?;

    require(packet, NAS_IP_ADDRESS_TYPE, "NASIPAddress")?;
    require(packet, NAS_IDENTIFIER_TYPE, "NASIdentifier")?;
    require(packet, NAS_PORT_TYPE, "NASPort")?;
    require(packet, NAS_PORT_TYPE_TYPE, "NASPortType")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::core::code::Code;
    use crate::core::packet::Packet;
    use crate::core::rfc2865;
    use crate::core::rfc2869;
    use crate::handler::validate::*;

    fn base(code: Code) -> Packet {
        let mut packet = Packet::new(code, b"secret");
        rfc2865::add_user_name(&mut packet, "alice");
        rfc2865::add_nas_ip_address(&mut packet, &Ipv4Addr::new(10, 0, 0, 1));
        rfc2865::add_nas_identifier(&mut packet, "nas-1");
        rfc2865::add_nas_port(&mut packet, 1);
        rfc2865::add_nas_port_type(&mut packet, rfc2865::NAS_PORT_TYPE_VIRTUAL);
        packet
    }

    #[test]
    fn it_should_require_credentials() {
        let mut packet = base(Code::AccessRequest);
        assert_eq!(
            validate_access_request(&packet),
            Err(ValidationError::MissingCredentialsError())
        );

        rfc2869::add_eap_message(&mut packet, &[2, 1, 0, 5, 1]);
        assert_eq!(validate_access_request(&packet), Ok(()));
    }

    #[test]
    fn it_should_refuse_both_password_kinds() {
        let mut packet = base(Code::AccessRequest);
        rfc2865::add_user_password(&mut packet, b"pw").unwrap();
        assert_eq!(validate_access_request(&packet), Ok(()));

        rfc2865::add_chap_password(&mut packet, &[0; 17]);
        assert_eq!(
            validate_access_request(&packet),
            Err(ValidationError::AmbiguousCredentialsError())
        );
    }

    #[test]
    fn it_should_report_the_first_missing_attribute() {
        let mut packet = base(Code::AccessRequest);
        rfc2865::add_user_password(&mut packet, b"pw").unwrap();
        packet.delete(rfc2865::NAS_PORT_TYPE_TYPE);
        assert_eq!(
            validate_access_request(&packet).unwrap_err().to_string(),
            "NASPortType missing"
        );

        packet.delete(rfc2865::USER_NAME_TYPE);
        assert_eq!(
            validate_access_request(&packet),
            Err(ValidationError::MissingAttributeError("UserName"))
        );
    }

    #[test]
    fn it_should_forbid_auth_attributes_in_accounting() {
        let mut packet = base(Code::AccountingRequest);
        assert_eq!(validate_accounting_request(&packet), Ok(()));

        rfc2865::add_state(&mut packet, b"state");
        assert_eq!(
            validate_accounting_request(&packet).unwrap_err().to_string(),
            "State not allowed"
        );

        let mut packet = base(Code::AccountingRequest);
        packet.delete(rfc2865::NAS_IDENTIFIER_TYPE);
        assert_eq!(
            validate_accounting_request(&packet),
            Err(ValidationError::MissingAttributeError("NASIdentifier"))
        );
    }
}
