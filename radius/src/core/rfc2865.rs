//! Attribute dictionary of RFC 2865, limited to what the server consumes or emits.

use std::net::Ipv4Addr;

use crate::core::avp::{AVPError, AVPType, AVP};
use crate::core::packet::Packet;

pub const USER_NAME_TYPE: AVPType = 1;
/// Add `user-name` string value to a packet.
pub fn add_user_name(packet: &mut Packet, value: &str) {
    packet.add(AVP::from_string(USER_NAME_TYPE, value));
}
/// Lookup a `user-name` string value from a packet.
///
/// It returns the first looked up value. If there is no associated value with `user-name`, it returns `None`.
pub fn lookup_user_name(packet: &Packet) -> Option<Result<String, AVPError>> {
    packet.lookup(USER_NAME_TYPE).map(|v| v.encode_string())
}

pub const USER_PASSWORD_TYPE: AVPType = 2;
/// Add `user-password` user-password value to a packet.
pub fn add_user_password(packet: &mut Packet, value: &[u8]) -> Result<(), AVPError> {
    let avp = AVP::from_user_password(
        USER_PASSWORD_TYPE,
        value,
        packet.get_secret(),
        packet.get_authenticator(),
    )?;
    packet.add(avp);
    Ok(())
}
/// Lookup a `user-password` user-password value from a packet.
///
/// The value is recovered with the secret and the request authenticator of the packet.
pub fn lookup_user_password(packet: &Packet) -> Option<Result<Vec<u8>, AVPError>> {
    packet
        .lookup(USER_PASSWORD_TYPE)
        .map(|v| v.encode_user_password(packet.get_secret(), packet.get_authenticator()))
}

pub const CHAP_PASSWORD_TYPE: AVPType = 3;
/// Add `chap-password` octets value to a packet.
pub fn add_chap_password(packet: &mut Packet, value: &[u8]) {
    packet.add(AVP::from_bytes(CHAP_PASSWORD_TYPE, value));
}
/// Lookup a `chap-password` octets value from a packet.
pub fn lookup_chap_password(packet: &Packet) -> Option<Vec<u8>> {
    packet.lookup(CHAP_PASSWORD_TYPE).map(|v| v.encode_bytes())
}

pub const NAS_IP_ADDRESS_TYPE: AVPType = 4;
/// Add `nas-ip-address` ipaddr value to a packet.
pub fn add_nas_ip_address(packet: &mut Packet, value: &Ipv4Addr) {
    packet.add(AVP::from_ipv4(NAS_IP_ADDRESS_TYPE, value));
}
/// Lookup a `nas-ip-address` ipaddr value from a packet.
pub fn lookup_nas_ip_address(packet: &Packet) -> Option<Result<Ipv4Addr, AVPError>> {
    packet.lookup(NAS_IP_ADDRESS_TYPE).map(|v| v.encode_ipv4())
}

pub const NAS_PORT_TYPE: AVPType = 5;
/// Add `nas-port` integer value to a packet.
pub fn add_nas_port(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(NAS_PORT_TYPE, value));
}
/// Lookup a `nas-port` integer value from a packet.
pub fn lookup_nas_port(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(NAS_PORT_TYPE).map(|v| v.encode_u32())
}

pub const FRAMED_IP_ADDRESS_TYPE: AVPType = 8;
/// Add `framed-ip-address` ipaddr value to a packet.
pub fn add_framed_ip_address(packet: &mut Packet, value: &Ipv4Addr) {
    packet.add(AVP::from_ipv4(FRAMED_IP_ADDRESS_TYPE, value));
}
/// Lookup a `framed-ip-address` ipaddr value from a packet.
pub fn lookup_framed_ip_address(packet: &Packet) -> Option<Result<Ipv4Addr, AVPError>> {
    packet.lookup(FRAMED_IP_ADDRESS_TYPE).map(|v| v.encode_ipv4())
}

pub const REPLY_MESSAGE_TYPE: AVPType = 18;
/// Add `reply-message` string value to a packet.
pub fn add_reply_message(packet: &mut Packet, value: &str) {
    packet.add(AVP::from_string(REPLY_MESSAGE_TYPE, value));
}
/// Lookup a `reply-message` string value from a packet.
pub fn lookup_reply_message(packet: &Packet) -> Option<Result<String, AVPError>> {
    packet.lookup(REPLY_MESSAGE_TYPE).map(|v| v.encode_string())
}

pub const STATE_TYPE: AVPType = 24;
/// Add `state` octets value to a packet.
pub fn add_state(packet: &mut Packet, value: &[u8]) {
    packet.add(AVP::from_bytes(STATE_TYPE, value));
}
/// Lookup a `state` octets value from a packet.
pub fn lookup_state(packet: &Packet) -> Option<Vec<u8>> {
    packet.lookup(STATE_TYPE).map(|v| v.encode_bytes())
}

pub const VENDOR_SPECIFIC_TYPE: AVPType = 26;

pub const CALLING_STATION_ID_TYPE: AVPType = 31;
/// Add `calling-station-id` string value to a packet.
pub fn add_calling_station_id(packet: &mut Packet, value: &str) {
    packet.add(AVP::from_string(CALLING_STATION_ID_TYPE, value));
}
/// Lookup a `calling-station-id` string value from a packet.
pub fn lookup_calling_station_id(packet: &Packet) -> Option<Result<String, AVPError>> {
    packet
        .lookup(CALLING_STATION_ID_TYPE)
        .map(|v| v.encode_string())
}

pub const NAS_IDENTIFIER_TYPE: AVPType = 32;
/// Add `nas-identifier` string value to a packet.
pub fn add_nas_identifier(packet: &mut Packet, value: &str) {
    packet.add(AVP::from_string(NAS_IDENTIFIER_TYPE, value));
}
/// Lookup a `nas-identifier` string value from a packet.
pub fn lookup_nas_identifier(packet: &Packet) -> Option<Result<String, AVPError>> {
    packet.lookup(NAS_IDENTIFIER_TYPE).map(|v| v.encode_string())
}

pub const CHAP_CHALLENGE_TYPE: AVPType = 60;
/// Add `chap-challenge` octets value to a packet.
pub fn add_chap_challenge(packet: &mut Packet, value: &[u8]) {
    packet.add(AVP::from_bytes(CHAP_CHALLENGE_TYPE, value));
}
/// Lookup a `chap-challenge` octets value from a packet.
pub fn lookup_chap_challenge(packet: &Packet) -> Option<Vec<u8>> {
    packet.lookup(CHAP_CHALLENGE_TYPE).map(|v| v.encode_bytes())
}

pub const NAS_PORT_TYPE_TYPE: AVPType = 61;
pub type NasPortType = u32;
pub const NAS_PORT_TYPE_ASYNC: NasPortType = 0;
pub const NAS_PORT_TYPE_VIRTUAL: NasPortType = 5;
pub const NAS_PORT_TYPE_ETHERNET: NasPortType = 15;
pub const NAS_PORT_TYPE_WIRELESS_802_11: NasPortType = 19;
/// Add `nas-port-type` value-defined integer value to a packet.
pub fn add_nas_port_type(packet: &mut Packet, value: NasPortType) {
    packet.add(AVP::from_u32(NAS_PORT_TYPE_TYPE, value));
}
/// Lookup a `nas-port-type` value-defined integer value from a packet.
pub fn lookup_nas_port_type(packet: &Packet) -> Option<Result<NasPortType, AVPError>> {
    packet.lookup(NAS_PORT_TYPE_TYPE).map(|v| v.encode_u32())
}
