//! Accounting attribute dictionary of RFC 2866.

use crate::core::avp::{AVPError, AVPType, AVP};
use crate::core::packet::Packet;

pub const ACCT_STATUS_TYPE_TYPE: AVPType = 40;
pub type AcctStatusType = u32;
pub const ACCT_STATUS_TYPE_START: AcctStatusType = 1;
pub const ACCT_STATUS_TYPE_STOP: AcctStatusType = 2;
pub const ACCT_STATUS_TYPE_INTERIM_UPDATE: AcctStatusType = 3;
pub const ACCT_STATUS_TYPE_ACCOUNTING_ON: AcctStatusType = 7;
pub const ACCT_STATUS_TYPE_ACCOUNTING_OFF: AcctStatusType = 8;
/// Add `acct-status-type` value-defined integer value to a packet.
pub fn add_acct_status_type(packet: &mut Packet, value: AcctStatusType) {
    packet.add(AVP::from_u32(ACCT_STATUS_TYPE_TYPE, value));
}
/// Lookup a `acct-status-type` value-defined integer value from a packet.
pub fn lookup_acct_status_type(packet: &Packet) -> Option<Result<AcctStatusType, AVPError>> {
    packet.lookup(ACCT_STATUS_TYPE_TYPE).map(|v| v.encode_u32())
}

pub const ACCT_INPUT_OCTETS_TYPE: AVPType = 42;
/// Add `acct-input-octets` integer value to a packet.
pub fn add_acct_input_octets(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(ACCT_INPUT_OCTETS_TYPE, value));
}
/// Lookup a `acct-input-octets` integer value from a packet.
pub fn lookup_acct_input_octets(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(ACCT_INPUT_OCTETS_TYPE).map(|v| v.encode_u32())
}

pub const ACCT_OUTPUT_OCTETS_TYPE: AVPType = 43;
/// Add `acct-output-octets` integer value to a packet.
pub fn add_acct_output_octets(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(ACCT_OUTPUT_OCTETS_TYPE, value));
}
/// Lookup a `acct-output-octets` integer value from a packet.
pub fn lookup_acct_output_octets(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(ACCT_OUTPUT_OCTETS_TYPE).map(|v| v.encode_u32())
}

pub const ACCT_SESSION_ID_TYPE: AVPType = 44;
/// Add `acct-session-id` string value to a packet.
pub fn add_acct_session_id(packet: &mut Packet, value: &str) {
    packet.add(AVP::from_string(ACCT_SESSION_ID_TYPE, value));
}
/// Lookup a `acct-session-id` string value from a packet.
pub fn lookup_acct_session_id(packet: &Packet) -> Option<Result<String, AVPError>> {
    packet.lookup(ACCT_SESSION_ID_TYPE).map(|v| v.encode_string())
}

pub const ACCT_AUTHENTIC_TYPE: AVPType = 45;
pub type AcctAuthentic = u32;
pub const ACCT_AUTHENTIC_RADIUS: AcctAuthentic = 1;
pub const ACCT_AUTHENTIC_LOCAL: AcctAuthentic = 2;
/// Add `acct-authentic` value-defined integer value to a packet.
pub fn add_acct_authentic(packet: &mut Packet, value: AcctAuthentic) {
    packet.add(AVP::from_u32(ACCT_AUTHENTIC_TYPE, value));
}

pub const ACCT_SESSION_TIME_TYPE: AVPType = 46;
/// Add `acct-session-time` integer value to a packet.
pub fn add_acct_session_time(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(ACCT_SESSION_TIME_TYPE, value));
}
/// Lookup a `acct-session-time` integer value from a packet.
pub fn lookup_acct_session_time(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(ACCT_SESSION_TIME_TYPE).map(|v| v.encode_u32())
}

pub const ACCT_INPUT_PACKETS_TYPE: AVPType = 47;
/// Add `acct-input-packets` integer value to a packet.
pub fn add_acct_input_packets(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(ACCT_INPUT_PACKETS_TYPE, value));
}
/// Lookup a `acct-input-packets` integer value from a packet.
pub fn lookup_acct_input_packets(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(ACCT_INPUT_PACKETS_TYPE).map(|v| v.encode_u32())
}

pub const ACCT_OUTPUT_PACKETS_TYPE: AVPType = 48;
/// Add `acct-output-packets` integer value to a packet.
pub fn add_acct_output_packets(packet: &mut Packet, value: u32) {
    packet.add(AVP::from_u32(ACCT_OUTPUT_PACKETS_TYPE, value));
}
/// Lookup a `acct-output-packets` integer value from a packet.
pub fn lookup_acct_output_packets(packet: &Packet) -> Option<Result<u32, AVPError>> {
    packet.lookup(ACCT_OUTPUT_PACKETS_TYPE).map(|v| v.encode_u32())
}
