//! EAP related attributes of RFC 2869 / RFC 3579.

use crate::core::attributes::MAX_ATTRIBUTE_VALUE_LENGTH;
use crate::core::avp::{AVPType, AVP};
use crate::core::packet::Packet;

pub const EAP_MESSAGE_TYPE: AVPType = 79;
/// Add an EAP packet to a packet, split over as many `eap-message` attributes as needed.
pub fn add_eap_message(packet: &mut Packet, value: &[u8]) {
    for chunk in value.chunks(MAX_ATTRIBUTE_VALUE_LENGTH) {
        packet.add(AVP::from_bytes(EAP_MESSAGE_TYPE, chunk));
    }
}
/// Lookup the EAP packet of a packet, concatenating every `eap-message` attribute in order.
///
/// If there is no `eap-message`, it returns `None`.
pub fn lookup_eap_message(packet: &Packet) -> Option<Vec<u8>> {
    let chunks = packet.lookup_all(EAP_MESSAGE_TYPE);
    if chunks.is_empty() {
        return None;
    }
    Some(chunks.iter().flat_map(|avp| avp.value.iter().copied()).collect())
}
/// Delete all of `eap-message` values from a packet.
pub fn delete_eap_message(packet: &mut Packet) {
    packet.delete(EAP_MESSAGE_TYPE);
}

pub const MESSAGE_AUTHENTICATOR_TYPE: AVPType = 80;
pub const MESSAGE_AUTHENTICATOR_LENGTH: usize = 16;
/// Add a zeroed `message-authenticator`; the digest is patched in when the packet is encoded.
pub fn add_message_authenticator(packet: &mut Packet) {
    packet.delete(MESSAGE_AUTHENTICATOR_TYPE);
    packet.add(AVP::from_bytes(
        MESSAGE_AUTHENTICATOR_TYPE,
        &[0; MESSAGE_AUTHENTICATOR_LENGTH],
    ));
}
/// Lookup a `message-authenticator` octets value from a packet.
pub fn lookup_message_authenticator(packet: &Packet) -> Option<Vec<u8>> {
    packet
        .lookup(MESSAGE_AUTHENTICATOR_TYPE)
        .map(|v| v.encode_bytes())
}
