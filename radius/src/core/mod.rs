pub mod attributes;
pub mod avp;
pub mod chap;
pub mod code;
pub mod dragonfly;
pub mod eap;
pub mod eap_pwd;
pub mod message_authenticator;
pub mod mppe;
pub mod mschap;
pub mod packet;
pub mod password;
pub mod request;
pub mod rfc2865;
pub mod rfc2866;
pub mod rfc2869;
pub mod vsa;
