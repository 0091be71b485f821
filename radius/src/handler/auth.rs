//! Access-Request handling for PAP, CHAP, MS-CHAPv1 and MS-CHAPv2.
//! EAP requests are handed over to `handler::eap`.

use std::collections::BTreeMap;

use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::core::chap::{self, ChapPassword};
use crate::core::code::Code;
use crate::core::mppe;
use crate::core::mschap;
use crate::core::packet::Packet;
use crate::core::rfc2865;
use crate::core::rfc2869;
use crate::core::vsa::{
    self, MsChap2Response, MsChapResponse, VendorAttribute, MPPE_ENCRYPTION_REQUIRED,
    MPPE_ENCRYPTION_TYPES_RC4_40_128, MS_CHAP2_RESPONSE, MS_CHAP_CHALLENGE, MS_CHAP_RESPONSE,
    VENDOR_MICROSOFT,
};
use crate::handler::validate::validate_access_request;
use crate::handler::{eap, reply_with_message, HandlerError, RadiusHandler};
use crate::storage::{Storage, User};

/// Result of a credential check: reply attributes on success, the Reply-Message otherwise.
type Verdict = Result<Vec<VendorAttribute>, &'static str>;

pub(crate) enum Authorization {
    Granted,
    Denied(&'static str),
}

/// Plan checks that follow a successful credential check. When access is granted the
/// plan's reply attributes are added to `reply`.
pub(crate) async fn authorize(
    storage: &dyn Storage,
    user: &User,
    reply: &mut Packet,
) -> Result<Authorization, HandlerError> {
    let conns = storage.count_active_sessions(&user.name).await?;
    if conns >= user.simultaneous_use {
        return Ok(Authorization::Denied("Max conns reached"));
    }
    if !user.is_active(Utc::now().date_naive()) {
        return Ok(Authorization::Denied("Invalid user/pass"));
    }

    if let Some(ip) = &user.dedicated_ip {
        rfc2865::add_framed_ip_address(reply, ip);
    }
    if let Some(ratelimit) = &user.ratelimit {
        vsa::add_vendor_attribute(reply, &VendorAttribute::MikrotikRateLimit(ratelimit.clone()))?;
    }
    if let Some(dns) = user.dns_one {
        vsa::add_vendor_attribute(reply, &VendorAttribute::MsPrimaryDnsServer(dns))?;
        if let Some(dns) = user.dns_two {
            vsa::add_vendor_attribute(reply, &VendorAttribute::MsSecondaryDnsServer(dns))?;
        }
    }
    Ok(Authorization::Granted)
}

pub(crate) async fn handle_access_request(
    handler: &RadiusHandler,
    request: &Packet,
) -> Result<Option<Packet>, HandlerError> {
    if let Err(e) = validate_access_request(request) {
        info!("auth.begin dropped id={}; {}", request.get_identifier(), e);
        return Ok(None);
    }

    let ms_attrs = microsoft_attributes(request);
    let has_pap = request.lookup(rfc2865::USER_PASSWORD_TYPE).is_some();
    let has_chap = request.lookup(rfc2865::CHAP_PASSWORD_TYPE).is_some();
    let has_mschap = ms_attrs
        .keys()
        .any(|typ| matches!(*typ, MS_CHAP_CHALLENGE | MS_CHAP_RESPONSE | MS_CHAP2_RESPONSE));
    if !has_pap && !has_chap && !has_mschap && rfc2869::lookup_eap_message(request).is_some() {
        return eap::handle_eap(handler, request).await;
    }

    let name = match rfc2865::lookup_user_name(request) {
        Some(name) => name?,
        None => return Ok(None),
    };
    let user = match handler.storage.get_user(&name).await? {
        Some(user) => user,
        None => {
            return Ok(Some(reply_with_message(
                request,
                Code::AccessReject,
                "No such user",
            )))
        }
    };

    let verdict = if has_pap {
        verify_pap(request, &user)
    } else if has_chap {
        verify_chap(request, &user)
    } else if has_mschap {
        verify_mschap(request, &user, &ms_attrs)
    } else {
        Err("No supported credentials")
    };

    let vendor_attrs = match verdict {
        Ok(attrs) => attrs,
        Err(message) => {
            debug!("auth user={} rejected: {}", name, message);
            return Ok(Some(reply_with_message(
                request,
                Code::AccessReject,
                message,
            )));
        }
    };

    let mut reply = request.make_response_packet(Code::AccessAccept);
    for attr in &vendor_attrs {
        vsa::add_vendor_attribute(&mut reply, attr)?;
    }
    match authorize(handler.storage.as_ref(), &user, &mut reply).await? {
        Authorization::Granted => {
            info!("auth user={} accepted", name);
            Ok(Some(reply))
        }
        Authorization::Denied(message) => {
            info!("auth user={} denied: {}", name, message);
            Ok(Some(reply_with_message(
                request,
                Code::AccessReject,
                message,
            )))
        }
    }
}

/// Microsoft sub-attributes keyed by vendor type; a repeated type keeps the last one.
fn microsoft_attributes(request: &Packet) -> BTreeMap<u8, VendorAttribute> {
    vsa::lookup_vendor_attributes(request)
        .into_iter()
        .filter(|attr| attr.vendor_id() == VENDOR_MICROSOFT)
        .map(|attr| (attr.vendor_type(), attr))
        .collect()
}

fn verify_pap(request: &Packet, user: &User) -> Verdict {
    match rfc2865::lookup_user_password(request) {
        Some(Ok(password)) if bool::from(password.ct_eq(user.password.as_bytes())) => {
            debug!("PAP login user={}", user.name);
            Ok(vec![])
        }
        Some(Err(e)) => {
            debug!("PAP user={} undecodable password; {}", user.name, e);
            Err("Invalid password")
        }
        _ => Err("Invalid password"),
    }
}

fn verify_chap(request: &Packet, user: &User) -> Verdict {
    let chap_password = match rfc2865::lookup_chap_password(request).map(|v| ChapPassword::decode(&v)) {
        Some(Ok(chap_password)) => chap_password,
        _ => return Err("CHAP: Invalid CHAP-Password"),
    };
    // without CHAP-Challenge the Request Authenticator is the challenge
    let challenge = rfc2865::lookup_chap_challenge(request)
        .unwrap_or_else(|| request.get_authenticator().clone());

    if !chap::verify(&chap_password, user.password.as_bytes(), &challenge) {
        return Err("Invalid password");
    }
    debug!("CHAP login user={}", user.name);
    Ok(vec![])
}

fn verify_mschap(
    request: &Packet,
    user: &User,
    attrs: &BTreeMap<u8, VendorAttribute>,
) -> Verdict {
    if attrs.len() != 2 {
        return Err("MSCHAP: Missing attrs? MS-CHAP-Challenge/MS-CHAP-Response");
    }
    let challenge = match attrs.get(&MS_CHAP_CHALLENGE) {
        Some(VendorAttribute::MsChapChallenge(challenge)) => challenge,
        _ => return Err("MSCHAP: Missing attrs? MS-CHAP-Challenge/MS-CHAP-Response"),
    };

    match (attrs.get(&MS_CHAP_RESPONSE), attrs.get(&MS_CHAP2_RESPONSE)) {
        (Some(VendorAttribute::MsChapResponse(response)), _) => {
            verify_mschap_v1(request, user, challenge, response)
        }
        (_, Some(VendorAttribute::MsChap2Response(response))) => {
            verify_mschap_v2(request, user, challenge, response)
        }
        _ => Err("MSCHAP: Response1/2 not found"),
    }
}

fn verify_mschap_v1(
    request: &Packet,
    user: &User,
    challenge: &[u8],
    response: &MsChapResponse,
) -> Verdict {
    // a zero flag asks for the LM-Response to be used instead
    if response.flags == 0 {
        return Err("MSCHAPv1: LM-Response not supported.");
    }
    if response.lm_response.iter().any(|b| *b != 0) {
        return Err("MSCHAPv1: LM-Response set.");
    }

    let expected = mschap::nt_challenge_response(challenge, &user.password).map_err(|e| {
        error!("MSCHAPv1 user={}; {}", user.name, e);
        "MSCHAPv1: Server-side processing error"
    })?;
    let keys = mppe::mschap_mppe_keys(
        &user.password,
        request.get_secret(),
        request.get_authenticator(),
    )
    .map_err(|e| {
        error!("MPPEv1 user={}; {}", user.name, e);
        "MPPEv1: Server-side processing error"
    })?;

    if !bool::from(expected.ct_eq(&response.nt_response)) {
        debug!("MSCHAPv1 user={} response mismatch", user.name);
        return Err("Invalid password");
    }
    debug!("MSCHAPv1 login user={}", user.name);

    Ok(vec![
        VendorAttribute::MsMppeEncryptionPolicy(MPPE_ENCRYPTION_REQUIRED),
        VendorAttribute::MsMppeEncryptionTypes(MPPE_ENCRYPTION_TYPES_RC4_40_128),
        VendorAttribute::MsChapMppeKeys(keys),
    ])
}

fn verify_mschap_v2(
    request: &Packet,
    user: &User,
    challenge: &[u8],
    response: &MsChap2Response,
) -> Verdict {
    if response.flags != 0 {
        return Err("MSCHAPv2: Flags should be set to 0");
    }

    let server_error = |e: &dyn std::fmt::Display| {
        error!("MSCHAPv2 user={}; {}", user.name, e);
        "MSCHAPv2: Server-side processing error"
    };
    let expected = mschap::generate_nt_response(
        challenge,
        &response.peer_challenge,
        &user.name,
        &user.password,
    )
    .map_err(|e| server_error(&e))?;
    if !bool::from(expected.ct_eq(&response.nt_response)) {
        debug!("MSCHAPv2 user={} response mismatch", user.name);
        return Err("Invalid password");
    }

    let authenticator_response = mschap::generate_authenticator_response(
        &user.password,
        &response.nt_response,
        &response.peer_challenge,
        challenge,
        &user.name,
    )
    .map_err(|e| server_error(&e))?;

    let (send_key, recv_key) = mppe::mschapv2_session_keys(&user.password, &response.nt_response);
    let hide = |key: &[u8]| {
        mppe::encrypt_key(key, request.get_secret(), request.get_authenticator()).map_err(|e| {
            error!("MPPEv2 user={}; {}", user.name, e);
            "MPPEv2: Server-side processing error"
        })
    };
    let send_key = hide(&send_key)?;
    let recv_key = hide(&recv_key)?;
    debug!("MSCHAPv2 login user={}", user.name);

    let mut success = vec![response.ident];
    success.extend(authenticator_response.as_bytes());
    Ok(vec![
        VendorAttribute::MsMppeEncryptionPolicy(MPPE_ENCRYPTION_REQUIRED),
        VendorAttribute::MsMppeEncryptionTypes(MPPE_ENCRYPTION_TYPES_RC4_40_128),
        VendorAttribute::MsChap2Success(success),
        VendorAttribute::MsMppeSendKey(send_key),
        VendorAttribute::MsMppeRecvKey(recv_key),
    ])
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::accounting::queue::AccountingQueue;
    use crate::core::avp::AVP;
    use crate::core::chap;
    use crate::core::code::Code;
    use crate::core::mppe;
    use crate::core::packet::Packet;
    use crate::core::rfc2865;
    use crate::core::vsa::{self, MsChap2Response, MsChapResponse, VendorAttribute};
    use crate::handler::RadiusHandler;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{SessionKey, Storage, User};

    const SECRET: &[u8] = b"secret";

    fn user(name: &str, password: &str) -> User {
        User {
            name: name.to_owned(),
            password: password.to_owned(),
            block_remaining: None,
            active_until: None,
            simultaneous_use: 1,
            dedicated_ip: None,
            ratelimit: None,
            dns_one: None,
            dns_two: None,
        }
    }

    fn handler(users: Vec<User>) -> (RadiusHandler, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new(users));
        let handler = RadiusHandler::new(
            storage.clone(),
            Arc::new(AccountingQueue::new()),
            "radius@localhost",
            Duration::from_secs(60),
        );
        (handler, storage)
    }

    fn request(name: &str) -> Packet {
        let mut packet = Packet::new(Code::AccessRequest, SECRET);
        rfc2865::add_user_name(&mut packet, name);
        rfc2865::add_nas_ip_address(&mut packet, &Ipv4Addr::new(10, 0, 0, 1));
        rfc2865::add_nas_identifier(&mut packet, "nas-1");
        rfc2865::add_nas_port(&mut packet, 0);
        rfc2865::add_nas_port_type(&mut packet, rfc2865::NAS_PORT_TYPE_VIRTUAL);
        packet
    }

    fn reply_message(packet: &Packet) -> String {
        rfc2865::lookup_reply_message(packet).unwrap().unwrap()
    }

    fn arr<const N: usize>(s: &str) -> [u8; N] {
        hex::decode(s).unwrap().try_into().unwrap()
    }

    #[tokio::test]
    async fn it_should_authenticate_pap() {
        let mut alice = user("alice", "arctangent");
        alice.dedicated_ip = Some(Ipv4Addr::new(192, 168, 1, 2));
        alice.ratelimit = Some("1M/2M".to_owned());
        alice.dns_one = Some(Ipv4Addr::new(1, 1, 1, 1));
        alice.dns_two = Some(Ipv4Addr::new(8, 8, 8, 8));
        let (handler, _) = handler(vec![alice]);

        let mut req = request("alice");
        rfc2865::add_user_password(&mut req, b"arctangent").unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessAccept);
        assert_eq!(reply.get_identifier(), req.get_identifier());
        assert_eq!(
            rfc2865::lookup_framed_ip_address(&reply).unwrap().unwrap(),
            Ipv4Addr::new(192, 168, 1, 2)
        );
        assert_eq!(
            vsa::lookup_vendor_attributes(&reply),
            vec![
                VendorAttribute::MikrotikRateLimit("1M/2M".to_owned()),
                VendorAttribute::MsPrimaryDnsServer(Ipv4Addr::new(1, 1, 1, 1)),
                VendorAttribute::MsSecondaryDnsServer(Ipv4Addr::new(8, 8, 8, 8)),
            ]
        );

        let mut req = request("alice");
        rfc2865::add_user_password(&mut req, b"tangent").unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessReject);
        assert_eq!(reply_message(&reply), "Invalid password");
    }

    #[tokio::test]
    async fn it_should_ignore_malformed_foreign_vendor_data() {
        let (handler, _) = handler(vec![user("alice", "arctangent")]);
        let garbage = AVP::from_bytes(rfc2865::VENDOR_SPECIFIC_TYPE, &[0, 0, 0, 9, 0x01]);

        let mut req = request("alice");
        req.add(garbage.clone());
        rfc2865::add_user_password(&mut req, b"arctangent").unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessAccept);

        // vendor data alone is not an MS-CHAP attempt
        let mut req = request("alice");
        req.add(garbage);
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessReject);
        assert_eq!(reply_message(&reply), "No supported credentials");

        // a Microsoft response of the wrong size is still an MS-CHAP attempt
        let mut req = request("alice");
        vsa::add_vendor_attribute(&mut req, &VendorAttribute::MsChapChallenge(vec![0; 16])).unwrap();
        let short = vsa::VendorSpecific {
            vendor_id: vsa::VENDOR_MICROSOFT,
            attributes: vec![vsa::VendorSubAttribute {
                vendor_type: vsa::MS_CHAP2_RESPONSE,
                value: vec![0; 10],
            }],
        };
        req.add(short.to_avp().unwrap());
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessReject);
        assert_eq!(reply_message(&reply), "MSCHAP: Response1/2 not found");
    }

    #[tokio::test]
    async fn it_should_reject_unknown_user() {
        let (handler, _) = handler(vec![]);
        let mut req = request("nobody");
        rfc2865::add_user_password(&mut req, b"pw").unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessReject);
        assert_eq!(reply_message(&reply), "No such user");
    }

    #[tokio::test]
    async fn it_should_drop_invalid_requests() {
        let (handler, _) = handler(vec![user("alice", "pw")]);
        let mut req = request("alice");
        assert!(handler.dispatch(&req).await.is_none());

        rfc2865::add_user_password(&mut req, b"pw").unwrap();
        req.delete(rfc2865::NAS_IDENTIFIER_TYPE);
        assert!(handler.dispatch(&req).await.is_none());
    }

    #[tokio::test]
    async fn it_should_authenticate_chap_with_and_without_challenge() {
        let (handler, _) = handler(vec![user("alice", "clientPass")]);

        let challenge: Vec<u8> = (0..16).collect();
        let mut req = request("alice");
        let mut chap_password = vec![1u8];
        chap_password.extend(chap::response(1, b"clientPass", &challenge));
        rfc2865::add_chap_password(&mut req, &chap_password);
        rfc2865::add_chap_challenge(&mut req, &challenge);
        assert_eq!(handler.dispatch(&req).await.unwrap().get_code(), Code::AccessAccept);

        let mut req = request("alice");
        let mut chap_password = vec![7u8];
        chap_password.extend(chap::response(7, b"clientPass", req.get_authenticator()));
        rfc2865::add_chap_password(&mut req, &chap_password);
        assert_eq!(handler.dispatch(&req).await.unwrap().get_code(), Code::AccessAccept);

        let mut req = request("alice");
        let mut chap_password = vec![7u8];
        chap_password.extend(chap::response(7, b"wrong", req.get_authenticator()));
        rfc2865::add_chap_password(&mut req, &chap_password);
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessReject);
        assert_eq!(reply_message(&reply), "Invalid password");
    }

    #[tokio::test]
    async fn it_should_authenticate_mschap_v1() {
        let (handler, _) = handler(vec![user("User", "MyPw")]);

        let mut req = request("User");
        let response = MsChapResponse {
            ident: 1,
            flags: 1,
            lm_response: [0; 24],
            nt_response: arr("4e9d3c8f9cfd385d5bf4d3246791956ca4c351ab409a3d61"),
        };
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChapChallenge(hex::decode("102db5df085d3041").unwrap()),
        )
        .unwrap();
        vsa::add_vendor_attribute(&mut req, &VendorAttribute::MsChapResponse(response.clone()))
            .unwrap();

        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessAccept);
        let attrs = vsa::lookup_vendor_attributes(&reply);
        assert_eq!(attrs[0], VendorAttribute::MsMppeEncryptionPolicy(1));
        assert_eq!(attrs[1], VendorAttribute::MsMppeEncryptionTypes(6));
        assert!(matches!(&attrs[2], VendorAttribute::MsChapMppeKeys(v) if v.len() == 32));

        let mut req = request("User");
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChapChallenge(hex::decode("102db5df085d3041").unwrap()),
        )
        .unwrap();
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChapResponse(MsChapResponse { flags: 0, ..response }),
        )
        .unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply_message(&reply), "MSCHAPv1: LM-Response not supported.");
    }

    #[tokio::test]
    async fn it_should_authenticate_mschap_v2() {
        let (handler, _) = handler(vec![user("User", "clientPass")]);

        let mut req = request("User");
        let nt_response = arr("82309ecd8d708b5ea08faa3981cd83544233114a3d85d6df");
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChapChallenge(
                hex::decode("5b5d7c7d7b3f2f3e3c2c602132262628").unwrap(),
            ),
        )
        .unwrap();
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChap2Response(MsChap2Response {
                ident: 9,
                flags: 0,
                peer_challenge: arr("21402324255e262a28295f2b3a337c7e"),
                nt_response,
            }),
        )
        .unwrap();

        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(reply.get_code(), Code::AccessAccept);
        let attrs = vsa::lookup_vendor_attributes(&reply);

        let mut success = vec![9u8];
        success.extend(b"S=407A5589115FD0D6209F510FE9C04566932CDA56");
        assert_eq!(attrs[2], VendorAttribute::MsChap2Success(success));

        match (&attrs[3], &attrs[4]) {
            (VendorAttribute::MsMppeSendKey(send), VendorAttribute::MsMppeRecvKey(recv)) => {
                let auth = req.get_authenticator();
                assert_eq!(
                    hex::encode(mppe::decrypt_key(send, SECRET, auth).unwrap()),
                    "8b7cdc149b993a1ba118cb153f56dccb"
                );
                assert_eq!(
                    hex::encode(mppe::decrypt_key(recv, SECRET, auth).unwrap()),
                    "d5f0e9521e3ea9589645e86051c82226"
                );
            }
            other => panic!("unexpected attributes: {:?}", other),
        }
    }

    #[tokio::test]
    async fn it_should_reject_incomplete_mschap() {
        let (handler, _) = handler(vec![user("User", "clientPass")]);
        let mut req = request("User");
        vsa::add_vendor_attribute(
            &mut req,
            &VendorAttribute::MsChapChallenge(vec![0; 16]),
        )
        .unwrap();
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(
            reply_message(&reply),
            "MSCHAP: Missing attrs? MS-CHAP-Challenge/MS-CHAP-Response"
        );
    }

    #[tokio::test]
    async fn it_should_enforce_plan() {
        let mut expired = user("bob", "pw");
        expired.active_until = chrono::NaiveDate::from_ymd_opt(2000, 1, 1);
        let (handler, storage) = handler(vec![user("alice", "pw"), expired]);

        storage
            .create_session(
                &SessionKey::new("alice", "s1", "10.0.0.1"),
                Ipv4Addr::new(192, 168, 0, 2),
                "",
            )
            .await
            .unwrap();

        let mut req = request("alice");
        rfc2865::add_user_password(&mut req, b"pw").unwrap();
        assert_eq!(reply_message(&handler.dispatch(&req).await.unwrap()), "Max conns reached");

        let mut req = request("bob");
        rfc2865::add_user_password(&mut req, b"pw").unwrap();
        assert_eq!(reply_message(&handler.dispatch(&req).await.unwrap()), "Invalid user/pass");
    }
}
