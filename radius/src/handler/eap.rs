//! EAP-PWD (RFC 5931) over RADIUS (RFC 3579).
//!
//! The exchange spans several Access-Request/Access-Challenge round trips. Progress is
//! kept in `EapSessions`, keyed by the State attribute the server hands out with the
//! first challenge.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;

use crate::core::code::Code;
use crate::core::dragonfly::{self, Dragonfly, KeyConfirmation, Role, SessionKeys};
use crate::core::eap::{EAPCode, EAPType, EAP};
use crate::core::eap_pwd::{decode_confirm, PwdCommit, PwdExch, PwdId, PwdMessage};
use crate::core::mppe;
use crate::core::packet::Packet;
use crate::core::rfc2865;
use crate::core::rfc2869;
use crate::core::vsa::{self, VendorAttribute};
use crate::handler::auth::{authorize, Authorization};
use crate::handler::{HandlerError, RadiusHandler};
use crate::storage::User;

pub const STATE_LENGTH: usize = 16;

type State = [u8; STATE_LENGTH];

pub(crate) enum Stage {
    IdRequested {
        offer: PwdId,
    },
    CommitSent {
        user: User,
        dragonfly: Dragonfly,
    },
    ConfirmSent {
        user: User,
        exchange: KeyConfirmation,
    },
    /// EAP-Success or EAP-Failure went out; kept until expiry to answer retransmissions.
    Finished,
}

impl Stage {
    fn string(&self) -> &'static str {
        match self {
            Stage::IdRequested { .. } => "id-requested",
            Stage::CommitSent { .. } => "commit-sent",
            Stage::ConfirmSent { .. } => "confirm-sent",
            Stage::Finished => "finished",
        }
    }
}

/// The last Access-Request that advanced a session and the reply it got.
struct Answered {
    identifier: u8,
    authenticator: Vec<u8>,
    reply: Packet,
}

pub(crate) struct EapSession {
    remote_id: String,
    /// Identifier of the last EAP-Request; the next response has to echo it.
    last_id: u8,
    stage: Stage,
    answered: Option<Answered>,
    touched_at: Instant,
}

impl EapSession {
    fn new(remote_id: String, last_id: u8, stage: Stage) -> Self {
        EapSession {
            remote_id,
            last_id,
            stage,
            answered: None,
            touched_at: Instant::now(),
        }
    }

    fn answered(mut self, request: &Packet, reply: &Packet) -> Self {
        self.answered = Some(Answered {
            identifier: request.get_identifier(),
            authenticator: request.get_authenticator().clone(),
            reply: reply.clone(),
        });
        self
    }

    /// Returns the cached reply when `request` is a retransmission of the last answered one.
    /// A retransmission keeps the RADIUS identifier and Request Authenticator (RFC 5080 2.2.2).
    fn replay(&self, request: &Packet) -> Option<Packet> {
        self.answered
            .as_ref()
            .filter(|answered| {
                answered.identifier == request.get_identifier()
                    && answered.authenticator == *request.get_authenticator()
            })
            .map(|answered| answered.reply.clone())
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.touched_at.elapsed() >= ttl
    }
}

/// In-flight EAP exchanges. Entries not touched within `ttl` are treated as gone.
pub struct EapSessions {
    ttl: Duration,
    sessions: Mutex<HashMap<State, EapSession>>,
}

impl EapSessions {
    pub fn new(ttl: Duration) -> Self {
        EapSessions {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn insert(&self, state: State, session: EapSession) {
        self.sessions.lock().await.insert(state, session);
    }

    /// Removes the session so that a concurrent retransmission can't advance it twice.
    pub(crate) async fn take(&self, state: &State) -> Option<EapSession> {
        let session = self.sessions.lock().await.remove(state)?;
        if session.is_expired(self.ttl) {
            debug!("EAP session of {} expired at {}", session.remote_id, session.stage.string());
            return None;
        }
        Some(session)
    }

    /// Drops expired sessions and returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sweeps once per TTL until `shutdown_trigger` resolves.
    pub async fn run_sweeper<F>(&self, shutdown_trigger: F)
    where
        F: Future<Output = ()>,
    {
        let period = self.ttl.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        tokio::pin!(shutdown_trigger);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    if removed > 0 {
                        debug!("swept {} expired EAP sessions", removed);
                    }
                }
                _ = &mut shutdown_trigger => return,
            }
        }
    }
}

enum Advance {
    Challenge(PwdExch, Vec<u8>, Stage),
    Finish(User, SessionKeys),
    Fail(String),
}

pub(crate) async fn handle_eap(
    handler: &RadiusHandler,
    request: &Packet,
) -> Result<Option<Packet>, HandlerError> {
    if rfc2869::lookup_message_authenticator(request).is_none() {
        info!("EAP request id={} without Message-Authenticator", request.get_identifier());
        return Ok(None);
    }
    let eap = match rfc2869::lookup_eap_message(request).map(|bs| EAP::from_bytes(&bs)) {
        Some(Ok(eap)) => eap,
        Some(Err(e)) => {
            info!("EAP request id={} malformed; {}", request.get_identifier(), e);
            return Ok(None);
        }
        None => return Ok(None),
    };
    trace!("EAP <= {}", eap);
    if eap.code != EAPCode::Response {
        info!("EAP request carries unexpected {}", eap.code.string());
        return Ok(None);
    }

    match eap.typ {
        EAPType::Identity => start(handler, request, &eap).await,
        EAPType::PWD => {
            let state = match rfc2865::lookup_state(request)
                .and_then(|state| State::try_from(state.as_slice()).ok())
            {
                Some(state) => state,
                None => {
                    info!("EAP-PWD response without a valid State");
                    return Ok(None);
                }
            };
            resume(handler, request, &eap, state).await
        }
        typ => {
            // Nak included: PWD is the only method offered
            info!("EAP method {} is not supported", typ.string());
            if let Some(state) = rfc2865::lookup_state(request)
                .and_then(|state| State::try_from(state.as_slice()).ok())
            {
                handler.eap_sessions.take(&state).await;
            }
            Ok(Some(eap_reject(request, eap.id, None)?))
        }
    }
}

async fn start(
    handler: &RadiusHandler,
    request: &Packet,
    eap: &EAP,
) -> Result<Option<Packet>, HandlerError> {
    let remote_id = String::from_utf8_lossy(&eap.data).into_owned();
    let (state, token): (State, u32) = {
        let mut rng = rand::thread_rng();
        (rng.gen(), rng.gen())
    };
    let offer = PwdId::new(token, handler.server_identity.as_bytes());

    let id = eap.id.wrapping_add(1);
    let reply = eap_challenge(request, id, PwdExch::Id, offer.encode(), &state)?;
    debug!("EAP-PWD start for {}", remote_id);
    handler
        .eap_sessions
        .insert(state, EapSession::new(remote_id, id, Stage::IdRequested { offer }))
        .await;
    Ok(Some(reply))
}

async fn resume(
    handler: &RadiusHandler,
    request: &Packet,
    eap: &EAP,
    state: State,
) -> Result<Option<Packet>, HandlerError> {
    let session = match handler.eap_sessions.take(&state).await {
        Some(session) => session,
        None => {
            info!("EAP-PWD response for an unknown State");
            return Ok(None);
        }
    };
    if let Some(reply) = session.replay(request) {
        debug!(
            "EAP-PWD replaying the reply to retransmitted request id={}",
            request.get_identifier()
        );
        handler.eap_sessions.insert(state, session).await;
        return Ok(Some(reply));
    }
    if eap.id != session.last_id {
        debug!(
            "EAP-PWD response id={} doesn't answer request id={}",
            eap.id, session.last_id
        );
        handler.eap_sessions.insert(state, session).await;
        return Ok(None);
    }

    let remote_id = session.remote_id;
    let advance = match PwdMessage::decode(&eap.data) {
        Ok(message) => advance(handler, session.stage, message).await?,
        Err(e) => Advance::Fail(e.to_string()),
    };

    let reply = match advance {
        Advance::Challenge(exch, payload, stage) => {
            let id = eap.id.wrapping_add(1);
            let reply = eap_challenge(request, id, exch, payload, &state)?;
            handler
                .eap_sessions
                .insert(state, EapSession::new(remote_id, id, stage).answered(request, &reply))
                .await;
            return Ok(Some(reply));
        }
        Advance::Fail(reason) => {
            info!("EAP-PWD failed for {}; {}", remote_id, reason);
            eap_reject(request, eap.id, Some(&state))?
        }
        Advance::Finish(user, keys) => accept(handler, request, eap.id, &state, &user, &keys).await?,
    };
    handler
        .eap_sessions
        .insert(
            state,
            EapSession::new(remote_id, eap.id, Stage::Finished).answered(request, &reply),
        )
        .await;
    Ok(Some(reply))
}

async fn accept(
    handler: &RadiusHandler,
    request: &Packet,
    id: u8,
    state: &State,
    user: &User,
    keys: &SessionKeys,
) -> Result<Packet, HandlerError> {
    let mut reply = request.make_response_packet(Code::AccessAccept);
    rfc2869::add_eap_message(&mut reply, &EAP::success(id).to_bytes()?);
    rfc2865::add_user_name(&mut reply, &user.name);
    let secret = request.get_secret();
    let authenticator = request.get_authenticator();
    let recv_key = mppe::encrypt_key(&keys.msk[..32], secret, authenticator);
    let send_key = mppe::encrypt_key(&keys.msk[32..], secret, authenticator);
    match (recv_key, send_key) {
        (Ok(recv_key), Ok(send_key)) => {
            vsa::add_vendor_attribute(&mut reply, &VendorAttribute::MsMppeRecvKey(recv_key))?;
            vsa::add_vendor_attribute(&mut reply, &VendorAttribute::MsMppeSendKey(send_key))?;
        }
        (Err(e), _) | (_, Err(e)) => {
            error!("EAP-PWD user={} failed to hide MPPE keys; {}", user.name, e);
            return eap_reject(request, id, Some(state));
        }
    }

    match authorize(handler.storage.as_ref(), user, &mut reply).await? {
        Authorization::Granted => {
            rfc2869::add_message_authenticator(&mut reply);
            info!("EAP-PWD user={} accepted", user.name);
            Ok(reply)
        }
        Authorization::Denied(message) => {
            info!("EAP-PWD user={} denied: {}", user.name, message);
            let mut reply = eap_reject(request, id, Some(state))?;
            rfc2865::add_reply_message(&mut reply, message);
            Ok(reply)
        }
    }
}

async fn advance(
    handler: &RadiusHandler,
    stage: Stage,
    message: PwdMessage,
) -> Result<Advance, HandlerError> {
    let advance = match (stage, message.exch) {
        (Stage::IdRequested { offer }, PwdExch::Id) => {
            let peer = match PwdId::decode(&message.payload) {
                Ok(peer) => peer,
                Err(e) => return Ok(Advance::Fail(e.to_string())),
            };
            if !peer.matches_offer(&offer) {
                return Ok(Advance::Fail("PWD-ID doesn't match the offer".to_owned()));
            }
            let name = String::from_utf8_lossy(&peer.identity).into_owned();
            let user = match handler.storage.get_user(&name).await? {
                Some(user) => user,
                None => return Ok(Advance::Fail(format!("no such user {}", name))),
            };

            let dragonfly = dragonfly::compute_password_element(
                offer.token,
                &peer.identity,
                &offer.identity,
                user.password.as_bytes(),
            )
            .and_then(|pwe| Dragonfly::new(Role::Server, &pwe, offer.ciphersuite()));
            match dragonfly {
                Ok(dragonfly) => Advance::Challenge(
                    PwdExch::Commit,
                    dragonfly.commit().encode(),
                    Stage::CommitSent { user, dragonfly },
                ),
                Err(e) => Advance::Fail(e.to_string()),
            }
        }
        (Stage::CommitSent { user, dragonfly }, PwdExch::Commit) => {
            let exchange = PwdCommit::decode(&message.payload)
                .map_err(|e| e.to_string())
                .and_then(|peer| dragonfly.process_commit(&peer).map_err(|e| e.to_string()));
            match exchange {
                Ok(exchange) => Advance::Challenge(
                    PwdExch::Confirm,
                    exchange.confirm().to_vec(),
                    Stage::ConfirmSent { user, exchange },
                ),
                Err(reason) => Advance::Fail(reason),
            }
        }
        (Stage::ConfirmSent { user, exchange }, PwdExch::Confirm) => {
            let confirm = match decode_confirm(&message.payload) {
                Ok(confirm) => confirm,
                Err(e) => return Ok(Advance::Fail(e.to_string())),
            };
            if !exchange.verify_peer_confirm(&confirm) {
                return Ok(Advance::Fail("PWD-Confirm mismatch".to_owned()));
            }
            match exchange.session_keys() {
                Ok(keys) => Advance::Finish(user, keys),
                Err(e) => Advance::Fail(e.to_string()),
            }
        }
        (stage, exch) => Advance::Fail(format!(
            "unexpected {} at {}",
            exch.string(),
            stage.string()
        )),
    };
    Ok(advance)
}

fn eap_challenge(
    request: &Packet,
    id: u8,
    exch: PwdExch,
    payload: Vec<u8>,
    state: &State,
) -> Result<Packet, HandlerError> {
    let eap = EAP::request(id, EAPType::PWD, PwdMessage::new(exch, payload).encode());
    trace!("EAP => {}", eap);

    let mut reply = request.make_response_packet(Code::AccessChallenge);
    rfc2869::add_eap_message(&mut reply, &eap.to_bytes()?);
    rfc2865::add_state(&mut reply, state);
    rfc2869::add_message_authenticator(&mut reply);
    Ok(reply)
}

fn eap_reject(request: &Packet, id: u8, state: Option<&State>) -> Result<Packet, HandlerError> {
    let mut reply = request.make_response_packet(Code::AccessReject);
    rfc2869::add_eap_message(&mut reply, &EAP::failure(id).to_bytes()?);
    if let Some(state) = state {
        rfc2865::add_state(&mut reply, state);
    }
    rfc2869::add_message_authenticator(&mut reply);
    Ok(reply)
}
