//! Request dispatch for the RADIUS server.
//!
//! Every listener shares one `RadiusHandler`; it owns the EAP session table and
//! the accounting queue and reaches users and sessions through `Storage`.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::accounting::queue::AccountingQueue;
use crate::core::avp::AVPError;
use crate::core::code::Code;
use crate::core::eap::EAPError;
use crate::core::packet::Packet;
use crate::core::request::Request;
use crate::core::rfc2865;
use crate::core::rfc2866::{
    lookup_acct_status_type, ACCT_STATUS_TYPE_INTERIM_UPDATE, ACCT_STATUS_TYPE_START,
    ACCT_STATUS_TYPE_STOP,
};
use crate::core::vsa::VSAError;
use crate::handler::eap::EapSessions;
use crate::server::RequestHandler;
use crate::storage::{Storage, StorageError};

pub mod accounting;
pub mod auth;
pub mod eap;
pub mod validate;

/// Failures that abort a request without any reply; the NAS retransmits.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    StorageError(#[from] StorageError),
    #[error(transparent)]
    AVPError(#[from] AVPError),
    #[error(transparent)]
    VSAError(#[from] VSAError),
    #[error(transparent)]
    EAPError(#[from] EAPError),
}

#[derive(Clone)]
pub struct RadiusHandler {
    storage: Arc<dyn Storage>,
    queue: Arc<AccountingQueue>,
    eap_sessions: Arc<EapSessions>,
    /// Held from reading a session to committing it, so concurrent accounting
    /// requests for one session can't both queue the same delta.
    accounting_lock: Arc<Mutex<()>>,
    server_identity: String,
}

impl RadiusHandler {
    pub fn new(
        storage: Arc<dyn Storage>,
        queue: Arc<AccountingQueue>,
        server_identity: &str,
        eap_state_ttl: Duration,
    ) -> Self {
        RadiusHandler {
            storage,
            queue,
            eap_sessions: Arc::new(EapSessions::new(eap_state_ttl)),
            accounting_lock: Arc::new(Mutex::new(())),
            server_identity: server_identity.to_owned(),
        }
    }

    pub fn eap_sessions(&self) -> &Arc<EapSessions> {
        &self.eap_sessions
    }

    /// Produces the reply for a decoded request, or `None` when the request has to be dropped.
    pub async fn dispatch(&self, request: &Packet) -> Option<Packet> {
        let result = match request.get_code() {
            Code::AccessRequest => auth::handle_access_request(self, request).await,
            Code::AccountingRequest => match lookup_acct_status_type(request) {
                Some(Ok(ACCT_STATUS_TYPE_START)) => accounting::start(self, request).await,
                Some(Ok(ACCT_STATUS_TYPE_INTERIM_UPDATE)) => {
                    accounting::update(self, request).await
                }
                Some(Ok(ACCT_STATUS_TYPE_STOP)) => accounting::stop(self, request).await,
                Some(Ok(status)) => {
                    debug!("no handler for Acct-Status-Type={}", status);
                    Ok(None)
                }
                Some(Err(e)) => Err(e.into()),
                None => {
                    info!("accounting request without Acct-Status-Type");
                    Ok(None)
                }
            },
            code => {
                debug!("no handler for {}", code.string());
                Ok(None)
            }
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    "failed to handle {} id={}; {}",
                    request.get_code().string(),
                    request.get_identifier(),
                    e
                );
                None
            }
        }
    }
}

/// Reply carrying a human readable Reply-Message.
pub(crate) fn reply_with_message(request: &Packet, code: Code, message: &str) -> Packet {
    let mut reply = request.make_response_packet(code);
    rfc2865::add_reply_message(&mut reply, message);
    reply
}

#[async_trait]
impl RequestHandler<(), io::Error> for RadiusHandler {
    async fn handle_radius_request(&self, conn: &UdpSocket, req: &Request) -> Result<(), io::Error> {
        match self.dispatch(req.get_packet()).await {
            Some(reply) => req.respond(conn, &reply).await,
            None => Ok(()),
        }
    }
}
