//! Accounting-Request handling: Start, Interim-Update and Stop.

use crate::accounting::queue::Usage;
use crate::core::avp::AVPError;
use crate::core::code::Code;
use crate::core::packet::Packet;
use crate::core::rfc2865;
use crate::core::rfc2866;
use crate::handler::validate::validate_accounting_request;
use crate::handler::{reply_with_message, HandlerError, RadiusHandler};
use crate::storage::{Session, SessionCounters, SessionKey};

/// Validates the request and extracts its session key; `None` means drop.
fn session_key(request: &Packet, stage: &str) -> Result<Option<SessionKey>, HandlerError> {
    if let Err(e) = validate_accounting_request(request) {
        info!("acct.{} dropped id={}; {}", stage, request.get_identifier(), e);
        return Ok(None);
    }

    let user = rfc2865::lookup_user_name(request).transpose()?;
    let session_id = rfc2866::lookup_acct_session_id(request).transpose()?;
    let nas_ip = rfc2865::lookup_nas_ip_address(request).transpose()?;
    match (user, session_id, nas_ip) {
        (Some(user), Some(session_id), Some(nas_ip)) => Ok(Some(SessionKey::new(
            &user,
            &session_id,
            &nas_ip.to_string(),
        ))),
        _ => {
            info!(
                "acct.{} dropped id={}; UserName/AcctSessionId/NasIPAddress missing",
                stage,
                request.get_identifier()
            );
            Ok(None)
        }
    }
}

fn counters(request: &Packet) -> Result<SessionCounters, HandlerError> {
    let read = |value: Option<Result<u32, AVPError>>| -> Result<u32, HandlerError> {
        Ok(value.transpose()?.unwrap_or(0))
    };
    Ok(SessionCounters {
        bytes_in: read(rfc2866::lookup_acct_input_octets(request))?,
        bytes_out: read(rfc2866::lookup_acct_output_octets(request))?,
        packets_in: read(rfc2866::lookup_acct_input_packets(request))?,
        packets_out: read(rfc2866::lookup_acct_output_packets(request))?,
        session_time: read(rfc2866::lookup_acct_session_time(request))?,
    })
}

/// Traffic since the counters were last stored; a NAS counter reset yields zero.
fn delta(session: &Session, reported: &SessionCounters) -> Usage {
    let last = &session.counters;
    Usage {
        in_octets: reported.bytes_in.saturating_sub(last.bytes_in),
        out_octets: reported.bytes_out.saturating_sub(last.bytes_out),
        in_packets: reported.packets_in.saturating_sub(last.packets_in),
        out_packets: reported.packets_out.saturating_sub(last.packets_out),
    }
}

pub(crate) async fn start(
    handler: &RadiusHandler,
    request: &Packet,
) -> Result<Option<Packet>, HandlerError> {
    let key = match session_key(request, "begin")? {
        Some(key) => key,
        None => return Ok(None),
    };
    let _guard = handler.accounting_lock.lock().await;
    let assigned_ip = match rfc2865::lookup_framed_ip_address(request).transpose()? {
        Some(ip) => ip,
        None => {
            info!("acct.begin missing FramedIPAddress user={}", key.user);
            return Ok(None);
        }
    };
    if handler.storage.get_user(&key.user).await?.is_none() {
        info!("acct.begin no such user {}", key.user);
        return Ok(None);
    }

    if handler.storage.session_exists(&key).await? {
        debug!("acct.begin duplicate session={} user={}", key.session_id, key.user);
    } else {
        let client_ip = rfc2865::lookup_calling_station_id(request)
            .transpose()?
            .unwrap_or_default();
        handler
            .storage
            .create_session(&key, assigned_ip, &client_ip)
            .await?;
        info!(
            "acct.begin user={} session={} ip={}",
            key.user, key.session_id, assigned_ip
        );
    }
    Ok(Some(request.make_response_packet(Code::AccountingResponse)))
}

async fn record_usage(
    handler: &RadiusHandler,
    request: &Packet,
    key: &SessionKey,
    stage: &str,
) -> Result<bool, HandlerError> {
    let reported = counters(request)?;
    let session = match handler.storage.get_session(key).await? {
        Some(session) => session,
        None => {
            info!(
                "acct.{} unknown session={} user={}",
                stage, key.session_id, key.user
            );
            return Ok(false);
        }
    };

    handler.queue.add(&key.user, &delta(&session, &reported));
    handler.storage.update_session(key, &reported).await?;
    Ok(true)
}

pub(crate) async fn update(
    handler: &RadiusHandler,
    request: &Packet,
) -> Result<Option<Packet>, HandlerError> {
    let key = match session_key(request, "update")? {
        Some(key) => key,
        None => return Ok(None),
    };
    let _guard = handler.accounting_lock.lock().await;
    if !record_usage(handler, request, &key, "update").await? {
        return Ok(None);
    }
    debug!("acct.update user={} session={}", key.user, key.session_id);
    Ok(Some(reply_with_message(
        request,
        Code::AccountingResponse,
        "Updated accounting.",
    )))
}

pub(crate) async fn stop(
    handler: &RadiusHandler,
    request: &Packet,
) -> Result<Option<Packet>, HandlerError> {
    let key = match session_key(request, "stop")? {
        Some(key) => key,
        None => return Ok(None),
    };
    let _guard = handler.accounting_lock.lock().await;
    if !record_usage(handler, request, &key, "stop").await? {
        return Ok(None);
    }
    handler.storage.archive_session(&key).await?;
    handler.storage.finish_session(&key).await?;
    info!("acct.stop user={} session={}", key.user, key.session_id);
    Ok(Some(reply_with_message(
        request,
        Code::AccountingResponse,
        "Finished accounting.",
    )))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::accounting::queue::{AccountingQueue, Usage};
    use crate::core::code::Code;
    use crate::core::packet::Packet;
    use crate::core::rfc2865;
    use crate::core::rfc2866;
    use crate::handler::RadiusHandler;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::{SessionKey, Storage, User};

    fn setup() -> (RadiusHandler, Arc<MemoryStorage>, Arc<AccountingQueue>) {
        let alice: User =
            serde_json::from_str(r#"{"name": "alice", "password": "pw"}"#).unwrap();
        let storage = Arc::new(MemoryStorage::new(vec![alice]));
        let queue = Arc::new(AccountingQueue::new());
        let handler = RadiusHandler::new(
            storage.clone(),
            queue.clone(),
            "radius@localhost",
            Duration::from_secs(60),
        );
        (handler, storage, queue)
    }

    fn request(user: &str, status: u32, octets: (u32, u32)) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, b"secret");
        rfc2865::add_user_name(&mut packet, user);
        rfc2865::add_nas_ip_address(&mut packet, &Ipv4Addr::new(10, 0, 0, 1));
        rfc2865::add_nas_identifier(&mut packet, "nas-1");
        rfc2865::add_nas_port(&mut packet, 3);
        rfc2865::add_nas_port_type(&mut packet, rfc2865::NAS_PORT_TYPE_VIRTUAL);
        rfc2865::add_framed_ip_address(&mut packet, &Ipv4Addr::new(192, 168, 0, 9));
        rfc2865::add_calling_station_id(&mut packet, "00-11-22-33-44-55");
        rfc2866::add_acct_status_type(&mut packet, status);
        rfc2866::add_acct_session_id(&mut packet, "sess-1");
        rfc2866::add_acct_input_octets(&mut packet, octets.0);
        rfc2866::add_acct_output_octets(&mut packet, octets.1);
        rfc2866::add_acct_input_packets(&mut packet, octets.0 / 100);
        rfc2866::add_acct_output_packets(&mut packet, octets.1 / 100);
        packet
    }

    fn key() -> SessionKey {
        SessionKey::new("alice", "sess-1", "10.0.0.1")
    }

    #[tokio::test]
    async fn it_should_run_session_lifecycle() {
        let (handler, storage, queue) = setup();

        for _ in 0..2 {
            let req = request("alice", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
            let reply = handler.dispatch(&req).await.unwrap();
            assert_eq!(reply.get_code(), Code::AccountingResponse);
            assert!(rfc2865::lookup_reply_message(&reply).is_none());
        }
        assert_eq!(storage.session_count().await, 1);
        let session = storage.get_session(&key()).await.unwrap().unwrap();
        assert_eq!(session.assigned_ip, Ipv4Addr::new(192, 168, 0, 9));
        assert_eq!(session.client_ip, "00-11-22-33-44-55");

        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_INTERIM_UPDATE, (1000, 2000));
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(
            rfc2865::lookup_reply_message(&reply).unwrap().unwrap(),
            "Updated accounting."
        );

        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_STOP, (1500, 2500));
        let reply = handler.dispatch(&req).await.unwrap();
        assert_eq!(
            rfc2865::lookup_reply_message(&reply).unwrap().unwrap(),
            "Finished accounting."
        );

        assert_eq!(storage.session_count().await, 0);
        let archived = storage.archived_sessions().await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].counters.bytes_in, 1500);

        let flushed = queue.flush();
        assert_eq!(
            flushed.get("alice"),
            Some(&Usage {
                in_octets: 1500,
                out_octets: 2500,
                in_packets: 15,
                out_packets: 25,
            })
        );
    }

    #[tokio::test]
    async fn it_should_drop_invalid_accounting_requests() {
        let (handler, storage, queue) = setup();

        let mut req = request("alice", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
        rfc2865::add_user_password(&mut req, b"pw").unwrap();
        assert!(handler.dispatch(&req).await.is_none());

        let mut req = request("alice", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
        req.delete(rfc2865::FRAMED_IP_ADDRESS_TYPE);
        assert!(handler.dispatch(&req).await.is_none());

        let req = request("mallory", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
        assert!(handler.dispatch(&req).await.is_none());

        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_STOP, (10, 10));
        assert!(handler.dispatch(&req).await.is_none());

        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_ACCOUNTING_ON, (0, 0));
        assert!(handler.dispatch(&req).await.is_none());

        assert_eq!(storage.session_count().await, 0);
        assert!(queue.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn it_should_count_concurrent_updates_once() {
        let (handler, storage, queue) = setup();
        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
        handler.dispatch(&req).await.unwrap();

        // the same Interim-Update arriving on several listeners at once
        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let req =
                        request("alice", rfc2866::ACCT_STATUS_TYPE_INTERIM_UPDATE, (1000, 2000));
                    handler.dispatch(&req).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_some());
        }
        assert_eq!(queue.flush().get("alice").unwrap().total_octets(), 3000);

        let stops: Vec<_> = (0..4)
            .map(|_| {
                let handler = handler.clone();
                tokio::spawn(async move {
                    let req = request("alice", rfc2866::ACCT_STATUS_TYPE_STOP, (1500, 2000));
                    handler.dispatch(&req).await
                })
            })
            .collect();
        let mut answered = 0;
        for task in stops {
            if task.await.unwrap().is_some() {
                answered += 1;
            }
        }
        assert_eq!(answered, 1);
        assert_eq!(storage.archived_sessions().await.len(), 1);
        assert_eq!(queue.flush().get("alice").unwrap().total_octets(), 500);
    }

    #[tokio::test]
    async fn it_should_not_queue_negative_deltas() {
        let (handler, _, queue) = setup();
        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_START, (0, 0));
        handler.dispatch(&req).await.unwrap();

        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_INTERIM_UPDATE, (5000, 5000));
        handler.dispatch(&req).await.unwrap();
        queue.flush();

        // counters went backwards after a NAS reboot
        let req = request("alice", rfc2866::ACCT_STATUS_TYPE_INTERIM_UPDATE, (100, 100));
        handler.dispatch(&req).await.unwrap();
        assert_eq!(queue.flush().get("alice").unwrap().total_octets(), 0);
    }
}
