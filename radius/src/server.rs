use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::{IpNetwork, IpNetworkError};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::core::packet::{Packet, PacketError};
use crate::core::request::Request;

const DEFAULT_BUFFER_SIZE: usize = 4096;
const DEFAULT_SKIP_AUTHENTICITY_VALIDATION: bool = false;

/// A RADIUS listener bound to one UDP socket.
///
/// Datagrams are processed strictly one after another: the next datagram is read only
/// once the handler for the previous one has returned. Run several `Server`s to serve
/// several sockets in parallel.
pub struct Server<X, E: Debug, T: RequestHandler<X, E>, U: SecretProvider> {
    skip_authenticity_validation: bool,
    buf_size: usize,
    conn: UdpSocket,
    request_handler: Arc<T>,
    secret_provider: Arc<U>,
    _phantom_return_type: PhantomData<X>,
    _phantom_error_type: PhantomData<E>,
}

impl<X, E: Debug, T: RequestHandler<X, E>, U: SecretProvider> Server<X, E, T, U> {
    // `listen()` binds the socket and `run()` serves it, so that a caller knows the listener
    // is ready (e.g. to read the bound port) before it starts awaiting the loop.

    /// Starts UDP listening for the RADIUS server.
    ///
    /// ## Parameters
    ///
    /// - `addr` - an address to listen (e.g. `0.0.0.0:1812`)
    /// - `request_handler` - a request handler for the RADIUS requests.
    /// - `secret_provider` - a provider for shared-secret value.
    pub async fn listen(
        addr: &str,
        request_handler: T,
        secret_provider: U,
    ) -> Result<Self, io::Error> {
        let conn = UdpSocket::bind(addr).await?;

        Ok(Server {
            skip_authenticity_validation: DEFAULT_SKIP_AUTHENTICITY_VALIDATION,
            buf_size: DEFAULT_BUFFER_SIZE,
            conn,
            request_handler: Arc::new(request_handler),
            secret_provider: Arc::new(secret_provider),
            _phantom_return_type: Default::default(),
            _phantom_error_type: Default::default(),
        })
    }

    /// Starts the RADIUS requests handling.
    ///
    /// `shutdown_trigger` is only observed while waiting for a datagram, so a request that
    /// is being handled always completes.
    pub async fn run(&mut self, shutdown_trigger: impl Future) -> Result<(), io::Error> {
        tokio::pin!(shutdown_trigger);
        let mut buf: Vec<u8> = vec![Default::default(); self.buf_size];

        loop {
            let (size, remote_addr) = tokio::select! {
                res = self.conn.recv_from(&mut buf) => res?,
                _ = &mut shutdown_trigger => {
                    info!("server {} is shutting down", self.conn.local_addr()?);
                    return Ok(());
                }
            };
            self.process_request(&buf[..size], remote_addr).await;
        }
    }

    /// Set a buffer size for receiving the request payload (default: `4096`).
    pub fn set_buffer_size(&mut self, buf_size: usize) {
        self.buf_size = buf_size;
    }

    /// Set a flag to specify whether to skip the authenticity validation or not (default: `false`).
    pub fn set_skip_authenticity_validation(&mut self, skip_authenticity_validation: bool) {
        self.skip_authenticity_validation = skip_authenticity_validation;
    }

    /// Returns the listening address.
    pub fn get_listen_address(&self) -> io::Result<SocketAddr> {
        self.conn.local_addr()
    }

    async fn process_request(&self, request_data: &[u8], remote_addr: SocketAddr) {
        let secret: Vec<u8> = match self.secret_provider.fetch_secret(remote_addr) {
            Ok(secret) => secret,
            Err(SecretProviderError::UnauthorizedClientError(addr)) => {
                warn!("request dropped for client outside the allowlist; {}", addr);
                return;
            }
            Err(e) => {
                error!(
                    "failed to fetch secret binary vector from the secret provider; {}",
                    e
                );
                return;
            }
        };
        if secret.is_empty() {
            error!("empty secret returned from secret source; empty secret is prohibited");
            return;
        }

        if !self.skip_authenticity_validation
            && !Packet::is_authentic_request(request_data, &secret)
        {
            warn!(
                "request authenticator mismatch from {}; bad secret?",
                remote_addr
            );
            return;
        }

        let packet = match Packet::decode(request_data, &secret) {
            Ok(packet) => packet,
            Err(PacketError::MessageAuthenticatorMismatchError()) => {
                warn!("message-authenticator mismatch from {}", remote_addr);
                return;
            }
            Err(e) => {
                info!("failed to decode request from {}; {}", remote_addr, e);
                trace!("failed request data => {:02x?}", request_data);
                return;
            }
        };
        if !packet.get_code().is_request() {
            debug!(
                "ignoring {} from {}",
                packet.get_code().string(),
                remote_addr
            );
            return;
        }
        trace!(
            "{} id={} from {} => {:02x?}",
            packet.get_code().string(),
            packet.get_identifier(),
            remote_addr,
            request_data
        );

        if let Err(e) = self
            .request_handler
            .handle_radius_request(&self.conn, &Request::new(remote_addr, packet))
            .await
        {
            error!("failed to handle request from {}; {:?}", remote_addr, e);
        }
    }
}

/// RequestHandler is a handler for the received RADIUS request.
#[async_trait]
pub trait RequestHandler<T, E>: 'static + Sync + Send {
    /// This method has to implement the core feature of the server application what you need.
    ///
    /// # Arguments
    ///
    /// * conn - This connection is associated with the remote requester. In the most situations,
    ///          you have to send a response through this connection object.
    /// * request - This is a request object that comes from the remote requester.
    async fn handle_radius_request(&self, conn: &UdpSocket, request: &Request) -> Result<T, E>;
}

#[derive(Error, Debug)]
pub enum SecretProviderError {
    /// An error that represents a failure to fetch a secret value from the provider.
    #[error("failed to fetch a secret value: {0}")]
    FailedFetchingError(String),
    /// The remote address is not allowed to talk to this listener.
    #[error("unauthorized client: {0}")]
    UnauthorizedClientError(SocketAddr),
    /// An error that represents a generic (i.e. unclassified) error that occurs on the secret value provider.
    #[error("unexpected error: {0}")]
    GenericError(String),
}

/// SecretProvider is a provider for secret value.
pub trait SecretProvider: 'static + Sync + Send {
    /// This method has to implement the generator of the shared-secret value to verify the request.
    fn fetch_secret(&self, remote_addr: SocketAddr) -> Result<Vec<u8>, SecretProviderError>;
}

/// One shared secret for every client inside the allowlist. An empty allowlist admits nobody.
pub struct CidrSecretProvider {
    secret: Vec<u8>,
    allowlist: Vec<IpNetwork>,
}

impl CidrSecretProvider {
    pub fn new<S: AsRef<str>>(secret: &[u8], cidrs: &[S]) -> Result<Self, IpNetworkError> {
        let allowlist = cidrs
            .iter()
            .map(|cidr| cidr.as_ref().parse::<IpNetwork>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CidrSecretProvider {
            secret: secret.to_vec(),
            allowlist,
        })
    }

    pub fn is_allowed(&self, remote_addr: &SocketAddr) -> bool {
        self.allowlist
            .iter()
            .any(|network| network.contains(remote_addr.ip()))
    }
}

impl SecretProvider for CidrSecretProvider {
    fn fetch_secret(&self, remote_addr: SocketAddr) -> Result<Vec<u8>, SecretProviderError> {
        if !self.is_allowed(&remote_addr) {
            return Err(SecretProviderError::UnauthorizedClientError(remote_addr));
        }
        Ok(self.secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::server::{CidrSecretProvider, SecretProvider, SecretProviderError};

    #[test]
    fn it_should_admit_only_allowlisted_clients() {
        let provider =
            CidrSecretProvider::new(b"secret", &["10.0.0.0/8", "192.168.1.1/32"]).unwrap();

        let inside: SocketAddr = "10.20.30.40:5000".parse().unwrap();
        assert_eq!(provider.fetch_secret(inside).unwrap(), b"secret".to_vec());
        assert!(provider.is_allowed(&"192.168.1.1:1".parse().unwrap()));

        let outside: SocketAddr = "192.168.1.2:5000".parse().unwrap();
        match provider.fetch_secret(outside) {
            Err(SecretProviderError::UnauthorizedClientError(addr)) => assert_eq!(addr, outside),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn it_should_deny_everyone_with_empty_allowlist() {
        let provider = CidrSecretProvider::new::<&str>(b"secret", &[]).unwrap();
        assert!(!provider.is_allowed(&"127.0.0.1:1812".parse().unwrap()));
    }

    #[test]
    fn it_should_refuse_bad_cidr() {
        assert!(CidrSecretProvider::new(b"secret", &["10.0.0.0/33"]).is_err());
        assert!(CidrSecretProvider::new(b"secret", &["localhost"]).is_err());
    }
}
