use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::core::packet::Packet;

/// A request that passed the listener's checks, and the NAS it came from.
pub struct Request {
    remote_addr: SocketAddr,
    packet: Packet,
}

impl Request {
    pub fn new(remote_addr: SocketAddr, packet: Packet) -> Self {
        Request {
            remote_addr,
            packet,
        }
    }

    pub fn get_remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn get_packet(&self) -> &Packet {
        &self.packet
    }

    /// Encodes `reply` and sends it back to the NAS through the listener's socket.
    pub async fn respond(&self, conn: &UdpSocket, reply: &Packet) -> Result<(), io::Error> {
        if reply.get_identifier() != self.packet.get_identifier() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "reply id={} doesn't answer request id={}",
                    reply.get_identifier(),
                    self.packet.get_identifier()
                ),
            ));
        }
        let bs = reply
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        trace!(
            "{} id={} to {} => {:02x?}",
            reply.get_code().string(),
            reply.get_identifier(),
            self.remote_addr,
            bs
        );
        conn.send_to(&bs, self.remote_addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::net::UdpSocket;

    use crate::core::code::Code;
    use crate::core::packet::Packet;
    use crate::core::request::Request;
    use crate::core::rfc2865;

    #[tokio::test]
    async fn it_should_respond_to_the_nas() -> Result<(), io::Error> {
        let server = UdpSocket::bind("127.0.0.1:0").await?;
        let nas = UdpSocket::bind("127.0.0.1:0").await?;

        let packet = Packet::new(Code::AccessRequest, b"secret");
        let request = Request::new(nas.local_addr()?, packet.clone());
        let mut reply = packet.make_response_packet(Code::AccessAccept);
        rfc2865::add_reply_message(&mut reply, "welcome");
        request.respond(&server, &reply).await?;

        let mut buf = [0; 4096];
        let (len, from) = nas.recv_from(&mut buf).await?;
        assert_eq!(from, server.local_addr()?);
        let received = Packet::decode_response(&buf[..len], &packet).unwrap();
        assert_eq!(received.get_code(), Code::AccessAccept);
        assert_eq!(rfc2865::lookup_reply_message(&received).unwrap().unwrap(), "welcome");
        Ok(())
    }

    #[tokio::test]
    async fn it_should_refuse_a_reply_to_another_request() -> Result<(), io::Error> {
        let server = UdpSocket::bind("127.0.0.1:0").await?;
        let packet = Packet::new_with_identifier(Code::AccessRequest, b"secret", 1);
        let request = Request::new(server.local_addr()?, packet.clone());

        let mut reply = packet.make_response_packet(Code::AccessReject);
        reply.set_identifier(2);
        let err = request.respond(&server, &reply).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        Ok(())
    }
}
