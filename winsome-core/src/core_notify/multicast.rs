//! Reward announcements over UDP multicast

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};
use tokio::net::UdpSocket;

use super::errors::NotifyError;

/// Payload of every reward datagram
pub const REWARD_MESSAGE: &str = "WinCoins awarded";

/// Sends best-effort datagrams to one group
#[derive(Debug)]
pub struct MulticastNotifier {
    socket: UdpSocket,
    target: SocketAddr,
}

impl MulticastNotifier {
    pub async fn bind(target: SocketAddr) -> Result<Self, NotifyError> {
        let local = match target {
            SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            SocketAddr::V6(_) => SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0)),
        };
        let socket = UdpSocket::bind(local).await?;
        if target.is_ipv4() && target.ip().is_multicast() {
            socket.set_multicast_ttl_v4(1)?;
        }
        Ok(MulticastNotifier { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub async fn announce_rewards(&self) -> Result<(), NotifyError> {
        self.socket.send_to(REWARD_MESSAGE.as_bytes(), self.target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_datagram_reaches_listener() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let notifier = MulticastNotifier::bind(receiver.local_addr().unwrap()).await.unwrap();

        notifier.announce_rewards().await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], REWARD_MESSAGE.as_bytes());
    }
}
