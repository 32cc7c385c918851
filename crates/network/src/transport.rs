//! Transport UDP vers le serveur de conférence
//!
//! Ce module implémente le transport réseau bas niveau utilisant UDP avec tokio.
//! Le socket est "connecté" au serveur : il n'accepte que les datagrammes de
//! cette adresse et les erreurs ICMP remontent sous forme d'erreurs IO.
//!
//! # Architecture
//! - Socket UDP tokio partagé via `Arc` (envoi et réception depuis la même tâche
//!   ou depuis plusieurs tâches sans verrou)
//! - Sérialisation bincode, validation de version et de checksum
//! - Statistiques temps réel pour monitoring, sous verrou synchrone : aucun
//!   point d'attente après la lecture du socket

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::{NetworkConfig, NetworkError, NetworkPacket, NetworkResult, NetworkStats};

/// Transport UDP client, clonable à faible coût
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,

    /// Adresse résolue du serveur
    server_addr: SocketAddr,

    /// Statistiques réseau
    stats: Arc<Mutex<NetworkStats>>,
}

impl UdpTransport {
    /// Résout l'adresse du serveur, bind un socket local et le connecte
    ///
    /// # Erreurs
    /// - `NetworkError::InvalidAddress` : nom d'hôte irrésoluble
    /// - `NetworkError::BindError` : port local indisponible
    pub async fn connect(server: &str, port: u16, config: &NetworkConfig) -> NetworkResult<Self> {
        let server_addr = lookup_host((server, port))
            .await
            .map_err(|e| NetworkError::InvalidAddress { addr: format!("{}:{} ({})", server, port, e) })?
            .next()
            .ok_or_else(|| NetworkError::InvalidAddress { addr: format!("{}:{}", server, port) })?;

        // Même famille d'adresse que le serveur
        let local_addr: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], config.local_port))
        } else {
            SocketAddr::from(([0u16; 8], config.local_port))
        };

        let socket = UdpSocket::bind(local_addr)
            .await
            .map_err(|e| NetworkError::bind_failed(config.local_port, e))?;
        socket.connect(server_addr).await?;

        debug!(local = ?socket.local_addr().ok(), server = %server_addr, "Transport UDP prêt");

        Ok(Self {
            socket: Arc::new(socket),
            server_addr,
            stats: Arc::new(Mutex::new(NetworkStats::new())),
        })
    }

    /// Sérialise un paquet en bytes pour transmission
    ///
    /// Recalcule le checksum avant sérialisation.
    pub fn encode_packet(packet: &NetworkPacket) -> NetworkResult<Vec<u8>> {
        let mut packet = packet.clone();
        packet.send_timestamp = Instant::now();
        packet.checksum = packet.calculate_checksum();

        let data = bincode::serialize(&packet)?;
        if data.len() > NetworkPacket::MAX_PACKET_SIZE {
            return Err(NetworkError::packet_too_large(data.len(), NetworkPacket::MAX_PACKET_SIZE));
        }
        Ok(data)
    }

    /// Désérialise des bytes en paquet
    ///
    /// Valide automatiquement le checksum et la version du protocole.
    pub fn decode_packet(data: &[u8], source_addr: SocketAddr) -> NetworkResult<NetworkPacket> {
        let packet: NetworkPacket = bincode::deserialize(data)
            .map_err(|_| NetworkError::InvalidPacketFormat { addr: source_addr })?;

        if packet.protocol_version != NetworkPacket::CURRENT_PROTOCOL_VERSION {
            return Err(NetworkError::InvalidPacketFormat { addr: source_addr });
        }

        if !packet.verify_checksum() {
            return Err(NetworkError::corrupted_packet(source_addr));
        }

        Ok(packet)
    }

    /// Envoie un paquet au serveur
    ///
    /// Aucun timeout : un datagramme UDP part ou échoue immédiatement.
    pub async fn send(&self, packet: &NetworkPacket) -> NetworkResult<()> {
        let data = Self::encode_packet(packet)?;
        let sent = self.socket.send(&data).await?;

        if sent != data.len() {
            return Err(NetworkError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Envoi incomplet",
            )));
        }

        let mut stats = self.lock_stats();
        stats.packets_sent += 1;
        stats.last_updated = Instant::now();
        Ok(())
    }

    /// Reçoit le prochain paquet valide du serveur
    ///
    /// Annulable sans perte : peut servir de branche de `tokio::select!`.
    pub async fn recv(&self) -> NetworkResult<NetworkPacket> {
        let mut buffer = [0u8; 2048];
        let received = self.socket.recv(&mut buffer).await?;

        let decoded = Self::decode_packet(&buffer[..received], self.server_addr);
        let mut stats = self.lock_stats();
        match decoded {
            Ok(packet) => {
                stats.packets_received += 1;
                stats.last_updated = Instant::now();
                Ok(packet)
            }
            Err(e) => {
                stats.packets_corrupted += 1;
                Err(e)
            }
        }
    }

    /// Reçoit un paquet avec un délai maximum
    pub async fn recv_timeout(&self, wait: Duration) -> NetworkResult<NetworkPacket> {
        match timeout(wait, self.recv()).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout),
        }
    }

    /// Retourne les statistiques courantes
    pub fn stats(&self) -> NetworkStats {
        self.lock_stats().clone()
    }

    fn lock_stats(&self) -> MutexGuard<'_, NetworkStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelInfo, PacketPayload};

    #[tokio::test]
    async fn test_send_and_receive_with_local_peer() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let transport = UdpTransport::connect("127.0.0.1", server_addr.port(), &NetworkConfig::test_config())
            .await
            .unwrap();

        transport.send(&NetworkPacket::handshake("bot", None)).await.unwrap();

        let mut buffer = [0u8; 2048];
        let (len, client_addr) = server.recv_from(&mut buffer).await.unwrap();
        let hello = UdpTransport::decode_packet(&buffer[..len], client_addr).unwrap();
        assert_eq!(
            hello.payload,
            PacketPayload::Handshake { username: "bot".to_string(), password: None }
        );

        let ack = NetworkPacket::new(0, PacketPayload::HandshakeAck {
            session_id: 9,
            channels: vec![ChannelInfo::new(0, "Root")],
        });
        server.send_to(&UdpTransport::encode_packet(&ack).unwrap(), client_addr).await.unwrap();

        let received = transport.recv_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(received.payload, ack.payload);

        let stats = transport.stats();
        assert_eq!(stats.packets_sent, 1);
        assert_eq!(stats.packets_received, 1);
    }

    #[tokio::test]
    async fn test_corrupted_datagram_is_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let transport = UdpTransport::connect("127.0.0.1", server_addr.port(), &NetworkConfig::test_config())
            .await
            .unwrap();

        transport.send(&NetworkPacket::heartbeat(0)).await.unwrap();
        let mut buffer = [0u8; 2048];
        let (_, client_addr) = server.recv_from(&mut buffer).await.unwrap();

        let mut packet = NetworkPacket::move_to(1, 2);
        packet.checksum ^= 0xFFFF;
        server.send_to(&bincode::serialize(&packet).unwrap(), client_addr).await.unwrap();

        let result = transport.recv_timeout(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(NetworkError::CorruptedPacket { .. })));
        assert_eq!(transport.stats().packets_corrupted, 1);
    }

    #[tokio::test]
    async fn test_cancelled_receives_lose_no_datagram() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::connect(
            "127.0.0.1",
            server.local_addr().unwrap().port(),
            &NetworkConfig::test_config(),
        )
        .await
        .unwrap();

        transport.send(&NetworkPacket::heartbeat(0)).await.unwrap();
        let mut buffer = [0u8; 2048];
        let (_, client_addr) = server.recv_from(&mut buffer).await.unwrap();

        for channel_id in 0..20 {
            let data = UdpTransport::encode_packet(&NetworkPacket::move_to(1, channel_id)).unwrap();
            server.send_to(&data, client_addr).await.unwrap();
        }

        // Réceptions interrompues au plus tôt, comme une branche de select! perdante
        let mut received = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(3);
        while received.len() < 20 && Instant::now() < deadline {
            tokio::select! {
                biased;
                result = transport.recv() => received.push(result.unwrap().payload),
                _ = tokio::task::yield_now() => {}
            }
        }

        let expected: Vec<PacketPayload> =
            (0..20).map(|channel_id| PacketPayload::Move { channel_id }).collect();
        assert_eq!(received, expected);
        assert_eq!(transport.stats().packets_received, 20);
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::connect(
            "127.0.0.1",
            server.local_addr().unwrap().port(),
            &NetworkConfig::test_config(),
        )
        .await
        .unwrap();

        let result = transport.recv_timeout(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(NetworkError::Timeout)));
    }

    #[test]
    fn test_oversized_packet_is_refused() {
        let frame = audio::CompressedFrame::new(vec![0u8; 2000], 960, 1);
        let packet = NetworkPacket::audio(1, "", frame);
        assert!(matches!(
            UdpTransport::encode_packet(&packet),
            Err(NetworkError::PacketTooLarge { .. })
        ));
    }
}
