//! Types de données pour le système networking
//!
//! Ce module définit les structures principales échangées entre le client
//! vocal et le serveur de conférence :
//! - NetworkPacket : paquet UDP (handshake, annuaire, audio, heartbeat...)
//! - ChannelInfo / ConnectParams / RemoteSound : vue du client par le relais
//! - ConnectionState : états de la session
//! - NetworkConfig : configuration du système réseau
//! - NetworkStats : compteurs de la session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use audio::CompressedFrame;

/// Identifiant du canal racine du serveur
pub const ROOT_CHANNEL_ID: u32 = 0;

/// Canal du serveur tel qu'annoncé dans l'annuaire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: u32,
    pub name: String,
}

impl ChannelInfo {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Paramètres d'ouverture de session
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Nom d'hôte ou adresse IP du serveur
    pub server: String,
    pub port: u16,
    pub username: String,

    /// Transmis tel quel au serveur, jamais journalisé
    pub password: Option<String>,
}

impl ConnectParams {
    pub fn new(server: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            username: username.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Adresse "hôte:port" pour les logs et la résolution DNS
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// PCM tel que livré par le client pour un participant distant
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PcmPayload {
    /// Bytes little-endian 16 bits, mono
    Bytes(Vec<u8>),

    /// Échantillons 16 bits entrelacés sur `channels` canaux
    Samples { samples: Vec<i16>, channels: u16 },
}

/// Audio décodé d'un participant distant
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSound {
    /// Nom de l'utilisateur qui parle
    pub sender: String,
    pub pcm: PcmPayload,
}

/// Contenu d'un paquet réseau
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PacketPayload {
    /// Ouverture de session (client → serveur)
    Handshake { username: String, password: Option<String> },

    /// Session acceptée, avec l'annuaire des canaux (serveur → client)
    HandshakeAck { session_id: u32, channels: Vec<ChannelInfo> },

    /// Session refusée (serveur → client)
    HandshakeReject { reason: String },

    /// Nouvel annuaire des canaux (serveur → client)
    ChannelList { channels: Vec<ChannelInfo> },

    /// Demande de changement de canal (client → serveur)
    Move { channel_id: u32 },

    /// Frame Opus ; `sender` est vide dans le sens client → serveur
    Audio { sender: String, frame: CompressedFrame },

    /// Keep-alive, dans les deux sens
    Heartbeat,

    /// Fermeture propre de la session, dans les deux sens
    Disconnect,
}

impl PacketPayload {
    /// Type du paquet, utilisé dans le checksum et les logs
    pub fn packet_type(&self) -> PacketType {
        match self {
            PacketPayload::Handshake { .. } => PacketType::Handshake,
            PacketPayload::HandshakeAck { .. } => PacketType::HandshakeAck,
            PacketPayload::HandshakeReject { .. } => PacketType::HandshakeReject,
            PacketPayload::ChannelList { .. } => PacketType::ChannelList,
            PacketPayload::Move { .. } => PacketType::Move,
            PacketPayload::Audio { .. } => PacketType::Audio,
            PacketPayload::Heartbeat => PacketType::Heartbeat,
            PacketPayload::Disconnect => PacketType::Disconnect,
        }
    }

    fn fold_checksum(&self, checksum: u32) -> u32 {
        match self {
            PacketPayload::Handshake { username, password } => {
                let checksum = fold_bytes(checksum, username.as_bytes());
                match password {
                    Some(password) => fold_bytes(checksum.rotate_left(7), password.as_bytes()),
                    None => checksum,
                }
            }
            PacketPayload::HandshakeAck { session_id, channels } => {
                fold_channels(checksum ^ session_id, channels)
            }
            PacketPayload::HandshakeReject { reason } => fold_bytes(checksum, reason.as_bytes()),
            PacketPayload::ChannelList { channels } => fold_channels(checksum, channels),
            PacketPayload::Move { channel_id } => checksum ^ channel_id,
            PacketPayload::Audio { sender, frame } => {
                let mut checksum = fold_bytes(checksum, sender.as_bytes());
                checksum ^= frame.sequence_number as u32;
                checksum ^= frame.original_sample_count as u32;
                fold_bytes(checksum.rotate_left(11), &frame.data)
            }
            PacketPayload::Heartbeat | PacketPayload::Disconnect => checksum,
        }
    }
}

/// XOR des bytes par mots de 32 bits, longueur incluse
fn fold_bytes(mut checksum: u32, data: &[u8]) -> u32 {
    checksum ^= data.len() as u32;
    for chunk in data.chunks(4) {
        let mut bytes = [0u8; 4];
        bytes[..chunk.len()].copy_from_slice(chunk);
        checksum ^= u32::from_le_bytes(bytes);
    }
    checksum
}

fn fold_channels(mut checksum: u32, channels: &[ChannelInfo]) -> u32 {
    for channel in channels {
        checksum = fold_bytes(checksum.rotate_left(5) ^ channel.id, channel.name.as_bytes());
    }
    checksum
}

/// Paquet réseau échangé avec le serveur
///
/// Structure du paquet :
/// - Header : version, session, checksum
/// - Payload : contrôle (quelques dizaines de bytes) ou frame Opus (80-200 bytes)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkPacket {
    /// Version du protocole pour compatibilité future
    pub protocol_version: u8,

    /// ID de session attribué par le serveur (0 avant le handshake)
    pub session_id: u32,

    pub payload: PacketPayload,

    /// Timestamp local, non sérialisé car Instant n'est pas portable
    #[serde(skip, default = "Instant::now")]
    pub send_timestamp: Instant,

    /// Checksum simple pour détecter la corruption
    pub checksum: u32,
}

impl NetworkPacket {
    /// Version actuelle du protocole
    pub const CURRENT_PROTOCOL_VERSION: u8 = 2;

    /// Taille maximum autorisée pour un paquet (MTU safe)
    pub const MAX_PACKET_SIZE: usize = 1400;

    /// Crée un paquet et calcule son checksum
    ///
    /// # Example
    /// ```rust
    /// use network::{NetworkPacket, PacketPayload, PacketType};
    ///
    /// let packet = NetworkPacket::new(42, PacketPayload::Move { channel_id: 3 });
    /// assert_eq!(packet.packet_type(), PacketType::Move);
    /// assert!(packet.verify_checksum());
    /// ```
    pub fn new(session_id: u32, payload: PacketPayload) -> Self {
        let mut packet = Self {
            protocol_version: Self::CURRENT_PROTOCOL_VERSION,
            session_id,
            payload,
            send_timestamp: Instant::now(),
            checksum: 0,
        };

        packet.checksum = packet.calculate_checksum();
        packet
    }

    /// Crée le paquet d'ouverture de session
    pub fn handshake(username: &str, password: Option<&str>) -> Self {
        Self::new(0, PacketPayload::Handshake {
            username: username.to_string(),
            password: password.map(str::to_string),
        })
    }

    /// Crée un paquet audio
    pub fn audio(session_id: u32, sender: &str, frame: CompressedFrame) -> Self {
        Self::new(session_id, PacketPayload::Audio {
            sender: sender.to_string(),
            frame,
        })
    }

    /// Crée un paquet heartbeat (keep-alive)
    pub fn heartbeat(session_id: u32) -> Self {
        Self::new(session_id, PacketPayload::Heartbeat)
    }

    /// Crée un paquet de changement de canal
    pub fn move_to(session_id: u32, channel_id: u32) -> Self {
        Self::new(session_id, PacketPayload::Move { channel_id })
    }

    /// Crée un paquet de fermeture de session
    pub fn disconnect(session_id: u32) -> Self {
        Self::new(session_id, PacketPayload::Disconnect)
    }

    pub fn packet_type(&self) -> PacketType {
        self.payload.packet_type()
    }

    /// Calcule un checksum simple pour détecter les erreurs
    ///
    /// Utilise un XOR des champs et des bytes du payload (simple mais
    /// suffisant pour UDP)
    pub fn calculate_checksum(&self) -> u32 {
        let mut checksum = 0u32;
        checksum ^= self.protocol_version as u32;
        checksum ^= (self.packet_type() as u32) << 8;
        checksum ^= self.session_id;
        self.payload.fold_checksum(checksum)
    }

    /// Vérifie l'intégrité du paquet
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.calculate_checksum()
    }

}

/// Types de paquets réseau
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PacketType {
    Audio = 1,
    Heartbeat = 2,
    Handshake = 3,
    Disconnect = 4,
    HandshakeAck = 5,
    HandshakeReject = 6,
    ChannelList = 7,
    Move = 8,
}

/// États de la session avec le serveur
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionState {
    /// Aucune session active
    Disconnected,

    /// Handshake en cours
    Connecting {
        server: String,
        started_at: Instant,
        attempt_count: u32,
    },

    /// Session établie et active
    Connected {
        server: String,
        session_id: u32,
        connected_at: Instant,
    },

    /// Erreur de connexion
    Error {
        last_error: String,
        failed_at: Instant,
        can_retry: bool,
    },
}

impl ConnectionState {
    /// Vérifie si on est connecté
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Récupère le session ID si connecté
    pub fn session_id(&self) -> Option<u32> {
        match self {
            ConnectionState::Connected { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// Description textuelle de l'état pour les logs
    pub fn description(&self) -> String {
        match self {
            ConnectionState::Disconnected => "Déconnecté".to_string(),
            ConnectionState::Connecting { server, attempt_count, .. } => {
                format!("Connexion vers {} (tentative {})", server, attempt_count)
            }
            ConnectionState::Connected { server, session_id, .. } => {
                format!("Connecté à {} (session {})", server, session_id)
            }
            ConnectionState::Error { last_error, can_retry, .. } => {
                if *can_retry {
                    format!("Erreur (retry possible): {}", last_error)
                } else {
                    format!("Erreur fatale: {}", last_error)
                }
            }
        }
    }
}

/// Configuration du système réseau
///
/// Permet d'ajuster les délais selon l'environnement (LAN vs WAN).
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Port local du socket client (0 = port éphémère)
    pub local_port: u16,

    /// Capacité de la file d'envoi (audio et demandes de canal)
    pub outbound_queue_size: usize,

    /// Timeout du handshake (défaut: 5s)
    pub connection_timeout: Duration,

    /// Intervalle entre les heartbeats (défaut: 1s)
    pub heartbeat_interval: Duration,

    /// Durée max sans nouvelles du serveur avant reconnexion (défaut: 5s)
    pub heartbeat_timeout: Duration,

    /// Nombre maximum de tentatives de (re)connexion (`None` = sans limite)
    pub max_retry_attempts: Option<u32>,

    /// Délai avant la première nouvelle tentative (défaut: 2s)
    pub retry_delay: Duration,

    /// Plafond du délai, qui double à chaque échec (défaut: 30s)
    pub max_retry_delay: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            local_port: 0,
            outbound_queue_size: 50,   // ~1s d'audio
            connection_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(5),
            max_retry_attempts: None,
            retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl NetworkConfig {
    /// Configuration pour tests (paramètres accélérés)
    pub fn test_config() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(100),
            heartbeat_timeout: Duration::from_millis(500),
            connection_timeout: Duration::from_millis(1000),
            max_retry_attempts: Some(2),
            retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(400),
            ..Default::default()
        }
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_queue_size == 0 {
            return Err("outbound_queue_size doit être > 0".to_string());
        }
        if self.max_retry_attempts == Some(0) {
            return Err("max_retry_attempts doit être >= 1".to_string());
        }
        if self.max_retry_delay < self.retry_delay {
            return Err(format!(
                "max_retry_delay ({:?}) doit être >= retry_delay ({:?})",
                self.max_retry_delay, self.retry_delay
            ));
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            return Err(format!(
                "heartbeat_timeout ({:?}) doit dépasser heartbeat_interval ({:?})",
                self.heartbeat_timeout, self.heartbeat_interval
            ));
        }
        Ok(())
    }
}

/// Statistiques réseau de la session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Nombre de paquets envoyés
    pub packets_sent: u64,

    /// Nombre de paquets reçus
    pub packets_received: u64,

    /// Nombre de paquets corrompus (checksum ou format invalide)
    pub packets_corrupted: u64,

    /// Frames sortantes abandonnées (file d'envoi pleine)
    pub frames_dropped: u64,

    /// Frames entrantes que le codec n'a pas pu décoder
    pub decode_errors: u64,

    /// Nombre de reconnexions réussies
    pub reconnection_count: u32,

    /// Dernière mise à jour des stats
    #[serde(skip, default = "Instant::now")]
    pub last_updated: Instant,
}

// Implementation manuelle de Default nécessaire car Instant n'implémente pas Default
impl Default for NetworkStats {
    fn default() -> Self {
        Self {
            packets_sent: 0,
            packets_received: 0,
            packets_corrupted: 0,
            frames_dropped: 0,
            decode_errors: 0,
            reconnection_count: 0,
            last_updated: Instant::now(),
        }
    }
}

impl NetworkStats {
    /// Crée de nouvelles statistiques
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_packet_creation() {
        let frame = CompressedFrame::new(vec![1, 2, 3, 4], 960, 42);
        let packet = NetworkPacket::audio(456, "alice", frame.clone());

        assert_eq!(packet.protocol_version, NetworkPacket::CURRENT_PROTOCOL_VERSION);
        assert_eq!(packet.packet_type(), PacketType::Audio);
        assert_eq!(packet.session_id, 456);
        match packet.payload {
            PacketPayload::Audio { sender, frame: carried } => {
                assert_eq!(sender, "alice");
                assert_eq!(carried.data, frame.data);
            }
            other => panic!("Payload inattendu: {:?}", other),
        }
    }

    #[test]
    fn test_checksum_verification() {
        let frame = CompressedFrame::new(vec![1, 2, 3, 4], 960, 42);
        let packet = NetworkPacket::audio(456, "", frame);
        assert!(packet.verify_checksum());

        // Données audio modifiées
        let mut corrupted = packet.clone();
        if let PacketPayload::Audio { frame, .. } = &mut corrupted.payload {
            frame.data[0] = 99;
        }
        assert!(!corrupted.verify_checksum());

        // Session modifiée
        let mut corrupted = packet.clone();
        corrupted.session_id = 457;
        assert!(!corrupted.verify_checksum());
    }

    #[test]
    fn test_checksum_covers_control_payloads() {
        let mut packet = NetworkPacket::move_to(1, 3);
        assert!(packet.verify_checksum());
        packet.payload = PacketPayload::Move { channel_id: 4 };
        assert!(!packet.verify_checksum());

        let mut hello = NetworkPacket::handshake("bot", Some("secret"));
        assert!(hello.verify_checksum());
        hello.payload = PacketPayload::Handshake { username: "bot".to_string(), password: None };
        assert!(!hello.verify_checksum());
    }

    #[test]
    fn test_connection_state() {
        let connecting = ConnectionState::Connecting {
            server: "127.0.0.1:64738".to_string(),
            started_at: Instant::now(),
            attempt_count: 1,
        };
        assert!(!connecting.is_connected());
        assert_eq!(connecting.session_id(), None);
        assert!(connecting.description().contains("tentative 1"));

        let connected = ConnectionState::Connected {
            server: "127.0.0.1:64738".to_string(),
            session_id: 42,
            connected_at: Instant::now(),
        };
        assert!(connected.is_connected());
        assert_eq!(connected.session_id(), Some(42));
    }

    #[test]
    fn test_network_config_presets() {
        let default = NetworkConfig::default();
        assert_eq!(default.max_retry_attempts, None);
        assert!(default.max_retry_delay >= default.retry_delay);

        let test = NetworkConfig::test_config();
        assert!(test.connection_timeout < default.connection_timeout);
        assert_eq!(test.max_retry_attempts, Some(2));

        for config in [test, default] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_invalid_network_config() {
        let config = NetworkConfig { outbound_queue_size: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = NetworkConfig {
            heartbeat_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = NetworkConfig { max_retry_attempts: Some(0), ..Default::default() };
        assert!(config.validate().is_err());

        let config = NetworkConfig { max_retry_delay: Duration::from_millis(10), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_is_not_logged() {
        let params = ConnectParams::new("voice.example", 64738, "bot")
            .with_password(Some("hunter2".to_string()));
        let debug = format!("{:?}", params);
        assert!(!debug.contains("hunter2"));
        assert_eq!(params.address(), "voice.example:64738");
    }
}
