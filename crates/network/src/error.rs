//! Gestion d'erreurs pour le système networking
//!
//! Ce module définit tous les types d'erreurs possibles entre le client vocal
//! et le serveur de conférence. Il suit les mêmes patterns que le module audio
//! pour la cohérence du code.

use thiserror::Error;
use std::net::SocketAddr;

/// Énumération de toutes les erreurs possibles dans le système réseau
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Impossible de créer ou bind le socket UDP sur le port demandé
    #[error("Impossible de bind le socket sur le port {port}: {reason}")]
    BindError { port: u16, reason: String },

    /// Le serveur n'a pas répondu au handshake dans le délai imparti
    #[error("Timeout de connexion vers {addr} après {timeout_ms}ms")]
    ConnectionTimeout { addr: String, timeout_ms: u32 },

    /// Le serveur a fermé la session ou ne donne plus signe de vie
    #[error("Serveur {addr} déconnecté: {reason}")]
    ServerDisconnected { addr: String, reason: String },

    /// Le serveur a refusé le handshake (identifiants, nom déjà pris...)
    #[error("Handshake refusé par le serveur: {reason}")]
    HandshakeRejected { reason: String },

    /// Paquet reçu avec un checksum invalide (corruption réseau)
    #[error("Paquet corrompu reçu de {addr}: checksum invalide")]
    CorruptedPacket { addr: SocketAddr },

    /// Paquet trop volumineux pour le MTU réseau
    #[error("Paquet trop volumineux: {size} bytes (max autorisé: {max} bytes)")]
    PacketTooLarge { size: usize, max: usize },

    /// Paquet reçu avec un format invalide ou version incompatible
    #[error("Format de paquet invalide reçu de {addr}")]
    InvalidPacketFormat { addr: SocketAddr },

    /// Session ID mismatch - paquet d'une ancienne session
    #[error("Session ID invalide: reçu {received}, attendu {expected}")]
    InvalidSessionId { received: u32, expected: u32 },

    /// File d'envoi pleine, la frame sortante est abandonnée
    #[error("File d'envoi pleine ({capacity} éléments), frame dropée")]
    BufferOverflow { capacity: usize },

    /// Données sortantes refusées (PCM mal formé, taille incohérente)
    #[error("Données refusées: {0}")]
    SendRejected(String),

    /// Timeout lors d'une opération réseau
    #[error("Timeout - aucune réponse reçue dans le délai imparti")]
    Timeout,

    /// Adresse IP ou port invalide fourni par l'utilisateur
    #[error("Adresse invalide: {addr}")]
    InvalidAddress { addr: String },

    /// Erreur lors de la sérialisation/désérialisation des paquets
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] bincode::Error),

    /// Erreur générale d'entrée/sortie réseau
    #[error("Erreur IO réseau: {0}")]
    IoError(#[from] std::io::Error),

    /// Erreur du codec lors de l'encodage/décodage de l'audio
    #[error("Erreur audio: {0}")]
    AudioError(#[from] audio::AudioError),

    /// Erreur lors de l'initialisation des composants réseau
    #[error("Erreur d'initialisation réseau: {0}")]
    InitializationError(String),

    /// Opération tentée alors que la connexion n'est pas dans le bon état
    #[error("Opération {operation} invalide dans l'état {current_state}")]
    InvalidState { operation: String, current_state: String },

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Conversion automatique des erreurs de parsing d'adresses
impl From<std::net::AddrParseError> for NetworkError {
    fn from(err: std::net::AddrParseError) -> Self {
        NetworkError::InvalidAddress {
            addr: format!("Erreur de parsing: {}", err)
        }
    }
}

/// Type Result personnalisé pour notre crate network
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Fonctions utilitaires pour créer des erreurs communes
impl NetworkError {
    /// Crée une erreur de bind avec contexte
    pub fn bind_failed(port: u16, cause: std::io::Error) -> Self {
        Self::BindError {
            port,
            reason: cause.to_string(),
        }
    }

    /// Crée une erreur de timeout avec contexte
    pub fn connection_timeout(addr: impl Into<String>, timeout_ms: u32) -> Self {
        Self::ConnectionTimeout { addr: addr.into(), timeout_ms }
    }

    /// Crée une erreur de paquet corrompu
    pub fn corrupted_packet(addr: SocketAddr) -> Self {
        Self::CorruptedPacket { addr }
    }

    /// Crée une erreur de paquet trop volumineux
    pub fn packet_too_large(size: usize, max: usize) -> Self {
        Self::PacketTooLarge { size, max }
    }

    /// Crée une erreur d'état invalide
    pub fn invalid_state(operation: &str, current_state: &str) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current_state: current_state.to_string(),
        }
    }

    /// Vérifie si l'erreur est récupérable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        match self {
            NetworkError::ConnectionTimeout { .. } => true,
            NetworkError::BufferOverflow { .. } => true,
            NetworkError::CorruptedPacket { .. } => true,
            NetworkError::InvalidPacketFormat { .. } => true,
            NetworkError::Timeout => true,
            NetworkError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Vérifie si l'erreur nécessite une reconnexion
    pub fn requires_reconnection(&self) -> bool {
        match self {
            NetworkError::ServerDisconnected { .. } => true,
            NetworkError::InvalidSessionId { .. } => true,
            NetworkError::ConnectionTimeout { .. } => true,
            NetworkError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NetworkError::BindError {
            port: 9001,
            reason: "Port déjà utilisé".to_string()
        };
        assert!(error.to_string().contains("9001"));
        assert!(error.to_string().contains("Port déjà utilisé"));
    }

    #[test]
    fn test_error_recoverable() {
        let timeout_error = NetworkError::connection_timeout("voice.example:64738", 5000);
        assert!(timeout_error.is_recoverable());

        let refused = NetworkError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refusé",
        ));
        assert!(refused.is_recoverable());

        let rejected = NetworkError::HandshakeRejected { reason: "mot de passe".to_string() };
        assert!(!rejected.is_recoverable());
        assert!(!rejected.requires_reconnection());
    }

    #[test]
    fn test_error_requires_reconnection() {
        let disconnected = NetworkError::ServerDisconnected {
            addr: "127.0.0.1:64738".to_string(),
            reason: "heartbeat".to_string(),
        };
        assert!(disconnected.requires_reconnection());

        let overflow = NetworkError::BufferOverflow { capacity: 50 };
        assert!(!overflow.requires_reconnection());
    }

    #[test]
    fn test_helper_functions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let error = NetworkError::bind_failed(8080, io_err);

        match error {
            NetworkError::BindError { port, reason } => {
                assert_eq!(port, 8080);
                assert!(reason.contains("test"));
            }
            _ => panic!("Wrong error type"),
        }

        let error = NetworkError::invalid_state("move_to", "déconnecté");
        assert!(error.to_string().contains("move_to"));
    }
}
