//! Gestion d'erreurs du sidecar
//!
//! `SidecarError` couvre les erreurs fatales au démarrage et celles remontées
//! par les crates audio et network. `ControlError` décrit un datagramme de
//! contrôle inexploitable : elle est journalisée, jamais fatale.

use audio::AudioError;
use network::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SidecarError {
    /// Le socket de contrôle n'a pas pu être ouvert : arrêt immédiat
    #[error("Impossible de bind le socket de contrôle sur 127.0.0.1:{port}: {source}")]
    ControlBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Paramètres de démarrage incohérents
    #[error("Configuration invalide: {0}")]
    Config(String),

    /// Un worker n'a pas pu être lancé
    #[error("Impossible de démarrer le worker {name}: {reason}")]
    WorkerSpawn { name: &'static str, reason: String },

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Erreur IO: {0}")]
    Io(#[from] std::io::Error),
}

pub type SidecarResult<T> = Result<T, SidecarError>;

/// Datagramme de contrôle rejeté
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("payload non UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    #[error("JSON invalide: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("champ `cmd` absent ou non textuel")]
    MissingCommand,

    #[error("commande inconnue: {0}")]
    UnknownCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_names_the_port() {
        let error = SidecarError::ControlBind {
            port: 7878,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "adresse déjà utilisée"),
        };
        assert!(error.to_string().contains("127.0.0.1:7878"));
    }

    #[test]
    fn test_network_errors_are_transparent() {
        let error: SidecarError = NetworkError::Timeout.into();
        assert_eq!(error.to_string(), NetworkError::Timeout.to_string());
    }
}
