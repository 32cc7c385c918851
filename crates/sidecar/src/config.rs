//! Configuration du sidecar
//!
//! Construite depuis la ligne de commande par le binaire, ou directement
//! par les tests avec des délais raccourcis.

use std::fmt;
use std::time::Duration;

use audio::AudioConfig;
use network::{ConnectParams, NetworkConfig};

use crate::{SidecarError, SidecarResult};

/// Port du serveur de conférence par défaut
pub const DEFAULT_SERVER_PORT: u16 = 64738;

/// Port de contrôle local par défaut (0 = attribué par l'OS)
pub const DEFAULT_CONTROL_PORT: u16 = 7878;

/// Canal rejoint au démarrage et par `join` sans canal
pub const DEFAULT_CHANNEL: &str = "Demo";

/// Capacité de la file de lecture (~1 s d'audio)
pub const PLAYBACK_QUEUE_CAPACITY: usize = 50;

/// Paramètres complets d'une instance du sidecar
#[derive(Clone)]
pub struct SidecarConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,

    /// Canal initial
    pub channel: String,

    pub control_port: u16,

    pub queue_capacity: usize,

    /// Délai laissé aux workers après la levée du drapeau d'arrêt
    pub grace_period: Duration,

    /// Période de scrutation du drapeau d'arrêt (superviseur, session)
    pub shutdown_poll: Duration,

    /// Attente maximale d'une frame par la boucle de lecture
    pub playback_pop_timeout: Duration,

    /// Attente maximale d'un datagramme avant de revérifier l'arrêt
    pub control_poll: Duration,

    pub audio: AudioConfig,
    pub network: NetworkConfig,
}

impl SidecarConfig {
    /// Configuration par défaut pour un serveur et un utilisateur
    pub fn new(server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_SERVER_PORT,
            username: username.into(),
            password: None,
            channel: DEFAULT_CHANNEL.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            queue_capacity: PLAYBACK_QUEUE_CAPACITY,
            grace_period: Duration::from_millis(300),
            shutdown_poll: Duration::from_millis(200),
            playback_pop_timeout: Duration::from_millis(100),
            control_poll: Duration::from_millis(200),
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
        }
    }

    /// Paramètres transmis au client vocal
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams::new(self.server.clone(), self.port, self.username.clone())
            .with_password(self.password.clone())
    }

    pub fn validate(&self) -> SidecarResult<()> {
        if self.server.trim().is_empty() {
            return Err(SidecarError::Config("adresse du serveur vide".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(SidecarError::Config("nom d'utilisateur vide".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(SidecarError::Config("la file de lecture doit avoir une capacité > 0".to_string()));
        }
        self.audio.validate().map_err(SidecarError::Config)?;
        self.network.validate().map_err(SidecarError::Config)?;
        Ok(())
    }
}

impl fmt::Debug for SidecarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SidecarConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("channel", &self.channel)
            .field("control_port", &self.control_port)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SidecarConfig::new("voice.example", "bot");

        assert_eq!(config.port, 64738);
        assert_eq!(config.channel, "Demo");
        assert_eq!(config.control_port, 7878);
        assert_eq!(config.queue_capacity, 50);
        assert!(config.grace_period <= Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(SidecarConfig::new("", "bot").validate().is_err());
        assert!(SidecarConfig::new("voice.example", " ").validate().is_err());

        let mut config = SidecarConfig::new("voice.example", "bot");
        config.queue_capacity = 0;
        assert!(matches!(config.validate(), Err(SidecarError::Config(_))));
    }

    #[test]
    fn test_connect_params_and_redaction() {
        let mut config = SidecarConfig::new("voice.example", "bot");
        config.password = Some("hunter2".to_string());

        let params = config.connect_params();
        assert_eq!(params.address(), "voice.example:64738");
        assert_eq!(params.password.as_deref(), Some("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
