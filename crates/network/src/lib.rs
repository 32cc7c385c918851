//! Crate network - Client vocal de groupe pour le sidecar Voc
//!
//! Ce crate fournit la capacité externe dont dépend le relais : une session
//! vocale avec un serveur de conférence, via UDP, avec annuaire des canaux,
//! compression Opus, heartbeats et reconnexion automatique.
//!
//! # Architecture
//!
//! Le crate est organisé en plusieurs modules :
//!
//! - `error` : Gestion d'erreurs avec types spécialisés réseau
//! - `types` : Types de données (paquets, canaux, états, configuration)
//! - `traits` : Le trait `VoiceClient`, seul point de contact du relais
//! - `transport` : Transport UDP (sérialisation bincode, checksums)
//! - `client` : `UdpVoiceClient`, implémentation réelle
//! - `simulated` : `SimulatedVoiceClient`, implémentation en mémoire pour les tests
//!
//! # Examples
//!
//! ```rust
//! use network::{ChannelInfo, ConnectParams, SimulatedVoiceClient, VoiceClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SimulatedVoiceClient::new(vec![ChannelInfo::new(0, "Root"), ChannelInfo::new(4, "Demo")]);
//! client.connect(ConnectParams::new("localhost", 64738, "bot")).await?;
//!
//! client.move_to(4)?;
//! assert_eq!(client.moves(), vec![4]);
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod transport;
mod client;
mod simulated;

// Re-exports publics
pub use error::{NetworkError, NetworkResult};

pub use types::{
    ChannelInfo, ConnectParams, ConnectionState, NetworkConfig, NetworkPacket, NetworkStats,
    PacketPayload, PacketType, PcmPayload, RemoteSound, ROOT_CHANNEL_ID,
};

pub use traits::{SoundCallback, VoiceClient};

pub use transport::UdpTransport;

pub use client::UdpVoiceClient;

pub use simulated::{SentSound, SimulatedVoiceClient};

// Re-exports depuis le crate audio (pour simplicité d'utilisation)
pub use audio::CompressedFrame;

/// Fonctions utilitaires pour l'utilisateur final
pub mod utils {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    /// Crée une adresse localhost sur le port spécifié
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    ///
    /// let addr = utils::localhost(7878);
    /// assert_eq!(addr.to_string(), "127.0.0.1:7878");
    /// ```
    pub fn localhost(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    /// Formate une durée de façon lisible
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    /// use std::time::Duration;
    ///
    /// assert_eq!(utils::format_duration(Duration::from_millis(1234)), "1.23s");
    /// assert_eq!(utils::format_duration(Duration::from_millis(56)), "56ms");
    /// ```
    pub fn format_duration(duration: std::time::Duration) -> String {
        let ms = duration.as_millis();

        if ms >= 1000 {
            format!("{:.2}s", ms as f64 / 1000.0)
        } else {
            format!("{}ms", ms)
        }
    }
}
