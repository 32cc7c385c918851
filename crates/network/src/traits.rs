//! Traits abstraits pour le système networking
//!
//! Le relais ne parle jamais directement au réseau : il passe par un
//! `VoiceClient`, capacité externe qui possède la session, la reconnexion
//! et le codec. Cela permet de tester toute la logique du relais avec
//! `SimulatedVoiceClient`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ChannelInfo, ConnectParams, NetworkResult, NetworkStats, RemoteSound};

/// Callback appelé pour chaque frame audio reçue d'un participant
///
/// Appelé depuis le contexte d'exécution du client (tâche de réception) :
/// il ne doit ni bloquer ni paniquer.
pub type SoundCallback = Arc<dyn Fn(RemoteSound) + Send + Sync + 'static>;

/// Client vocal de groupe
///
/// Implémentations :
/// - UdpVoiceClient : client réel (UDP + Opus)
/// - SimulatedVoiceClient : client en mémoire pour les tests
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
/// Toutes les méthodes synchrones sont non bloquantes et peuvent être
/// appelées depuis un thread temps réel.
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Ouvre la session et attend qu'elle soit prête
    ///
    /// La politique de retry appartient à l'implémentation.
    ///
    /// # Erreurs
    /// - `NetworkError::ConnectionTimeout` : le serveur n'a jamais répondu
    /// - `NetworkError::HandshakeRejected` : identifiants refusés
    ///
    /// # Example
    /// ```rust,no_run
    /// use network::{ConnectParams, NetworkConfig, UdpVoiceClient, VoiceClient};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = UdpVoiceClient::new(NetworkConfig::default(), audio::AudioConfig::default())?;
    /// client.connect(ConnectParams::new("voice.example", 64738, "bot")).await?;
    ///
    /// for channel in client.channels() {
    ///     println!("{} → {}", channel.name, channel.id);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn connect(&self, params: ConnectParams) -> NetworkResult<()>;

    /// Indique si la session est prête à transporter de l'audio
    fn is_ready(&self) -> bool;

    /// Instantané de l'annuaire des canaux, dans l'ordre du serveur
    fn channels(&self) -> Vec<ChannelInfo>;

    /// Demande le déplacement de la session vers un canal
    fn move_to(&self, channel_id: u32) -> NetworkResult<()>;

    /// Envoie une frame PCM mono 16 bits sous forme de bytes little-endian
    fn add_sound_bytes(&self, pcm: &[u8]) -> NetworkResult<()>;

    /// Envoie une frame PCM mono 16 bits sous forme d'échantillons
    fn add_sound_samples(&self, samples: &[i16]) -> NetworkResult<()>;

    /// Installe le callback de réception audio (remplace le précédent)
    fn set_sound_callback(&self, callback: SoundCallback);

    /// Ferme la session proprement
    async fn disconnect(&self) -> NetworkResult<()>;

    /// Retourne les statistiques de la session
    fn stats(&self) -> NetworkStats {
        NetworkStats::default()
    }
}
