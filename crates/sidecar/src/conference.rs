//! Pont entre le relais et le client vocal
//!
//! `ConferenceAdapter` est le seul module qui parle au `VoiceClient`.
//! Il ouvre la session, résout les noms de canaux, envoie l'audio capturé
//! et convertit l'audio entrant en frames mono pour la file de lecture.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use audio::{pcm, AudioFrame, AudioResult};
use network::{ConnectParams, PcmPayload, RemoteSound, VoiceClient};
use tracing::{debug, error, info, warn};

use crate::{ChannelDirectory, SharedState, SidecarError, SidecarResult, StartupSignals};

/// Forme acceptée par le client pour une frame sortante
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendForm {
    Bytes,
    Samples,
}

pub struct ConferenceAdapter {
    client: Arc<dyn VoiceClient>,
    state: Arc<SharedState>,
    directory: RwLock<ChannelDirectory>,
}

impl ConferenceAdapter {
    /// Crée l'adaptateur et installe le callback d'audio entrant
    pub fn new(client: Arc<dyn VoiceClient>, state: Arc<SharedState>) -> Self {
        let sink_state = Arc::clone(&state);
        client.set_sound_callback(Arc::new(move |sound| deliver_remote_sound(&sink_state, sound)));

        Self {
            client,
            state,
            directory: RwLock::new(ChannelDirectory::default()),
        }
    }

    /// Ouvre la session et attend qu'elle soit prête
    pub async fn connect(&self, params: ConnectParams) -> SidecarResult<()> {
        info!("🔌 Connexion à {} en tant que {}", params.address(), params.username);
        self.client.connect(params).await?;

        let channels = self.refresh_directory();
        self.state.mark_connected();
        info!(channels, "✅ Session prête");
        Ok(())
    }

    /// Session prête et client joignable
    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.client.is_ready()
    }

    /// Recharge l'instantané de l'annuaire depuis le client
    pub fn refresh_directory(&self) -> usize {
        let directory = ChannelDirectory::new(self.client.channels());
        let count = directory.len();
        *self.directory.write().unwrap_or_else(PoisonError::into_inner) = directory;
        count
    }

    pub fn directory(&self) -> ChannelDirectory {
        self.directory.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Résout un nom de canal sur l'annuaire le plus récent
    pub fn resolve_channel(&self, name: &str) -> u32 {
        self.refresh_directory();
        self.directory.read().unwrap_or_else(PoisonError::into_inner).resolve(name)
    }

    /// Demande un changement de canal
    ///
    /// Sans effet tant que la session n'est pas prête. Retourne `true` si
    /// la demande a été transmise au client.
    pub fn move_to_channel(&self, channel_id: u32) -> bool {
        if !self.state.is_connected() {
            debug!(channel_id, "Changement de canal ignoré : pas encore connecté");
            return false;
        }

        match self.client.move_to(channel_id) {
            Ok(()) => {
                info!(channel_id, "📍 Changement de canal demandé");
                true
            }
            Err(e) => {
                warn!(channel_id, error = %e, "Changement de canal refusé");
                false
            }
        }
    }

    /// Envoie une frame capturée
    ///
    /// La forme bytes est essayée d'abord, puis la forme échantillons une
    /// seule fois. Si les deux échouent, la frame est perdue.
    pub fn send_encoded_frame(&self, frame: &AudioFrame) -> SidecarResult<SendForm> {
        let primary = match self.client.add_sound_bytes(&frame.to_le_bytes()) {
            Ok(()) => return Ok(SendForm::Bytes),
            Err(e) => e,
        };

        match self.client.add_sound_samples(frame.samples()) {
            Ok(()) => {
                debug!(error = %primary, "Forme bytes refusée, frame envoyée en échantillons");
                Ok(SendForm::Samples)
            }
            Err(fallback) => {
                warn!(primary = %primary, fallback = %fallback, "Frame sortante perdue");
                Err(SidecarError::Network(fallback))
            }
        }
    }

    /// Ferme la session en journalisant un éventuel échec
    pub async fn disconnect(&self) {
        match self.client.disconnect().await {
            Ok(()) => info!("👋 Session fermée"),
            Err(e) => warn!(error = %e, "Fermeture de session en erreur"),
        }
    }
}

/// Convertit le PCM d'un participant en frame mono 16 bits
pub fn normalize_remote_pcm(pcm: PcmPayload) -> AudioResult<AudioFrame> {
    match pcm {
        PcmPayload::Bytes(bytes) => AudioFrame::from_le_bytes(&bytes),
        PcmPayload::Samples { samples, channels } => {
            Ok(AudioFrame::new(pcm::downmix_to_mono(&samples, channels)?))
        }
    }
}

/// Callback d'audio entrant : ne bloque pas et ne remonte aucune erreur
fn deliver_remote_sound(state: &SharedState, sound: RemoteSound) {
    let RemoteSound { sender, pcm } = sound;

    let frame = match normalize_remote_pcm(pcm) {
        Ok(frame) if frame.is_empty() => return,
        Ok(frame) => frame,
        Err(e) => {
            warn!(sender = %sender, error = %e, "Audio entrant illisible, ignoré");
            return;
        }
    };

    state.playback().try_push(frame);
}

/// Cycle de vie de la session vocale
///
/// Connexion, annonce sur stdout, entrée dans le canal initial, puis
/// attente de l'arrêt avant de fermer la session. Un échec de connexion
/// est journalisé : le processus reste contrôlable jusqu'à `shutdown`.
pub async fn run_session(
    adapter: Arc<ConferenceAdapter>,
    state: Arc<SharedState>,
    params: ConnectParams,
    initial_channel: String,
    poll: Duration,
    signals: Arc<dyn StartupSignals>,
) {
    let connected = tokio::select! {
        result = adapter.connect(params) => result,
        _ = state.wait_for_shutdown(poll) => {
            info!("Arrêt demandé pendant la connexion");
            return;
        }
    };

    if let Err(e) = connected {
        error!(error = %e, "❌ Connexion au serveur impossible");
        return;
    }

    signals.connected();

    let channel_id = adapter.resolve_channel(&initial_channel);
    if adapter.move_to_channel(channel_id) {
        info!(channel = %initial_channel, channel_id, "Canal initial rejoint");
    }

    state.wait_for_shutdown(poll).await;
    adapter.disconnect().await;
}
