//! Client vocal simulé pour les tests
//!
//! Cette implémentation garde tout en mémoire : elle enregistre les
//! changements de canal et l'audio sortant, et permet d'injecter de l'audio
//! entrant comme le ferait la tâche de réception d'un vrai client.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    ChannelInfo, ConnectParams, NetworkError, NetworkResult, NetworkStats, RemoteSound,
    SoundCallback, VoiceClient,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Audio sortant tel que reçu par le client simulé
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentSound {
    Bytes(Vec<u8>),
    Samples(Vec<i16>),
}

/// Client en mémoire implémentant `VoiceClient`
pub struct SimulatedVoiceClient {
    channels: RwLock<Vec<ChannelInfo>>,
    ready: AtomicBool,

    /// Durée simulée du handshake
    connect_delay: Duration,

    /// Si présent, `connect()` échoue avec ce motif
    reject_reason: Option<String>,

    reject_bytes: AtomicBool,
    reject_samples: AtomicBool,

    connect_params: Mutex<Option<ConnectParams>>,
    moves: Mutex<Vec<u32>>,
    sent: Mutex<Vec<SentSound>>,
    callback: RwLock<Option<SoundCallback>>,
    disconnects: AtomicUsize,
}

impl SimulatedVoiceClient {
    /// Crée un client dont le serveur annonce l'annuaire donné
    pub fn new(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels: RwLock::new(channels),
            ready: AtomicBool::new(false),
            connect_delay: Duration::ZERO,
            reject_reason: None,
            reject_bytes: AtomicBool::new(false),
            reject_samples: AtomicBool::new(false),
            connect_params: Mutex::new(None),
            moves: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            callback: RwLock::new(None),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Simule un handshake lent
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Simule un serveur qui refuse la session
    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject_reason = Some(reason.to_string());
        self
    }

    /// Refuse la forme bytes de `add_sound`
    pub fn set_reject_bytes(&self, reject: bool) {
        self.reject_bytes.store(reject, Ordering::SeqCst);
    }

    /// Refuse la forme échantillons de `add_sound`
    pub fn set_reject_samples(&self, reject: bool) {
        self.reject_samples.store(reject, Ordering::SeqCst);
    }

    /// Remplace l'annuaire (comme un ChannelList du serveur)
    pub fn set_channels(&self, channels: Vec<ChannelInfo>) {
        *self.channels.write().unwrap_or_else(PoisonError::into_inner) = channels;
    }

    /// Livre de l'audio entrant au callback, si installé
    ///
    /// Retourne `false` si aucun callback n'est installé.
    pub fn inject(&self, sound: RemoteSound) -> bool {
        let callback = self.callback.read().unwrap_or_else(PoisonError::into_inner).clone();
        match callback {
            Some(callback) => {
                callback(sound);
                true
            }
            None => false,
        }
    }

    /// Changements de canal demandés, dans l'ordre
    pub fn moves(&self) -> Vec<u32> {
        lock(&self.moves).clone()
    }

    /// Audio sortant accepté, dans l'ordre
    pub fn sent(&self) -> Vec<SentSound> {
        lock(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Paramètres du dernier `connect()`
    pub fn connect_params(&self) -> Option<ConnectParams> {
        lock(&self.connect_params).clone()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn ensure_ready(&self, operation: &str) -> NetworkResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(NetworkError::invalid_state(operation, "déconnecté"))
        }
    }
}

#[async_trait]
impl VoiceClient for SimulatedVoiceClient {
    async fn connect(&self, params: ConnectParams) -> NetworkResult<()> {
        *lock(&self.connect_params) = Some(params);

        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }

        if let Some(reason) = &self.reject_reason {
            return Err(NetworkError::HandshakeRejected { reason: reason.clone() });
        }

        self.ready.store(true, Ordering::SeqCst);
        debug!("Client simulé connecté");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn move_to(&self, channel_id: u32) -> NetworkResult<()> {
        self.ensure_ready("move_to")?;
        lock(&self.moves).push(channel_id);
        Ok(())
    }

    fn add_sound_bytes(&self, pcm: &[u8]) -> NetworkResult<()> {
        self.ensure_ready("add_sound")?;
        if self.reject_bytes.load(Ordering::SeqCst) {
            return Err(NetworkError::SendRejected("forme bytes refusée".to_string()));
        }
        lock(&self.sent).push(SentSound::Bytes(pcm.to_vec()));
        Ok(())
    }

    fn add_sound_samples(&self, samples: &[i16]) -> NetworkResult<()> {
        self.ensure_ready("add_sound")?;
        if self.reject_samples.load(Ordering::SeqCst) {
            return Err(NetworkError::SendRejected("forme échantillons refusée".to_string()));
        }
        lock(&self.sent).push(SentSound::Samples(samples.to_vec()));
        Ok(())
    }

    fn set_sound_callback(&self, callback: SoundCallback) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    async fn disconnect(&self) -> NetworkResult<()> {
        self.ready.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::new();
        stats.packets_sent = (self.sent_count() + lock(&self.moves).len()) as u64;
        stats
    }
}
