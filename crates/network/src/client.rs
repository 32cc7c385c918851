//! Client vocal UDP
//!
//! Ce module implémente le trait VoiceClient au-dessus de `UdpTransport` :
//! handshake avec le serveur, annuaire des canaux, audio Opus, heartbeats
//! et reconnexion automatique.
//!
//! # Architecture
//!
//! Une fois le handshake réussi, une unique tâche tokio pilote la session
//! avec `tokio::select!` :
//! - file d'envoi (audio PCM à encoder, demandes de canal)
//! - réception des paquets du serveur (audio décodé → callback)
//! - heartbeat périodique et détection de silence du serveur
//! - demande de fermeture
//!
//! Les méthodes synchrones du trait (`add_sound_*`, `move_to`) ne font que
//! déposer un élément dans la file d'envoi avec `try_send` : elles ne
//! bloquent jamais l'appelant.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use async_trait::async_trait;
use audio::{pcm, AudioCodec, AudioConfig, AudioFrame, AudioResult, CompressedFrame, OpusCodec};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    ChannelInfo, ConnectParams, ConnectionState, NetworkConfig, NetworkError, NetworkPacket,
    NetworkResult, NetworkStats, PacketPayload, PcmPayload, RemoteSound, SoundCallback,
    UdpTransport, VoiceClient, ROOT_CHANNEL_ID,
};

/// Délai laissé à la tâche de session pour dire au revoir au serveur
const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(500);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Élément de la file d'envoi
#[derive(Debug)]
enum Outbound {
    Audio(Vec<i16>),
    Move(u32),
}

/// Session établie avec le serveur
struct Session {
    transport: UdpTransport,
    session_id: u32,
}

/// Raison de fin d'une session
enum SessionEnd {
    /// Fermeture demandée localement
    Closed,
    /// Serveur perdu : tentative de reconnexion
    Lost(NetworkError),
}

/// État partagé entre le client et sa tâche de session
struct ClientShared {
    ready: AtomicBool,
    state: RwLock<ConnectionState>,
    channels: RwLock<Vec<ChannelInfo>>,
    callback: RwLock<Option<SoundCallback>>,

    /// Dernier canal demandé, rejoint de nouveau après une reconnexion
    current_channel: AtomicU32,

    /// Transport de la session courante (pour ses statistiques)
    transport: RwLock<Option<UdpTransport>>,

    /// Compteurs cumulés des sessions terminées et du client
    stats: Mutex<NetworkStats>,

    /// File d'envoi, détenue par la tâche de session tant qu'elle tourne
    outbound_rx: Mutex<Option<mpsc::Receiver<Outbound>>>,
}

impl ClientShared {
    fn new(outbound_rx: mpsc::Receiver<Outbound>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            state: RwLock::new(ConnectionState::Disconnected),
            channels: RwLock::new(Vec::new()),
            callback: RwLock::new(None),
            current_channel: AtomicU32::new(ROOT_CHANNEL_ID),
            transport: RwLock::new(None),
            stats: Mutex::new(NetworkStats::new()),
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *write(&self.state) = state;
    }

    fn mark_connected(&self, params: &ConnectParams, session: &Session) {
        *write(&self.transport) = Some(session.transport.clone());
        self.set_state(ConnectionState::Connected {
            server: params.address(),
            session_id: session.session_id,
            connected_at: Instant::now(),
        });
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Replie les statistiques du transport sortant dans les cumuls
    fn retire_transport(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if let Some(transport) = write(&self.transport).take() {
            let finished = transport.stats();
            let mut stats = lock(&self.stats);
            stats.packets_sent += finished.packets_sent;
            stats.packets_received += finished.packets_received;
            stats.packets_corrupted += finished.packets_corrupted;
        }
    }

    fn deliver(&self, sound: RemoteSound) {
        // Le callback est appelé hors verrou
        let callback = read(&self.callback).clone();
        if let Some(callback) = callback {
            callback(sound);
        }
    }
}

/// Découpe le PCM sortant en frames exactes et les encode en Opus
struct FrameEncoder {
    codec: OpusCodec,
    pending: Vec<i16>,
    frame_len: usize,
    sequence: u64,
}

impl FrameEncoder {
    fn new(config: AudioConfig) -> AudioResult<Self> {
        let frame_len = config.samples_per_frame() * config.channels as usize;
        Ok(Self {
            codec: OpusCodec::new(config)?,
            pending: Vec::with_capacity(frame_len * 2),
            frame_len,
            sequence: 0,
        })
    }

    fn push(&mut self, samples: &[i16]) -> AudioResult<Vec<CompressedFrame>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_len {
            let block: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            self.sequence += 1;
            frames.push(self.codec.encode(&AudioFrame::new(block), self.sequence)?);
        }
        Ok(frames)
    }

    fn reset(&mut self) {
        self.pending.clear();
        if let Err(e) = self.codec.reset() {
            warn!(error = %e, "Impossible de réinitialiser l'encodeur");
        }
    }
}

/// Tout ce que possède la tâche de session
struct SessionContext {
    config: NetworkConfig,
    audio_config: AudioConfig,
    params: ConnectParams,
    shared: Arc<ClientShared>,
    outbound: mpsc::Receiver<Outbound>,
    closing: watch::Receiver<bool>,
    encoder: FrameEncoder,
    decoders: HashMap<String, OpusCodec>,
}

/// Client vocal UDP + Opus
///
/// # Example
/// ```rust,no_run
/// use std::sync::Arc;
/// use network::{ConnectParams, NetworkConfig, UdpVoiceClient, VoiceClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = UdpVoiceClient::new(NetworkConfig::default(), audio::AudioConfig::default())?;
/// client.set_sound_callback(Arc::new(|sound| println!("🔊 {}", sound.sender)));
/// client.connect(ConnectParams::new("voice.example", 64738, "bot")).await?;
///
/// client.add_sound_samples(&[0i16; 960])?;
/// client.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct UdpVoiceClient {
    config: NetworkConfig,
    audio_config: AudioConfig,
    shared: Arc<ClientShared>,
    outbound: mpsc::Sender<Outbound>,
    closing: watch::Sender<bool>,
    session_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpVoiceClient {
    /// Crée un client (sans ouvrir de session)
    ///
    /// # Erreurs
    /// - `NetworkError::ConfigError` si l'une des configurations est invalide
    pub fn new(config: NetworkConfig, audio_config: AudioConfig) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::ConfigError)?;
        audio_config.validate().map_err(NetworkError::ConfigError)?;

        let (outbound, outbound_rx) = mpsc::channel(config.outbound_queue_size);
        let (closing, _) = watch::channel(false);

        Ok(Self {
            config,
            audio_config,
            shared: Arc::new(ClientShared::new(outbound_rx)),
            outbound,
            closing,
            session_task: Mutex::new(None),
        })
    }

    /// État courant de la session
    pub fn connection_state(&self) -> ConnectionState {
        read(&self.shared.state).clone()
    }

    fn enqueue(&self, operation: &str, item: Outbound) -> NetworkResult<()> {
        if !self.is_ready() {
            return Err(NetworkError::invalid_state(operation, &self.connection_state().description()));
        }

        match self.outbound.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                lock(&self.shared.stats).frames_dropped += 1;
                Err(NetworkError::BufferOverflow { capacity: self.config.outbound_queue_size })
            }
            Err(TrySendError::Closed(_)) => Err(NetworkError::invalid_state(operation, "session fermée")),
        }
    }
}

#[async_trait]
impl VoiceClient for UdpVoiceClient {
    async fn connect(&self, params: ConnectParams) -> NetworkResult<()> {
        if lock(&self.shared.outbound_rx).is_none() {
            return Err(NetworkError::invalid_state("connect", "session déjà ouverte"));
        }

        info!(server = %params.address(), username = %params.username, "🔗 Connexion au serveur");

        let encoder = FrameEncoder::new(self.audio_config.clone())?;
        let session = establish(&self.config, &self.shared, &params).await?;

        // La file n'est prise qu'une fois la session établie : un connect()
        // annulé ou en échec la laisse disponible
        let Some(outbound_rx) = lock(&self.shared.outbound_rx).take() else {
            return Err(NetworkError::invalid_state("connect", "session déjà ouverte"));
        };

        self.closing.send_replace(false);
        self.shared.mark_connected(&params, &session);
        info!(
            session_id = session.session_id,
            channels = read(&self.shared.channels).len(),
            "✅ Session prête"
        );

        let context = SessionContext {
            config: self.config.clone(),
            audio_config: self.audio_config.clone(),
            params,
            shared: Arc::clone(&self.shared),
            outbound: outbound_rx,
            closing: self.closing.subscribe(),
            encoder,
            decoders: HashMap::new(),
        };
        *lock(&self.session_task) = Some(tokio::spawn(run_session(context, session)));

        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn channels(&self) -> Vec<ChannelInfo> {
        read(&self.shared.channels).clone()
    }

    fn move_to(&self, channel_id: u32) -> NetworkResult<()> {
        self.enqueue("move_to", Outbound::Move(channel_id))
    }

    fn add_sound_bytes(&self, pcm_bytes: &[u8]) -> NetworkResult<()> {
        let samples = pcm::le_bytes_to_samples(pcm_bytes)
            .map_err(|e| NetworkError::SendRejected(e.to_string()))?;
        self.enqueue("add_sound", Outbound::Audio(samples))
    }

    fn add_sound_samples(&self, samples: &[i16]) -> NetworkResult<()> {
        if samples.is_empty() {
            return Err(NetworkError::SendRejected("frame vide".to_string()));
        }
        self.enqueue("add_sound", Outbound::Audio(samples.to_vec()))
    }

    fn set_sound_callback(&self, callback: SoundCallback) {
        *write(&self.shared.callback) = Some(callback);
    }

    async fn disconnect(&self) -> NetworkResult<()> {
        self.closing.send_replace(true);

        let task = lock(&self.session_task).take();
        if let Some(mut task) = task {
            if time::timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
                warn!("⚠️ Tâche de session bloquée, abandon");
                task.abort();
            }
        }

        self.shared.retire_transport();
        self.shared.set_state(ConnectionState::Disconnected);
        info!("👋 Déconnecté du serveur");
        Ok(())
    }

    fn stats(&self) -> NetworkStats {
        let mut stats = lock(&self.shared.stats).clone();
        if let Some(transport) = read(&self.shared.transport).as_ref() {
            let current = transport.stats();
            stats.packets_sent += current.packets_sent;
            stats.packets_received += current.packets_received;
            stats.packets_corrupted += current.packets_corrupted;
        }
        stats
    }
}

/// Délai avant le nouvel essai `attempt` : doublé à chaque échec jusqu'au
/// plafond, avec un peu d'aléa pour désynchroniser les clients
fn retry_delay(config: &NetworkConfig, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    let base = config.retry_delay.saturating_mul(factor).min(config.max_retry_delay);
    let jitter_ms = (base.as_millis() as u64 / 4).max(1);
    base + Duration::from_millis(fastrand::u64(0..jitter_ms))
}

/// Ouvre une session en respectant la politique de retry
///
/// Sans `max_retry_attempts`, les erreurs récupérables sont retentées
/// indéfiniment : seul un refus du serveur (ou une erreur fatale) arrête.
async fn establish(config: &NetworkConfig, shared: &ClientShared, params: &ConnectParams) -> NetworkResult<Session> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        shared.set_state(ConnectionState::Connecting {
            server: params.address(),
            started_at: Instant::now(),
            attempt_count: attempt,
        });

        match handshake(config, shared, params).await {
            Ok(session) => return Ok(session),
            Err(e)
                if config.max_retry_attempts.is_none_or(|max| attempt < max)
                    && (e.is_recoverable() || e.requires_reconnection()) =>
            {
                let delay = retry_delay(config, attempt);
                warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "⚠️ Connexion échouée, nouvelle tentative");
                shared.set_state(ConnectionState::Error {
                    last_error: e.to_string(),
                    failed_at: Instant::now(),
                    can_retry: true,
                });
                time::sleep(delay).await;
            }
            Err(e) => {
                shared.set_state(ConnectionState::Error {
                    last_error: e.to_string(),
                    failed_at: Instant::now(),
                    can_retry: false,
                });
                return Err(e);
            }
        }
    }
}

/// Un essai de handshake : Handshake → HandshakeAck / HandshakeReject
async fn handshake(config: &NetworkConfig, shared: &ClientShared, params: &ConnectParams) -> NetworkResult<Session> {
    let transport = UdpTransport::connect(&params.server, params.port, config).await?;
    transport
        .send(&NetworkPacket::handshake(&params.username, params.password.as_deref()))
        .await?;

    let deadline = Instant::now() + config.connection_timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(NetworkError::connection_timeout(
                params.address(),
                config.connection_timeout.as_millis() as u32,
            ));
        }

        match transport.recv_timeout(remaining).await {
            Ok(packet) => match packet.payload {
                PacketPayload::HandshakeAck { session_id, channels } => {
                    *write(&shared.channels) = channels;
                    return Ok(Session { transport, session_id });
                }
                PacketPayload::HandshakeReject { reason } => {
                    return Err(NetworkError::HandshakeRejected { reason });
                }
                other => debug!(packet = ?other.packet_type(), "Paquet ignoré pendant le handshake"),
            },
            Err(NetworkError::Timeout) => continue,
            Err(e @ (NetworkError::CorruptedPacket { .. } | NetworkError::InvalidPacketFormat { .. })) => {
                debug!(error = %e, "Paquet invalide pendant le handshake");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Attend la demande de fermeture (ou la disparition du client)
async fn wait_closing(closing: &mut watch::Receiver<bool>) {
    loop {
        if *closing.borrow_and_update() {
            return;
        }
        if closing.changed().await.is_err() {
            return;
        }
    }
}

/// Tâche de session : pilote les sessions successives jusqu'à la fermeture
async fn run_session(mut ctx: SessionContext, mut session: Session) {
    loop {
        let end = drive_session(&mut ctx, &session).await;
        ctx.shared.retire_transport();

        let lost = match end {
            SessionEnd::Closed => {
                ctx.shared.set_state(ConnectionState::Disconnected);
                *lock(&ctx.shared.outbound_rx) = Some(ctx.outbound);
                return;
            }
            SessionEnd::Lost(e) => e,
        };

        warn!(error = %lost, "⚠️ Session perdue, reconnexion");
        ctx.encoder.reset();
        ctx.decoders.clear();

        let attempt = tokio::select! {
            result = establish(&ctx.config, &ctx.shared, &ctx.params) => Some(result),
            _ = wait_closing(&mut ctx.closing) => None,
        };

        match attempt {
            Some(Ok(new_session)) => {
                lock(&ctx.shared.stats).reconnection_count += 1;

                let channel_id = ctx.shared.current_channel.load(Ordering::SeqCst);
                if channel_id != ROOT_CHANNEL_ID {
                    let rejoin = NetworkPacket::move_to(new_session.session_id, channel_id);
                    if let Err(e) = new_session.transport.send(&rejoin).await {
                        warn!(channel_id, error = %e, "Impossible de rejoindre le canal précédent");
                    }
                }

                ctx.shared.mark_connected(&ctx.params, &new_session);
                info!(session_id = new_session.session_id, "🔄 Reconnecté au serveur");
                session = new_session;
            }
            Some(Err(e)) => {
                error!(error = %e, "❌ Reconnexion impossible, session abandonnée");
                // Un nouveau connect() pourra reprendre la file
                *lock(&ctx.shared.outbound_rx) = Some(ctx.outbound);
                return;
            }
            None => {
                ctx.shared.set_state(ConnectionState::Disconnected);
                *lock(&ctx.shared.outbound_rx) = Some(ctx.outbound);
                return;
            }
        }
    }
}

/// Boucle d'une session : envoi, réception, heartbeat
async fn drive_session(ctx: &mut SessionContext, session: &Session) -> SessionEnd {
    let transport = &session.transport;
    let mut heartbeat = time::interval(ctx.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = wait_closing(&mut ctx.closing) => {
                if let Err(e) = transport.send(&NetworkPacket::disconnect(session.session_id)).await {
                    debug!(error = %e, "Paquet de déconnexion non envoyé");
                }
                return SessionEnd::Closed;
            }
            Some(item) = ctx.outbound.recv() => {
                if let Err(e) = send_outbound(ctx, session, item).await {
                    if e.requires_reconnection() {
                        return SessionEnd::Lost(e);
                    }
                    warn!(error = %e, "Envoi échoué, frame dropée");
                }
            }
            received = transport.recv() => match received {
                Ok(packet) => {
                    last_seen = Instant::now();
                    if let Some(end) = handle_inbound(ctx, session, packet) {
                        return end;
                    }
                }
                Err(e) if e.requires_reconnection() => return SessionEnd::Lost(e),
                Err(e) => debug!(error = %e, "Paquet ignoré"),
            },
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > ctx.config.heartbeat_timeout {
                    return SessionEnd::Lost(NetworkError::ServerDisconnected {
                        addr: ctx.params.address(),
                        reason: "aucun heartbeat".to_string(),
                    });
                }
                if let Err(e) = transport.send(&NetworkPacket::heartbeat(session.session_id)).await {
                    if e.requires_reconnection() {
                        return SessionEnd::Lost(e);
                    }
                    debug!(error = %e, "Heartbeat non envoyé");
                }
            }
        }
    }
}

async fn send_outbound(ctx: &mut SessionContext, session: &Session, item: Outbound) -> NetworkResult<()> {
    match item {
        Outbound::Audio(samples) => {
            for frame in ctx.encoder.push(&samples)? {
                session
                    .transport
                    .send(&NetworkPacket::audio(session.session_id, "", frame))
                    .await?;
            }
        }
        Outbound::Move(channel_id) => {
            session
                .transport
                .send(&NetworkPacket::move_to(session.session_id, channel_id))
                .await?;
            ctx.shared.current_channel.store(channel_id, Ordering::SeqCst);
            debug!(channel_id, "Demande de changement de canal envoyée");
        }
    }
    Ok(())
}

/// Traite un paquet du serveur ; `Some` termine la session
fn handle_inbound(ctx: &mut SessionContext, session: &Session, packet: NetworkPacket) -> Option<SessionEnd> {
    if packet.session_id != session.session_id {
        debug!(
            received = packet.session_id,
            expected = session.session_id,
            "Paquet d'une autre session ignoré"
        );
        return None;
    }

    match packet.payload {
        PacketPayload::Audio { sender, frame } => {
            let decoder = match ctx.decoders.entry(sender.clone()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match OpusCodec::new(ctx.audio_config.clone()) {
                    Ok(codec) => entry.insert(codec),
                    Err(e) => {
                        warn!(error = %e, "Impossible de créer un décodeur");
                        return None;
                    }
                },
            };

            match decoder.decode(&frame) {
                Ok(decoded) => ctx.shared.deliver(RemoteSound {
                    sender,
                    pcm: PcmPayload::Samples {
                        samples: decoded.into_samples(),
                        channels: ctx.audio_config.channels,
                    },
                }),
                Err(e) => {
                    lock(&ctx.shared.stats).decode_errors += 1;
                    debug!(sender = %sender, error = %e, "Frame entrante non décodable");
                }
            }
        }
        PacketPayload::ChannelList { channels } => {
            debug!(count = channels.len(), "📋 Annuaire des canaux mis à jour");
            *write(&ctx.shared.channels) = channels;
        }
        PacketPayload::Heartbeat => {}
        PacketPayload::Disconnect => {
            return Some(SessionEnd::Lost(NetworkError::ServerDisconnected {
                addr: ctx.params.address(),
                reason: "fermeture par le serveur".to_string(),
            }));
        }
        other => debug!(packet = ?other.packet_type(), "Paquet inattendu ignoré"),
    }
    None
}
