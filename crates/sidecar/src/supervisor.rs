//! Supervision du processus
//!
//! Ouvre le socket de contrôle, annonce le port sur stdout, lance les quatre
//! workers puis attend l'arrêt (commande `shutdown` ou Ctrl+C). Une fois le
//! drapeau levé, laisse un court délai de grâce aux workers et rend la main.
//!
//! | Worker     | Exécution            | Rôle                                 |
//! |------------|----------------------|--------------------------------------|
//! | contrôle   | tâche tokio          | datagrammes JSON → état partagé      |
//! | session    | tâche tokio          | connexion, canal initial, fermeture  |
//! | capture    | thread `capture`     | micro → session si PTT               |
//! | lecture    | thread `playback`    | file de lecture → haut-parleurs      |
//!
//! Les périphériques sont ouverts dans leur propre thread : les flux cpal
//! ne peuvent pas changer de thread.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audio::{AudioResult, AudioSink, AudioSource};
use network::{utils, VoiceClient};
use tracing::{info, warn};

use crate::capture::{run_capture, CaptureGate, CaptureStats};
use crate::conference::run_session;
use crate::playback::{run_playback, PlaybackLoop, PlaybackStats};
use crate::{ConferenceAdapter, ControlListener, SharedState, SidecarConfig, SidecarError, SidecarResult};

/// Ligne émise une fois la session prête
pub const CONNECTED_LINE: &str = "[sidecar] connected to murmur";

/// Ligne émise une fois le socket de contrôle ouvert
pub fn control_port_line(port: u16) -> String {
    format!("[sidecar] control_port={}", port)
}

/// Annonces de démarrage destinées au processus hôte
pub trait StartupSignals: Send + Sync {
    fn control_port(&self, port: u16);
    fn connected(&self);
}

/// Écrit les annonces sur stdout, ligne par ligne, avec flush
pub struct StdoutSignals;

impl StdoutSignals {
    fn emit(line: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
            warn!(error = %e, "Impossible d'écrire sur stdout");
        }
    }
}

impl StartupSignals for StdoutSignals {
    fn control_port(&self, port: u16) {
        Self::emit(&control_port_line(port));
    }

    fn connected(&self) {
        Self::emit(CONNECTED_LINE);
    }
}

/// Ouvre le micro, appelé dans le thread de capture
pub type SourceFactory = Box<dyn FnOnce() -> AudioResult<Box<dyn AudioSource>> + Send>;

/// Ouvre la sortie audio, appelé dans le thread de lecture
pub type SinkFactory = Box<dyn FnOnce() -> AudioResult<Box<dyn AudioSink>> + Send>;

pub struct Supervisor {
    config: SidecarConfig,
    client: Arc<dyn VoiceClient>,
    open_source: SourceFactory,
    open_sink: SinkFactory,
    signals: Arc<dyn StartupSignals>,
}

impl Supervisor {
    pub fn new(
        config: SidecarConfig,
        client: Arc<dyn VoiceClient>,
        open_source: SourceFactory,
        open_sink: SinkFactory,
        signals: Arc<dyn StartupSignals>,
    ) -> Self {
        Self {
            config,
            client,
            open_source,
            open_sink,
            signals,
        }
    }

    /// Démarre tous les workers
    ///
    /// # Erreurs
    /// - `SidecarError::Config` : configuration invalide
    /// - `SidecarError::ControlBind` : port de contrôle indisponible
    pub async fn start(self) -> SidecarResult<RunningSidecar> {
        let Self { config, client, open_source, open_sink, signals } = self;
        config.validate()?;

        let state = Arc::new(SharedState::new(config.queue_capacity));
        let conference = Arc::new(ConferenceAdapter::new(Arc::clone(&client), Arc::clone(&state)));

        let listener = ControlListener::bind(
            config.control_port,
            Arc::clone(&state),
            Arc::clone(&conference),
            config.channel.clone(),
            config.control_poll,
        )
        .await?;
        let control_port = listener.local_port()?;
        signals.control_port(control_port);
        info!(control_port, "🚀 Sidecar démarré");

        let tasks = vec![
            tokio::spawn(listener.run()),
            tokio::spawn(run_session(
                Arc::clone(&conference),
                Arc::clone(&state),
                config.connect_params(),
                config.channel.clone(),
                config.shutdown_poll,
                signals,
            )),
        ];

        let gate = CaptureGate::new(Arc::clone(&state), Arc::clone(&conference));
        let capture_stats = gate.stats();
        let playback = PlaybackLoop::new(Arc::clone(&state), config.playback_pop_timeout);
        let playback_stats = playback.stats();

        let threads = spawn_worker("capture", move || run_capture(open_source, gate))
            .and_then(|capture| {
                spawn_worker("playback", move || run_playback(open_sink, playback)).map(|playback| vec![capture, playback])
            })
            .inspect_err(|_| {
                state.request_shutdown();
            })?;

        Ok(RunningSidecar {
            state,
            client,
            control_port,
            started_at: Instant::now(),
            grace_period: config.grace_period,
            shutdown_poll: config.shutdown_poll,
            tasks,
            threads,
            capture_stats,
            playback_stats,
        })
    }

    /// Démarre puis attend l'arrêt (commande `shutdown` ou Ctrl+C)
    pub async fn run(self) -> SidecarResult<SidecarReport> {
        let running = self.start().await?;
        Ok(running.wait_with(interrupt_signal()).await)
    }
}

fn spawn_worker<F>(name: &'static str, body: F) -> SidecarResult<thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| SidecarError::WorkerSpawn { name, reason: e.to_string() })
}

/// Se résout au premier Ctrl+C
///
/// Si le signal ne peut pas être installé, ne se résout jamais : seul
/// `shutdown` arrête alors le processus.
pub async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Signal d'interruption indisponible");
        std::future::pending::<()>().await;
    }
}

/// Sidecar en cours d'exécution
pub struct RunningSidecar {
    state: Arc<SharedState>,
    client: Arc<dyn VoiceClient>,
    control_port: u16,
    started_at: Instant,
    grace_period: Duration,
    shutdown_poll: Duration,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    threads: Vec<thread::JoinHandle<()>>,
    capture_stats: Arc<CaptureStats>,
    playback_stats: Arc<PlaybackStats>,
}

impl RunningSidecar {
    /// Port de contrôle effectivement ouvert
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn state(&self) -> Arc<SharedState> {
        Arc::clone(&self.state)
    }

    /// Attend l'arrêt, puis le délai de grâce
    ///
    /// `interrupt` joue le rôle de Ctrl+C.
    pub async fn wait_with<F>(self, interrupt: F) -> SidecarReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        while !self.state.is_shutdown() {
            tokio::select! {
                _ = &mut interrupt => {
                    info!("Interruption reçue");
                    break;
                }
                _ = tokio::time::sleep(self.shutdown_poll) => {}
            }
        }

        self.state.request_shutdown();
        tokio::time::sleep(self.grace_period).await;

        let report = self.report();
        report.log();
        report
    }

    fn report(&self) -> SidecarReport {
        let finished = self.tasks.iter().filter(|task| task.is_finished()).count()
            + self.threads.iter().filter(|thread| thread.is_finished()).count();
        let network = self.client.stats();

        SidecarReport {
            uptime: self.started_at.elapsed(),
            frames_forwarded: self.capture_stats.forwarded(),
            frames_muted: self.capture_stats.muted(),
            frames_failed: self.capture_stats.failed(),
            frames_rendered: self.playback_stats.rendered(),
            render_failures: self.playback_stats.failed(),
            frames_dropped: self.state.playback().dropped(),
            packets_sent: network.packets_sent,
            packets_received: network.packets_received,
            send_queue_drops: network.frames_dropped,
            decode_errors: network.decode_errors,
            reconnections: network.reconnection_count,
            workers_finished: finished,
            workers_total: self.tasks.len() + self.threads.len(),
        }
    }
}

/// Bilan d'exécution journalisé à l'arrêt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarReport {
    pub uptime: Duration,
    pub frames_forwarded: u64,
    pub frames_muted: u64,
    pub frames_failed: u64,
    pub frames_rendered: u64,
    pub render_failures: u64,

    /// Frames entrantes perdues sur file pleine
    pub frames_dropped: u64,

    /// Compteurs du client vocal
    pub packets_sent: u64,
    pub packets_received: u64,
    pub send_queue_drops: u64,
    pub decode_errors: u64,
    pub reconnections: u32,

    pub workers_finished: usize,
    pub workers_total: usize,
}

impl SidecarReport {
    fn log(&self) {
        info!(
            forwarded = self.frames_forwarded,
            muted = self.frames_muted,
            failed = self.frames_failed,
            rendered = self.frames_rendered,
            render_failures = self.render_failures,
            dropped = self.frames_dropped,
            "📊 Bilan après {}",
            utils::format_duration(self.uptime)
        );
        info!(
            sent = self.packets_sent,
            received = self.packets_received,
            send_queue_drops = self.send_queue_drops,
            decode_errors = self.decode_errors,
            reconnections = self.reconnections,
            "📡 Bilan réseau"
        );

        if self.workers_finished < self.workers_total {
            warn!(
                "{} worker(s) toujours actif(s) à l'arrêt",
                self.workers_total - self.workers_finished
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSignals, RecordingSink, ScriptedSource};
    use audio::AudioFrame;
    use network::{ChannelInfo, PcmPayload, RemoteSound, SentSound, SimulatedVoiceClient};
    use std::sync::Mutex;

    struct Harness {
        client: Arc<SimulatedVoiceClient>,
        signals: Arc<RecordingSignals>,
        rendered: Arc<Mutex<Vec<AudioFrame>>>,
        running: RunningSidecar,
        control: std::net::UdpSocket,
    }

    impl Harness {
        async fn start() -> Self {
            let mut config = SidecarConfig::new("127.0.0.1", "bot");
            config.control_port = 0;
            config.shutdown_poll = Duration::from_millis(50);
            config.control_poll = Duration::from_millis(50);
            config.playback_pop_timeout = Duration::from_millis(20);

            let client = Arc::new(SimulatedVoiceClient::new(vec![
                ChannelInfo::new(0, "Root"),
                ChannelInfo::new(4, "Demo"),
                ChannelInfo::new(7, "Lobby"),
            ]));
            let signals = Arc::new(RecordingSignals::default());
            let sink = RecordingSink::new();
            let rendered = sink.frames();

            let running = Supervisor::new(
                config,
                client.clone(),
                Box::new(|| Ok(Box::new(ScriptedSource::new(vec![0.5; 960])) as Box<dyn AudioSource>)),
                Box::new(move || Ok(Box::new(sink) as Box<dyn AudioSink>)),
                signals.clone(),
            )
            .start()
            .await
            .unwrap();

            let control = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
            let harness = Self { client, signals, rendered, running, control };
            assert!(eventually(|| harness.signals.connected_announced()).await);
            harness
        }

        fn send(&self, payload: &[u8]) {
            self.control.send_to(payload, utils::localhost(self.running.control_port())).unwrap();
        }
    }

    async fn eventually(condition: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[test]
    fn test_stdout_lines() {
        assert_eq!(control_port_line(7878), "[sidecar] control_port=7878");
        assert_eq!(CONNECTED_LINE, "[sidecar] connected to murmur");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_startup_announces_and_joins_initial_channel() {
        let harness = Harness::start().await;

        let lines = harness.signals.lines();
        assert_eq!(lines[0], control_port_line(harness.running.control_port()));
        assert_eq!(lines[1], CONNECTED_LINE);
        assert_ne!(harness.running.control_port(), 0);

        assert!(eventually(|| harness.client.moves() == vec![4]).await);
        assert_eq!(harness.client.connect_params().unwrap().username, "bot");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ptt_gates_capture() {
        let harness = Harness::start().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.client.sent_count(), 0);

        harness.send(br#"{"cmd":"ptt","state":true}"#);
        assert!(eventually(|| harness.client.sent_count() >= 3).await);

        let expected = AudioFrame::new(vec![16383; 960]).to_le_bytes();
        assert_eq!(harness.client.sent()[0], SentSound::Bytes(expected));

        harness.send(br#"{"cmd":"ptt","state":false}"#);
        assert!(eventually(|| !harness.running.state().ptt_enabled()).await);
        // Laisse passer un éventuel bloc déjà en cours
        tokio::time::sleep(Duration::from_millis(20)).await;
        let muted_at = harness.client.sent_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.client.sent_count(), muted_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_unknown_channel_moves_to_root_once() {
        let harness = Harness::start().await;
        assert!(eventually(|| harness.client.moves().len() == 1).await);

        harness.send(br#"{"cmd":"join","channel":"Nonexistent"}"#);
        assert!(eventually(|| harness.client.moves().len() == 2).await);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(harness.client.moves(), vec![4, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_inbound_audio_is_played() {
        let harness = Harness::start().await;

        harness.client.inject(RemoteSound {
            sender: "alice".to_string(),
            pcm: PcmPayload::Samples { samples: vec![1000, 3000, -10, -30], channels: 2 },
        });

        assert!(eventually(|| !harness.rendered.lock().unwrap().is_empty()).await);
        assert_eq!(harness.rendered.lock().unwrap()[0].samples(), &[2000, -20]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_command_stops_everything_within_grace() {
        let harness = Harness::start().await;
        harness.send(br#"{"cmd":"ptt","state":true}"#);
        assert!(eventually(|| harness.client.sent_count() > 0).await);

        let started = Instant::now();
        harness.send(br#"{"cmd":"shutdown"}"#);
        let report = harness.running.wait_with(std::future::pending()).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(report.frames_forwarded > 0);
        assert_eq!(report.workers_finished, report.workers_total);
        assert_eq!(harness.client.disconnect_count(), 1);

        // Bilan réseau repris du client : sons envoyés plus le canal initial
        let expected = (harness.client.sent_count() + harness.client.moves().len()) as u64;
        assert_eq!(report.packets_sent, expected);
        assert_eq!(report.reconnections, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_interrupt_triggers_shutdown() {
        let harness = Harness::start().await;
        let state = harness.running.state();

        let report = harness.running.wait_with(tokio::time::sleep(Duration::from_millis(20))).await;

        assert!(state.is_shutdown());
        assert_eq!(report.workers_finished, report.workers_total);
    }

    #[tokio::test]
    async fn test_busy_control_port_is_fatal() {
        let occupied = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut config = SidecarConfig::new("127.0.0.1", "bot");
        config.control_port = occupied.local_addr().unwrap().port();

        let signals = Arc::new(RecordingSignals::default());
        let result = Supervisor::new(
            config,
            Arc::new(SimulatedVoiceClient::new(vec![])),
            Box::new(|| Ok(Box::new(ScriptedSource::new(vec![0.0; 960])) as Box<dyn AudioSource>)),
            Box::new(|| Ok(Box::new(RecordingSink::new()) as Box<dyn AudioSink>)),
            signals.clone(),
        )
        .start()
        .await;

        assert!(matches!(result, Err(SidecarError::ControlBind { .. })));
        assert!(signals.lines().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let mut config = SidecarConfig::new("127.0.0.1", "");
        config.control_port = 0;

        let result = Supervisor::new(
            config,
            Arc::new(SimulatedVoiceClient::new(vec![])),
            Box::new(|| Ok(Box::new(ScriptedSource::new(vec![0.0; 960])) as Box<dyn AudioSource>)),
            Box::new(|| Ok(Box::new(RecordingSink::new()) as Box<dyn AudioSink>)),
            Arc::new(RecordingSignals::default()),
        )
        .start()
        .await;

        assert!(matches!(result, Err(SidecarError::Config(_))));
    }
}
