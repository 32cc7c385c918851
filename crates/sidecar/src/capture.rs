//! Boucle de capture : micro → session vocale, sous contrôle du PTT

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use audio::{pcm, AudioFrame, AudioResult, AudioSource, BlockHandler, StreamControl};
use tracing::{error, info};

use crate::{ConferenceAdapter, SharedState};

/// Décision prise pour un bloc capturé
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Arrêt demandé : le flux doit s'arrêter
    Stop,
    /// PTT relâché ou session pas prête : bloc jeté
    Muted,
    Forwarded,
    /// Les deux formes d'envoi ont échoué
    Failed,
}

/// Compteurs de la capture
#[derive(Debug, Default)]
pub struct CaptureStats {
    forwarded: AtomicU64,
    muted: AtomicU64,
    failed: AtomicU64,
}

impl CaptureStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn muted(&self) -> u64 {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Filtre appliqué à chaque bloc du micro
///
/// Appelé depuis le thread temps réel du périphérique : ne fait que lire
/// des drapeaux atomiques et confier la frame au client, sans attendre.
pub struct CaptureGate {
    state: Arc<SharedState>,
    conference: Arc<ConferenceAdapter>,
    stats: Arc<CaptureStats>,
}

impl CaptureGate {
    pub fn new(state: Arc<SharedState>, conference: Arc<ConferenceAdapter>) -> Self {
        Self {
            state,
            conference,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    pub fn on_block(&self, block: &[f32]) -> GateDecision {
        if self.state.is_shutdown() {
            return GateDecision::Stop;
        }

        if !self.state.ptt_enabled() || !self.conference.is_connected() {
            self.stats.muted.fetch_add(1, Ordering::Relaxed);
            return GateDecision::Muted;
        }

        let frame = AudioFrame::new(pcm::float_block_to_pcm16(block));
        match self.conference.send_encoded_frame(&frame) {
            Ok(_) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                GateDecision::Forwarded
            }
            Err(_) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                GateDecision::Failed
            }
        }
    }

    /// Handler à confier à une `AudioSource`
    pub fn into_handler(self) -> BlockHandler {
        Box::new(move |block| match self.on_block(block) {
            GateDecision::Stop => StreamControl::Stop,
            _ => StreamControl::Continue,
        })
    }
}

/// Ouvre la source et la fait tourner jusqu'à l'arrêt
///
/// Un micro absent ou perdu est journalisé : le reste du sidecar continue.
pub fn run_capture<F>(open_source: F, gate: CaptureGate)
where
    F: FnOnce() -> AudioResult<Box<dyn AudioSource>>,
{
    let mut source = match open_source() {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "❌ Capture indisponible");
            return;
        }
    };

    info!("🎤 Capture démarrée sur {}", source.device_info());
    match source.run(gate.into_handler()) {
        Ok(()) => info!("Capture arrêtée"),
        Err(e) => error!(error = %e, "❌ Capture interrompue"),
    }
}
