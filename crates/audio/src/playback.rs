//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente le trait AudioSink en utilisant la librairie cpal
//! pour jouer l'audio via les haut-parleurs ou casque.
//!
//! # Architecture thread
//!
//! Le thread de lecture dépose les échantillons d'une frame dans un buffer
//! partagé via `render()`, puis attend sur une Condvar que le callback cpal
//! (thread temps réel) l'ait entièrement vidé. Une seule frame est donc en
//! vol à la fois : la file d'attente en amont reste la seule zone tampon.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Sample, SampleFormat, SizedSample, Stream};
use tracing::{debug, error, info, warn};

use crate::capture::{negotiate_stream, NegotiatedStream};
use crate::{AudioConfig, AudioError, AudioFrame, AudioResult, AudioSink};

/// Marge ajoutée à la durée d'une frame avant de déclarer un timeout
const RENDER_SLACK: Duration = Duration::from_millis(250);

fn poisoned<E>(_: E) -> AudioError {
    AudioError::InitializationError("buffer de lecture empoisonné".to_string())
}

/// Buffer partagé entre `render()` et le callback cpal
struct RenderBuffer {
    samples: Mutex<VecDeque<i16>>,

    /// Signalé quand le callback a vidé le buffer
    drained: Condvar,

    /// Positionné par le callback d'erreur quand le périphérique disparaît
    disconnected: AtomicBool,

    /// Nombre de callbacks servis (au moins en partie) avec du silence
    underruns: AtomicU64,
}

/// Implémentation de lecture audio avec cpal
pub struct CpalPlayback {
    /// Périphérique audio de sortie (haut-parleurs)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None une fois arrêté)
    stream: Option<Stream>,

    shared: Arc<RenderBuffer>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalPlayback {
    /// Crée une nouvelle instance de lecture et démarre le flux de sortie
    ///
    /// Le flux joue du silence jusqu'au premier `render()`.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun haut-parleur n'est disponible
    /// - `AudioError::ConfigError` si aucun format de sortie ne convient
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device.description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        info!(device = %device_name, "🔊 Périphérique de lecture trouvé");

        let capacity = config.samples_per_frame() * 2;
        let mut playback = Self {
            device,
            config,
            stream: None,
            shared: Arc::new(RenderBuffer {
                samples: Mutex::new(VecDeque::with_capacity(capacity)),
                drained: Condvar::new(),
                disconnected: AtomicBool::new(false),
                underruns: AtomicU64::new(0),
            }),
            device_name,
        };
        playback.start()?;
        Ok(playback)
    }

    /// Ouvre et démarre le flux de sortie
    fn start(&mut self) -> AudioResult<()> {
        let ranges: Vec<_> = self.device.supported_output_configs()?.collect();
        let negotiated = negotiate_stream(ranges, &self.config)?;

        info!(
            channels = negotiated.config.channels,
            format = ?negotiated.sample_format,
            buffer = ?negotiated.config.buffer_size,
            "🎵 Démarrage lecture"
        );

        let stream = match negotiated.sample_format {
            SampleFormat::F32 => self.build_typed::<f32>(&negotiated)?,
            SampleFormat::I16 => self.build_typed::<i16>(&negotiated)?,
            SampleFormat::U16 => self.build_typed::<u16>(&negotiated)?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )))
            }
        };
        stream.play()?;

        self.stream = Some(stream);
        Ok(())
    }

    fn build_typed<T>(&self, negotiated: &NegotiatedStream) -> AudioResult<Stream>
    where
        T: SizedSample + cpal::FromSample<i16>,
    {
        let channels = negotiated.config.channels.max(1) as usize;
        let shared = Arc::clone(&self.shared);
        let error_shared = Arc::clone(&self.shared);

        let stream = self.device.build_output_stream(
            &negotiated.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                // Ne jamais bloquer le thread temps réel
                let mut queue = match shared.samples.try_lock() {
                    Ok(queue) => queue,
                    Err(_) => {
                        data.fill(T::EQUILIBRIUM);
                        return;
                    }
                };

                let mut starved = false;
                for frame in data.chunks_mut(channels) {
                    let value = match queue.pop_front() {
                        Some(sample) => T::from_sample(sample),
                        None => {
                            starved = true;
                            T::EQUILIBRIUM
                        }
                    };
                    frame.fill(value);
                }

                if starved {
                    shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
                if queue.is_empty() {
                    shared.drained.notify_all();
                }
            },
            move |err| {
                error!(error = %err, "❌ Erreur stream de sortie");
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    error_shared.disconnected.store(true, Ordering::SeqCst);
                    error_shared.drained.notify_all();
                }
            },
            None,
        )?;

        Ok(stream)
    }

    /// Nombre de callbacks ayant manqué de données
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Arrête le flux de sortie
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!(error = ?e, "Impossible de mettre le flux de sortie en pause");
            }
            debug!(underruns = self.underruns(), "🛑 Lecture audio arrêtée");
        }
    }
}

impl AudioSink for CpalPlayback {
    fn render(&mut self, frame: &AudioFrame) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::InitializationError("flux de sortie arrêté".to_string()));
        }

        let shared = &self.shared;
        if shared.disconnected.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceDisconnected);
        }

        let timeout = Duration::from_secs_f32(frame.duration_ms() / 1000.0) * 2 + RENDER_SLACK;

        let mut queue = shared.samples.lock().map_err(poisoned)?;
        queue.extend(frame.samples().iter().copied());

        let (mut queue, wait) = shared
            .drained
            .wait_timeout_while(queue, timeout, |q| {
                !q.is_empty() && !shared.disconnected.load(Ordering::SeqCst)
            })
            .map_err(poisoned)?;

        if shared.disconnected.load(Ordering::SeqCst) {
            queue.clear();
            return Err(AudioError::DeviceDisconnected);
        }
        if wait.timed_out() {
            queue.clear();
            return Err(AudioError::Timeout);
        }

        Ok(())
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
