//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioSource en utilisant la librairie cpal
//! (Cross-Platform Audio Library) pour capturer l'audio depuis le microphone.
//!
//! # Architecture thread
//!
//! cpal fonctionne avec des callbacks. Quand des données audio arrivent,
//! cpal appelle notre fonction qui accumule les échantillons jusqu'à former
//! un bloc exact de 960 échantillons, puis le passe au handler.
//! Le thread qui a appelé `run()` attend simplement, sur un channel, que le
//! handler demande l'arrêt. Le `Stream` cpal n'est pas `Send` : il naît et
//! meurt sur ce thread.

use std::sync::mpsc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Sample, SampleFormat, SizedSample, Stream, StreamConfig, SupportedBufferSize};
use tracing::{error, info, warn};

use crate::{AudioConfig, AudioError, AudioResult, AudioSource, BlockHandler, StreamControl};

/// Paramètres de flux retenus pour un périphérique
#[derive(Clone, Debug)]
pub(crate) struct NegotiatedStream {
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
}

/// Implémentation de capture audio avec cpal
pub struct CpalCapture {
    /// Périphérique audio d'entrée (microphone)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalCapture {
    /// Crée une nouvelle instance de capture sur le microphone par défaut
    ///
    /// La capture ne démarre qu'à l'appel de `run()`.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun microphone n'est disponible
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device.description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        info!(device = %device_name, "🎤 Périphérique de capture trouvé");

        Ok(Self {
            device,
            config,
            device_name,
        })
    }

    /// Choisit une configuration 48 kHz supportée par le micro
    ///
    /// Préfère le mono et le format F32 ; à défaut, le premier canal d'un
    /// flux multi-canaux sera utilisé.
    fn negotiate(&self) -> AudioResult<NegotiatedStream> {
        let ranges: Vec<_> = self.device.supported_input_configs()?.collect();
        negotiate_stream(ranges, &self.config)
    }

    /// Construit le flux cpal pour un format d'échantillon donné
    fn build_typed<T>(
        &self,
        negotiated: &NegotiatedStream,
        mut handler: BlockHandler,
        stop_tx: mpsc::Sender<AudioResult<()>>,
    ) -> AudioResult<Stream>
    where
        T: SizedSample,
        f32: cpal::FromSample<T>,
    {
        let frame_len = self.config.samples_per_frame();
        let channels = negotiated.config.channels.max(1) as usize;
        let error_tx = stop_tx.clone();

        let mut block: Vec<f32> = Vec::with_capacity(frame_len);
        let mut stopped = false;

        let stream = self.device.build_input_stream(
            &negotiated.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if stopped {
                    return;
                }
                // Premier canal de chaque trame entrelacée
                for frame in data.chunks(channels) {
                    block.push(frame[0].to_sample::<f32>());

                    if block.len() == frame_len {
                        if handler(&block) == StreamControl::Stop {
                            stopped = true;
                            let _ = stop_tx.send(Ok(()));
                            return;
                        }
                        block.clear();
                    }
                }
            },
            move |err| {
                error!(error = %err, "❌ Erreur stream audio");
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    let _ = error_tx.send(Err(AudioError::DeviceDisconnected));
                }
            },
            None,
        )?;

        Ok(stream)
    }
}

impl AudioSource for CpalCapture {
    fn run(&mut self, handler: BlockHandler) -> AudioResult<()> {
        let negotiated = self.negotiate()?;
        let (stop_tx, stop_rx) = mpsc::channel();

        info!(
            channels = negotiated.config.channels,
            format = ?negotiated.sample_format,
            buffer = ?negotiated.config.buffer_size,
            "🎵 Démarrage capture"
        );

        let stream = match negotiated.sample_format {
            SampleFormat::F32 => self.build_typed::<f32>(&negotiated, handler, stop_tx)?,
            SampleFormat::I16 => self.build_typed::<i16>(&negotiated, handler, stop_tx)?,
            SampleFormat::U16 => self.build_typed::<u16>(&negotiated, handler, stop_tx)?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    other
                )))
            }
        };
        stream.play()?;

        // Attend la transition terminale (handler → Stop) ou la perte du micro
        let outcome = stop_rx.recv().unwrap_or(Err(AudioError::DeviceDisconnected));

        if let Err(e) = stream.pause() {
            warn!(error = ?e, "Impossible de mettre le flux de capture en pause");
        }
        drop(stream);

        info!("🛑 Capture audio arrêtée");
        outcome
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Sélectionne la configuration de flux parmi les plages supportées
///
/// Partagé entre capture et lecture : le critère est identique des deux côtés.
pub(crate) fn negotiate_stream(
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    config: &AudioConfig,
) -> AudioResult<NegotiatedStream> {
    let rate = config.sample_rate;
    let usable: Vec<_> = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && r.max_sample_rate() >= rate)
        .filter(|r| matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16))
        .collect();

    let format_rank = |f: SampleFormat| match f {
        SampleFormat::F32 => 0,
        SampleFormat::I16 => 1,
        _ => 2,
    };

    let best = usable
        .iter()
        .min_by_key(|r| (r.channels() != config.channels, r.channels(), format_rank(r.sample_format())))
        .ok_or_else(|| {
            AudioError::ConfigError(format!("Sample rate {} Hz non supporté par le périphérique", rate))
        })?;

    let frames = config.samples_per_frame() as u32;
    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max } if *min <= frames && frames <= *max => BufferSize::Fixed(frames),
        _ => BufferSize::Default,
    };

    Ok(NegotiatedStream {
        config: StreamConfig {
            channels: best.channels(),
            sample_rate: rate,
            buffer_size,
        },
        sample_format: best.sample_format(),
    })
}
