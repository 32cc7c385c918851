//! Module de compression/décompression audio avec Opus
//!
//! Ce module implémente le trait AudioCodec en utilisant la librairie Opus.
//! Le client réseau compresse les blocs PCM 16 bits du micro avant de les
//! envoyer, et décompresse les paquets reçus avant de les remettre au relais.
//!
//! Opus est particulièrement adapté pour VoIP car il :
//! - Supporte des débits très bas (6-128 kbps)
//! - A une latence très faible (2.5-60ms)
//! - Résiste bien aux pertes de paquets réseau

use opus::{Application, Channels, Decoder, Encoder};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{AudioCodec, AudioConfig, AudioError, AudioFrame, AudioResult, CompressedFrame};

/// Implémentation du codec Opus
///
/// L'encodeur et le décodeur sont protégés par un Mutex : une même instance
/// peut ainsi être partagée entre la tâche d'envoi et la tâche de réception
/// du client réseau.
pub struct OpusCodec {
    /// Structure interne protégée par Mutex
    inner: Mutex<OpusCodecInner>,
}

/// Structure interne contenant les vrais codecs Opus
struct OpusCodecInner {
    encoder: Encoder,
    decoder: Decoder,
    config: AudioConfig,

    /// Buffer pour les données compressées
    compressed_buffer: Vec<u8>,

    /// Buffer pour les échantillons décompressés
    decompressed_buffer: Vec<i16>,
}

impl OpusCodec {
    /// Crée un nouveau codec Opus
    ///
    /// # Erreurs
    /// - `AudioError::OpusError` si l'initialisation échoue
    /// - `AudioError::ConfigError` si la configuration n'est pas supportée
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let opus_channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => return Err(AudioError::ConfigError(format!(
                "Nombre de canaux non supporté par Opus: {}", config.channels
            ))),
        };

        // Application::Voip optimise pour la voix
        let mut encoder = Encoder::new(config.sample_rate, opus_channels, Application::Voip)
            .map_err(|e| AudioError::OpusError(format!("Impossible de créer l'encodeur: {:?}", e)))?;

        encoder.set_bitrate(opus::Bitrate::Bits(config.opus_bitrate as i32))
            .map_err(|e| AudioError::OpusError(format!("Impossible de définir le bitrate: {:?}", e)))?;
        encoder.set_vbr(true)
            .map_err(|e| AudioError::OpusError(format!("Impossible d'activer VBR: {:?}", e)))?;

        let decoder = Decoder::new(config.sample_rate, opus_channels)
            .map_err(|e| AudioError::OpusError(format!("Impossible de créer le décodeur: {:?}", e)))?;

        let max_compressed_size = config.max_compressed_frame_size();
        let max_samples = config.samples_per_frame() * config.channels as usize;

        info!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            bitrate = config.opus_bitrate,
            "🎵 Codec Opus initialisé"
        );

        let inner = OpusCodecInner {
            encoder,
            decoder,
            config,
            compressed_buffer: vec![0u8; max_compressed_size],
            decompressed_buffer: vec![0i16; max_samples],
        };

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> AudioResult<MutexGuard<'_, OpusCodecInner>> {
        self.inner
            .lock()
            .map_err(|_| AudioError::OpusError("verrou du codec empoisonné".to_string()))
    }
}

impl AudioCodec for OpusCodec {
    fn encode(&mut self, frame: &AudioFrame, sequence_number: u64) -> AudioResult<CompressedFrame> {
        let mut inner = self.lock()?;

        let expected_samples = inner.config.samples_per_frame() * inner.config.channels as usize;
        if frame.len() != expected_samples {
            return Err(AudioError::OpusError(format!(
                "Taille de frame incorrecte: {} échantillons (attendu: {})",
                frame.len(),
                expected_samples
            )));
        }

        // Destructuring pour emprunter l'encodeur et le buffer en même temps
        let encoded_size = {
            let OpusCodecInner { encoder, compressed_buffer, .. } = &mut *inner;
            encoder
                .encode(frame.samples(), compressed_buffer)
                .map_err(|e| AudioError::OpusError(format!("Erreur encodage: {:?}", e)))?
        };

        let compressed_data = inner.compressed_buffer[..encoded_size].to_vec();
        Ok(CompressedFrame::new(compressed_data, frame.len(), sequence_number))
    }

    fn decode(&mut self, compressed: &CompressedFrame) -> AudioResult<AudioFrame> {
        let mut inner = self.lock()?;

        let expected_samples = compressed.original_sample_count;
        if inner.decompressed_buffer.len() < expected_samples {
            inner.decompressed_buffer.resize(expected_samples, 0);
        }

        let decoded_samples = {
            let OpusCodecInner { decoder, decompressed_buffer, .. } = &mut *inner;
            decoder
                .decode(&compressed.data, &mut decompressed_buffer[..expected_samples], false)
                .map_err(|e| AudioError::OpusError(format!("Erreur décodage Opus: {:?}", e)))?
        };

        if decoded_samples != expected_samples {
            return Err(AudioError::OpusError(format!(
                "Décodage incohérent: {} échantillons décodés (attendu: {})",
                decoded_samples,
                expected_samples
            )));
        }

        Ok(AudioFrame::new(inner.decompressed_buffer[..decoded_samples].to_vec()))
    }

    fn reset(&mut self) -> AudioResult<()> {
        let mut inner = self.lock()?;
        inner.encoder.reset_state()?;
        inner.decoder.reset_state()?;
        debug!("🔄 Codec Opus réinitialisé");
        Ok(())
    }

    fn codec_info(&self) -> String {
        match self.lock() {
            Ok(inner) => format!(
                "Opus Codec - {}Hz, {} ch, {}bps",
                inner.config.sample_rate, inner.config.channels, inner.config.opus_bitrate
            ),
            Err(_) => "Opus Codec".to_string(),
        }
    }
}
