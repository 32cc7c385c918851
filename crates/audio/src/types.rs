//! Types de données pour le système audio
//!
//! Ce module définit les structures principales pour manipuler l'audio :
//! - AudioFrame : bloc PCM mono 16 bits, immuable une fois construit
//! - CompressedFrame : frame audio compressée avec Opus
//! - Sample : type d'un échantillon PCM

use std::time::Instant;
use serde::{Deserialize, Serialize};

use crate::{pcm, AudioResult, SAMPLE_RATE};

/// Type pour un échantillon PCM 16 bits signé
///
/// - 0 = silence
/// - ±32767 = amplitude maximale
pub type Sample = i16;

/// Bloc d'audio brut mono (non compressé)
///
/// Un bloc contient typiquement 960 échantillons, soit 20 ms à 48 kHz.
/// Les échantillons ne sont accessibles qu'en lecture : une frame
/// mise dans la file de lecture ne peut plus être modifiée.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<Sample>,
}

impl AudioFrame {
    /// Crée une nouvelle frame à partir d'échantillons mono
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![0, 1200, -1200, 0]);
    /// assert_eq!(frame.len(), 4);
    /// ```
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Crée une frame de silence
    pub fn silence(sample_count: usize) -> Self {
        Self::new(vec![0; sample_count])
    }

    /// Reconstruit une frame depuis des bytes PCM little-endian
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPcm` si le nombre de bytes est impair
    pub fn from_le_bytes(bytes: &[u8]) -> AudioResult<Self> {
        Ok(Self::new(pcm::le_bytes_to_samples(bytes)?))
    }

    /// Accès en lecture aux échantillons
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Consomme la frame et rend ses échantillons
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sérialise les échantillons en bytes little-endian
    pub fn to_le_bytes(&self) -> Vec<u8> {
        pcm::samples_to_le_bytes(&self.samples)
    }

    /// Calcule la durée de cette frame en millisecondes (48 kHz mono)
    pub fn duration_ms(&self) -> f32 {
        (self.samples.len() as f32 / SAMPLE_RATE as f32) * 1000.0
    }
}

/// Frame d'audio compressée avec Opus
///
/// C'est la charge utile transportée par les paquets du client réseau.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressedFrame {
    /// Données compressées par Opus
    pub data: Vec<u8>,

    /// Nombre d'échantillons dans la frame originale
    ///
    /// Nécessaire pour reconstruire une AudioFrame de la bonne taille
    pub original_sample_count: usize,

    /// Timestamp de création (avant compression)
    #[serde(skip)]
    pub timestamp: Instant,

    /// Numéro de séquence de la frame originale
    pub sequence_number: u64,
}

impl Default for CompressedFrame {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            original_sample_count: 0,
            timestamp: Instant::now(),
            sequence_number: 0,
        }
    }
}

impl CompressedFrame {
    /// Crée une nouvelle frame compressée
    pub fn new(data: Vec<u8>, original_sample_count: usize, sequence_number: u64) -> Self {
        Self {
            data,
            original_sample_count,
            timestamp: Instant::now(),
            sequence_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frame_creation() {
        let frame = AudioFrame::new(vec![100, -200, 300, 0]);

        assert_eq!(frame.samples(), &[100, -200, 300, 0]);
        assert_eq!(frame.len(), 4);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_frame_duration() {
        let frame = AudioFrame::silence(960);
        assert!((frame.duration_ms() - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_frame_bytes_are_little_endian() {
        let frame = AudioFrame::new(vec![1, -2]);
        assert_eq!(frame.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);

        let back = AudioFrame::from_le_bytes(&frame.to_le_bytes()).unwrap();
        assert_eq!(back, frame);
    }
}
