//! Configuration audio pour le sidecar Voc
//!
//! Le format des flux est figé : 48 kHz, mono, blocs de 20 ms.
//! Les deux côtés (micro et haut-parleurs) utilisent exactement le même format,
//! ce qui évite tout rééchantillonnage dans le cœur du relais.

use serde::{Deserialize, Serialize};

/// Fréquence d'échantillonnage imposée aux périphériques
pub const SAMPLE_RATE: u32 = 48_000;

/// Nombre d'échantillons par bloc (20 ms à 48 kHz)
pub const SAMPLES_PER_FRAME: usize = 960;

/// Configuration principale pour tout le système audio
///
/// Contient les paramètres des flux cpal et ceux de l'encodeur Opus
/// utilisé par le client réseau.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage en Hz
    pub sample_rate: u32,

    /// Nombre de canaux audio (1 = mono, seul mode utilisé par le relais)
    pub channels: u16,

    /// Durée de chaque bloc audio en millisecondes
    pub frame_duration_ms: u16,

    /// Débit cible pour la compression Opus en bits par seconde
    pub opus_bitrate: u32,

    /// Complexité de l'encodeur Opus (0-10)
    pub opus_complexity: u32,
}

impl Default for AudioConfig {
    /// Configuration par défaut : format fixe du sidecar
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,   // 48 kHz
            channels: 1,                // Mono pour la voix
            frame_duration_ms: 20,      // 20ms - standard VoIP
            opus_bitrate: 32000,        // 32 kbps
            opus_complexity: 5,
        }
    }
}

impl AudioConfig {
    /// Calcule le nombre d'échantillons par bloc
    ///
    /// Formule : (sample_rate * frame_duration_ms) / 1000
    /// Exemple : (48000 * 20) / 1000 = 960 échantillons
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Taille en bytes d'un bloc PCM 16 bits (2 bytes par échantillon)
    pub fn frame_size_bytes(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * 2
    }

    /// Taille maximale estimée d'une frame compressée Opus
    pub fn max_compressed_frame_size(&self) -> usize {
        4000
    }

    /// Durée d'un bloc
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_duration_ms as u64)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 48000 {
            return Err(format!("Sample rate invalide: {} (doit être entre 8000 et 48000)", self.sample_rate));
        }

        if self.channels == 0 || self.channels > 2 {
            return Err(format!("Nombre de canaux invalide: {} (doit être 1 ou 2)", self.channels));
        }

        if self.frame_duration_ms < 10 || self.frame_duration_ms > 60 {
            return Err(format!("Durée de frame invalide: {}ms (doit être entre 10 et 60)", self.frame_duration_ms));
        }

        if self.opus_bitrate < 6000 || self.opus_bitrate > 128000 {
            return Err(format!("Bitrate Opus invalide: {} (doit être entre 6000 et 128000)", self.opus_bitrate));
        }

        if self.opus_complexity > 10 {
            return Err(format!("Complexité Opus invalide: {} (doit être entre 0 et 10)", self.opus_complexity));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.samples_per_frame(), SAMPLES_PER_FRAME);
        assert_eq!(config.frame_size_bytes(), 1920); // 960 * 2 bytes
        assert_eq!(config.frame_duration().as_millis(), 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.sample_rate = 1000; // Trop bas
        assert!(config.validate().is_err());

        config.sample_rate = 48000;
        config.channels = 0; // Invalide
        assert!(config.validate().is_err());

        config.channels = 1;
        config.opus_complexity = 11;
        assert!(config.validate().is_err());
    }
}
