//! Traits abstraits pour le système audio
//!
//! Les périphériques sont vus comme des capacités externes :
//! - une source qui *pousse* des blocs capturés vers un handler
//! - un sink qui *accepte* un bloc à jouer et rend la main une fois joué
//!
//! La logique de décision (gate PTT, conversion, file de lecture) vit
//! dans le sidecar et ne dépend que de ces traits, ce qui permet de la
//! tester avec des périphériques factices.

use crate::{AudioFrame, AudioResult, CompressedFrame};

/// Réponse d'un handler de capture après chaque bloc
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StreamControl {
    /// Continuer à livrer des blocs
    Continue,
    /// Arrêter le flux : transition terminale
    Stop,
}

/// Handler appelé pour chaque bloc capturé
///
/// Le bloc contient exactement `samples_per_frame` échantillons flottants
/// mono dans [-1.0, 1.0]. Le handler est appelé depuis le thread temps réel
/// du périphérique : il ne doit jamais bloquer.
pub type BlockHandler = Box<dyn FnMut(&[f32]) -> StreamControl + Send + 'static>;

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Implémentations :
/// - CpalCapture : microphone réel via cpal
/// - sources scriptées dans les tests du sidecar
pub trait AudioSource {
    /// Démarre la capture et livre les blocs au handler
    ///
    /// Bloque le thread appelant jusqu'à ce que le handler renvoie
    /// `StreamControl::Stop`, puis libère le périphérique.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` : aucun microphone
    /// - `AudioError::ConfigError` : format 48 kHz mono non supporté
    fn run(&mut self, handler: BlockHandler) -> AudioResult<()>;

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour jouer l'audio sur un périphérique de sortie
pub trait AudioSink {
    /// Joue une frame de façon synchrone
    ///
    /// Ne rend la main qu'une fois la frame entièrement consommée par le
    /// périphérique : l'appelant sérialise ainsi la lecture.
    ///
    /// # Erreurs
    /// - `AudioError::Timeout` : le périphérique ne consomme plus
    /// - `AudioError::DeviceDisconnected` : haut-parleurs débranchés
    fn render(&mut self, frame: &AudioFrame) -> AudioResult<()>;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Trait pour encoder/décoder l'audio avec un codec
///
/// L'implémentation principale utilise Opus.
pub trait AudioCodec: Send {
    /// Encode (compresse) une frame audio
    ///
    /// # Example
    /// ```rust,no_run
    /// use audio::{AudioCodec, OpusCodec, AudioFrame, AudioConfig};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = AudioConfig::default();
    /// let mut codec = OpusCodec::new(config)?;
    ///
    /// let frame = AudioFrame::silence(960);
    /// let compressed = codec.encode(&frame, 1)?;
    ///
    /// println!("Frame compressée : {} bytes", compressed.data.len());
    /// # Ok(())
    /// # }
    /// ```
    fn encode(&mut self, frame: &AudioFrame, sequence_number: u64) -> AudioResult<CompressedFrame>;

    /// Décode (décompresse) une frame audio
    fn decode(&mut self, compressed: &CompressedFrame) -> AudioResult<AudioFrame>;

    /// Réinitialise l'état interne du codec
    ///
    /// Utile après une reconnexion : les prédictions de l'ancienne
    /// session n'ont plus de sens.
    fn reset(&mut self) -> AudioResult<()>;

    /// Retourne des informations sur la configuration du codec
    fn codec_info(&self) -> String {
        "Codec audio".to_string()
    }
}
