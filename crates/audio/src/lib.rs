//! Crate audio pour le sidecar Voc
//!
//! Ce crate gère les deux extrémités matérielles du relais vocal :
//! - Capture microphone avec cpal (blocs de 960 échantillons, 48 kHz mono)
//! - Lecture synchrone sur les haut-parleurs avec cpal
//! - Conversions PCM (flottant → 16 bits, downmix mono)
//! - Compression/décompression Opus pour le client réseau

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, etc.)
pub mod traits;      // Traits abstraits
pub mod pcm;         // Conversions PCM pures
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Implémentation lecture avec cpal
pub mod codec;       // Implémentation Opus
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::CpalCapture;
pub use playback::CpalPlayback;
pub use codec::OpusCodec;
