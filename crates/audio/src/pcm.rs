//! Conversions PCM
//!
//! Fonctions pures utilisées aux deux extrémités du relais :
//! - côté capture : flottants [-1.0, 1.0] du micro → PCM 16 bits
//! - côté réception : PCM multi-canaux → mono 16 bits

use crate::{AudioError, AudioResult, Sample};

/// Facteur d'échelle flottant → 16 bits
pub const PCM_SCALE: f32 = 32767.0;

/// Convertit un échantillon flottant en PCM 16 bits
///
/// L'échantillon est écrêté à [-1.0, 1.0], multiplié par 32767 puis
/// tronqué vers zéro. Un NaN donne 0.
pub fn float_to_pcm16(sample: f32) -> Sample {
    // `as` tronque vers zéro et sature, NaN → 0
    (sample.clamp(-1.0, 1.0) * PCM_SCALE) as Sample
}

/// Convertit un bloc complet d'échantillons flottants
pub fn float_block_to_pcm16(block: &[f32]) -> Vec<Sample> {
    block.iter().map(|&s| float_to_pcm16(s)).collect()
}

/// Sérialise des échantillons en bytes little-endian
pub fn samples_to_le_bytes(samples: &[Sample]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Relit des bytes little-endian en échantillons
///
/// # Erreurs
/// - `AudioError::InvalidPcm` si la longueur est impaire
pub fn le_bytes_to_samples(bytes: &[u8]) -> AudioResult<Vec<Sample>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::InvalidPcm(format!(
            "longueur impaire: {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| Sample::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Ramène un flux entrelacé multi-canaux en mono
///
/// Pour chaque instant, les valeurs des canaux sont moyennées puis
/// arrondies à l'entier le plus proche. Un flux mono est rendu tel quel.
///
/// # Erreurs
/// - `AudioError::InvalidPcm` si `channels` vaut 0 ou si la longueur
///   n'est pas un multiple du nombre de canaux
///
/// # Example
/// ```rust
/// use audio::pcm::downmix_to_mono;
///
/// let stereo = vec![100, 201, -4, -5];
/// assert_eq!(downmix_to_mono(&stereo, 2).unwrap(), vec![151, -5]);
/// ```
pub fn downmix_to_mono(interleaved: &[Sample], channels: u16) -> AudioResult<Vec<Sample>> {
    if channels == 0 {
        return Err(AudioError::InvalidPcm("0 canal".to_string()));
    }

    let channels = channels as usize;
    if channels == 1 {
        return Ok(interleaved.to_vec());
    }

    if interleaved.len() % channels != 0 {
        return Err(AudioError::InvalidPcm(format!(
            "{} échantillons pour {} canaux",
            interleaved.len(),
            channels
        )));
    }

    Ok(interleaved
        .chunks_exact(channels)
        .map(|group| {
            let sum: i64 = group.iter().map(|&s| s as i64).sum();
            (sum as f64 / channels as f64).round() as Sample
        })
        .collect())
}
