//! Sidecar vocal headless
//!
//! Relie le micro et les haut-parleurs locaux à une session de conférence
//! vocale. Un processus hôte le pilote par des commandes JSON envoyées en
//! UDP sur 127.0.0.1 (push-to-talk, changement de canal, arrêt).
//!
//! - `state` : drapeaux partagés et file de lecture bornée
//! - `channels` : résolution nom → identifiant de canal
//! - `conference` : pont vers le `VoiceClient`
//! - `control` : listener du canal de contrôle
//! - `capture` / `playback` : boucles audio
//! - `supervisor` : démarrage, attente et arrêt des workers

pub mod capture;
pub mod channels;
pub mod conference;
pub mod config;
pub mod control;
pub mod error;
pub mod playback;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use channels::ChannelDirectory;
pub use conference::ConferenceAdapter;
pub use config::SidecarConfig;
pub use control::{ControlListener, ControlMessage};
pub use error::{ControlError, SidecarError, SidecarResult};
pub use state::{PlaybackQueue, SharedState};
pub use supervisor::{
    RunningSidecar, SidecarReport, SinkFactory, SourceFactory, StartupSignals, StdoutSignals, Supervisor,
};
