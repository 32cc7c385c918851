//! Canal de contrôle local
//!
//! Le processus hôte pilote le sidecar par des datagrammes UDP contenant un
//! objet JSON sur 127.0.0.1 :
//!
//! ```text
//! {"cmd": "ptt", "state": true}
//! {"cmd": "join", "channel": "Lobby"}
//! {"cmd": "leave"}
//! {"cmd": "shutdown"}
//! ```
//!
//! Un datagramme illisible est journalisé et ignoré, le listener continue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use network::ROOT_CHANNEL_ID;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::{ConferenceAdapter, ControlError, SharedState, SidecarError, SidecarResult};

/// Taille maximale d'un datagramme UDP
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Commande reçue sur le canal de contrôle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum ControlMessage {
    /// `state` absent ou `null` vaut `false`
    Ptt {
        #[serde(default, deserialize_with = "null_as_false")]
        state: bool,
    },

    /// `channel` absent : canal par défaut ; `""` : racine
    Join {
        #[serde(default)]
        channel: Option<String>,
    },

    Leave,

    Shutdown,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl ControlMessage {
    const COMMANDS: [&'static str; 4] = ["ptt", "join", "leave", "shutdown"];

    /// Décode un datagramme : UTF-8, puis objet JSON avec un champ `cmd`
    pub fn parse(payload: &[u8]) -> Result<Self, ControlError> {
        let text = std::str::from_utf8(payload)?;
        let value: serde_json::Value = serde_json::from_str(text)?;

        match value.get("cmd").and_then(serde_json::Value::as_str) {
            None => return Err(ControlError::MissingCommand),
            Some(cmd) if !Self::COMMANDS.iter().any(|known| *known == cmd) => {
                return Err(ControlError::UnknownCommand(cmd.to_string()));
            }
            Some(_) => {}
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Suite à donner après une commande
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Stop,
}

/// Écoute le socket de contrôle et applique les commandes
pub struct ControlListener {
    socket: UdpSocket,
    state: Arc<SharedState>,
    conference: Arc<ConferenceAdapter>,
    default_channel: String,
    poll_interval: Duration,
}

impl ControlListener {
    /// Ouvre le socket de contrôle sur 127.0.0.1
    ///
    /// Le port 0 laisse l'OS choisir ; `local_port()` donne le port effectif.
    pub async fn bind(
        port: u16,
        state: Arc<SharedState>,
        conference: Arc<ConferenceAdapter>,
        default_channel: impl Into<String>,
        poll_interval: Duration,
    ) -> SidecarResult<Self> {
        let socket = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], port)))
            .await
            .map_err(|source| SidecarError::ControlBind { port, source })?;

        Ok(Self {
            socket,
            state,
            conference,
            default_channel: default_channel.into(),
            poll_interval,
        })
    }

    pub fn local_port(&self) -> SidecarResult<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Applique une commande à l'état partagé et à la session
    pub fn apply(&self, message: ControlMessage) -> ControlFlow {
        match message {
            ControlMessage::Ptt { state } => {
                self.state.set_ptt(state);
                ControlFlow::Continue
            }
            ControlMessage::Join { channel } => {
                let name = channel.unwrap_or_else(|| self.default_channel.clone());
                let channel_id = self.conference.resolve_channel(&name);
                debug!(channel = %name, channel_id, "join");
                self.conference.move_to_channel(channel_id);
                ControlFlow::Continue
            }
            ControlMessage::Leave => {
                self.conference.move_to_channel(ROOT_CHANNEL_ID);
                ControlFlow::Continue
            }
            ControlMessage::Shutdown => {
                self.state.request_shutdown();
                ControlFlow::Stop
            }
        }
    }

    /// Traite un datagramme brut
    pub fn handle_datagram(&self, payload: &[u8]) -> ControlFlow {
        match ControlMessage::parse(payload) {
            Ok(message) => self.apply(message),
            Err(e) => {
                warn!(error = %e, "⚠️ Datagramme de contrôle ignoré");
                ControlFlow::Continue
            }
        }
    }

    /// Boucle de réception jusqu'à l'arrêt
    pub async fn run(self) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        info!("🎛️ Contrôle à l'écoute");

        while !self.state.is_shutdown() {
            let received = tokio::time::timeout(self.poll_interval, self.socket.recv_from(&mut buffer)).await;

            match received {
                // Pas de datagramme : on revérifie le drapeau d'arrêt
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "Erreur de réception sur le socket de contrôle");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Ok(Ok((len, from))) => {
                    debug!(%from, len, "Datagramme de contrôle reçu");
                    if self.handle_datagram(&buffer[..len]) == ControlFlow::Stop {
                        break;
                    }
                }
            }
        }

        info!("Contrôle arrêté");
    }
}
