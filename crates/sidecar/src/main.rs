// Sidecar vocal headless
//
// Relaie le micro et les haut-parleurs locaux vers un serveur de conférence.
// stdout ne porte que deux lignes destinées au processus hôte :
//   [sidecar] control_port=<port>
//   [sidecar] connected to murmur
// Tous les logs partent sur stderr (filtre : RUST_LOG, sinon --log-level).

use std::sync::Arc;

use anyhow::Context;
use audio::{AudioSink, AudioSource, CpalCapture, CpalPlayback};
use clap::Parser;
use network::UdpVoiceClient;
use sidecar::config::{DEFAULT_CHANNEL, DEFAULT_CONTROL_PORT, DEFAULT_SERVER_PORT};
use sidecar::{SidecarConfig, SinkFactory, SourceFactory, StdoutSignals, Supervisor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Sidecar vocal headless piloté en UDP local")]
struct Args {
    /// Adresse du serveur de conférence
    #[arg(long)]
    server: String,

    #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    #[arg(long)]
    username: String,

    #[arg(long)]
    password: Option<String>,

    /// Canal rejoint au démarrage
    #[arg(long, default_value = DEFAULT_CHANNEL)]
    channel: String,

    /// Port UDP de contrôle sur 127.0.0.1 (0 = choisi par l'OS)
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    ctrl_port: u16,

    /// Niveau de log si RUST_LOG n'est pas défini
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> SidecarConfig {
        let mut config = SidecarConfig::new(self.server, self.username);
        config.port = self.port;
        config.password = self.password;
        config.channel = self.channel;
        config.control_port = self.ctrl_port;
        config
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).with_context(|| format!("Niveau de log invalide: {}", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = args.into_config();
    config.validate()?;
    info!("🎧 Sidecar vocal v{} ({:?})", env!("CARGO_PKG_VERSION"), config);

    let client = UdpVoiceClient::new(config.network.clone(), config.audio.clone())
        .context("Création du client vocal")?;

    let capture_config = config.audio.clone();
    let open_source: SourceFactory =
        Box::new(move || Ok(Box::new(CpalCapture::new(capture_config)?) as Box<dyn AudioSource>));

    let playback_config = config.audio.clone();
    let open_sink: SinkFactory =
        Box::new(move || Ok(Box::new(CpalPlayback::new(playback_config)?) as Box<dyn AudioSink>));

    let report = Supervisor::new(config, Arc::new(client), open_source, open_sink, Arc::new(StdoutSignals))
        .run()
        .await
        .context("Échec du sidecar")?;

    info!(forwarded = report.frames_forwarded, rendered = report.frames_rendered, "👋 Au revoir !");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("voc-sidecar").chain(args.iter().copied()))
    }

    #[test]
    fn test_server_and_username_are_required() {
        let missing_server = parse(&["--username", "bot"]).unwrap_err();
        assert_eq!(missing_server.kind(), ErrorKind::MissingRequiredArgument);

        let missing_username = parse(&["--server", "voice.example"]).unwrap_err();
        assert_eq!(missing_username.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--server", "voice.example", "--username", "bot"]).unwrap();

        assert_eq!(args.port, 64738);
        assert_eq!(args.channel, "Demo");
        assert_eq!(args.ctrl_port, 7878);
        assert_eq!(args.password, None);
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_ctrl_port_zero_is_accepted() {
        let args = parse(&["--server", "voice.example", "--username", "bot", "--ctrl-port", "0"]).unwrap();
        assert_eq!(args.ctrl_port, 0);

        let bad = parse(&["--server", "voice.example", "--username", "bot", "--ctrl-port", "70000"]);
        assert_eq!(bad.unwrap_err().kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_into_config_carries_every_field() {
        let args = parse(&[
            "--server", "voice.example",
            "--port", "1234",
            "--username", "bot",
            "--password", "secret",
            "--channel", "Lobby",
            "--ctrl-port", "9000",
            "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(args.log_level, "debug");

        let config = args.into_config();
        assert_eq!(config.server, "voice.example");
        assert_eq!(config.port, 1234);
        assert_eq!(config.username, "bot");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.channel, "Lobby");
        assert_eq!(config.control_port, 9000);
        // Le sidecar ne renonce jamais à joindre le serveur
        assert_eq!(config.network.max_retry_attempts, None);
        assert!(config.validate().is_ok());
    }
}
