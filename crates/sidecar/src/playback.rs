//! Boucle de lecture : file de lecture → haut-parleurs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use audio::{AudioResult, AudioSink};
use tracing::{error, info, warn};

use crate::SharedState;

#[derive(Debug, Default)]
pub struct PlaybackStats {
    rendered: AtomicU64,
    failed: AtomicU64,
}

impl PlaybackStats {
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Consommateur unique de la file de lecture
///
/// Chaque frame est jouée de façon synchrone : la suivante n'est retirée
/// qu'une fois la précédente consommée par le périphérique.
pub struct PlaybackLoop {
    state: Arc<SharedState>,
    pop_timeout: Duration,
    stats: Arc<PlaybackStats>,
}

impl PlaybackLoop {
    pub fn new(state: Arc<SharedState>, pop_timeout: Duration) -> Self {
        Self {
            state,
            pop_timeout,
            stats: Arc::new(PlaybackStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PlaybackStats> {
        Arc::clone(&self.stats)
    }

    /// Joue les frames jusqu'à la levée du drapeau d'arrêt
    pub fn run(&self, sink: &mut dyn AudioSink) {
        while !self.state.is_shutdown() {
            let Some(frame) = self.state.playback().pop_timeout(self.pop_timeout) else {
                continue;
            };

            match sink.render(&frame) {
                Ok(()) => {
                    self.stats.rendered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Frame non jouée");
                }
            }
        }
    }
}

/// Ouvre la sortie audio et fait tourner la boucle jusqu'à l'arrêt
pub fn run_playback<F>(open_sink: F, playback: PlaybackLoop)
where
    F: FnOnce() -> AudioResult<Box<dyn AudioSink>>,
{
    let mut sink = match open_sink() {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "❌ Sortie audio indisponible");
            return;
        }
    };

    info!("🔊 Lecture démarrée sur {}", sink.device_info());
    playback.run(sink.as_mut());
    info!("Lecture arrêtée");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use audio::{AudioError, AudioFrame};
    use std::time::Instant;

    #[test]
    fn test_frames_are_rendered_in_order() {
        let state = Arc::new(SharedState::new(50));
        for value in 1..=3 {
            state.playback().try_push(AudioFrame::new(vec![value; 960]));
        }

        let sink = RecordingSink::new();
        let rendered = sink.frames();
        let playback = PlaybackLoop::new(Arc::clone(&state), Duration::from_millis(10));
        let stats = playback.stats();

        let worker = std::thread::spawn(move || {
            let mut sink = sink;
            playback.run(&mut sink);
        });

        let started = Instant::now();
        while stats.rendered() < 3 && started.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(5));
        }
        state.request_shutdown();
        worker.join().unwrap();

        let order: Vec<i16> = rendered.lock().unwrap().iter().map(|f| f.samples()[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(state.playback().is_empty());
    }

    #[test]
    fn test_render_errors_do_not_stop_the_loop() {
        let state = Arc::new(SharedState::new(50));
        state.playback().try_push(AudioFrame::new(vec![1; 4]));
        state.playback().try_push(AudioFrame::new(vec![2; 4]));

        let mut sink = RecordingSink::new().failing_first(1);
        let rendered = sink.frames();
        let playback = PlaybackLoop::new(Arc::clone(&state), Duration::from_millis(10));
        let stats = playback.stats();

        let stopper = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                state.request_shutdown();
            })
        };
        playback.run(&mut sink);
        stopper.join().unwrap();

        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.rendered(), 1);
        assert_eq!(rendered.lock().unwrap()[0].samples()[0], 2);
    }

    #[test]
    fn test_idle_loop_exits_promptly_on_shutdown() {
        let state = Arc::new(SharedState::new(50));
        let playback = PlaybackLoop::new(Arc::clone(&state), Duration::from_millis(100));

        let worker = std::thread::spawn(move || run_playback(|| Ok(Box::new(RecordingSink::new()) as Box<dyn AudioSink>), playback));

        std::thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        state.request_shutdown();
        worker.join().unwrap();
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_sink_open_failure_skips_the_loop() {
        let state = Arc::new(SharedState::new(4));
        state.playback().try_push(AudioFrame::new(vec![1; 960]));

        let playback = PlaybackLoop::new(Arc::clone(&state), Duration::from_millis(10));
        let stats = playback.stats();
        run_playback(
            || Err(AudioError::ConfigError("aucun format de sortie".to_string())),
            playback,
        );

        // Échec signalé une seule fois, à l'ouverture : aucune frame consommée
        assert_eq!(stats.rendered(), 0);
        assert_eq!(stats.failed(), 0);
        assert_eq!(state.playback().len(), 1);
    }

    #[test]
    fn test_missing_output_is_not_fatal() {
        let state = Arc::new(SharedState::new(1));
        run_playback(|| Err(AudioError::NoDeviceFound), PlaybackLoop::new(state, Duration::from_millis(10)));
    }
}
