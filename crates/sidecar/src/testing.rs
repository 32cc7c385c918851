//! Périphériques et annonces factices pour les tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audio::{AudioError, AudioFrame, AudioResult, AudioSink, AudioSource, BlockHandler, StreamControl};

use crate::supervisor::{control_port_line, StartupSignals, CONNECTED_LINE};

/// Micro qui répète le même bloc toutes les quelques millisecondes
pub struct ScriptedSource {
    block: Vec<f32>,
    interval: Duration,
    limit: Option<usize>,
    delivered: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(block: Vec<f32>) -> Self {
        Self {
            block,
            interval: Duration::from_millis(2),
            limit: None,
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Rend la main d'elle-même après `limit` blocs acceptés
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn delivered(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.delivered)
    }
}

impl AudioSource for ScriptedSource {
    fn run(&mut self, mut handler: BlockHandler) -> AudioResult<()> {
        loop {
            if self.limit.is_some_and(|limit| self.delivered.load(Ordering::SeqCst) >= limit) {
                return Ok(());
            }
            if handler(&self.block[..]) == StreamControl::Stop {
                return Ok(());
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.interval);
        }
    }

    fn device_info(&self) -> String {
        "micro scripté".to_string()
    }
}

/// Haut-parleurs qui enregistrent les frames jouées
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<AudioFrame>>>,
    failures_left: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            frames: Arc::new(Mutex::new(Vec::new())),
            failures_left: 0,
        }
    }

    /// Les `count` premiers rendus échouent
    pub fn failing_first(mut self, count: usize) -> Self {
        self.failures_left = count;
        self
    }

    pub fn frames(&self) -> Arc<Mutex<Vec<AudioFrame>>> {
        Arc::clone(&self.frames)
    }
}

impl AudioSink for RecordingSink {
    fn render(&mut self, frame: &AudioFrame) -> AudioResult<()> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(AudioError::Timeout);
        }
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

/// Enregistre les lignes qui seraient écrites sur stdout
#[derive(Default)]
pub struct RecordingSignals {
    lines: Mutex<Vec<String>>,
}

impl RecordingSignals {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn connected_announced(&self) -> bool {
        self.lines().iter().any(|line| line == CONNECTED_LINE)
    }
}

impl StartupSignals for RecordingSignals {
    fn control_port(&self, port: u16) {
        self.lines.lock().unwrap().push(control_port_line(port));
    }

    fn connected(&self) {
        self.lines.lock().unwrap().push(CONNECTED_LINE.to_string());
    }
}
