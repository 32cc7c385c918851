//! État partagé entre les workers
//!
//! Trois drapeaux atomiques et la file de lecture bornée. Chaque worker
//! reçoit un `Arc<SharedState>` ; aucune autre donnée mutable n'est partagée.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use audio::AudioFrame;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info};

/// Drapeaux du processus et file de lecture
pub struct SharedState {
    connected: AtomicBool,
    ptt_enabled: AtomicBool,

    /// Ne repasse jamais à `false` une fois levé
    shutdown: AtomicBool,

    playback: PlaybackQueue,
}

impl SharedState {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connected: AtomicBool::new(false),
            ptt_enabled: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            playback: PlaybackQueue::new(queue_capacity),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Marque la session comme prête
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn ptt_enabled(&self) -> bool {
        self.ptt_enabled.load(Ordering::SeqCst)
    }

    pub fn set_ptt(&self, enabled: bool) {
        let previous = self.ptt_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!("🎙️ PTT {}", if enabled { "activé" } else { "désactivé" });
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Lève le drapeau d'arrêt
    ///
    /// Retourne `true` si cet appel l'a effectivement levé.
    pub fn request_shutdown(&self) -> bool {
        let first = !self.shutdown.swap(true, Ordering::SeqCst);
        if first {
            info!("🛑 Arrêt demandé");
        }
        first
    }

    /// Attend la levée du drapeau d'arrêt en le scrutant périodiquement
    pub async fn wait_for_shutdown(&self, poll: Duration) {
        while !self.is_shutdown() {
            tokio::time::sleep(poll).await;
        }
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }
}

/// File FIFO bornée entre le callback réseau et la boucle de lecture
///
/// Quand elle est pleine, la frame entrante est abandonnée : le producteur
/// ne bloque jamais et les frames déjà en attente restent intactes.
pub struct PlaybackQueue {
    sender: Sender<AudioFrame>,
    receiver: Receiver<AudioFrame>,
    capacity: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> Self {
        // bounded(0) serait un canal de rendez-vous
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Ajoute une frame sans bloquer
    ///
    /// Retourne `false` si la frame a été abandonnée.
    pub fn try_push(&self, frame: AudioFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(dropped, "File de lecture pleine, frame abandonnée");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Retire la plus ancienne frame, en attendant au plus `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        match self.receiver.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames acceptées depuis le démarrage
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Frames abandonnées parce que la file était pleine
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn frame(value: i16) -> AudioFrame {
        AudioFrame::new(vec![value; 4])
    }

    #[test]
    fn test_initial_flags() {
        let state = SharedState::new(50);
        assert!(!state.is_connected());
        assert!(!state.ptt_enabled());
        assert!(!state.is_shutdown());
        assert_eq!(state.playback().capacity(), 50);
    }

    #[test]
    fn test_shutdown_is_monotonic() {
        let state = SharedState::new(1);
        assert!(state.request_shutdown());
        assert!(!state.request_shutdown());
        assert!(state.is_shutdown());
    }

    #[test]
    fn test_ptt_follows_last_write() {
        let state = SharedState::new(1);
        for value in [true, true, false, true, false] {
            state.set_ptt(value);
            assert_eq!(state.ptt_enabled(), value);
        }
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let queue = PlaybackQueue::new(3);
        for value in 1..=5 {
            queue.try_push(frame(value));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        assert_eq!(queue.enqueued(), 3);

        // Ordre FIFO conservé, les plus anciennes ont survécu
        let order: Vec<i16> = std::iter::from_fn(|| queue.pop_timeout(Duration::from_millis(1)))
            .map(|f| f.samples()[0])
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = PlaybackQueue::new(2);
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_zero_capacity_still_buffers() {
        let queue = PlaybackQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        assert!(queue.try_push(frame(1)));
        assert!(!queue.try_push(frame(2)));
    }

    #[test]
    fn test_concurrent_producer_never_blocks() {
        let state = Arc::new(SharedState::new(50));
        let producer = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                for value in 0..200 {
                    state.playback().try_push(frame(value));
                }
            })
        };
        producer.join().unwrap();

        let queue = state.playback();
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.enqueued() + queue.dropped(), 200);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown() {
        let state = Arc::new(SharedState::new(1));
        let waiter = {
            let state = Arc::clone(&state);
            tokio::spawn(async move { state.wait_for_shutdown(Duration::from_millis(10)).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        state.request_shutdown();
        tokio::time::timeout(Duration::from_millis(500), waiter).await.unwrap().unwrap();
    }
}
