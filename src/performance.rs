//! Background performance thread for one engine instance.
//!
//! The performance thread is the only execution context that advances
//! audio time: it loops over `perform_ksmps` until the score ends or a
//! stop is requested. The control thread talks to it through a command
//! queue (line events, stop), which is the thread-safe hand-off for live
//! score injection.
//!
//! Lifecycle: `Idle -> Playing -> Stopping -> Idle`. [`play`] spawns the
//! render loop, [`stop`] signals it, and [`join`] blocks until it has
//! fully exited. A stop must always be followed by a join before the
//! engine instance may be torn down; [`PerformanceThread`] enforces this
//! in its `Drop` impl as well.
//!
//! [`play`]: PerformanceThread::play
//! [`stop`]: PerformanceThread::stop
//! [`join`]: PerformanceThread::join

use crossbeam_channel::{unbounded, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::engine::{Engine, EngineHandle};
use crate::error::{Result, SessionError};

enum PerfCommand {
    /// Inject a score line into the running performance.
    LineEvent(String),
    /// Exit the render loop.
    Stop,
}

/// Lifecycle wrapper around the background render thread of one engine
/// instance.
pub struct PerformanceThread {
    engine: EngineHandle,
    handle: Option<JoinHandle<()>>,
    commands: Option<Sender<PerfCommand>>,
    finished: Arc<AtomicBool>,
}

impl PerformanceThread {
    /// Create an idle performance thread for the given engine.
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            handle: None,
            commands: None,
            finished: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn the render loop. Fails if a loop is already attached.
    ///
    /// The engine must already be compiled and started.
    pub fn play(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(SessionError::state("performance thread already running"));
        }
        let (tx, rx) = unbounded();
        let finished = Arc::new(AtomicBool::new(false));
        let engine = Arc::clone(&self.engine);
        let finished_in_thread = Arc::clone(&finished);

        let handle = std::thread::Builder::new()
            .name("csound-perform".to_string())
            .spawn(move || {
                log::debug!("performance thread started");
                'render: loop {
                    // Apply queued commands before rendering the next block.
                    loop {
                        match rx.try_recv() {
                            Ok(PerfCommand::LineEvent(msg)) => engine.input_message(&msg),
                            Ok(PerfCommand::Stop) | Err(TryRecvError::Disconnected) => {
                                break 'render;
                            }
                            Err(TryRecvError::Empty) => break,
                        }
                    }
                    if engine.perform_ksmps() {
                        log::debug!("performance finished (end of score)");
                        break;
                    }
                }
                finished_in_thread.store(true, Ordering::Release);
                log::debug!("performance thread exited");
            })?;

        self.handle = Some(handle);
        self.commands = Some(tx);
        self.finished = finished;
        Ok(())
    }

    /// Performance status: 0 while the render loop is running, nonzero
    /// once it has stopped or completed on its own. Never blocks.
    pub fn status(&self) -> i32 {
        if self.handle.is_some() && !self.finished.load(Ordering::Acquire) {
            0
        } else {
            1
        }
    }

    /// Signal the render loop to exit. No-op if it is not running, so it
    /// is safe to call after the score has ended on its own.
    pub fn stop(&self) {
        if self.status() != 0 {
            return;
        }
        if let Some(tx) = &self.commands {
            let _ = tx.send(PerfCommand::Stop);
        }
        // Also interrupt the engine so a blocked perform call returns.
        self.engine.stop();
    }

    /// Block until the render thread has fully exited.
    ///
    /// Must follow [`PerformanceThread::stop`] before the engine instance
    /// is cleaned up or reset. After a join the thread is idle and may be
    /// played again.
    pub fn join(&mut self) -> Result<()> {
        self.commands = None;
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| SessionError::Engine(anyhow::anyhow!("render thread panicked")))?;
        }
        Ok(())
    }

    /// Queue a score line for injection by the render loop.
    ///
    /// If the loop already exited on its own (end of score), the event is
    /// handed to the engine's thread-safe entry point directly.
    pub fn input_message(&self, message: &str) -> Result<()> {
        let tx = self
            .commands
            .as_ref()
            .ok_or_else(|| SessionError::state("no performance is running"))?;
        if tx.send(PerfCommand::LineEvent(message.to_string())).is_err() {
            self.engine.input_message(message);
        }
        Ok(())
    }

    /// Whether a render thread is attached (running or finished but not
    /// yet joined).
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PerformanceThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
            if let Err(e) = self.join() {
                log::error!("failed to join render thread during teardown: {e}");
            }
        }
    }
}

impl std::fmt::Debug for PerformanceThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceThread")
            .field("attached", &self.is_attached())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Engine that renders forever until stopped, recording injected
    /// score lines.
    struct LoopEngine {
        stopped: AtomicBool,
        lines: Mutex<Vec<String>>,
    }

    impl LoopEngine {
        fn new() -> Self {
            Self {
                stopped: AtomicBool::new(false),
                lines: Mutex::new(Vec::new()),
            }
        }
    }

    impl Engine for LoopEngine {
        fn perform_ksmps(&self) -> bool {
            std::thread::sleep(Duration::from_micros(100));
            self.stopped.load(Ordering::Acquire)
        }
        fn stop(&self) {
            self.stopped.store(true, Ordering::Release);
        }
        fn input_message(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    /// Engine whose score ends after a fixed number of blocks.
    struct FiniteEngine {
        blocks_left: Mutex<u32>,
    }

    impl Engine for FiniteEngine {
        fn perform_ksmps(&self) -> bool {
            let mut left = self.blocks_left.lock().unwrap();
            if *left == 0 {
                return true;
            }
            *left -= 1;
            false
        }
    }

    #[test]
    fn test_play_stop_join_cycle() {
        let engine: EngineHandle = Arc::new(LoopEngine::new());
        let mut pt = PerformanceThread::new(engine);
        assert_ne!(pt.status(), 0);
        pt.play().unwrap();
        assert_eq!(pt.status(), 0);
        pt.stop();
        pt.join().unwrap();
        assert_ne!(pt.status(), 0);
        // Replayable after a join.
        pt.play().unwrap();
        pt.stop();
        pt.join().unwrap();
    }

    #[test]
    fn test_play_twice_is_an_error() {
        let engine: EngineHandle = Arc::new(LoopEngine::new());
        let mut pt = PerformanceThread::new(engine);
        pt.play().unwrap();
        assert!(matches!(pt.play(), Err(SessionError::State(_))));
        pt.stop();
        pt.join().unwrap();
    }

    #[test]
    fn test_stop_after_self_exit_is_noop() {
        let engine: EngineHandle = Arc::new(FiniteEngine {
            blocks_left: Mutex::new(2),
        });
        let mut pt = PerformanceThread::new(engine);
        pt.play().unwrap();
        // Wait for the short score to run out.
        while pt.status() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        pt.stop();
        pt.stop();
        pt.join().unwrap();
    }

    #[test]
    fn test_line_events_reach_the_engine() {
        let engine = Arc::new(LoopEngine::new());
        let handle: EngineHandle = engine.clone();
        let mut pt = PerformanceThread::new(handle);
        pt.play().unwrap();
        pt.input_message("i 1 0 1 0.5 440").unwrap();
        // Give the render loop a moment to drain the queue.
        std::thread::sleep(Duration::from_millis(20));
        pt.stop();
        pt.join().unwrap();
        assert_eq!(engine.lines.lock().unwrap().as_slice(), ["i 1 0 1 0.5 440"]);
    }

    #[test]
    fn test_input_message_while_idle_is_a_state_error() {
        let engine: EngineHandle = Arc::new(LoopEngine::new());
        let pt = PerformanceThread::new(engine);
        assert!(matches!(
            pt.input_message("i 1 0 1"),
            Err(SessionError::State(_))
        ));
    }

    #[test]
    fn test_drop_stops_and_joins() {
        let engine = Arc::new(LoopEngine::new());
        let handle: EngineHandle = engine.clone();
        let mut pt = PerformanceThread::new(handle);
        pt.play().unwrap();
        drop(pt);
        // The loop observed the stop signal and the thread was joined, so
        // the session-side clone is now the only engine reference left.
        assert_eq!(Arc::strong_count(&engine), 1);
    }
}
