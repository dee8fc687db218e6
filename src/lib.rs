//! icsound - Session coordination layer for live-coding Csound.
//!
//! This crate coordinates one or more concurrently running Csound
//! sessions. Each session wraps an engine instance rendering on its own
//! background thread while the control thread injects orchestra code,
//! score events, table data and channel values into it live:
//!
//! - **Registry** - Fixed-capacity slot table mapping small integers to
//!   sessions, plus the reserved batch slot 0
//! - **Session** - Engine lifecycle (start/stop/reset), live code and
//!   score injection, table and channel mutation, recording
//! - **Performance** - The background render thread with its command
//!   queue for audio-thread-safe score injection
//! - **Remote** - Fire-and-forget UDP forwarding for sessions addressing
//!   an engine on another host
//! - **Offline** - In-memory engine backend for validation and tests
//!
//! # Architecture
//!
//! The crate never binds the native Csound library directly: everything
//! goes through the [`Engine`] trait, the seam a real FFI binding plugs
//! into. Two execution contexts exist per session. The render thread
//! owned by [`PerformanceThread`] is the only one advancing audio time;
//! the control thread issues lifecycle transitions and mutation requests,
//! which reach the engine only through its thread-safe entry points.
//! Sessions in different slots are fully independent.
//!
//! # Example
//!
//! ```
//! use icsound::{EngineConfig, OfflineEngine, SlotRegistry};
//! use std::sync::Arc;
//!
//! let mut registry = SlotRegistry::new();
//! let slot = registry
//!     .create(Arc::new(OfflineEngine::new()), &EngineConfig::default())
//!     .unwrap();
//! let session = registry.get(slot).unwrap();
//! session.send_code("instr 1\nout oscili(0.2, p4)\nendin").unwrap();
//! session.fill_table(1, &[0.0, 0.5, 1.0, 0.5]).unwrap();
//! session.set_channel("amp", 0.7).unwrap();
//! registry.destroy(slot);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod message_log;
pub mod offline;
pub mod performance;
pub mod registry;
pub mod remote;
pub mod session;

// Re-export main types for convenience.
pub use config::EngineConfig;
pub use engine::{AudioDeviceInfo, Engine, EngineHandle};
pub use error::{Result, SessionError};
pub use message_log::MessageLog;
pub use offline::OfflineEngine;
pub use performance::PerformanceThread;
pub use registry::{SlotId, SlotRegistry, MAX_SLOTS};
pub use remote::RemoteDispatch;
pub use session::{Addressing, EngineSession};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_two_slots_are_independent() {
        let a = Arc::new(OfflineEngine::new());
        let b = Arc::new(OfflineEngine::new());
        let mut registry = SlotRegistry::new();
        let cfg = EngineConfig::default();
        let slot_a = registry.create(a.clone(), &cfg).unwrap();
        let slot_b = registry.create(b.clone(), &cfg).unwrap();

        registry
            .get(slot_a)
            .unwrap()
            .fill_table(1, &[1.0, 2.0])
            .unwrap();
        assert_eq!(a.table_length(1), Some(2));
        assert_eq!(b.table_length(1), None);

        registry.destroy(slot_a);
        assert!(registry.get(slot_b).unwrap().is_performing());
        registry.shutdown();
    }

    #[test]
    fn test_restart_cycle_through_the_registry() {
        let mut registry = SlotRegistry::new();
        let slot = registry
            .create(Arc::new(OfflineEngine::new()), &EngineConfig::default())
            .unwrap();
        let session = registry.get_mut(slot).unwrap();
        session.stop(true).unwrap();
        session
            .start(&EngineConfig::new().with_sample_rate(44100))
            .unwrap();
        assert!(session.is_performing());
        registry.shutdown();
    }
}
