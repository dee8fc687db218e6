//! Fixed-capacity registry of engine sessions.
//!
//! Interactive sessions live in slots 1 through [`MAX_SLOTS`]; creation
//! takes the lowest free slot and destruction reclaims it. Slot 0 is
//! reserved for a singleton batch-mode session, created lazily on first
//! use and destroyable independently. The registry owns its sessions:
//! dropping it (or calling [`SlotRegistry::shutdown`]) tears every
//! session down deterministically.

use crate::config::EngineConfig;
use crate::engine::EngineHandle;
use crate::error::{Result, SessionError};
use crate::session::EngineSession;

/// Highest interactive slot number.
pub const MAX_SLOTS: usize = 32;

/// Identifier of a session slot.
///
/// Interactive slots are 1..=[`MAX_SLOTS`]; [`SlotId::BATCH`] (slot 0) is
/// reserved for the batch-mode singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

impl SlotId {
    /// The reserved batch-mode slot.
    pub const BATCH: SlotId = SlotId(0);

    /// Get the inner slot number.
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Whether this is the reserved batch slot.
    pub fn is_batch(self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for SlotId {
    fn from(n: usize) -> Self {
        Self(n)
    }
}

/// Registry mapping slot numbers to live sessions.
pub struct SlotRegistry {
    // Index i holds slot i + 1.
    slots: Vec<Option<EngineSession>>,
    batch: Option<EngineSession>,
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotRegistry {
    /// Create a registry with [`MAX_SLOTS`] interactive slots.
    pub fn new() -> Self {
        Self::with_capacity(MAX_SLOTS)
    }

    /// Create a registry with a custom number of interactive slots.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            batch: None,
        }
    }

    /// Number of interactive slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live interactive sessions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Whether no interactive session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lowest_free(&self) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(SessionError::NoFreeSlot)
    }

    /// Create a session in the lowest free slot and start its engine with
    /// the given configuration.
    ///
    /// Fails with [`SessionError::NoFreeSlot`] when every slot is
    /// occupied; a start failure leaves the slot free.
    pub fn create(&mut self, engine: EngineHandle, config: &EngineConfig) -> Result<SlotId> {
        let index = self.lowest_free()?;
        let slot = SlotId(index + 1);
        let mut session = EngineSession::new(slot, engine);
        session.start(config)?;
        self.slots[index] = Some(session);
        Ok(slot)
    }

    /// The session at `slot`, if one is live. Slot 0 addresses the batch
    /// singleton.
    pub fn get(&self, slot: SlotId) -> Option<&EngineSession> {
        if slot.is_batch() {
            return self.batch.as_ref();
        }
        self.slots.get(slot.0 - 1)?.as_ref()
    }

    /// Mutable access to the session at `slot`.
    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut EngineSession> {
        if slot.is_batch() {
            return self.batch.as_mut();
        }
        self.slots.get_mut(slot.0 - 1)?.as_mut()
    }

    /// The batch-mode singleton at slot 0, created on first use from
    /// `make_engine`. Batch sessions do not render in the background;
    /// use [`EngineSession::run_to_completion`].
    pub fn batch_session(
        &mut self,
        make_engine: impl FnOnce() -> EngineHandle,
    ) -> &mut EngineSession {
        self.batch.get_or_insert_with(|| {
            log::debug!("creating batch session at slot 0");
            EngineSession::new(SlotId::BATCH, make_engine())
        })
    }

    /// Destroy the session at `slot`, reclaiming it. Idempotent:
    /// destroying a free slot is a no-op.
    ///
    /// The session's teardown stops and joins its render thread before
    /// the engine handle is released.
    pub fn destroy(&mut self, slot: SlotId) {
        let entry = if slot.is_batch() {
            &mut self.batch
        } else {
            match self.slots.get_mut(slot.0 - 1) {
                Some(entry) => entry,
                None => return,
            }
        };
        if entry.take().is_some() {
            log::info!("erased slot {}", slot.as_usize());
        }
    }

    /// Tear down every session, batch singleton included.
    pub fn shutdown(&mut self) {
        for entry in &mut self.slots {
            entry.take();
        }
        self.batch.take();
    }
}

impl std::fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("capacity", &self.capacity())
            .field("live", &self.len())
            .field("batch", &self.batch.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineEngine;
    use std::sync::Arc;

    fn engine() -> EngineHandle {
        Arc::new(OfflineEngine::new())
    }

    #[test]
    fn test_allocation_is_lowest_free_first() {
        let mut reg = SlotRegistry::with_capacity(4);
        let cfg = EngineConfig::default();
        assert_eq!(reg.create(engine(), &cfg).unwrap(), SlotId(1));
        assert_eq!(reg.create(engine(), &cfg).unwrap(), SlotId(2));
        assert_eq!(reg.create(engine(), &cfg).unwrap(), SlotId(3));
        reg.destroy(SlotId(2));
        // The freed hole is reused before a higher slot.
        assert_eq!(reg.create(engine(), &cfg).unwrap(), SlotId(2));
        reg.shutdown();
    }

    #[test]
    fn test_full_registry_is_a_capacity_error() {
        let mut reg = SlotRegistry::with_capacity(2);
        let cfg = EngineConfig::default();
        reg.create(engine(), &cfg).unwrap();
        reg.create(engine(), &cfg).unwrap();
        assert!(matches!(
            reg.create(engine(), &cfg),
            Err(SessionError::NoFreeSlot)
        ));
        reg.shutdown();
    }

    #[test]
    fn test_never_hands_out_an_occupied_slot() {
        let mut reg = SlotRegistry::with_capacity(8);
        let cfg = EngineConfig::default();
        let mut live = Vec::new();
        for _ in 0..8 {
            live.push(reg.create(engine(), &cfg).unwrap());
        }
        reg.destroy(SlotId(3));
        reg.destroy(SlotId(7));
        live.retain(|s| *s != SlotId(3) && *s != SlotId(7));
        let a = reg.create(engine(), &cfg).unwrap();
        assert!(!live.contains(&a));
        live.push(a);
        let b = reg.create(engine(), &cfg).unwrap();
        assert!(!live.contains(&b));
        reg.shutdown();
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut reg = SlotRegistry::with_capacity(2);
        let slot = reg.create(engine(), &EngineConfig::default()).unwrap();
        reg.destroy(slot);
        reg.destroy(slot);
        reg.destroy(SlotId(99));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_destroying_a_playing_session_frees_the_slot() {
        let backing = Arc::new(OfflineEngine::new());
        let mut reg = SlotRegistry::with_capacity(2);
        let slot = reg
            .create(backing.clone(), &EngineConfig::default())
            .unwrap();
        assert!(reg.get(slot).unwrap().is_performing());
        reg.destroy(slot);
        assert!(reg.get(slot).is_none());
        // Stop and join happened: the backing reference here is the last.
        assert_eq!(Arc::strong_count(&backing), 1);
        // The slot is immediately reusable.
        assert_eq!(
            reg.create(engine(), &EngineConfig::default()).unwrap(),
            slot
        );
        reg.shutdown();
    }

    #[test]
    fn test_batch_slot_is_lazy_and_independent() {
        let mut reg = SlotRegistry::with_capacity(2);
        assert!(reg.get(SlotId::BATCH).is_none());
        {
            let batch =
                reg.batch_session(|| Arc::new(OfflineEngine::with_score_blocks(1)));
            assert_eq!(batch.slot(), SlotId::BATCH);
            batch
                .run_to_completion("instr 1\nout 0\nendin", "e")
                .unwrap();
        }
        assert!(reg.get(SlotId::BATCH).is_some());
        // Destroying the batch slot does not touch interactive slots.
        let slot = reg.create(engine(), &EngineConfig::default()).unwrap();
        reg.destroy(SlotId::BATCH);
        assert!(reg.get(SlotId::BATCH).is_none());
        assert!(reg.get(slot).is_some());
        reg.shutdown();
    }

    #[test]
    fn test_failed_start_leaves_the_slot_free() {
        struct Dead;
        impl crate::engine::Engine for Dead {
            fn perform_ksmps(&self) -> bool {
                true
            }
        }
        let mut reg = SlotRegistry::with_capacity(2);
        assert!(matches!(
            reg.create(Arc::new(Dead), &EngineConfig::default()),
            Err(SessionError::ResourceBusy(_))
        ));
        assert!(reg.is_empty());
        // A healthy engine still gets slot 1.
        assert_eq!(
            reg.create(engine(), &EngineConfig::default()).unwrap(),
            SlotId(1)
        );
        reg.shutdown();
    }
}
