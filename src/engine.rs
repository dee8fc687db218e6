//! The engine seam: the interface this crate consumes from a Csound
//! binding.
//!
//! The session layer never talks to the native library directly. It goes
//! through the [`Engine`] trait, which mirrors the subset of the Csound
//! API the sessions need: orchestra compilation, the perform loop, function
//! tables, control channels, the message buffer, and audio-thread-safe
//! score-event injection. A real FFI binding implements this trait; the
//! crate ships [`crate::offline::OfflineEngine`] for validation and tests.
//!
//! Implementations must be `Send + Sync`: the performance thread calls
//! `perform_ksmps` and `input_message` while the control thread issues
//! everything else. All methods listed here map to entry points the native
//! API documents as safe to call concurrently with a running performance.

use std::sync::Arc;

/// Information about an audio device reported by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    /// Device identifier usable in `-o`/`-i` options (e.g. "dac0").
    pub id: String,
    /// Human-readable device name.
    pub name: String,
    /// Whether this is an output device.
    pub is_output: bool,
}

/// Interface to one Csound instance.
///
/// Methods default to harmless no-ops so partial backends (validation
/// stubs, test doubles) only implement what they support. A production
/// binding overrides everything.
pub trait Engine: Send + Sync {
    /// Apply a command-line style option (e.g. `-odac`, `--port=12894`).
    fn set_option(&self, _option: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Compile orchestra code against the instance.
    ///
    /// `Err` means the compile was rejected; diagnostics are left in the
    /// message buffer for the caller to drain.
    fn compile_orc(&self, _code: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Read score text into the instance (batch path).
    fn read_score(&self, _score: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Prepare the instance for performance.
    fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Render one control block. Returns true once the score has finished
    /// and the performance should end.
    fn perform_ksmps(&self) -> bool {
        true
    }

    /// Signal the performance loop to finish. Safe to call from any thread.
    fn stop(&self) {}

    /// Light cleanup after a performance, preserving compiled state.
    fn cleanup(&self) {}

    /// Full reset, allowing a fresh start with new options.
    fn reset(&self) {}

    /// Inject a line event (score statement) into the running performance.
    /// This is the audio-thread-safe injection entry point.
    fn input_message(&self, _message: &str) {}

    /// Size of the numbered table, excluding the guard point, or `None`
    /// if the table does not exist.
    fn table_length(&self, _num: u32) -> Option<usize> {
        None
    }

    /// Copy `data` into the numbered table. The table must already exist
    /// with at least `data.len()` points.
    fn table_copy_in(&self, _num: u32, _data: &[f64]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Copy the numbered table's contents out, or `None` if it does not
    /// exist.
    fn table_copy_out(&self, _num: u32) -> Option<Vec<f64>> {
        None
    }

    /// Read a control channel value by name.
    fn control_channel(&self, _name: &str) -> anyhow::Result<f64> {
        Ok(0.0)
    }

    /// Set a control channel value by name.
    fn set_control_channel(&self, _name: &str, _value: f64) -> anyhow::Result<()> {
        Ok(())
    }

    /// Read a string channel by name.
    fn string_channel(&self, _name: &str) -> anyhow::Result<String> {
        Ok(String::new())
    }

    /// Set a string channel by name.
    fn set_string_channel(&self, _name: &str, _value: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Read one control block of samples from an audio channel.
    fn audio_channel(&self, _name: &str) -> anyhow::Result<Vec<f64>> {
        Ok(Vec::new())
    }

    /// Write one control block of samples to an audio channel.
    fn set_audio_channel(&self, _name: &str, _samples: &[f64]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Route diagnostics into an internal message buffer instead of the
    /// console.
    fn create_message_buffer(&self) {}

    /// Release the message buffer resources.
    fn destroy_message_buffer(&self) {}

    /// Number of pending diagnostic messages.
    fn message_count(&self) -> usize {
        0
    }

    /// Pop the oldest pending diagnostic message, if any.
    fn pop_first_message(&self) -> Option<String> {
        None
    }

    /// Enumerate audio devices (output devices if `output` is true).
    fn audio_devices(&self, _output: bool) -> Vec<AudioDeviceInfo> {
        Vec::new()
    }

    /// Start writing the audio output to `path`.
    fn start_record(&self, _path: &str, _sample_bits: u32, _num_buffers: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop a recording started with [`Engine::start_record`].
    fn stop_record(&self) {}
}

/// Shared handle to an engine instance.
///
/// The session owns one clone; the performance thread owns the only other
/// one while rendering is active, so after a join the session's drop is
/// the final release.
pub type EngineHandle = Arc<dyn Engine>;

impl std::fmt::Debug for dyn Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}
