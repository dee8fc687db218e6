//! One live engine session: lifecycle, code/score injection, tables,
//! channels, recording.
//!
//! An [`EngineSession`] owns exactly one engine instance, at most one
//! [`PerformanceThread`], and a [`MessageLog`]. It is addressed either
//! locally (commands go to the owned engine) or remotely (code and score
//! text are forwarded as UDP datagrams to an engine listening elsewhere).
//!
//! Teardown is deterministic: dropping a session while it is rendering
//! stops the performance thread, joins it, and only then releases the
//! engine handle. Failures during teardown are logged, never propagated.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::{AudioDeviceInfo, Engine, EngineHandle};
use crate::error::{Result, SessionError};
use crate::message_log::MessageLog;
use crate::performance::PerformanceThread;
use crate::registry::SlotId;
use crate::remote::RemoteDispatch;

/// How a session addresses its engine.
///
/// Selected once: creating a dispatcher switches to `Remote`, starting the
/// local engine switches back to `Local`.
#[derive(Debug)]
pub enum Addressing {
    /// Commands go to the locally owned engine instance.
    Local,
    /// Code and score text are forwarded over UDP; operations that need
    /// direct engine memory access are unavailable.
    Remote(RemoteDispatch),
}

/// A live Csound session bound to one slot.
pub struct EngineSession {
    slot: SlotId,
    engine: EngineHandle,
    perf: Option<PerformanceThread>,
    log: MessageLog,
    addressing: Addressing,
    verbose: bool,
}

impl EngineSession {
    /// Create an idle session around an engine instance.
    ///
    /// Sessions are normally created through
    /// [`SlotRegistry::create`](crate::registry::SlotRegistry::create),
    /// which assigns the slot and starts the engine in one step.
    pub fn new(slot: SlotId, engine: EngineHandle) -> Self {
        Self {
            slot,
            engine,
            perf: None,
            log: MessageLog::new(),
            addressing: Addressing::Local,
            verbose: false,
        }
    }

    /// The slot this session is bound to.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// The session's addressing mode.
    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// Whether this session forwards to a remote engine.
    pub fn is_remote(&self) -> bool {
        matches!(self.addressing, Addressing::Remote(_))
    }

    /// Whether a render loop is currently active.
    pub fn is_performing(&self) -> bool {
        self.perf.as_ref().is_some_and(|pt| pt.status() == 0)
    }

    /// Elevate table and dispatch details from debug to info logging.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    fn trace(&self, msg: &str) {
        if self.verbose {
            log::info!("{msg}");
        } else {
            log::debug!("{msg}");
        }
    }

    // === lifecycle ===

    /// Apply rendering parameters, compile the orchestra header, start the
    /// engine and spawn its performance thread.
    ///
    /// Fails with a state error if a performance thread is already
    /// attached, and with [`SessionError::ResourceBusy`] if the engine
    /// dies immediately (listen port or audio device unavailable).
    pub fn start(&mut self, config: &EngineConfig) -> Result<()> {
        if self.perf.is_some() {
            return Err(SessionError::state("engine already running"));
        }
        if self.is_remote() {
            self.trace("closing client connection before starting engine");
            self.addressing = Addressing::Local;
        }

        self.engine.create_message_buffer();
        for opt in config.options() {
            self.engine.set_option(&opt)?;
        }
        if self.engine.compile_orc(&config.header_orc()).is_err() {
            let report = self.log.drain_from(self.engine.as_ref());
            self.engine.destroy_message_buffer();
            return Err(SessionError::Compile { log: report });
        }
        self.engine
            .start()
            .map_err(|e| SessionError::ResourceBusy(e.to_string()))?;

        let mut pt = PerformanceThread::new(Arc::clone(&self.engine));
        pt.play()?;
        // Give the render loop a moment so an immediate death is visible.
        std::thread::sleep(std::time::Duration::from_millis(10));
        self.log.drain_from(self.engine.as_ref());

        if pt.status() != 0 {
            pt.stop();
            if let Err(e) = pt.join() {
                log::error!("failed to join dead render thread: {e}");
            }
            self.log.drain_from(self.engine.as_ref());
            self.engine.destroy_message_buffer();
            return Err(SessionError::ResourceBusy(
                "listen port unavailable or device busy".to_string(),
            ));
        }

        self.perf = Some(pt);
        log::info!("engine started at slot {}", self.slot.as_usize());
        if config.listen_port > 0 {
            log::info!("listening on port {}", config.listen_port);
        }
        Ok(())
    }

    /// Stop the performance and release the message buffer.
    ///
    /// With `reset` true the engine is fully reset so a later
    /// [`EngineSession::start`] may use new parameters; with `reset` false
    /// a lighter cleanup preserves loaded state for inspection. A no-op
    /// (with a warning) if the engine is not running.
    pub fn stop(&mut self, reset: bool) -> Result<()> {
        let Some(mut pt) = self.perf.take() else {
            log::warn!("engine is not running");
            return Ok(());
        };
        pt.stop();
        pt.join()?;
        self.log.drain_from(self.engine.as_ref());
        self.log.clear();
        self.engine.destroy_message_buffer();
        if reset {
            self.engine.reset();
        } else {
            self.engine.cleanup();
        }
        log::info!("engine stopped at slot {}", self.slot.as_usize());
        Ok(())
    }

    /// Switch the session to client mode: subsequent code and score sends
    /// go to `addr:port` as UDP datagrams.
    pub fn start_client(&mut self, addr: &str, port: u16) -> Result<()> {
        let dispatch = RemoteDispatch::new(addr, port)?;
        log::info!("session {} now dispatching to {}", self.slot.as_usize(), dispatch.target());
        self.addressing = Addressing::Remote(dispatch);
        Ok(())
    }

    /// Compile and render to completion on the calling thread, then reset.
    ///
    /// This is the batch path used by the reserved slot 0: no performance
    /// thread is involved and the call blocks until the score has
    /// finished.
    pub fn run_to_completion(&mut self, orc: &str, sco: &str) -> Result<()> {
        if self.perf.is_some() {
            return Err(SessionError::state("engine already running"));
        }
        if self.engine.compile_orc(orc).is_err() {
            let report = self.log.drain_from(self.engine.as_ref());
            return Err(SessionError::Compile { log: report });
        }
        if self.engine.read_score(sco).is_err() {
            let report = self.log.drain_from(self.engine.as_ref());
            return Err(SessionError::Compile { log: report });
        }
        self.engine.start()?;
        while !self.engine.perform_ksmps() {}
        self.engine.reset();
        Ok(())
    }

    // === code and score injection ===

    /// Send orchestra code to the engine.
    ///
    /// Locally, pending diagnostics are drained first, the code is
    /// compiled against the running engine, and every diagnostic the
    /// compile produced is appended to the log and returned; a rejected
    /// compile surfaces those diagnostics as
    /// [`SessionError::Compile`]. In client mode the text is forwarded
    /// unmodified as one datagram and nothing is compiled locally —
    /// remote failures are not observable here.
    pub fn send_code(&self, code: &str) -> Result<String> {
        if let Addressing::Remote(dispatch) = &self.addressing {
            dispatch.send(code)?;
            return Ok(String::new());
        }
        self.log.drain_from(self.engine.as_ref());
        let compiled = self.engine.compile_orc(code);
        let report = self.log.drain_from(self.engine.as_ref());
        if compiled.is_err() {
            log::error!("compile failed:\n{report}");
            return Err(SessionError::Compile { log: report });
        }
        Ok(report)
    }

    /// Send score events to the engine.
    ///
    /// Locally the text is injected as a line event into the running
    /// score stream; in client mode it is wrapped in `scoreline_i {{ }}`
    /// and forwarded.
    pub fn send_score(&self, score: &str) -> Result<()> {
        if let Addressing::Remote(dispatch) = &self.addressing {
            let mut payload = String::from("scoreline_i {{");
            payload.push_str(score);
            payload.push_str("}}\n");
            dispatch.send(&payload)?;
            return Ok(());
        }
        let pt = self
            .perf
            .as_ref()
            .ok_or_else(|| SessionError::state("engine is not running"))?;
        pt.input_message(score)?;
        self.log.drain_from(self.engine.as_ref());
        Ok(())
    }

    /// Send an `i` statement built from p-fields to the score stream.
    pub fn note(&self, pfields: &[f64]) -> Result<()> {
        if pfields.is_empty() {
            return Err(SessionError::usage("a note needs at least p1"));
        }
        let fields: Vec<String> = pfields.iter().map(|p| p.to_string()).collect();
        self.send_score(&format!("i {}", fields.join(" ")))
    }

    // === tables ===

    /// (Re)create the numbered function table with the given size,
    /// generator and arguments. This is the only path that changes a
    /// table's size.
    pub fn make_table(&self, num: u32, size: usize, gen: i32, args: &[f64]) -> Result<()> {
        if size == 0 {
            return Err(SessionError::usage("table size must be positive"));
        }
        let args: Vec<String> = if args.is_empty() {
            vec!["0".to_string()]
        } else {
            args.iter().map(|a| a.to_string()).collect()
        };
        let code = format!("gitemp_ ftgen {num}, 0, {size}, {gen}, {}", args.join(", "));
        self.trace(&code);
        self.send_code(&code)?;
        Ok(())
    }

    /// Copy `data` into the numbered table, creating or resizing it first
    /// if its declared size does not match.
    ///
    /// In client mode the same effect is achieved by dispatching a GEN02
    /// `ftgen` statement carrying the literal values, since a remote
    /// engine's memory cannot be reached directly.
    pub fn fill_table(&self, num: u32, data: &[f64]) -> Result<()> {
        if data.is_empty() {
            return Err(SessionError::usage("table data must not be empty"));
        }
        if self.is_remote() {
            let values: Vec<String> = data.iter().map(|v| v.to_string()).collect();
            let code = format!(
                "gitemp ftgen {num}, 0, {}, -2, {}",
                data.len(),
                values.join(", ")
            );
            self.send_code(&code)?;
            return Ok(());
        }
        match self.engine.table_length(num) {
            Some(len) if len == data.len() => {}
            Some(len) => {
                self.trace(&format!("resizing table {num} from {len} to {}", data.len()));
                self.make_table(num, data.len(), -2, &[0.0])?;
            }
            None => {
                self.trace(&format!("creating table {num}"));
                self.make_table(num, data.len(), -2, &[0.0])?;
            }
        }
        self.engine.table_copy_in(num, data)?;
        Ok(())
    }

    /// Read back the contents of a table, or `None` if it does not exist.
    /// Unavailable in client mode.
    pub fn table(&self, num: u32) -> Result<Option<Vec<f64>>> {
        if self.is_remote() {
            return Err(SessionError::UnsupportedInMode("table"));
        }
        Ok(self.engine.table_copy_out(num))
    }

    // === channels ===

    fn require_local(&self, op: &'static str) -> Result<()> {
        if self.is_remote() {
            return Err(SessionError::UnsupportedInMode(op));
        }
        Ok(())
    }

    fn require_channel_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SessionError::usage("channel name must not be empty"));
        }
        Ok(())
    }

    /// Set a value on a control channel.
    pub fn set_channel(&self, name: &str, value: f64) -> Result<()> {
        self.require_local("setChannel")?;
        Self::require_channel_name(name)?;
        self.engine.set_control_channel(name, value)?;
        Ok(())
    }

    /// Read a value from a control channel.
    pub fn channel(&self, name: &str) -> Result<f64> {
        self.require_local("channel")?;
        Self::require_channel_name(name)?;
        Ok(self.engine.control_channel(name)?)
    }

    /// Set a string channel.
    pub fn set_string_channel(&self, name: &str, value: &str) -> Result<()> {
        self.require_local("setStringChannel")?;
        Self::require_channel_name(name)?;
        self.engine.set_string_channel(name, value)?;
        Ok(())
    }

    /// Read a string channel.
    pub fn string_channel(&self, name: &str) -> Result<String> {
        self.require_local("stringChannel")?;
        Self::require_channel_name(name)?;
        Ok(self.engine.string_channel(name)?)
    }

    /// Write one control block of samples to an audio channel.
    pub fn set_audio_channel(&self, name: &str, samples: &[f64]) -> Result<()> {
        self.require_local("setAudioChannel")?;
        Self::require_channel_name(name)?;
        self.engine.set_audio_channel(name, samples)?;
        Ok(())
    }

    /// Read one control block of samples from an audio channel.
    pub fn audio_channel(&self, name: &str) -> Result<Vec<f64>> {
        self.require_local("audioChannel")?;
        Self::require_channel_name(name)?;
        Ok(self.engine.audio_channel(name)?)
    }

    // === recording ===

    /// Start recording the audio output to a file.
    pub fn start_record(&self, path: &str, sample_bits: u32, num_buffers: u32) -> Result<()> {
        self.require_local("startRecord")?;
        if self.perf.is_none() {
            return Err(SessionError::state("engine is not running"));
        }
        self.engine.start_record(path, sample_bits, num_buffers)?;
        Ok(())
    }

    /// Stop recording the audio output.
    pub fn stop_record(&self) -> Result<()> {
        self.require_local("stopRecord")?;
        self.engine.stop_record();
        Ok(())
    }

    // === diagnostics and devices ===

    /// Drain pending engine messages and return the accumulated log.
    pub fn log_contents(&self) -> String {
        self.log.drain_from(self.engine.as_ref());
        self.log.contents()
    }

    /// Drain pending engine messages, then discard the log.
    pub fn clear_log(&self) {
        self.log.drain_from(self.engine.as_ref());
        self.log.clear();
    }

    /// Enumerate the audio devices the engine can see.
    pub fn audio_devices(&self, output: bool) -> Vec<AudioDeviceInfo> {
        self.engine.audio_devices(output)
    }

    /// Log the available audio devices, numbered from 1.
    pub fn list_devices(&self, output: bool) {
        for (i, dev) in self.audio_devices(output).iter().enumerate() {
            log::info!("{:2}: {} ({})", i + 1, dev.name, dev.id);
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // Teardown must never panic or propagate: stop, join, then let the
        // engine handle go.
        if let Some(mut pt) = self.perf.take() {
            pt.stop();
            if let Err(e) = pt.join() {
                log::error!(
                    "failed to join render thread while destroying slot {}: {e}",
                    self.slot.as_usize()
                );
            }
            self.engine.destroy_message_buffer();
            self.engine.cleanup();
        }
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("slot", &self.slot)
            .field("performing", &self.is_performing())
            .field("remote", &self.is_remote())
            .finish_non_exhaustive()
    }
}
