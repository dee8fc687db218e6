//! In-memory engine for validation and testing.
//!
//! [`OfflineEngine`] implements the full [`Engine`] seam without a native
//! Csound install. Options, channels and injected score lines are
//! recorded; `ftgen` fragments are interpreted so function-table semantics
//! are observable; everything else compiles successfully and produces a
//! diagnostic line in the message buffer. This is the crate's validation
//! backend, the counterpart of running a front end against a server that
//! is not there.

use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::engine::{AudioDeviceInfo, Engine};

fn ftgen_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\S+\s+ftgen\s+(.+?)\s*$").unwrap())
}

#[derive(Default)]
struct OfflineState {
    options: Vec<String>,
    orc_history: Vec<String>,
    score_lines: Vec<String>,
    // Tables are stored with the engine's implicit guard point appended.
    tables: HashMap<u32, Vec<f64>>,
    control_channels: HashMap<String, f64>,
    string_channels: HashMap<String, String>,
    audio_channels: HashMap<String, Vec<f64>>,
    messages: VecDeque<String>,
    buffering: bool,
    recording: Option<String>,
    // None = perform until stopped; Some(n) = score ends after n blocks.
    blocks_left: Option<u64>,
}

/// An [`Engine`] that renders nothing but keeps full bookkeeping.
pub struct OfflineEngine {
    state: Mutex<OfflineState>,
    stopped: AtomicBool,
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineEngine {
    /// Create an engine that performs until stopped.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OfflineState::default()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Create an engine whose score ends on its own after `blocks`
    /// control blocks, like a finite score would.
    pub fn with_score_blocks(blocks: u64) -> Self {
        let engine = Self::new();
        engine.lock().blocks_left = Some(blocks);
        engine
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OfflineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push_message(&self, text: String) {
        let mut state = self.lock();
        if state.buffering {
            state.messages.push_back(text);
        } else {
            log::info!("[offline] {}", text.trim_end());
        }
    }

    /// Options applied so far, in order.
    pub fn options(&self) -> Vec<String> {
        self.lock().options.clone()
    }

    /// Orchestra fragments compiled so far, in order.
    pub fn orc_history(&self) -> Vec<String> {
        self.lock().orc_history.clone()
    }

    /// Score lines injected through `input_message`, in order.
    pub fn score_lines(&self) -> Vec<String> {
        self.lock().score_lines.clone()
    }

    /// The path of an active recording, if any.
    pub fn recording(&self) -> Option<String> {
        self.lock().recording.clone()
    }

    /// `ftgen num, time, size, gen, args...` — create the table the way
    /// the native engine would: `size` points plus one guard point, filled
    /// by GEN02 from the literal arguments or zeroed for other
    /// generators.
    fn apply_ftgen(&self, args: &str) -> anyhow::Result<()> {
        let fields: Vec<&str> = args.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            anyhow::bail!("ftgen needs at least num, time, size, gen");
        }
        let num: u32 = fields[0].parse()?;
        let size: usize = fields[2].parse()?;
        let gen: i32 = fields[3].parse::<f64>()? as i32;
        let mut table = vec![0.0; size + 1];
        if gen.abs() == 2 {
            for (i, field) in fields[4..].iter().take(size).enumerate() {
                table[i] = field.parse()?;
            }
        }
        self.lock().tables.insert(num, table);
        self.push_message(format!("ftable {num}:\n"));
        Ok(())
    }
}

impl Engine for OfflineEngine {
    fn set_option(&self, option: &str) -> anyhow::Result<()> {
        self.lock().options.push(option.to_string());
        Ok(())
    }

    fn compile_orc(&self, code: &str) -> anyhow::Result<()> {
        for caps in ftgen_pattern().captures_iter(code) {
            self.apply_ftgen(&caps[1])?;
        }
        self.lock().orc_history.push(code.to_string());
        Ok(())
    }

    fn read_score(&self, score: &str) -> anyhow::Result<()> {
        self.lock().score_lines.push(score.to_string());
        Ok(())
    }

    fn start(&self) -> anyhow::Result<()> {
        self.stopped.store(false, Ordering::Release);
        Ok(())
    }

    fn perform_ksmps(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return true;
        }
        // One control block of "render" time.
        std::thread::sleep(Duration::from_micros(100));
        let mut state = self.lock();
        match state.blocks_left {
            Some(0) => true,
            Some(ref mut n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn cleanup(&self) {
        self.lock().recording = None;
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.options.clear();
        state.orc_history.clear();
        state.score_lines.clear();
        state.tables.clear();
        state.control_channels.clear();
        state.string_channels.clear();
        state.audio_channels.clear();
        state.recording = None;
        state.blocks_left = None;
        drop(state);
        self.stopped.store(false, Ordering::Release);
    }

    fn input_message(&self, message: &str) {
        self.lock().score_lines.push(message.to_string());
    }

    fn table_length(&self, num: u32) -> Option<usize> {
        self.lock().tables.get(&num).map(|t| t.len() - 1)
    }

    fn table_copy_in(&self, num: u32, data: &[f64]) -> anyhow::Result<()> {
        let mut state = self.lock();
        let table = state
            .tables
            .get_mut(&num)
            .ok_or_else(|| anyhow::anyhow!("table {num} does not exist"))?;
        if table.len() - 1 < data.len() {
            anyhow::bail!("table {num} is smaller than the incoming data");
        }
        table[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn table_copy_out(&self, num: u32) -> Option<Vec<f64>> {
        self.lock()
            .tables
            .get(&num)
            .map(|t| t[..t.len() - 1].to_vec())
    }

    fn control_channel(&self, name: &str) -> anyhow::Result<f64> {
        Ok(self.lock().control_channels.get(name).copied().unwrap_or(0.0))
    }

    fn set_control_channel(&self, name: &str, value: f64) -> anyhow::Result<()> {
        self.lock().control_channels.insert(name.to_string(), value);
        Ok(())
    }

    fn string_channel(&self, name: &str) -> anyhow::Result<String> {
        Ok(self
            .lock()
            .string_channels
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn set_string_channel(&self, name: &str, value: &str) -> anyhow::Result<()> {
        self.lock()
            .string_channels
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn audio_channel(&self, name: &str) -> anyhow::Result<Vec<f64>> {
        Ok(self
            .lock()
            .audio_channels
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    fn set_audio_channel(&self, name: &str, samples: &[f64]) -> anyhow::Result<()> {
        self.lock()
            .audio_channels
            .insert(name.to_string(), samples.to_vec());
        Ok(())
    }

    fn create_message_buffer(&self) {
        self.lock().buffering = true;
    }

    fn destroy_message_buffer(&self) {
        let mut state = self.lock();
        state.buffering = false;
        state.messages.clear();
    }

    fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    fn pop_first_message(&self) -> Option<String> {
        self.lock().messages.pop_front()
    }

    fn audio_devices(&self, output: bool) -> Vec<AudioDeviceInfo> {
        if output {
            vec![AudioDeviceInfo {
                id: "dac0".to_string(),
                name: "offline output".to_string(),
                is_output: true,
            }]
        } else {
            vec![AudioDeviceInfo {
                id: "adc0".to_string(),
                name: "offline input".to_string(),
                is_output: false,
            }]
        }
    }

    fn start_record(&self, path: &str, _sample_bits: u32, _num_buffers: u32) -> anyhow::Result<()> {
        self.lock().recording = Some(path.to_string());
        Ok(())
    }

    fn stop_record(&self) {
        self.lock().recording = None;
    }
}
