//! Rendering configuration for an engine session.
//!
//! [`EngineConfig`] carries the parameters a session applies when it
//! starts its engine: sample rate, control block size, channel count,
//! device selectors, an optional UDP listen port, and an optional buffer
//! size override. The defaults match interactive real-time use
//! (48 kHz, ksmps 100, stereo, `dac` output).

/// Rendering parameters applied at engine start.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Control block size in samples (ksmps).
    pub ksmps: u32,
    /// Number of output channels (nchnls).
    pub channels: u32,
    /// Full-scale amplitude (0dbfs).
    pub zero_dbfs: f64,
    /// Output device selector, appended to `-o` (e.g. "dac", "dac2").
    pub output_device: String,
    /// Input device selector, appended to `-i`. Empty = no input.
    pub input_device: String,
    /// UDP port the engine should listen on for code and events.
    /// 0 = do not listen.
    pub listen_port: u16,
    /// Hardware/software buffer size override (`-B`/`-b`). 0 = default.
    pub buffer_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            ksmps: 100,
            channels: 2,
            zero_dbfs: 1.0,
            output_device: "dac".to_string(),
            input_device: String::new(),
            listen_port: 0,
            buffer_size: 0,
        }
    }
}

impl EngineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Set the control block size.
    pub fn with_ksmps(mut self, ksmps: u32) -> Self {
        self.ksmps = ksmps;
        self
    }

    /// Set the number of output channels.
    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = channels;
        self
    }

    /// Set the full-scale amplitude.
    pub fn with_zero_dbfs(mut self, zero_dbfs: f64) -> Self {
        self.zero_dbfs = zero_dbfs;
        self
    }

    /// Set the output device selector.
    pub fn with_output_device(mut self, device: impl Into<String>) -> Self {
        self.output_device = device.into();
        self
    }

    /// Set the input device selector.
    pub fn with_input_device(mut self, device: impl Into<String>) -> Self {
        self.input_device = device.into();
        self
    }

    /// Make the engine listen on a UDP port for code and events.
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Override the hardware and software buffer sizes.
    pub fn with_buffer_size(mut self, size: u32) -> Self {
        self.buffer_size = size;
        self
    }

    /// Engine option strings for this configuration, in application order.
    pub fn options(&self) -> Vec<String> {
        let mut opts = vec![format!("-o{}", self.output_device)];
        if !self.input_device.is_empty() {
            opts.push(format!("-i{}", self.input_device));
        }
        if self.listen_port > 0 {
            opts.push(format!("--port={}", self.listen_port));
        }
        if self.buffer_size > 0 {
            opts.push(format!("-B{}", self.buffer_size));
            opts.push(format!("-b{}", self.buffer_size));
        }
        opts
    }

    /// The minimal orchestra header establishing the rendering parameters.
    pub fn header_orc(&self) -> String {
        format!(
            "sr = {}\nksmps = {}\nnchnls = {}\n0dbfs = {}\n",
            self.sample_rate, self.ksmps, self.channels, self.zero_dbfs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = EngineConfig::default().options();
        assert_eq!(opts, vec!["-odac".to_string()]);
    }

    #[test]
    fn test_full_options() {
        let cfg = EngineConfig::new()
            .with_output_device("dac1")
            .with_input_device("adc0")
            .with_listen_port(12894)
            .with_buffer_size(256);
        assert_eq!(
            cfg.options(),
            vec!["-odac1", "-iadc0", "--port=12894", "-B256", "-b256"]
        );
    }

    #[test]
    fn test_header_orc() {
        let cfg = EngineConfig::new().with_sample_rate(44100).with_ksmps(64);
        let orc = cfg.header_orc();
        assert!(orc.contains("sr = 44100"));
        assert!(orc.contains("ksmps = 64"));
        assert!(orc.contains("nchnls = 2"));
        assert!(orc.contains("0dbfs = 1"));
    }
}
