// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::{Deserialize, Serialize};

/// Default ring buffer capacity per streaming voice, in frames.
pub const DEFAULT_STREAM_BUFFER_FRAMES: usize = 4096;

/// Default fraction of the ring buffer below which a refill is requested.
pub const DEFAULT_FILL_PERCENTAGE: f32 = 0.5;

/// Sample streaming configuration.
///
/// Controls whether large samples are streamed from disk and how much data
/// each streaming voice keeps buffered ahead of playback.
#[derive(Deserialize, Clone, Serialize, Debug)]
pub struct StreamingConfig {
    /// Whether samples too large to keep resident are streamed from disk.
    #[serde(default = "default_streaming")]
    streaming: bool,

    /// Ring buffer capacity per streaming voice, in frames.
    #[serde(default = "default_stream_buffer_frames")]
    stream_buffer_frames: usize,

    /// Fraction of the buffer below which a background refill is requested.
    #[serde(default = "default_fill_percentage")]
    fill_percentage: f32,
}

fn default_streaming() -> bool {
    true
}

fn default_stream_buffer_frames() -> usize {
    DEFAULT_STREAM_BUFFER_FRAMES
}

fn default_fill_percentage() -> f32 {
    DEFAULT_FILL_PERCENTAGE
}

impl StreamingConfig {
    /// Creates a new streaming configuration. The buffer capacity is floored
    /// at one frame and the fill fraction is clamped to [0, 1].
    pub fn new(streaming: bool, stream_buffer_frames: usize, fill_percentage: f32) -> Self {
        Self {
            streaming,
            stream_buffer_frames: stream_buffer_frames.max(1),
            fill_percentage: fill_percentage.clamp(0.0, 1.0),
        }
    }

    /// Whether streaming is enabled for the pool.
    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// Ring buffer capacity per streaming voice, in frames.
    pub fn stream_buffer_frames(&self) -> usize {
        self.stream_buffer_frames.max(1)
    }

    /// Fraction of the buffer below which a refill is requested.
    pub fn fill_percentage(&self) -> f32 {
        self.fill_percentage.clamp(0.0, 1.0)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::new(true, DEFAULT_STREAM_BUFFER_FRAMES, DEFAULT_FILL_PERCENTAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamingConfig::default();
        assert!(config.streaming());
        assert_eq!(config.stream_buffer_frames(), DEFAULT_STREAM_BUFFER_FRAMES);
        assert_eq!(config.fill_percentage(), DEFAULT_FILL_PERCENTAGE);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: StreamingConfig = serde_yml::from_str("streaming: true").unwrap();
        assert!(config.streaming());
        assert_eq!(config.stream_buffer_frames(), DEFAULT_STREAM_BUFFER_FRAMES);
        assert_eq!(config.fill_percentage(), DEFAULT_FILL_PERCENTAGE);
    }

    #[test]
    fn test_deserialize_full() {
        let yaml = r#"
streaming: false
stream_buffer_frames: 1000
fill_percentage: 0.25
"#;
        let config: StreamingConfig = serde_yml::from_str(yaml).unwrap();
        assert!(!config.streaming());
        assert_eq!(config.stream_buffer_frames(), 1000);
        assert_eq!(config.fill_percentage(), 0.25);
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = StreamingConfig::new(true, 0, 3.5);
        assert_eq!(config.stream_buffer_frames(), 1);
        assert_eq!(config.fill_percentage(), 1.0);
    }
}
