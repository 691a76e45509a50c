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

//! Loaded sample assets.
//!
//! An asset is loaded once per distinct file. Small files are decoded
//! entirely; files large enough to stream keep only a prefetch that new
//! streams copy into their ring buffers so playback can start without
//! waiting for disk.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::error::SampleError;
use crate::audio::AudioFileReader;

/// A decoded or streamable sample file.
pub struct SampleAsset {
    /// The file this asset was loaded from; also its registry key.
    path: PathBuf,
    /// Number of channels in the sample.
    channels: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
    /// Total number of frames in the file.
    total_frames: u64,
    /// Whether playback must stream from disk rather than use `data` alone.
    needs_streaming: bool,
    /// Interleaved f32 samples: the whole file when resident, the first
    /// ring buffer's worth when streaming.
    data: Vec<f32>,
}

impl SampleAsset {
    /// Loads a sample file, decoding either the whole file or (when the file
    /// is larger than `prefetch_frames` and streaming is enabled) just the
    /// prefetch a streaming voice needs to start without a gap.
    pub fn load(
        path: &Path,
        streaming_enabled: bool,
        prefetch_frames: usize,
    ) -> Result<Self, SampleError> {
        let asset_load = |source| SampleError::AssetLoad {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = AudioFileReader::open(path).map_err(asset_load)?;
        let channels = reader.channels();
        let sample_rate = reader.sample_rate();
        let mut total_frames = reader.total_frames();

        let needs_streaming = streaming_enabled && total_frames > prefetch_frames as u64;
        let decode_frames = if needs_streaming {
            prefetch_frames
        } else {
            total_frames as usize
        };

        let stride = channels as usize;
        let mut data = vec![0.0f32; decode_frames * stride];
        let mut frames_read = 0;
        while frames_read < decode_frames {
            let n = reader
                .read_frames(&mut data[frames_read * stride..], decode_frames - frames_read)
                .map_err(asset_load)?;
            if n == 0 {
                break;
            }
            frames_read += n;
        }

        if frames_read < decode_frames {
            // The container promised more frames than it delivered. Work
            // with what was actually read.
            warn!(
                path = ?path,
                expected = decode_frames,
                read = frames_read,
                "Sample file shorter than its header reports"
            );
            data.truncate(frames_read * stride);
            if !needs_streaming {
                total_frames = frames_read as u64;
            }
        }

        let asset = Self {
            path: path.to_path_buf(),
            channels,
            sample_rate,
            total_frames,
            needs_streaming,
            data,
        };

        info!(
            path = ?path,
            channels,
            sample_rate,
            frames = total_frames,
            streaming = needs_streaming,
            memory_kb = asset.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(asset)
    }

    /// The file this asset was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of channels in the sample.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the audio data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total number of frames in the file.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Whether playback must stream from disk.
    pub fn needs_streaming(&self) -> bool {
        self.needs_streaming
    }

    /// The decoded interleaved samples: full data for resident assets, the
    /// streaming prefetch otherwise.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the memory size of the decoded data in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for SampleAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleAsset")
            .field("path", &self.path)
            .field("channels", &self.channels)
            .field("total_frames", &self.total_frames)
            .field("needs_streaming", &self.needs_streaming)
            .finish()
    }
}

#[cfg(test)]
impl SampleAsset {
    /// Creates an in-memory asset without a backing file (test only).
    pub(crate) fn from_data(data: Vec<f32>, channels: u16, needs_streaming: bool) -> Self {
        let total_frames = (data.len() / channels as usize) as u64;
        Self {
            path: PathBuf::from(format!("mem-{}x{}", total_frames, channels)),
            channels,
            sample_rate: 44100,
            total_frames,
            needs_streaming,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::audio::write_wav;
    use tempfile::tempdir;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32 / 65536.0).collect()
    }

    #[test]
    fn test_load_resident() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.wav");
        write_wav(path.clone(), vec![ramp(500)], 44100).unwrap();

        let asset = SampleAsset::load(&path, true, 1000).unwrap();
        assert!(!asset.needs_streaming());
        assert_eq!(asset.total_frames(), 500);
        assert_eq!(asset.data().len(), 500);
        assert_eq!(asset.data()[123], ramp(500)[123]);
    }

    #[test]
    fn test_load_streaming_prefetch_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.wav");
        write_wav(path.clone(), vec![ramp(5000), ramp(5000)], 44100).unwrap();

        let asset = SampleAsset::load(&path, true, 1000).unwrap();
        assert!(asset.needs_streaming());
        assert_eq!(asset.total_frames(), 5000);
        // Only the prefetch is resident: 1000 frames x 2 channels.
        assert_eq!(asset.data().len(), 2000);
    }

    #[test]
    fn test_load_streaming_disabled_decodes_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.wav");
        write_wav(path.clone(), vec![ramp(5000)], 44100).unwrap();

        let asset = SampleAsset::load(&path, false, 1000).unwrap();
        assert!(!asset.needs_streaming());
        assert_eq!(asset.data().len(), 5000);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = SampleAsset::load(&dir.path().join("nope.wav"), true, 1000);
        assert!(matches!(result, Err(SampleError::AssetLoad { .. })));
    }
}
