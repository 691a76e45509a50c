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

use std::{error::Error, fs::File, path::PathBuf, sync::Arc};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::samples::SampleAsset;

/// Writes a 32-bit float WAV file with one Vec per channel. All channels
/// must have the same length; samples are interleaved frame by frame.
pub fn write_wav(
    path: PathBuf,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let tempwav = File::create(path)?;

    let num_channels = channels.len();
    assert!(num_channels > 0, "At least one channel required!");
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let frames = channels[0].len();
    assert!(
        channels.iter().all(|c| c.len() == frames),
        "Channel lengths must match!"
    );

    let mut writer = WavWriter::new(
        tempwav,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    for frame in 0..frames {
        for channel in &channels {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// Builds an in-memory mono-ramp asset without touching disk.
pub fn make_asset(frames: usize, channels: u16, needs_streaming: bool) -> Arc<SampleAsset> {
    let stride = channels as usize;
    let data: Vec<f32> = (0..frames * stride)
        .map(|i| (i / stride) as f32 / 65536.0)
        .collect();
    Arc::new(SampleAsset::from_data(data, channels, needs_streaming))
}
