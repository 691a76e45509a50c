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

//! Voice state observed by the streaming engine.
//!
//! The envelope/playback machinery owns when a voice changes state; the
//! stream attached to it only reads that state, except for the looping flag
//! and (for resident playback) the position rewind performed by the
//! loop-boundary update.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::asset::SampleAsset;

/// Loop behavior requested for a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// No looping; the sample plays through once.
    Off,
    /// Loop regardless of the voice's playback state.
    Continuous,
    /// Loop only while the voice is playing or sustained.
    Sustain,
}

/// Playback phase of a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum VoiceState {
    Playing = 0,
    Sustained = 1,
    Releasing = 2,
    Stopped = 3,
}

impl VoiceState {
    fn from_u8(value: u8) -> VoiceState {
        match value {
            0 => VoiceState::Playing,
            1 => VoiceState::Sustained,
            2 => VoiceState::Releasing,
            _ => VoiceState::Stopped,
        }
    }
}

/// A voice bound to one sample asset.
///
/// Cross-thread fields are atomics with relaxed ordering: the render thread
/// and the refill worker both observe them, and a stale read costs at most
/// one silent sample or one redundant refill request.
pub struct Voice {
    /// The asset this voice plays.
    asset: Arc<SampleAsset>,
    /// Loop behavior for this voice.
    loop_mode: LoopMode,
    /// First frame of the loop region.
    loop_start: u64,
    /// One past the last frame of the loop region.
    loop_end: u64,
    /// Current playback phase.
    state: AtomicU8,
    /// Whether the loop region is currently being honored.
    looping: AtomicBool,
    /// Current playback position in frames. Rewound by the loop-boundary
    /// update when resident playback wraps.
    position: AtomicU64,
    /// One past the last interleaved sample the render path should request.
    /// Extended by the loop-boundary update when streaming playback wraps.
    end_index: AtomicU64,
}

impl Voice {
    /// Creates a voice for the given asset. The loop region is in frames;
    /// pass `LoopMode::Off` and zeros when the zone defines no loop.
    pub fn new(asset: Arc<SampleAsset>, loop_mode: LoopMode, loop_start: u64, loop_end: u64) -> Self {
        let end_index = asset.total_frames() * u64::from(asset.channels());
        Self {
            asset,
            loop_mode,
            loop_start,
            loop_end,
            state: AtomicU8::new(VoiceState::Playing as u8),
            looping: AtomicBool::new(false),
            position: AtomicU64::new(0),
            end_index: AtomicU64::new(end_index),
        }
    }

    /// The asset this voice plays.
    pub fn asset(&self) -> &Arc<SampleAsset> {
        &self.asset
    }

    /// Channel count of the bound asset.
    pub fn channels(&self) -> u16 {
        self.asset.channels()
    }

    /// Loop behavior for this voice.
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// First frame of the loop region.
    pub fn loop_start(&self) -> u64 {
        self.loop_start
    }

    /// One past the last frame of the loop region.
    pub fn loop_end(&self) -> u64 {
        self.loop_end
    }

    /// Current playback phase.
    pub fn state(&self) -> VoiceState {
        VoiceState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Sets the playback phase. Called by the envelope machinery.
    pub fn set_state(&self, state: VoiceState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Whether the loop region is currently being honored.
    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Current playback position in frames.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Sets the playback position in frames.
    pub fn set_position(&self, frames: u64) {
        self.position.store(frames, Ordering::Relaxed);
    }

    /// One past the last interleaved sample the render path should request.
    pub fn end_index(&self) -> u64 {
        self.end_index.load(Ordering::Relaxed)
    }

    pub(crate) fn extend_end_index(&self, samples: u64) {
        self.end_index.fetch_add(samples, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("asset", &self.asset.path())
            .field("loop_mode", &self.loop_mode)
            .field("state", &self.state())
            .field("looping", &self.is_looping())
            .finish()
    }
}
