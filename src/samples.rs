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

//! Sample ownership and per-voice streaming.
//!
//! This module provides:
//! - Sample loading and deduplication (one asset per distinct file)
//! - Per-voice playback streams, either memory-resident or fed from a
//!   ring buffer that a background worker refills from disk
//! - Loop-aware reads with wraparound for sustain and continuous loops
//! - A non-blocking refill request path usable from the render thread

mod asset;
mod error;
mod pool;
mod stream;
mod voice;

pub use asset::SampleAsset;
pub use error::SampleError;
pub use pool::SamplePool;
pub use stream::SampleStream;
pub use voice::{LoopMode, Voice, VoiceState};
