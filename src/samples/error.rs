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
use std::path::PathBuf;

use crate::audio::DecodeError;

/// Error types for sample pool operations.
///
/// None of these are fatal to the engine: a failed load surfaces to the
/// caller registering the sample, a failed stream open surfaces to the
/// caller creating the stream, and a failed refill read is contained inside
/// the refill pass, leaving the stream with its last good buffer state.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Failed to load sample {path}: {source}")]
    AssetLoad {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to open stream for {path}: {source}")]
    StreamOpen {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to read {path} while refilling stream: {source}")]
    StreamRead {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
}
