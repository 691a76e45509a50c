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

//! Per-voice playback streams.
//!
//! A stream serves one voice from either the asset's resident data or a
//! ring buffer refilled from disk by the pool's background worker. The read
//! path runs on the render thread and never touches the file: when the
//! requested data has not been produced yet it returns silence, and when the
//! buffered span runs low it fires a non-blocking refill request.

use std::io;
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::debug;

use super::error::SampleError;
use super::voice::{LoopMode, Voice, VoiceState};
use crate::audio::{AudioFileReader, DecodeError};
use crate::config::StreamingConfig;

/// Maps a monotonic sample counter into ring buffer index space.
#[inline]
pub(crate) fn wrap_index(index: u64, capacity: usize) -> usize {
    (index % capacity as u64) as usize
}

/// Ring state shared between the render thread and the refill worker.
/// Cursors count interleaved samples and never wrap; wrapping happens only
/// when a buffer slot is computed.
struct Ring {
    data: Vec<f32>,
    /// Next sample index the refill path will produce.
    write_pos: u64,
    /// Highest sample index the render path has consumed.
    read_pos: u64,
}

/// Decoder-side state. Only the refill worker locks this, and it may block
/// on file I/O while holding it; the ring lock is never held across a read.
struct Refill {
    reader: AudioFileReader,
    /// Next frame to read from the backing file.
    file_read_pos: u64,
    /// Reusable decode target, copied into the ring under the ring lock.
    scratch: Vec<f32>,
}

struct StreamingState {
    ring: Mutex<Ring>,
    refill: Mutex<Refill>,
    capacity_samples: usize,
    /// Samples behind the read cursor kept intact for interpolation.
    backward_margin: usize,
    /// Buffered-span threshold (in samples) below which a refill is requested.
    fill_threshold: usize,
    /// Cached loop length in frames, captured at construction.
    loop_span_frames: u64,
    refill_tx: Sender<()>,
}

enum Mode {
    /// All data is resident in the asset; reads index it directly.
    Resident,
    Streaming(StreamingState),
}

/// A per-voice sample stream.
pub struct SampleStream {
    voice: Arc<Voice>,
    mode: Mode,
}

impl SampleStream {
    /// Creates a stream for the given voice. Produces a resident stream
    /// unless the pool has streaming enabled and the asset requires it, in
    /// which case the backing file is opened and the ring buffer is seeded
    /// from the asset prefetch so playback starts with a full buffer.
    pub(crate) fn new(
        voice: Arc<Voice>,
        config: &StreamingConfig,
        refill_tx: Sender<()>,
    ) -> Result<Self, SampleError> {
        let asset = Arc::clone(voice.asset());
        if !config.streaming() || !asset.needs_streaming() {
            debug!(path = ?asset.path(), "Created resident stream");
            return Ok(Self {
                voice,
                mode: Mode::Resident,
            });
        }

        let channels = asset.channels() as usize;
        let capacity_frames = config.stream_buffer_frames();
        let capacity_samples = capacity_frames * channels;

        let mut data = vec![0.0f32; capacity_samples];
        let prefill = asset.data().len().min(capacity_samples);
        data[..prefill].copy_from_slice(&asset.data()[..prefill]);

        let reader = AudioFileReader::open(asset.path()).map_err(|source| {
            SampleError::StreamOpen {
                path: asset.path().to_path_buf(),
                source,
            }
        })?;

        let loop_span_frames = voice.loop_end().saturating_sub(voice.loop_start());
        let fill_threshold = (config.fill_percentage() * capacity_samples as f32) as usize;
        let backward_margin = channels * 4; // 4 interpolation taps per channel

        debug!(
            path = ?asset.path(),
            capacity_frames,
            fill_threshold,
            "Created streaming stream"
        );

        Ok(Self {
            voice,
            mode: Mode::Streaming(StreamingState {
                ring: Mutex::new(Ring {
                    data,
                    write_pos: prefill as u64,
                    read_pos: 0,
                }),
                refill: Mutex::new(Refill {
                    reader,
                    file_read_pos: (prefill / channels) as u64,
                    scratch: Vec::new(),
                }),
                capacity_samples,
                backward_margin,
                fill_threshold,
                loop_span_frames,
                refill_tx,
            }),
        })
    }

    /// The voice this stream serves.
    pub fn voice(&self) -> &Arc<Voice> {
        &self.voice
    }

    /// Whether this stream is backed by a disk-fed ring buffer.
    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming(_))
    }

    /// The amount of valid, already-buffered data in interleaved samples.
    /// Resident streams report their full data length.
    pub fn buffered_samples(&self) -> u64 {
        match &self.mode {
            Mode::Resident => self.voice.asset().data().len() as u64,
            Mode::Streaming(s) => {
                let ring = s.ring.lock();
                ring.write_pos - ring.read_pos
            }
        }
    }

    /// Returns the sample at the given interleaved index.
    ///
    /// Called per output sample by the render thread; never blocks on file
    /// I/O. Data that is not buffered yet (or a negative index while not
    /// looping) reads as silence.
    pub fn sample_at(&self, pos: i64) -> f32 {
        if pos < 0 && !self.voice.is_looping() {
            return 0.0;
        }

        match &self.mode {
            Mode::Resident => self.resident_sample(pos),
            Mode::Streaming(s) => self.streaming_sample(s, pos),
        }
    }

    fn resident_sample(&self, pos: i64) -> f32 {
        let data = self.voice.asset().data();
        if !self.voice.is_looping() {
            if pos < 0 {
                return 0.0;
            }
            return data.get(pos as usize).copied().unwrap_or(0.0);
        }

        // Remap indices outside the loop window back into it by one
        // loop-span offset so interpolation can read across the boundary.
        let channels = i64::from(self.voice.channels());
        let loop_start = self.voice.loop_start() as i64 * channels;
        let loop_end = self.voice.loop_end() as i64 * channels;
        let span = loop_end - loop_start;

        let idx = if pos < loop_start {
            pos + span
        } else if pos > loop_end + channels - 1 {
            pos - span
        } else {
            pos
        };

        if idx < 0 {
            return 0.0;
        }
        data.get(idx as usize).copied().unwrap_or(0.0)
    }

    fn streaming_sample(&self, s: &StreamingState, pos: i64) -> f32 {
        // The ring only ever holds data at and after the stream start; a
        // negative index cannot be served even while looping.
        if pos < 0 {
            return 0.0;
        }
        let pos = pos as u64;

        let (sample, low_water) = {
            let mut ring = s.ring.lock();

            // The read cursor tracks the render path's forward progress and
            // only ever moves forward, clamped to already-written data.
            if pos > ring.read_pos && pos < ring.write_pos {
                ring.read_pos = pos;
            }
            if pos >= ring.write_pos {
                // Underrun: the refill path has not produced this yet.
                return 0.0;
            }

            let buffered = ring.write_pos - ring.read_pos;
            (
                ring.data[wrap_index(pos, s.capacity_samples)],
                buffered <= s.fill_threshold as u64,
            )
        };

        if low_water {
            // Fire and forget; a request already pending covers this one.
            let _ = s.refill_tx.try_send(());
        }

        sample
    }

    /// Tops the ring buffer up from the backing file.
    ///
    /// Called by the pool's refill worker; may block on file I/O. No-op for
    /// resident streams. Fills the contiguous span from the write position
    /// up to the wrap point or the interpolation lookback margin behind the
    /// read cursor, whichever is nearer, clipping reads at the loop end and
    /// rewinding the file cursor by the loop span while looping.
    pub fn fill_buffer(&self) -> Result<(), SampleError> {
        let s = match &self.mode {
            Mode::Resident => return Ok(()),
            Mode::Streaming(s) => s,
        };
        let mut refill = s.refill.lock();
        let refill = &mut *refill;

        let (write_pos, read_pos) = {
            let ring = s.ring.lock();
            (ring.write_pos, ring.read_pos)
        };

        // Until the render path has consumed a full margin there is nothing
        // that can be safely overwritten.
        if read_pos < s.backward_margin as u64 {
            return Ok(());
        }
        if write_pos - read_pos >= s.capacity_samples as u64 {
            return Ok(());
        }

        let mut write_in_buffer = wrap_index(write_pos, s.capacity_samples);
        let read_back_in_buffer =
            wrap_index(read_pos - s.backward_margin as u64, s.capacity_samples);

        let to_fill_samples = if read_back_in_buffer < write_in_buffer {
            s.capacity_samples - write_in_buffer
        } else {
            read_back_in_buffer - write_in_buffer
        };

        let channels = self.voice.channels() as usize;
        let mut to_fill = (to_fill_samples / channels) as u64;

        self.update_loop(refill.file_read_pos + to_fill);

        // Never read past the end of the file.
        let total_frames = self.voice.asset().total_frames();
        if refill.file_read_pos + to_fill > total_frames {
            to_fill = total_frames.saturating_sub(refill.file_read_pos);
        }

        while to_fill > 0 {
            let mut want = to_fill;
            if self.voice.is_looping() {
                let loop_end = self.voice.loop_end();
                if refill.file_read_pos + to_fill > loop_end {
                    want = loop_end.saturating_sub(refill.file_read_pos);
                    if want == 0 {
                        // Already at the loop end; wrap and continue.
                        refill.file_read_pos -= s.loop_span_frames;
                        continue;
                    }
                }
            }

            refill
                .reader
                .seek_to_frame(refill.file_read_pos)
                .map_err(|source| self.stream_read_error(source))?;

            let want_samples = want as usize * channels;
            if refill.scratch.len() < want_samples {
                refill.scratch.resize(want_samples, 0.0);
            }
            let got = refill
                .reader
                .read_frames(&mut refill.scratch[..want_samples], want as usize)
                .map_err(|source| self.stream_read_error(source))?;
            let got_samples = got * channels;

            {
                let mut ring = s.ring.lock();
                debug_assert!(write_in_buffer + got_samples <= s.capacity_samples);
                ring.data[write_in_buffer..write_in_buffer + got_samples]
                    .copy_from_slice(&refill.scratch[..got_samples]);
                ring.write_pos += got_samples as u64;
                write_in_buffer = wrap_index(ring.write_pos, s.capacity_samples);
            }

            refill.file_read_pos += got as u64;
            to_fill -= got as u64;

            if self.voice.is_looping() && refill.file_read_pos >= self.voice.loop_end() {
                refill.file_read_pos -= s.loop_span_frames;
            }

            if (got as u64) < want {
                return Err(self.stream_read_error(DecodeError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read: wanted {want} frames, read {got}"),
                ))));
            }
        }

        Ok(())
    }

    fn stream_read_error(&self, source: DecodeError) -> SampleError {
        SampleError::StreamRead {
            path: self.voice.asset().path().to_path_buf(),
            source,
        }
    }

    /// Recomputes whether the voice's loop is honored at the given frame
    /// index and applies the wraparound bookkeeping when playback crosses
    /// the loop end.
    ///
    /// The render-side voice machinery calls this with the current playback
    /// frame index; the refill path calls it with the projected post-fill
    /// frame index. A sustain loop stops being honored once the voice
    /// leaves its playing and sustained phases.
    pub fn update_loop(&self, idx: u64) {
        let voice = &self.voice;
        let channels = u64::from(voice.channels());

        let valid_loop =
            voice.loop_end() > 0 && voice.loop_end() <= voice.end_index() / channels;
        let state = voice.state();
        let shall_loop = match voice.loop_mode() {
            LoopMode::Continuous => true,
            LoopMode::Sustain => state == VoiceState::Playing || state == VoiceState::Sustained,
            LoopMode::Off => false,
        };

        if voice.is_looping()
            && voice.loop_mode() == LoopMode::Sustain
            && state != VoiceState::Playing
            && state != VoiceState::Sustained
        {
            voice.set_looping(false);
            debug!(state = ?state, "Sustain loop released");
        }

        if !(valid_loop && shall_loop) {
            return;
        }

        if idx > voice.loop_end() {
            voice.set_looping(true);
            match &self.mode {
                // Extend the virtual end so the render path keeps
                // requesting data instead of stopping at the file end.
                Mode::Streaming(s) => voice.extend_end_index(s.loop_span_frames * channels),
                // Resident data is all in memory; rewind playback itself.
                Mode::Resident => {
                    voice.set_position(voice.loop_start() + (idx - voice.loop_end() - 1))
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn cursors(&self) -> Option<(u64, u64)> {
        match &self.mode {
            Mode::Resident => None,
            Mode::Streaming(s) => {
                let ring = s.ring.lock();
                Some((ring.write_pos, ring.read_pos))
            }
        }
    }
}

impl std::fmt::Debug for SampleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStream")
            .field("path", &self.voice.asset().path())
            .field("streaming", &self.is_streaming())
            .field("buffered_samples", &self.buffered_samples())
            .finish()
    }
}
