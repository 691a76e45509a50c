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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::get_codecs;
use symphonia::default::get_probe;

use super::error::DecodeError;

/// A seekable audio file reader producing interleaved f32 frames.
///
/// Supports the formats symphonia can decode (WAV, FLAC, MP3, ...). Reads
/// are sequential from the current position; `seek_to_frame` repositions the
/// reader frame-accurately. Files must report their total length up front,
/// which every sampler-relevant container does.
pub struct AudioFileReader {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    total_frames: u64,
    /// Frame index the next read will return.
    next_frame: u64,
    /// Decoded interleaved samples not yet handed out.
    pending: Vec<f32>,
    /// Reusable conversion buffer, created on the first decoded packet.
    sample_buf: Option<SampleBuffer<f32>>,
}

impl AudioFileReader {
    /// Opens an audio file for frame-accurate reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        // Open the file (include path in error so user sees which file failed)
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| {
            DecodeError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path_ref.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(extension) = path_ref.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| {
                DecodeError::Unsupported(format!("'{}': {}", path_ref.display(), e))
            })?;

        let format_reader = probed.format;

        // Find the first audio track
        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                DecodeError::Unsupported(format!("{}: no audio track found", path_ref.display()))
            })?;

        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            DecodeError::Unsupported(format!(
                "{}: sample rate not specified",
                path_ref.display()
            ))
        })?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .filter(|&c| c > 0)
            .ok_or_else(|| {
                DecodeError::Unsupported(format!(
                    "{}: channel count not specified",
                    path_ref.display()
                ))
            })?;
        // The pool clamps streaming reads against the file length, so an
        // unknown length cannot be worked around later.
        let total_frames = params.n_frames.ok_or_else(|| {
            DecodeError::Unsupported(format!(
                "{}: total frame count not specified",
                path_ref.display()
            ))
        })?;

        let decoder_opts: DecoderOptions = Default::default();
        let decoder = get_codecs().make(params, &decoder_opts).map_err(|e| {
            DecodeError::Unsupported(format!("'{}': {}", path_ref.display(), e))
        })?;

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            channels,
            sample_rate,
            total_frames,
            next_frame: 0,
            pending: Vec::new(),
            sample_buf: None,
        })
    }

    /// Number of channels in the file.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the file.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total number of frames in the file.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Frame index the next read will return.
    pub fn position(&self) -> u64 {
        self.next_frame
    }

    /// Repositions the reader so the next read returns `frame`.
    ///
    /// A no-op when the reader is already positioned there, which keeps
    /// sequential refills from resetting the decoder on every pass.
    pub fn seek_to_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        if frame == self.next_frame {
            return Ok(());
        }

        let seeked = self.format_reader.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame,
                track_id: self.track_id,
            },
        )?;
        self.decoder.reset();
        self.pending.clear();
        self.next_frame = seeked.actual_ts;

        // Accurate seeks land on the packet containing the target, which may
        // start before it. Decode and drop frames up to the target.
        let channels = self.channels as usize;
        while self.next_frame < frame {
            if self.pending.is_empty() && self.decode_next_packet()? == 0 {
                break;
            }
            let skip = ((frame - self.next_frame) as usize).min(self.pending.len() / channels);
            self.pending.drain(..skip * channels);
            self.next_frame += skip as u64;
        }

        Ok(())
    }

    /// Reads up to `max_frames` interleaved frames into `out`.
    /// Returns the number of frames read (0 = EOF).
    pub fn read_frames(&mut self, out: &mut [f32], max_frames: usize) -> Result<usize, DecodeError> {
        let channels = self.channels as usize;
        let wanted = max_frames.min(out.len() / channels);

        let mut frames_read = 0;
        while frames_read < wanted {
            if self.pending.is_empty() && self.decode_next_packet()? == 0 {
                break;
            }
            let available = self.pending.len() / channels;
            let take = available.min(wanted - frames_read);
            let samples = take * channels;
            let base = frames_read * channels;
            out[base..base + samples].copy_from_slice(&self.pending[..samples]);
            self.pending.drain(..samples);
            self.next_frame += take as u64;
            frames_read += take;
        }

        Ok(frames_read)
    }

    /// Decodes the next packet for our track into `pending`.
    /// Returns the number of frames appended (0 = EOF).
    fn decode_next_packet(&mut self) -> Result<usize, DecodeError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    // End of file - we're done reading
                    return Ok(0);
                }
                Err(SymphoniaError::DecodeError(_)) => {
                    // Some decoders return DecodeError at EOF instead of IoError
                    return Ok(0);
                }
                Err(e) => return Err(DecodeError::AudioError(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    match self.decoder.decode(&packet) {
                        Ok(decoded) => decoded,
                        Err(e) => return Err(DecodeError::AudioError(e)),
                    }
                }
                Err(e) => return Err(DecodeError::AudioError(e)),
            };

            let frames = decoded.frames();
            if frames == 0 {
                // Header packets (e.g. Ogg) decode to zero PCM frames.
                continue;
            }

            if self.sample_buf.is_none() {
                self.sample_buf = Some(SampleBuffer::new(
                    decoded.capacity() as u64,
                    *decoded.spec(),
                ));
            }
            if let Some(buf) = self.sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                self.pending.extend_from_slice(buf.samples());
            }

            return Ok(frames);
        }
    }
}

impl std::fmt::Debug for AudioFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFileReader")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("total_frames", &self.total_frames)
            .field("position", &self.next_frame)
            .finish()
    }
}
