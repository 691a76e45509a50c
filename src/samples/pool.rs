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

//! The sample pool.
//!
//! Owns the loaded assets (one per distinct file), the set of active
//! per-voice streams and the background worker that tops their ring buffers
//! up from disk. The render path never waits for that worker: it asks for a
//! refill with a non-blocking send that coalesces with requests already
//! pending.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::asset::SampleAsset;
use super::error::SampleError;
use super::stream::SampleStream;
use super::voice::Voice;
use crate::config::StreamingConfig;

/// The sample pool deduplicates sample assets and manages active streams.
pub struct SamplePool {
    config: StreamingConfig,
    /// Loaded assets by file path.
    assets: Mutex<HashMap<PathBuf, Arc<SampleAsset>>>,
    /// Active streams. The lock is held by stream creation/destruction and
    /// for the whole of a refill pass, so a stream can never be torn down
    /// while its fill is running.
    streams: Arc<Mutex<Vec<Arc<SampleStream>>>>,
    /// Wakes the refill worker. Bounded to one slot so repeated requests
    /// coalesce instead of queueing.
    refill_tx: Sender<()>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SamplePool {
    /// Creates a pool. When streaming is enabled this spawns the background
    /// refill worker; spawn failure is the only error path.
    pub fn new(config: StreamingConfig) -> Result<Self, io::Error> {
        let (refill_tx, refill_rx) = crossbeam_channel::bounded(1);
        let streams: Arc<Mutex<Vec<Arc<SampleStream>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = if config.streaming() {
            let streams = Arc::clone(&streams);
            let shutdown = Arc::clone(&shutdown);
            let handle = thread::Builder::new()
                .name("samplestream-refill".to_string())
                .spawn(move || {
                    while refill_rx.recv().is_ok() {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        Self::refill_pass(&streams);
                    }
                    debug!("Refill worker exiting");
                })?;
            Some(handle)
        } else {
            None
        };

        info!(
            streaming = config.streaming(),
            buffer_frames = config.stream_buffer_frames(),
            "Sample pool created"
        );

        Ok(Self {
            config,
            assets: Mutex::new(HashMap::new()),
            streams,
            refill_tx,
            shutdown,
            worker,
        })
    }

    /// The pool's streaming configuration.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Returns the asset for the given file, loading it on first request.
    /// A failed load registers nothing; a later retry starts from scratch.
    pub fn get_asset<P: AsRef<Path>>(&self, path: P) -> Result<Arc<SampleAsset>, SampleError> {
        let path = path.as_ref();
        let mut assets = self.assets.lock();
        if let Some(asset) = assets.get(path) {
            debug!(path = ?path, "Using cached sample asset");
            return Ok(Arc::clone(asset));
        }

        let asset = Arc::new(SampleAsset::load(
            path,
            self.config.streaming(),
            self.config.stream_buffer_frames(),
        )?);
        assets.insert(path.to_path_buf(), Arc::clone(&asset));
        Ok(asset)
    }

    /// Creates a stream for the given voice and registers it with the
    /// refill worker. Nothing is registered when construction fails.
    pub fn create_stream(&self, voice: Arc<Voice>) -> Result<Arc<SampleStream>, SampleError> {
        let stream = Arc::new(SampleStream::new(
            voice,
            &self.config,
            self.refill_tx.clone(),
        )?);
        self.streams.lock().push(Arc::clone(&stream));
        Ok(stream)
    }

    /// Removes a stream from the active set. Unknown streams (for example a
    /// stream destroyed twice) are reported and otherwise ignored.
    pub fn destroy_stream(&self, stream: &Arc<SampleStream>) {
        let mut streams = self.streams.lock();
        match streams.iter().position(|s| Arc::ptr_eq(s, stream)) {
            Some(index) => {
                streams.remove(index);
            }
            None => {
                warn!(stream = ?stream, "Could not find stream to destroy");
            }
        }
    }

    /// Asks the refill worker to run a pass soon. Non-blocking; requests
    /// made while one is already pending merge with it.
    pub fn request_refill(&self) {
        let _ = self.refill_tx.try_send(());
    }

    /// Tops up every active stream. One failing stream never starves the
    /// others; its error is logged and the pass moves on.
    fn refill_pass(streams: &Mutex<Vec<Arc<SampleStream>>>) {
        let streams = streams.lock();
        for stream in streams.iter() {
            if let Err(e) = stream.fill_buffer() {
                error!(error = %e, "Failed to refill stream buffer");
            }
        }
    }

    /// Returns the number of active streams.
    pub fn active_stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Returns the number of loaded assets.
    pub fn asset_count(&self) -> usize {
        self.assets.lock().len()
    }

    /// Returns the total memory used by loaded assets.
    pub fn memory_usage(&self) -> usize {
        self.assets.lock().values().map(|a| a.memory_size()).sum()
    }
}

impl Drop for SamplePool {
    fn drop(&mut self) {
        self.streams.lock().clear();
        if let Some(worker) = self.worker.take() {
            self.shutdown.store(true, Ordering::Relaxed);
            // Wake the worker; if the slot is already full the pending
            // request wakes it just the same.
            let _ = self.refill_tx.try_send(());
            if worker.join().is_err() {
                warn!("Refill worker exited with a panic");
            }
        }
    }
}

impl std::fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplePool")
            .field("assets", &self.asset_count())
            .field("active_streams", &self.active_stream_count())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::voice::LoopMode;
    use crate::testutil::audio::write_wav;
    use crate::testutil::polling::eventually;
    use tempfile::tempdir;

    fn val(frame: usize, channel: usize) -> f32 {
        (frame as f32 + channel as f32 / 10.0) / 65536.0
    }

    fn write_fixture(dir: &tempfile::TempDir, name: &str, frames: usize, channels: usize) -> PathBuf {
        let path = dir.path().join(name);
        let data: Vec<Vec<f32>> = (0..channels)
            .map(|ch| (0..frames).map(|i| val(i, ch)).collect())
            .collect();
        write_wav(path.clone(), data, 44100).unwrap();
        path
    }

    fn streaming_pool(capacity_frames: usize, fill_percentage: f32) -> SamplePool {
        SamplePool::new(StreamingConfig::new(true, capacity_frames, fill_percentage)).unwrap()
    }

    #[test]
    fn test_asset_deduplication() {
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "dedupe.wav", 500, 1);
        let pool = streaming_pool(1000, 0.25);

        let first = pool.get_asset(&path).unwrap();
        let second = pool.get_asset(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.asset_count(), 1);
    }

    #[test]
    fn test_failed_load_registers_nothing() {
        let dir = tempdir().unwrap();
        let pool = streaming_pool(1000, 0.25);
        let missing = dir.path().join("missing.wav");

        assert!(pool.get_asset(&missing).is_err());
        assert_eq!(pool.asset_count(), 0);
        // A retry fails the same way instead of hitting a half-registered
        // entry.
        assert!(pool.get_asset(&missing).is_err());
        assert_eq!(pool.asset_count(), 0);
    }

    #[test]
    fn test_streaming_disabled_creates_resident_streams() {
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "big.wav", 5000, 1);
        let pool =
            SamplePool::new(StreamingConfig::new(false, 1000, 0.25)).unwrap();

        let asset = pool.get_asset(&path).unwrap();
        assert!(!asset.needs_streaming());
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();
        assert!(!stream.is_streaming());
        assert_eq!(stream.sample_at(4500), val(4500, 0));
    }

    #[test]
    fn test_small_asset_stays_resident() {
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "small.wav", 500, 1);
        let pool = streaming_pool(1000, 0.25);

        let asset = pool.get_asset(&path).unwrap();
        assert!(!asset.needs_streaming());
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();
        assert!(!stream.is_streaming());
    }

    #[test]
    fn test_destroy_stream_twice_is_diagnosed_not_fatal() {
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "twice.wav", 5000, 1);
        let pool = streaming_pool(1000, 0.25);

        let asset = pool.get_asset(&path).unwrap();
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();
        assert_eq!(pool.active_stream_count(), 1);

        pool.destroy_stream(&stream);
        assert_eq!(pool.active_stream_count(), 0);

        // The second destroy logs and returns.
        pool.destroy_stream(&stream);
        assert_eq!(pool.active_stream_count(), 0);
    }

    #[test]
    fn test_low_water_read_wakes_worker() {
        crate::testutil::init_logging();
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "worker.wav", 10_000, 2);
        let pool = streaming_pool(1000, 0.25);

        let asset = pool.get_asset(&path).unwrap();
        assert!(asset.needs_streaming());
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();
        assert!(stream.is_streaming());

        // Consume until the buffered span crosses the low-water mark; the
        // read path fires the refill request itself.
        for pos in 0..1600i64 {
            let (frame, channel) = ((pos / 2) as usize, (pos % 2) as usize);
            assert_eq!(stream.sample_at(pos), val(frame, channel), "pos {pos}");
        }

        eventually(
            || stream.buffered_samples() > 1000,
            "refill worker never topped up the stream",
        );

        // The refilled data continues the file where the prefetch ended.
        assert_eq!(stream.sample_at(2000), val(1000, 0));
        pool.destroy_stream(&stream);
    }

    #[test]
    fn test_explicit_refill_request() {
        crate::testutil::init_logging();
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "explicit.wav", 10_000, 2);
        let pool = streaming_pool(1000, 0.5);

        let asset = pool.get_asset(&path).unwrap();
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();

        // Establish read history so the fill pass has something to do.
        for pos in 0..600i64 {
            stream.sample_at(pos);
        }
        assert!(stream.buffered_samples() <= 1600);

        pool.request_refill();
        eventually(
            || {
                pool.request_refill();
                stream.buffered_samples() > 1600
            },
            "refill request never reached the worker",
        );
    }

    #[test]
    fn test_teardown_with_active_streams() {
        let dir = tempdir().unwrap();
        let path = write_fixture(&dir, "teardown.wav", 5000, 1);
        let pool = streaming_pool(1000, 0.25);

        let asset = pool.get_asset(&path).unwrap();
        let voice = Arc::new(Voice::new(asset, LoopMode::Off, 0, 0));
        let stream = pool.create_stream(voice).unwrap();

        // Dropping the pool joins the worker even though the caller still
        // holds a stream handle.
        drop(pool);
        assert!(stream.is_streaming());
    }

    #[test]
    fn test_pool_debug_summary() {
        let pool = streaming_pool(1000, 0.25);
        let debug = format!("{:?}", pool);
        assert!(debug.contains("SamplePool"));
        assert!(debug.contains("active_streams"));
    }
}
