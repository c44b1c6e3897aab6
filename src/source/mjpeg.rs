//! MJPEG-over-HTTP network camera source.
//!
//! A background reader thread owns the HTTP stream: it connects with bounded
//! timeouts, accumulates the multipart body, slices it into JPEG images on
//! SOI/EOI marker boundaries, decodes them, and hands the results to the
//! foreground through a small drop-oldest queue. The foreground `read()` is
//! a bounded-wait pop; it never touches the network.
//!
//! All failures are absorbed here: a refused connection, a non-success
//! status, a dropped socket, or an undecodable span degrade to empty reads
//! while the reader retries on a fixed delay.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use url::Url;

use crate::frame::Frame;
use crate::source::CameraSource;

/// Capacity of the decoded-frame queue: one frame in flight, one buffered.
/// A live feed has no value in backlog, so overflow drops the oldest entry.
const QUEUE_CAPACITY: usize = 2;
/// Bytes pulled from the response body per iteration.
const CHUNK_BYTES: usize = 1024;
/// Delay before retrying after a failed or torn-down connection.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// How long `connect()` waits for the first connection attempt to land.
const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Bounded wait for a frame in `read()`.
const READ_WAIT: Duration = Duration::from_secs(1);
/// Bounded wait for the reader thread to exit during `release()`.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Hard cap on the accumulation buffer. A stream producing this much data
/// without a valid marker pair is desynced and gets reconnected.
const MAX_BUFFER_BYTES: usize = 10 * 1024 * 1024;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// Configuration for an MJPEG network camera.
#[derive(Clone, Debug)]
pub struct NetworkStreamConfig {
    /// Stream URL (e.g., "http://192.168.1.123:81/stream").
    pub url: String,
    /// Timeout for establishing the HTTP connection.
    pub connect_timeout: Duration,
    /// Timeout for each read from the response body.
    pub read_timeout: Duration,
}

impl Default for NetworkStreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:81/stream".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
        }
    }
}

/// MJPEG network camera.
pub struct NetworkStreamSource {
    name: String,
    config: NetworkStreamConfig,
    shared: Arc<StreamShared>,
    reader: Option<ReaderHandle>,
}

/// State shared between the foreground handle and the reader thread.
struct StreamShared {
    running: AtomicBool,
    connected: AtomicBool,
    queue: FrameQueue,
}

struct ReaderHandle {
    join: JoinHandle<()>,
    /// Sender half lives in the reader; disconnection means it exited.
    done: mpsc::Receiver<()>,
}

impl NetworkStreamSource {
    /// Source named after the URL host, `netcam_{host}`.
    pub fn new(config: NetworkStreamConfig) -> Self {
        let name = default_name(&config.url);
        Self::with_name(name, config)
    }

    pub fn with_name(name: impl Into<String>, config: NetworkStreamConfig) -> Self {
        Self {
            name: name.into(),
            config,
            shared: Arc::new(StreamShared {
                running: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                queue: FrameQueue::new(QUEUE_CAPACITY),
            }),
            reader: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

impl CameraSource for NetworkStreamSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> bool {
        if self.shared.running.load(Ordering::SeqCst) {
            return self.is_connected();
        }

        self.shared.running.store(true, Ordering::SeqCst);
        let (done_tx, done_rx) = mpsc::channel();
        let shared = self.shared.clone();
        let config = self.config.clone();
        let join = std::thread::spawn(move || {
            stream_reader(&config, &shared);
            drop(done_tx);
        });
        self.reader = Some(ReaderHandle {
            join,
            done: done_rx,
        });

        // Give the first connection attempt a chance before reporting.
        let deadline = Instant::now() + SETTLE_DELAY;
        while Instant::now() < deadline && !self.is_connected() {
            std::thread::sleep(Duration::from_millis(50));
        }
        self.is_connected()
    }

    fn read(&mut self) -> Option<Frame> {
        if !self.shared.running.load(Ordering::SeqCst) {
            self.connect();
        }
        self.shared.queue.pop_timeout(READ_WAIT)
    }

    fn release(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.shared.queue.clear();

        if let Some(handle) = self.reader.take() {
            match handle.done.recv_timeout(JOIN_TIMEOUT) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if handle.join.join().is_err() {
                        log::error!(
                            "NetworkStreamSource: reader for {} panicked",
                            self.config.url
                        );
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // Abandon the thread rather than hang shutdown; it exits
                    // at its next flag check.
                    log::warn!(
                        "NetworkStreamSource: reader for {} did not stop within {:?}, abandoning it",
                        self.config.url,
                        JOIN_TIMEOUT
                    );
                }
            }
            log::info!("NetworkStreamSource: released {}", self.config.url);
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for NetworkStreamSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn default_name(url: &str) -> String {
    match Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
    {
        Some(host) => format!("netcam_{}", host),
        None => "netcam".to_string(),
    }
}

// ----------------------------------------------------------------------------
// Background reader
// ----------------------------------------------------------------------------

/// Connect-and-pump loop. Runs until `running` is cleared; every failure
/// path clears `connected` and retries after `RETRY_DELAY`.
fn stream_reader(config: &NetworkStreamConfig, shared: &StreamShared) {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(config.connect_timeout)
        .timeout_read(config.read_timeout)
        .build();

    while shared.running.load(Ordering::SeqCst) {
        let response = match agent.get(&config.url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                log::error!(
                    "NetworkStreamSource: {} answered status {}",
                    config.url,
                    code
                );
                shared.connected.store(false, Ordering::SeqCst);
                sleep_while_running(shared, RETRY_DELAY);
                continue;
            }
            Err(err) => {
                log::error!(
                    "NetworkStreamSource: connection to {} failed: {}",
                    config.url,
                    err
                );
                shared.connected.store(false, Ordering::SeqCst);
                sleep_while_running(shared, RETRY_DELAY);
                continue;
            }
        };

        shared.connected.store(true, Ordering::SeqCst);
        log::info!("NetworkStreamSource: connected to {}", config.url);

        if let Err(err) = pump_stream(response.into_reader(), shared) {
            if shared.running.load(Ordering::SeqCst) {
                log::error!(
                    "NetworkStreamSource: stream from {} failed: {:#}",
                    config.url,
                    err
                );
            }
        }

        shared.connected.store(false, Ordering::SeqCst);
        if shared.running.load(Ordering::SeqCst) {
            sleep_while_running(shared, RETRY_DELAY);
        }
    }
}

/// Consume the response body chunk by chunk, extracting and decoding every
/// complete JPEG. Returns when the stream errors, ends, or desyncs past the
/// buffer cap; the caller reconnects.
fn pump_stream(mut body: impl Read, shared: &StreamShared) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut chunk = [0u8; CHUNK_BYTES];

    while shared.running.load(Ordering::SeqCst) {
        let read = body.read(&mut chunk).context("read stream chunk")?;
        if read == 0 {
            return Err(anyhow!("stream ended"));
        }
        buffer.extend_from_slice(&chunk[..read]);

        while let Some((start, end)) = find_frame_bounds(&buffer) {
            match Frame::from_jpeg(&buffer[start..end]) {
                Ok(frame) if frame.is_valid() => shared.queue.push(frame),
                Ok(frame) => {
                    log::warn!(
                        "NetworkStreamSource: dropping degenerate {:?}",
                        frame
                    );
                }
                Err(err) => {
                    log::warn!(
                        "NetworkStreamSource: dropping undecodable span: {:#}",
                        err
                    );
                }
            }
            buffer.drain(..end);
        }

        if buffer.len() > MAX_BUFFER_BYTES {
            return Err(anyhow!(
                "no frame boundary in {} buffered bytes, stream desynced",
                buffer.len()
            ));
        }
    }
    Ok(())
}

/// Locate one complete JPEG: the span from the first SOI marker to the first
/// EOI marker after it, end-exclusive past the EOI bytes. Bytes before the
/// SOI belong to no frame and are discarded with the extracted span.
fn find_frame_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(buffer, JPEG_SOI)?;
    let end = find_marker(&buffer[start + 2..], JPEG_EOI)?;
    Some((start, start + 2 + end + 2))
}

fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|pair| pair == marker)
}

/// Sleep in slices so `release()` is observed promptly mid-backoff.
fn sleep_while_running(shared: &StreamShared, total: Duration) {
    let deadline = Instant::now() + total;
    while shared.running.load(Ordering::SeqCst) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
    }
}

// ----------------------------------------------------------------------------
// Bounded drop-oldest frame queue
// ----------------------------------------------------------------------------

/// Fixed-capacity FIFO where overflow evicts the oldest undelivered entry,
/// so the consumer always sees the freshest frames.
struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    ready: Condvar,
    capacity: usize,
}

impl FrameQueue {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
        }
    }

    fn push(&self, frame: Frame) {
        let mut frames = self.lock_frames();
        while frames.len() >= self.capacity {
            frames.pop_front();
        }
        frames.push_back(frame);
        drop(frames);
        self.ready.notify_one();
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.lock_frames();
        loop {
            if let Some(frame) = frames.pop_front() {
                return Some(frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            frames = match self.ready.wait_timeout(frames, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn clear(&self) {
        self.lock_frames().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock_frames().len()
    }

    fn lock_frames(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of_width(width: u32) -> Frame {
        Frame::from_rgb8(vec![0u8; width as usize * 3], width, 1).expect("frame")
    }

    #[test]
    fn queue_never_exceeds_capacity_and_evicts_oldest() {
        let queue = FrameQueue::new(2);
        for width in 1..=4 {
            queue.push(frame_of_width(width));
            assert!(queue.len() <= 2);
        }
        // Frames 1 and 2 were evicted; 3 and 4 remain in FIFO order.
        assert_eq!(queue.pop_timeout(Duration::ZERO).map(|f| f.width()), Some(3));
        assert_eq!(queue.pop_timeout(Duration::ZERO).map(|f| f.width()), Some(4));
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn queue_pop_waits_for_push_from_another_thread() {
        let queue = Arc::new(FrameQueue::new(2));
        let pusher = queue.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            pusher.push(frame_of_width(7));
        });
        let frame = queue.pop_timeout(Duration::from_secs(1));
        assert_eq!(frame.map(|f| f.width()), Some(7));
        handle.join().expect("pusher");
    }

    #[test]
    fn queue_clear_empties_it() {
        let queue = FrameQueue::new(2);
        queue.push(frame_of_width(1));
        queue.clear();
        assert_eq!(queue.len(), 0);
    }

    fn fake_jpeg(payload: &[u8]) -> Vec<u8> {
        let mut bytes = JPEG_SOI.to_vec();
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&JPEG_EOI);
        bytes
    }

    #[test]
    fn bounds_span_one_complete_image() {
        let image = fake_jpeg(&[1, 2, 3]);
        assert_eq!(find_frame_bounds(&image), Some((0, image.len())));
    }

    #[test]
    fn bounds_skip_leading_garbage() {
        let mut stream = vec![0xAB, 0xCD, 0xEF];
        let image = fake_jpeg(&[9]);
        stream.extend_from_slice(&image);
        assert_eq!(find_frame_bounds(&stream), Some((3, 3 + image.len())));
    }

    #[test]
    fn two_concatenated_images_extract_in_order_without_residue() {
        let first = fake_jpeg(&[1, 1]);
        let second = fake_jpeg(&[2, 2, 2]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let (start, end) = find_frame_bounds(&stream).expect("first image");
        assert_eq!(&stream[start..end], first.as_slice());
        stream.drain(..end);

        let (start, end) = find_frame_bounds(&stream).expect("second image");
        assert_eq!(&stream[start..end], second.as_slice());
        stream.drain(..end);

        assert!(stream.is_empty());
    }

    #[test]
    fn eoi_before_any_soi_yields_nothing() {
        let mut stream = vec![0xFF, 0xD9, 0x00, 0x11];
        assert_eq!(find_frame_bounds(&stream), None);

        // A start arrives, but its end has not: still nothing.
        stream.extend_from_slice(&JPEG_SOI);
        stream.push(0x42);
        assert_eq!(find_frame_bounds(&stream), None);

        // Only once a start precedes an end does extraction happen.
        stream.extend_from_slice(&JPEG_EOI);
        let (start, end) = find_frame_bounds(&stream).expect("valid pair");
        assert_eq!(start, 4);
        assert_eq!(end, stream.len());
    }

    #[test]
    fn incomplete_image_yields_nothing() {
        let mut partial = JPEG_SOI.to_vec();
        partial.extend_from_slice(&[5, 6, 7]);
        assert_eq!(find_frame_bounds(&partial), None);
    }

    #[test]
    fn default_name_uses_url_host() {
        assert_eq!(
            default_name("http://192.168.1.123:81/stream"),
            "netcam_192.168.1.123"
        );
        assert_eq!(default_name("not a url"), "netcam");
    }
}
