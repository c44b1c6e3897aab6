//! Emotion-analysis boundary and session tracking.
//!
//! The face/emotion classifier is an external collaborator; this module
//! defines the boundary it is called through, a deterministic stand-in for
//! tests and demos, and the bookkeeping for one "session" - a continuous
//! period during which a face stays in view.

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::frame::Frame;

/// Pixel rectangle of the detected face within a frame.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One classification result for one frame.
#[derive(Clone, Debug)]
pub struct EmotionReading {
    /// Label as reported by the classifier; this crate does not interpret it.
    pub dominant_emotion: String,
    pub region: Option<FaceRegion>,
}

/// Boundary to the face/emotion classifier.
///
/// `Ok(None)` is the "no face detected" outcome; `Err` is a classifier
/// failure. Neither carries frame data back out.
pub trait EmotionAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Option<EmotionReading>>;
}

/// Deterministic stand-in classifier: derives a label from a pixel digest.
/// Lets the capture pipeline run end to end without a model.
pub struct StubAnalyzer;

const STUB_LABELS: [&str; 5] = ["happy", "sad", "angry", "surprise", "neutral"];

impl StubAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionAnalyzer for StubAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Option<EmotionReading>> {
        let digest: [u8; 32] = Sha256::digest(frame.data()).into();

        // Roughly one frame in eight reports no face.
        if digest[0] % 8 == 0 {
            return Ok(None);
        }

        let label = STUB_LABELS[digest[1] as usize % STUB_LABELS.len()];
        let region = FaceRegion {
            x: frame.width() / 4,
            y: frame.height() / 4,
            w: frame.width() / 2,
            h: frame.height() / 2,
        };
        Ok(Some(EmotionReading {
            dominant_emotion: label.to_string(),
            region: Some(region),
        }))
    }
}

// ----------------------------------------------------------------------------
// Session tracking
// ----------------------------------------------------------------------------

/// Accumulates emotion observations over one continuous face-visible period.
#[derive(Default)]
pub struct EmotionSession {
    observations: Vec<String>,
    started: Option<Instant>,
    ended: Option<Duration>,
}

/// Summary handed to the serving layer when a session closes.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    /// Close time, seconds since the Unix epoch.
    pub ended_epoch_s: u64,
    pub duration_seconds: f64,
    pub dominant_emotion: String,
    /// Share of each observed label, rounded to two decimals.
    pub emotion_percentages: HashMap<String, f64>,
}

impl EmotionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as started. No-op if already running.
    pub fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
            self.ended = None;
            log::debug!("EmotionSession: started");
        }
    }

    /// Record one observation, starting the session if needed.
    pub fn observe(&mut self, emotion: impl Into<String>) {
        self.start();
        self.observations.push(emotion.into());
    }

    /// Close the session. Duration is frozen at this point.
    pub fn end(&mut self) {
        if let Some(started) = self.started {
            if self.ended.is_none() {
                self.ended = Some(started.elapsed());
                log::debug!("EmotionSession: ended");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Summarize the session; `None` when nothing was observed.
    pub fn summary(&self) -> Option<SessionSummary> {
        if self.observations.is_empty() {
            return None;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for emotion in &self.observations {
            *counts.entry(emotion.as_str()).or_insert(0) += 1;
        }

        // Modal emotion; ties break toward the earliest-observed label.
        let mut dominant: Option<&String> = None;
        let mut best = 0;
        for emotion in &self.observations {
            let count = counts.get(emotion.as_str()).copied().unwrap_or(0);
            if count > best {
                best = count;
                dominant = Some(emotion);
            }
        }
        let dominant = dominant.cloned()?;

        let total = self.observations.len() as f64;
        let emotion_percentages = counts
            .into_iter()
            .map(|(emotion, count)| (emotion.to_string(), round2(count as f64 / total * 100.0)))
            .collect();

        let duration = self
            .ended
            .or_else(|| self.started.map(|started| started.elapsed()))
            .unwrap_or_default();

        Some(SessionSummary {
            ended_epoch_s: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|since| since.as_secs())
                .unwrap_or(0),
            duration_seconds: round2(duration.as_secs_f64()),
            dominant_emotion: dominant,
            emotion_percentages,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
