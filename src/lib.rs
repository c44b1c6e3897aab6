//! camhub
//!
//! Unified camera source layer: a locally attached capture device and an
//! MJPEG-over-HTTP network camera behind one polling interface, with
//! automatic reconnection, bounded buffering, and safe hot-swapping between
//! sources.
//!
//! # Architecture
//!
//! A foreground consumer polls `CameraManager::read()` each cycle; the
//! manager delegates to the active `CameraSource`. The local variant pulls a
//! frame from the device synchronously; the network variant pops the newest
//! frame already decoded by its background reader. Every failure mode -
//! refused connections, dropped sockets, device errors, undecodable spans -
//! is absorbed inside the source and retried; the consumer only ever sees
//! "frame or no frame".
//!
//! # Module Structure
//!
//! - `frame`: decoded frame container and JPEG decode
//! - `source`: the `CameraSource` capability and its two implementations
//! - `manager`: named-source registry with one active source
//! - `emotion`: classifier boundary and session tracking
//! - `config`: daemon configuration

pub mod config;
pub mod emotion;
pub mod frame;
pub mod manager;
pub mod source;

pub use config::{CamhubConfig, LocalSettings, StreamSettings};
pub use emotion::{
    EmotionAnalyzer, EmotionReading, EmotionSession, FaceRegion, SessionSummary, StubAnalyzer,
};
pub use frame::{Frame, FRAME_CHANNELS};
pub use manager::CameraManager;
pub use source::{
    CameraSource, LocalDeviceConfig, LocalDeviceSource, NetworkStreamConfig, NetworkStreamSource,
};
