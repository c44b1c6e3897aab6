//! Camera sources.
//!
//! This module provides the `CameraSource` capability and its two
//! implementations:
//! - `LocalDeviceSource`: synchronous wrapper over a locally attached
//!   capture device (V4L2 behind the `local-v4l2` feature, `stub://`
//!   synthetic otherwise)
//! - `NetworkStreamSource`: background-threaded MJPEG-over-HTTP reader with
//!   a bounded drop-oldest frame queue
//!
//! Every source degrades to `read()` returning `None` on failure and retries
//! internally; nothing propagates an error to the consumer.

mod local;
mod mjpeg;

pub use local::{LocalDeviceConfig, LocalDeviceSource};
pub use mjpeg::{NetworkStreamConfig, NetworkStreamSource};

use crate::frame::Frame;

/// Capability contract shared by every camera variant.
///
/// Mutating methods take `&mut self`: a source is driven from one control
/// path at a time, and the borrow checker enforces that serialization. The
/// network variant coordinates with its background reader through internal
/// shared state; that never leaks into this surface.
pub trait CameraSource: Send {
    /// Unique key within a `CameraManager`.
    fn name(&self) -> &str;

    /// Establish connectivity and report the state afterwards.
    ///
    /// Idempotent: calling on an already-connected source is a no-op that
    /// returns `true`, and repeated calls leak no resources.
    fn connect(&mut self) -> bool;

    /// Pull one frame, or `None` when nothing is available (not connected,
    /// device error, or no frame within the source's bounded wait). Never
    /// blocks indefinitely.
    fn read(&mut self) -> Option<Frame>;

    /// Free underlying resources, clear connectivity, and stop any
    /// background task with a bounded join. Idempotent.
    fn release(&mut self);

    fn is_connected(&self) -> bool;

    fn is_valid_frame(&self, frame: &Frame) -> bool {
        frame.is_valid()
    }
}
