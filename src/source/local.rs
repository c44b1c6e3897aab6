//! Local capture device source.
//!
//! Synchronous wrapper over a locally attached device: all work happens in
//! the calling thread, no background task. The real backend drives a V4L2
//! device node (feature `local-v4l2`); `stub://` device paths select a
//! synthetic backend for tests and demos.
//!
//! Failure model: an open failure leaves the source disconnected and is
//! retried by the next `read()`; a failed device read tears the handle down
//! and returns nothing, so reconnection lands on the *next* call instead of
//! blocking the current one.

use anyhow::Result;
#[cfg(feature = "local-v4l2")]
use std::time::Duration;

use crate::frame::Frame;
use crate::source::CameraSource;

/// Settle time after opening a device; many devices need initialization
/// time before the first capture succeeds.
#[cfg(feature = "local-v4l2")]
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Configuration for a local capture device.
#[derive(Clone, Debug)]
pub struct LocalDeviceConfig {
    /// Device node path (e.g., "/dev/video0"); `stub://` paths select a
    /// synthetic device.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl LocalDeviceConfig {
    /// Configuration for a device addressed by index, `/dev/video{index}`.
    pub fn from_index(index: u32) -> Self {
        Self {
            device: format!("/dev/video{}", index),
            ..Self::default()
        }
    }
}

impl Default for LocalDeviceConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Locally attached capture device.
pub struct LocalDeviceSource {
    name: String,
    config: LocalDeviceConfig,
    backend: Option<LocalBackend>,
    connected: bool,
}

enum LocalBackend {
    Synthetic(SyntheticDevice),
    #[cfg(feature = "local-v4l2")]
    V4l2(V4l2Device),
}

impl LocalBackend {
    fn open(config: &LocalDeviceConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            return Ok(LocalBackend::Synthetic(SyntheticDevice::new(config.clone())));
        }
        #[cfg(feature = "local-v4l2")]
        {
            Ok(LocalBackend::V4l2(V4l2Device::open(config)?))
        }
        #[cfg(not(feature = "local-v4l2"))]
        {
            anyhow::bail!(
                "device {} requires the local-v4l2 feature",
                config.device
            )
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        match self {
            LocalBackend::Synthetic(device) => device.read_frame(),
            #[cfg(feature = "local-v4l2")]
            LocalBackend::V4l2(device) => device.read_frame(),
        }
    }
}

impl LocalDeviceSource {
    /// Source named after its device path.
    pub fn new(config: LocalDeviceConfig) -> Self {
        let name = config.device.clone();
        Self::with_name(name, config)
    }

    /// Source for `/dev/video{index}`, named `webcam{index}`.
    pub fn from_index(index: u32) -> Self {
        Self::with_name(format!("webcam{}", index), LocalDeviceConfig::from_index(index))
    }

    pub fn with_name(name: impl Into<String>, config: LocalDeviceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            backend: None,
            connected: false,
        }
    }
}

impl CameraSource for LocalDeviceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> bool {
        if self.connected && self.backend.is_some() {
            return true;
        }
        match LocalBackend::open(&self.config) {
            Ok(backend) => {
                self.backend = Some(backend);
                self.connected = true;
                log::info!("LocalDeviceSource: connected to {}", self.config.device);
            }
            Err(err) => {
                self.backend = None;
                self.connected = false;
                log::error!(
                    "LocalDeviceSource: failed to open {}: {:#}",
                    self.config.device,
                    err
                );
            }
        }
        self.connected
    }

    fn read(&mut self) -> Option<Frame> {
        if (!self.connected || self.backend.is_none()) && !self.connect() {
            return None;
        }
        let backend = self.backend.as_mut()?;
        match backend.read_frame() {
            Ok(frame) => Some(frame),
            Err(err) => {
                log::warn!(
                    "LocalDeviceSource: read from {} failed: {:#}",
                    self.config.device,
                    err
                );
                self.release();
                None
            }
        }
    }

    fn release(&mut self) {
        if self.backend.take().is_some() {
            log::info!("LocalDeviceSource: released {}", self.config.device);
        }
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ----------------------------------------------------------------------------
// Synthetic device (stub://) for tests and demos
// ----------------------------------------------------------------------------

struct SyntheticDevice {
    config: LocalDeviceConfig,
    frame_count: u64,
    /// Simulated "scene" state so consecutive frames differ occasionally.
    scene_state: u8,
}

impl SyntheticDevice {
    fn new(config: LocalDeviceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixel_count =
            self.config.width as usize * self.config.height as usize * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }

        Frame::from_rgb8(pixels, self.config.width, self.config.height)
    }
}

// ----------------------------------------------------------------------------
// V4L2 device backend
// ----------------------------------------------------------------------------

#[cfg(feature = "local-v4l2")]
struct V4l2Device {
    state: V4l2State,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "local-v4l2")]
#[ouroboros::self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "local-v4l2")]
impl V4l2Device {
    fn open(config: &LocalDeviceConfig) -> Result<Self> {
        use anyhow::Context;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open capture device {}", config.device))?;
        let mut format = device.format().context("read device format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "LocalDeviceSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read device format after set failure")?
            }
        };

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create capture stream"))
            },
        }
        .try_build()?;

        // Settle before the first capture; many devices deliver garbage or
        // errors right after opening.
        std::thread::sleep(SETTLE_DELAY);

        Ok(Self {
            state,
            active_width: format.width,
            active_height: format.height,
        })
    }

    fn read_frame(&mut self) -> Result<Frame> {
        use anyhow::Context;
        use v4l::io::traits::CaptureStream;

        let (buf, _meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .context("capture device frame")?;

        // Mapped buffers may carry trailing padding past the frame payload.
        let expected = self.active_width as usize * self.active_height as usize * 3;
        let mut data = buf.to_vec();
        if data.len() > expected {
            data.truncate(expected);
        }
        Frame::from_rgb8(data, self.active_width, self.active_height)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
