//! Registry of named camera sources with one active source.
//!
//! The manager owns every registered source and is the single shutdown
//! point: `release_all()` frees each of them. Exactly one source is active
//! at a time; switching releases the old source's resources before the new
//! one connects, so a device or stream is never held by two selections.

use std::collections::HashMap;

use crate::frame::Frame;
use crate::source::CameraSource;

/// Routes `read()` to the single active source and owns source lifecycle.
///
/// All mutation goes through `&mut self`, so switches and reads are
/// serialized on one control path by construction; there is no internal
/// locking to reason about.
#[derive(Default)]
pub struct CameraManager {
    sources: HashMap<String, Box<dyn CameraSource>>,
    active: Option<String>,
}

impl CameraManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name, replacing any prior entry.
    pub fn add_source(&mut self, source: Box<dyn CameraSource>) {
        let name = source.name().to_string();
        if self.sources.insert(name.clone(), source).is_some() {
            log::warn!("CameraManager: replaced source '{}'", name);
        } else {
            log::info!("CameraManager: added source '{}'", name);
        }
    }

    /// Make `name` the active source.
    ///
    /// Releases a differing previously active source first, then connects
    /// the target. The active pointer moves to the target even when its
    /// connect fails, so subsequent reads keep retrying it; the return value
    /// reports current connectivity, not selection.
    pub fn set_active_source(&mut self, name: &str) -> bool {
        if !self.sources.contains_key(name) {
            log::error!("CameraManager: unknown source '{}'", name);
            return false;
        }

        let previous = self
            .active
            .as_ref()
            .filter(|previous| previous.as_str() != name)
            .cloned();
        if let Some(previous) = previous {
            if let Some(source) = self.sources.get_mut(&previous) {
                source.release();
            }
        }

        self.active = Some(name.to_string());
        let connected = match self.sources.get_mut(name) {
            Some(source) => source.connect(),
            None => false,
        };
        if connected {
            log::info!("CameraManager: switched to source '{}'", name);
        } else {
            log::warn!(
                "CameraManager: source '{}' selected but not connected",
                name
            );
        }
        connected
    }

    /// Read one frame from the active source. `None` when no source is
    /// active or no frame is available.
    pub fn read(&mut self) -> Option<Frame> {
        let active = self.active.clone()?;
        self.sources.get_mut(&active)?.read()
    }

    /// Registered source names, sorted for stable output.
    pub fn list_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn active_source_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Release every registered source and clear the active pointer.
    pub fn release_all(&mut self) {
        for source in self.sources.values_mut() {
            source.release();
        }
        self.active = None;
        log::info!("CameraManager: released all sources");
    }
}
