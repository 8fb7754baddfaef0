//! One lock surface per live output.
//!
//! The registry is the only owner of output and surface handles. Protocol
//! callbacks refer to entries by [`OutputId`]; an id that is no longer
//! present is simply ignored.

use std::collections::BTreeMap;

use crate::config::types::{Color, Result};
use crate::session::protocol::{Frame, LockBackend, OutputEvent, OutputId, SurfaceEvent};

pub struct OutputSurface<B: LockBackend> {
    pub id: OutputId,
    pub name: Option<String>,
    /// Output mode size in pixels, as advertised by the output
    pub geometry: (u32, u32),
    /// Logical surface size from the last configure
    pub width: u32,
    pub height: u32,
    pub scale: i32,
    /// Set once the output's first property batch is complete
    pub ready: bool,
    /// Set once a configure for this surface has been acknowledged
    pub configured: bool,
    pub dirty: bool,
    output: Option<B::Output>,
    surface: Option<B::Surface>,
}

impl<B: LockBackend> OutputSurface<B> {
    fn new(id: OutputId, output: B::Output) -> Self {
        Self {
            id,
            name: None,
            geometry: (0, 0),
            width: 0,
            height: 0,
            scale: 1,
            ready: false,
            configured: false,
            dirty: false,
            output: Some(output),
            surface: None,
        }
    }

    pub fn has_lock_surface(&self) -> bool {
        self.surface.is_some()
    }

    fn create_lock_surface(&mut self, backend: &mut B) -> Result<()> {
        if self.surface.is_some() {
            return Ok(());
        }
        if let Some(output) = self.output.as_ref() {
            self.surface = Some(backend.create_lock_surface(self.id, output)?);
            log::debug!("Lock surface created for output {}", self.label());
        }
        Ok(())
    }

    fn present(&mut self, backend: &mut B, fill: Color) -> Result<bool> {
        if !(self.configured && self.dirty) {
            return Ok(false);
        }
        let Some(surface) = self.surface.as_mut() else {
            return Ok(false);
        };
        let scale = self.scale.max(1);
        let frame = Frame {
            width: self.width.saturating_mul(scale as u32),
            height: self.height.saturating_mul(scale as u32),
            scale,
            fill,
        };
        if frame.width == 0 || frame.height == 0 {
            log::debug!("Output {} configured with an empty size; not drawing", self.id);
            return Ok(false);
        }
        backend.present(surface, &frame)?;
        self.dirty = false;
        Ok(true)
    }

    fn release(mut self, backend: &mut B) {
        if let Some(surface) = self.surface.take() {
            backend.destroy_surface(surface);
        }
        if let Some(output) = self.output.take() {
            backend.release_output(output);
        }
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.id, name),
            None => self.id.to_string(),
        }
    }
}

pub struct SurfaceRegistry<B: LockBackend> {
    outputs: BTreeMap<OutputId, OutputSurface<B>>,
}

impl<B: LockBackend> Default for SurfaceRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: LockBackend> SurfaceRegistry<B> {
    pub fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn get(&self, id: OutputId) -> Option<&OutputSurface<B>> {
        self.outputs.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        self.outputs.keys().copied()
    }

    /// Track a newly announced output. A duplicate id replaces the old entry.
    pub fn add_output(&mut self, id: OutputId, output: B::Output, backend: &mut B) {
        if let Some(stale) = self.outputs.insert(id, OutputSurface::new(id, output)) {
            log::warn!("Output {} announced twice; dropping the old handle", id);
            stale.release(backend);
        }
    }

    /// Apply an output property event. `lock_active` says whether lock
    /// surfaces may be created right now.
    pub fn handle_output_event(
        &mut self,
        id: OutputId,
        event: OutputEvent,
        lock_active: bool,
        backend: &mut B,
    ) -> Result<()> {
        let Some(entry) = self.outputs.get_mut(&id) else {
            log::debug!("Event for unknown output {} ignored", id);
            return Ok(());
        };
        match event {
            OutputEvent::Geometry { width, height } => {
                if entry.geometry != (width, height) {
                    entry.geometry = (width, height);
                    entry.dirty = true;
                }
            }
            OutputEvent::Scale(scale) => {
                if entry.scale != scale {
                    entry.scale = scale;
                    entry.dirty = true;
                }
            }
            OutputEvent::Name(name) => entry.name = Some(name),
            OutputEvent::Done => {
                entry.ready = true;
                if lock_active {
                    entry.create_lock_surface(backend)?;
                }
            }
        }
        Ok(())
    }

    /// Create lock surfaces for every ready output that lacks one.
    pub fn ensure_lock_surfaces(&mut self, backend: &mut B) -> Result<()> {
        for entry in self.outputs.values_mut().filter(|entry| entry.ready) {
            entry.create_lock_surface(backend)?;
        }
        Ok(())
    }

    /// Record a configure, acknowledge it and paint the surface.
    pub fn handle_surface_event(
        &mut self,
        id: OutputId,
        event: SurfaceEvent,
        fill: Color,
        backend: &mut B,
    ) -> Result<()> {
        let Some(entry) = self.outputs.get_mut(&id) else {
            log::debug!("Configure for removed output {} ignored", id);
            return Ok(());
        };
        let SurfaceEvent::Configure {
            serial,
            width,
            height,
        } = event;
        let Some(surface) = entry.surface.as_ref() else {
            log::debug!("Configure for output {} without a lock surface ignored", id);
            return Ok(());
        };

        entry.width = width;
        entry.height = height;
        entry.configured = true;
        entry.dirty = true;
        backend.ack_configure(surface, serial);
        log::debug!(
            "Output {} configured {}x{} (serial {})",
            entry.label(),
            width,
            height,
            serial
        );
        entry.present(backend, fill)?;
        Ok(())
    }

    /// Forget an output and release its surface. Unknown ids are not an error.
    pub fn remove_output(&mut self, id: OutputId, backend: &mut B) -> bool {
        match self.outputs.remove(&id) {
            Some(entry) => {
                log::debug!("Output {} removed", entry.label());
                entry.release(backend);
                true
            }
            None => false,
        }
    }

    pub fn damage_all(&mut self) {
        for entry in self.outputs.values_mut() {
            entry.dirty = true;
        }
    }

    /// Paint every configured, dirty surface. Returns how many were drawn.
    pub fn render(&mut self, backend: &mut B, fill: Color) -> Result<usize> {
        let mut drawn = 0;
        for entry in self.outputs.values_mut() {
            if entry.present(backend, fill)? {
                drawn += 1;
            }
        }
        Ok(drawn)
    }

    /// Release every surface and output handle.
    pub fn teardown(&mut self, backend: &mut B) {
        for (_, entry) in std::mem::take(&mut self.outputs) {
            entry.release(backend);
        }
    }
}
