//! `LockBackend` over a live Wayland connection.

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, FromRawFd};

use wayland_client::protocol::{
    wl_buffer, wl_compositor, wl_keyboard, wl_output, wl_seat, wl_shm, wl_surface,
};
use wayland_client::{Connection, Proxy, QueueHandle};
use wayland_protocols::ext::session_lock::v1::client::{
    ext_session_lock_manager_v1, ext_session_lock_surface_v1, ext_session_lock_v1,
};

use crate::config::types::{LockError, Result};
use crate::session::protocol::{Frame, LockBackend, OutputId};
use crate::wayland::keyboard::Keyboard;
use crate::wayland::{flush_outcome, WaylandCore};

/// A lock surface, the plain surface it wraps and its attached buffer
pub struct LockSurface {
    surface: wl_surface::WlSurface,
    lock_surface: ext_session_lock_surface_v1::ExtSessionLockSurfaceV1,
    buffer: Option<wl_buffer::WlBuffer>,
}

/// Globals bound from the registry plus the live lock object
pub struct WaylandBackend {
    conn: Connection,
    qh: QueueHandle<WaylandCore>,
    pub(crate) compositor: Option<wl_compositor::WlCompositor>,
    pub(crate) shm: Option<wl_shm::WlShm>,
    pub(crate) lock_manager: Option<ext_session_lock_manager_v1::ExtSessionLockManagerV1>,
    pub(crate) seat: Option<wl_seat::WlSeat>,
    pub(crate) keyboard: Option<wl_keyboard::WlKeyboard>,
    pub(crate) xkb: Keyboard,
    lock: Option<ext_session_lock_v1::ExtSessionLockV1>,
}

impl WaylandBackend {
    pub fn new(conn: Connection, qh: QueueHandle<WaylandCore>) -> Self {
        Self {
            conn,
            qh,
            compositor: None,
            shm: None,
            lock_manager: None,
            seat: None,
            keyboard: None,
            xkb: Keyboard::new(),
            lock: None,
        }
    }

    pub(crate) fn queue_handle(&self) -> &QueueHandle<WaylandCore> {
        &self.qh
    }

    /// Fail with the name of the first required global the compositor lacks.
    pub fn check_capabilities(&self) -> Result<()> {
        if self.compositor.is_none() {
            return Err(LockError::MissingCapability("wl_compositor".into()));
        }
        if self.shm.is_none() {
            return Err(LockError::MissingCapability("wl_shm".into()));
        }
        if self.lock_manager.is_none() {
            return Err(LockError::MissingCapability("ext_session_lock_manager_v1".into()));
        }
        if self.seat.is_none() {
            log::warn!("No wl_seat advertised; keyboard input is unavailable");
        }
        Ok(())
    }

    /// Solid XRGB8888 buffer in a fresh memfd.
    fn fill_buffer(&self, frame: &Frame) -> Result<File> {
        let stride = frame.width as usize * 4;
        let size = stride * frame.height as usize;

        // SAFETY: the name is a valid NUL-terminated string; the returned
        // descriptor is owned by the File below.
        let fd = unsafe {
            libc::memfd_create(
                b"rustlock-shm\0".as_ptr() as *const libc::c_char,
                libc::MFD_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(LockError::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: memfd_create just returned this descriptor.
        let mut file = unsafe { File::from_raw_fd(fd) };

        let row: Vec<u8> = std::iter::repeat(frame.fill.xrgb().to_le_bytes())
            .take(frame.width as usize)
            .flatten()
            .collect();
        file.set_len(size as u64)?;
        for _ in 0..frame.height {
            file.write_all(&row)?;
        }
        Ok(file)
    }
}

impl LockBackend for WaylandBackend {
    type Output = wl_output::WlOutput;
    type Surface = LockSurface;

    fn request_lock(&mut self) -> Result<()> {
        let manager = self
            .lock_manager
            .as_ref()
            .ok_or_else(|| LockError::MissingCapability("ext_session_lock_manager_v1".into()))?;
        self.lock = Some(manager.lock(&self.qh, ()));
        Ok(())
    }

    fn create_lock_surface(
        &mut self,
        id: OutputId,
        output: &wl_output::WlOutput,
    ) -> Result<LockSurface> {
        let compositor = self
            .compositor
            .as_ref()
            .ok_or_else(|| LockError::MissingCapability("wl_compositor".into()))?;
        let lock = self
            .lock
            .as_ref()
            .ok_or_else(|| LockError::Protocol("no lock object for lock surface".into()))?;
        let surface = compositor.create_surface(&self.qh, ());
        let lock_surface = lock.get_lock_surface(&surface, output, &self.qh, id);
        Ok(LockSurface {
            surface,
            lock_surface,
            buffer: None,
        })
    }

    fn ack_configure(&mut self, surface: &LockSurface, serial: u32) {
        surface.lock_surface.ack_configure(serial);
    }

    fn present(&mut self, surface: &mut LockSurface, frame: &Frame) -> Result<()> {
        let shm = self
            .shm
            .as_ref()
            .ok_or_else(|| LockError::MissingCapability("wl_shm".into()))?;
        let to_i32 = |v: u32| {
            i32::try_from(v)
                .map_err(|_| LockError::Protocol(format!("buffer dimension {} too large", v)))
        };
        let width = to_i32(frame.width)?;
        let height = to_i32(frame.height)?;
        let stride = width
            .checked_mul(4)
            .ok_or_else(|| LockError::Protocol("buffer stride overflow".into()))?;
        let size = stride
            .checked_mul(height)
            .ok_or_else(|| LockError::Protocol("buffer size overflow".into()))?;

        let file = self.fill_buffer(frame)?;
        let pool = shm.create_pool(file.as_fd(), size, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            stride,
            wl_shm::Format::Xrgb8888,
            &self.qh,
            (),
        );

        surface.surface.set_buffer_scale(frame.scale);
        surface.surface.attach(Some(&buffer), 0, 0);
        surface.surface.damage_buffer(0, 0, width, height);
        surface.surface.commit();

        // The pool's memory lives on until its last buffer is destroyed.
        pool.destroy();
        if let Some(previous) = surface.buffer.replace(buffer) {
            previous.destroy();
        }
        Ok(())
    }

    fn destroy_surface(&mut self, surface: LockSurface) {
        surface.lock_surface.destroy();
        surface.surface.destroy();
        if let Some(buffer) = surface.buffer {
            buffer.destroy();
        }
    }

    fn release_output(&mut self, output: wl_output::WlOutput) {
        if output.version() >= 3 {
            output.release();
        }
    }

    fn unlock_and_destroy(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock_and_destroy();
        }
    }

    fn abandon_lock(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.destroy();
        }
    }

    fn flush(&mut self) -> Result<()> {
        flush_outcome(self.conn.flush())
    }
}
