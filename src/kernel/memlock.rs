//! Swap-pinned, self-wiping credential storage.
//!
//! Every allocation backing a [`SecureBuffer`] is `mlock`ed before any secret
//! byte is written to it, and zeroed before it is unlocked and freed.

use thiserror::Error;
use zeroize::Zeroize;

/// Errors from the secure buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("credential exceeds maximum length of {max} bytes")]
    CapacityExceeded { max: usize },

    #[error("mlock failed: {0}")]
    Pin(String),
}

fn pin(region: &[u8]) -> Result<(), BufferError> {
    // SAFETY: region is a live allocation owned by the caller; mlock only
    // changes residency of the pages covering it.
    let rc = unsafe { libc::mlock(region.as_ptr() as *const libc::c_void, region.len()) };
    if rc != 0 {
        return Err(BufferError::Pin(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

fn wipe_and_unpin(region: &mut [u8]) {
    region.zeroize();
    // SAFETY: same region previously passed to mlock.
    let _ = unsafe { libc::munlock(region.as_ptr() as *const libc::c_void, region.len()) };
}

/// Growable byte buffer whose storage never reaches swap.
///
/// Invariant: `len <= data.len() <= max`.
pub struct SecureBuffer {
    data: Box<[u8]>,
    len: usize,
    max: usize,
}

impl SecureBuffer {
    /// Allocate and pin the initial storage.
    ///
    /// A pin failure here is returned to the caller: the buffer is never
    /// handed out unprotected.
    pub fn with_capacity(initial: usize, max: usize) -> Result<Self, BufferError> {
        let initial = initial.clamp(1, max.max(1));
        let data = vec![0u8; initial].into_boxed_slice();
        pin(&data)?;
        Ok(Self { data, len: 0, max })
    }

    /// Append bytes, growing the pinned storage when needed.
    ///
    /// Fails without touching existing content when the ceiling would be
    /// exceeded or when the grown storage cannot be pinned.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let needed = self
            .len
            .checked_add(bytes.len())
            .filter(|&n| n <= self.max)
            .ok_or(BufferError::CapacityExceeded { max: self.max })?;

        if needed > self.data.len() {
            self.grow(needed)?;
        }

        self.data[self.len..needed].copy_from_slice(bytes);
        self.len = needed;
        Ok(())
    }

    /// Extend by `n` zero bytes and return them for in-place filling, so
    /// incoming secrets never pass through unpinned scratch memory.
    pub fn extend_zeroed(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        let needed = self
            .len
            .checked_add(n)
            .filter(|&total| total <= self.max)
            .ok_or(BufferError::CapacityExceeded { max: self.max })?;

        if needed > self.data.len() {
            self.grow(needed)?;
        }

        let start = self.len;
        self.len = needed;
        Ok(&mut self.data[start..needed])
    }

    fn grow(&mut self, needed: usize) -> Result<(), BufferError> {
        let target = needed.max(self.data.len().saturating_mul(2)).min(self.max);
        let mut grown = vec![0u8; target].into_boxed_slice();
        if let Err(e) = pin(&grown) {
            // The existing allocation is still pinned; refuse the growth
            // instead of copying the secret into swappable memory.
            log::warn!("Refusing credential buffer growth to {} bytes: {}", target, e);
            grown[..].zeroize();
            return Err(e);
        }

        grown[..self.len].copy_from_slice(&self.data[..self.len]);
        let mut old = std::mem::replace(&mut self.data, grown);
        wipe_and_unpin(&mut old);
        log::debug!("Credential buffer grown to {} bytes", target);
        Ok(())
    }

    /// Shrink to `new_len`, wiping the removed tail.
    pub fn truncate(&mut self, new_len: usize) {
        if new_len < self.len {
            self.data[new_len..self.len].zeroize();
            self.len = new_len;
        }
    }

    /// Zero the whole allocation and reset the length; the allocation is kept.
    pub fn clear(&mut self) {
        self.data[..].zeroize();
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn max_len(&self) -> usize {
        self.max
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        wipe_and_unpin(&mut self.data);
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(initial: usize, max: usize) -> SecureBuffer {
        SecureBuffer::with_capacity(initial, max).expect("mlock of a few bytes should succeed")
    }

    #[test]
    fn append_grows_until_ceiling() {
        let mut buf = buffer(4, 16);
        buf.append(b"abcdef").unwrap();
        assert_eq!(buf.as_slice(), b"abcdef");
        assert!(buf.capacity() >= 6);
        assert!(buf.capacity() <= 16);
    }

    #[test]
    fn append_past_ceiling_leaves_content_untouched() {
        let mut buf = buffer(4, 8);
        buf.append(b"abcde").unwrap();
        let err = buf.append(b"fghi").unwrap_err();
        assert_eq!(err, BufferError::CapacityExceeded { max: 8 });
        assert_eq!(buf.as_slice(), b"abcde");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn exact_fill_is_allowed() {
        let mut buf = buffer(2, 8);
        buf.append(b"12345678").unwrap();
        assert_eq!(buf.len(), 8);
        assert!(buf.append(b"9").is_err());
    }

    #[test]
    fn clear_zeroes_and_keeps_allocation() {
        let mut buf = buffer(8, 64);
        buf.append(b"secret").unwrap();
        let capacity = buf.capacity();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);
        assert!(buf.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn truncate_wipes_tail() {
        let mut buf = buffer(8, 8);
        buf.append(b"abcd").unwrap();
        buf.truncate(2);
        assert_eq!(buf.as_slice(), b"ab");
        assert!(buf.data[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn extend_zeroed_hands_out_a_clean_tail() {
        let mut buf = buffer(2, 16);
        buf.append(b"ab").unwrap();
        buf.truncate(1);
        let tail = buf.extend_zeroed(5).unwrap();
        assert!(tail.iter().all(|&b| b == 0));
        tail.copy_from_slice(b"cdefg");
        assert_eq!(buf.as_slice(), b"acdefg");
        assert!(buf.extend_zeroed(11).is_err());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn debug_output_hides_content() {
        let mut buf = buffer(8, 8);
        buf.append(b"hunter2").unwrap();
        let rendered = format!("{:?}", buf);
        assert!(!rendered.contains("hunter2"));
    }
}
