// src/buffer.rs
//! Raw byte storage used for uniform values and command payloads.
//!
//! Typed access goes through `bytemuck` so every read and write is a checked
//! slice copy at a byte offset; nothing here reinterprets pointers.

use bytemuck::Pod;

use crate::error::{Error, Result};

/// Owned, fixed-capacity block of bytes addressed by offset.
///
/// `Clone` is the explicit deep copy. A default buffer is empty and owns no memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// A zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    /// Deep copy of `bytes`.
    pub fn copy(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
        }
    }

    /// Replace the storage with a fresh block of `size` bytes. Previous
    /// contents are released.
    pub fn allocate(&mut self, size: usize) {
        self.data = vec![0u8; size];
    }

    pub fn zero_initialize(&mut self) {
        self.data.fill(0);
    }

    /// Write `bytes` at `offset`. Fails when `offset + bytes.len()` exceeds the capacity.
    pub fn write(&mut self, bytes: &[u8], offset: usize) -> Result<()> {
        let range = self.checked_range(offset, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Write the raw bytes of a `Pod` value at `offset`.
    pub fn write_value<T: Pod>(&mut self, value: &T, offset: usize) -> Result<()> {
        self.write(bytemuck::bytes_of(value), offset)
    }

    /// Borrow `size` bytes starting at `offset`.
    pub fn read(&self, offset: usize, size: usize) -> Result<&[u8]> {
        let range = self.checked_range(offset, size)?;
        Ok(&self.data[range])
    }

    /// Read a `Pod` value at `offset`. Offsets are packed, so no alignment is assumed.
    pub fn read_value<T: Pod>(&self, offset: usize) -> Result<T> {
        let bytes = self.read(offset, std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn checked_range(&self, offset: usize, size: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(size) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(Error::BufferOverflow {
                offset,
                size,
                capacity: self.data.len(),
            }),
        }
    }
}
