//! Host-visible scratch allocations.
//!
//! The host asks for `size` bytes, writes into them through its view of guest
//! memory, hands the pointer to the encoder or decoder and finally returns it
//! with [`free`]. A small header in front of every block records its size so
//! that `free` only needs the pointer.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

const HEADER: usize = 16;
const ALIGN: usize = 16;

fn layout_for(size: usize) -> Option<Layout> {
    let total = size.checked_add(HEADER)?;
    Layout::from_size_align(total, ALIGN).ok()
}

/// Allocate `size` uninitialized bytes; null on failure or when `size == 0`.
pub fn allocate(size: usize) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }
    let Some(layout) = layout_for(size) else {
        return ptr::null_mut();
    };
    // SAFETY: layout has non-zero size.
    let base = unsafe { alloc::alloc(layout) };
    if base.is_null() {
        return ptr::null_mut();
    }
    // SAFETY: the block is at least HEADER bytes and 16-aligned, so a usize fits at its start.
    unsafe {
        (base as *mut usize).write(size);
        base.add(HEADER)
    }
}

/// Release a block from [`allocate`]. Null is ignored.
///
/// # Safety
/// `ptr` must have been returned by [`allocate`] and not freed since.
pub unsafe fn free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: `allocate` placed the size HEADER bytes before the returned pointer.
    unsafe {
        let base = ptr.sub(HEADER);
        let size = (base as *const usize).read();
        let layout = Layout::from_size_align_unchecked(size + HEADER, ALIGN);
        alloc::dealloc(base, layout);
    }
}

/// Owning handle over an [`allocate`]d block, zero-filled on creation.
pub struct RawBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl RawBuffer {
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::invalid_param("zero-length buffer"));
        }
        let ptr = NonNull::new(allocate(len)).ok_or_else(Error::alloc)?;
        // SAFETY: freshly allocated with room for `len` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, len) };
        Ok(Self { ptr, len })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut buf = Self::new(data.len())?;
        buf.copy_from_slice(data);
        Ok(buf)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Hand the block to the caller; release it later with [`free`].
    pub fn into_raw(self) -> *mut u8 {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }
}

impl Deref for RawBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `len` initialized bytes live at `ptr` for the buffer's lifetime.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for RawBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees uniqueness.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for RawBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated by `allocate`, freed once.
        unsafe { free(self.ptr.as_ptr()) }
    }
}
