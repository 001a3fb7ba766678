//! Buffer Descriptors and Reference-Counted Handles
//!
//! A descriptor owns a contiguous memory region `{base, capacity}` and tracks
//! the filled sub-range `{offset, length}`. Holders share descriptors through
//! [`BufRef`] handles: cloning a handle retains the descriptor, dropping one
//! releases it, and the count reaching zero recycles the descriptor through
//! the arena's lookaside cache rather than freeing it.
//!
//! # Mutation Protocol
//!
//! A descriptor with reference count > 1 is logically immutable. Every
//! mutating operation checks `refs == 1` and rejects the call as an invariant
//! violation otherwise; a caller needing partial-buffer semantics on a shared
//! descriptor must allocate a new descriptor and copy the fragment, making
//! the cost explicit rather than hidden.

use crate::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use crate::{invariant, Arena, EngineError};
use core::cell::UnsafeCell;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;
use core::slice;
use std::alloc::{alloc, dealloc, Layout};

/// Cache line size used for region alignment.
const CACHE_LINE: usize = 64;

/// A raw, cache-line aligned memory region.
///
/// Allocation reports failure instead of aborting: the arena's `OutOfMemory`
/// contract requires surfacing exhaustion to the caller.
pub(crate) struct Region {
    ptr: NonNull<u8>,
    capacity: usize,
}

impl Region {
    /// Allocates a region of `capacity` bytes. A zero capacity allocates
    /// nothing and uses a dangling, never-dereferenced pointer.
    pub(crate) fn alloc(capacity: usize) -> crate::Result<Self> {
        if capacity == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                capacity: 0,
            });
        }

        let layout = Self::layout(capacity)?;
        // SAFETY: layout is valid and non-zero-sized.
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, capacity }),
            None => Err(EngineError::OutOfMemory),
        }
    }

    fn layout(capacity: usize) -> crate::Result<Layout> {
        Layout::from_size_align(capacity, CACHE_LINE)
            .map_err(|_| EngineError::InvariantViolation("buffer capacity overflows layout"))
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn base(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.capacity > 0 {
            // SAFETY: ptr was allocated with exactly this layout; from_size_align
            // succeeded at allocation time.
            unsafe {
                dealloc(
                    self.ptr.as_ptr(),
                    Layout::from_size_align_unchecked(self.capacity, CACHE_LINE),
                );
            }
        }
    }
}

// SAFETY: Region is an exclusively owned allocation; the bytes carry no
// thread affinity.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

/// The pooled descriptor behind [`BufRef`] handles.
pub(crate) struct Descriptor {
    pub(crate) region: Region,
    /// Start of the filled sub-range within the region.
    pub(crate) offset: usize,
    /// Length of the filled sub-range.
    pub(crate) length: usize,
    /// Holder count. Destruction (recycling) happens exactly when this
    /// reaches zero.
    pub(crate) refs: AtomicUsize,
    /// Whether a chain currently owns this descriptor's links.
    pub(crate) linked: AtomicBool,
    /// Forward link, owned exclusively by the linking chain.
    pub(crate) next: UnsafeCell<*mut Descriptor>,
    /// Backward link, owned exclusively by the linking chain.
    pub(crate) prev: UnsafeCell<*mut Descriptor>,
}

impl Descriptor {
    pub(crate) fn with_region(region: Region) -> Self {
        Self {
            region,
            offset: 0,
            length: 0,
            refs: AtomicUsize::new(0),
            linked: AtomicBool::new(false),
            next: UnsafeCell::new(core::ptr::null_mut()),
            prev: UnsafeCell::new(core::ptr::null_mut()),
        }
    }

    /// Resets window and links for reuse. The region is kept: reusing its
    /// allocation is the entire point of the lookaside path.
    pub(crate) fn reset(&mut self) {
        self.offset = 0;
        self.length = 0;
        self.refs = AtomicUsize::new(0);
        self.linked = AtomicBool::new(false);
        *self.next.get_mut() = core::ptr::null_mut();
        *self.prev.get_mut() = core::ptr::null_mut();
    }
}

// SAFETY: the link cells are mutated only by the chain that owns the
// descriptor (enforced by the `linked` flag plus `&mut Chain` receivers), and
// the data region is governed by the refs == 1 write protocol. All remaining
// fields are atomics.
unsafe impl Send for Descriptor {}
unsafe impl Sync for Descriptor {}

/// A reference-counted handle to a buffer descriptor.
///
/// `Clone` retains the descriptor; `Drop` releases it. When the last handle
/// drops, the descriptor returns to the arena's lookaside cache — not to the
/// system allocator.
///
/// # Example
///
/// ```rust
/// use floodgate_engine::Arena;
///
/// let arena = Arena::new();
/// let mut buf = arena.acquire(1024).unwrap();
/// buf.fill(b"payload").unwrap();
///
/// let reader = buf.clone();
/// assert_eq!(reader.as_slice(), b"payload");
///
/// // Appending requires exclusive ownership again.
/// drop(reader);
/// buf.fill(b" trailer").unwrap();
/// assert_eq!(buf.as_slice(), b"payload trailer");
/// ```
pub struct BufRef {
    pub(crate) desc: NonNull<Descriptor>,
    pub(crate) arena: Arena,
}

impl BufRef {
    /// Builds a handle from a raw descriptor pointer, adopting one existing
    /// reference.
    ///
    /// # Safety
    ///
    /// `desc` must point to a live descriptor from `arena` holding at least
    /// one reference that this handle now owns.
    pub(crate) unsafe fn from_parts(desc: NonNull<Descriptor>, arena: Arena) -> Self {
        Self { desc, arena }
    }

    /// Disassembles the handle without releasing its reference.
    pub(crate) fn into_parts(self) -> (NonNull<Descriptor>, Arena) {
        let this = ManuallyDrop::new(self);
        let desc = this.desc;
        // SAFETY: `this` is never dropped, so the arena clone moves out
        // exactly once.
        let arena = unsafe { core::ptr::read(&this.arena) };
        (desc, arena)
    }

    #[inline]
    fn descriptor(&self) -> &Descriptor {
        // SAFETY: the handle owns a reference, so the descriptor outlives it.
        unsafe { self.desc.as_ref() }
    }

    /// Total capacity of the underlying region in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.descriptor().region.capacity()
    }

    /// Offset of the filled sub-range.
    #[inline]
    pub fn offset(&self) -> usize {
        self.descriptor().offset
    }

    /// Length of the filled sub-range.
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptor().length
    }

    /// Whether the filled sub-range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current holder count. Primarily for assertions and tests.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.descriptor().refs.load(Ordering::Acquire)
    }

    /// Whether more than one holder exists right now.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.ref_count() > 1
    }

    /// Returns the filled bytes.
    pub fn as_slice(&self) -> &[u8] {
        let desc = self.descriptor();
        if desc.length == 0 {
            return &[];
        }
        // SAFETY: offset..offset+length stays within the region (enforced by
        // every mutator), and writes require refs == 1, so no handle can be
        // writing while this shared read exists.
        unsafe { slice::from_raw_parts(desc.region.base().add(desc.offset), desc.length) }
    }

    /// Appends `bytes` after the filled sub-range, extending it.
    ///
    /// Rejected as an invariant violation when the descriptor is shared or
    /// when the bytes do not fit in the remaining capacity.
    pub fn fill(&mut self, bytes: &[u8]) -> crate::Result<()> {
        invariant!(
            self.ref_count() == 1,
            "write to a shared buffer descriptor"
        );
        let (base, capacity, end) = {
            let desc = self.descriptor();
            (
                desc.region.base(),
                desc.region.capacity(),
                desc.offset + desc.length,
            )
        };
        invariant!(
            bytes.len() <= capacity - end,
            "fill exceeds descriptor capacity"
        );

        // SAFETY: refs == 1 (checked above) makes this handle the only
        // holder; the destination range is within the region.
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(end), bytes.len());
            (*self.desc.as_ptr()).length += bytes.len();
        }
        Ok(())
    }

    /// Narrows or repositions the filled sub-range without touching bytes
    /// (e.g. after consuming a header).
    pub fn set_window(&mut self, offset: usize, length: usize) -> crate::Result<()> {
        invariant!(
            self.ref_count() == 1,
            "window change on a shared buffer descriptor"
        );
        let capacity = self.capacity();
        invariant!(
            offset.checked_add(length).is_some_and(|end| end <= capacity),
            "window exceeds descriptor capacity"
        );

        // SAFETY: refs == 1, so this handle has exclusive access.
        unsafe {
            (*self.desc.as_ptr()).offset = offset;
            (*self.desc.as_ptr()).length = length;
        }
        Ok(())
    }
}

impl Clone for BufRef {
    fn clone(&self) -> Self {
        // Relaxed suffices: the new holder is derived from an existing one,
        // so the descriptor cannot be recycled concurrently (same protocol
        // as Arc::clone).
        self.descriptor().refs.fetch_add(1, Ordering::Relaxed);
        Self {
            desc: self.desc,
            arena: self.arena.clone(),
        }
    }
}

impl Drop for BufRef {
    fn drop(&mut self) {
        // Release on the decrement orders all prior use of the buffer before
        // the recycle; the Acquire fence on the zero path pairs with it
        // (Arc's release protocol).
        if self.descriptor().refs.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            debug_assert!(
                !self.descriptor().linked.load(Ordering::Relaxed),
                "descriptor reached zero refs while linked into a chain"
            );
            self.arena.recycle(self.desc);
        }
    }
}

impl core::fmt::Debug for BufRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufRef")
            .field("capacity", &self.capacity())
            .field("offset", &self.offset())
            .field("length", &self.len())
            .field("refs", &self.ref_count())
            .finish()
    }
}

// SAFETY: the descriptor's shared state is governed by atomics and the
// refs == 1 write protocol; handles may move between threads and shared
// reads are race-free by that protocol.
unsafe impl Send for BufRef {}
unsafe impl Sync for BufRef {}

#[cfg(test)]
mod tests {
    use crate::Arena;

    #[test]
    fn test_acquire_fill_read() {
        let arena = Arena::new();
        let mut buf = arena.acquire(256).unwrap();
        assert_eq!(buf.capacity(), 256);
        assert!(buf.is_empty());

        buf.fill(b"hello").unwrap();
        buf.fill(b" world").unwrap();
        assert_eq!(buf.as_slice(), b"hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_shared_descriptor_is_immutable() {
        let arena = Arena::new();
        let mut buf = arena.acquire(64).unwrap();
        buf.fill(b"frozen").unwrap();

        let other = buf.clone();
        assert_eq!(buf.ref_count(), 2);
        assert!(buf.fill(b"!").is_err());
        assert!(buf.set_window(0, 3).is_err());

        drop(other);
        assert_eq!(buf.ref_count(), 1);
        buf.set_window(0, 3).unwrap();
        assert_eq!(buf.as_slice(), b"fro");
    }

    #[test]
    fn test_fill_respects_capacity() {
        let arena = Arena::new();
        let mut buf = arena.acquire(4).unwrap();
        assert!(buf.fill(b"12345").is_err());
        buf.fill(b"1234").unwrap();
        assert!(buf.fill(b"5").is_err());
    }

    #[test]
    fn test_window_bounds() {
        let arena = Arena::new();
        let mut buf = arena.acquire(16).unwrap();
        assert!(buf.set_window(8, 8).is_ok());
        assert!(buf.set_window(9, 8).is_err());
        assert!(buf.set_window(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_zero_capacity_descriptor() {
        let arena = Arena::new();
        let buf = arena.acquire(0).unwrap();
        assert_eq!(buf.capacity(), 0);
        assert_eq!(buf.as_slice(), b"");
    }
}
