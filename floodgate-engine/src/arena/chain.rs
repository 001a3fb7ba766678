//! Buffer Chains
//!
//! A chain is a singly-owned, doubly-linked sequence of buffer descriptors.
//! Appending and prepending at either end — including splicing a whole chain —
//! are O(1). Splitting a chain or removing an interior descriptor is
//! deliberately NOT provided: interior link mutation while any other holder
//! may be traversing is a forbidden operation, and a caller needing
//! partial-buffer semantics must allocate a fresh descriptor and copy the
//! fragment, making the cost explicit.
//!
//! # Ownership
//!
//! The chain holds one reference per linked descriptor, and a descriptor can
//! be linked into at most one chain at a time (tracked by its `linked` flag —
//! the run-time half of the exclusivity check; the compile-time half is that
//! link mutation requires `&mut Chain`). Popping a descriptor transfers the
//! chain's reference back into the returned handle.

use super::descriptor::{BufRef, Descriptor};
use crate::sync::atomic::Ordering;
use crate::{invariant, Arena};
use core::ptr::NonNull;

/// An owned chain of buffer descriptors.
///
/// Created by [`Arena::new_chain`]. Dropping the chain releases every linked
/// descriptor.
///
/// # Example
///
/// ```rust
/// use floodgate_engine::Arena;
///
/// let arena = Arena::new();
/// let mut chain = arena.new_chain();
///
/// let mut head = arena.acquire(64).unwrap();
/// head.fill(b"HDR").unwrap();
/// let mut body = arena.acquire(64).unwrap();
/// body.fill(b"BODY").unwrap();
///
/// chain.push_back(head).unwrap();
/// chain.push_back(body).unwrap();
///
/// let bytes: Vec<u8> = chain.iter().flatten().copied().collect();
/// assert_eq!(bytes, b"HDRBODY");
/// ```
pub struct Chain {
    head: *mut Descriptor,
    tail: *mut Descriptor,
    len: usize,
    /// Sum of filled lengths. Lengths cannot change while linked (the chain's
    /// reference keeps `refs > 1` for any would-be writer), so this stays
    /// exact without walking.
    bytes: usize,
    arena: Arena,
}

impl Chain {
    pub(crate) fn new(arena: Arena) -> Self {
        Self {
            head: core::ptr::null_mut(),
            tail: core::ptr::null_mut(),
            len: 0,
            bytes: 0,
            arena,
        }
    }

    /// Number of descriptors in the chain.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the chain holds no descriptors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total filled bytes across all descriptors.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.bytes
    }

    /// Claims a descriptor for linking, consuming the handle's reference.
    ///
    /// Fails when the descriptor is already linked into some chain: linking
    /// it twice would hand two owners the same interior links.
    fn claim(&self, buf: BufRef) -> crate::Result<NonNull<Descriptor>> {
        // SAFETY: the handle owns a reference, so the descriptor is live.
        let already_linked = unsafe {
            buf.desc
                .as_ref()
                .linked
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        };
        invariant!(!already_linked, "descriptor linked into a second chain");
        let (desc, _arena) = buf.into_parts();
        Ok(desc)
    }

    /// Appends a descriptor at the tail. O(1).
    pub fn push_back(&mut self, buf: BufRef) -> crate::Result<()> {
        let bytes = buf.len();
        let desc = self.claim(buf)?;
        let ptr = desc.as_ptr();

        // SAFETY: this chain exclusively owns the links of its descriptors
        // (claim() above) and `&mut self` excludes concurrent traversal.
        unsafe {
            *(*ptr).prev.get() = self.tail;
            *(*ptr).next.get() = core::ptr::null_mut();
            if self.tail.is_null() {
                self.head = ptr;
            } else {
                *(*self.tail).next.get() = ptr;
            }
        }
        self.tail = ptr;
        self.len += 1;
        self.bytes += bytes;
        Ok(())
    }

    /// Prepends a descriptor at the head. O(1).
    pub fn push_front(&mut self, buf: BufRef) -> crate::Result<()> {
        let bytes = buf.len();
        let desc = self.claim(buf)?;
        let ptr = desc.as_ptr();

        // SAFETY: as in push_back.
        unsafe {
            *(*ptr).next.get() = self.head;
            *(*ptr).prev.get() = core::ptr::null_mut();
            if self.head.is_null() {
                self.tail = ptr;
            } else {
                *(*self.head).prev.get() = ptr;
            }
        }
        self.head = ptr;
        self.len += 1;
        self.bytes += bytes;
        Ok(())
    }

    /// Splices `other` onto the tail. O(1); `other` is left empty.
    pub fn append(&mut self, other: Chain) -> crate::Result<()> {
        invariant!(
            Arena::same_pool(&self.arena, &other.arena),
            "chain splice across arenas"
        );
        let mut other = other;
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            core::mem::swap(self, &mut other);
            return Ok(());
        }

        // SAFETY: both chains are exclusively owned here; only boundary links
        // are rewritten.
        unsafe {
            *(*self.tail).next.get() = other.head;
            *(*other.head).prev.get() = self.tail;
        }
        self.tail = other.tail;
        self.len += other.len;
        self.bytes += other.bytes;
        other.detach_all();
        Ok(())
    }

    /// Splices `other` in front of the head. O(1); `other` is left empty.
    pub fn prepend(&mut self, other: Chain) -> crate::Result<()> {
        invariant!(
            Arena::same_pool(&self.arena, &other.arena),
            "chain splice across arenas"
        );
        let mut other = other;
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            core::mem::swap(self, &mut other);
            return Ok(());
        }

        // SAFETY: as in append.
        unsafe {
            *(*other.tail).next.get() = self.head;
            *(*self.head).prev.get() = other.tail;
        }
        self.head = other.head;
        self.len += other.len;
        self.bytes += other.bytes;
        other.detach_all();
        Ok(())
    }

    /// Removes and returns the head descriptor. O(1).
    pub fn pop_front(&mut self) -> Option<BufRef> {
        if self.head.is_null() {
            return None;
        }
        let ptr = self.head;

        // SAFETY: head is a live descriptor owned by this chain.
        unsafe {
            self.head = *(*ptr).next.get();
            if self.head.is_null() {
                self.tail = core::ptr::null_mut();
            } else {
                *(*self.head).prev.get() = core::ptr::null_mut();
            }
            *(*ptr).next.get() = core::ptr::null_mut();
            *(*ptr).prev.get() = core::ptr::null_mut();
            (*ptr).linked.store(false, Ordering::Release);

            self.len -= 1;
            self.bytes -= (*ptr).length;

            // The chain's reference transfers into the returned handle.
            Some(BufRef::from_parts(
                NonNull::new_unchecked(ptr),
                self.arena.clone(),
            ))
        }
    }

    /// Removes and returns the tail descriptor. O(1).
    pub fn pop_back(&mut self) -> Option<BufRef> {
        if self.tail.is_null() {
            return None;
        }
        let ptr = self.tail;

        // SAFETY: tail is a live descriptor owned by this chain.
        unsafe {
            self.tail = *(*ptr).prev.get();
            if self.tail.is_null() {
                self.head = core::ptr::null_mut();
            } else {
                *(*self.tail).next.get() = core::ptr::null_mut();
            }
            *(*ptr).next.get() = core::ptr::null_mut();
            *(*ptr).prev.get() = core::ptr::null_mut();
            (*ptr).linked.store(false, Ordering::Release);

            self.len -= 1;
            self.bytes -= (*ptr).length;

            Some(BufRef::from_parts(
                NonNull::new_unchecked(ptr),
                self.arena.clone(),
            ))
        }
    }

    /// Releases every descriptor in the chain.
    pub fn clear(&mut self) {
        while let Some(buf) = self.pop_front() {
            drop(buf);
        }
    }

    /// Iterates over the filled byte ranges, head to tail.
    pub fn iter(&self) -> ChainIter<'_> {
        ChainIter {
            cursor: self.head,
            _chain: self,
        }
    }

    /// Forgets all descriptors without releasing them (used after splicing
    /// transferred ownership to another chain).
    fn detach_all(&mut self) {
        self.head = core::ptr::null_mut();
        self.tail = core::ptr::null_mut();
        self.len = 0;
        self.bytes = 0;
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.clear();
    }
}

impl core::fmt::Debug for Chain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Chain")
            .field("descriptors", &self.len)
            .field("bytes", &self.bytes)
            .finish()
    }
}

// SAFETY: the chain exclusively owns its descriptors' links; traversal takes
// `&self` and mutation `&mut self`, so Rust's borrow rules serialize access
// once the chain itself is transferred between threads.
unsafe impl Send for Chain {}
unsafe impl Sync for Chain {}

/// Iterator over a chain's filled byte ranges.
pub struct ChainIter<'a> {
    cursor: *mut Descriptor,
    _chain: &'a Chain,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.cursor.is_null() {
            return None;
        }
        // SAFETY: cursor points to a descriptor owned by the chain borrowed
        // for 'a; links are stable under `&Chain`.
        unsafe {
            let desc = &*self.cursor;
            self.cursor = *desc.next.get();
            if desc.length == 0 {
                Some(&[])
            } else {
                Some(core::slice::from_raw_parts(
                    desc.region.base().add(desc.offset),
                    desc.length,
                ))
            }
        }
    }
}
