use std::os::fd::RawFd;

use indicatif::MultiProgress;
use log::{debug, warn};
use rand::Rng;

use super::{BytePointer, PhysAddr, TranslationError, TranslationTable, VirtToPhysResolver};
use crate::allocator::{AllocFlags, HugePageClass};

/// A mapped, physically populated buffer produced by a
/// [`BufferAllocator`](crate::allocator::BufferAllocator).
///
/// The buffer owns its mapping. Handing it to
/// [`BufferAllocator::release`](crate::allocator::BufferAllocator::release) consumes it, so it
/// is released exactly once; a buffer that is dropped without being released is unmapped by
/// its `Drop` implementation.
///
/// Once built, the [`TranslationTable`] covers exactly the pages of `[ptr, ptr + len)`.
#[derive(Debug)]
pub struct MemoryBuffer {
    ptr: *mut u8,
    len: usize,
    align: usize,
    huge_pages: HugePageClass,
    flags: AllocFlags,
    backing_fd: Option<RawFd>,
    mapped_len: usize,
    mapped: bool,
    table: Option<TranslationTable>,
}

// The buffer is the sole owner of its mapping. Mutation of the table requires `&mut self`.
unsafe impl Send for MemoryBuffer {}
unsafe impl Sync for MemoryBuffer {}

impl MemoryBuffer {
    /// Wraps a mapping of `mapped_len` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + mapped_len` must be a live mapping owned by nobody else, with
    /// `mapped_len >= len`.
    pub(crate) unsafe fn from_mapping(
        ptr: *mut u8,
        len: usize,
        align: usize,
        huge_pages: HugePageClass,
        flags: AllocFlags,
        backing_fd: Option<RawFd>,
        mapped_len: usize,
    ) -> Self {
        debug_assert!(mapped_len >= len);
        MemoryBuffer {
            ptr,
            len,
            align,
            huge_pages,
            flags,
            backing_fd,
            mapped_len,
            mapped: true,
            table: None,
        }
    }

    /// Hands out the mapped range and disarms the unmap on drop.
    pub(crate) fn take_mapping(&mut self) -> (usize, usize) {
        assert!(self.mapped, "buffer at {:p} already released", self.ptr);
        self.mapped = false;
        self.table = None;
        (self.ptr as usize, self.mapped_len)
    }

    /// Requested base alignment, zero if none was applied.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Page class backing the buffer.
    pub fn huge_pages(&self) -> HugePageClass {
        self.huge_pages
    }

    /// Flags the buffer was allocated with.
    pub fn flags(&self) -> AllocFlags {
        self.flags
    }

    /// The hugetlbfs descriptor backing the buffer, if any. Not owned by the buffer.
    pub fn backing_fd(&self) -> Option<RawFd> {
        self.backing_fd
    }

    /// Bytes actually mapped, including the rounding up to whole pages.
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// Builds the translation table, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Fails if any page of the buffer cannot be resolved.
    pub fn build_translation_table<R: VirtToPhysResolver>(
        &mut self,
        resolver: &mut R,
    ) -> Result<&TranslationTable, TranslationError> {
        self.build_table(resolver, None)
    }

    /// Like [`MemoryBuffer::build_translation_table`], reporting progress on `progress`.
    ///
    /// # Errors
    ///
    /// Fails if any page of the buffer cannot be resolved.
    pub fn build_translation_table_with_progress<R: VirtToPhysResolver>(
        &mut self,
        resolver: &mut R,
        progress: &MultiProgress,
    ) -> Result<&TranslationTable, TranslationError> {
        self.build_table(resolver, Some(progress))
    }

    fn build_table<R: VirtToPhysResolver>(
        &mut self,
        resolver: &mut R,
        progress: Option<&MultiProgress>,
    ) -> Result<&TranslationTable, TranslationError> {
        self.table = None;
        let table = TranslationTable::build(resolver, self.ptr as usize, self.len, progress)?;
        debug!(
            "Translation table for {:p}: {} pages in {} physical ranges",
            self.ptr,
            table.len(),
            table.phys_ranges().len()
        );
        Ok(self.table.insert(table))
    }

    /// The translation table, if built.
    pub fn translation_table(&self) -> Option<&TranslationTable> {
        self.table.as_ref()
    }

    /// Resolves `virt` through `resolver`, bypassing the table.
    ///
    /// The result includes the in-page offset of `virt`.
    ///
    /// # Panics
    ///
    /// Panics if `virt` is not inside the buffer.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error, e.g. when the page is not resident.
    pub fn virt_to_phys<R: VirtToPhysResolver>(
        &self,
        resolver: &mut R,
        virt: *const u8,
    ) -> Result<PhysAddr, R::Error> {
        assert!(
            self.contains(virt),
            "{:p} outside of buffer {:p}+0x{:x}",
            virt,
            self.ptr,
            self.len
        );
        resolver.get_phys(virt as u64)
    }

    /// Maps `phys` back to its virtual address inside the buffer.
    ///
    /// Returns `Ok(None)` if `phys` is not backed by this buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError::TableNotBuilt`] before the table has been built.
    pub fn phys_to_virt(&self, phys: PhysAddr) -> Result<Option<*mut u8>, TranslationError> {
        let table = self
            .table
            .as_ref()
            .ok_or(TranslationError::TableNotBuilt)?;
        Ok(table.phys_to_virt(phys))
    }

    /// A random address in the buffer, aligned down to `align`.
    ///
    /// `align` must be a power of two no larger than the buffer.
    pub fn random_addr<R: Rng + ?Sized>(&self, rng: &mut R, align: usize) -> *mut u8 {
        assert!(align.is_power_of_two(), "alignment {} not a power of two", align);
        assert!(align <= self.len, "alignment {} exceeds buffer", align);
        let offset = rng.random_range(0..self.len) & !(align - 1);
        self.addr(offset)
    }
}

impl BytePointer for MemoryBuffer {
    fn addr(&self, offset: usize) -> *mut u8 {
        assert!(
            offset < self.len,
            "MemoryBuffer::addr failed. Offset {} >= {}",
            offset,
            self.len
        );
        unsafe { self.ptr.byte_add(offset) }
    }

    fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MemoryBuffer {
    fn drop(&mut self) {
        if !self.mapped {
            return;
        }
        warn!(
            "Buffer at {:p} dropped without release, unmapping 0x{:x} bytes",
            self.ptr, self.mapped_len
        );
        if unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.mapped_len) } != 0 {
            warn!("munmap failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocRequest, BufferAllocator, MmapAllocator};
    use crate::memory::translation::tests::ShuffledResolver;
    use crate::util::PAGE_SIZE;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn buffer(pages: usize) -> MemoryBuffer {
        MmapAllocator
            .allocate(&AllocRequest::new(pages * PAGE_SIZE))
            .expect("allocate")
    }

    #[test]
    fn test_table_round_trip() -> anyhow::Result<()> {
        let mut buffer = buffer(32);
        let mut resolver = ShuffledResolver::new(buffer.ptr() as usize, 32, 9);
        assert!(matches!(
            buffer.phys_to_virt(PhysAddr::new(0x1000_0000)),
            Err(TranslationError::TableNotBuilt)
        ));
        let len = buffer.build_translation_table(&mut resolver)?.len();
        assert_eq!(len, 32);

        for offset in (0..buffer.len()).step_by(PAGE_SIZE) {
            let virt = buffer.addr(offset);
            let phys = buffer.virt_to_phys(&mut resolver, virt)?;
            assert_eq!(buffer.phys_to_virt(phys)?, Some(virt));
        }
        assert_eq!(buffer.phys_to_virt(PhysAddr::new(0x7fff_ffff_f000))?, None);
        MmapAllocator.release(buffer)?;
        Ok(())
    }

    #[test]
    #[should_panic(expected = "outside of buffer")]
    fn test_virt_to_phys_outside() {
        let buffer = buffer(1);
        let mut resolver = ShuffledResolver::new(buffer.ptr() as usize, 1, 0);
        let outside = unsafe { buffer.ptr().add(2 * PAGE_SIZE) };
        let _ = buffer.virt_to_phys(&mut resolver, outside);
    }

    #[test]
    fn test_random_addr() {
        let buffer = buffer(16);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let addr = buffer.random_addr(&mut rng, 64);
            assert!(buffer.contains(addr));
            assert_eq!(addr as usize % 64, 0);
        }
    }

    #[test]
    fn test_drop_without_release_unmaps() {
        let buffer = buffer(4);
        unsafe { *buffer.addr(0) = 1 };
        drop(buffer);
    }
}
