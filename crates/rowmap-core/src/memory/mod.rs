//! The `memory` module provides the buffer abstraction, physical address resolution and the DRAM
//! address codec.
//!
//! The `memory` module provides the following abstractions:
//! - `MemoryBuffer`: A mapped buffer produced by a `BufferAllocator`, owning its translation table.
//! - `BytePointer`: A trait for accessing memory as a byte pointer.
//! - `VirtToPhysResolver`: A trait for resolving the physical address of a provided virtual address.
//! - `LinuxPageMap`: A pagemap handle implementing `VirtToPhysResolver`.
//! - `PfnResolver`: A trait for resolving the physical address of a raw pointer with a one-shot pagemap handle.
//! - `TranslationTable`: Page translations of a buffer sorted by physical address, for physical to virtual lookups.
//! - `DramLayout`: The bank, row and column bit masks of a memory controller.
//! - `DRAMAddr`: A bank/row/column coordinate, convertible from and to physical addresses.
mod buffer;
mod dram_addr;
mod dram_layout;
pub(crate) mod translation;
mod virt_to_phys;

pub use self::buffer::MemoryBuffer;
pub use self::dram_addr::{DRAMAddr, DramField, RangeError};
pub use self::dram_layout::{DramLayout, LayoutError};
pub use self::translation::{PageTranslationEntry, TranslationError, TranslationTable};
pub use self::virt_to_phys::{
    LinuxPageMap, LinuxPageMapError, PfnResolver, PhysAddr, VirtToPhysResolver, entry_to_phys,
};
pub use pagemap2::PageMapEntry;

use crate::primitives;

/// Trait for accessing memory as a byte pointer.
///
/// Provides low-level access to memory regions with byte-level addressing.
#[allow(clippy::len_without_is_empty)]
pub trait BytePointer {
    /// Returns a mutable pointer to the byte at the given offset.
    ///
    /// # Safety
    ///
    /// The returned pointer is valid only while the memory region exists.
    /// Dereferencing requires unsafe code and proper synchronization.
    fn addr(&self, offset: usize) -> *mut u8;

    /// Returns a mutable pointer to the start of the memory region.
    fn ptr(&self) -> *mut u8;

    /// Returns the total length of the memory region in bytes.
    fn len(&self) -> usize;

    /// Whether `addr` lies inside the region.
    fn contains(&self, addr: *const u8) -> bool {
        let start = self.ptr() as usize;
        (start..start + self.len()).contains(&(addr as usize))
    }

    /// Flushes the cache line holding the byte at `offset`.
    fn flush(&self, offset: usize) {
        // addr() bounds-checks the offset against the live region
        unsafe { primitives::flush(self.addr(offset)) }
    }
}
