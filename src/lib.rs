//! # rowmap
//!
//! rowmap is the memory substrate of a Rowhammer test tool. It allocates large physically
//! populated buffers, resolves their pages to physical addresses and back, and converts
//! physical addresses to DRAM bank/row/column coordinates.
//!
//! This crate re-exports [`rowmap_core`]. The huge page allocator is available as
//! [`hugepage`] with the `hugepage` feature.
//!
//! ## Example
//!
//! ```no_run
//! use rowmap::allocator::{AllocRequest, BufferAllocator, MmapAllocator};
//! use rowmap::memory::{BytePointer, LinuxPageMap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut allocator = MmapAllocator;
//! let mut buffer = allocator.allocate(&AllocRequest::new(1 << 24).with_align(1 << 21))?;
//! let mut pagemap = LinuxPageMap::new()?;
//! buffer.build_translation_table(&mut pagemap)?;
//!
//! let virt = buffer.addr(0x1234);
//! let phys = buffer.virt_to_phys(&mut pagemap, virt)?;
//! assert_eq!(buffer.phys_to_virt(phys)?, Some(virt));
//! allocator.release(buffer)?;
//! # Ok(())
//! # }
//! ```

pub use rowmap_core::*;

#[cfg(feature = "hugepage")]
pub use rowmap_hugepage as hugepage;
