//! Huge page buffers for rowmap.
//!
//! This crate opens a backing file on a hugetlbfs mount and allocates
//! [`rowmap_core::memory::MemoryBuffer`]s from it with 2 MB or 1 GB pages. The default huge
//! page size of the system is read from `/proc/meminfo`.
//!
//! Implements the [`rowmap_core::allocator::BufferAllocator`] trait.
//!
//! # Platform Requirements
//!
//! - Linux with huge pages reserved via kernel boot parameters or `/proc/sys/vm/nr_hugepages`
//! - A mounted hugetlbfs, e.g. `mount -t hugetlbfs -o pagesize=1G none /mnt/huge`

#![warn(missing_docs)]

mod hugepage;

pub use hugepage::*;
