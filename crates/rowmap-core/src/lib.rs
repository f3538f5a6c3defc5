//! # rowmap core
//!
//! `rowmap-core` is the memory substrate of a Rowhammer test tool. It allocates large,
//! physically populated buffers, maps their virtual addresses to physical addresses and back,
//! and decodes physical addresses into DRAM bank/row/column coordinates.
//!
//! ## Architecture Overview
//!
//! The components build on each other, leaves first:
//!
//! - [`primitives`] - Cache flush, fences, pipeline serialization and cycle counters, with one
//!   implementation per target architecture selected at build time.
//!
//! - [`allocator`] - The [`allocator::BufferAllocator`] trait and [`allocator::MmapAllocator`],
//!   producing aligned, optionally huge-page backed [`memory::MemoryBuffer`]s.
//!
//! - [`memory`] - The buffer itself, the pagemap handle [`memory::LinuxPageMap`], the
//!   [`memory::TranslationTable`] answering physical to virtual queries, and the DRAM address
//!   codec ([`memory::DramLayout`], [`memory::DRAMAddr`]).
//!
//! - [`config`] - [`config::SubstrateConfig`], loadable from JSON.
//!
//! - [`util`] module - Contains utility types and functions including [`util::Size`]
//!   and the bit gather/scatter helpers.
//!
//! ## Platform Support
//!
//! Linux only. Reading physical frame numbers through `/proc/self/pagemap` requires
//! `CAP_SYS_ADMIN`; huge page buffers require a hugetlbfs mount with reserved pages.
//! Primitives are implemented for x86_64 and aarch64; other targets get documented no-op or
//! fallback versions, see [`primitives::capabilities`].

#![warn(missing_docs)]

pub mod allocator;
pub mod config;
pub mod memory;
pub mod primitives;
pub mod util;
