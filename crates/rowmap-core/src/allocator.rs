//! Buffer allocation.
//!
//! This module defines the [`BufferAllocator`] trait and [`MmapAllocator`], which maps a large,
//! physically populated and optionally huge-page backed [`MemoryBuffer`] with a guaranteed
//! base alignment.
//!
//! Requests are described by an [`AllocRequest`]. Invalid requests are rejected with a
//! [`ConfigError`] before any mapping is attempted; an allocation never silently falls back to
//! a smaller or non-huge mapping.

use std::fmt::{self, Display, Formatter};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::ptr::null_mut;

use bitflags::bitflags;
use libc::{
    MAP_ANONYMOUS, MAP_FIXED, MAP_HUGE_1GB, MAP_HUGE_2MB, MAP_HUGETLB, MAP_NORESERVE,
    MAP_POPULATE, MAP_PRIVATE,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::MemoryBuffer;
use crate::util::{HUGE_1G_SHIFT, HUGE_2M_SHIFT, HUGETLBFS_MAGIC, PAGE_SIZE, Size};

bitflags! {
    /// Allocation behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllocFlags: u32 {
        /// Touch every page after mapping so that it is resident before the buffer is returned
        const POPULATE = 1 << 0;
        /// Keep the existing contents instead of zero-filling the buffer
        const NO_OVERWRITE = 1 << 1;
    }
}

impl Default for AllocFlags {
    fn default() -> Self {
        AllocFlags::POPULATE
    }
}

/// Page size backing a buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HugePageClass {
    /// Regular pages, anonymous private mapping
    #[default]
    Standard,
    /// 2 MB huge pages from a hugetlbfs file
    TwoMb,
    /// 1 GB huge pages from a hugetlbfs file
    OneGb,
}

impl HugePageClass {
    /// Size of one page of this class in bytes.
    pub const fn page_size(&self) -> usize {
        match self {
            HugePageClass::Standard => PAGE_SIZE,
            HugePageClass::TwoMb => 1 << HUGE_2M_SHIFT,
            HugePageClass::OneGb => 1 << HUGE_1G_SHIFT,
        }
    }

    /// Whether this class requires a hugetlbfs backing file.
    pub const fn is_huge(&self) -> bool {
        !matches!(self, HugePageClass::Standard)
    }

    /// The class whose page size is `bytes`, if any.
    pub const fn from_page_size(bytes: usize) -> Option<Self> {
        match bytes {
            PAGE_SIZE => Some(HugePageClass::Standard),
            b if b == 1 << HUGE_2M_SHIFT => Some(HugePageClass::TwoMb),
            b if b == 1 << HUGE_1G_SHIFT => Some(HugePageClass::OneGb),
            _ => None,
        }
    }

    // private huge page mappings own their pages; munmap returns them to the pool
    fn mmap_flags(&self) -> libc::c_int {
        match self {
            HugePageClass::Standard => MAP_PRIVATE | MAP_ANONYMOUS | MAP_POPULATE,
            HugePageClass::TwoMb => MAP_PRIVATE | MAP_POPULATE | MAP_HUGETLB | MAP_HUGE_2MB,
            HugePageClass::OneGb => MAP_PRIVATE | MAP_POPULATE | MAP_HUGETLB | MAP_HUGE_1GB,
        }
    }
}

impl Display for HugePageClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HugePageClass::Standard => write!(f, "standard"),
            huge => write!(f, "{}", Size::from_bytes(huge.page_size())),
        }
    }
}

/// Parameters of one buffer allocation.
///
/// ```
/// use rowmap_core::allocator::{AllocFlags, AllocRequest};
///
/// let request = AllocRequest::new(1 << 24)
///     .with_align(1 << 21)
///     .with_flags(AllocFlags::POPULATE | AllocFlags::NO_OVERWRITE);
/// assert!(request.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug)]
pub struct AllocRequest<'fd> {
    /// Requested size in bytes
    pub size: usize,
    /// Requested base alignment. Values below [`PAGE_SIZE`] request no alignment.
    pub align: usize,
    /// Page size backing the buffer
    pub huge_pages: HugePageClass,
    /// Behaviour flags
    pub flags: AllocFlags,
    /// Open file on hugetlbfs; mandatory for huge page classes
    pub backing: Option<BorrowedFd<'fd>>,
}

impl AllocRequest<'static> {
    /// A request for `size` bytes of standard pages without alignment.
    pub fn new(size: usize) -> Self {
        AllocRequest {
            size,
            align: 0,
            huge_pages: HugePageClass::Standard,
            flags: AllocFlags::default(),
            backing: None,
        }
    }
}

impl<'fd> AllocRequest<'fd> {
    /// Sets the base alignment.
    pub fn with_align(mut self, align: usize) -> Self {
        self.align = align;
        self
    }

    /// Sets the page class.
    pub fn with_huge_pages(mut self, class: HugePageClass) -> Self {
        self.huge_pages = class;
        self
    }

    /// Sets the behaviour flags.
    pub fn with_flags(mut self, flags: AllocFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the hugetlbfs backing file.
    pub fn with_backing<'a>(self, fd: BorrowedFd<'a>) -> AllocRequest<'a> {
        AllocRequest {
            size: self.size,
            align: self.align,
            huge_pages: self.huge_pages,
            flags: self.flags,
            backing: Some(fd),
        }
    }

    /// The alignment actually applied, zero if none.
    pub fn effective_align(&self) -> usize {
        if self.align < PAGE_SIZE { 0 } else { self.align }
    }

    /// Checks the request without touching the OS.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] the request violates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        let align = self.effective_align();
        if align != 0 && !align.is_power_of_two() {
            return Err(ConfigError::AlignNotPowerOfTwo { align });
        }
        if align != 0 && align == self.size {
            return Err(ConfigError::AlignEqualsSize { size: self.size });
        }
        if self.huge_pages.is_huge() {
            if self.backing.is_none() {
                return Err(ConfigError::MissingBacking {
                    class: self.huge_pages,
                });
            }
            if !self.size.is_multiple_of(self.huge_pages.page_size()) {
                return Err(ConfigError::SizeNotHugePageMultiple {
                    size: self.size,
                    class: self.huge_pages,
                });
            }
        }
        self.footprint().map(|_| ())
    }

    /// The mapped length and the reserved address range needed to align it.
    ///
    /// The mapped length is the size rounded up to the page size of the class. Address space
    /// for the alignment slack is only reserved when the page size alone does not guarantee
    /// the alignment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SizeOverflow`] if either length does not fit the address space.
    pub fn footprint(&self) -> Result<(usize, usize), ConfigError> {
        let granule = self.huge_pages.page_size();
        let align = self.effective_align();
        let slack = if align > granule { align } else { 0 };
        self.size
            .checked_next_multiple_of(granule)
            .and_then(|map_len| Some((map_len, map_len.checked_add(slack)?)))
            .ok_or(ConfigError::SizeOverflow {
                size: self.size,
                align,
            })
    }
}

/// Invalid allocation parameters. Always fatal for the request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Zero-length request
    #[error("requested size is zero")]
    ZeroSize,
    /// Alignment is not a power of two
    #[error("alignment 0x{align:x} is not a power of two")]
    AlignNotPowerOfTwo {
        /// Requested alignment
        align: usize,
    },
    /// Alignment equal to the requested size
    #[error("alignment equals the requested size 0x{size:x}")]
    AlignEqualsSize {
        /// Requested size
        size: usize,
    },
    /// Huge pages requested without a backing file
    #[error("{class} huge pages requested without a backing file descriptor")]
    MissingBacking {
        /// Requested page class
        class: HugePageClass,
    },
    /// Size is not a whole number of huge pages
    #[error("size 0x{size:x} is not a multiple of the {class} huge page size")]
    SizeNotHugePageMultiple {
        /// Requested size
        size: usize,
        /// Requested page class
        class: HugePageClass,
    },
    /// Size plus alignment slack exceeds the address space
    #[error("size 0x{size:x} with alignment 0x{align:x} does not fit the address space")]
    SizeOverflow {
        /// Requested size
        size: usize,
        /// Effective alignment
        align: usize,
    },
    /// The backing file does not live on hugetlbfs
    #[error("descriptor {fd} is not on hugetlbfs (f_type 0x{f_type:x})")]
    NotHugetlbfs {
        /// Backing descriptor
        fd: RawFd,
        /// File system magic reported by `fstatfs`
        f_type: u64,
    },
    /// The hugetlbfs mount uses a different page size
    #[error("descriptor {fd} is on a hugetlbfs mount with {actual} byte pages, {class} requested")]
    WrongPageSize {
        /// Backing descriptor
        fd: RawFd,
        /// Page size of the mount
        actual: usize,
        /// Requested page class
        class: HugePageClass,
    },
}

/// Allocation failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The request is invalid
    #[error("invalid allocation request: {0}")]
    Config(#[from] ConfigError),
    /// `mmap` failed
    #[error("mmap of 0x{len:x} bytes failed: {source}")]
    Mmap {
        /// Requested mapping length
        len: usize,
        /// OS diagnostic
        source: std::io::Error,
    },
    /// `munmap` failed
    #[error("munmap of 0x{len:x} bytes at 0x{addr:x} failed: {source}")]
    Munmap {
        /// Start of the range
        addr: usize,
        /// Length of the range
        len: usize,
        /// OS diagnostic
        source: std::io::Error,
    },
    /// `fstatfs` on the backing file failed
    #[error("fstatfs on descriptor {fd} failed: {source}")]
    Fstatfs {
        /// Backing descriptor
        fd: RawFd,
        /// OS diagnostic
        source: std::io::Error,
    },
}

/// Allocation strategy producing [`MemoryBuffer`]s.
///
/// Buffers are handed back through [`BufferAllocator::release`], which consumes them, so a
/// buffer cannot be released twice.
pub trait BufferAllocator {
    /// The error type returned by allocation operations.
    type Error: std::error::Error;

    /// Allocates a buffer satisfying `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is invalid or the OS refuses the mapping.
    fn allocate(&mut self, request: &AllocRequest<'_>) -> Result<MemoryBuffer, Self::Error>;

    /// Unmaps the whole footprint of `buffer` and drops its translation table.
    ///
    /// # Errors
    ///
    /// Returns an error if unmapping fails.
    fn release(&mut self, buffer: MemoryBuffer) -> Result<(), Self::Error>;
}

/// Allocator backed directly by `mmap`.
///
/// When the page size alone does not guarantee the alignment, address space for the size plus
/// the alignment is reserved without backing, the aligned region is mapped into it and the
/// slack on both sides is unmapped again. Slack pages are never populated.
///
/// Huge page buffers are private mappings of the hugetlbfs backing file, so two buffers from
/// the same file never share pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapAllocator;

impl MmapAllocator {
    fn check_backing(fd: BorrowedFd<'_>, class: HugePageClass) -> Result<(), Error> {
        let raw = fd.as_raw_fd();
        let mut stat: libc::statfs = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstatfs(raw, &mut stat) } != 0 {
            return Err(Error::Fstatfs {
                fd: raw,
                source: std::io::Error::last_os_error(),
            });
        }
        let f_type = stat.f_type as u64 & 0xffff_ffff;
        if f_type != HUGETLBFS_MAGIC {
            return Err(ConfigError::NotHugetlbfs { fd: raw, f_type }.into());
        }
        let actual = stat.f_bsize as usize;
        if actual != class.page_size() {
            return Err(ConfigError::WrongPageSize {
                fd: raw,
                actual,
                class,
            }
            .into());
        }
        Ok(())
    }

    fn unmap(addr: usize, len: usize) -> Result<(), Error> {
        if len == 0 {
            return Ok(());
        }
        if unsafe { libc::munmap(addr as *mut libc::c_void, len) } != 0 {
            return Err(Error::Munmap {
                addr,
                len,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    /// Unmaps `addr..addr + len` after a failed allocation step and hands back `err`.
    fn abandon(addr: usize, len: usize, err: Error) -> Error {
        if let Err(cleanup) = Self::unmap(addr, len) {
            warn!("Cleanup after failed allocation leaked 0x{:x} bytes: {}", len, cleanup);
        }
        err
    }

    fn mmap(
        addr: usize,
        len: usize,
        prot: libc::c_int,
        flags: libc::c_int,
        fd: RawFd,
    ) -> Result<usize, Error> {
        let p = unsafe { libc::mmap(addr as *mut libc::c_void, len, prot, flags, fd, 0) };
        if p == libc::MAP_FAILED {
            return Err(Error::Mmap {
                len,
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(p as usize)
    }
}

/// Prepares the contents of a fresh mapping of `len` bytes.
///
/// Zero-fills unless [`AllocFlags::NO_OVERWRITE`] is set. With `NO_OVERWRITE` and
/// [`AllocFlags::POPULATE`], every `granule` is touched with a volatile read and write of the
/// byte already there, so the pages are faulted in without changing the contents.
///
/// # Safety
///
/// `ptr..ptr + len` must be writable.
unsafe fn fill(ptr: *mut u8, len: usize, granule: usize, flags: AllocFlags) {
    if !flags.contains(AllocFlags::NO_OVERWRITE) {
        unsafe { std::ptr::write_bytes(ptr, 0x00, len) };
    } else if flags.contains(AllocFlags::POPULATE) {
        for offset in (0..len).step_by(granule) {
            unsafe {
                let page = ptr.add(offset);
                std::ptr::write_volatile(page, std::ptr::read_volatile(page));
            }
        }
    }
}

impl BufferAllocator for MmapAllocator {
    type Error = Error;

    fn allocate(&mut self, request: &AllocRequest<'_>) -> Result<MemoryBuffer, Error> {
        request.validate()?;
        let class = request.huge_pages;
        let fd = match request.backing {
            Some(fd) if class.is_huge() => {
                Self::check_backing(fd, class)?;
                fd.as_raw_fd()
            }
            _ => -1,
        };

        let granule = class.page_size();
        let align = request.effective_align();
        let (map_len, total) = request.footprint()?;
        let prot = libc::PROT_READ | libc::PROT_WRITE;

        let (addr, start) = if total > map_len {
            // reserve the range without backing, then map the aligned part over it
            let addr = Self::mmap(
                0,
                total,
                libc::PROT_NONE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
                -1,
            )?;
            let start = addr.next_multiple_of(align);
            if let Err(e) = Self::mmap(start, map_len, prot, class.mmap_flags() | MAP_FIXED, fd) {
                return Err(Self::abandon(addr, total, e));
            }
            (addr, start)
        } else {
            let addr = Self::mmap(0, map_len, prot, class.mmap_flags(), fd)?;
            (addr, addr)
        };
        let lead = start - addr;
        let trail = total - lead - map_len;
        debug!(
            "Mapped 0x{:x} bytes at 0x{:x} from a 0x{:x} byte range, trimming 0x{:x} leading and 0x{:x} trailing bytes",
            map_len, start, total, lead, trail
        );
        if let Err(e) = Self::unmap(addr, lead).and_then(|_| Self::unmap(start + map_len, trail)) {
            return Err(Self::abandon(addr, total, e));
        }
        debug_assert!(align == 0 || start.is_multiple_of(align));

        let ptr = start as *mut u8;
        unsafe { fill(ptr, map_len, granule, request.flags) };

        info!(
            "Allocated buffer at {:p}: size {}, alignment 0x{:x}, pages {}, mapped 0x{:x} bytes",
            ptr,
            Size::from_bytes(request.size),
            align,
            class,
            map_len
        );
        let backing_fd = class.is_huge().then_some(fd);
        Ok(unsafe {
            MemoryBuffer::from_mapping(
                ptr,
                request.size,
                align,
                class,
                request.flags,
                backing_fd,
                map_len,
            )
        })
    }

    fn release(&mut self, mut buffer: MemoryBuffer) -> Result<(), Error> {
        let (addr, len) = buffer.take_mapping();
        debug!("Releasing buffer at 0x{:x} (0x{:x} bytes)", addr, len);
        Self::unmap(addr, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BytePointer;
    use std::fs::File;
    use std::os::fd::AsFd;

    #[test]
    fn test_validate_zero_size() {
        assert_eq!(
            AllocRequest::new(0).validate(),
            Err(ConfigError::ZeroSize)
        );
    }

    #[test]
    fn test_validate_alignment() {
        assert_eq!(
            AllocRequest::new(1 << 20).with_align(3 * PAGE_SIZE).validate(),
            Err(ConfigError::AlignNotPowerOfTwo {
                align: 3 * PAGE_SIZE
            })
        );
        assert_eq!(
            AllocRequest::new(1 << 21).with_align(1 << 21).validate(),
            Err(ConfigError::AlignEqualsSize { size: 1 << 21 })
        );
        // below page granularity no alignment is attempted
        let request = AllocRequest::new(1 << 20).with_align(48);
        assert_eq!(request.effective_align(), 0);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_backing() {
        let err = AllocRequest::new(1 << 30)
            .with_huge_pages(HugePageClass::OneGb)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingBacking {
                class: HugePageClass::OneGb
            }
        );
        assert!(matches!(
            MmapAllocator
                .allocate(&AllocRequest::new(1 << 21).with_huge_pages(HugePageClass::TwoMb)),
            Err(Error::Config(ConfigError::MissingBacking { .. }))
        ));
    }

    #[test]
    fn test_validate_huge_page_multiple() {
        let file = File::open("/dev/null").expect("open /dev/null");
        let request = AllocRequest::new(3 << 20)
            .with_huge_pages(HugePageClass::TwoMb)
            .with_backing(file.as_fd());
        assert!(matches!(
            request.validate(),
            Err(ConfigError::SizeNotHugePageMultiple { size, .. }) if size == 3 << 20
        ));
    }

    #[test]
    fn test_backing_not_on_hugetlbfs() {
        let file = File::open("/dev/null").expect("open /dev/null");
        let request = AllocRequest::new(1 << 21)
            .with_huge_pages(HugePageClass::TwoMb)
            .with_backing(file.as_fd());
        assert!(matches!(
            MmapAllocator.allocate(&request),
            Err(Error::Config(ConfigError::NotHugetlbfs { .. }))
        ));
    }

    #[test]
    fn test_allocate_aligned() {
        let mut allocator = MmapAllocator;
        for align in [PAGE_SIZE, 1 << 16, 1 << 21] {
            let size = 3 * (1 << 20) + 123;
            let buffer = allocator
                .allocate(&AllocRequest::new(size).with_align(align))
                .expect("allocate");
            assert_eq!(buffer.ptr() as usize % align, 0);
            assert_eq!(buffer.len(), size);
            assert_eq!(buffer.align(), align);
            assert!(buffer.mapped_len() >= size);
            unsafe {
                assert_eq!(*buffer.addr(0), 0);
                *buffer.addr(size - 1) = 0xaa;
                assert_eq!(*buffer.addr(size - 1), 0xaa);
            }
            allocator.release(buffer).expect("release");
        }
    }

    #[test]
    fn test_allocate_unaligned_is_zeroed() {
        let mut allocator = MmapAllocator;
        let buffer = allocator
            .allocate(&AllocRequest::new(64 * PAGE_SIZE))
            .expect("allocate");
        assert_eq!(buffer.align(), 0);
        assert!(buffer.backing_fd().is_none());
        assert_eq!(buffer.huge_pages(), HugePageClass::Standard);
        let bytes = unsafe { std::slice::from_raw_parts(buffer.ptr(), buffer.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
        allocator.release(buffer).expect("release");
    }

    #[test]
    fn test_allocate_no_overwrite() {
        let mut allocator = MmapAllocator;
        let buffer = allocator
            .allocate(
                &AllocRequest::new(16 * PAGE_SIZE)
                    .with_align(1 << 16)
                    .with_flags(AllocFlags::POPULATE | AllocFlags::NO_OVERWRITE),
            )
            .expect("allocate");
        assert!(buffer.flags().contains(AllocFlags::NO_OVERWRITE));
        assert_eq!(buffer.ptr() as usize % (1 << 16), 0);
        allocator.release(buffer).expect("release");
    }

    #[test]
    fn test_fill_zeroes_by_default() {
        let mut data = vec![0x5au8; 8 * PAGE_SIZE];
        unsafe { fill(data.as_mut_ptr(), data.len(), PAGE_SIZE, AllocFlags::POPULATE) };
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_keeps_contents_with_no_overwrite() {
        let mut data: Vec<u8> = (0..8 * PAGE_SIZE).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();
        unsafe {
            fill(
                data.as_mut_ptr(),
                data.len(),
                PAGE_SIZE,
                AllocFlags::POPULATE | AllocFlags::NO_OVERWRITE,
            );
            fill(data.as_mut_ptr(), data.len(), PAGE_SIZE, AllocFlags::NO_OVERWRITE);
        }
        assert_eq!(data, expected);
    }

    #[test]
    fn test_size_overflow() {
        assert_eq!(
            AllocRequest::new(usize::MAX - 10).validate(),
            Err(ConfigError::SizeOverflow {
                size: usize::MAX - 10,
                align: 0
            })
        );
        let size = usize::MAX & !(PAGE_SIZE - 1);
        assert!(matches!(
            MmapAllocator.allocate(&AllocRequest::new(size).with_align(1 << 21)),
            Err(Error::Config(ConfigError::SizeOverflow { align, .. })) if align == 1 << 21
        ));
        assert_eq!(
            AllocRequest::new(3 << 20).with_align(1 << 21).footprint(),
            Ok((3 << 20, 5 << 20))
        );
        assert_eq!(
            AllocRequest::new(3 << 20).with_align(PAGE_SIZE).footprint(),
            Ok((3 << 20, 3 << 20))
        );
    }

    #[test]
    fn test_huge_page_mappings_are_private() {
        for class in [HugePageClass::TwoMb, HugePageClass::OneGb] {
            let flags = class.mmap_flags();
            assert_eq!(flags & libc::MAP_PRIVATE, libc::MAP_PRIVATE);
            assert_eq!(flags & libc::MAP_SHARED, 0);
            assert_eq!(flags & MAP_HUGETLB, MAP_HUGETLB);
        }
    }

    #[test]
    fn test_buffers_are_disjoint() {
        let mut allocator = MmapAllocator;
        let request = AllocRequest::new(8 * PAGE_SIZE).with_align(1 << 16);
        let first = allocator.allocate(&request).expect("allocate");
        unsafe { *first.addr(0) = 0xa5 };
        let second = allocator.allocate(&request).expect("allocate");
        assert!(!first.contains(second.ptr()));
        assert!(!second.contains(first.ptr()));
        unsafe { assert_eq!(*first.addr(0), 0xa5) };
        allocator.release(second).expect("release");
        allocator.release(first).expect("release");
    }

    #[test]
    fn test_abandon_keeps_original_error() {
        let len = 8 * PAGE_SIZE;
        let addr = MmapAllocator::mmap(
            0,
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            HugePageClass::Standard.mmap_flags(),
            -1,
        )
        .expect("mmap");
        // leading part already trimmed, as after a partially failed trim
        MmapAllocator::unmap(addr, 2 * PAGE_SIZE).expect("munmap");
        let err = MmapAllocator::abandon(addr, len, ConfigError::ZeroSize.into());
        assert!(matches!(err, Error::Config(ConfigError::ZeroSize)));

        // a failing cleanup is logged, not returned
        let unaligned = MmapAllocator::unmap(addr + 1, PAGE_SIZE).unwrap_err();
        assert!(matches!(unaligned, Error::Munmap { .. }));
        let err = MmapAllocator::abandon(addr + 1, PAGE_SIZE, ConfigError::ZeroSize.into());
        assert!(matches!(err, Error::Config(ConfigError::ZeroSize)));
    }

    #[test]
    fn test_huge_page_class() {
        assert_eq!(HugePageClass::TwoMb.page_size(), 2 << 20);
        assert_eq!(HugePageClass::OneGb.page_size(), 1 << 30);
        assert_eq!(
            HugePageClass::from_page_size(1 << 30),
            Some(HugePageClass::OneGb)
        );
        assert_eq!(HugePageClass::from_page_size(1 << 16), None);
        assert_eq!(HugePageClass::TwoMb.to_string(), "2 MB");
        assert_eq!(HugePageClass::Standard.to_string(), "standard");
        assert_eq!(
            serde_json::to_string(&HugePageClass::OneGb).expect("json"),
            "\"one_gb\""
        );
    }
}
