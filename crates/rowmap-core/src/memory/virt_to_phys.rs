use std::fmt::{Debug, Formatter};
use std::ops::{Add, BitOr, Range, Sub};

use crate::util::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE};
use log::{trace, warn};
use pagemap2::{PageMapEntry, PageMapError, VirtualMemoryArea};
use serde::Serialize;
use thiserror::Error;

#[repr(transparent)]
#[derive(Clone, Copy, Default, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Physical memory address.
///
/// A newtype wrapper around a physical address value.
pub struct PhysAddr(usize);

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("PhysAddr(0x{:02x})", self.0))
    }
}

impl PhysAddr {
    /// Creates a new physical address.
    pub const fn new(addr: usize) -> Self {
        PhysAddr(addr)
    }

    /// Returns the address as a usize.
    pub const fn as_usize(&self) -> usize {
        self.0
    }

    /// Returns the address as a u64.
    pub const fn as_u64(&self) -> u64 {
        self.0 as u64
    }

    /// The base address of the page containing this address.
    pub const fn page(&self) -> PhysAddr {
        PhysAddr(self.0 & !PAGE_MASK)
    }

    /// The offset of this address inside its page.
    pub const fn page_offset(&self) -> usize {
        self.0 & PAGE_MASK
    }

    /// The page frame number of this address.
    pub const fn pfn(&self) -> u64 {
        (self.0 >> PAGE_SHIFT) as u64
    }
}

/// Converts the pagemap entry of the page holding `virt` into the physical address of `virt`.
///
/// # Errors
///
/// Fails if the page is not present, or if the kernel hides the PFN (reported as zero to
/// processes without `CAP_SYS_ADMIN`).
pub fn entry_to_phys(entry: &PageMapEntry, virt: u64) -> Result<PhysAddr, LinuxPageMapError> {
    let pfn = entry.pfn().map_err(|e| match e {
        PageMapError::PageNotPresent => LinuxPageMapError::NotPresent { virt },
        e => e.into(),
    })?;
    if pfn == 0 {
        return Err(LinuxPageMapError::HiddenPfn { virt });
    }
    Ok(PhysAddr(
        ((pfn << PAGE_SHIFT) | (virt & PAGE_MASK as u64)) as usize,
    ))
}

/// Trait for resolving virtual addresses to physical addresses.
///
/// Implementors provide methods to translate virtual memory addresses
/// to physical addresses using system interfaces like `/proc/{pid}/pagemap`.
pub trait VirtToPhysResolver {
    /// Errors that can occur during physical address resolution
    type Error: std::error::Error + Send + Sync + 'static;

    /// Translates a virtual address to a physical address, including the in-page offset.
    ///
    /// # Errors
    ///
    /// Returns an error if address translation fails.
    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, Self::Error>;

    /// Translates every page of `region` to the physical address of its page.
    ///
    /// `region.start` is rounded down to its page; one address is returned per page.
    ///
    /// # Errors
    ///
    /// Returns an error if address translation of any page fails.
    fn get_phys_range(&mut self, region: Range<u64>) -> Result<Vec<PhysAddr>, Self::Error> {
        let start = region.start & !(PAGE_MASK as u64);
        (start..region.end)
            .step_by(PAGE_SIZE)
            .map(|virt| self.get_phys(virt).map(|p| p.page()))
            .collect()
    }
}

/// Errors that can happen during pagemap operations
#[derive(Debug, Error)]
pub enum LinuxPageMapError {
    /// Opening or reading the pagemap failed
    #[error(transparent)]
    PageMap(#[from] PageMapError),
    /// The virtual page is not resident
    #[error("virtual page of 0x{virt:x} is not present in RAM")]
    NotPresent {
        /// Queried virtual address
        virt: u64,
    },
    /// The PFN is hidden from this process
    #[error("pagemap reports PFN 0 for 0x{virt:x}. Reading PFNs requires CAP_SYS_ADMIN")]
    HiddenPfn {
        /// Queried virtual address
        virt: u64,
    },
}

/// Virtual to physical address translator using Linux pagemap.
///
/// Owns a read-only handle on `/proc/{pid}/pagemap` for its whole lifetime; the handle is
/// closed when the value is dropped, on every exit path. Requires root privileges to see
/// real page frame numbers.
#[derive(Debug)]
pub struct LinuxPageMap {
    pagemap_wrapper: pagemap2::PageMap,
}

impl LinuxPageMap {
    /// Creates a new pagemap for the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if opening the pagemap of this process fails.
    pub fn new() -> Result<LinuxPageMap, LinuxPageMapError> {
        Self::for_process(std::process::id())
    }

    /// Creates a new pagemap for a specific process.
    ///
    /// # Arguments
    ///
    /// * `pid` - Process ID to open pagemap for
    ///
    /// # Errors
    ///
    /// Returns an error if opening the process pagemap fails.
    pub fn for_process(pid: u32) -> Result<LinuxPageMap, LinuxPageMapError> {
        let pagemap_wrapper = pagemap2::PageMap::new(pid as u64)?;
        trace!("Opened pagemap of process {}", pid);
        Ok(LinuxPageMap { pagemap_wrapper })
    }

    /// The process whose pagemap is read.
    pub fn pid(&self) -> u64 {
        self.pagemap_wrapper.pid()
    }

    /// Reads the entry of the page containing `virt`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the pagemap fails.
    pub fn entry(&mut self, virt: u64) -> Result<PageMapEntry, LinuxPageMapError> {
        let entries = self.entries(virt, 1)?;
        assert_eq!(
            entries.len(),
            1,
            "Got {} pagemap entries for virtual address 0x{:x}, expected exactly one",
            entries.len(),
            virt
        );
        Ok(entries[0])
    }

    /// Reads `count` consecutive entries starting at the page containing `virt`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the pagemap fails.
    pub fn entries(
        &mut self,
        virt: u64,
        count: usize,
    ) -> Result<Vec<PageMapEntry>, LinuxPageMapError> {
        if count == 0 {
            return Ok(vec![]);
        }
        let start = virt & !(PAGE_MASK as u64);
        let vma = VirtualMemoryArea::from((start, start + (count * PAGE_SIZE) as u64));
        Ok(self.pagemap_wrapper.pagemap_vma(&vma)?)
    }
}

impl VirtToPhysResolver for LinuxPageMap {
    type Error = LinuxPageMapError;

    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, Self::Error> {
        let phys = entry_to_phys(&self.entry(virt)?, virt);
        if let Err(LinuxPageMapError::HiddenPfn { .. }) = &phys {
            warn!(
                "Got invalid PFN 0 for virtual address 0x{:x}. Are we root?",
                virt
            );
        }
        phys
    }

    fn get_phys_range(&mut self, region: Range<u64>) -> Result<Vec<PhysAddr>, Self::Error> {
        let start = region.start & !(PAGE_MASK as u64);
        if region.end <= start {
            return Ok(vec![]);
        }
        let pages = (region.end - start).div_ceil(PAGE_SIZE as u64) as usize;
        self.entries(start, pages)?
            .iter()
            .enumerate()
            .map(|(idx, entry)| entry_to_phys(entry, start + (idx * PAGE_SIZE) as u64))
            .collect()
    }
}

/// One-shot physical address resolution for raw pointers.
///
/// Each call opens the pagemap of this process, performs a single query and closes the handle
/// again. Use a long-lived [`LinuxPageMap`] when resolving many addresses.
pub trait PfnResolver {
    /// Returns the physical address backing this address.
    ///
    /// # Errors
    ///
    /// Returns error if the pagemap cannot be read or the page is not resident
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError>;
}

impl<T> PfnResolver for *const T {
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError> {
        LinuxPageMap::new()?.get_phys(*self as u64)
    }
}

impl<T> PfnResolver for *mut T {
    fn pfn(&self) -> Result<PhysAddr, LinuxPageMapError> {
        self.cast_const().pfn()
    }
}

impl From<PhysAddr> for usize {
    fn from(addr: PhysAddr) -> usize {
        addr.0
    }
}

impl From<PhysAddr> for u64 {
    fn from(addr: PhysAddr) -> u64 {
        addr.0 as u64
    }
}

impl std::fmt::Pointer for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:p}", self.0 as *const u8)
    }
}

impl Add<usize> for PhysAddr {
    type Output = PhysAddr;

    fn add(self, rhs: usize) -> Self::Output {
        PhysAddr(self.0 + rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = usize;

    fn sub(self, rhs: PhysAddr) -> Self::Output {
        assert!(self.0 >= rhs.0);
        self.0 - rhs.0
    }
}

impl BitOr<PhysAddr> for PhysAddr {
    type Output = PhysAddr;

    fn bitor(self, rhs: PhysAddr) -> Self::Output {
        PhysAddr(self.0 | rhs.0)
    }
}
