use lazy_static::lazy_static;
use log::{debug, info};
use rowmap_core::allocator::{AllocRequest, BufferAllocator, HugePageClass, MmapAllocator};
use rowmap_core::config::SubstrateConfig;
use rowmap_core::memory::MemoryBuffer;
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
// https://www.kernel.org/doc/Documentation/vm/hugetlbpage.txt
//
// The output of "cat /proc/meminfo" will include lines like:
// ...
// HugePages_Total: uuu
// HugePages_Free:  vvv
// HugePages_Rsvd:  www
// HugePages_Surp:  xxx
// Hugepagesize:    yyy kB
// Hugetlb:         zzz kB

// constant.
const MEMINFO_PATH: &str = "/proc/meminfo";
const TOKEN: &str = "Hugepagesize:";

lazy_static! {
    static ref HUGEPAGE_SIZE: Option<usize> = {
        let buf = File::open(MEMINFO_PATH).map_or("".to_owned(), |mut f| {
            let mut s = String::new();
            let _ = f.read_to_string(&mut s);
            s
        });
        parse_hugepage_size(&buf)
    };
}

fn parse_hugepage_size(s: &str) -> Option<usize> {
    let line = s.lines().find(|line| line.starts_with(TOKEN))?;
    let mut parts = line.strip_prefix(TOKEN)?.split_whitespace();
    let size = parts.next()?.parse::<usize>().ok()?;
    let unit = match parts.next() {
        Some("kB") => 1024,
        Some(_) => return None,
        None => 1,
    };
    Some(size * unit)
}

/// The default huge page size of the system in bytes, if huge pages are supported.
pub fn hugepage_size() -> Option<usize> {
    *HUGEPAGE_SIZE
}

/// The page class matching the default huge page size of the system.
pub fn default_class() -> Option<HugePageClass> {
    hugepage_size()
        .and_then(HugePageClass::from_page_size)
        .filter(HugePageClass::is_huge)
}

/// Errors of the huge page allocator.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing file could not be opened or created
    #[error("failed to open hugetlbfs file {}: {source}", .path.display())]
    Open {
        /// Path of the backing file
        path: PathBuf,
        /// OS diagnostic
        source: std::io::Error,
    },
    /// `/proc/meminfo` reports no usable huge page size
    #[error("unsupported default huge page size {0:?}")]
    UnsupportedSize(Option<usize>),
    /// The underlying allocation failed
    #[error(transparent)]
    Alloc(#[from] rowmap_core::allocator::Error),
}

/// A file on a hugetlbfs mount used as backing for huge page buffers.
///
/// The file is opened read-write and created with mode `0755` if it does not exist. It is
/// closed when the value is dropped.
#[derive(Debug)]
pub struct HugetlbBacking {
    file: File,
    path: PathBuf,
}

impl HugetlbBacking {
    /// Opens or creates the backing file at `path`.
    ///
    /// Whether the file actually lives on hugetlbfs is checked when allocating.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o755)
            .open(&path)
            .map_err(|source| Error::Open {
                path: path.clone(),
                source,
            })?;
        debug!("Opened hugetlbfs backing {}", path.display());
        Ok(HugetlbBacking { file, path })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsFd for HugetlbBacking {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Huge page allocator backed by a hugetlbfs file.
///
/// Every request is served with this allocator's page class and backing file, whatever the
/// request names; size and alignment are taken from the request.
///
/// # Platform Requirements
///
/// - Huge pages of the selected size must be reserved
/// - The backing file must live on a hugetlbfs mount with the same page size
#[derive(Debug)]
pub struct HugepageAllocator {
    backing: HugetlbBacking,
    class: HugePageClass,
}

impl HugepageAllocator {
    /// Creates an allocator for `class` pages from `backing`.
    pub fn new(backing: HugetlbBacking, class: HugePageClass) -> Self {
        HugepageAllocator { backing, class }
    }

    /// Creates an allocator using the default huge page size of the system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedSize`] if the default size is neither 2 MB nor 1 GB.
    pub fn with_default_size(backing: HugetlbBacking) -> Result<Self, Error> {
        let class = default_class().ok_or(Error::UnsupportedSize(hugepage_size()))?;
        Ok(Self::new(backing, class))
    }

    /// Opens the backing file and page class named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] if the backing file cannot be opened.
    pub fn from_config(config: &SubstrateConfig) -> Result<Self, Error> {
        let backing = HugetlbBacking::open(&config.hugetlbfs_file)?;
        Ok(Self::new(backing, config.huge_pages))
    }

    /// The page class of this allocator.
    pub fn class(&self) -> HugePageClass {
        self.class
    }

    /// The backing file.
    pub fn backing(&self) -> &HugetlbBacking {
        &self.backing
    }
}

impl BufferAllocator for HugepageAllocator {
    type Error = Error;

    fn allocate(&mut self, request: &AllocRequest<'_>) -> Result<MemoryBuffer, Self::Error> {
        let request = request
            .with_huge_pages(self.class)
            .with_backing(self.backing.as_fd());
        info!(
            "Allocating {} huge pages from {}",
            self.class,
            self.backing.path().display()
        );
        Ok(MmapAllocator.allocate(&request)?)
    }

    fn release(&mut self, buffer: MemoryBuffer) -> Result<(), Self::Error> {
        Ok(MmapAllocator.release(buffer)?)
    }
}
