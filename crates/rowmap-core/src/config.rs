//! Substrate configuration.
//!
//! [`SubstrateConfig`] bundles the buffer parameters and file locations a tool built on this
//! crate needs. It is loaded from JSON; every field is optional and falls back to the defaults
//! below.
//!
//! ```json
//! {
//!   "buffer_size": 1073741824,
//!   "align": 2097152,
//!   "huge_pages": "one_gb",
//!   "hugetlbfs_file": "/mnt/huge/buff",
//!   "layout_file": "tmp/s_cfg.bin",
//!   "no_overwrite": false
//! }
//! ```

use std::fs::File;
use std::io::Read;
use std::os::fd::BorrowedFd;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::allocator::{AllocFlags, AllocRequest, HugePageClass};
use crate::memory::{DramLayout, LayoutError};
use crate::util::Size;

/// Errors that can occur when loading a [`SubstrateConfig`].
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

/// Result type for the [`SubstrateConfig`] constructor.
pub type Result<T> = std::result::Result<T, Error>;

/// Buffer and file parameters of the memory substrate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    /// Buffer size in bytes
    pub buffer_size: usize,
    /// Buffer base alignment in bytes
    pub align: usize,
    /// Page class backing the buffer
    pub huge_pages: HugePageClass,
    /// File on a hugetlbfs mount backing huge page buffers
    pub hugetlbfs_file: PathBuf,
    /// Binary DRAM layout record
    pub layout_file: PathBuf,
    /// Keep the previous contents of the backing file instead of zero-filling
    pub no_overwrite: bool,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        SubstrateConfig {
            buffer_size: Size::GB(1).bytes(),
            align: Size::MB(2).bytes(),
            huge_pages: HugePageClass::OneGb,
            hugetlbfs_file: PathBuf::from("/mnt/huge/buff"),
            layout_file: PathBuf::from("tmp/s_cfg.bin"),
            no_overwrite: false,
        }
    }
}

impl SubstrateConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `filepath` - Path to the JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_jsonfile(filepath: impl AsRef<Path>) -> Result<SubstrateConfig> {
        let mut file = File::open(filepath.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: SubstrateConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Allocation flags derived from this configuration.
    pub fn flags(&self) -> AllocFlags {
        if self.no_overwrite {
            AllocFlags::POPULATE | AllocFlags::NO_OVERWRITE
        } else {
            AllocFlags::POPULATE
        }
    }

    /// The allocation request described by this configuration.
    ///
    /// `backing` is required when [`SubstrateConfig::huge_pages`] is a huge page class; the
    /// request is validated by the allocator, not here.
    pub fn request<'fd>(&self, backing: Option<BorrowedFd<'fd>>) -> AllocRequest<'fd> {
        AllocRequest {
            size: self.buffer_size,
            align: self.align,
            huge_pages: self.huge_pages,
            flags: self.flags(),
            backing,
        }
    }

    /// Loads the DRAM layout record named by [`SubstrateConfig::layout_file`].
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be read or is invalid
    pub fn load_layout(&self) -> std::result::Result<DramLayout, LayoutError> {
        DramLayout::load(&self.layout_file)
    }
}
