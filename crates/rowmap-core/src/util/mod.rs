//! Utility types and helpers shared by the rowmap components.
//!
//! - [`Size`] - Memory size representation
//! - Constants for memory and huge page handling ([`PAGE_SIZE`], [`HUGETLBFS_MAGIC`], etc.)
//! - Bit gather/scatter helpers for non-contiguous address fields ([`gather_bits`], [`scatter_bits`])
//! - Progress reporting ([`NamedProgress`])

mod bits;
mod constants;
mod named_progress;
mod size;

pub use self::bits::*;
pub use self::constants::*;
pub use self::named_progress::NamedProgress;
pub use self::size::Size;
