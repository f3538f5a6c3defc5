/// Page shift value (12 bits) for 4KB pages
pub const PAGE_SHIFT: usize = 12;
/// Standard page size (4096 bytes), the minimum mapping granularity
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
/// Mask for extracting page offset
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Page shift of a 2 MB huge page
pub const HUGE_2M_SHIFT: usize = 21;
/// Page shift of a 1 GB huge page
pub const HUGE_1G_SHIFT: usize = 30;

/// Cache line shift (6 bits)
pub const CL_SHIFT: usize = 6;
/// Cache line size (64 bytes)
pub const CL_SIZE: usize = 1 << CL_SHIFT;

/// `f_type` reported by `fstatfs` for files on hugetlbfs
pub const HUGETLBFS_MAGIC: u64 = 0x9584_58f6;
