use std::fmt::{Debug, Formatter};
use std::ops::Range;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, trace};
use serde::Serialize;
use thiserror::Error;

use super::{PhysAddr, VirtToPhysResolver};
use crate::util::{NamedProgress, PAGE_MASK, PAGE_SIZE};

/// Pages resolved per pagemap read while building a table.
const RESOLVE_CHUNK_PAGES: usize = 512;

/// One page of a buffer: its virtual base and the physical base backing it.
#[derive(Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageTranslationEntry {
    /// Page-aligned virtual address
    pub virt: usize,
    /// Page-aligned physical address
    pub phys: PhysAddr,
}

impl Debug for PageTranslationEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTranslationEntry")
            .field("virt", &format_args!("{:#x}", self.virt))
            .field("phys", &format_args!("{:p}", self.phys))
            .finish()
    }
}

/// Errors raised while building or querying a translation table.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// The resolver failed for a page of the buffer
    #[error("failed to resolve page: {0}")]
    Resolve(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// Two virtual pages reported the same physical page
    #[error("virtual pages 0x{first:x} and 0x{second:x} both map to {phys:?}")]
    DuplicatePhysPage {
        /// Physical page
        phys: PhysAddr,
        /// First virtual page
        first: usize,
        /// Second virtual page
        second: usize,
    },
    /// A reverse lookup was issued before the table was built
    #[error("translation table not built")]
    TableNotBuilt,
}

/// Page-granular translations of one buffer, sorted by physical address.
///
/// Answers physical to virtual queries with a binary search. The table is immutable once
/// built; rebuilding replaces it as a whole.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TranslationTable {
    entries: Vec<PageTranslationEntry>,
}

impl TranslationTable {
    /// Resolves every page of `[base, base + len)` and sorts the result by physical address.
    ///
    /// `base` must be page-aligned. Every page must be resident; a page reported as absent
    /// aborts the build with the resolver's error. If `progress` is given, a bar is added to it
    /// for the duration of the build.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError::Resolve`] if any page fails to resolve and
    /// [`TranslationError::DuplicatePhysPage`] if the resolver reports one physical page twice.
    pub fn build<R: VirtToPhysResolver>(
        resolver: &mut R,
        base: usize,
        len: usize,
        progress: Option<&MultiProgress>,
    ) -> Result<Self, TranslationError> {
        assert_eq!(base & PAGE_MASK, 0, "base 0x{:x} not page-aligned", base);
        let pages = len.div_ceil(PAGE_SIZE);
        debug!(
            "Building translation table for 0x{:x}..0x{:x} ({} pages)",
            base,
            base + len,
            pages
        );
        let bar = progress.map(|p| {
            let bar = p.add(ProgressBar::new(pages as u64));
            bar.set_style(ProgressStyle::named_bar("Resolving pages"));
            bar
        });

        let mut entries = Vec::with_capacity(pages);
        for chunk_start in (0..pages).step_by(RESOLVE_CHUNK_PAGES) {
            let chunk_pages = RESOLVE_CHUNK_PAGES.min(pages - chunk_start);
            let virt = base + chunk_start * PAGE_SIZE;
            let phys = resolver
                .get_phys_range(virt as u64..(virt + chunk_pages * PAGE_SIZE) as u64)
                .map_err(|e| TranslationError::Resolve(Box::new(e)))?;
            entries.extend(
                phys.into_iter()
                    .enumerate()
                    .map(|(idx, phys)| PageTranslationEntry {
                        virt: virt + idx * PAGE_SIZE,
                        phys: phys.page(),
                    }),
            );
            if let Some(bar) = &bar {
                bar.inc(chunk_pages as u64);
            }
        }
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        entries.sort_unstable_by_key(|entry| entry.phys);

        if let Some((a, b)) = entries
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.phys == b.phys)
        {
            return Err(TranslationError::DuplicatePhysPage {
                phys: a.phys,
                first: a.virt.min(b.virt),
                second: a.virt.max(b.virt),
            });
        }
        let table = TranslationTable { entries };
        trace!("Physical ranges:\n{}", table.format_phys_ranges());
        Ok(table)
    }

    /// Maps a physical address back to the virtual address inside the buffer.
    ///
    /// Returns `None` if the page of `phys` is not part of the table.
    pub fn phys_to_virt(&self, phys: PhysAddr) -> Option<*mut u8> {
        let page = phys.page();
        self.entries
            .binary_search_by_key(&page, |entry| entry.phys)
            .ok()
            .map(|idx| (self.entries[idx].virt | phys.page_offset()) as *mut u8)
    }

    /// Entries sorted by physical address.
    pub fn entries(&self) -> &[PageTranslationEntry] {
        &self.entries
    }

    /// Number of pages in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no pages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Physically contiguous ranges covered by the table, in ascending order.
    pub fn phys_ranges(&self) -> Vec<Range<PhysAddr>> {
        self.entries
            .iter()
            .map(|entry| entry.phys..entry.phys + PAGE_SIZE)
            .coalesce(|a, b| {
                if a.end == b.start {
                    Ok(a.start..b.end)
                } else {
                    Err((a, b))
                }
            })
            .collect()
    }

    /// Formats [`TranslationTable::phys_ranges`] one range per line.
    pub fn format_phys_ranges(&self) -> String {
        self.phys_ranges()
            .iter()
            .map(|range| {
                format!(
                    "{:p}..[{:04} KB]..{:p}",
                    range.start,
                    (range.end - range.start) / 1024,
                    range.end
                )
            })
            .join("\n")
    }
}
