use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rowmap::allocator::{
    AllocRequest, BufferAllocator, ConfigError, Error as AllocError, HugePageClass, MmapAllocator,
};
use rowmap::config::SubstrateConfig;
use rowmap::memory::{
    BytePointer, DRAMAddr, DramLayout, LinuxPageMap, LinuxPageMapError, PhysAddr,
    TranslationError, VirtToPhysResolver,
};
use rowmap::primitives;
use rowmap::util::{PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, Size::MB};
use rowmap_hugepage::HugepageAllocator;

/// Maps the pages of one buffer onto a shuffled physical window.
struct ShuffledPages {
    base: usize,
    pfns: Vec<usize>,
}

impl ShuffledPages {
    fn new(base: usize, len: usize, rng: &mut StdRng) -> Self {
        let first = rng.random_range(0x1_0000..0x10_0000);
        let mut pfns: Vec<usize> = (first..first + len / PAGE_SIZE).collect();
        pfns.shuffle(rng);
        ShuffledPages { base, pfns }
    }
}

impl VirtToPhysResolver for ShuffledPages {
    type Error = LinuxPageMapError;

    fn get_phys(&mut self, virt: u64) -> Result<PhysAddr, Self::Error> {
        let page = (virt as usize).wrapping_sub(self.base) >> PAGE_SHIFT;
        self.pfns
            .get(page)
            .map(|pfn| PhysAddr::new((pfn << PAGE_SHIFT) | (virt as usize & PAGE_MASK)))
            .ok_or(LinuxPageMapError::NotPresent { virt })
    }
}

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

#[test]
fn test_alloc_alignment() -> anyhow::Result<()> {
    init_logging();
    let mut allocator = MmapAllocator;
    for (size, align) in [(MB(8).bytes(), MB(2).bytes()), (MB(3).bytes() + 17, MB(1).bytes())] {
        let buffer = allocator.allocate(&AllocRequest::new(size).with_align(align))?;
        assert_eq!(buffer.ptr() as usize % align, 0);
        assert!(buffer.mapped_len() >= size);
        // the whole requested region is writable
        for offset in (0..size).step_by(PAGE_SIZE).chain([size - 1]) {
            unsafe { *buffer.addr(offset) = 0x5a };
        }
        allocator.release(buffer)?;
    }
    Ok(())
}

#[test]
fn test_alloc_config_errors() {
    let mut allocator = MmapAllocator;
    assert!(matches!(
        allocator.allocate(&AllocRequest::new(0)),
        Err(AllocError::Config(ConfigError::ZeroSize))
    ));
    assert!(matches!(
        allocator.allocate(&AllocRequest::new(MB(2).bytes()).with_align(MB(2).bytes())),
        Err(AllocError::Config(ConfigError::AlignEqualsSize { .. }))
    ));
    // huge pages without backing never fall back to a standard mapping
    assert!(matches!(
        allocator.allocate(&AllocRequest::new(MB(1024).bytes()).with_huge_pages(HugePageClass::OneGb)),
        Err(AllocError::Config(ConfigError::MissingBacking {
            class: HugePageClass::OneGb
        }))
    ));
}

#[test]
fn test_translation_round_trip() -> anyhow::Result<()> {
    init_logging();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut allocator = MmapAllocator;
    let mut buffer = allocator.allocate(&AllocRequest::new(MB(4).bytes()).with_align(MB(2).bytes()))?;
    let mut resolver = ShuffledPages::new(buffer.ptr() as usize, buffer.len(), &mut rng);

    assert!(matches!(
        buffer.phys_to_virt(PhysAddr::new(0)),
        Err(TranslationError::TableNotBuilt)
    ));
    let pages = buffer.len() / PAGE_SIZE;
    let table = buffer.build_translation_table(&mut resolver)?;
    assert_eq!(table.len(), pages);
    assert!(table.entries().windows(2).all(|w| w[0].phys < w[1].phys));
    let mut virts: Vec<usize> = table.entries().iter().map(|e| e.virt).collect();
    virts.sort_unstable();
    virts.dedup();
    assert_eq!(virts.len(), pages);

    for offset in (0..buffer.len()).step_by(PAGE_SIZE) {
        let virt = buffer.addr(offset);
        let phys = buffer.virt_to_phys(&mut resolver, virt)?;
        assert_eq!(buffer.phys_to_virt(phys)?, Some(virt));
    }
    for _ in 0..1000 {
        let virt = buffer.random_addr(&mut rng, 1);
        let phys = buffer.virt_to_phys(&mut resolver, virt)?;
        assert_eq!(buffer.phys_to_virt(phys)?, Some(virt));
    }

    // far outside of the buffer's physical footprint
    assert_eq!(buffer.phys_to_virt(PhysAddr::new(1 << 46))?, None);
    allocator.release(buffer)?;
    Ok(())
}

#[test]
fn test_codec_with_translation() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(1);
    let layout = DramLayout::from_bit_positions(&[6, 13, 14, 15], &[18, 19, 20, 21], &[0, 1, 2, 3, 4, 5, 7, 8])?;
    let mut buffer = MmapAllocator.allocate(&AllocRequest::new(MB(4).bytes()))?;
    let mut resolver = ShuffledPages::new(buffer.ptr() as usize, buffer.len(), &mut rng);
    buffer.build_translation_table(&mut resolver)?;

    // pick a target inside the buffer, move to the neighbouring column and map it back
    let virt = buffer.addr(0x3000 + 0x40);
    let phys = buffer.virt_to_phys(&mut resolver, virt)?;
    let mut dram = layout.phys_to_dram(phys);
    dram.col ^= 1;
    let neighbour = layout.dram_to_phys(&dram)?
        | PhysAddr::new(phys.as_usize() & !(layout.bank_mask() | layout.row_mask() | layout.col_mask()) as usize);
    assert_eq!(DRAMAddr::from_phys(neighbour, &layout).col, dram.col);
    let target = buffer.phys_to_virt(neighbour)?.expect("same page");
    assert_eq!(target as usize, virt as usize ^ 1);
    unsafe {
        let ticks = primitives::time_access(target);
        assert!(ticks < u64::MAX);
    }
    MmapAllocator.release(buffer)?;
    Ok(())
}

#[test]
fn test_column_scatter_example() {
    let layout = DramLayout::columns_only(0b10_1010);
    let bits = DRAMAddr::new(0, 0, 5).col_to_phys(&layout).expect("in range");
    assert_eq!(bits.as_usize(), 34);
    assert_eq!(layout.phys_to_dram(bits).col, 5);
}

#[test]
fn test_layout_persistence() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("rowmap-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let config = SubstrateConfig {
        layout_file: dir.join("s_cfg.bin"),
        ..Default::default()
    };
    let layout = DramLayout::new(0x6040, 0x3f_fffc_0000, 0x1fbf)?;
    layout.save(&config.layout_file)?;
    assert_eq!(config.load_layout()?, layout);
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
#[ignore = "requires root to read PFNs"]
fn test_pagemap_round_trip() -> anyhow::Result<()> {
    init_logging();
    let mut allocator = MmapAllocator;
    let mut buffer = allocator.allocate(&AllocRequest::new(MB(16).bytes()).with_align(MB(2).bytes()))?;
    let mut pagemap = LinuxPageMap::new()?;
    buffer.build_translation_table(&mut pagemap)?;
    for offset in (0..buffer.len()).step_by(PAGE_SIZE) {
        let virt = buffer.addr(offset);
        let phys = buffer.virt_to_phys(&mut pagemap, virt)?;
        assert_eq!(buffer.phys_to_virt(phys)?, Some(virt));
    }
    assert_eq!(buffer.phys_to_virt(PhysAddr::new(usize::MAX & !PAGE_MASK))?, None);
    allocator.release(buffer)?;
    Ok(())
}

#[test]
#[ignore = "requires reserved 1 GB huge pages and hugetlbfs at /mnt/huge"]
fn test_hugepage_buffer() -> anyhow::Result<()> {
    init_logging();
    let config = SubstrateConfig::default();
    let mut allocator = HugepageAllocator::from_config(&config)?;
    let mut buffer = allocator.allocate(&config.request(None))?;
    assert_eq!(buffer.ptr() as usize % config.align, 0);
    let mut pagemap = LinuxPageMap::new()?;
    let table = buffer.build_translation_table(&mut pagemap)?;
    // a 1 GB page is physically contiguous
    assert_eq!(table.phys_ranges().len(), 1);
    allocator.release(buffer)?;
    Ok(())
}
