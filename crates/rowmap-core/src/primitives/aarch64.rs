use super::{Capabilities, Primitives, Support};
use std::arch::asm;

/// AArch64 primitives.
///
/// Cache maintenance uses `dc civac`, which Linux permits at EL0. The cycle counter is the
/// virtual generic timer (`cntvct_el0`), since `pmccntr_el0` is not readable from user space
/// unless the kernel enables it; it ticks at the `cntfrq_el0` frequency, not at core clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arm64;

impl Primitives for Arm64 {
    const NAME: &'static str = "aarch64";

    #[inline(always)]
    unsafe fn flush(addr: *const u8) {
        unsafe { asm!("dc civac, {}", in(reg) addr, options(nostack, preserves_flags)) }
    }

    /// No dedicated weaker flush exists; same as `flush`.
    #[inline(always)]
    unsafe fn flush_optimized(addr: *const u8) {
        unsafe { Self::flush(addr) }
    }

    #[inline(always)]
    fn fence_all() {
        unsafe { asm!("dsb sy", options(nostack, preserves_flags)) }
    }

    #[inline(always)]
    fn fence_stores() {
        unsafe { asm!("dsb st", options(nostack, preserves_flags)) }
    }

    #[inline(always)]
    fn fence_loads() {
        unsafe { asm!("dsb ld", options(nostack, preserves_flags)) }
    }

    #[inline(always)]
    fn serialize() {
        unsafe { asm!("isb", options(nostack, preserves_flags)) }
    }

    #[inline(always)]
    fn cycle_counter() -> u64 {
        let cnt: u64;
        unsafe { asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nomem, nostack, preserves_flags)) };
        cnt
    }

    #[inline(always)]
    fn cycle_counter_serialized() -> u64 {
        let cnt: u64;
        unsafe {
            asm!("isb", "mrs {}, cntvct_el0", out(reg) cnt, options(nostack, preserves_flags))
        };
        cnt
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            flush: Support::Native,
            flush_optimized: Support::Fallback,
            fences: Support::Native,
            serialize: Support::Native,
            cycle_counter: Support::Native,
        }
    }
}
