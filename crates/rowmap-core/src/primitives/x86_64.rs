use super::{Capabilities, Primitives, Support};
use lazy_static::lazy_static;
use std::arch::asm;
use std::arch::x86_64::{
    __cpuid, __cpuid_count, __rdtscp, _mm_clflush, _mm_lfence, _mm_mfence, _mm_sfence, _rdtsc,
};

lazy_static! {
    /// CPUID.(EAX=07H, ECX=0):EBX[bit 23]
    static ref HAS_CLFLUSHOPT: bool = {
        let max_leaf = unsafe { __cpuid(0) }.eax;
        max_leaf >= 7 && unsafe { __cpuid_count(7, 0) }.ebx & (1 << 23) != 0
    };
}

/// x86_64 primitives.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86_64;

impl Primitives for X86_64 {
    const NAME: &'static str = "x86_64";

    #[inline(always)]
    unsafe fn flush(addr: *const u8) {
        unsafe { _mm_clflush(addr) }
    }

    #[inline(always)]
    unsafe fn flush_optimized(addr: *const u8) {
        if *HAS_CLFLUSHOPT {
            unsafe { asm!("clflushopt [{}]", in(reg) addr, options(nostack, preserves_flags)) }
        } else {
            unsafe { _mm_clflush(addr) }
        }
    }

    #[inline(always)]
    fn fence_all() {
        unsafe { _mm_mfence() }
    }

    #[inline(always)]
    fn fence_stores() {
        unsafe { _mm_sfence() }
    }

    #[inline(always)]
    fn fence_loads() {
        unsafe { _mm_lfence() }
    }

    #[inline(always)]
    fn serialize() {
        unsafe { __cpuid(0) };
    }

    #[inline(always)]
    fn cycle_counter() -> u64 {
        unsafe { _rdtsc() }
    }

    #[inline(always)]
    fn cycle_counter_serialized() -> u64 {
        let mut aux = 0;
        unsafe { __rdtscp(&mut aux) }
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            flush: Support::Native,
            flush_optimized: if *HAS_CLFLUSHOPT {
                Support::Native
            } else {
                Support::Fallback
            },
            fences: Support::Native,
            serialize: Support::Native,
            cycle_counter: Support::Native,
        }
    }
}
