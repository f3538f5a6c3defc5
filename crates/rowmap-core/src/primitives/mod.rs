//! Hardware primitives for timing-sensitive memory accesses.
//!
//! Every operation is defined once by the [`Primitives`] trait and implemented per target
//! architecture. Exactly one implementation is selected at build time and exported as
//! [`Native`]; the free functions in this module forward to it, so callers never need to
//! name the platform.
//!
//! | operation                | x86_64           | aarch64                   | other targets            |
//! |--------------------------|------------------|---------------------------|--------------------------|
//! | [`flush`]                | `clflush`        | `dc civac`                | no-op                    |
//! | [`flush_optimized`]      | `clflushopt`[^1] | `dc civac` (fallback)     | no-op                    |
//! | [`fence_all`]            | `mfence`         | `dsb sy`                  | `SeqCst` atomic fence    |
//! | [`fence_stores`]         | `sfence`         | `dsb st`                  | `Release` atomic fence   |
//! | [`fence_loads`]          | `lfence`         | `dsb ld`                  | `Acquire` atomic fence   |
//! | [`serialize`]            | `cpuid`          | `isb`                     | no-op                    |
//! | [`cycle_counter`]        | `rdtsc`          | `cntvct_el0`              | monotonic clock (ns)     |
//! | [`cycle_counter_serialized`] | `rdtscp`     | `isb; cntvct_el0`         | monotonic clock (ns)     |
//!
//! [^1]: Falls back to `clflush` when CPUID does not report `clflushopt`.
//!
//! Degraded operations are reported through [`capabilities`]; a [`Support::NoOp`] entry means
//! the call returns without any hardware effect.

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod fallback;
#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use self::aarch64::Arm64 as Native;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub use self::fallback::Generic as Native;
#[cfg(target_arch = "x86_64")]
pub use self::x86_64::X86_64 as Native;

use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// How an operation is realised on the current platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Support {
    /// The dedicated instruction is used
    Native,
    /// A weaker or slower substitute with the same contract is used
    Fallback,
    /// The operation returns without any hardware effect
    NoOp,
}

/// Support level of each primitive on the running platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// [`flush`]
    pub flush: Support,
    /// [`flush_optimized`]
    pub flush_optimized: Support,
    /// [`fence_all`], [`fence_stores`] and [`fence_loads`]
    pub fences: Support,
    /// [`serialize`]
    pub serialize: Support,
    /// [`cycle_counter`] and [`cycle_counter_serialized`]
    pub cycle_counter: Support,
}

impl Display for Capabilities {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flush: {:?}, flush_optimized: {:?}, fences: {:?}, serialize: {:?}, cycle_counter: {:?}",
            self.flush, self.flush_optimized, self.fences, self.serialize, self.cycle_counter
        )
    }
}

/// Platform primitives used by timing-sensitive code.
///
/// None of these operations can fail. Unsupported operations degrade to the behaviour
/// announced by [`Primitives::capabilities`].
pub trait Primitives {
    /// Short platform name used in log output.
    const NAME: &'static str;

    /// Evicts the cache line containing `addr` from all cache levels.
    ///
    /// # Safety
    ///
    /// `addr` must point into a mapped, readable memory region.
    unsafe fn flush(addr: *const u8);

    /// Like [`Primitives::flush`] with weaker ordering against other memory operations.
    ///
    /// # Safety
    ///
    /// `addr` must point into a mapped, readable memory region.
    unsafe fn flush_optimized(addr: *const u8);

    /// All prior loads and stores are globally visible before any later load or store.
    fn fence_all();

    /// All prior stores are globally visible before any later store.
    fn fence_stores();

    /// All prior loads complete before any later load.
    fn fence_loads();

    /// Drains the instruction pipeline.
    fn serialize();

    /// Reads the cycle counter without waiting for prior instructions.
    fn cycle_counter() -> u64;

    /// Reads the cycle counter after all prior instructions have executed.
    fn cycle_counter_serialized() -> u64;

    /// Reports how each operation is realised.
    fn capabilities() -> Capabilities;
}

/// Evicts the cache line containing `addr`. See [`Primitives::flush`].
///
/// # Safety
///
/// `addr` must point into a mapped, readable memory region.
#[inline(always)]
pub unsafe fn flush(addr: *const u8) {
    unsafe { Native::flush(addr) }
}

/// Throughput-optimised flush. See [`Primitives::flush_optimized`].
///
/// # Safety
///
/// `addr` must point into a mapped, readable memory region.
#[inline(always)]
pub unsafe fn flush_optimized(addr: *const u8) {
    unsafe { Native::flush_optimized(addr) }
}

/// Full memory barrier.
#[inline(always)]
pub fn fence_all() {
    Native::fence_all()
}

/// Store barrier.
#[inline(always)]
pub fn fence_stores() {
    Native::fence_stores()
}

/// Load barrier.
#[inline(always)]
pub fn fence_loads() {
    Native::fence_loads()
}

/// Pipeline serialization. A no-op on targets where [`capabilities`] reports [`Support::NoOp`].
#[inline(always)]
pub fn serialize() {
    Native::serialize()
}

/// Unserialized cycle counter read.
#[inline(always)]
pub fn cycle_counter() -> u64 {
    Native::cycle_counter()
}

/// Serialized cycle counter read.
#[inline(always)]
pub fn cycle_counter_serialized() -> u64 {
    Native::cycle_counter_serialized()
}

/// Support levels of the primitives selected for this build.
pub fn capabilities() -> Capabilities {
    Native::capabilities()
}

/// Monotonic OS clock in nanoseconds.
///
/// Independent of [`cycle_counter`]: different unit and epoch, meant for coarse bookkeeping.
pub fn wall_clock_nanos() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC with a valid timespec cannot fail
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Measures one access to `addr` served from main memory, in cycle counter ticks.
///
/// The line is flushed and fenced before the timed load.
///
/// # Safety
///
/// `addr` must point into a mapped, readable memory region.
pub unsafe fn time_access(addr: *const u8) -> u64 {
    unsafe {
        flush(addr);
        fence_all();
        let start = cycle_counter_serialized();
        let _ = std::ptr::read_volatile(addr);
        let end = cycle_counter_serialized();
        end.saturating_sub(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_counter_monotonic() {
        let mut prev = cycle_counter();
        for _ in 0..1000 {
            let now = cycle_counter_serialized();
            assert!(now >= prev, "{} < {}", now, prev);
            prev = now;
        }
    }

    #[test]
    fn test_wall_clock_monotonic() {
        let a = wall_clock_nanos();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = wall_clock_nanos();
        assert!(b >= a + 1_000_000);
    }

    #[test]
    fn test_flush_and_fences_on_owned_memory() {
        let buf = vec![0x5au8; 4096];
        for line in buf.chunks(crate::util::CL_SIZE) {
            unsafe {
                flush(line.as_ptr());
                flush_optimized(line.as_ptr());
            }
        }
        fence_all();
        fence_stores();
        fence_loads();
        serialize();
        assert!(buf.iter().all(|&b| b == 0x5a));
    }

    #[test]
    fn test_time_access() {
        let buf = vec![1u8; 64];
        let ticks = unsafe { time_access(buf.as_ptr()) };
        assert!(ticks < u64::MAX);
    }

    #[test]
    fn test_capabilities_display() {
        let caps = capabilities().to_string();
        assert!(caps.starts_with("flush: "));
        assert!(caps.contains("cycle_counter: "));
        assert!(!Native::NAME.is_empty());
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_capabilities_x86_64() {
        let caps = capabilities();
        assert_eq!(caps.flush, Support::Native);
        assert_eq!(caps.serialize, Support::Native);
        assert_eq!(caps.cycle_counter, Support::Native);
        assert_ne!(caps.flush_optimized, Support::NoOp);
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_capabilities_aarch64() {
        let caps = capabilities();
        assert_eq!(caps.flush, Support::Native);
        assert_eq!(caps.flush_optimized, Support::Fallback);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn test_capabilities_generic_are_degraded() {
        let caps = capabilities();
        assert_eq!(caps.flush, Support::NoOp);
        assert_eq!(caps.serialize, Support::NoOp);
        assert_eq!(caps.cycle_counter, Support::Fallback);
    }
}
