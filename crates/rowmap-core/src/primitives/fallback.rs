use super::{Capabilities, Primitives, Support, wall_clock_nanos};
use std::sync::atomic::{Ordering, fence};

/// Portable primitives for targets without a dedicated implementation.
///
/// Flushing and serialization are no-ops, so timing measurements on these targets include
/// cache hits. Fences map to atomic fences, the cycle counter to the monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generic;

impl Primitives for Generic {
    const NAME: &'static str = "generic";

    unsafe fn flush(_addr: *const u8) {}

    unsafe fn flush_optimized(_addr: *const u8) {}

    fn fence_all() {
        fence(Ordering::SeqCst)
    }

    fn fence_stores() {
        fence(Ordering::Release)
    }

    fn fence_loads() {
        fence(Ordering::Acquire)
    }

    fn serialize() {}

    fn cycle_counter() -> u64 {
        wall_clock_nanos()
    }

    fn cycle_counter_serialized() -> u64 {
        fence(Ordering::SeqCst);
        wall_clock_nanos()
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            flush: Support::NoOp,
            flush_optimized: Support::NoOp,
            fences: Support::Fallback,
            serialize: Support::NoOp,
            cycle_counter: Support::Fallback,
        }
    }
}
