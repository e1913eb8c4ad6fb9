//! Error kinds surfaced by the hypervisor core (spec §7).
//!
//! None of these propagate as Rust panics in steady state; the core
//! either degrades gracefully (RAZ/WI on unknown MMIO) or returns one of
//! these to its caller, who maps it onto the appropriate guest-visible
//! or host-visible outcome.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvError {
    /// Invalid IRQ id, misaligned entry point, out-of-range queue index,
    /// or an access width that doesn't match a 32-bit-only register.
    BadParameter,
    /// PSCI target vCPU unknown, or a VirtIO device scan found nothing.
    NotPresent,
    /// PSCI `CPU_ON` requested a target already in a runnable state.
    AlreadyOn,
    /// All list registers are occupied; injection deferred. Internal only,
    /// never surfaced to the guest.
    Busy,
    /// A host block front-end request did not complete within its bounded
    /// poll budget.
    Timeout,
    /// A VirtIO device reported a non-zero status byte.
    DeviceError,
    /// Access to a reserved or unmodeled MMIO register. Reads degrade to
    /// zero; writes are dropped.
    Unsupported,
}

impl fmt::Display for HvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            HvError::BadParameter => "bad parameter",
            HvError::NotPresent => "not present",
            HvError::AlreadyOn => "already on",
            HvError::Busy => "busy",
            HvError::Timeout => "timeout",
            HvError::DeviceError => "device error",
            HvError::Unsupported => "unsupported",
        };
        f.write_str(msg)
    }
}

pub type HvResult<T> = Result<T, HvError>;
