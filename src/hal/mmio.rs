//! The `mmio` external collaborator contract (spec §6): raw MMIO access
//! with explicit fences, plus a `GuestMemory` contract used by the
//! VirtIO transport to reach descriptor/avail/used rings that live in
//! guest physical memory.

/// Raw, fenced MMIO access to real hardware registers (spec §6 `mmio`).
/// Every read/write is followed by a full system-level
/// data-synchronization + instruction-synchronization fence, per §4.1.
pub trait Mmio {
    unsafe fn read8(&self, addr: usize) -> u8;
    unsafe fn read16(&self, addr: usize) -> u16;
    unsafe fn read32(&self, addr: usize) -> u32;
    unsafe fn read64(&self, addr: usize) -> u64;

    unsafe fn write8(&self, addr: usize, val: u8);
    unsafe fn write16(&self, addr: usize, val: u16);
    unsafe fn write32(&self, addr: usize, val: u32);
    unsafe fn write64(&self, addr: usize, val: u64);
}

/// Access to guest physical memory, used to reach virtqueue structures
/// (descriptor table, available ring, used ring) that the guest places
/// at guest-physical addresses it hands the transport through
/// `QUEUE_DESC/AVAIL/USED` (or legacy `QUEUE_PFN`).
///
/// A platform implementation backs this by the stage-2 mapping already
/// established for the VM; this crate never maps memory itself.
pub trait GuestMemory {
    /// Translate a guest-physical address into a host-virtual pointer
    /// valid for at least `len` bytes, or `None` if the range is not
    /// mapped for the requesting VM.
    fn translate(&self, vm_id: u32, gpa: usize, len: usize) -> Option<*mut u8>;

    /// Full system-level data-synchronization + instruction-synchronization
    /// fence, used after guest register writes (spec §4.1) and around
    /// virtqueue index updates (spec §5).
    fn dsb_isb(&self);
}
