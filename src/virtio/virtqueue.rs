//! Split-virtqueue plane (spec §3 "Virtqueue", §4.5 "Split-virtqueue
//! operations"): descriptor table, available ring, and used ring living
//! in guest physical memory, reached through [`GuestMemory::translate`].

use core::sync::atomic::{fence, Ordering};

use arrayvec::ArrayVec;
use bitflags::bitflags;

use crate::error::{HvError, HvResult};
use crate::hal::GuestMemory;
use crate::param::MAX_CHAIN_LEN;

bitflags! {
    pub struct DescFlags: u16 {
        /// Chained with another descriptor via `next`.
        const NEXT = 0b001;
        /// Device writes this descriptor's buffer (vs. reads it).
        const WRITE = 0b010;
        const INDIRECT = 0b100;
    }
}

/// One split-ring descriptor (spec §3), 16 bytes, matching the VirtIO
/// wire layout bit-for-bit so it can be read directly out of guest memory.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub addr: u64,
    pub len: u32,
    pub flags: u16,
    pub next: u16,
}

bitflags! {
    pub struct UsedFlags: u16 {
        const NO_NOTIFY = 0b1;
    }
}

/// A split virtqueue's control state (spec §3). The descriptor/avail/
/// used rings themselves stay in guest memory at `desc_addr`/
/// `avail_addr`/`used_addr`; this struct only tracks where they are and
/// how far the device has consumed/produced.
#[derive(Debug, Clone, Copy)]
pub struct VirtQueue {
    pub num: u16,
    pub ready: bool,
    pub last_avail_idx: u16,
    /// Host-side shadow of the used ring's producer index (spec §3
    /// invariant: `used.idx` only ever matches this right after `push`).
    pub used_idx: u16,
    pub desc_addr: usize,
    pub avail_addr: usize,
    pub used_addr: usize,
}

impl VirtQueue {
    pub const fn new() -> Self {
        Self {
            num: 0,
            ready: false,
            last_avail_idx: 0,
            used_idx: 0,
            desc_addr: 0,
            avail_addr: 0,
            used_addr: 0,
        }
    }

    fn avail_idx_addr(&self) -> usize {
        self.avail_addr + 2
    }

    fn avail_ring_addr(&self, slot: u16) -> usize {
        self.avail_addr + 4 + slot as usize * 2
    }

    fn used_flags_addr(&self) -> usize {
        self.used_addr
    }

    fn used_idx_addr(&self) -> usize {
        self.used_addr + 2
    }

    fn used_ring_addr(&self, slot: u16) -> usize {
        self.used_addr + 4 + slot as usize * 8
    }

    fn desc_addr_of(&self, idx: u16) -> usize {
        self.desc_addr + idx as usize * core::mem::size_of::<Descriptor>()
    }
}

impl Default for VirtQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u16(mem: &dyn GuestMemory, vm_id: u32, gpa: usize) -> HvResult<u16> {
    let ptr = mem.translate(vm_id, gpa, 2).ok_or(HvError::BadParameter)?;
    Ok(unsafe { core::ptr::read_volatile(ptr as *const u16) })
}

fn write_u16(mem: &dyn GuestMemory, vm_id: u32, gpa: usize, val: u16) -> HvResult<()> {
    let ptr = mem.translate(vm_id, gpa, 2).ok_or(HvError::BadParameter)?;
    unsafe { core::ptr::write_volatile(ptr as *mut u16, val) };
    Ok(())
}

fn read_u32(mem: &dyn GuestMemory, vm_id: u32, gpa: usize) -> HvResult<u32> {
    let ptr = mem.translate(vm_id, gpa, 4).ok_or(HvError::BadParameter)?;
    Ok(unsafe { core::ptr::read_volatile(ptr as *const u32) })
}

fn write_u32(mem: &dyn GuestMemory, vm_id: u32, gpa: usize, val: u32) -> HvResult<()> {
    let ptr = mem.translate(vm_id, gpa, 4).ok_or(HvError::BadParameter)?;
    unsafe { core::ptr::write_volatile(ptr as *mut u32, val) };
    Ok(())
}

fn read_descriptor(mem: &dyn GuestMemory, vm_id: u32, gpa: usize) -> HvResult<Descriptor> {
    let size = core::mem::size_of::<Descriptor>();
    let ptr = mem.translate(vm_id, gpa, size).ok_or(HvError::BadParameter)?;
    Ok(unsafe { core::ptr::read_unaligned(ptr as *const Descriptor) })
}

/// `pop(vq, &chain) -> head_idx` (spec §4.5): when the guest has made a
/// new chain available, walk it (at most [`MAX_CHAIN_LEN`] descriptors),
/// append each descriptor to `chain`, and return its head index.
/// Returns `Ok(None)` when there is nothing new to pop.
pub fn pop(
    vq: &mut VirtQueue,
    mem: &dyn GuestMemory,
    vm_id: u32,
    chain: &mut ArrayVec<Descriptor, MAX_CHAIN_LEN>,
) -> HvResult<Option<u16>> {
    chain.clear();
    fence(Ordering::Acquire);
    let avail_idx = read_u16(mem, vm_id, vq.avail_idx_addr())?;
    if avail_idx == vq.last_avail_idx {
        return Ok(None);
    }

    let slot = vq.last_avail_idx % vq.num;
    let head = read_u16(mem, vm_id, vq.avail_ring_addr(slot))?;
    if head >= vq.num {
        return Err(HvError::BadParameter);
    }

    let mut idx = head;
    let mut seen: ArrayVec<u16, MAX_CHAIN_LEN> = ArrayVec::new();
    loop {
        if seen.contains(&idx) {
            // Cycle: a memory-safety-relevant invariant violation (spec
            // §7: "assertions are permitted only on invariants that
            // imply memory-safety catastrophe").
            return Err(HvError::BadParameter);
        }
        if seen.is_full() {
            return Err(HvError::BadParameter);
        }
        seen.push(idx);

        let desc = read_descriptor(mem, vm_id, vq.desc_addr_of(idx))?;
        chain
            .try_push(desc)
            .map_err(|_| HvError::BadParameter)?;

        if desc.flags & DescFlags::NEXT.bits() == 0 {
            break;
        }
        idx = desc.next;
        if idx >= vq.num {
            return Err(HvError::BadParameter);
        }
    }

    vq.last_avail_idx = vq.last_avail_idx.wrapping_add(1);
    Ok(Some(head))
}

/// `push(vq, head_idx, used_len)` (spec §4.5): publish completion of the
/// chain headed by `head_idx` into the used ring.
pub fn push(vq: &mut VirtQueue, mem: &dyn GuestMemory, vm_id: u32, head_idx: u16, used_len: u32) -> HvResult<()> {
    let slot = vq.used_idx % vq.num;
    write_u32(mem, vm_id, vq.used_ring_addr(slot), head_idx as u32)?;
    write_u32(mem, vm_id, vq.used_ring_addr(slot) + 4, used_len)?;

    fence(Ordering::Release);

    vq.used_idx = vq.used_idx.wrapping_add(1);
    write_u16(mem, vm_id, vq.used_idx_addr(), vq.used_idx)?;

    fence(Ordering::Release);
    Ok(())
}

/// True iff the guest has *not* requested suppressed notifications
/// (`used.flags & NO_NOTIFY == 0`, spec §4.5 `notify_guest`).
pub fn should_notify(vq: &VirtQueue, mem: &dyn GuestMemory, vm_id: u32) -> HvResult<bool> {
    let flags = read_u16(mem, vm_id, vq.used_flags_addr())?;
    Ok(flags & UsedFlags::NO_NOTIFY.bits() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// A flat byte-addressable guest memory backing, for exercising
    /// `pop`/`push` without a real stage-2 mapping.
    struct FakeMem {
        bytes: RefCell<Vec<u8>>,
    }

    impl FakeMem {
        fn new(size: usize) -> Self {
            Self {
                bytes: RefCell::new(vec![0u8; size]),
            }
        }
    }

    impl GuestMemory for FakeMem {
        fn translate(&self, _vm_id: u32, gpa: usize, len: usize) -> Option<*mut u8> {
            let buf = self.bytes.borrow();
            if gpa + len > buf.len() {
                return None;
            }
            Some(buf.as_ptr().wrapping_add(gpa) as *mut u8)
        }

        fn dsb_isb(&self) {}
    }

    const NUM: u16 = 4;
    const DESC_BASE: usize = 0;
    const AVAIL_BASE: usize = DESC_BASE + NUM as usize * core::mem::size_of::<Descriptor>();
    const USED_BASE: usize = AVAIL_BASE + 4 + NUM as usize * 2;

    fn make_vq() -> VirtQueue {
        VirtQueue {
            num: NUM,
            ready: true,
            last_avail_idx: 0,
            used_idx: 0,
            desc_addr: DESC_BASE,
            avail_addr: AVAIL_BASE,
            used_addr: USED_BASE,
        }
    }

    fn write_desc(mem: &FakeMem, vq: &VirtQueue, idx: u16, d: Descriptor) {
        let gpa = vq.desc_addr_of(idx);
        let ptr = mem.translate(0, gpa, core::mem::size_of::<Descriptor>()).unwrap();
        unsafe { core::ptr::write_unaligned(ptr as *mut Descriptor, d) };
    }

    fn publish_avail(mem: &FakeMem, vq: &VirtQueue, slot: u16, head: u16, new_idx: u16) {
        write_u16(mem, 0, vq.avail_ring_addr(slot), head).unwrap();
        fence(Ordering::Release);
        write_u16(mem, 0, vq.avail_idx_addr(), new_idx).unwrap();
    }

    #[test]
    fn pop_nothing_new_returns_none() {
        let mem = FakeMem::new(USED_BASE + 4 + NUM as usize * 8);
        let mut vq = make_vq();
        let mut chain = ArrayVec::new();
        assert_eq!(pop(&mut vq, &mem, 0, &mut chain).unwrap(), None);
    }

    #[test]
    fn pop_walks_a_two_descriptor_chain() {
        let mem = FakeMem::new(USED_BASE + 4 + NUM as usize * 8);
        let mut vq = make_vq();
        write_desc(
            &mem,
            &vq,
            0,
            Descriptor { addr: 0x1000, len: 16, flags: DescFlags::NEXT.bits(), next: 1 },
        );
        write_desc(
            &mem,
            &vq,
            1,
            Descriptor { addr: 0x2000, len: 512, flags: DescFlags::WRITE.bits(), next: 0 },
        );
        publish_avail(&mem, &vq, 0, 0, 1);

        let mut chain = ArrayVec::new();
        let head = pop(&mut vq, &mem, 0, &mut chain).unwrap();
        assert_eq!(head, Some(0));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[1].addr, 0x2000);
        assert_eq!(vq.last_avail_idx, 1);
    }

    #[test]
    fn pop_rejects_a_cyclic_chain() {
        let mem = FakeMem::new(USED_BASE + 4 + NUM as usize * 8);
        let mut vq = make_vq();
        write_desc(
            &mem,
            &vq,
            0,
            Descriptor { addr: 0x1000, len: 16, flags: DescFlags::NEXT.bits(), next: 1 },
        );
        write_desc(
            &mem,
            &vq,
            1,
            Descriptor { addr: 0x2000, len: 16, flags: DescFlags::NEXT.bits(), next: 0 },
        );
        publish_avail(&mem, &vq, 0, 0, 1);

        let mut chain = ArrayVec::new();
        assert_eq!(pop(&mut vq, &mem, 0, &mut chain), Err(HvError::BadParameter));
    }

    #[test]
    fn push_advances_used_idx_by_one() {
        let mem = FakeMem::new(USED_BASE + 4 + NUM as usize * 8);
        let mut vq = make_vq();
        push(&mut vq, &mem, 0, 3, 512).unwrap();
        assert_eq!(vq.used_idx, 1);
        let published = read_u16(&mem, 0, vq.used_idx_addr()).unwrap();
        assert_eq!(published, 1);
    }

    #[test]
    fn should_notify_respects_no_notify_flag() {
        let mem = FakeMem::new(USED_BASE + 4 + NUM as usize * 8);
        let vq = make_vq();
        assert!(should_notify(&vq, &mem, 0).unwrap());
        write_u16(&mem, 0, vq.used_flags_addr(), UsedFlags::NO_NOTIFY.bits()).unwrap();
        assert!(!should_notify(&vq, &mem, 0).unwrap());
    }
}
