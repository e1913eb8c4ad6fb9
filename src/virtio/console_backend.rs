//! Guest-facing virtual console (spec §4.5 "Guest-facing back-ends"): a
//! two-queue VirtIO console presenting `receiveq(0)`/`transmitq(1)` to
//! the guest, backed by host-side byte sources/sinks the caller owns.

use arrayvec::ArrayVec;

use super::virtqueue::{pop, push, should_notify, Descriptor};
use super::Device;
use crate::error::{HvError, HvResult};
use crate::hal::GuestMemory;
use crate::param::MAX_CHAIN_LEN;

const RECEIVEQ: u32 = 0;
const TRANSMITQ: u32 = 1;

/// Drain every chain on the guest's transmit queue, feeding each byte to
/// `sink` (a host UART, log sink, ...), and publish completion. Returns
/// whether the guest should be notified (spec §4.5 `notify_guest`).
pub fn drain_transmitq(dev: &mut Device, mem: &dyn GuestMemory, vm_id: u32, mut sink: impl FnMut(u8)) -> HvResult<bool> {
    let vq = dev.queues.get_mut(TRANSMITQ as usize).ok_or(HvError::BadParameter)?;
    let mut any = false;
    let mut chain: ArrayVec<Descriptor, MAX_CHAIN_LEN> = ArrayVec::new();

    while let Some(head) = pop(vq, mem, vm_id, &mut chain)? {
        let mut total = 0u32;
        for desc in chain.iter() {
            let ptr = mem
                .translate(vm_id, desc.addr as usize, desc.len as usize)
                .ok_or(HvError::BadParameter)?;
            let bytes = unsafe { core::slice::from_raw_parts(ptr, desc.len as usize) };
            for &b in bytes {
                sink(b);
            }
            total += desc.len;
        }
        push(vq, mem, vm_id, head, total)?;
        any = true;
    }

    if any {
        should_notify(vq, mem, vm_id)
    } else {
        Ok(false)
    }
}

/// Fill available receive buffers from `source` until either the guest
/// has no free buffers left or `source` runs dry. Returns whether the
/// guest should be notified.
pub fn fill_receiveq(dev: &mut Device, mem: &dyn GuestMemory, vm_id: u32, mut source: impl FnMut() -> Option<u8>) -> HvResult<bool> {
    let vq = dev.queues.get_mut(RECEIVEQ as usize).ok_or(HvError::BadParameter)?;
    let mut any = false;
    let mut chain: ArrayVec<Descriptor, MAX_CHAIN_LEN> = ArrayVec::new();

    loop {
        let Some(head) = pop(vq, mem, vm_id, &mut chain)? else {
            break;
        };
        let mut written = 0u32;
        'fill: for desc in chain.iter() {
            let ptr = mem
                .translate(vm_id, desc.addr as usize, desc.len as usize)
                .ok_or(HvError::BadParameter)?;
            for i in 0..desc.len {
                match source() {
                    Some(b) => unsafe { core::ptr::write_volatile(ptr.add(i as usize), b) },
                    None => break 'fill,
                }
                written += 1;
            }
        }
        push(vq, mem, vm_id, head, written)?;
        any = true;
        if written == 0 {
            break;
        }
    }

    if any {
        should_notify(vq, mem, vm_id)
    } else {
        Ok(false)
    }
}
