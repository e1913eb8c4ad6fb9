//! Guest-facing virtual block device (spec §4.5 "Guest-facing back-ends"):
//! translates requests a guest submits on its own virtqueue into calls
//! against the host block front-end, matching the three-descriptor
//! `(header | data | status)` wire format the teacher's own guest driver
//! (`virtio_disk.rs`) expects from a virtio-blk device.

use core::mem::size_of;

use arrayvec::ArrayVec;

use super::blk_frontend::BlockFrontend;
use super::virtqueue::{pop, push, should_notify, Descriptor};
use super::Device;
use crate::error::{HvError, HvResult};
use crate::hal::{GuestMemory, Mmio};
use crate::param::MAX_CHAIN_LEN;

const REQUESTQ: u32 = 0;
const TYPE_IN: u32 = 0;
const TYPE_OUT: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy)]
struct RequestHeader {
    typ: u32,
    reserved: u32,
    sector: u64,
}

/// Drain every chain the guest has made available on its request queue,
/// forwarding each to the host front-end and publishing completion.
/// Returns whether the guest should be notified (spec §4.5
/// `notify_guest`).
pub fn handle_queue_notify(
    dev: &mut Device,
    mem: &dyn GuestMemory,
    vm_id: u32,
    mmio: &dyn Mmio,
    frontend: &mut BlockFrontend,
    queue_idx: u32,
) -> HvResult<bool> {
    if queue_idx != REQUESTQ {
        return Ok(false);
    }
    let vq = dev.queues.get_mut(queue_idx as usize).ok_or(HvError::BadParameter)?;
    let mut any = false;
    let mut chain: ArrayVec<Descriptor, MAX_CHAIN_LEN> = ArrayVec::new();

    while let Some(head) = pop(vq, mem, vm_id, &mut chain)? {
        let status = match service_request(mem, vm_id, mmio, frontend, &chain) {
            Ok(()) => 0u8,
            Err(_) => 1u8,
        };
        let used_len = if let Some(status_desc) = chain.last() {
            write_status(mem, vm_id, status_desc, status)?;
            status_desc.len
        } else {
            0
        };
        push(vq, mem, vm_id, head, used_len)?;
        any = true;
    }

    if any {
        should_notify(vq, mem, vm_id)
    } else {
        Ok(false)
    }
}

fn write_status(mem: &dyn GuestMemory, vm_id: u32, desc: &Descriptor, status: u8) -> HvResult<()> {
    let ptr = mem.translate(vm_id, desc.addr as usize, 1).ok_or(HvError::BadParameter)?;
    unsafe { core::ptr::write_volatile(ptr, status) };
    Ok(())
}

/// A request chain is exactly `(header, data, status)`: read the header,
/// resolve the data descriptor to a host slice, and forward to the
/// front-end. Malformed chains (wrong length, unknown request type) are
/// reported as a device error, matching the status byte the guest would
/// see from a real device that rejected the request.
fn service_request(
    mem: &dyn GuestMemory,
    vm_id: u32,
    mmio: &dyn Mmio,
    frontend: &mut BlockFrontend,
    chain: &ArrayVec<Descriptor, MAX_CHAIN_LEN>,
) -> HvResult<()> {
    if chain.len() < 3 {
        return Err(HvError::BadParameter);
    }
    let header_desc = chain[0];
    let data_desc = chain[1];

    let header_ptr = mem
        .translate(vm_id, header_desc.addr as usize, size_of::<RequestHeader>())
        .ok_or(HvError::BadParameter)?;
    let header = unsafe { core::ptr::read_unaligned(header_ptr as *const RequestHeader) };

    let data_ptr = mem
        .translate(vm_id, data_desc.addr as usize, data_desc.len as usize)
        .ok_or(HvError::BadParameter)?;
    let data = unsafe { core::slice::from_raw_parts_mut(data_ptr, data_desc.len as usize) };

    match header.typ {
        TYPE_IN => frontend.read_sectors(mmio, header.sector, data),
        TYPE_OUT => frontend.write_sectors(mmio, header.sector, data),
        _ => Err(HvError::BadParameter),
    }
}
