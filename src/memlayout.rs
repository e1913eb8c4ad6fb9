//! Fixed host-side physical memory layout (spec §6).
//!
//! Values mirror qemu's `virt` machine the way the teacher's own
//! `memlayout.rs` documents its target's layout, adapted to the
//! addresses spec.md's boot/memory-layout section specifies.

/// One guest image slot's fixed load addresses.
#[derive(Debug, Clone, Copy)]
pub struct ImageSlot {
    pub bin_load_addr: usize,
    pub dtb_load_addr: usize,
    pub fs_load_addr: usize,
    pub smp_num: usize,
}

pub const IMAGE_SLOT_0: ImageSlot = ImageSlot {
    bin_load_addr: 0x70200000,
    dtb_load_addr: 0x70000000,
    fs_load_addr: 0x78000000,
    smp_num: 4,
};

pub const IMAGE_SLOT_1: ImageSlot = ImageSlot {
    bin_load_addr: 0x50200000,
    dtb_load_addr: 0x50000000,
    fs_load_addr: 0x58000000,
    smp_num: 4,
};

pub const IMAGE_SLOTS: [ImageSlot; 2] = [IMAGE_SLOT_0, IMAGE_SLOT_1];

/// Base of the virtual distributor MMIO window. The window spans
/// `[GICD_BASE, GICD_BASE + GICD_WINDOW_SIZE)` (`0x10000`, spec §4.2.1/§6).
pub const GICD_BASE: usize = 0x08000000;

/// Base of the front-end VirtIO MMIO scan region: 32 device slots of
/// `0x200` bytes each (spec §6).
pub const VIRTIO_FRONTEND_BASE: usize = 0x0A000000;

/// Base of the per-VM back-end VirtIO MMIO address space: `0x0A000000 +
/// vm_id * 0x10000`, `0x1000` per device (spec §6).
pub const VIRTIO_BACKEND_BASE: usize = 0x0A000000;

pub const VIRTIO_BACKEND_VM_STRIDE: usize = 0x10000;

/// Physical address of the `vm_id`-th VM's VirtIO back-end window base.
pub const fn virtio_backend_vm_base(vm_id: usize) -> usize {
    VIRTIO_BACKEND_BASE + vm_id * VIRTIO_BACKEND_VM_STRIDE
}

/// Physical address of the front-end scan slot at index `slot`.
pub const fn virtio_frontend_slot(slot: usize) -> usize {
    VIRTIO_FRONTEND_BASE + slot * crate::param::VIRTIO_FRONTEND_SLOT_SIZE
}
