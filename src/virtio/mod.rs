//! VirtIO MMIO transport + split-virtqueue plane (spec §3 "VirtIO
//! device"/"Virtqueue", §4.5): register semantics common to every
//! VirtIO 1.0/legacy device, a host block front-end that drives a real
//! device, and guest-facing console/block back-ends.

pub mod blk_backend;
pub mod blk_frontend;
pub mod console_backend;
pub mod transport;
pub mod virtqueue;

pub use virtqueue::{DescFlags, Descriptor, VirtQueue};

use bitflags::bitflags;

use crate::param::MAX_QUEUES;

/// `"virt"` as a little-endian u32 (spec §4.5 `MAGIC`).
pub const MAGIC_VALUE: u32 = 0x7472_6976;

pub const BLOCK_DEVICE_ID: u32 = 2;
pub const CONSOLE_DEVICE_ID: u32 = 3;

bitflags! {
    /// VirtIO device status bits (spec §3 invariant: strictly growing
    /// through ACK → DRIVER → FEATURES_OK → DRIVER_OK until a reset).
    pub struct DeviceStatus: u32 {
        const ACKNOWLEDGE = 0b0000_0001;
        const DRIVER = 0b0000_0010;
        const DRIVER_OK = 0b0000_0100;
        const FEATURES_OK = 0b0000_1000;
        const DEVICE_NEEDS_RESET = 0b0100_0000;
        const FAILED = 0b1000_0000;
    }
}

bitflags! {
    pub struct BlockFeatures: u64 {
        const RO = 1 << 5;
        const SCSI = 1 << 7;
        const CONFIG_WCE = 1 << 11;
        const MQ = 1 << 12;
        const ANY_LAYOUT = 1 << 27;
        const RING_INDIRECT_DESC = 1 << 28;
        const RING_EVENT_IDX = 1 << 29;
    }
}

/// Which guest-facing device model a [`Device`] presents. Stands in for
/// the original's `queue_notify`/`reset` function pointers with a
/// tagged variant and exhaustive match (spec §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Block,
    Console,
}

/// Device-specific configuration blob (spec §3 `Device.config`).
#[derive(Debug, Clone, Copy)]
pub enum DeviceConfig {
    Block { capacity_sectors: u64 },
    Console,
}

/// A VirtIO device, front-end or back-end, virtual or a handle onto a
/// real host device (spec §3).
pub struct Device {
    pub device_id: u32,
    pub vendor_id: u32,
    pub version: u32,
    pub base_addr: usize,
    pub irq: u32,
    pub status: u32,
    pub device_features: u64,
    pub driver_features: u64,
    pub features_sel: u32,
    pub queue_sel: u32,
    pub interrupt_status: u32,
    pub config_generation: u32,
    pub num_queues: usize,
    pub queues: [VirtQueue; MAX_QUEUES],
    pub kind: DeviceKind,
    pub config: DeviceConfig,
    /// Legacy-transport guest page size, set by a `GUEST_PAGE_SIZE`
    /// write (spec "SUPPLEMENTED FEATURES": legacy PFN/ALIGN path).
    pub guest_page_size: u32,
    /// Legacy-transport ring alignment, set by a `QUEUE_ALIGN` write.
    pub legacy_align: u32,
}

impl Device {
    pub fn new(device_id: u32, kind: DeviceKind, config: DeviceConfig, irq: u32, base_addr: usize) -> Self {
        Self {
            device_id,
            vendor_id: 0x554d_4551, // "QEMU", matching the teacher's VENDOR_ID.
            version: 2,
            base_addr,
            irq,
            status: 0,
            device_features: 0,
            driver_features: 0,
            features_sel: 0,
            queue_sel: 0,
            interrupt_status: 0,
            config_generation: 0,
            num_queues: MAX_QUEUES,
            queues: [VirtQueue::new(); MAX_QUEUES],
            kind,
            config,
            guest_page_size: 4096,
            legacy_align: 4096,
        }
    }

    /// Reset to power-on state (spec §4.5: "write to STATUS with value 0
    /// invokes the device `reset` callback"; spec §3 invariant: resets
    /// `status` to 0).
    pub fn reset(&mut self) {
        self.status = 0;
        self.driver_features = 0;
        self.features_sel = 0;
        self.queue_sel = 0;
        self.interrupt_status = 0;
        self.queues = [VirtQueue::new(); MAX_QUEUES];
    }

    pub fn current_queue(&self) -> Option<&VirtQueue> {
        self.queues.get(self.queue_sel as usize)
    }

    pub fn current_queue_mut(&mut self) -> Option<&mut VirtQueue> {
        self.queues.get_mut(self.queue_sel as usize)
    }
}
