//! Fixed capacities for the hypervisor core's arenas and bitmaps.
//!
//! The original design keeps every VM/vCPU/device table as a fixed-size
//! array indexed by a stable handle (see the back-pointer discussion in
//! the design notes); these constants size those arrays.

/// Maximum number of VMs the host can run concurrently.
pub const NVM: usize = 8;

/// Maximum number of vCPUs per VM.
pub const NVCPU_PER_VM: usize = 8;

/// Maximum number of physical CPUs on the host.
pub const NCPU: usize = 8;

/// Exclusive upper bound of the SPI id space. SGI occupy `[0, 16)`, PPI
/// occupy `[16, 32)`, SPI occupy `[32, SPI_MAX)`.
pub const SPI_MAX: usize = 256;

/// Number of 32-bit words needed to hold one bit per IRQ id in `[0, SPI_MAX)`.
pub const SPI_BITMAP_WORDS: usize = (SPI_MAX + 31) / 32;

/// Number of SPI enable words (32 IRQs/word) covering `[32, SPI_MAX)`, kept
/// separate from `SPI_BITMAP_WORDS` because register group 0 of
/// ISENABLER/ICENABLER belongs to the per-vCPU SGI/PPI bank instead.
pub const SCENABLER_WORDS: usize = SPI_BITMAP_WORDS;

/// Number of hardware list registers per vCPU (typical GICv2 implementation).
pub const LR_NUM: usize = 4;

/// Maximum number of virtqueues per VirtIO device.
pub const MAX_QUEUES: usize = 4;

/// Maximum split-virtqueue ring size (must be a power of two, per spec).
pub const VIRTQUEUE_MAX_NUM: usize = 256;

/// Descriptor count of the host block front-end's own virtqueue (power
/// of two; matches the teacher's `virtio_disk.rs::NUM`). Large enough
/// for two in-flight three-descriptor requests.
pub const BLK_FRONTEND_NUM: usize = 8;

/// Maximum number of VirtIO devices (virtual + host front-end) the core
/// tracks at once.
pub const MAX_VIRTIO_DEVICES: usize = 32;

/// Maximum descriptor chain length `pop()` will walk before declaring the
/// chain malformed (spec: "copy at most 16 descriptors").
pub const MAX_CHAIN_LEN: usize = 16;

/// Maximum sectors a single block front-end request may batch.
pub const MAX_BATCH_SECTORS: usize = 128;

/// Sector size in bytes for the host block front-end.
pub const SECTOR_SIZE: usize = 512;

/// Bounded spin budget for the host block front-end's used-ring poll.
pub const BLK_POLL_MAX_SPINS: usize = 1_000_000;

/// Distributor MMIO window size.
pub const GICD_WINDOW_SIZE: usize = 0x10000;

/// Per-device VirtIO MMIO window size presented to a guest by a back-end.
pub const VIRTIO_BACKEND_WINDOW_SIZE: usize = 0x1000;

/// Per-slot VirtIO MMIO window size scanned by the host front-end.
pub const VIRTIO_FRONTEND_SLOT_SIZE: usize = 0x200;

/// Number of front-end VirtIO MMIO slots scanned at boot.
pub const VIRTIO_FRONTEND_SLOTS: usize = 32;
