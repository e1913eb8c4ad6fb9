//! The `gic_hw` external collaborator contract (spec §6) plus a
//! reference register layout for the real distributor/CPU-interface/
//! hypervisor-interface blocks a platform crate would program.
//!
//! The trait is architecture-independent so the vGIC core can be unit
//! tested on the host; the `tock_registers`-based layout below (used
//! only to document/ground the real MMIO shapes, following the
//! teacher's `kernel-rs/src/arch/arm/intr/gicv2.rs`) is compiled only
//! for `aarch64`, where `cortex-a`/`tock-registers` are available.

/// Real GIC primitive operations a platform's physical driver exposes.
/// `id` is a GIC interrupt id in `[0, SPI_MAX)`.
pub trait GicHw {
    fn enable_int(&self, id: u32, on: bool);
    fn set_priority(&self, id: u32, value: u8);
    fn set_target(&self, id: u32, mask: u8);

    /// Read/write hypervisor-interface list register `idx` (`< LR_NUM`).
    fn read_lr(&self, idx: usize) -> u32;
    fn write_lr(&self, idx: usize, value: u32);

    /// Empty List-Register Status: bit `i` set means LR `i` is free.
    fn elsr(&self) -> u32;

    /// Hardware `GICD_TYPER` value (before the vCPU-count-bits rewrite
    /// the vGIC distributor performs, spec §4.2.1).
    fn typer(&self) -> u32;

    /// Hardware `GICD_IIDR` value, passed through unmodified.
    fn iidr(&self) -> u32;

    /// Hypervisor control register shadow (`HCR`).
    fn hcr(&self) -> u32;
    fn set_hcr(&self, value: u32);

    /// Virtual machine control register shadow (`VMCR`).
    fn vmcr(&self) -> u32;
    fn set_vmcr(&self, value: u32);

    /// Active Priorities Register shadow (`APR`).
    fn apr(&self) -> u32;
    fn set_apr(&self, value: u32);
}

#[cfg(target_arch = "aarch64")]
pub mod layout {
    //! Reference MMIO layout for the real distributor, CPU interface, and
    //! hypervisor interface, grounded on the teacher's
    //! `register_structs!` usage in `arch/arm/intr/gicv2.rs`. A platform
    //! crate's `GicHw` implementation would deref one of these over the
    //! real MMIO base addresses; this crate never instantiates them
    //! itself.
    use tock_registers::{
        register_structs,
        registers::{ReadOnly, ReadWrite, WriteOnly},
    };

    const GIC_1_BIT_WORDS: usize = 1024 / 32;
    const GIC_8_BIT_WORDS: usize = 1024 * 8 / 32;
    const GIC_2_BIT_WORDS: usize = 1024 * 2 / 32;

    register_structs! {
        #[allow(non_snake_case)]
        pub GicDistributorBlock {
            (0x0000 => pub CTLR: ReadWrite<u32>),
            (0x0004 => pub TYPER: ReadOnly<u32>),
            (0x0008 => pub IIDR: ReadOnly<u32>),
            (0x000c => _reserved_0),
            (0x0100 => pub ISENABLER: [ReadWrite<u32>; GIC_1_BIT_WORDS]),
            (0x0180 => pub ICENABLER: [ReadWrite<u32>; GIC_1_BIT_WORDS]),
            (0x0200 => pub ISPENDR: [ReadWrite<u32>; GIC_1_BIT_WORDS]),
            (0x0280 => pub ICPENDR: [ReadWrite<u32>; GIC_1_BIT_WORDS]),
            (0x0300 => _reserved_1),
            (0x0400 => pub IPRIORITYR: [ReadWrite<u32>; GIC_8_BIT_WORDS]),
            (0x0800 => pub ITARGETSR: [ReadWrite<u32>; GIC_8_BIT_WORDS]),
            (0x0c00 => pub ICFGR: [ReadWrite<u32>; GIC_2_BIT_WORDS]),
            (0x0d00 => _reserved_2),
            (0x0f00 => pub SGIR: WriteOnly<u32>),
            (0x0f04 => _reserved_3),
            (0x1000 => @END),
        }
    }

    register_structs! {
        #[allow(non_snake_case)]
        pub GicCpuBlock {
            (0x0000 => pub CTLR: ReadWrite<u32>),
            (0x0004 => pub PMR: ReadWrite<u32>),
            (0x0008 => pub BPR: ReadWrite<u32>),
            (0x000c => pub IAR: ReadOnly<u32>),
            (0x0010 => pub EOIR: WriteOnly<u32>),
            (0x0014 => _reserved_0),
            (0x2000 => @END),
        }
    }

    register_structs! {
        #[allow(non_snake_case)]
        pub GicHypervisorBlock {
            (0x0000 => pub HCR: ReadWrite<u32>),
            (0x0004 => pub VTR: ReadOnly<u32>),
            (0x0008 => pub VMCR: ReadWrite<u32>),
            (0x000c => _reserved_0),
            (0x0010 => pub MISR: ReadOnly<u32>),
            (0x0014 => _reserved_1),
            (0x00f0 => pub APR: ReadWrite<u32>),
            (0x00f4 => _reserved_2),
            (0x0100 => pub LR: [ReadWrite<u32>; 4]),
            (0x0110 => @END),
        }
    }
}
