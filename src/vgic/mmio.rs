//! Distributor MMIO emulation (spec §4.2.1): dispatches an access at a
//! given offset within the 64 KiB distributor window to the right
//! register-group handler.

use log::warn;

use crate::hal::{GicHw, Scheduler};
use crate::vm::Vm;

use super::distributor::{is_sgi, is_spi};
use super::inject::inject_sgi;

pub const CTLR: usize = 0x000;
pub const TYPER: usize = 0x004;
pub const IIDR: usize = 0x008;
pub const ISENABLER: usize = 0x100;
pub const ICENABLER: usize = 0x180;
pub const ISPENDR: usize = 0x200;
pub const ICPENDR: usize = 0x280;
pub const IPRIORITYR: usize = 0x400;
pub const ITARGETSR: usize = 0x800;
pub const ICFGR: usize = 0xc00;
pub const SGIR: usize = 0xf00;
pub const CPENDSGIR: usize = 0xf10;
pub const SPENDSGIR: usize = 0xf20;

const WORD: usize = 4;

/// A decoded distributor MMIO access (offset relative to `GICD_BASE`).
#[derive(Debug, Clone, Copy)]
pub struct DistributorAccess {
    pub offset: usize,
    pub is_write: bool,
    /// Write data (ignored for reads).
    pub value: u32,
}

/// Result of a distributor access: the value to return for a read (0
/// for writes or for accesses that don't produce a value).
pub fn handle(
    vm: &mut Vm,
    current_vcpu: usize,
    hw: &dyn GicHw,
    sched: &dyn Scheduler,
    access: DistributorAccess,
) -> u32 {
    let off = access.offset;
    match off {
        CTLR => handle_ctlr(vm, access),
        TYPER => {
            if access.is_write {
                // RO register: spec §8 (P5) — writes are dropped, state unchanged.
                0
            } else {
                vm.vgic.typer(hw.typer())
            }
        }
        IIDR => {
            if access.is_write {
                0
            } else {
                hw.iidr()
            }
        }
        _ if (ISENABLER..ISENABLER + crate::param::SCENABLER_WORDS * WORD).contains(&off) => {
            handle_enable(vm, current_vcpu, hw, off, access, true)
        }
        _ if (ICENABLER..ICENABLER + crate::param::SCENABLER_WORDS * WORD).contains(&off) => {
            handle_enable(vm, current_vcpu, hw, off, access, false)
        }
        _ if (ISPENDR..ISPENDR + crate::param::SCENABLER_WORDS * WORD).contains(&off) => {
            handle_pend(vm, current_vcpu, sched, off, access, true)
        }
        _ if (ICPENDR..ICPENDR + crate::param::SCENABLER_WORDS * WORD).contains(&off) => {
            handle_pend(vm, current_vcpu, sched, off, access, false)
        }
        _ if (IPRIORITYR..IPRIORITYR + crate::param::SPI_MAX).contains(&off) => {
            handle_priority(vm, current_vcpu, hw, off, access)
        }
        _ if (ITARGETSR..ITARGETSR + crate::param::SPI_MAX).contains(&off) => {
            handle_targets(vm, current_vcpu, off, access)
        }
        _ if (ICFGR..ICFGR + crate::param::SPI_MAX / 4).contains(&off) => {
            handle_icfgr(vm, off, access)
        }
        SGIR => {
            if access.is_write {
                handle_sgir(vm, current_vcpu, sched, access.value);
            }
            0
        }
        CPENDSGIR | SPENDSGIR => {
            // Open question per spec §9: no stored semantics, log and no-op.
            warn!("vgic: CPENDSGIR/SPENDSGIR access at {:#x} is a no-op", off);
            0
        }
        _ => {
            warn!("vgic: access to reserved distributor offset {:#x} ignored", off);
            0
        }
    }
}

fn handle_ctlr(vm: &mut Vm, access: DistributorAccess) -> u32 {
    if access.is_write {
        vm.vgic.ctlr = access.value;
        0
    } else {
        vm.vgic.ctlr
    }
}

/// ISENABLER/ICENABLER: word 0 is per-vCPU SGI/PPI (software-only),
/// word k>=1 is VM-wide SPI and propagates to hardware (spec §4.2.1).
fn handle_enable(
    vm: &mut Vm,
    current_vcpu: usize,
    hw: &dyn GicHw,
    off: usize,
    access: DistributorAccess,
    set: bool,
) -> u32 {
    let base = if set { ISENABLER } else { ICENABLER };
    let word_idx = (off - base) / WORD;
    if word_idx == 0 {
        let vgicc = &mut vm.vcpus[current_vcpu].vgicc;
        if access.is_write {
            if set {
                vgicc.sgi_ppi_isenabler |= access.value;
            } else {
                vgicc.sgi_ppi_isenabler &= !access.value;
            }
            0
        } else {
            vgicc.sgi_ppi_isenabler
        }
    } else {
        if access.is_write {
            let base_id = word_idx as u32 * 32;
            for bit in 0..32u32 {
                if access.value & (1 << bit) == 0 {
                    continue;
                }
                let id = base_id + bit;
                if !is_spi(id) {
                    continue;
                }
                if vm.vgic.set_spi_enable(id, set) {
                    hw.enable_int(id, set);
                }
            }
            0
        } else {
            vm.vgic.scenabler[word_idx]
        }
    }
}

/// ISPENDER/ICPENDER word 0 (SGI+PPI, per-vCPU). Word k>=1 (SPI) is the
/// open question from spec §9: logged, no state kept.
fn handle_pend(
    vm: &mut Vm,
    current_vcpu: usize,
    _sched: &dyn Scheduler,
    off: usize,
    access: DistributorAccess,
    set: bool,
) -> u32 {
    let base = if set { ISPENDR } else { ICPENDR };
    let word_idx = (off - base) / WORD;
    if word_idx != 0 {
        warn!(
            "vgic: SPI {}PENDER word {} not implemented (spec open question)",
            if set { "S" } else { "C" },
            word_idx
        );
        return 0;
    }
    let vgicc = &mut vm.vcpus[current_vcpu].vgicc;
    if !access.is_write {
        return vgicc.irq_pending_mask[0];
    }
    for bit in 0..32u32 {
        if access.value & (1 << bit) == 0 {
            continue;
        }
        if set {
            vgicc.set_pending(bit);
        } else {
            vgicc.clear_pending(bit);
            // ICPENDER additionally clears any matching LR (spec §4.2.1).
            vgicc.clear_lr_for_id(bit);
        }
    }
    0
}

fn handle_priority(vm: &mut Vm, current_vcpu: usize, hw: &dyn GicHw, off: usize, access: DistributorAccess) -> u32 {
    let id = (off - IPRIORITYR) as u32;
    if id < 32 {
        let vgicc = &mut vm.vcpus[current_vcpu].vgicc;
        if access.is_write {
            let byte = access.value as u8;
            vgicc.sgi_ppi_ipriorityr[id as usize] = byte;
            hw.set_priority(id, byte >> 3);
            0
        } else {
            vgicc.sgi_ppi_ipriorityr[id as usize] as u32
        }
    } else {
        if access.is_write {
            let byte = access.value as u8;
            vm.vgic.set_spi_priority(id, byte);
            hw.set_priority(id, byte >> 3);
            0
        } else {
            vm.vgic.ipriorityr[id as usize] as u32
        }
    }
}

fn handle_targets(vm: &mut Vm, current_vcpu: usize, off: usize, access: DistributorAccess) -> u32 {
    let id = (off - ITARGETSR) as u32;
    if id < 32 {
        // RO: every byte is `1 << current_vcpu_id` (spec §4.2.1).
        if access.is_write {
            0
        } else {
            (1u32 << current_vcpu.min(7)) & 0xff
        }
    } else if access.is_write {
        vm.vgic.set_spi_target(id, access.value as u8);
        0
    } else {
        vm.vgic.itargetsr[id as usize] as u32
    }
}

fn handle_icfgr(vm: &mut Vm, off: usize, access: DistributorAccess) -> u32 {
    let word_idx = (off - ICFGR) / WORD;
    if word_idx == 0 {
        if access.is_write {
            0
        } else {
            super::distributor::Distributor::SGI_PPI_ICFGR0
        }
    } else {
        let base_id = (word_idx * 16) as u32;
        if access.is_write {
            // `GicHw` has no edge/level setter, so the odd config bit per
            // IRQ stays virtual-only; only the software copy is updated.
            vm.vgic.set_icfgr_word(base_id, access.value);
            0
        } else {
            vm.vgic.icfgr_word(base_id)
        }
    }
}

fn handle_sgir(vm: &mut Vm, current_vcpu: usize, sched: &dyn Scheduler, value: u32) {
    let target_list_filter = (value >> 24) & 0b11;
    let cpu_target_list = ((value >> 16) & 0xff) as u8;
    let int_id = value & 0xf;
    if !is_sgi(int_id) {
        warn!("vgic: SGIR with out-of-range id {}", int_id);
        return;
    }
    let n = vm.vcpu_count() as usize;
    for idx in 0..n {
        let deliver = match target_list_filter {
            0 => cpu_target_list & (1 << idx.min(7)) != 0,
            1 => idx != current_vcpu,
            2 => idx == current_vcpu,
            _ => false,
        };
        if deliver {
            let _ = inject_sgi(vm, idx, int_id, current_vcpu as u8, sched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::scheduler::IpiKind;
    use crate::hal::VCpuHandle;
    use crate::vm::VmTable;

    struct NullHw;
    impl GicHw for NullHw {
        fn enable_int(&self, _id: u32, _on: bool) {}
        fn set_priority(&self, _id: u32, _value: u8) {}
        fn set_target(&self, _id: u32, _mask: u8) {}
        fn read_lr(&self, _idx: usize) -> u32 {
            0
        }
        fn write_lr(&self, _idx: usize, _value: u32) {}
        fn elsr(&self) -> u32 {
            0xf
        }
        fn typer(&self) -> u32 {
            0
        }
        fn iidr(&self) -> u32 {
            0
        }
        fn hcr(&self) -> u32 {
            0
        }
        fn set_hcr(&self, _value: u32) {}
        fn vmcr(&self) -> u32 {
            0
        }
        fn set_vmcr(&self, _value: u32) {}
        fn apr(&self) -> u32 {
            0
        }
        fn set_apr(&self, _value: u32) {}
    }

    struct NullSched;
    impl Scheduler for NullSched {
        fn curr_vcpu(&self) -> Option<VCpuHandle> {
            None
        }
        fn enqueue_remote(&self, _vcpu: VCpuHandle, _cpu: usize) {}
        fn yield_(&self) {}
        fn send_ipi(&self, _cpu: usize, _kind: IpiKind) {}
        fn time_slice_reset(&self, _vcpu: VCpuHandle) {}
    }

    fn vm_with_vcpus(n: usize) -> (VmTable, u32) {
        let table = VmTable::new();
        let id = table.create_vm("t", 0, 0).unwrap();
        table
            .with_vm(id, |vm| {
                for _ in 0..n {
                    vm.add_vcpu().unwrap();
                }
            })
            .unwrap();
        (table, id)
    }

    #[test]
    fn sgi_broadcast_all_but_self_reaches_every_other_vcpu() {
        let (table, id) = vm_with_vcpus(4);
        let hw = NullHw;
        let sched = NullSched;
        table
            .with_vm(id, |vm| {
                let value = (1u32 << 24) | 3; // filter=1 (all but self), id=3
                handle_sgir(vm, 0, &sched, value);
                for i in 1..4 {
                    assert!(vm.vcpus[i].vgicc.is_pending(3), "vcpu {i} should be pending");
                }
                assert!(!vm.vcpus[0].vgicc.is_pending(3));
            })
            .unwrap();
    }

    #[test]
    fn typer_read_reflects_vcpu_count_via_mmio_path() {
        let (table, id) = vm_with_vcpus(2);
        let hw = NullHw;
        let sched = NullSched;
        table
            .with_vm(id, |vm| {
                let v = handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess {
                        offset: TYPER,
                        is_write: false,
                        value: 0,
                    },
                );
                assert_eq!((v >> 5) & 0b111, 0b001);
            })
            .unwrap();
    }

    #[test]
    fn typer_write_is_dropped_and_readback_is_unchanged() {
        let (table, id) = vm_with_vcpus(1);
        let hw = NullHw;
        let sched = NullSched;
        table
            .with_vm(id, |vm| {
                let before = handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess { offset: TYPER, is_write: false, value: 0 },
                );
                handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess { offset: TYPER, is_write: true, value: 0xffff_ffff },
                );
                let after = handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess { offset: TYPER, is_write: false, value: 0 },
                );
                assert_eq!(before, after);
            })
            .unwrap();
    }

    #[test]
    fn priority_write_then_read_round_trips_for_spi() {
        let (table, id) = vm_with_vcpus(1);
        let hw = NullHw;
        let sched = NullSched;
        table
            .with_vm(id, |vm| {
                handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess { offset: IPRIORITYR + 100, is_write: true, value: 0x42 },
                );
                let v = handle(
                    vm,
                    0,
                    &hw,
                    &sched,
                    DistributorAccess { offset: IPRIORITYR + 100, is_write: false, value: 0 },
                );
                assert_eq!(v, 0x42);
            })
            .unwrap();
    }

    #[test]
    fn itargetsr_sgi_ppi_range_reads_current_vcpu_bit() {
        let (table, id) = vm_with_vcpus(3);
        let hw = NullHw;
        let sched = NullSched;
        table
            .with_vm(id, |vm| {
                let v = handle(
                    vm,
                    2,
                    &hw,
                    &sched,
                    DistributorAccess { offset: ITARGETSR + 5, is_write: false, value: 0 },
                );
                assert_eq!(v, 1 << 2);
            })
            .unwrap();
    }
}
