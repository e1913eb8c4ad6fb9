//! Virtual Generic Interrupt Controller: per-VM distributor state, per-
//! vCPU list-register bookkeeping, injection, and MMIO emulation of the
//! distributor window (spec §4.2).

pub mod distributor;
pub mod inject;
pub mod mmio;
pub mod vgicc;

pub use distributor::Distributor;
pub use inject::{inject_ppi, inject_sgi, inject_spi, try_drain_pending};
pub use vgicc::{ListRegister, VGicc};

use crate::hal::GicHw;

/// Context save/restore (spec §4.2.3): capture `{vmcr, elsr0, apr, hcr,
/// lr[...]}` from the hypervisor-interface MMIO on switch-out, and write
/// them back (in the same order) plus drain on switch-in.
pub fn save_vgicc(vgicc: &mut VGicc, hw: &dyn GicHw) {
    vgicc.vmcr = hw.vmcr();
    vgicc.saved_apr = hw.apr();
    vgicc.saved_hcr = hw.hcr();
    vgicc.saved_elsr0 = hw.elsr();
    for i in 0..crate::param::LR_NUM {
        vgicc.saved_lr[i] = hw.read_lr(i);
    }
}

pub fn restore_vgicc(vgicc: &mut VGicc, hw: &dyn GicHw) {
    hw.set_vmcr(vgicc.vmcr);
    hw.set_apr(vgicc.saved_apr);
    hw.set_hcr(vgicc.saved_hcr);
    // Drain into the software shadow first: ids that became pending
    // while this vCPU was off-core have no LR yet, and the write_lr
    // loop below is guest entry's only chance to program one before
    // the fence (spec §4.2.2 step 5, §4.2.3).
    try_drain_pending(vgicc);
    for i in 0..crate::param::LR_NUM {
        hw.write_lr(i, vgicc.saved_lr[i]);
    }
}
