//! Virtual PSCI (spec §4.4): the `CPU_ON` family of secure-monitor calls
//! guests use to bring a vCPU online.

use crate::hal::{Scheduler, VCpuHandle};
use crate::param::NCPU;
use crate::vm::{Vm, VCpuState};

/// Standard PSCI 0.2 `CPU_ON` return codes (spec §6).
pub const SUCCESS: i32 = 0;
pub const NOT_SUPPORTED: i32 = -1;
pub const INVALID_PARAMS: i32 = -2;
pub const DENIED: i32 = -3;
pub const ALREADY_ON: i32 = -4;
pub const ON_PENDING: i32 = -5;
pub const INTERNAL_FAILURE: i32 = -6;
pub const NOT_PRESENT: i32 = -7;
pub const DISABLED: i32 = -8;
pub const INVALID_ADDRESS: i32 = -9;

/// `CPU_ON` inputs, read out of the guest register file by the caller
/// (spec §4.4).
#[derive(Debug, Clone, Copy)]
pub struct CpuOnArgs {
    pub target_cpu_mpidr: u64,
    pub entry_point: u64,
    pub context_id: u64,
}

/// Implements `CPU_ON` against `vm`, returning a PSCI return code ready
/// to place in the guest's `x0` (spec §4.4, §6).
pub fn cpu_on(vm: &mut Vm, args: CpuOnArgs, sched: &dyn Scheduler) -> i32 {
    if args.entry_point == 0 || args.entry_point % 4 != 0 {
        return INVALID_ADDRESS;
    }

    let Some(target_idx) = vm.find_vcpu_by_mpidr(args.target_cpu_mpidr) else {
        return NOT_PRESENT;
    };
    let target = &mut vm.vcpus[target_idx];

    match target.state {
        VCpuState::Running | VCpuState::Ready => return ALREADY_ON,
        VCpuState::WaitIrq | VCpuState::Waiting | VCpuState::Created => {}
    }

    target.frame.pc = args.entry_point;
    target.frame.x[0] = args.context_id;
    target.state = VCpuState::Ready;

    let handle = VCpuHandle::new(vm.vm_id, target_idx as u32);
    sched.time_slice_reset(handle);

    // `affinity` is a bit-mask over physical cores; `CPU_ON` targets the
    // one whose index equals `affinity - 1` (spec §4.4). A zero affinity
    // (never assigned by the platform) has no valid target core.
    let affinity = target.affinity;
    if affinity == 0 {
        return INTERNAL_FAILURE;
    }
    let cpu = affinity.trailing_zeros() as usize;
    if cpu >= NCPU {
        return INTERNAL_FAILURE;
    }
    sched.enqueue_remote(handle, cpu);
    SUCCESS
}
