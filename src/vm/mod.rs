//! VM data model and the process-wide VM table (spec §3, design notes
//! "global mutable singletons" strategy: a fixed-capacity pool behind a
//! lock, exposing only stable-index handles).

pub mod vcpu;

pub use vcpu::{SysRegs, TrapFrame, VCpu, VCpuState};

use array_macro::array;
use arrayvec::ArrayVec;

use crate::error::{HvError, HvResult};
use crate::lock::{SpinLock, SpinRawLock};
use crate::param::{NVCPU_PER_VM, NVM};
use crate::vgic::Distributor;

pub const MAX_NAME_LEN: usize = 16;

/// A bounded-lifetime container for one guest OS instance (spec §3).
/// Created at guest-start time, destroyed only at host shutdown.
pub struct Vm {
    pub vm_id: u32,
    name: [u8; MAX_NAME_LEN],
    name_len: u8,
    /// Opaque stage-2 page-table root; this crate never walks it.
    pub stage2_root: usize,
    pub entry_pc: u64,
    pub vcpus: ArrayVec<VCpu, NVCPU_PER_VM>,
    pub vgic: Distributor,
}

impl Vm {
    fn new(vm_id: u32, name: &str, stage2_root: usize, entry_pc: u64) -> Self {
        let mut buf = [0u8; MAX_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_NAME_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self {
            vm_id,
            name: buf,
            name_len: n as u8,
            stage2_root,
            entry_pc,
            vcpus: ArrayVec::new(),
            vgic: Distributor::new(),
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    /// Add a vCPU to this VM, returning its index. Fails if the VM's
    /// vCPU table is full.
    pub fn add_vcpu(&mut self) -> HvResult<u32> {
        if self.vcpus.is_full() {
            return Err(HvError::BadParameter);
        }
        let idx = self.vcpus.len() as u32;
        self.vcpus.push(VCpu::new(idx, self.vm_id));
        self.vgic.set_vcpu_count(self.vcpus.len() as u32);
        Ok(idx)
    }

    pub fn vcpu_count(&self) -> u32 {
        self.vcpus.len() as u32
    }

    /// Find the vCPU whose `MPIDR_EL1` low byte equals `mpidr & 0xff`.
    pub fn find_vcpu_by_mpidr(&self, mpidr: u64) -> Option<usize> {
        let target = (mpidr & 0xff) as u8;
        self.vcpus
            .iter()
            .position(|v| v.sysregs.vcpu_index() == target)
    }
}

/// Process-wide, fixed-capacity table of VMs (design notes: arena +
/// stable u32 index, all mutation through typed accessors that acquire
/// the pool lock internally).
pub struct VmTable {
    slots: SpinLock<[Option<Vm>; NVM]>,
}

impl VmTable {
    pub fn new() -> Self {
        Self {
            slots: SpinLock::new(SpinRawLock::new(), array![_ => None; NVM]),
        }
    }

    /// Create a new VM, returning its `vm_id`. Fails with
    /// [`HvError::BadParameter`] if the table is full.
    pub fn create_vm(&self, name: &str, stage2_root: usize, entry_pc: u64) -> HvResult<u32> {
        let mut slots = self.slots.lock();
        for (i, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(Vm::new(i as u32, name, stage2_root, entry_pc));
                return Ok(i as u32);
            }
        }
        Err(HvError::BadParameter)
    }

    pub fn destroy_vm(&self, vm_id: u32) {
        if let Some(slot) = self.slots.lock().get_mut(vm_id as usize) {
            *slot = None;
        }
    }

    /// Run `f` with exclusive access to VM `vm_id`'s state. Returns
    /// `None` if `vm_id` is out of range or not currently live.
    pub fn with_vm<R>(&self, vm_id: u32, f: impl FnOnce(&mut Vm) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots
            .get_mut(vm_id as usize)
            .and_then(|s| s.as_mut())
            .map(f)
    }
}

impl Default for VmTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_vm_assigns_sequential_ids_and_respects_capacity() {
        let table = VmTable::new();
        for i in 0..NVM as u32 {
            assert_eq!(table.create_vm("g", 0, 0x1000).unwrap(), i);
        }
        assert_eq!(table.create_vm("overflow", 0, 0), Err(HvError::BadParameter));
    }

    #[test]
    fn destroy_vm_frees_the_slot_for_reuse() {
        let table = VmTable::new();
        let id = table.create_vm("a", 0, 0).unwrap();
        table.destroy_vm(id);
        let reused = table.create_vm("b", 0, 0).unwrap();
        assert_eq!(reused, id);
    }

    #[test]
    fn add_vcpu_updates_distributor_vcpu_count() {
        let table = VmTable::new();
        let id = table.create_vm("a", 0, 0).unwrap();
        table
            .with_vm(id, |vm| {
                vm.add_vcpu().unwrap();
                vm.add_vcpu().unwrap();
            })
            .unwrap();
        assert_eq!(table.with_vm(id, |vm| vm.vcpu_count()).unwrap(), 2);
    }

    #[test]
    fn find_vcpu_by_mpidr_matches_low_byte() {
        let table = VmTable::new();
        let id = table.create_vm("a", 0, 0).unwrap();
        table
            .with_vm(id, |vm| {
                vm.add_vcpu().unwrap();
                let idx = vm.add_vcpu().unwrap();
                vm.vcpus[idx as usize].sysregs.mpidr_el1 = 1;
            })
            .unwrap();
        assert_eq!(table.with_vm(id, |vm| vm.find_vcpu_by_mpidr(1)).unwrap(), Some(1));
        assert_eq!(table.with_vm(id, |vm| vm.find_vcpu_by_mpidr(9)).unwrap(), None);
    }
}
