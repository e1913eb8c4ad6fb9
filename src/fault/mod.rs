//! Guest fault demultiplexer (spec §4.3): on a stage-2 data abort from a
//! guest, select the right device model by guest physical address range
//! and forward the decoded access. The dispatcher never owns device
//! state itself — each entry's `handler` closure borrows whatever
//! device model (vGIC distributor, VirtIO transport, ...) it routes to.

use log::warn;

use crate::error::HvResult;
use crate::regs::DecodedAccess;
use crate::vm::TrapFrame;

/// One routing entry: `[start, end)` in the guest physical address
/// space, and the handler invoked on a match. `offset` passed to the
/// handler is `gpa - start`, i.e. relative to the window's base.
pub struct FaultEntry<'a> {
    pub start: usize,
    pub end: usize,
    pub handler: &'a mut dyn FnMut(usize, DecodedAccess, &mut TrapFrame) -> HvResult<()>,
}

impl<'a> FaultEntry<'a> {
    pub fn contains(&self, gpa: usize) -> bool {
        gpa >= self.start && gpa < self.end
    }
}

/// Dispatch `gpa`/`access` to the first matching entry in `table`
/// (spec §4.3: "the first (and only) matching range is invoked").
/// Absence of a match is logged; the guest is resumed without side
/// effect, matching spec §4.6's handling of reserved MMIO.
pub fn dispatch(
    table: &mut [FaultEntry<'_>],
    gpa: usize,
    access: DecodedAccess,
    frame: &mut TrapFrame,
) -> HvResult<()> {
    for entry in table.iter_mut() {
        if entry.contains(gpa) {
            let offset = gpa - entry.start;
            return (entry.handler)(offset, access, frame);
        }
    }
    warn!("fault: no handler registered for guest physical address {:#x}", gpa);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::DecodedAccess;

    fn access() -> DecodedAccess {
        DecodedAccess {
            reg_index: 0,
            width: 4,
            is_write: false,
        }
    }

    #[test]
    fn first_matching_range_wins() {
        let mut hits_a = 0u32;
        let mut hits_b = 0u32;
        let mut frame = TrapFrame::zeroed();

        let mut handler_a = |_off: usize, _a: DecodedAccess, _f: &mut TrapFrame| {
            hits_a += 1;
            Ok(())
        };
        let mut handler_b = |_off: usize, _a: DecodedAccess, _f: &mut TrapFrame| {
            hits_b += 1;
            Ok(())
        };
        let mut table = [
            FaultEntry {
                start: 0x1000,
                end: 0x2000,
                handler: &mut handler_a,
            },
            FaultEntry {
                start: 0x1800,
                end: 0x2800,
                handler: &mut handler_b,
            },
        ];

        dispatch(&mut table, 0x1900, access(), &mut frame).unwrap();
        assert_eq!(hits_a, 1);
        assert_eq!(hits_b, 0);
    }

    #[test]
    fn offset_is_relative_to_window_base() {
        let mut seen_offset = 0usize;
        let mut frame = TrapFrame::zeroed();
        let mut handler = |off: usize, _a: DecodedAccess, _f: &mut TrapFrame| {
            seen_offset = off;
            Ok(())
        };
        let mut table = [FaultEntry {
            start: 0x08000000,
            end: 0x08010000,
            handler: &mut handler,
        }];
        dispatch(&mut table, 0x08000104, access(), &mut frame).unwrap();
        assert_eq!(seen_offset, 0x104);
    }

    #[test]
    fn unmatched_address_is_a_no_op() {
        let mut frame = TrapFrame::zeroed();
        let mut table: [FaultEntry<'_>; 0] = [];
        assert!(dispatch(&mut table, 0xdead_0000, access(), &mut frame).is_ok());
    }
}
