//! # HAL for the Freescale/NXP QorIQ DDR memory controller
//!
//! DDR3 bring-up as a pure computation pipeline followed by one programming
//! step:
//!
//! 1. [spd] decodes and validates SPD EEPROM images into per-DIMM parameters.
//! 2. [timing] folds all DIMMs of a controller into a worst-case envelope and
//!    selects the CAS latency.
//! 3. [board] looks up per-board tuning values keyed by rank count and data
//!    rate.
//! 4. [options] merges envelope, board row and platform config into the
//!    register synthesis options.
//! 5. [ctrl_regs] computes the complete register image, hardware untouched.
//! 6. [ll] programs the image and enables the controller, MEM_EN last.
//!
//! Everything up to [ll] is host-testable.
#![no_std]

pub mod board;
pub mod ctrl_regs;
pub mod ll;
pub mod memtest;
pub mod options;
pub mod spd;
pub mod time;
pub mod timing;
pub mod util;

use board::{BoardMemReset, BoardSpecificParameters, find_board_specific_parameters};
use ctrl_regs::{DdrCfgRegs, check_memctl_config_regs, compute_memctl_config_regs};
use embedded_hal::delay::DelayNs;
use options::{DdrConfig, populate_memctl_options};
use spd::{DimmParams, SpdEeprom, compute_dimm_parameters};
use timing::{CommonTimingParams, compute_lowest_common_dimm_parameters};

pub use options::CHIP_SELECTS_PER_CTRL;

/// DIMM slots wired to one controller on the boards this supports.
pub const MAX_DIMM_SLOTS_PER_CTLR: usize = 2;

/// Result of an SPD read attempt for one slot.
#[derive(Debug, Clone, Copy)]
pub enum SpdSlot {
    /// Nothing plugged in.
    Empty,
    /// A module answered its presence detect but the EEPROM read failed.
    ReadFailed,
    Present(SpdEeprom),
}

#[derive(Debug, thiserror::Error)]
pub enum DdrError {
    #[error("SPD read failed on controller {ctrl} slot {slot}")]
    SpdReadFailed { ctrl: usize, slot: usize },
    #[error("SPD decode failed: {0}")]
    Spd(#[from] spd::SpdError),
    #[error("timing reconciliation failed: {0}")]
    Timing(#[from] timing::TimingError),
    #[error("no board timing parameters for {n_ranks} rank(s) at {datarate_mhz} MT/s")]
    BoardLookup { n_ranks: u32, datarate_mhz: u32 },
    #[error("register image check found {errors} problem(s)")]
    RegisterCheck { errors: u32 },
}

/// Everything computed for one controller.
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub dimm_params: [DimmParams; MAX_DIMM_SLOTS_PER_CTLR],
    pub n_dimm_slots: usize,
    pub common_timing: CommonTimingParams,
    pub regs: DdrCfgRegs,
    /// Physical address this controller's memory starts at.
    pub base_address: u64,
    /// Usable bytes behind this controller, bus width adjusted.
    pub total_mem: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            dimm_params: [DimmParams::default(); MAX_DIMM_SLOTS_PER_CTLR],
            n_dimm_slots: MAX_DIMM_SLOTS_PER_CTLR,
            common_timing: CommonTimingParams::default(),
            regs: DdrCfgRegs::default(),
            base_address: 0,
            total_mem: 0,
        }
    }
}

/// The computed configuration of all controllers plus the memory map total.
#[derive(Debug, Clone, Copy)]
pub struct DdrInfo<const CTRLS: usize> {
    pub controllers: [ControllerConfig; CTRLS],
    pub total_mem: u64,
}

/// Run the computation pipeline for one controller.
///
/// A populated slot whose SPD cannot be read or decoded fails the controller:
/// the module is physically there, so pretending the slot is empty would
/// synthesize an image that leaves installed memory unmapped (or worse, maps
/// it with another module's timings).
pub fn compute_controller_config(
    cfg: &DdrConfig,
    ctrl_num: usize,
    spd_slots: &[SpdSlot],
    base_address: u64,
    board_table: &[BoardSpecificParameters],
) -> Result<ControllerConfig, DdrError> {
    assert!(!spd_slots.is_empty() && spd_slots.len() <= MAX_DIMM_SLOTS_PER_CTLR);
    let n_slots = spd_slots.len();

    let mut dimm_params = [DimmParams::default(); MAX_DIMM_SLOTS_PER_CTLR];
    for (slot, (spd_slot, pdimm)) in spd_slots.iter().zip(dimm_params.iter_mut()).enumerate() {
        match spd_slot {
            SpdSlot::Empty => {
                log::debug!("ctrl {} slot {}: empty", ctrl_num, slot);
            }
            SpdSlot::ReadFailed => {
                log::error!("ctrl {} slot {}: SPD read failed", ctrl_num, slot);
                return Err(DdrError::SpdReadFailed {
                    ctrl: ctrl_num,
                    slot,
                });
            }
            SpdSlot::Present(spd) => *pdimm = compute_dimm_parameters(spd, slot)?,
        }
    }
    let dimms = &mut dimm_params[..n_slots];

    let mut common_timing = compute_lowest_common_dimm_parameters(cfg.ddr_freq, dimms)?;
    if common_timing.ndimms_present == 0 {
        return Ok(ControllerConfig {
            dimm_params,
            n_dimm_slots: n_slots,
            common_timing,
            regs: DdrCfgRegs::default(),
            base_address,
            total_mem: 0,
        });
    }

    // Each DIMM owns a contiguous slice of the controller's address range.
    common_timing.base_address = base_address;
    let mut next_base = base_address;
    for dimm in dimms.iter_mut().filter(|d| d.is_present()) {
        dimm.base_address = next_base;
        next_base += dimm.capacity >> cfg.dbw_capacity_adjust;
    }

    let n_ranks = dimms
        .iter()
        .find(|d| d.is_present())
        .map_or(1, |d| d.n_ranks);
    let datarate_mhz = cfg.ddr_freq.raw() / 1_000_000;
    let board_row = find_board_specific_parameters(board_table, n_ranks, datarate_mhz)
        .ok_or(DdrError::BoardLookup {
            n_ranks,
            datarate_mhz,
        })?;

    let popts = populate_memctl_options(cfg, &common_timing, dimms, board_row);

    let regs = compute_memctl_config_regs(
        &popts,
        &common_timing,
        dimms,
        cfg.dbw_capacity_adjust,
        false,
    );
    let errors = check_memctl_config_regs(&regs);
    if errors > 0 {
        return Err(DdrError::RegisterCheck { errors });
    }

    Ok(ControllerConfig {
        dimm_params,
        n_dimm_slots: n_slots,
        common_timing,
        regs,
        base_address,
        total_mem: common_timing.total_mem >> cfg.dbw_capacity_adjust,
    })
}

/// Run the computation pipeline for every controller.
///
/// Controllers get contiguous address ranges starting at the configured SDRAM
/// base, in controller order.
pub fn compute_ddr_info<const CTRLS: usize>(
    cfg: &DdrConfig,
    spd: &[[SpdSlot; MAX_DIMM_SLOTS_PER_CTLR]; CTRLS],
    board_table: &[BoardSpecificParameters],
) -> Result<DdrInfo<CTRLS>, DdrError> {
    let mut controllers = [ControllerConfig::default(); CTRLS];
    let mut next_base = cfg.sdram_base;
    for (ctrl_num, slots) in spd.iter().enumerate() {
        let ctrl = compute_controller_config(cfg, ctrl_num, slots, next_base, board_table)?;
        next_base += ctrl.total_mem;
        controllers[ctrl_num] = ctrl;
    }
    let total_mem = controllers.iter().map(|c| c.total_mem).sum();
    log::info!("DDR: {} MiB total", total_mem >> 20);
    Ok(DdrInfo {
        controllers,
        total_mem,
    })
}

/// Capacity probe: total bytes behind all controllers, without board tuning
/// or full register synthesis.
///
/// Boot flows use this to size the memory map before the tuning tables and
/// clocks are final. Slots that fail to decode count as empty.
pub fn compute_sdram_size(cfg: &DdrConfig, spd: &[[SpdSlot; MAX_DIMM_SLOTS_PER_CTLR]]) -> u64 {
    let mut total = 0u64;
    for (ctrl_num, slots) in spd.iter().enumerate() {
        for (slot, spd_slot) in slots.iter().enumerate() {
            if let SpdSlot::Present(image) = spd_slot {
                match compute_dimm_parameters(image, slot) {
                    Ok(params) => total += params.capacity >> cfg.dbw_capacity_adjust,
                    Err(e) => {
                        log::warn!("ctrl {} slot {}: {} during size probe", ctrl_num, slot, e);
                    }
                }
            }
        }
    }
    total
}

/// Program and enable one controller with a computed register image.
///
/// # Safety
///
/// Creates an MMIO handle for the controller block; the caller must ensure no
/// other handle to the same controller is live and that this runs before any
/// access to the memory behind it.
pub unsafe fn initialize_controller<Delay: DelayNs, Board: BoardMemReset>(
    ctrl_num: usize,
    regs: &DdrCfgRegs,
    step: ll::ProgramStep,
    board: &mut Board,
    delay: &mut Delay,
) -> Result<(), ll::ProgramError> {
    let mut ddrc = unsafe { qoriq_ddr::DdrMemController::new_mmio_fixed(ctrl_num) };
    ll::program_memctl_regs(&mut ddrc, regs, step, board, delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spd::tests::ddr3_1600_udimm;

    const fn board_row(n_ranks: u32, mhz: u32) -> BoardSpecificParameters {
        BoardSpecificParameters {
            n_ranks,
            datarate_mhz_high: mhz,
            rank_gb: 0,
            clk_adjust: 5,
            wrlvl_start: 6,
            wrlvl_ctl_2: 0,
            wrlvl_ctl_3: 0,
            cpo: 0xFF,
            write_data_delay: 2,
            force_2t: false,
        }
    }

    const BOARD_TABLE: &[BoardSpecificParameters] =
        &[board_row(2, 1350), board_row(2, 1666), board_row(2, 2140)];

    #[test]
    fn pipeline_for_one_populated_controller() {
        let cfg = DdrConfig::default();
        let spd = [[SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty]];
        let info = compute_ddr_info(&cfg, &spd, BOARD_TABLE).unwrap();

        assert_eq!(info.total_mem, 2 << 30);
        let ctrl = &info.controllers[0];
        assert_eq!(ctrl.common_timing.lowest_common_spd_caslat, 11);
        assert_eq!(ctrl.dimm_params[0].base_address, 0);

        // The image is ready for programming: DDR3, MEM_EN staged, both
        // ranks mapped, board clock adjust applied.
        assert!(ctrl.regs.sdram_cfg.mem_en());
        assert!(ctrl.regs.cs[0].config.cs_en());
        assert!(ctrl.regs.cs[1].config.cs_en());
        assert_eq!(ctrl.regs.cs[0].bnds.raw_value(), 0x0000_003F);
        assert_eq!(ctrl.regs.sdram_clk_cntl.clk_adjust().value(), 5);
    }

    #[test]
    fn empty_controllers_map_no_memory() {
        let cfg = DdrConfig::default();
        let spd = [[SpdSlot::Empty, SpdSlot::Empty]];
        let info = compute_ddr_info(&cfg, &spd, BOARD_TABLE).unwrap();
        assert_eq!(info.total_mem, 0);
        assert_eq!(info.controllers[0].regs.sdram_cfg.raw_value(), 0);
        assert!(!info.controllers[0].regs.cs[0].config.cs_en());
    }

    #[test]
    fn failed_spd_read_is_not_an_empty_slot() {
        // A slot that answered presence detect but failed the EEPROM read
        // must fail the controller, not configure around the module.
        let cfg = DdrConfig::default();
        let spd = [[SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::ReadFailed]];
        let result = compute_ddr_info(&cfg, &spd, BOARD_TABLE);
        assert!(matches!(
            result,
            Err(DdrError::SpdReadFailed { ctrl: 0, slot: 1 })
        ));
    }

    #[test]
    fn controllers_get_contiguous_address_ranges() {
        let cfg = DdrConfig::default();
        let spd = [
            [SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty],
            [SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty],
        ];
        let info = compute_ddr_info(&cfg, &spd, BOARD_TABLE).unwrap();
        assert_eq!(info.total_mem, 4 << 30);
        assert_eq!(info.controllers[0].base_address, 0);
        assert_eq!(info.controllers[1].base_address, 2 << 30);
        // CS bounds of the second controller start at its base.
        assert_eq!(info.controllers[1].regs.cs[0].bnds.start_addr(), 0x80);
    }

    #[test]
    fn corrupt_spd_fails_the_controller() {
        let cfg = DdrConfig::default();
        let mut bad = *ddr3_1600_udimm().as_bytes();
        bad[16] ^= 0xFF;
        let spd = [[
            SpdSlot::Present(ddr3_1600_udimm()),
            SpdSlot::Present(SpdEeprom::new(bad)),
        ]];
        let result = compute_ddr_info(&cfg, &spd, BOARD_TABLE);
        assert!(matches!(
            result,
            Err(DdrError::Spd(spd::SpdError::CrcMismatch { .. }))
        ));
    }

    #[test]
    fn board_table_miss_is_an_error() {
        // No row covers the operating data rate, so the lookup must refuse
        // rather than hand back made-up tuning values.
        let cfg = DdrConfig::default();
        let table = &[board_row(2, 1066), board_row(2, 1350)];
        let spd = [[SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty]];
        let result = compute_ddr_info(&cfg, &spd, table);
        assert!(matches!(
            result,
            Err(DdrError::BoardLookup {
                n_ranks: 2,
                datarate_mhz: 1600,
            })
        ));
    }

    #[test]
    fn size_probe_sums_module_capacities() {
        let cfg = DdrConfig::default();
        let spd = [
            [SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty],
            [
                SpdSlot::Present(ddr3_1600_udimm()),
                SpdSlot::Present(ddr3_1600_udimm()),
            ],
        ];
        assert_eq!(compute_sdram_size(&cfg, &spd), 6 << 30);
    }

    #[test]
    fn narrow_bus_halves_the_map() {
        let cfg = DdrConfig {
            dbw_capacity_adjust: 1,
            ..Default::default()
        };
        let spd = [[SpdSlot::Present(ddr3_1600_udimm()), SpdSlot::Empty]];
        let info = compute_ddr_info(&cfg, &spd, BOARD_TABLE).unwrap();
        assert_eq!(info.total_mem, 1 << 30);
        // Each rank maps half its density.
        assert_eq!(info.controllers[0].regs.cs[0].bnds.raw_value(), 0x0000_001F);
    }
}
