//! Low level controller programming.
//!
//! Writes a computed [`DdrCfgRegs`] image into the memory mapped register
//! block in the order the reference manual requires: every configuration
//! register first with the interface disabled, then DDR_SDRAM_CFG with MEM_EN
//! as the very last write. Enabling starts the hardware initialization
//! sequence (ZQ calibration, write leveling, optional data init).

use embedded_hal::delay::DelayNs;
use qoriq_ddr::MmioDdrMemController;

use crate::board::BoardMemReset;
use crate::ctrl_regs::DdrCfgRegs;

/// Which part of the programming sequence to run.
///
/// Splitting the sequence lets a boot flow program several controllers first
/// and enable them together, or re-run only the enable step after a warm
/// reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStep {
    /// Program all registers and enable the controller.
    Full,
    /// Program all registers but leave the interface disabled.
    ProgramRegisters,
    /// Only enable a previously programmed controller.
    EnableController,
}

/// Bound on D_INIT polling; data init of large modules takes a while but not
/// forever.
const D_INIT_POLL_LIMIT: u32 = 100_000;

/// Settle time between the last configuration write and MEM_EN, per the
/// initialization sequence of the reference manual.
const MEM_EN_SETTLE_US: u32 = 500;

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("DRAM data initialization did not complete")]
    DataInitTimeout,
}

/// Run the programming sequence for one controller.
///
/// The board hooks assert the DRAM reset line while registers are programmed
/// and release it before the interface is enabled, for boards that wire the
/// reset to a GPIO instead of the controller.
pub fn program_memctl_regs<Delay: DelayNs, Board: BoardMemReset>(
    ddrc: &mut MmioDdrMemController<'static>,
    regs: &DdrCfgRegs,
    step: ProgramStep,
    board: &mut Board,
    delay: &mut Delay,
) -> Result<(), ProgramError> {
    if step == ProgramStep::Full || step == ProgramStep::ProgramRegisters {
        if board.need_mem_reset() {
            board.mem_reset();
        }
        write_config_registers(ddrc, regs);
    }
    if step == ProgramStep::Full || step == ProgramStep::EnableController {
        if board.need_mem_reset() {
            board.mem_de_reset();
        }
        delay.delay_us(MEM_EN_SETTLE_US);
        enable_controller(ddrc, regs, delay)?;
    }
    Ok(())
}

/// Write every configuration register, with the interface kept disabled.
fn write_config_registers(ddrc: &mut MmioDdrMemController<'static>, regs: &DdrCfgRegs) {
    ddrc.write_cs0_bnds(regs.cs[0].bnds);
    ddrc.write_cs1_bnds(regs.cs[1].bnds);
    ddrc.write_cs2_bnds(regs.cs[2].bnds);
    ddrc.write_cs3_bnds(regs.cs[3].bnds);
    for i in 0..4 {
        // Safety: Indexes are valid.
        unsafe {
            ddrc.write_cs_config_unchecked(i, regs.cs[i].config);
            ddrc.write_cs_config_2_unchecked(i, regs.cs[i].config_2);
        }
    }

    ddrc.write_timing_cfg_3(regs.timing_cfg_3);
    ddrc.write_timing_cfg_0(regs.timing_cfg_0);
    ddrc.write_timing_cfg_1(regs.timing_cfg_1);
    ddrc.write_timing_cfg_2(regs.timing_cfg_2);
    ddrc.write_sdram_cfg_2(regs.sdram_cfg_2);
    ddrc.write_sdram_mode(regs.sdram_mode);
    ddrc.write_sdram_mode_2(regs.sdram_mode_2);
    ddrc.write_sdram_mode_3(regs.sdram_mode_3);
    ddrc.write_sdram_mode_4(regs.sdram_mode_4);
    ddrc.write_sdram_mode_5(regs.sdram_mode_5);
    ddrc.write_sdram_mode_6(regs.sdram_mode_6);
    ddrc.write_sdram_mode_7(regs.sdram_mode_7);
    ddrc.write_sdram_mode_8(regs.sdram_mode_8);
    ddrc.write_sdram_md_cntl(regs.sdram_md_cntl);
    ddrc.write_sdram_interval(regs.sdram_interval);
    ddrc.write_sdram_data_init(regs.sdram_data_init);
    ddrc.write_sdram_clk_cntl(regs.sdram_clk_cntl);
    ddrc.write_init_addr(regs.init_addr);
    ddrc.write_init_ext_addr(regs.init_ext_addr);
    ddrc.write_timing_cfg_4(regs.timing_cfg_4);
    ddrc.write_timing_cfg_5(regs.timing_cfg_5);
    ddrc.write_ddr_zq_cntl(regs.ddr_zq_cntl);
    ddrc.write_ddr_wrlvl_cntl(regs.ddr_wrlvl_cntl);
    ddrc.write_ddr_wrlvl_cntl_2(regs.ddr_wrlvl_cntl_2);
    ddrc.write_ddr_wrlvl_cntl_3(regs.ddr_wrlvl_cntl_3);
    ddrc.write_ddr_sr_cntr(regs.ddr_sr_cntr);
    ddrc.write_ddr_sdram_rcw_1(regs.ddr_sdram_rcw_1);
    ddrc.write_ddr_sdram_rcw_2(regs.ddr_sdram_rcw_2);
    ddrc.write_ddr_eor(regs.ddr_eor);
    ddrc.write_ddr_cdr1(regs.ddr_cdr1);
    ddrc.write_ddr_cdr2(regs.ddr_cdr2);

    // The interface must stay disabled until all other registers are stable.
    ddrc.write_sdram_cfg(regs.sdram_cfg.with_mem_en(false));
    log::debug!(
        "controller programmed, sdram_cfg = {:#010x} (MEM_EN held off)",
        regs.sdram_cfg.with_mem_en(false).raw_value()
    );
}

/// Set MEM_EN and wait for hardware initialization to finish.
fn enable_controller<Delay: DelayNs>(
    ddrc: &mut MmioDdrMemController<'static>,
    regs: &DdrCfgRegs,
    delay: &mut Delay,
) -> Result<(), ProgramError> {
    ddrc.write_sdram_cfg(regs.sdram_cfg);
    log::debug!("MEM_EN set, sdram_cfg = {:#010x}", regs.sdram_cfg.raw_value());

    // D_INIT reads back set while the controller zeroes memory.
    if regs.sdram_cfg_2.d_init() {
        let mut polls = 0;
        while ddrc.read_sdram_cfg_2().d_init() {
            polls += 1;
            if polls > D_INIT_POLL_LIMIT {
                log::error!("data initialization still pending, giving up");
                return Err(ProgramError::DataInitTimeout);
            }
            delay.delay_us(100);
        }
        log::debug!("data initialization complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::NoMemReset;
    use qoriq_ddr::DdrMemController;
    use qoriq_ddr::regs::{SdramCfg, TimingCfg3};

    const BLOCK_WORDS: usize = 0xF80 / 4;
    const TIMING_CFG_3_WORD: usize = 0x100 / 4;
    const SDRAM_CFG_WORD: usize = 0x110 / 4;

    struct NoDelay;
    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn image() -> DdrCfgRegs {
        let mut regs = DdrCfgRegs::default();
        regs.timing_cfg_3 = TimingCfg3::new_with_raw_value(0x0107_1000);
        regs.sdram_cfg = SdramCfg::new_with_raw_value(0)
            .with_mem_en(true)
            .with_sren(true);
        regs
    }

    fn run(block: &mut [u32; BLOCK_WORDS], step: ProgramStep) {
        let base = block.as_mut_ptr() as usize;
        let mut ddrc = unsafe { DdrMemController::new_mmio_at(base) };
        program_memctl_regs(&mut ddrc, &image(), step, &mut NoMemReset, &mut NoDelay).unwrap();
    }

    #[test]
    fn programming_holds_mem_en_off() {
        let mut block = [0u32; BLOCK_WORDS];
        run(&mut block, ProgramStep::ProgramRegisters);

        // The configuration landed but the interface stayed disabled.
        assert_eq!(block[TIMING_CFG_3_WORD], 0x0107_1000);
        let cfg = image().sdram_cfg;
        assert_eq!(block[SDRAM_CFG_WORD], cfg.with_mem_en(false).raw_value());
        assert_eq!(block[SDRAM_CFG_WORD] & 0x8000_0000, 0);
    }

    #[test]
    fn enable_sets_mem_en_last() {
        let mut block = [0u32; BLOCK_WORDS];
        run(&mut block, ProgramStep::ProgramRegisters);
        assert_eq!(block[SDRAM_CFG_WORD] & 0x8000_0000, 0);

        run(&mut block, ProgramStep::EnableController);
        assert_eq!(block[SDRAM_CFG_WORD], image().sdram_cfg.raw_value());
        assert_ne!(block[SDRAM_CFG_WORD] & 0x8000_0000, 0);
    }

    #[test]
    fn full_sequence_ends_enabled() {
        let mut block = [0u32; BLOCK_WORDS];
        run(&mut block, ProgramStep::Full);
        assert_eq!(block[TIMING_CFG_3_WORD], 0x0107_1000);
        assert_ne!(block[SDRAM_CFG_WORD] & 0x8000_0000, 0);
    }
}
