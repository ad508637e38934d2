//! Register value synthesis.
//!
//! Turns the resolved [`MemctlOptions`], the timing envelope and the per-DIMM
//! geometry into a complete [`DdrCfgRegs`] image. Synthesis is pure: nothing
//! here touches hardware, so images can be computed, checked and compared
//! before a single register write happens.

use arbitrary_int::{u2, u3, u4, u5, u6, u7, u14};
use qoriq_ddr::regs::*;

use crate::options::{BurstLength, CHIP_SELECTS_PER_CTRL, MemctlOptions};
use crate::spd::DimmParams;
use crate::time::Hertz;
use crate::timing::CommonTimingParams;
use crate::util::{memory_clk_period_ps, picos_to_mclk};

/// Rank interleaving encodings reappear in CS bounds assignment.
const BA_INTLV_CS0_CS1: u8 = 0x40;
const BA_INTLV_CS2_CS3: u8 = 0x20;
const BA_INTLV_CS0_CS1_AND_CS2_CS3: u8 = 0x60;
const BA_INTLV_CS0_CS1_CS2_CS3: u8 = 0x64;

/// IP revisions above this support unique mode registers per chip select.
const IP_REV_UNQ_MRS: u32 = 0x40400;
/// IP revisions from 4.7 on carry the SLOW bit for data rates below 1250 MT/s.
const IP_REV_SLOW_BIT: u32 = 0x40700;

/// Per chip select register values.
#[derive(Debug, Clone, Copy)]
pub struct CsRegs {
    pub bnds: CsBounds,
    pub config: CsConfig,
    pub config_2: CsConfig2,
}

impl Default for CsRegs {
    fn default() -> Self {
        Self {
            bnds: CsBounds::new_with_raw_value(0),
            config: CsConfig::new_with_raw_value(0),
            config_2: CsConfig2::new_with_raw_value(0),
        }
    }
}

/// The full register image for one DDR controller.
#[derive(Debug, Clone, Copy)]
pub struct DdrCfgRegs {
    pub cs: [CsRegs; CHIP_SELECTS_PER_CTRL],
    pub timing_cfg_3: TimingCfg3,
    pub timing_cfg_0: TimingCfg0,
    pub timing_cfg_1: TimingCfg1,
    pub timing_cfg_2: TimingCfg2,
    pub sdram_cfg: SdramCfg,
    pub sdram_cfg_2: SdramCfg2,
    pub sdram_mode: SdramMode,
    pub sdram_mode_2: SdramMode2,
    pub sdram_mode_3: SdramMode,
    pub sdram_mode_4: SdramMode2,
    pub sdram_mode_5: SdramMode,
    pub sdram_mode_6: SdramMode2,
    pub sdram_mode_7: SdramMode,
    pub sdram_mode_8: SdramMode2,
    pub sdram_md_cntl: u32,
    pub sdram_interval: SdramInterval,
    pub sdram_data_init: u32,
    pub sdram_clk_cntl: SdramClkCntl,
    pub init_addr: u32,
    pub init_ext_addr: InitExtAddr,
    pub timing_cfg_4: TimingCfg4,
    pub timing_cfg_5: TimingCfg5,
    pub ddr_zq_cntl: ZqCntl,
    pub ddr_wrlvl_cntl: WrlvlCntl,
    pub ddr_wrlvl_cntl_2: u32,
    pub ddr_wrlvl_cntl_3: u32,
    pub ddr_sr_cntr: SrCntr,
    pub ddr_sdram_rcw_1: u32,
    pub ddr_sdram_rcw_2: u32,
    pub ddr_eor: Eor,
    pub ddr_cdr1: u32,
    pub ddr_cdr2: u32,
}

impl Default for DdrCfgRegs {
    fn default() -> Self {
        Self {
            cs: [CsRegs::default(); CHIP_SELECTS_PER_CTRL],
            timing_cfg_3: TimingCfg3::new_with_raw_value(0),
            timing_cfg_0: TimingCfg0::new_with_raw_value(0),
            timing_cfg_1: TimingCfg1::new_with_raw_value(0),
            timing_cfg_2: TimingCfg2::new_with_raw_value(0),
            sdram_cfg: SdramCfg::new_with_raw_value(0),
            sdram_cfg_2: SdramCfg2::new_with_raw_value(0),
            sdram_mode: SdramMode::new_with_raw_value(0),
            sdram_mode_2: SdramMode2::new_with_raw_value(0),
            sdram_mode_3: SdramMode::new_with_raw_value(0),
            sdram_mode_4: SdramMode2::new_with_raw_value(0),
            sdram_mode_5: SdramMode::new_with_raw_value(0),
            sdram_mode_6: SdramMode2::new_with_raw_value(0),
            sdram_mode_7: SdramMode::new_with_raw_value(0),
            sdram_mode_8: SdramMode2::new_with_raw_value(0),
            sdram_md_cntl: 0,
            sdram_interval: SdramInterval::new_with_raw_value(0),
            sdram_data_init: 0,
            sdram_clk_cntl: SdramClkCntl::new_with_raw_value(0),
            init_addr: 0,
            init_ext_addr: InitExtAddr::new_with_raw_value(0),
            timing_cfg_4: TimingCfg4::new_with_raw_value(0),
            timing_cfg_5: TimingCfg5::new_with_raw_value(0),
            ddr_zq_cntl: ZqCntl::new_with_raw_value(0),
            ddr_wrlvl_cntl: WrlvlCntl::new_with_raw_value(0),
            ddr_wrlvl_cntl_2: 0,
            ddr_wrlvl_cntl_3: 0,
            ddr_sr_cntr: SrCntr::new_with_raw_value(0),
            ddr_sdram_rcw_1: 0,
            ddr_sdram_rcw_2: 0,
            ddr_eor: Eor::new_with_raw_value(0),
            ddr_cdr1: 0,
            ddr_cdr2: 0,
        }
    }
}

impl DdrCfgRegs {
    /// Raw dump of every register in the image, in block order.
    pub fn raw_words(&self) -> [u32; 44] {
        [
            self.cs[0].bnds.raw_value(),
            self.cs[0].config.raw_value(),
            self.cs[0].config_2.raw_value(),
            self.cs[1].bnds.raw_value(),
            self.cs[1].config.raw_value(),
            self.cs[1].config_2.raw_value(),
            self.cs[2].bnds.raw_value(),
            self.cs[2].config.raw_value(),
            self.cs[2].config_2.raw_value(),
            self.cs[3].bnds.raw_value(),
            self.cs[3].config.raw_value(),
            self.cs[3].config_2.raw_value(),
            self.timing_cfg_3.raw_value(),
            self.timing_cfg_0.raw_value(),
            self.timing_cfg_1.raw_value(),
            self.timing_cfg_2.raw_value(),
            self.sdram_cfg.raw_value(),
            self.sdram_cfg_2.raw_value(),
            self.sdram_mode.raw_value(),
            self.sdram_mode_2.raw_value(),
            self.sdram_mode_3.raw_value(),
            self.sdram_mode_4.raw_value(),
            self.sdram_mode_5.raw_value(),
            self.sdram_mode_6.raw_value(),
            self.sdram_mode_7.raw_value(),
            self.sdram_mode_8.raw_value(),
            self.sdram_md_cntl,
            self.sdram_interval.raw_value(),
            self.sdram_data_init,
            self.sdram_clk_cntl.raw_value(),
            self.init_addr,
            self.init_ext_addr.raw_value(),
            self.timing_cfg_4.raw_value(),
            self.timing_cfg_5.raw_value(),
            self.ddr_zq_cntl.raw_value(),
            self.ddr_wrlvl_cntl.raw_value(),
            self.ddr_wrlvl_cntl_2,
            self.ddr_wrlvl_cntl_3,
            self.ddr_sr_cntr.raw_value(),
            self.ddr_sdram_rcw_1,
            self.ddr_sdram_rcw_2,
            self.ddr_eor.raw_value(),
            self.ddr_cdr1,
            self.ddr_cdr2,
        ]
    }
}

impl PartialEq for DdrCfgRegs {
    fn eq(&self, other: &Self) -> bool {
        self.raw_words() == other.raw_words()
    }
}

impl Eq for DdrCfgRegs {}

/// CAS write latency for DDR3, a pure function of the clock period.
///
/// CWL = 5 for tCK >= 2.5 ns, stepping up one latency per JEDEC speed bin down
/// to CWL = 12 at tCK >= 0.75 ns.
pub fn cas_write_latency(mclk_ps: u32) -> u32 {
    match mclk_ps {
        2500.. => 5,
        1875.. => 6,
        1500.. => 7,
        1250.. => 8,
        1070.. => 9,
        935.. => 10,
        833.. => 11,
        750.. => 12,
        _ => {
            log::warn!("CAS write latency out of range at tCK = {} ps", mclk_ps);
            12
        }
    }
}

/// A single quad-rank module or two dual-rank modules put termination loads on
/// both slots at once and need relaxed same-bus turnarounds.
fn avoid_odt_overlap(dimm_params: &[DimmParams]) -> bool {
    match dimm_params.len() {
        1 => dimm_params[0].n_ranks == 4,
        2 => {
            (dimm_params[0].n_ranks == 2 && dimm_params[1].n_ranks == 2)
                || dimm_params[0].n_ranks == 4
        }
        _ => false,
    }
}

/// Chip select configuration (CSn_CONFIG).
fn set_csn_config(
    dimm_number: usize,
    i: usize,
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    dimm_params: &[DimmParams],
) {
    let mut cs_en = false;
    let mut intlv_en = 0u32;
    let mut intlv_ctl = 0u32;
    let mut ap_en = false;
    let mut odt_rd_cfg = 0u32;
    let mut odt_wr_cfg = 0u32;
    let mut ba_bits = 0u32;
    let mut row_bits = 0u32;
    let mut col_bits = 0u32;

    // Only ranks that physically exist on the module get a config.
    let go_config = match i {
        0 => {
            let present = dimm_params[dimm_number].n_ranks > 0;
            // Interleaving fields live in CS0_CONFIG only.
            if present && popts.memctl_interleaving {
                intlv_en = 2;
                intlv_ctl = popts.memctl_interleaving_mode;
            }
            present
        }
        1 => {
            (dimm_number == 0 && dimm_params[0].n_ranks > 1)
                || (dimm_number == 1 && dimm_params[1].n_ranks > 0)
        }
        2 => {
            (dimm_number == 0 && dimm_params[0].n_ranks > 2)
                || (dimm_number >= 1 && dimm_params[dimm_number].n_ranks > 0)
        }
        3 => {
            (dimm_number == 0 && dimm_params[0].n_ranks > 3)
                || (dimm_number == 1 && dimm_params[1].n_ranks > 1)
        }
        _ => false,
    };

    if go_config {
        let dimm = &dimm_params[dimm_number];
        cs_en = true;
        ap_en = popts.cs_local_opts[i].auto_precharge;
        odt_rd_cfg = popts.cs_local_opts[i].odt_rd_cfg;
        odt_wr_cfg = popts.cs_local_opts[i].odt_wr_cfg;
        ba_bits = dimm.n_banks_per_sdram_device.ilog2() - 2;
        row_bits = dimm.n_row_addr - 12;
        col_bits = dimm.n_col_addr - 8;
    }

    regs.cs[i].config = CsConfig::new_with_raw_value(0)
        .with_cs_en(cs_en)
        .with_intlv_en(u2::extract_u32(intlv_en, 0))
        .with_intlv_ctl(u4::extract_u32(intlv_ctl, 0))
        .with_ap_en(ap_en)
        .with_odt_rd_cfg(u3::extract_u32(odt_rd_cfg, 0))
        .with_odt_wr_cfg(u3::extract_u32(odt_wr_cfg, 0))
        .with_ba_bits_cs(u2::extract_u32(ba_bits, 0))
        .with_row_bits_cs(u3::extract_u32(row_bits, 0))
        .with_col_bits_cs(u3::extract_u32(col_bits, 0));
    log::debug!("cs[{}].config = {:#010x}", i, regs.cs[i].config.raw_value());
}

/// Chip select configuration 2 (CSn_CONFIG_2). Partial array self refresh is
/// not used.
fn set_csn_config_2(i: usize, regs: &mut DdrCfgRegs) {
    regs.cs[i].config_2 = CsConfig2::new_with_raw_value(0).with_pasr_cfg(u3::new(0));
}

/// Turnaround and powerdown exit timings (TIMING_CFG_0).
fn set_timing_cfg_0(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    dimm_params: &[DimmParams],
) {
    let mclk_ps = memory_clk_period_ps(popts.ddr_freq);
    let data_rate_mhz = popts.ddr_freq.raw() / 1_000_000;
    let mut trrt_mclk = 0u32;
    let mut twwt_mclk = 0u32;

    if avoid_odt_overlap(dimm_params) {
        twwt_mclk = 2;
        trrt_mclk = 1;
    }
    // Faster clocks need more time for data setup on turnarounds.
    let mut trwt_mclk = if data_rate_mhz > 1800 { 2 } else { 1 };
    let twrt_mclk = u32::from(data_rate_mhz > 1150 || popts.memctl_interleaving);

    if let Some(trwt) = popts.trwt_override {
        trwt_mclk = trwt;
    }

    // DDR3 has no tXARD; tXP = max(3 nCK, 7.5 ns) covers the powerdown exits.
    let (act_pd_exit, pre_pd_exit, taxpd) = if popts.dynamic_power {
        let txp_ps = (mclk_ps * 3).max(7500);
        let exit = picos_to_mclk(popts.ddr_freq, txp_ps);
        (exit, exit, 1)
    } else {
        (1, 1, 1)
    };
    let tmrd_mclk = 4u32;

    regs.timing_cfg_0 = TimingCfg0::new_with_raw_value(0)
        .with_rwt(u2::extract_u32(trwt_mclk, 0))
        .with_wrt(u2::extract_u32(twrt_mclk, 0))
        .with_rrt(u2::extract_u32(trrt_mclk, 0))
        .with_wwt(u2::extract_u32(twwt_mclk, 0))
        .with_act_pd_exit(u4::extract_u32(act_pd_exit, 0))
        .with_pre_pd_exit(u4::extract_u32(pre_pd_exit, 0))
        .with_odt_pd_exit(u4::extract_u32(taxpd, 0))
        .with_mrs_cyc(u5::extract_u32(tmrd_mclk, 0));
    log::debug!("timing_cfg_0 = {:#010x}", regs.timing_cfg_0.raw_value());
}

/// Extension bits for intervals wider than their TIMING_CFG_1/2 fields
/// (TIMING_CFG_3).
fn set_timing_cfg_3(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    cas_latency: u32,
    additive_latency: u32,
) {
    let freq = popts.ddr_freq;
    let ext_pretoact = picos_to_mclk(freq, common_dimm.trp_ps) >> 4;
    let ext_acttopre = picos_to_mclk(freq, common_dimm.tras_ps) >> 4;
    let ext_acttorw = picos_to_mclk(freq, common_dimm.trcd_ps) >> 4;
    let ext_caslat = (2 * cas_latency - 1) >> 4;
    let ext_add_lat = additive_latency >> 4;
    let ext_refrec = (picos_to_mclk(freq, common_dimm.trfc_ps) - 8) >> 4;
    let ext_wrrec = (picos_to_mclk(freq, common_dimm.twr_ps)
        + if popts.otf_burst_chop_en { 2 } else { 0 })
        >> 4;

    regs.timing_cfg_3 = TimingCfg3::new_with_raw_value(0)
        .with_ext_pretoact(ext_pretoact & 1 != 0)
        .with_ext_acttopre(u2::extract_u32(ext_acttopre, 0))
        .with_ext_acttorw(ext_acttorw & 1 != 0)
        .with_ext_refrec(u5::extract_u32(ext_refrec, 0))
        .with_ext_caslat(u2::extract_u32(ext_caslat, 0))
        .with_ext_add_lat(ext_add_lat & 1 != 0)
        .with_ext_wrrec(ext_wrrec & 1 != 0)
        .with_cntl_adj(u3::new(0));
    log::debug!("timing_cfg_3 = {:#010x}", regs.timing_cfg_3.raw_value());
}

/// Core SDRAM timing intervals (TIMING_CFG_1).
fn set_timing_cfg_1(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    cas_latency: u32,
) {
    // The mode register cannot express write recoveries of 9, 11, 13 or 15
    // clocks, so those round up to the next even value.
    const WRREC_TABLE: [u32; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 10, 10, 12, 12, 14, 14, 0, 0];

    let freq = popts.ddr_freq;
    let pretoact_mclk = picos_to_mclk(freq, common_dimm.trp_ps);
    let acttopre_mclk = picos_to_mclk(freq, common_dimm.tras_ps);
    let acttorw_mclk = picos_to_mclk(freq, common_dimm.trcd_ps);

    // Latencies above 8 clocks spill into TIMING_CFG_3[EXT_CASLAT].
    let caslat_ctrl = 2 * cas_latency - 1;

    let refrec_ctrl = picos_to_mclk(freq, common_dimm.trfc_ps) - 8;
    let mut wrrec_mclk = picos_to_mclk(freq, common_dimm.twr_ps);
    if wrrec_mclk > 16 {
        log::error!("WRREC does not support more than 16 clocks");
    } else {
        wrrec_mclk = WRREC_TABLE[wrrec_mclk as usize - 1];
    }
    if popts.otf_burst_chop_en {
        wrrec_mclk += 2;
    }

    // JEDEC floors for DDR3: tRRD >= 4 nCK, tWTR >= 4 nCK.
    let acttoact_mclk = picos_to_mclk(freq, common_dimm.trrd_ps).max(4);
    let mut wrtord_mclk = picos_to_mclk(freq, common_dimm.twtr_ps).max(4);
    if popts.otf_burst_chop_en {
        wrtord_mclk += 2;
    }

    regs.timing_cfg_1 = TimingCfg1::new_with_raw_value(0)
        .with_pretoact(u4::extract_u32(pretoact_mclk, 0))
        .with_acttopre(u4::extract_u32(acttopre_mclk, 0))
        .with_acttorw(u4::extract_u32(acttorw_mclk, 0))
        .with_caslat(u4::extract_u32(caslat_ctrl, 0))
        .with_refrec(u4::extract_u32(refrec_ctrl, 0))
        .with_wrrec(u4::extract_u32(wrrec_mclk, 0))
        .with_acttoact(u4::extract_u32(acttoact_mclk, 0))
        .with_wrtord(u4::extract_u32(wrtord_mclk, 0));
    log::debug!("timing_cfg_1 = {:#010x}", regs.timing_cfg_1.raw_value());
}

/// Write latency, CKE pulse width and activate window (TIMING_CFG_2).
fn set_timing_cfg_2(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    additive_latency: u32,
) {
    let freq = popts.ddr_freq;
    let mclk_ps = memory_clk_period_ps(freq);
    let wr_lat = cas_write_latency(mclk_ps);

    // JEDEC floor for DDR3: tRTP >= 4 nCK.
    let mut rd_to_pre = picos_to_mclk(freq, common_dimm.trtp_ps).max(4);
    if popts.otf_burst_chop_en {
        rd_to_pre += 2;
    }

    let cke_pls = picos_to_mclk(freq, popts.tcke_clock_pulse_width_ps);
    let four_act = picos_to_mclk(freq, popts.tfaw_window_four_activates_ps);

    regs.timing_cfg_2 = TimingCfg2::new_with_raw_value(0)
        .with_add_lat(u4::extract_u32(additive_latency, 0))
        .with_cpo(u5::extract_u32(popts.cpo_override, 0))
        .with_wr_lat(u4::extract_u32(wr_lat, 0))
        .with_rd_to_pre(u5::extract_u32(rd_to_pre, 0))
        .with_wr_data_delay(u3::extract_u32(popts.write_data_delay, 0))
        .with_cke_pls(u3::extract_u32(cke_pls, 0))
        .with_four_act(u6::extract_u32(four_act, 0));
    log::debug!("timing_cfg_2 = {:#010x}", regs.timing_cfg_2.raw_value());
}

/// Register control words for registered DIMMs (DDR_SDRAM_RCW_1/2).
fn set_ddr_sdram_rcw(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
) {
    if !(common_dimm.all_dimms_registered && !common_dimm.all_dimms_unbuffered) {
        return;
    }
    if popts.rcw_override {
        regs.ddr_sdram_rcw_1 = popts.rcw_1;
        regs.ddr_sdram_rcw_2 = popts.rcw_2;
    } else {
        let pack = |words: &[u8]| {
            words
                .iter()
                .fold(0u32, |acc, &nibble| acc << 4 | u32::from(nibble & 0xF))
        };
        regs.ddr_sdram_rcw_1 = pack(&common_dimm.rcw[0..8]);
        regs.ddr_sdram_rcw_2 = pack(&common_dimm.rcw[8..16]);
    }
    log::debug!(
        "rcw_1 = {:#010x}, rcw_2 = {:#010x}",
        regs.ddr_sdram_rcw_1,
        regs.ddr_sdram_rcw_2
    );
}

/// Main control word (DDR_SDRAM_CFG). MEM_EN is set in the image; the
/// programming sequence masks it off until the very end.
fn set_ddr_sdram_cfg(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
) {
    let ecc_en = common_dimm.all_dimms_ecc_capable && popts.ecc_mode;

    let registered = common_dimm.all_dimms_registered && !common_dimm.all_dimms_unbuffered;
    let (rd_en, twot_en) = if registered {
        (true, false)
    } else {
        (false, popts.twot_en)
    };

    // Fixed BL8 is required on a 32-bit bus; on-the-fly clears the bit.
    let eight_be = match popts.burst_length {
        BurstLength::Bl8 => true,
        BurstLength::Otf => false,
        BurstLength::Bc4 => false,
    } || popts.data_bus_width == 1;

    let dbw = match popts.data_bus_width {
        0 => DataBusWidth::_64Bit,
        1 => DataBusWidth::_32Bit,
        _ => DataBusWidth::_16Bit,
    };

    regs.sdram_cfg = SdramCfg::new_with_raw_value(0)
        .with_mem_en(true)
        .with_sren(popts.self_refresh_in_sleep)
        .with_ecc_en(ecc_en)
        .with_rd_en(rd_en)
        .with_sdram_type(SdramType::Ddr3)
        .with_dyn_pwr(popts.dynamic_power)
        .with_dbw(dbw)
        .with_eight_be(eight_be)
        .with_ncap(false)
        .with_threet_en(popts.threet_en)
        .with_twot_en(twot_en)
        .with_ba_intlv_ctl(u7::new(popts.ba_intlv_ctl & 0x7F))
        .with_x32_en(false)
        .with_pchb8(false)
        .with_hse(popts.half_strength_driver_enable)
        .with_mem_halt(false)
        .with_bi(false);
    log::debug!("sdram_cfg = {:#010x}", regs.sdram_cfg.raw_value());
}

/// Secondary control word (DDR_SDRAM_CFG_2).
fn set_ddr_sdram_cfg_2(regs: &mut DdrCfgRegs, popts: &MemctlOptions, unq_mrs_en: bool) {
    // ODT asserted during reads only, as soon as any CS terminates.
    let odt_cfg = if popts
        .cs_local_opts
        .iter()
        .any(|cs| cs.odt_rd_cfg != 0 || cs.odt_wr_cfg != 0)
    {
        2
    } else {
        0
    };

    let slow = popts.ip_rev >= IP_REV_SLOW_BIT && popts.ddr_freq.raw() < 1_249_000_000;

    let (rcw_en, ap_en) = if popts.registered_dimm_en {
        (true, popts.ap_en)
    } else {
        (false, false)
    };

    let d_init = popts.ecc_init_using_memctl;
    if d_init {
        regs.sdram_data_init = popts.mem_init_value;
    }

    regs.sdram_cfg_2 = SdramCfg2::new_with_raw_value(0)
        .with_frc_sr(false)
        .with_sr_ie(false)
        .with_dll_rst_dis(true)
        .with_dqs_cfg(u2::extract_u32(popts.dqs_config, 0))
        .with_odt_cfg(u2::new(odt_cfg))
        .with_num_pr(u4::new(1))
        .with_slow(slow)
        .with_x4_en(popts.x4_en)
        .with_qd_en(popts.quad_rank_present)
        .with_unq_mrs_en(unq_mrs_en)
        .with_obc_cfg(popts.otf_burst_chop_en)
        .with_ap_en(ap_en)
        .with_d_init(d_init)
        .with_rcw_en(rcw_en)
        .with_md_en(popts.mirrored_dimm);
    log::debug!("sdram_cfg_2 = {:#010x}", regs.sdram_cfg_2.raw_value());
}

/// MR0/MR1 values for all chip selects (DDR_SDRAM_MODE and MODE_3/5/7).
fn set_ddr_sdram_mode(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    cas_latency: u32,
    additive_latency: u32,
    unq_mrs_en: bool,
) {
    // MR0[WR] encoding; write recoveries of 9, 11, 13 and 15 round up.
    const WR_TABLE: [u16; 12] = [1, 2, 3, 4, 5, 5, 6, 6, 7, 7, 0, 0];
    // MR0 CAS latency encoding for CL5..CL16.
    const CAS_LATENCY_TABLE: [u16; 12] =
        [0x2, 0x4, 0x6, 0x8, 0xA, 0xC, 0xE, 0x1, 0x3, 0x5, 0x7, 0x9];

    let mclk_ps = memory_clk_period_ps(popts.ddr_freq);

    let rtt = |cs: usize| -> u16 {
        if popts.rtt_override {
            popts.rtt_override_value as u16
        } else {
            popts.cs_local_opts[cs].odt_rtt_norm as u16
        }
    };

    let al: u16 = if additive_latency == cas_latency.wrapping_sub(1) {
        1
    } else if additive_latency == cas_latency.wrapping_sub(2) {
        2
    } else {
        0
    };

    // Quad-rank loads want the lighter 240/7 ohm output driver.
    let dic: u16 = if popts.quad_rank_present { 1 } else { 0 };

    // MR1. The controller drives the write-leveling bit itself during
    // training, so it stays clear here. The Rtt_Nom and DIC fields are split
    // across non-adjacent bits.
    let esdmode_for = |rtt: u16| -> u16 {
        (rtt & 0x4) << 7
            | (rtt & 0x2) << 5
            | (dic & 0x2) << 4
            | (al & 0x3) << 3
            | (rtt & 0x1) << 2
            | (dic & 0x1) << 1
    };
    let esdmode = esdmode_for(rtt(0));

    // MR0: DLL on for fast precharge powerdown exit, no DLL reset, normal
    // mode, sequential bursts.
    let wr_mclk = common_dimm.twr_ps.div_ceil(mclk_ps);
    let wr = if (5..=16).contains(&wr_mclk) {
        WR_TABLE[wr_mclk as usize - 5]
    } else {
        log::error!("unsupported write recovery for mode register: {}", wr_mclk);
        0
    };

    let caslat: u16 = if (5..=16).contains(&cas_latency) {
        CAS_LATENCY_TABLE[cas_latency as usize - 5]
    } else {
        log::error!("unsupported CAS latency for mode register");
        4
    };

    let bl: u16 = match popts.burst_length {
        BurstLength::Bl8 => 0,
        BurstLength::Otf => 1,
        BurstLength::Bc4 => 2,
    };

    let sdmode = (1 << 12) | (wr & 0x7) << 9 | ((caslat >> 1) & 0x7) << 4 | (caslat & 1) << 2 | bl;

    regs.sdram_mode = SdramMode::new_with_raw_value(0)
        .with_esdmode(esdmode)
        .with_sdmode(sdmode);
    log::debug!("sdram_mode = {:#010x}", regs.sdram_mode.raw_value());

    if unq_mrs_en {
        // Per chip select mode registers differ only in Rtt_Nom.
        for cs in 1..CHIP_SELECTS_PER_CTRL {
            let esdmode = esdmode_for(rtt(cs));
            let mode = SdramMode::new_with_raw_value(0)
                .with_esdmode(esdmode)
                .with_sdmode(sdmode);
            match cs {
                1 => regs.sdram_mode_3 = mode,
                2 => regs.sdram_mode_5 = mode,
                _ => regs.sdram_mode_7 = mode,
            }
        }
    }
}

/// MR2/MR3 values for all chip selects (DDR_SDRAM_MODE_2 and MODE_4/6/8).
fn set_ddr_sdram_mode_2(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    unq_mrs_en: bool,
) {
    let mclk_ps = memory_clk_period_ps(popts.ddr_freq);
    let cwl = (cas_write_latency(mclk_ps) - 5) as u16;
    let srt: u16 = common_dimm.extended_op_srt as u16;

    let rtt_wr = |cs: usize| -> u16 {
        if popts.rtt_override {
            popts.rtt_wr_override_value as u16
        } else {
            popts.cs_local_opts[cs].odt_rtt_wr as u16
        }
    };

    let esdmode2_for =
        |rtt_wr: u16| -> u16 { (rtt_wr & 0x3) << 9 | (srt & 0x1) << 7 | (cwl & 0x7) << 3 };

    regs.sdram_mode_2 = SdramMode2::new_with_raw_value(0)
        .with_esdmode2(esdmode2_for(rtt_wr(0)))
        .with_esdmode3(0);
    log::debug!("sdram_mode_2 = {:#010x}", regs.sdram_mode_2.raw_value());

    if unq_mrs_en {
        for cs in 1..CHIP_SELECTS_PER_CTRL {
            let mode = SdramMode2::new_with_raw_value(0)
                .with_esdmode2(esdmode2_for(rtt_wr(cs)))
                .with_esdmode3(0);
            match cs {
                1 => regs.sdram_mode_4 = mode,
                2 => regs.sdram_mode_6 = mode,
                _ => regs.sdram_mode_8 = mode,
            }
        }
    }
}

/// Refresh and precharge intervals (DDR_SDRAM_INTERVAL).
fn set_ddr_sdram_interval(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
) {
    let refint = picos_to_mclk(popts.ddr_freq, common_dimm.refresh_rate_ps);
    regs.sdram_interval = SdramInterval::new_with_raw_value(0)
        .with_refint(refint as u16)
        .with_bstopre(u14::extract_u32(popts.bstopre, 0));
    log::debug!("sdram_interval = {:#010x}", regs.sdram_interval.raw_value());
}

/// Clock adjust in eighths of a cycle (DDR_SDRAM_CLK_CNTL).
fn set_ddr_sdram_clk_cntl(regs: &mut DdrCfgRegs, popts: &MemctlOptions) {
    regs.sdram_clk_cntl =
        SdramClkCntl::new_with_raw_value(0).with_clk_adjust(u4::extract_u32(popts.clk_adjust, 0));
}

/// Same-chip-select turnarounds and DLL lock time (TIMING_CFG_4).
fn set_timing_cfg_4(regs: &mut DdrCfgRegs, popts: &MemctlOptions) {
    // Fixed BL8 keeps BL/2 turnarounds; BC4 and OTF need BL/2 + 2.
    let (rrt, wwt) = if popts.burst_length == BurstLength::Bl8 {
        (0, 0)
    } else {
        (2, 2)
    };
    regs.timing_cfg_4 = TimingCfg4::new_with_raw_value(0)
        .with_rwt(u4::new(0))
        .with_wrt(u4::new(0))
        .with_rrt(u4::new(rrt))
        .with_wwt(u4::new(wwt))
        .with_dll_lock(u2::new(1)); // tDLLK = 512 clocks
    log::debug!("timing_cfg_4 = {:#010x}", regs.timing_cfg_4.raw_value());
}

/// ODT switching windows (TIMING_CFG_5).
fn set_timing_cfg_5(regs: &mut DdrCfgRegs, cas_latency: u32) {
    let wr_lat = regs.timing_cfg_2.wr_lat().value() as u32;
    let rodt_on = cas_latency - wr_lat + 1;
    regs.timing_cfg_5 = TimingCfg5::new_with_raw_value(0)
        .with_rodt_on(u5::extract_u32(rodt_on, 0))
        .with_rodt_off(u3::new(4))
        .with_wodt_on(u5::new(1))
        .with_wodt_off(u3::new(4));
    log::debug!("timing_cfg_5 = {:#010x}", regs.timing_cfg_5.raw_value());
}

/// ZQ calibration intervals (DDR_ZQ_CNTL).
fn set_ddr_zq_cntl(regs: &mut DdrCfgRegs, zq_en: bool) {
    regs.ddr_zq_cntl = if zq_en {
        ZqCntl::new_with_raw_value(0)
            .with_zq_en(true)
            .with_zqinit(u4::new(9)) // 512 clocks
            .with_zqoper(u4::new(8)) // 256 clocks
            .with_zqcs(u4::new(6)) // 64 clocks
    } else {
        ZqCntl::new_with_raw_value(0)
    };
}

/// Write leveling timings (DDR_WRLVL_CNTL and CNTL_2/3).
fn set_ddr_wrlvl_cntl(regs: &mut DdrCfgRegs, wrlvl_en: bool, popts: &MemctlOptions) {
    if wrlvl_en {
        // Sample time needs at least tWLO + 6 clocks for propagation delay;
        // start time is the first DQS adjust and usually board specific.
        let (smpl, start) = if popts.wrlvl_override {
            (popts.wrlvl_sample, popts.wrlvl_start)
        } else {
            (0xF, 0x8)
        };
        regs.ddr_wrlvl_cntl = WrlvlCntl::new_with_raw_value(0)
            .with_wrlvl_en(true)
            .with_wrlvl_mrd(u3::new(0x6)) // tWL_MRD min 40 nCK, set 64
            .with_wrlvl_odten(u3::new(0x7)) // tWL_ODTEN 128
            .with_wrlvl_dqsen(u3::new(0x5)) // tWL_DQSEN min 25 nCK, set 32
            .with_wrlvl_smpl(u4::extract_u32(smpl, 0))
            .with_wrlvl_wlr(u3::new(0x6)) // repetition, tWLO + 6 clocks
            .with_wrlvl_start(u5::extract_u32(start, 0));
    }
    regs.ddr_wrlvl_cntl_2 = popts.wrlvl_ctl_2;
    regs.ddr_wrlvl_cntl_3 = popts.wrlvl_ctl_3;
    log::debug!("wrlvl_cntl = {:#010x}", regs.ddr_wrlvl_cntl.raw_value());
}

/// Self refresh idle threshold (DDR_SR_CNTR).
fn set_ddr_sr_cntr(regs: &mut DdrCfgRegs, sr_it: u32) {
    regs.ddr_sr_cntr = SrCntr::new_with_raw_value(0).with_sr_it(u4::extract_u32(sr_it, 0));
}

fn set_ddr_eor(regs: &mut DdrCfgRegs, popts: &MemctlOptions) {
    if popts.addr_hash {
        regs.ddr_eor = Eor::new_with_raw_value(0).with_addr_hash_en(true);
        log::info!("address hashing enabled");
    }
}

/// Chip select bounds (CSn_BNDS) for every rank, honoring rank and controller
/// interleaving. Both addresses program as physical address >> 24.
fn set_cs_bounds(
    regs: &mut DdrCfgRegs,
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    dimm_params: &[DimmParams],
    dbw_cap_adj: u32,
) {
    let cs_per_dimm = CHIP_SELECTS_PER_CTRL / dimm_params.len();
    // Bus width adjusted total, so interleaved bounds never claim more than
    // the narrowed data bus can address.
    let total_mem = common_dimm.total_mem >> dbw_cap_adj;
    let mut cs_en = true;

    for i in 0..CHIP_SELECTS_PER_CTRL {
        let dimm_number = i / cs_per_dimm;
        let dimm = &dimm_params[dimm_number];
        let rank_density = dimm.rank_density >> dbw_cap_adj;

        if dimm.n_ranks == 0 {
            log::debug!("skipping CS{}: DIMM {} not present", i, dimm_number);
            continue;
        }

        let (mut sa, mut ea): (u64, u64);
        if popts.memctl_interleaving {
            // All interleaved chip selects share the controller's full range.
            match popts.ba_intlv_ctl & BA_INTLV_CS0_CS1_CS2_CS3 {
                BA_INTLV_CS0_CS1_CS2_CS3 => {}
                BA_INTLV_CS0_CS1 | BA_INTLV_CS0_CS1_AND_CS2_CS3 => {
                    if i > 1 {
                        cs_en = false;
                    }
                }
                _ => {
                    if i > 0 {
                        cs_en = false;
                    }
                }
            }
            sa = common_dimm.base_address;
            ea = sa + total_mem - 1;
        } else {
            match popts.ba_intlv_ctl & BA_INTLV_CS0_CS1_CS2_CS3 {
                BA_INTLV_CS0_CS1_CS2_CS3 => {
                    sa = common_dimm.base_address;
                    ea = sa + total_mem - 1;
                }
                BA_INTLV_CS0_CS1_AND_CS2_CS3 => {
                    if i >= 2 && dimm_number == 0 {
                        sa = dimm.base_address + 2 * rank_density;
                        ea = sa + 2 * rank_density - 1;
                    } else {
                        sa = dimm.base_address;
                        ea = sa + 2 * rank_density - 1;
                    }
                }
                BA_INTLV_CS0_CS1 => {
                    if dimm.n_ranks > (i % cs_per_dimm) as u32 {
                        sa = dimm.base_address;
                        ea = sa + rank_density - 1;
                        if i != 1 {
                            sa += (i % cs_per_dimm) as u64 * rank_density;
                        }
                        ea += (i % cs_per_dimm) as u64 * rank_density;
                    } else {
                        sa = 0;
                        ea = 0;
                    }
                    if i == 0 {
                        ea += rank_density;
                    }
                }
                BA_INTLV_CS2_CS3 => {
                    if dimm.n_ranks > (i % cs_per_dimm) as u32 {
                        sa = dimm.base_address;
                        ea = sa + rank_density - 1;
                        if i != 3 {
                            sa += (i % cs_per_dimm) as u64 * rank_density;
                        }
                        ea += (i % cs_per_dimm) as u64 * rank_density;
                    } else {
                        sa = 0;
                        ea = 0;
                    }
                    if i == 2 {
                        ea += rank_density;
                    }
                }
                _ => {
                    // No rank interleaving: each rank owns a contiguous slice.
                    sa = dimm.base_address;
                    ea = sa + rank_density - 1;
                    if dimm.n_ranks > (i % cs_per_dimm) as u32 {
                        sa += (i % cs_per_dimm) as u64 * rank_density;
                        ea += (i % cs_per_dimm) as u64 * rank_density;
                    } else {
                        sa = 0;
                        ea = 0;
                    }
                }
            }
        }

        sa >>= 24;
        ea >>= 24;

        regs.cs[i].bnds = if cs_en {
            CsBounds::new_with_raw_value(0)
                .with_start_addr(sa as u16)
                .with_end_addr(ea as u16)
        } else {
            // Inactive interleaved chip selects get all-ones bounds.
            CsBounds::new_with_raw_value(0xFFFF_FFFF)
        };
        log::debug!("cs[{}].bnds = {:#010x}", i, regs.cs[i].bnds.raw_value());

        set_csn_config(dimm_number, i, regs, popts, dimm_params);
        set_csn_config_2(i, regs);
    }
}

/// Synthesize the complete register image.
///
/// With `size_only` set, only the chip select bounds and configs are computed,
/// which is all that address assignment needs.
pub fn compute_memctl_config_regs(
    popts: &MemctlOptions,
    common_dimm: &CommonTimingParams,
    dimm_params: &[DimmParams],
    dbw_cap_adj: u32,
    size_only: bool,
) -> DdrCfgRegs {
    let mut regs = DdrCfgRegs::default();

    let cas_latency = popts
        .cas_latency_override
        .unwrap_or(common_dimm.lowest_common_spd_caslat);
    let additive_latency = popts
        .additive_latency_override
        .unwrap_or(common_dimm.additive_latency);
    let sr_it = if popts.auto_self_refresh_en {
        popts.sr_it
    } else {
        0
    };

    set_cs_bounds(&mut regs, popts, common_dimm, dimm_params, dbw_cap_adj);

    if size_only {
        return regs;
    }

    set_ddr_eor(&mut regs, popts);
    set_timing_cfg_0(&mut regs, popts, dimm_params);
    set_timing_cfg_3(&mut regs, popts, common_dimm, cas_latency, additive_latency);
    set_timing_cfg_1(&mut regs, popts, common_dimm, cas_latency);
    set_timing_cfg_2(&mut regs, popts, common_dimm, additive_latency);

    regs.ddr_cdr1 = popts.ddr_cdr1;
    regs.ddr_cdr2 = popts.ddr_cdr2;
    set_ddr_sdram_cfg(&mut regs, popts, common_dimm);

    let unq_mrs_en = popts.ip_rev > IP_REV_UNQ_MRS;
    set_ddr_sdram_cfg_2(&mut regs, popts, unq_mrs_en);
    set_ddr_sdram_mode(
        &mut regs,
        popts,
        common_dimm,
        cas_latency,
        additive_latency,
        unq_mrs_en,
    );
    set_ddr_sdram_mode_2(&mut regs, popts, common_dimm, unq_mrs_en);
    set_ddr_sdram_interval(&mut regs, popts, common_dimm);
    set_ddr_sdram_clk_cntl(&mut regs, popts);
    set_timing_cfg_4(&mut regs, popts);
    set_timing_cfg_5(&mut regs, cas_latency);
    set_ddr_zq_cntl(&mut regs, popts.zq_en);
    set_ddr_wrlvl_cntl(&mut regs, popts.wrlvl_en, popts);
    set_ddr_sr_cntr(&mut regs, sr_it);
    set_ddr_sdram_rcw(&mut regs, popts, common_dimm);

    regs
}

/// Validate an image before programming. Returns the number of problems found.
pub fn check_memctl_config_regs(regs: &DdrCfgRegs) -> u32 {
    let mut res = 0;

    // Registered DIMM operation and 2T timing are mutually exclusive.
    if regs.sdram_cfg.rd_en() && regs.sdram_cfg.twot_en() {
        log::error!("RD_EN and 2T_EN must not be set at the same time");
        res += 1;
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardSpecificParameters;
    use crate::options::{DdrConfig, populate_memctl_options};

    const DDR3_1600: Hertz = Hertz::from_raw(1_600_000_000);

    fn test_dimm() -> DimmParams {
        DimmParams {
            n_ranks: 2,
            rank_density: 1 << 30,
            capacity: 2 << 30,
            primary_sdram_width: 64,
            device_width: 8,
            n_row_addr: 14,
            n_col_addr: 10,
            n_banks_per_sdram_device: 8,
            burst_lengths_bitmask: 0x0C,
            caslat_x: 0x0FE0,
            taa_ps: 13_125,
            tck_min_x_ps: 1250,
            tck_max_ps: 3300,
            twr_ps: 15_000,
            trcd_ps: 13_125,
            trrd_ps: 6_000,
            trp_ps: 13_125,
            tras_ps: 35_000,
            trc_ps: 48_125,
            trfc_ps: 160_000,
            twtr_ps: 7_500,
            trtp_ps: 7_500,
            tfaw_ps: 40_000,
            refresh_rate_ps: 7_800_000,
            ..Default::default()
        }
    }

    fn test_common() -> CommonTimingParams {
        CommonTimingParams {
            tckmin_x_ps: 1250,
            tckmax_ps: 3300,
            taamin_ps: 13_125,
            caslat_x: 0x0FE0,
            lowest_common_spd_caslat: 11,
            additive_latency: 0,
            twr_ps: 15_000,
            trcd_ps: 13_125,
            trp_ps: 13_125,
            tras_ps: 35_000,
            trc_ps: 48_125,
            trfc_ps: 160_000,
            trrd_ps: 6_000,
            twtr_ps: 7_500,
            trtp_ps: 7_500,
            tfaw_ps: 40_000,
            refresh_rate_ps: 7_800_000,
            all_dimms_burst_lengths_bitmask: 0x0C,
            all_dimms_unbuffered: true,
            total_mem: 4 << 30,
            ndimms_present: 2,
            ..Default::default()
        }
    }

    fn test_board() -> BoardSpecificParameters {
        BoardSpecificParameters {
            n_ranks: 2,
            datarate_mhz_high: 1666,
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

    fn test_popts(dimms: &[DimmParams]) -> MemctlOptions {
        populate_memctl_options(&DdrConfig::default(), &test_common(), dimms, &test_board())
    }

    #[test]
    fn timing_registers_for_ddr3_1600() {
        let dimms = [test_dimm(), DimmParams::default()];
        let regs =
            compute_memctl_config_regs(&test_popts(&dimms), &test_common(), &dimms, 0, false);

        // tRP 13.125 ns -> 11, tRAS 35 ns -> 28 (4 low bits), tRCD -> 11,
        // CL11 -> ctrl 21 (low nibble 5), tRFC 160 ns -> 128 - 8 = 120
        // (low nibble 8), tWR 12 clocks + 2 OTF -> 14, tRRD -> 5,
        // tWTR 6 + 2 OTF -> 8.
        assert_eq!(regs.timing_cfg_1.raw_value(), 0xBCB5_8E58);
        // Extension bits for tRAS, tRFC and CAS latency.
        assert_eq!(regs.timing_cfg_3.raw_value(), 0x0107_1000);
        // CPO 0x1F, CWL 8, tRTP 6 + 2, write data delay 2, tCKE 3, tFAW 32.
        assert_eq!(regs.timing_cfg_2.raw_value(), 0x0FC1_08E0);
    }

    #[test]
    fn mode_registers_for_ddr3_1600() {
        let dimms = [test_dimm(), DimmParams::default()];
        let regs =
            compute_memctl_config_regs(&test_popts(&dimms), &test_common(), &dimms, 0, false);

        // MR1: Rtt_Nom 40 ohm (split field), no AL, full drive.
        // MR0: DLL on, WR 12 -> 6, CL11 -> 0xE, OTF bursts.
        assert_eq!(regs.sdram_mode.raw_value(), 0x0044_1C71);
        // MR2: CWL 8 -> 3, Rtt_WR off.
        assert_eq!(regs.sdram_mode_2.raw_value(), 0x0018_0000);
        // Unique mode registers mirror MR0 with per-CS Rtt_Nom (off for
        // unpopulated CS1..3 of a single dual-rank DIMM on CS0/CS1).
        assert_eq!(regs.sdram_mode_3.esdmode(), 0x0000);
        assert_eq!(regs.sdram_mode_3.sdmode(), 0x1C71);
    }

    #[test]
    fn control_registers_for_ddr3_1600() {
        let dimms = [test_dimm(), DimmParams::default()];
        let regs =
            compute_memctl_config_regs(&test_popts(&dimms), &test_common(), &dimms, 0, false);

        let cfg = regs.sdram_cfg;
        assert!(cfg.mem_en());
        assert!(cfg.sren());
        assert!(!cfg.ecc_en());
        assert!(!cfg.rd_en());
        assert_eq!(cfg.sdram_type(), Ok(SdramType::Ddr3));
        assert_eq!(cfg.dbw(), Ok(DataBusWidth::_64Bit));
        assert!(!cfg.eight_be()); // on-the-fly burst chop

        let cfg2 = regs.sdram_cfg_2;
        assert!(cfg2.dll_rst_dis());
        assert_eq!(cfg2.odt_cfg().value(), 2);
        assert!(cfg2.unq_mrs_en()); // IP rev 4.7 supports unique MRS
        assert!(cfg2.obc_cfg());
        assert!(!cfg2.d_init());

        // tREFI 7.8 us at 1600 MT/s is 6240 clocks, BSTOPRE default 0x100.
        assert_eq!(regs.sdram_interval.raw_value(), 0x1860_0100);
        assert_eq!(regs.sdram_clk_cntl.clk_adjust().value(), 5);

        // rodt_on = CL - CWL + 1 = 11 - 8 + 1.
        assert_eq!(regs.timing_cfg_5.rodt_on().value(), 4);

        let zq = regs.ddr_zq_cntl;
        assert!(zq.zq_en());
        assert_eq!(zq.zqinit().value(), 9);

        let wrlvl = regs.ddr_wrlvl_cntl;
        assert!(wrlvl.wrlvl_en());
        assert_eq!(wrlvl.wrlvl_start().value(), 6);
        assert_eq!(wrlvl.wrlvl_smpl().value(), 0xF);
    }

    #[test]
    fn cs_bounds_cover_each_rank() {
        let mut dimm = test_dimm();
        dimm.base_address = 0;
        let dimms = [dimm, DimmParams::default()];
        let regs =
            compute_memctl_config_regs(&test_popts(&dimms), &test_common(), &dimms, 0, false);

        // Two 1 GiB ranks on the first DIMM: CS0 covers 0..1G, CS1 1G..2G.
        assert_eq!(regs.cs[0].bnds.raw_value(), 0x0000_003F);
        assert_eq!(regs.cs[1].bnds.raw_value(), 0x0040_007F);
        assert!(regs.cs[0].config.cs_en());
        assert!(regs.cs[1].config.cs_en());
        assert!(!regs.cs[2].config.cs_en());

        // Geometry: 8 banks -> 1, 14 rows -> 2, 10 columns -> 2.
        assert_eq!(regs.cs[0].config.ba_bits_cs().value(), 1);
        assert_eq!(regs.cs[0].config.row_bits_cs().value(), 2);
        assert_eq!(regs.cs[0].config.col_bits_cs().value(), 2);
    }

    #[test]
    fn interleaved_bounds_respect_bus_width_adjust() {
        // Four ranks interleaved across CS0..CS3 on a 32-bit bus: every CS
        // claims the shared range, which is half the raw module capacity.
        let dimms = [test_dimm(), test_dimm()];
        let mut popts = test_popts(&dimms);
        popts.ba_intlv_ctl = BA_INTLV_CS0_CS1_CS2_CS3;
        popts.data_bus_width = 1;
        popts.burst_length = BurstLength::Bl8;
        popts.otf_burst_chop_en = false;

        let regs = compute_memctl_config_regs(&popts, &test_common(), &dimms, 1, false);
        // 4 GiB of modules map 2 GiB: end_addr 0x7F, not 0xFF.
        assert_eq!(regs.cs[0].bnds.raw_value(), 0x0000_007F);
        assert_eq!(regs.cs[3].bnds.raw_value(), 0x0000_007F);
        assert!(regs.cs[3].config.cs_en());
    }

    #[test]
    fn size_only_skips_timing_synthesis() {
        let dimms = [test_dimm(), DimmParams::default()];
        let regs =
            compute_memctl_config_regs(&test_popts(&dimms), &test_common(), &dimms, 0, true);
        assert!(regs.cs[0].config.cs_en());
        assert_eq!(regs.timing_cfg_1.raw_value(), 0);
        assert_eq!(regs.sdram_cfg.raw_value(), 0);
    }

    #[test]
    fn synthesis_is_deterministic() {
        let dimms = [test_dimm(), DimmParams::default()];
        let popts = test_popts(&dimms);
        let a = compute_memctl_config_regs(&popts, &test_common(), &dimms, 0, false);
        let b = compute_memctl_config_regs(&popts, &test_common(), &dimms, 0, false);
        assert_eq!(a, b);
    }

    #[test]
    fn registered_dimms_program_control_words() {
        let mut dimm = test_dimm();
        dimm.registered_dimm = true;
        let mut common = test_common();
        common.all_dimms_registered = true;
        common.all_dimms_unbuffered = false;
        common.rcw = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0xA, 0xB, 0xC, 0xD, 0xE, 0xF];
        let dimms = [dimm, DimmParams::default()];
        let mut popts = test_popts(&dimms);
        popts.registered_dimm_en = true;

        let regs = compute_memctl_config_regs(&popts, &common, &dimms, 0, false);
        assert_eq!(regs.ddr_sdram_rcw_1, 0x0123_4567);
        assert_eq!(regs.ddr_sdram_rcw_2, 0x89AB_CDEF);
        assert!(regs.sdram_cfg.rd_en());
        assert!(!regs.sdram_cfg.twot_en());
        assert!(regs.sdram_cfg_2.rcw_en());
    }

    #[test]
    fn check_flags_rd_en_with_2t() {
        let mut regs = DdrCfgRegs::default();
        assert_eq!(check_memctl_config_regs(&regs), 0);
        regs.sdram_cfg = regs.sdram_cfg.with_rd_en(true).with_twot_en(true);
        assert_eq!(check_memctl_config_regs(&regs), 1);
    }

    #[test]
    fn cas_write_latency_bins() {
        assert_eq!(cas_write_latency(2500), 5);
        assert_eq!(cas_write_latency(1875), 6);
        assert_eq!(cas_write_latency(1250), 8);
        assert_eq!(cas_write_latency(1071), 9);
        assert_eq!(cas_write_latency(833), 11);
        assert_eq!(cas_write_latency(700), 12);
    }
}
