//! # PAC for the Freescale/NXP QorIQ DDR memory controller
//!
//! Register-level definitions for the DDR SDRAM memory controller block found in the
//! CCSR space of QorIQ and PowerQUICC III SoCs. The layout follows the `ccsr_ddr`
//! block of the reference manuals (e.g. T4240RM chapter "DDR Memory Controller").
#![no_std]

pub const CCSR_BASE_ADDR: usize = 0xFE00_0000;

/// Offsets of the DDR controller register blocks inside the CCSR space.
pub const DDRC_OFFSETS: [usize; 3] = [0x8000, 0x9000, 0xA000];

pub mod regs {
    use arbitrary_int::{u2, u3, u4, u5, u7, u14};

    #[bitbybit::bitenum(u3, exhaustive = false)]
    #[derive(Debug, PartialEq, Eq)]
    pub enum SdramType {
        Ddr1 = 0b010,
        Ddr2 = 0b011,
        Lpddr1 = 0b110,
        Ddr3 = 0b111,
    }

    #[bitbybit::bitenum(u2, exhaustive = false)]
    #[derive(Debug, PartialEq, Eq)]
    pub enum DataBusWidth {
        _64Bit = 0b00,
        _32Bit = 0b01,
        _16Bit = 0b10,
    }

    /// Chip select memory bounds (CSn_BNDS).
    ///
    /// Both addresses are the physical address shifted right by 24 bits.
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct CsBounds {
        #[bits(16..=31, rw)]
        start_addr: u16,
        #[bits(0..=15, rw)]
        end_addr: u16,
    }

    /// Chip select configuration (CSn_CONFIG).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct CsConfig {
        #[bit(31, rw)]
        cs_en: bool,
        /// Memory controller interleave enable, CS0_CONFIG only.
        #[bits(29..=30, rw)]
        intlv_en: u2,
        /// Interleaving control, CS0_CONFIG only.
        #[bits(24..=27, rw)]
        intlv_ctl: u4,
        #[bit(23, rw)]
        ap_en: bool,
        #[bits(20..=22, rw)]
        odt_rd_cfg: u3,
        #[bits(16..=18, rw)]
        odt_wr_cfg: u3,
        /// Number of bank address bits minus 2.
        #[bits(14..=15, rw)]
        ba_bits_cs: u2,
        /// Number of row address bits minus 12.
        #[bits(8..=10, rw)]
        row_bits_cs: u3,
        /// Number of column address bits minus 8.
        #[bits(0..=2, rw)]
        col_bits_cs: u3,
    }

    /// Chip select configuration 2 (CSn_CONFIG_2).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct CsConfig2 {
        /// Partial array self refresh configuration.
        #[bits(24..=26, rw)]
        pasr_cfg: u3,
    }

    /// DDR SDRAM timing configuration 0 (TIMING_CFG_0).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg0 {
        /// Read-to-write turnaround.
        #[bits(30..=31, rw)]
        rwt: u2,
        /// Write-to-read turnaround.
        #[bits(28..=29, rw)]
        wrt: u2,
        /// Read-to-read turnaround.
        #[bits(26..=27, rw)]
        rrt: u2,
        /// Write-to-write turnaround.
        #[bits(24..=25, rw)]
        wwt: u2,
        /// Active powerdown exit timing (tXARD/tXP).
        #[bits(20..=23, rw)]
        act_pd_exit: u4,
        /// Precharge powerdown exit timing (tXP).
        #[bits(16..=19, rw)]
        pre_pd_exit: u4,
        /// ODT powerdown exit timing (tAXPD).
        #[bits(8..=11, rw)]
        odt_pd_exit: u4,
        /// Mode register set cycle time (tMRD).
        #[bits(0..=4, rw)]
        mrs_cyc: u5,
    }

    /// DDR SDRAM timing configuration 1 (TIMING_CFG_1).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg1 {
        /// Precharge-to-activate interval (tRP).
        #[bits(28..=31, rw)]
        pretoact: u4,
        /// Activate-to-precharge interval (tRAS).
        #[bits(24..=27, rw)]
        acttopre: u4,
        /// Activate-to-read/write interval (tRCD).
        #[bits(20..=23, rw)]
        acttorw: u4,
        /// MCAS latency from read command.
        #[bits(16..=19, rw)]
        caslat: u4,
        /// Refresh recovery time (tRFC), low bits.
        #[bits(12..=15, rw)]
        refrec: u4,
        /// Last data to precharge minimum interval (tWR).
        #[bits(8..=11, rw)]
        wrrec: u4,
        /// Activate-to-activate interval (tRRD).
        #[bits(4..=7, rw)]
        acttoact: u4,
        /// Last write data pair to read command issue interval (tWTR).
        #[bits(0..=3, rw)]
        wrtord: u4,
    }

    /// DDR SDRAM timing configuration 2 (TIMING_CFG_2).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg2 {
        /// Additive latency.
        #[bits(28..=31, rw)]
        add_lat: u4,
        /// CAS-to-preamble override.
        #[bits(23..=27, rw)]
        cpo: u5,
        /// Write latency.
        #[bits(19..=22, rw)]
        wr_lat: u4,
        /// Read to precharge (tRTP).
        #[bits(13..=17, rw)]
        rd_to_pre: u5,
        /// Write command to write data strobe timing adjustment.
        #[bits(10..=12, rw)]
        wr_data_delay: u3,
        /// Minimum CKE pulse width (tCKE).
        #[bits(6..=8, rw)]
        cke_pls: u3,
        /// Window for four activates (tFAW).
        #[bits(0..=5, rw)]
        four_act: arbitrary_int::u6,
    }

    /// Extended timing fields (TIMING_CFG_3).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg3 {
        /// Extended precharge to activate interval (tRP), bit 4 of the field.
        #[bit(28, rw)]
        ext_pretoact: bool,
        /// Extended activate to precharge interval (tRAS).
        #[bits(24..=25, rw)]
        ext_acttopre: u2,
        /// Extended activate to read/write interval (tRCD).
        #[bit(22, rw)]
        ext_acttorw: bool,
        /// Extended refresh recovery time (tRFC).
        #[bits(16..=20, rw)]
        ext_refrec: u5,
        /// Extended MCAS latency from read command.
        #[bits(12..=13, rw)]
        ext_caslat: u2,
        /// Extended additive latency.
        #[bit(10, rw)]
        ext_add_lat: bool,
        /// Extended last data to precharge interval (tWR).
        #[bit(8, rw)]
        ext_wrrec: bool,
        /// Control adjust.
        #[bits(0..=2, rw)]
        cntl_adj: u3,
    }

    /// DDR SDRAM timing configuration 4 (TIMING_CFG_4).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg4 {
        /// Read-to-write turnaround for same chip select.
        #[bits(28..=31, rw)]
        rwt: u4,
        /// Write-to-read turnaround for same chip select.
        #[bits(24..=27, rw)]
        wrt: u4,
        /// Read-to-read turnaround for same chip select.
        #[bits(20..=23, rw)]
        rrt: u4,
        /// Write-to-write turnaround for same chip select.
        #[bits(16..=19, rw)]
        wwt: u4,
        /// DLL lock time (tDLLK).
        #[bits(0..=1, rw)]
        dll_lock: u2,
    }

    /// DDR SDRAM timing configuration 5 (TIMING_CFG_5).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct TimingCfg5 {
        /// Read to ODT on.
        #[bits(24..=28, rw)]
        rodt_on: u5,
        /// Read to ODT off.
        #[bits(20..=22, rw)]
        rodt_off: u3,
        /// Write to ODT on.
        #[bits(12..=16, rw)]
        wodt_on: u5,
        /// Write to ODT off.
        #[bits(8..=10, rw)]
        wodt_off: u3,
    }

    /// DDR SDRAM control configuration (DDR_SDRAM_CFG).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramCfg {
        /// DDR SDRAM interface logic enable. Must be set last during initialization.
        #[bit(31, rw)]
        mem_en: bool,
        /// Self refresh enable during sleep.
        #[bit(30, rw)]
        sren: bool,
        #[bit(29, rw)]
        ecc_en: bool,
        /// Registered DIMM enable.
        #[bit(28, rw)]
        rd_en: bool,
        #[bits(24..=26, rw)]
        sdram_type: Option<SdramType>,
        /// Dynamic power management mode.
        #[bit(21, rw)]
        dyn_pwr: bool,
        #[bits(19..=20, rw)]
        dbw: Option<DataBusWidth>,
        /// 8-beat burst enable.
        #[bit(18, rw)]
        eight_be: bool,
        /// Non-concurrent auto-precharge.
        #[bit(17, rw)]
        ncap: bool,
        /// 3T timing enable.
        #[bit(16, rw)]
        threet_en: bool,
        /// 2T timing enable.
        #[bit(15, rw)]
        twot_en: bool,
        /// Bank (chip select) interleaving control.
        #[bits(8..=14, rw)]
        ba_intlv_ctl: u7,
        #[bit(5, rw)]
        x32_en: bool,
        /// Precharge bit 8 enable.
        #[bit(4, rw)]
        pchb8: bool,
        /// Global half-strength override.
        #[bit(3, rw)]
        hse: bool,
        /// Memory controller halt.
        #[bit(1, rw)]
        mem_halt: bool,
        /// Bypass initialization.
        #[bit(0, rw)]
        bi: bool,
    }

    /// DDR SDRAM control configuration 2 (DDR_SDRAM_CFG_2).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramCfg2 {
        /// Force self refresh.
        #[bit(31, rw)]
        frc_sr: bool,
        /// Self refresh interrupt enable.
        #[bit(30, rw)]
        sr_ie: bool,
        /// DLL reset disable.
        #[bit(29, rw)]
        dll_rst_dis: bool,
        #[bits(26..=27, rw)]
        dqs_cfg: u2,
        #[bits(21..=22, rw)]
        odt_cfg: u2,
        /// Number of posted refreshes.
        #[bits(12..=15, rw)]
        num_pr: u4,
        /// Data rate below 1250 MT/s.
        #[bit(11, rw)]
        slow: bool,
        /// x4 DRAM enable.
        #[bit(10, rw)]
        x4_en: bool,
        /// Quad-rank DIMM enable.
        #[bit(9, rw)]
        qd_en: bool,
        /// Unique mode register set enable.
        #[bit(8, rw)]
        unq_mrs_en: bool,
        /// On-the-fly burst chop configuration.
        #[bit(6, rw)]
        obc_cfg: bool,
        /// Address parity enable.
        #[bit(5, rw)]
        ap_en: bool,
        /// DRAM data initialization in progress / enable.
        #[bit(4, rw)]
        d_init: bool,
        /// Register control word enable for registered DIMMs.
        #[bit(2, rw)]
        rcw_en: bool,
        /// Mirrored DIMM enable.
        #[bit(0, rw)]
        md_en: bool,
    }

    /// DDR SDRAM mode configuration (DDR_SDRAM_MODE and MODE_3/5/7).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramMode {
        /// Extended SDRAM mode (MR1 for DDR3).
        #[bits(16..=31, rw)]
        esdmode: u16,
        /// SDRAM mode (MR0 for DDR3).
        #[bits(0..=15, rw)]
        sdmode: u16,
    }

    /// DDR SDRAM mode configuration 2 (DDR_SDRAM_MODE_2 and MODE_4/6/8).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramMode2 {
        /// Extended SDRAM mode 2 (MR2 for DDR3).
        #[bits(16..=31, rw)]
        esdmode2: u16,
        /// Extended SDRAM mode 3 (MR3 for DDR3).
        #[bits(0..=15, rw)]
        esdmode3: u16,
    }

    /// DDR SDRAM interval configuration (DDR_SDRAM_INTERVAL).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramInterval {
        /// Refresh interval in memory bus clocks.
        #[bits(16..=31, rw)]
        refint: u16,
        /// Precharge interval.
        #[bits(0..=13, rw)]
        bstopre: u14,
    }

    /// DDR SDRAM clock control (DDR_SDRAM_CLK_CNTL).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SdramClkCntl {
        /// Clock adjust in 1/8 applied cycle delays.
        #[bits(23..=26, rw)]
        clk_adjust: u4,
    }

    /// DDR initialization extended address (DDR_INIT_EXT_ADDR).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct InitExtAddr {
        /// Use initialization address.
        #[bit(31, rw)]
        uia: bool,
        #[bits(0..=3, rw)]
        init_ext_addr: u4,
    }

    /// DDR ZQ calibration control (DDR_ZQ_CNTL).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct ZqCntl {
        #[bit(31, rw)]
        zq_en: bool,
        /// Power-on-reset ZQ calibration time (tZQinit).
        #[bits(24..=27, rw)]
        zqinit: u4,
        /// Normal operation full calibration time (tZQoper).
        #[bits(16..=19, rw)]
        zqoper: u4,
        /// Normal operation short calibration time (tZQCS).
        #[bits(8..=11, rw)]
        zqcs: u4,
    }

    /// DDR write leveling control (DDR_WRLVL_CNTL).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct WrlvlCntl {
        #[bit(31, rw)]
        wrlvl_en: bool,
        /// First DQS pulse rising edge after margining mode is programmed (tWL_MRD).
        #[bits(24..=26, rw)]
        wrlvl_mrd: u3,
        /// ODT delay after margining mode is programmed (tWL_ODTEN).
        #[bits(20..=22, rw)]
        wrlvl_odten: u3,
        /// DQS/DQS# delay after margining mode is programmed (tWL_DQSEN).
        #[bits(16..=18, rw)]
        wrlvl_dqsen: u3,
        /// Write leveling sample time.
        #[bits(12..=15, rw)]
        wrlvl_smpl: u4,
        /// Write leveling repetition time.
        #[bits(8..=10, rw)]
        wrlvl_wlr: u3,
        /// Write leveling start time.
        #[bits(0..=4, rw)]
        wrlvl_start: u5,
    }

    /// DDR self refresh counter (DDR_SR_CNTR).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct SrCntr {
        /// Self refresh idle threshold.
        #[bits(16..=19, rw)]
        sr_it: u4,
    }

    /// DDR enhanced optimization register (DDR_EOR).
    #[bitbybit::bitfield(u32, default = 0x0, debug)]
    pub struct Eor {
        #[bit(30, rw)]
        addr_hash_en: bool,
    }
}

use regs::*;

/// Memory-mapped DDR memory controller register block (`ccsr_ddr`).
#[derive(derive_mmio::Mmio)]
#[repr(C)]
pub struct DdrMemController {
    cs0_bnds: CsBounds,
    _reserved0: u32,
    cs1_bnds: CsBounds,
    _reserved1: u32,
    cs2_bnds: CsBounds,
    _reserved2: u32,
    cs3_bnds: CsBounds,
    _reserved3: [u32; 0x19],
    cs_config: [CsConfig; 4],
    _reserved4: [u32; 0xC],
    cs_config_2: [CsConfig2; 4],
    _reserved5: [u32; 0xC],
    timing_cfg_3: TimingCfg3,
    timing_cfg_0: TimingCfg0,
    timing_cfg_1: TimingCfg1,
    timing_cfg_2: TimingCfg2,
    sdram_cfg: SdramCfg,
    sdram_cfg_2: SdramCfg2,
    sdram_mode: SdramMode,
    sdram_mode_2: SdramMode2,
    sdram_md_cntl: u32,
    sdram_interval: SdramInterval,
    sdram_data_init: u32,
    _reserved6: u32,
    sdram_clk_cntl: SdramClkCntl,
    _reserved7: [u32; 0x5],
    init_addr: u32,
    init_ext_addr: InitExtAddr,
    _reserved8: [u32; 0x4],
    timing_cfg_4: TimingCfg4,
    timing_cfg_5: TimingCfg5,
    _reserved9: [u32; 0x2],
    ddr_zq_cntl: ZqCntl,
    ddr_wrlvl_cntl: WrlvlCntl,
    _reserved10: u32,
    ddr_sr_cntr: SrCntr,
    ddr_sdram_rcw_1: u32,
    ddr_sdram_rcw_2: u32,
    _reserved11: [u32; 0x2],
    ddr_wrlvl_cntl_2: u32,
    ddr_wrlvl_cntl_3: u32,
    _reserved12: [u32; 0x1A],
    sdram_mode_3: SdramMode,
    sdram_mode_4: SdramMode2,
    sdram_mode_5: SdramMode,
    sdram_mode_6: SdramMode2,
    sdram_mode_7: SdramMode,
    sdram_mode_8: SdramMode2,
    _reserved13: [u32; 0x242],
    #[mmio(PureRead)]
    ddr_dsr1: u32,
    #[mmio(PureRead)]
    ddr_dsr2: u32,
    ddr_cdr1: u32,
    ddr_cdr2: u32,
    _reserved14: [u32; 0x32],
    #[mmio(PureRead)]
    ip_rev1: u32,
    #[mmio(PureRead)]
    ip_rev2: u32,
    ddr_eor: Eor,
    _reserved15: [u32; 0xBF],
    debug: [u32; 0x20],
}

static_assertions::const_assert_eq!(core::mem::size_of::<DdrMemController>(), 0xF80);

impl DdrMemController {
    /// Create a new DDR MMIO instance for the memory controller with the given index.
    ///
    /// Panics if `ctrl_num` exceeds the number of controller blocks in the CCSR space.
    ///
    /// # Safety
    ///
    /// This API can be used to potentially create a driver to the same peripheral structure
    /// from multiple execution contexts. The user must ensure that concurrent accesses are
    /// safe and do not interfere with each other.
    pub const unsafe fn new_mmio_fixed(ctrl_num: usize) -> MmioDdrMemController<'static> {
        unsafe { Self::new_mmio_at(CCSR_BASE_ADDR + DDRC_OFFSETS[ctrl_num]) }
    }
}
