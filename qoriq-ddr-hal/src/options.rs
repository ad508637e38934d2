//! Controller option population.
//!
//! Merges the reconciled DIMM envelope, the board tuning row and the platform
//! configuration into [`MemctlOptions`], the single input of register
//! synthesis. Defaults follow the DDR3 recommendations of the controller
//! reference manual; the board row overrides the signal-integrity knobs.

use crate::board::BoardSpecificParameters;
use crate::spd::DimmParams;
use crate::time::Hertz;
use crate::timing::CommonTimingParams;
use crate::util::mclk_to_picos;

pub const CHIP_SELECTS_PER_CTRL: usize = 4;

/// DDR3 tCKE is max(3 nCK, 7.5 ns); the controller wants it in clocks anyway,
/// so the 3 nCK floor is what gets programmed.
const MIN_TCKE_PULSE_WIDTH_CLOCKS: u32 = 3;

/// ODT assertion codes for CSn_CONFIG and the matching DDR3 Rtt encodings.
pub mod odt {
    pub const NEVER: u32 = 0;
    pub const CS: u32 = 1;
    pub const ALL_OTHER_CS: u32 = 2;
    pub const OTHER_DIMM: u32 = 3;
    pub const ALL: u32 = 4;
    pub const SAME_DIMM: u32 = 5;
    pub const CS_AND_OTHER_DIMM: u32 = 6;
    pub const OTHER_CS_SAME_DIMM: u32 = 7;

    pub const RTT_OFF: u32 = 0;
    pub const RTT_60_OHM: u32 = 1;
    pub const RTT_120_OHM: u32 = 2;
    pub const RTT_40_OHM: u32 = 3;
    pub const RTT_20_OHM: u32 = 4;
    pub const RTT_30_OHM: u32 = 5;
}

/// Per chip select options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsLocalOpts {
    pub odt_rd_cfg: u32,
    pub odt_wr_cfg: u32,
    pub odt_rtt_norm: u32,
    pub odt_rtt_wr: u32,
    pub auto_precharge: bool,
}

const fn cs_odt(rd: u32, wr: u32, rtt_norm: u32, rtt_wr: u32) -> CsLocalOpts {
    CsLocalOpts {
        odt_rd_cfg: rd,
        odt_wr_cfg: wr,
        odt_rtt_norm: rtt_norm,
        odt_rtt_wr: rtt_wr,
        auto_precharge: false,
    }
}

// Dynamic ODT configurations per slot population, from the DDR3 termination
// recommendations. Naming: D = dual rank, S = single rank, 0 = empty slot.
use odt::*;

const ODT_UNKNOWN: [CsLocalOpts; 4] = [cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF); 4];

const SINGLE_S: [CsLocalOpts; 4] = [
    cs_odt(NEVER, ALL, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const SINGLE_D: [CsLocalOpts; 4] = [
    cs_odt(NEVER, ALL, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const SINGLE_Q: [CsLocalOpts; 4] = [
    cs_odt(NEVER, CS_AND_OTHER_DIMM, RTT_20_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_120_OHM),
    cs_odt(NEVER, CS_AND_OTHER_DIMM, RTT_20_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_120_OHM),
];

const DUAL_DD: [CsLocalOpts; 4] = [
    cs_odt(NEVER, SAME_DIMM, RTT_120_OHM, RTT_OFF),
    cs_odt(OTHER_DIMM, OTHER_DIMM, RTT_30_OHM, RTT_OFF),
    cs_odt(NEVER, SAME_DIMM, RTT_120_OHM, RTT_OFF),
    cs_odt(OTHER_DIMM, OTHER_DIMM, RTT_30_OHM, RTT_OFF),
];

const DUAL_DS: [CsLocalOpts; 4] = [
    cs_odt(NEVER, SAME_DIMM, RTT_120_OHM, RTT_OFF),
    cs_odt(OTHER_DIMM, OTHER_DIMM, RTT_30_OHM, RTT_OFF),
    cs_odt(OTHER_DIMM, ALL, RTT_20_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const DUAL_SD: [CsLocalOpts; 4] = [
    cs_odt(OTHER_DIMM, ALL, RTT_20_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, SAME_DIMM, RTT_120_OHM, RTT_OFF),
    cs_odt(OTHER_DIMM, OTHER_DIMM, RTT_30_OHM, RTT_OFF),
];

const DUAL_SS: [CsLocalOpts; 4] = [
    cs_odt(OTHER_DIMM, ALL, RTT_30_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(OTHER_DIMM, ALL, RTT_30_OHM, RTT_120_OHM),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const DUAL_D0: [CsLocalOpts; 4] = [
    cs_odt(NEVER, SAME_DIMM, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const DUAL_0D: [CsLocalOpts; 4] = [
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, SAME_DIMM, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const DUAL_S0: [CsLocalOpts; 4] = [
    cs_odt(NEVER, CS, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

const DUAL_0S: [CsLocalOpts; 4] = [
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
    cs_odt(NEVER, CS, RTT_40_OHM, RTT_OFF),
    cs_odt(NEVER, NEVER, RTT_OFF, RTT_OFF),
];

/// Burst length selection for DDR3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstLength {
    /// Burst chop of 4 beats.
    Bc4,
    /// On-the-fly selection between BC4 and BL8.
    Otf,
    /// Fixed 8 beat bursts.
    Bl8,
}

/// Controller interleaving granularity (CS0_CONFIG[INTLV_CTL]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum InterleavingMode {
    CacheLine = 0,
    Page = 1,
    Bank = 2,
    Superbank = 3,
}

/// Rank (chip select) interleaving control, DDR_SDRAM_CFG[BA_INTLV_CTL]
/// encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BankIntlv {
    None = 0,
    Cs0Cs1 = 0x40,
    Cs2Cs3 = 0x20,
    Cs0Cs1AndCs2Cs3 = 0x60,
    Cs0Cs1Cs2Cs3 = 0x64,
}

/// Platform and board configuration a boot flow supplies up front.
#[derive(Debug, Clone, Copy)]
pub struct DdrConfig {
    /// DDR data rate (MT/s expressed in Hz).
    pub ddr_freq: Hertz,
    /// Controller IP revision from DDR_IP_REV1, e.g. 0x40701.
    pub ip_rev: u32,
    /// Physical address the first controller's memory starts at.
    pub sdram_base: u64,
    /// Capacity shift for buses narrower than the module (32-bit bus on a
    /// 64-bit DIMM uses 1).
    pub dbw_capacity_adjust: u32,
    pub ecc_en: bool,
    /// Initialize memory through the controller's built-in scrubber.
    pub ecc_init_using_memctl: bool,
    pub mem_init_value: u32,
    pub ba_intlv_ctl: BankIntlv,
    /// Interleaving across controllers, when the board wires it.
    pub memctl_interleaving: Option<InterleavingMode>,
    pub auto_self_refresh: bool,
    pub addr_hash: bool,
    /// Driver characteristics registers, SoC specific.
    pub ddr_cdr1: u32,
    pub ddr_cdr2: u32,
    /// First DIMM slot is wired for quad-rank modules.
    pub first_slot_quad_capable: bool,
}

impl Default for DdrConfig {
    fn default() -> Self {
        Self {
            ddr_freq: Hertz::from_raw(1_600_000_000),
            ip_rev: 0x40701,
            sdram_base: 0,
            dbw_capacity_adjust: 0,
            ecc_en: false,
            ecc_init_using_memctl: false,
            mem_init_value: 0xDEAD_BEEF,
            ba_intlv_ctl: BankIntlv::None,
            memctl_interleaving: None,
            auto_self_refresh: false,
            addr_hash: false,
            ddr_cdr1: 0,
            ddr_cdr2: 0,
            first_slot_quad_capable: false,
        }
    }
}

/// Everything register synthesis needs, fully resolved.
#[derive(Debug, Clone, Copy)]
pub struct MemctlOptions {
    pub cs_local_opts: [CsLocalOpts; CHIP_SELECTS_PER_CTRL],
    pub ddr_freq: Hertz,
    pub ip_rev: u32,

    pub memctl_interleaving: bool,
    pub memctl_interleaving_mode: u32,
    pub ba_intlv_ctl: u8,

    pub ecc_mode: bool,
    pub ecc_init_using_memctl: bool,
    pub mem_init_value: u32,

    pub registered_dimm_en: bool,
    pub mirrored_dimm: bool,
    pub quad_rank_present: bool,
    pub x4_en: bool,
    pub ap_en: bool,

    pub dqs_config: u32,
    pub self_refresh_in_sleep: bool,
    pub dynamic_power: bool,
    /// DDR_SDRAM_CFG[DBW]: 0 = 64-bit, 1 = 32-bit, 2 = 16-bit.
    pub data_bus_width: u32,
    pub burst_length: BurstLength,
    pub otf_burst_chop_en: bool,
    pub half_strength_driver_enable: bool,
    pub twot_en: bool,
    pub threet_en: bool,

    pub cas_latency_override: Option<u32>,
    pub additive_latency_override: Option<u32>,
    pub trwt_override: Option<u32>,

    pub clk_adjust: u32,
    pub cpo_override: u32,
    pub write_data_delay: u32,

    pub tcke_clock_pulse_width_ps: u32,
    pub tfaw_window_four_activates_ps: u32,

    pub zq_en: bool,
    pub wrlvl_en: bool,
    pub wrlvl_override: bool,
    pub wrlvl_sample: u32,
    pub wrlvl_start: u32,
    pub wrlvl_ctl_2: u32,
    pub wrlvl_ctl_3: u32,

    pub rtt_override: bool,
    pub rtt_override_value: u32,
    pub rtt_wr_override_value: u32,

    pub rcw_override: bool,
    pub rcw_1: u32,
    pub rcw_2: u32,

    pub auto_self_refresh_en: bool,
    pub sr_it: u32,
    pub bstopre: u32,
    pub addr_hash: bool,
    pub ddr_cdr1: u32,
    pub ddr_cdr2: u32,
}

/// Select the dynamic ODT table for the observed slot population.
fn odt_table(cfg: &DdrConfig, dimm_params: &[DimmParams]) -> [CsLocalOpts; 4] {
    match dimm_params.len() {
        1 => match dimm_params[0].n_ranks {
            1 => SINGLE_S,
            2 => SINGLE_D,
            4 => SINGLE_Q,
            _ => ODT_UNKNOWN,
        },
        2 => {
            let ranks = (dimm_params[0].n_ranks, dimm_params[1].n_ranks);
            match ranks {
                (4, 0) if cfg.first_slot_quad_capable => SINGLE_Q,
                (2, 2) => DUAL_DD,
                (2, 1) => DUAL_DS,
                (1, 2) => DUAL_SD,
                (1, 1) => DUAL_SS,
                (2, 0) => DUAL_D0,
                (0, 2) => DUAL_0D,
                (1, 0) => DUAL_S0,
                (0, 1) => DUAL_0S,
                (0, 0) => ODT_UNKNOWN,
                _ => {
                    log::warn!("unsupported DIMM population {:?} for ODT setup", ranks);
                    ODT_UNKNOWN
                }
            }
        }
        _ => ODT_UNKNOWN,
    }
}

/// Drop rank interleaving requests the installed ranks cannot satisfy.
fn validate_ba_intlv(ba_intlv: BankIntlv, dimm_params: &[DimmParams]) -> BankIntlv {
    let cs_per_dimm = CHIP_SELECTS_PER_CTRL / dimm_params.len().max(1);
    let rank_on_cs = |cs: usize| {
        let dimm = cs / cs_per_dimm;
        dimm_params
            .get(dimm)
            .is_some_and(|d| d.n_ranks > (cs % cs_per_dimm) as u32)
    };
    let pair_01 = rank_on_cs(0) && rank_on_cs(1);
    let pair_23 = rank_on_cs(2) && rank_on_cs(3);

    let valid = match ba_intlv {
        BankIntlv::None => true,
        BankIntlv::Cs0Cs1 => pair_01,
        BankIntlv::Cs2Cs3 => pair_23,
        BankIntlv::Cs0Cs1AndCs2Cs3 | BankIntlv::Cs0Cs1Cs2Cs3 => pair_01 && pair_23,
    };
    if !valid {
        log::warn!(
            "rank interleaving {:?} not possible with this DIMM population, disabling",
            ba_intlv
        );
        return BankIntlv::None;
    }
    ba_intlv
}

/// Build the register-synthesis options from the platform config, the
/// reconciled envelope and the board tuning row.
pub fn populate_memctl_options(
    cfg: &DdrConfig,
    common_dimm: &CommonTimingParams,
    dimm_params: &[DimmParams],
    board: &BoardSpecificParameters,
) -> MemctlOptions {
    let cs_local_opts = odt_table(cfg, dimm_params);
    let ba_intlv_ctl = validate_ba_intlv(cfg.ba_intlv_ctl, dimm_params);

    let first_present = dimm_params.iter().find(|d| d.is_present());
    let quad_rank_present = dimm_params.iter().any(|d| d.n_ranks == 4);

    let ecc_mode = if common_dimm.all_dimms_ecc_capable {
        cfg.ecc_en
    } else {
        false
    };

    MemctlOptions {
        cs_local_opts,
        ddr_freq: cfg.ddr_freq,
        ip_rev: cfg.ip_rev,

        memctl_interleaving: cfg.memctl_interleaving.is_some(),
        memctl_interleaving_mode: cfg
            .memctl_interleaving
            .map_or(0, |mode| mode as u32),
        ba_intlv_ctl: ba_intlv_ctl as u8,

        ecc_mode,
        ecc_init_using_memctl: cfg.ecc_init_using_memctl,
        mem_init_value: cfg.mem_init_value,

        registered_dimm_en: common_dimm.all_dimms_registered,
        mirrored_dimm: first_present.is_some_and(|d| d.mirrored_dimm),
        quad_rank_present,
        x4_en: first_present.is_some_and(|d| d.device_width == 4),
        // Address parity needs RCW support on the register; left off.
        ap_en: false,

        // Differential DQS for DDR3.
        dqs_config: 1,
        self_refresh_in_sleep: true,
        dynamic_power: false,
        // The bus width follows the capacity adjust: 0 = 64-bit, 1 = 32-bit,
        // 2 = 16-bit. On-the-fly burst chop needs the full bus; narrowed
        // buses run fixed BL8.
        data_bus_width: cfg.dbw_capacity_adjust,
        burst_length: if cfg.dbw_capacity_adjust == 0 {
            BurstLength::Otf
        } else {
            BurstLength::Bl8
        },
        otf_burst_chop_en: cfg.dbw_capacity_adjust == 0,
        half_strength_driver_enable: false,
        twot_en: board.force_2t,
        threet_en: false,

        cas_latency_override: None,
        additive_latency_override: None,
        trwt_override: None,

        clk_adjust: board.clk_adjust,
        cpo_override: board.cpo,
        write_data_delay: board.write_data_delay,

        tcke_clock_pulse_width_ps: mclk_to_picos(
            cfg.ddr_freq,
            MIN_TCKE_PULSE_WIDTH_CLOCKS,
        ),
        tfaw_window_four_activates_ps: first_present.map_or(0, |d| d.tfaw_ps),

        // Fly-by topology wants write leveling; ZQ calibration is mandatory
        // for DDR3.
        zq_en: true,
        wrlvl_en: true,
        wrlvl_override: true,
        wrlvl_sample: 0xF,
        wrlvl_start: board.wrlvl_start,
        wrlvl_ctl_2: board.wrlvl_ctl_2,
        wrlvl_ctl_3: board.wrlvl_ctl_3,

        rtt_override: false,
        rtt_override_value: 0,
        rtt_wr_override_value: 0,

        rcw_override: false,
        rcw_1: 0,
        rcw_2: 0,

        auto_self_refresh_en: cfg.auto_self_refresh,
        sr_it: if cfg.auto_self_refresh { 0xB } else { 0 },
        bstopre: 0x100,
        addr_hash: cfg.addr_hash,
        ddr_cdr1: cfg.ddr_cdr1,
        ddr_cdr2: cfg.ddr_cdr2,
    }
}
