//! Cross-DIMM timing reconciliation.
//!
//! Folds the per-DIMM parameters of one controller into a single worst-case
//! envelope every populated module can meet, then picks the CAS latency to run
//! at. Minimum delays fold with `max`, capability masks with AND, and the
//! refresh interval with `min` so no module is ever under-refreshed.

use crate::spd::DimmParams;
use crate::time::Hertz;
use crate::util::memory_clk_period_ps;

/// JEDEC upper bound on tAA for DDR3.
const TAA_MAX_PS: u32 = 20_000;

#[derive(Debug, thiserror::Error)]
pub enum TimingError {
    #[error("registered and unbuffered DIMMs mixed on one controller")]
    MixedRegisteredUnbuffered,
    #[error("data rate exceeds DIMM capability: tCKmin {tckmin_ps} ps, MCLK {mclk_ps} ps")]
    ClockTooFast { tckmin_ps: u32, mclk_ps: u32 },
    #[error("no common CAS latency >= CL{min_caslat} in mask {caslat_x:#x}")]
    NoCommonCasLatency { caslat_x: u32, min_caslat: u32 },
}

/// Worst-case operating parameters for all DIMMs on one controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonTimingParams {
    pub tckmin_x_ps: u32,
    pub tckmax_ps: u32,
    pub taamin_ps: u32,
    /// CAS latencies every DIMM supports, bit n = CLn.
    pub caslat_x: u32,
    /// The CAS latency selected for operation.
    pub lowest_common_spd_caslat: u32,
    pub additive_latency: u32,
    pub twr_ps: u32,
    pub trcd_ps: u32,
    pub trp_ps: u32,
    pub tras_ps: u32,
    pub trc_ps: u32,
    pub trfc_ps: u32,
    pub trrd_ps: u32,
    pub twtr_ps: u32,
    pub trtp_ps: u32,
    pub tfaw_ps: u32,
    pub refresh_rate_ps: u32,
    pub extended_op_srt: bool,
    pub all_dimms_burst_lengths_bitmask: u8,
    pub all_dimms_registered: bool,
    pub all_dimms_unbuffered: bool,
    pub all_dimms_ecc_capable: bool,
    /// Register control words forwarded to RCW programming (registered DIMMs).
    pub rcw: [u8; 16],
    /// Total bytes behind this controller.
    pub total_mem: u64,
    /// Assigned during address assignment.
    pub base_address: u64,
    pub ndimms_present: u32,
}

/// Reduce the per-DIMM parameters to the envelope and select the CAS latency.
///
/// Returns a zeroed result with `total_mem == 0` when no slot is populated.
pub fn compute_lowest_common_dimm_parameters(
    data_rate: Hertz,
    dimm_params: &[DimmParams],
) -> Result<CommonTimingParams, TimingError> {
    let mut out = CommonTimingParams {
        tckmax_ps: u32::MAX,
        refresh_rate_ps: u32::MAX,
        caslat_x: u32::MAX,
        all_dimms_burst_lengths_bitmask: 0xFF,
        extended_op_srt: true,
        ..Default::default()
    };
    let mut registered = 0u32;
    let mut unbuffered = 0u32;
    let mut ecc_capable = 0u32;

    for (i, dimm) in dimm_params.iter().enumerate() {
        if !dimm.is_present() {
            continue;
        }
        out.ndimms_present += 1;
        out.total_mem += dimm.capacity;

        out.tckmin_x_ps = out.tckmin_x_ps.max(dimm.tck_min_x_ps);
        out.tckmax_ps = out.tckmax_ps.min(dimm.tck_max_ps);
        out.taamin_ps = out.taamin_ps.max(dimm.taa_ps);
        out.caslat_x &= dimm.caslat_x;
        out.twr_ps = out.twr_ps.max(dimm.twr_ps);
        out.trcd_ps = out.trcd_ps.max(dimm.trcd_ps);
        out.trp_ps = out.trp_ps.max(dimm.trp_ps);
        out.tras_ps = out.tras_ps.max(dimm.tras_ps);
        out.trc_ps = out.trc_ps.max(dimm.trc_ps);
        out.trfc_ps = out.trfc_ps.max(dimm.trfc_ps);
        out.trrd_ps = out.trrd_ps.max(dimm.trrd_ps);
        out.twtr_ps = out.twtr_ps.max(dimm.twtr_ps);
        out.trtp_ps = out.trtp_ps.max(dimm.trtp_ps);
        out.tfaw_ps = out.tfaw_ps.max(dimm.tfaw_ps);
        out.refresh_rate_ps = out.refresh_rate_ps.min(dimm.refresh_rate_ps);
        out.extended_op_srt &= dimm.extended_op_srt;
        out.all_dimms_burst_lengths_bitmask &= dimm.burst_lengths_bitmask;

        if dimm.registered_dimm {
            registered += 1;
            out.rcw = dimm.rcw;
        } else {
            unbuffered += 1;
        }
        if dimm.edc_config == 0x02 {
            ecc_capable += 1;
        }
    }

    if out.ndimms_present == 0 {
        log::debug!("no DIMMs present on this controller");
        return Ok(CommonTimingParams::default());
    }

    if registered > 0 && unbuffered > 0 {
        log::error!("mixing registered and unbuffered DIMMs is not supported");
        return Err(TimingError::MixedRegisteredUnbuffered);
    }
    out.all_dimms_registered = registered == out.ndimms_present;
    out.all_dimms_unbuffered = unbuffered == out.ndimms_present;
    out.all_dimms_ecc_capable = ecc_capable == out.ndimms_present;
    if ecc_capable != 0 && !out.all_dimms_ecc_capable {
        log::warn!("not all DIMMs are ECC capable, ECC cannot be enabled");
    }

    out.lowest_common_spd_caslat = compute_cas_latency(data_rate, &out)?;
    // Additive latency stays 0 unless overridden; the controller posts CAS
    // internally.
    out.additive_latency = 0;

    Ok(out)
}

/// Pick the smallest CAS latency all DIMMs support that still satisfies tAAmin
/// at the operating clock.
fn compute_cas_latency(
    data_rate: Hertz,
    common: &CommonTimingParams,
) -> Result<u32, TimingError> {
    let mclk_ps = memory_clk_period_ps(data_rate);
    if mclk_ps < common.tckmin_x_ps {
        log::error!(
            "data rate too high: MCLK period {} ps below DIMM tCKmin {} ps",
            mclk_ps,
            common.tckmin_x_ps
        );
        return Err(TimingError::ClockTooFast {
            tckmin_ps: common.tckmin_x_ps,
            mclk_ps,
        });
    }

    let min_caslat = common.taamin_ps.div_ceil(mclk_ps);
    let mut caslat = min_caslat;
    while caslat < 32 && common.caslat_x & (1 << caslat) == 0 {
        caslat += 1;
    }
    if caslat >= 32 {
        return Err(TimingError::NoCommonCasLatency {
            caslat_x: common.caslat_x,
            min_caslat,
        });
    }
    if caslat * mclk_ps > TAA_MAX_PS {
        log::warn!(
            "selected CL{} exceeds tAAmax {} ps at MCLK {} ps",
            caslat,
            TAA_MAX_PS,
            mclk_ps
        );
    }
    Ok(caslat)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDR3_1600: Hertz = Hertz::from_raw(1_600_000_000);
    const DDR3_1333: Hertz = Hertz::from_raw(1_333_333_333);

    fn dimm(tck: u32, taa: u32, caslat_x: u32) -> DimmParams {
        DimmParams {
            n_ranks: 2,
            capacity: 2 << 30,
            tck_min_x_ps: tck,
            tck_max_ps: 3300,
            taa_ps: taa,
            caslat_x,
            twr_ps: 15_000,
            trcd_ps: taa,
            trp_ps: taa,
            tras_ps: 35_000,
            trc_ps: 48_125,
            trfc_ps: 160_000,
            trrd_ps: 6_000,
            twtr_ps: 7_500,
            trtp_ps: 7_500,
            tfaw_ps: 40_000,
            refresh_rate_ps: 7_800_000,
            burst_lengths_bitmask: 0x0C,
            ..Default::default()
        }
    }

    #[test]
    fn empty_controller_reports_zero_memory() {
        let common =
            compute_lowest_common_dimm_parameters(DDR3_1600, &[DimmParams::default(); 2])
                .unwrap();
        assert_eq!(common.ndimms_present, 0);
        assert_eq!(common.total_mem, 0);
    }

    #[test]
    fn envelope_takes_worst_case_of_each_parameter() {
        let mut slow = dimm(1500, 13_500, 0x03E0); // DDR3-1333, CL5..CL9
        slow.trfc_ps = 260_000;
        slow.refresh_rate_ps = 3_900_000;
        let fast = dimm(1250, 13_125, 0x0FE0); // DDR3-1600, CL5..CL11

        let common =
            compute_lowest_common_dimm_parameters(DDR3_1333, &[fast, slow]).unwrap();
        assert_eq!(common.ndimms_present, 2);
        assert_eq!(common.total_mem, 4 << 30);
        assert_eq!(common.tckmin_x_ps, 1500);
        assert_eq!(common.taamin_ps, 13_500);
        assert_eq!(common.trfc_ps, 260_000);
        // Capability masks intersect, refresh interval takes the shortest.
        assert_eq!(common.caslat_x, 0x03E0);
        assert_eq!(common.refresh_rate_ps, 3_900_000);
        assert!(common.all_dimms_unbuffered);
        assert!(!common.all_dimms_registered);
    }

    #[test]
    fn selects_cl11_for_ddr3_1600() {
        let common = compute_lowest_common_dimm_parameters(
            DDR3_1600,
            &[dimm(1250, 13_125, 0x0FE0)],
        )
        .unwrap();
        // ceil(13125 / 1250) = 11 and CL11 is supported.
        assert_eq!(common.lowest_common_spd_caslat, 11);
    }

    #[test]
    fn skips_unsupported_latencies_upward() {
        // CL10 would satisfy tAA but only CL11 is in the common mask.
        let common = compute_lowest_common_dimm_parameters(
            DDR3_1600,
            &[dimm(1250, 12_000, 0x0800)],
        )
        .unwrap();
        assert_eq!(common.lowest_common_spd_caslat, 11);
    }

    #[test]
    fn rejects_clock_faster_than_dimm() {
        let result =
            compute_lowest_common_dimm_parameters(DDR3_1600, &[dimm(1500, 13_500, 0x03E0)]);
        assert!(matches!(result, Err(TimingError::ClockTooFast { .. })));
    }

    #[test]
    fn rejects_mixed_registered_and_unbuffered() {
        let unbuffered = dimm(1250, 13_125, 0x0FE0);
        let mut registered = dimm(1250, 13_125, 0x0FE0);
        registered.registered_dimm = true;
        let result =
            compute_lowest_common_dimm_parameters(DDR3_1600, &[unbuffered, registered]);
        assert!(matches!(result, Err(TimingError::MixedRegisteredUnbuffered)));
    }

    #[test]
    fn no_common_cas_latency_is_an_error() {
        let result = compute_lowest_common_dimm_parameters(
            DDR3_1600,
            &[dimm(1250, 13_125, 0x0020)], // only CL5, too low for tAA
        );
        assert!(matches!(
            result,
            Err(TimingError::NoCommonCasLatency { .. })
        ));
    }
}
