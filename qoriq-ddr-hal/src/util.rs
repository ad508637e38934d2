//! Clock arithmetic helpers shared by the whole pipeline.
//!
//! The memory bus clock (MCLK) runs at half the DDR data rate. All SPD timing values
//! are carried in picoseconds and converted to MCLK cycle counts only at register
//! synthesis time.
use crate::time::Hertz;

const PICOS_PER_SECOND: u64 = 1_000_000_000_000;

/// MCLK period in picoseconds for the given DDR data rate, rounded to the nearest
/// picosecond.
pub const fn memory_clk_period_ps(data_rate: Hertz) -> u32 {
    let two_e12 = 2 * PICOS_PER_SECOND;
    let rate = data_rate.raw() as u64;
    let period = two_e12 / rate;
    let rem = two_e12 % rate;
    if rem >= rate / 2 {
        (period + 1) as u32
    } else {
        period as u32
    }
}

/// Convert a picosecond interval to a number of MCLK cycles, rounding up.
///
/// Rounding up guarantees the programmed cycle count always covers the requested
/// interval.
pub const fn picos_to_mclk(data_rate: Hertz, picos: u32) -> u32 {
    if picos == 0 {
        return 0;
    }
    let clks = picos as u64 * data_rate.raw() as u64;
    let two_e12 = 2 * PICOS_PER_SECOND;
    (clks.div_ceil(two_e12)) as u32
}

/// Convert a number of MCLK cycles to picoseconds.
pub const fn mclk_to_picos(data_rate: Hertz, clks: u32) -> u32 {
    clks * memory_clk_period_ps(data_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDR3_1600: Hertz = Hertz::from_raw(1_600_000_000);
    const DDR3_1333: Hertz = Hertz::from_raw(1_333_333_333);

    #[test]
    fn mclk_period_ddr3_1600() {
        assert_eq!(memory_clk_period_ps(DDR3_1600), 1250);
    }

    #[test]
    fn mclk_period_ddr3_1333() {
        assert_eq!(memory_clk_period_ps(DDR3_1333), 1500);
    }

    #[test]
    fn picos_conversion_rounds_up() {
        // tRCD = 13.75 ns at DDR3-1600 must program 11 cycles, not 10.
        assert_eq!(picos_to_mclk(DDR3_1600, 13_750), 11);
        assert_eq!(picos_to_mclk(DDR3_1600, 12_500), 10);
        assert_eq!(picos_to_mclk(DDR3_1600, 0), 0);
    }

    #[test]
    fn mclk_to_picos_roundtrip() {
        assert_eq!(mclk_to_picos(DDR3_1600, 4), 5000);
    }
}
