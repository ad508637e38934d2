//! Board specific DDR parameters.
//!
//! Boards carry small per-layout tables of tuning values (clock adjust, write
//! leveling start, CPO) keyed by rank count and data rate. The lookup picks the
//! first row whose rate ceiling covers the requested rate, so tables must be
//! sorted by ascending `datarate_mhz_high` within each rank count.

/// One row of a board tuning table.
///
/// `datarate_mhz_high` is the highest data rate (in MT/s) the row applies to.
#[derive(Debug, Clone, Copy)]
pub struct BoardSpecificParameters {
    pub n_ranks: u32,
    pub datarate_mhz_high: u32,
    pub rank_gb: u32,
    pub clk_adjust: u32,
    pub wrlvl_start: u32,
    pub wrlvl_ctl_2: u32,
    pub wrlvl_ctl_3: u32,
    pub cpo: u32,
    pub write_data_delay: u32,
    pub force_2t: bool,
}

/// Find the tuning row for the given rank count and data rate.
///
/// Returns the first row matching the rank count whose ceiling is at or above
/// `datarate_mhz`, or [`None`] if the rate exceeds every ceiling the board
/// validated.
pub fn find_board_specific_parameters<'a>(
    table: &'a [BoardSpecificParameters],
    n_ranks: u32,
    datarate_mhz: u32,
) -> Option<&'a BoardSpecificParameters> {
    let row = table
        .iter()
        .filter(|row| row.n_ranks == n_ranks)
        .find(|row| datarate_mhz <= row.datarate_mhz_high);
    if row.is_none() {
        log::warn!(
            "no board parameters validated for {} rank(s) at {} MT/s",
            n_ranks,
            datarate_mhz
        );
    }
    row
}

/// Hooks for boards whose DRAM needs an explicit hardware reset pulse around
/// controller enable. The default implementation is a no-op for boards where
/// the controller handles reset itself.
pub trait BoardMemReset {
    /// Board requires the reset sequence.
    fn need_mem_reset(&self) -> bool {
        false
    }

    /// Assert DRAM reset.
    fn mem_reset(&mut self) {}

    /// De-assert DRAM reset.
    fn mem_de_reset(&mut self) {}
}

/// For boards without a DRAM reset line.
pub struct NoMemReset;

impl BoardMemReset for NoMemReset {}

#[cfg(test)]
mod tests {
    use super::*;

    const fn row(n_ranks: u32, mhz: u32, clk_adjust: u32) -> BoardSpecificParameters {
        BoardSpecificParameters {
            n_ranks,
            datarate_mhz_high: mhz,
            rank_gb: 0,
            clk_adjust,
            wrlvl_start: 6,
            wrlvl_ctl_2: 0,
            wrlvl_ctl_3: 0,
            cpo: 0xFF,
            write_data_delay: 2,
            force_2t: false,
        }
    }

    const TABLE: &[BoardSpecificParameters] = &[
        row(2, 1350, 4),
        row(2, 1666, 5),
        row(2, 1900, 6),
        row(1, 1666, 7),
    ];

    #[test]
    fn lookup_picks_lowest_covering_ceiling() {
        // 1500 MT/s falls between the 1350 and 1666 ceilings.
        let found = find_board_specific_parameters(TABLE, 2, 1500).unwrap();
        assert_eq!(found.datarate_mhz_high, 1666);
        assert_eq!(found.clk_adjust, 5);
    }

    #[test]
    fn lookup_matches_exact_ceiling() {
        let found = find_board_specific_parameters(TABLE, 2, 1350).unwrap();
        assert_eq!(found.datarate_mhz_high, 1350);
    }

    #[test]
    fn lookup_filters_by_rank_count() {
        let found = find_board_specific_parameters(TABLE, 1, 1500).unwrap();
        assert_eq!(found.clk_adjust, 7);
    }

    #[test]
    fn lookup_fails_above_all_ceilings() {
        assert!(find_board_specific_parameters(TABLE, 2, 2133).is_none());
    }
}
