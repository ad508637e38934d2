//! DDR3 SPD EEPROM decoding.
//!
//! Raw 256 byte SPD images are validated against their CRC and decoded into
//! [`DimmParams`], the per-DIMM view the rest of the pipeline works from. Field
//! offsets and scaling follow JEDEC Standard No. 21-C, annex K (DDR3 SPD rev 1.x).

/// Size of a DDR3 SPD EEPROM image.
pub const SPD_EEPROM_SIZE: usize = 256;

/// SPD memory type code for DDR3 SDRAM.
pub const SPD_MEMTYPE_DDR3: u8 = 0x0B;

/// DDR3 module type codes (SPD byte 3, low nibble).
pub const SPD_MODTYPE_RDIMM: u8 = 0x01;
pub const SPD_MODTYPE_UDIMM: u8 = 0x02;
pub const SPD_MODTYPE_SODIMM: u8 = 0x03;
pub const SPD_MODTYPE_MICRO_DIMM: u8 = 0x04;
pub const SPD_MODTYPE_MINI_RDIMM: u8 = 0x05;
pub const SPD_MODTYPE_MINI_UDIMM: u8 = 0x06;

/// Default DDR3 refresh interval (tREFI) at normal temperature, in picoseconds.
pub const DDR3_REFRESH_RATE_PS: u32 = 7_800_000;

/// DDR3 supports fixed BL8 and burst chop 4, encoded the same way the burst
/// length bytes of older SPD revisions were.
const DDR3_BURST_LENGTHS_BITMASK: u8 = 0x0C;

#[derive(Debug, thiserror::Error)]
pub enum SpdError {
    #[error("SPD CRC mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    CrcMismatch { computed: u16, stored: u16 },
    #[error("unsupported SPD memory type {0:#04x}")]
    UnsupportedMemType(u8),
    #[error("unknown DDR3 module type {0:#04x}")]
    UnknownModuleType(u8),
    #[error("SPD reports zero medium timebase divisor")]
    ZeroTimebase,
}

/// A raw DDR3 SPD EEPROM image with named accessors for the fields the decoder
/// consumes.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct SpdEeprom {
    data: [u8; SPD_EEPROM_SIZE],
}

impl SpdEeprom {
    pub const fn new(data: [u8; SPD_EEPROM_SIZE]) -> Self {
        Self { data }
    }

    pub const fn as_bytes(&self) -> &[u8; SPD_EEPROM_SIZE] {
        &self.data
    }

    /// Byte 0: bytes used / SPD size / CRC coverage.
    pub const fn info_size_crc(&self) -> u8 {
        self.data[0]
    }

    /// Byte 2: key byte, DRAM device type.
    pub const fn mem_type(&self) -> u8 {
        self.data[2]
    }

    /// Byte 3: key byte, module type.
    pub const fn module_type(&self) -> u8 {
        self.data[3]
    }

    /// Byte 4: SDRAM density and banks.
    pub const fn density_banks(&self) -> u8 {
        self.data[4]
    }

    /// Byte 5: SDRAM addressing (row and column bits).
    pub const fn addressing(&self) -> u8 {
        self.data[5]
    }

    /// Byte 7: module organization (ranks and device width).
    pub const fn organization(&self) -> u8 {
        self.data[7]
    }

    /// Byte 8: module memory bus width, including extension for ECC.
    pub const fn bus_width(&self) -> u8 {
        self.data[8]
    }

    /// Byte 9: fine timebase dividend / divisor.
    pub const fn ftb_div(&self) -> u8 {
        self.data[9]
    }

    /// Bytes 10/11: medium timebase dividend and divisor.
    pub const fn mtb_dividend(&self) -> u8 {
        self.data[10]
    }

    pub const fn mtb_divisor(&self) -> u8 {
        self.data[11]
    }

    /// Byte 12: minimum cycle time tCKmin, in MTB units.
    pub const fn tck_min(&self) -> u8 {
        self.data[12]
    }

    /// Bytes 14/15: CAS latencies supported, bit 0 of byte 14 = CL4.
    pub const fn caslat_lsb(&self) -> u8 {
        self.data[14]
    }

    pub const fn caslat_msb(&self) -> u8 {
        self.data[15]
    }

    /// Byte 16: minimum CAS latency time tAAmin, in MTB units.
    pub const fn taa_min(&self) -> u8 {
        self.data[16]
    }

    /// Byte 17: minimum write recovery time tWRmin.
    pub const fn twr_min(&self) -> u8 {
        self.data[17]
    }

    /// Byte 18: minimum RAS to CAS delay tRCDmin.
    pub const fn trcd_min(&self) -> u8 {
        self.data[18]
    }

    /// Byte 19: minimum row active to row active delay tRRDmin.
    pub const fn trrd_min(&self) -> u8 {
        self.data[19]
    }

    /// Byte 20: minimum row precharge delay tRPmin.
    pub const fn trp_min(&self) -> u8 {
        self.data[20]
    }

    /// Byte 21: upper nibbles for tRAS (low) and tRC (high).
    pub const fn tras_trc_ext(&self) -> u8 {
        self.data[21]
    }

    /// Byte 22: minimum active to precharge delay tRASmin, LSB.
    pub const fn tras_min_lsb(&self) -> u8 {
        self.data[22]
    }

    /// Byte 23: minimum active to active/refresh delay tRCmin, LSB.
    pub const fn trc_min_lsb(&self) -> u8 {
        self.data[23]
    }

    /// Bytes 24/25: minimum refresh recovery delay tRFCmin.
    pub const fn trfc_min_lsb(&self) -> u8 {
        self.data[24]
    }

    pub const fn trfc_min_msb(&self) -> u8 {
        self.data[25]
    }

    /// Byte 26: minimum internal write to read command delay tWTRmin.
    pub const fn twtr_min(&self) -> u8 {
        self.data[26]
    }

    /// Byte 27: minimum internal read to precharge command delay tRTPmin.
    pub const fn trtp_min(&self) -> u8 {
        self.data[27]
    }

    /// Bytes 28/29: minimum four activate window tFAWmin.
    pub const fn tfaw_msb(&self) -> u8 {
        self.data[28]
    }

    pub const fn tfaw_lsb(&self) -> u8 {
        self.data[29]
    }

    /// Byte 31: SDRAM thermal and refresh options.
    pub const fn therm_ref_opt(&self) -> u8 {
        self.data[31]
    }

    /// Bytes 34-38: signed fine corrections in FTB units for tCKmin, tAAmin,
    /// tRCDmin, tRPmin and tRCmin.
    pub const fn fine_tck_min(&self) -> i8 {
        self.data[34] as i8
    }

    pub const fn fine_taa_min(&self) -> i8 {
        self.data[35] as i8
    }

    pub const fn fine_trcd_min(&self) -> i8 {
        self.data[36] as i8
    }

    pub const fn fine_trp_min(&self) -> i8 {
        self.data[37] as i8
    }

    pub const fn fine_trc_min(&self) -> i8 {
        self.data[38] as i8
    }

    /// Byte 63 (unbuffered modules): address mapping, bit 0 = rank 1 mirrored.
    pub const fn unbuffered_mod_section(&self) -> u8 {
        self.data[63]
    }

    /// Bytes 69..=76 (registered modules): register control words RC0..RC15,
    /// packed two nibbles per byte.
    pub const fn registered_ctrl_word(&self, idx: usize) -> u8 {
        self.data[69 + idx]
    }

    /// Bytes 126/127: stored CRC, little endian.
    pub const fn stored_crc(&self) -> u16 {
        self.data[126] as u16 | ((self.data[127] as u16) << 8)
    }

    /// Validate the stored CRC.
    ///
    /// Byte 0 bit 7 selects whether the CRC covers bytes 0..=116 or 0..=125.
    pub fn check_crc(&self) -> Result<(), SpdError> {
        let len = if self.info_size_crc() & 0x80 != 0 {
            117
        } else {
            126
        };
        let computed = crc16(&self.data[..len]);
        let stored = self.stored_crc();
        if computed != stored {
            return Err(SpdError::CrcMismatch { computed, stored });
        }
        Ok(())
    }
}

/// CRC-16/XMODEM over the given bytes, as mandated for SPD integrity coverage.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u32 = 0;
    for byte in data {
        crc ^= (*byte as u32) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    (crc & 0xFFFF) as u16
}

/// Everything the reconciliation and register synthesis stages need to know
/// about one DIMM. All timings are in picoseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimmParams {
    /// Number of ranks on the module; 0 marks an unpopulated slot.
    pub n_ranks: u32,
    /// Bytes of memory per rank.
    pub rank_density: u64,
    /// Total module capacity in bytes.
    pub capacity: u64,
    /// Primary data bus width in bits (without ECC extension).
    pub primary_sdram_width: u32,
    /// Error-correction extension width in bits (8 for ECC modules, else 0).
    pub ec_sdram_width: u32,
    /// SDRAM device width in bits (x4, x8 or x16).
    pub device_width: u32,
    /// 0 = no extension, 2 = ECC capable.
    pub edc_config: u32,
    pub n_row_addr: u32,
    pub n_col_addr: u32,
    pub n_banks_per_sdram_device: u32,
    pub burst_lengths_bitmask: u8,
    pub registered_dimm: bool,
    /// Rank 1 has mirrored address mapping (unbuffered modules only).
    pub mirrored_dimm: bool,
    /// Supported CAS latencies, shifted so bit n = CLn.
    pub caslat_x: u32,
    pub taa_ps: u32,
    pub tck_min_x_ps: u32,
    pub tck_max_ps: u32,
    pub twr_ps: u32,
    pub trcd_ps: u32,
    pub trrd_ps: u32,
    pub trp_ps: u32,
    pub tras_ps: u32,
    pub trc_ps: u32,
    pub trfc_ps: u32,
    pub twtr_ps: u32,
    pub trtp_ps: u32,
    pub tfaw_ps: u32,
    pub refresh_rate_ps: u32,
    /// Module supports a 1x refresh rate when self-refreshing in the extended
    /// temperature range.
    pub extended_op_srt: bool,
    /// Register control word nibbles RC0..RC15 (registered modules).
    pub rcw: [u8; 16],
    /// Assigned during address assignment, not by the decoder.
    pub base_address: u64,
}

impl DimmParams {
    /// Slot is populated with a module.
    pub const fn is_present(&self) -> bool {
        self.n_ranks > 0
    }
}

/// Upper bound on tCK for DDR3 devices. SPD rev 1.x carries no tCKmax field, so
/// the DDR3-800 bin limit is used.
const DDR3_TCK_MAX_PS: u32 = 3300;

/// Decode a validated DDR3 SPD image into [`DimmParams`].
///
/// `dimm_number` is only used for log messages.
pub fn compute_dimm_parameters(
    spd: &SpdEeprom,
    dimm_number: usize,
) -> Result<DimmParams, SpdError> {
    if spd.mem_type() != SPD_MEMTYPE_DDR3 {
        return Err(SpdError::UnsupportedMemType(spd.mem_type()));
    }
    spd.check_crc().inspect_err(|_| {
        log::error!("DIMM {}: SPD checksum failure", dimm_number);
    })?;

    let mut pdimm = DimmParams::default();

    match spd.module_type() & 0x0F {
        SPD_MODTYPE_RDIMM | SPD_MODTYPE_MINI_RDIMM => {
            pdimm.registered_dimm = true;
            for i in 0..8 {
                let byte = spd.registered_ctrl_word(i);
                pdimm.rcw[2 * i] = byte & 0x0F;
                pdimm.rcw[2 * i + 1] = (byte >> 4) & 0x0F;
            }
        }
        SPD_MODTYPE_UDIMM | SPD_MODTYPE_SODIMM | SPD_MODTYPE_MICRO_DIMM
        | SPD_MODTYPE_MINI_UDIMM => {
            pdimm.mirrored_dimm = spd.unbuffered_mod_section() & 0x1 != 0;
        }
        other => {
            log::error!("DIMM {}: unknown module type {:#04x}", dimm_number, other);
            return Err(SpdError::UnknownModuleType(other));
        }
    }

    pdimm.n_ranks = (((spd.organization() >> 3) & 0x7) + 1) as u32;
    pdimm.device_width = 4u32 << (spd.organization() & 0x7) as u32;
    pdimm.primary_sdram_width = 8u32 << (spd.bus_width() & 0x7) as u32;
    if spd.bus_width() & 0x18 != 0 {
        pdimm.ec_sdram_width = 8;
        pdimm.edc_config = 0x02;
    }
    pdimm.n_row_addr = (((spd.addressing() >> 3) & 0x7) + 12) as u32;
    pdimm.n_col_addr = ((spd.addressing() & 0x7) + 9) as u32;
    pdimm.n_banks_per_sdram_device = 8u32 << ((spd.density_banks() >> 4) & 0x7) as u32;
    pdimm.burst_lengths_bitmask = DDR3_BURST_LENGTHS_BITMASK;

    pdimm.rank_density = compute_rank_size(spd);
    pdimm.capacity = pdimm.n_ranks as u64 * pdimm.rank_density;

    // Medium timebase in ps and fine timebase in tenths of a ps. The typical
    // encoding is 1/8 ns MTB (125 ps) and 1 ps FTB.
    if spd.mtb_divisor() == 0 {
        return Err(SpdError::ZeroTimebase);
    }
    let mtb_ps = (spd.mtb_dividend() as u32 * 1000) / spd.mtb_divisor() as u32;
    let ftb_10th_ps = {
        let dividend = (spd.ftb_div() >> 4) as i32;
        let divisor = (spd.ftb_div() & 0x0F) as i32;
        if divisor == 0 { 10 } else { dividend * 10 / divisor }
    };
    let with_fine = |mtb_units: u32, fine: i8| -> u32 {
        let ps = mtb_units as i64 * mtb_ps as i64 + (fine as i64 * ftb_10th_ps as i64) / 10;
        ps as u32
    };

    pdimm.tck_min_x_ps = with_fine(spd.tck_min() as u32, spd.fine_tck_min());
    pdimm.tck_max_ps = DDR3_TCK_MAX_PS;
    pdimm.caslat_x = ((spd.caslat_msb() as u32) << 8 | spd.caslat_lsb() as u32) << 4;
    pdimm.taa_ps = with_fine(spd.taa_min() as u32, spd.fine_taa_min());
    pdimm.twr_ps = spd.twr_min() as u32 * mtb_ps;
    pdimm.trcd_ps = with_fine(spd.trcd_min() as u32, spd.fine_trcd_min());
    pdimm.trrd_ps = spd.trrd_min() as u32 * mtb_ps;
    pdimm.trp_ps = with_fine(spd.trp_min() as u32, spd.fine_trp_min());
    pdimm.tras_ps =
        (((spd.tras_trc_ext() & 0x0F) as u32) << 8 | spd.tras_min_lsb() as u32) * mtb_ps;
    pdimm.trc_ps = with_fine(
        ((spd.tras_trc_ext() >> 4) as u32) << 8 | spd.trc_min_lsb() as u32,
        spd.fine_trc_min(),
    );
    pdimm.trfc_ps =
        ((spd.trfc_min_msb() as u32) << 8 | spd.trfc_min_lsb() as u32) * mtb_ps;
    pdimm.twtr_ps = spd.twtr_min() as u32 * mtb_ps;
    pdimm.trtp_ps = spd.trtp_min() as u32 * mtb_ps;
    pdimm.tfaw_ps =
        (((spd.tfaw_msb() & 0x0F) as u32) << 8 | spd.tfaw_lsb() as u32) * mtb_ps;

    pdimm.refresh_rate_ps = DDR3_REFRESH_RATE_PS;
    pdimm.extended_op_srt = spd.therm_ref_opt() & 0x1 != 0;

    Ok(pdimm)
}

/// Rank size in bytes from the density, bus width and device width fields.
fn compute_rank_size(spd: &SpdEeprom) -> u64 {
    let nbit_sdram_cap_bsize = ((spd.density_banks() & 0xF) + 28) as u32;
    let nbit_primary_bus_width = ((spd.bus_width() & 0x7) + 3) as u32;
    let nbit_sdram_width = ((spd.organization() & 0x7) + 2) as u32;
    1u64 << (nbit_sdram_cap_bsize - 3 + nbit_primary_bus_width - nbit_sdram_width)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A 2 GiB dual-rank x8 DDR3-1600 UDIMM, CL5..CL11, the timings of a common
    /// 11-11-11 part.
    pub(crate) fn ddr3_1600_udimm() -> SpdEeprom {
        let mut d = [0u8; SPD_EEPROM_SIZE];
        d[0] = 0x92; // 176 bytes used, 256 total, CRC covers 0..=116
        d[1] = 0x11;
        d[2] = SPD_MEMTYPE_DDR3;
        d[3] = SPD_MODTYPE_UDIMM;
        d[4] = 0x02; // 8 banks, 1 Gib devices
        d[5] = 0x11; // 14 rows, 10 columns
        d[6] = 0x02;
        d[7] = 0x09; // 2 ranks, x8 devices
        d[8] = 0x03; // 64-bit primary bus, no ECC
        d[9] = 0x11; // FTB 1 ps
        d[10] = 0x01; // MTB 1/8 ns
        d[11] = 0x08;
        d[12] = 0x0A; // tCKmin 1.25 ns
        d[14] = 0xFE; // CL5..CL11
        d[15] = 0x00;
        d[16] = 0x69; // tAAmin 13.125 ns
        d[17] = 0x78; // tWRmin 15 ns
        d[18] = 0x69; // tRCDmin 13.125 ns
        d[19] = 0x30; // tRRDmin 6 ns
        d[20] = 0x69; // tRPmin 13.125 ns
        d[21] = 0x11; // tRAS/tRC upper nibbles
        d[22] = 0x18; // tRASmin 35 ns (0x118 MTB)
        d[23] = 0x81; // tRCmin 48.125 ns (0x181 MTB)
        d[24] = 0x00; // tRFCmin 160 ns
        d[25] = 0x05;
        d[26] = 0x3C; // tWTRmin 7.5 ns
        d[27] = 0x3C; // tRTPmin 7.5 ns
        d[28] = 0x01; // tFAWmin 40 ns
        d[29] = 0x40;
        let crc = crc16(&d[..117]);
        d[126] = (crc & 0xFF) as u8;
        d[127] = (crc >> 8) as u8;
        SpdEeprom::new(d)
    }

    #[test]
    fn crc_check_accepts_valid_image() {
        assert!(ddr3_1600_udimm().check_crc().is_ok());
    }

    #[test]
    fn crc_check_rejects_corruption() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[16] ^= 0x01;
        let spd = SpdEeprom::new(d);
        assert!(matches!(
            spd.check_crc(),
            Err(SpdError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn rejects_non_ddr3() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[2] = 0x08; // DDR2
        let spd = SpdEeprom::new(d);
        assert!(matches!(
            compute_dimm_parameters(&spd, 0),
            Err(SpdError::UnsupportedMemType(0x08))
        ));
    }

    #[test]
    fn decodes_ddr3_1600_udimm() {
        let pdimm = compute_dimm_parameters(&ddr3_1600_udimm(), 0).unwrap();
        assert_eq!(pdimm.n_ranks, 2);
        assert_eq!(pdimm.device_width, 8);
        assert_eq!(pdimm.primary_sdram_width, 64);
        assert_eq!(pdimm.ec_sdram_width, 0);
        assert_eq!(pdimm.n_row_addr, 14);
        assert_eq!(pdimm.n_col_addr, 10);
        assert_eq!(pdimm.n_banks_per_sdram_device, 8);
        assert_eq!(pdimm.rank_density, 1 << 30);
        assert_eq!(pdimm.capacity, 2 << 30);
        assert!(!pdimm.registered_dimm);
        assert!(!pdimm.mirrored_dimm);

        assert_eq!(pdimm.tck_min_x_ps, 1250);
        assert_eq!(pdimm.taa_ps, 13_125);
        assert_eq!(pdimm.twr_ps, 15_000);
        assert_eq!(pdimm.trcd_ps, 13_125);
        assert_eq!(pdimm.trrd_ps, 6_000);
        assert_eq!(pdimm.trp_ps, 13_125);
        assert_eq!(pdimm.tras_ps, 35_000);
        assert_eq!(pdimm.trc_ps, 48_125);
        assert_eq!(pdimm.trfc_ps, 160_000);
        assert_eq!(pdimm.twtr_ps, 7_500);
        assert_eq!(pdimm.trtp_ps, 7_500);
        assert_eq!(pdimm.tfaw_ps, 40_000);
        assert_eq!(pdimm.refresh_rate_ps, DDR3_REFRESH_RATE_PS);

        // CL5..CL11 shifted so bit n means CLn.
        assert_eq!(pdimm.caslat_x, 0x0FE0);
    }

    #[test]
    fn fine_corrections_are_signed() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[34] = (-5i8) as u8; // tCKmin fine correction -5 ps
        d[35] = 3; // tAAmin fine correction +3 ps
        let crc = crc16(&d[..117]);
        d[126] = (crc & 0xFF) as u8;
        d[127] = (crc >> 8) as u8;
        let pdimm = compute_dimm_parameters(&SpdEeprom::new(d), 0).unwrap();
        assert_eq!(pdimm.tck_min_x_ps, 1245);
        assert_eq!(pdimm.taa_ps, 13_128);
    }

    #[test]
    fn decodes_registered_control_words() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[3] = SPD_MODTYPE_RDIMM;
        d[69] = 0x21; // RC0 = 1, RC1 = 2
        d[70] = 0x43; // RC2 = 3, RC3 = 4
        let crc = crc16(&d[..117]);
        d[126] = (crc & 0xFF) as u8;
        d[127] = (crc >> 8) as u8;
        let pdimm = compute_dimm_parameters(&SpdEeprom::new(d), 0).unwrap();
        assert!(pdimm.registered_dimm);
        assert_eq!(pdimm.rcw[0], 1);
        assert_eq!(pdimm.rcw[1], 2);
        assert_eq!(pdimm.rcw[2], 3);
        assert_eq!(pdimm.rcw[3], 4);
    }

    #[test]
    fn decodes_mirrored_flag() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[63] = 0x01;
        let crc = crc16(&d[..117]);
        d[126] = (crc & 0xFF) as u8;
        d[127] = (crc >> 8) as u8;
        let pdimm = compute_dimm_parameters(&SpdEeprom::new(d), 0).unwrap();
        assert!(pdimm.mirrored_dimm);
    }

    #[test]
    fn ecc_module_widths() {
        let mut d = *ddr3_1600_udimm().as_bytes();
        d[8] = 0x0B; // 64-bit primary bus + 8-bit ECC extension
        let crc = crc16(&d[..117]);
        d[126] = (crc & 0xFF) as u8;
        d[127] = (crc >> 8) as u8;
        let pdimm = compute_dimm_parameters(&SpdEeprom::new(d), 0).unwrap();
        assert_eq!(pdimm.primary_sdram_width, 64);
        assert_eq!(pdimm.ec_sdram_width, 8);
        assert_eq!(pdimm.edc_config, 0x02);
    }
}
