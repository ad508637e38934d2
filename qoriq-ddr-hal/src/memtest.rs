//! Post-initialization memory tests.
//!
//! Small destructive pattern tests to sanity check data lines and cell
//! retention right after the controller comes up, before anything else lives
//! in DRAM.

#[derive(Debug, thiserror::Error)]
pub enum MemTestError {
    #[error("memory address is not aligned to 4 bytes")]
    AddrNotAligned,
    #[error("memory mismatch at {addr:#010x}: expected {expected:#010x}, found {found:#010x}")]
    Memory {
        addr: usize,
        expected: u32,
        found: u32,
    },
}

/// # Safety
///
/// Writes and reads back the memory block of `words` 32-bit words starting at
/// `base_addr`. The region must be backed by initialized RAM and not in use.
pub unsafe fn walking_one_test(base_addr: usize, words: usize) -> Result<(), MemTestError> {
    unsafe { walking_value_test(false, base_addr, words) }
}

/// # Safety
///
/// Writes and reads back the memory block of `words` 32-bit words starting at
/// `base_addr`. The region must be backed by initialized RAM and not in use.
pub unsafe fn walking_zero_test(base_addr: usize, words: usize) -> Result<(), MemTestError> {
    unsafe { walking_value_test(true, base_addr, words) }
}

/// # Safety
///
/// Writes and reads back the memory block of `words` 32-bit words starting at
/// `base_addr`. The region must be backed by initialized RAM and not in use.
pub unsafe fn walking_value_test(
    walking_zero: bool,
    base_addr: usize,
    words: usize,
) -> Result<(), MemTestError> {
    if words == 0 {
        return Ok(());
    }
    if !base_addr.is_multiple_of(4) {
        return Err(MemTestError::AddrNotAligned);
    }
    let base_ptr = base_addr as *mut u32;

    for bit in 0..32 {
        let pattern = if walking_zero {
            !(1u32 << bit)
        } else {
            1u32 << bit
        };

        for i in 0..words {
            unsafe {
                core::ptr::write_volatile(base_ptr.add(i), pattern);
            }
        }
        for i in 0..words {
            let found = unsafe { core::ptr::read_volatile(base_ptr.add(i) as *const u32) };
            if found != pattern {
                return Err(MemTestError::Memory {
                    addr: base_addr + i * 4,
                    expected: pattern,
                    found,
                });
            }
        }
    }
    Ok(())
}

/// # Safety
///
/// Writes and reads back the memory block of `words` 32-bit words starting at
/// `base_addr`. The region must be backed by initialized RAM and not in use.
pub unsafe fn checkerboard_test(base_addr: usize, words: usize) -> Result<(), MemTestError> {
    if words == 0 {
        return Ok(());
    }
    if !base_addr.is_multiple_of(4) {
        return Err(MemTestError::AddrNotAligned);
    }
    let base_ptr = base_addr as *mut u32;

    for &pattern in &[0xAAAA_AAAAu32, 0x5555_5555u32] {
        for i in 0..words {
            let value = if i % 2 == 0 { pattern } else { !pattern };
            unsafe {
                core::ptr::write_volatile(base_ptr.add(i), value);
            }
        }
        for i in 0..words {
            let expected = if i % 2 == 0 { pattern } else { !pattern };
            let found = unsafe { core::ptr::read_volatile(base_ptr.add(i) as *const u32) };
            if found != expected {
                return Err(MemTestError::Memory {
                    addr: base_addr + i * 4,
                    expected,
                    found,
                });
            }
        }
    }
    Ok(())
}
