//! OS memory statistics: page faults and page size

/// Fallback page size when the OS does not report one
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Number of page faults (minor + major) since the process started.
///
/// Returns 0 when the counter cannot be read.
#[cfg(unix)]
pub fn read_page_fault_count() -> u64 {
    use nix::sys::resource::{getrusage, UsageWho};

    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let faults = usage.minor_page_faults().saturating_add(usage.major_page_faults());
            u64::try_from(faults).unwrap_or(0)
        }
        Err(_) => 0,
    }
}

#[cfg(not(unix))]
pub fn read_page_fault_count() -> u64 {
    0
}

/// Size of a memory page in bytes.
#[cfg(unix)]
pub fn page_size() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) => u64::try_from(size).unwrap_or(DEFAULT_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

#[cfg(not(unix))]
pub fn page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        let size = page_size();
        assert!(size >= 1024);
        assert!(size.is_power_of_two());
    }

    #[cfg(unix)]
    #[test]
    fn test_touching_fresh_memory_faults() {
        let before = read_page_fault_count();
        let pages = 64;
        let mut buf = vec![0u8; page_size() as usize * pages];
        for i in (0..buf.len()).step_by(page_size() as usize) {
            buf[i] = 1;
        }
        std::hint::black_box(&buf);
        let after = read_page_fault_count();
        assert!(after >= before);
    }
}
