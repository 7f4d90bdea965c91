use super::MemoryProbe;
use std::fs;
use std::path::PathBuf;

/// Reads the resident set size from `/proc/<pid>/statm`.
pub struct ProcMemoryProbe {
    page_size: u64,
    statm_path: PathBuf,
}

impl ProcMemoryProbe {
    /// Probe for the current process.
    pub fn new() -> Self {
        Self::for_path(PathBuf::from("/proc/self/statm"))
    }

    pub fn for_pid(pid: u32) -> Self {
        Self::for_path(PathBuf::from(format!("/proc/{}/statm", pid)))
    }

    fn for_path(statm_path: PathBuf) -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        Self {
            page_size: if page_size > 0 { page_size as u64 } else { 4096 },
            statm_path,
        }
    }

    fn parse_statm(content: &str, page_size: u64) -> Option<u64> {
        // size resident shared text lib data dt
        let resident_pages: u64 = content.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident_pages * page_size)
    }
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn rss_bytes(&self) -> Option<u64> {
        let content = fs::read_to_string(&self.statm_path).ok()?;
        Self::parse_statm(&content, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_resident_pages() {
        assert_eq!(ProcMemoryProbe::parse_statm("1000 250 30 4 0 90 0\n", 4096), Some(250 * 4096));
        assert_eq!(ProcMemoryProbe::parse_statm("", 4096), None);
        assert_eq!(ProcMemoryProbe::parse_statm("12 x", 4096), None);
    }

    #[test]
    fn missing_process_reads_none() {
        assert_eq!(ProcMemoryProbe::for_pid(999_999_999).rss_bytes(), None);
    }
}
