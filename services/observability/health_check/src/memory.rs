//! Process memory probe

use anyhow::Result;

/// Resident memory of the current process in bytes
pub fn process_memory_bytes() -> Result<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status")?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                if let Some(kb) = rest
                    .split_whitespace()
                    .next()
                    .and_then(|kb| kb.parse::<u64>().ok())
                {
                    return Ok(kb * 1024);
                }
            }
        }
        Err(anyhow::anyhow!(
            "Failed to read memory usage from /proc/self/status"
        ))
    }

    #[cfg(not(target_os = "linux"))]
    {
        // Use MaybeUninit to avoid undefined behavior with zeroed structs
        unsafe {
            let mut rusage = std::mem::MaybeUninit::<libc::rusage>::uninit();
            if libc::getrusage(libc::RUSAGE_SELF, rusage.as_mut_ptr()) == 0 {
                let rusage = rusage.assume_init();
                // ru_maxrss is bytes on macOS, kilobytes elsewhere
                #[cfg(target_os = "macos")]
                {
                    Ok(rusage.ru_maxrss as u64)
                }
                #[cfg(not(target_os = "macos"))]
                {
                    Ok((rusage.ru_maxrss as u64) * 1024)
                }
            } else {
                let errno = std::io::Error::last_os_error();
                Err(anyhow::anyhow!(
                    "Failed to get memory usage via getrusage: {}",
                    errno
                ))
            }
        }
    }
}

/// Resident memory in whole megabytes
pub fn process_memory_mb() -> Result<u64> {
    Ok(process_memory_bytes()? / (1024 * 1024))
}
