//! Address-space limit installed in the child between fork and exec

/// Written to the child's stderr when the limit cannot be installed.
/// Logging is not available after fork, so this is a raw `write(2)`.
const LIMIT_FAILED_MESSAGE: &[u8] =
    b"Warning: could not apply memory limit, continuing without it\n";

/// Never raise the limit above an existing hard ceiling; the kernel would
/// reject the call.
pub(crate) fn clamp_to_hard_limit(requested: u64, hard: u64) -> u64 {
    requested.min(hard)
}

/// Register a pre-exec hook that caps `RLIMIT_AS` at `requested_bytes`.
pub(crate) fn install_memory_limit(cmd: &mut tokio::process::Command, requested_bytes: u64) {
    // SAFETY: the hook runs in the forked child and only calls getrlimit,
    // setrlimit and write, which are async-signal-safe. A failed limit is
    // reported on stderr and the spawn goes ahead.
    unsafe {
        cmd.pre_exec(move || {
            apply_memory_limit(requested_bytes);
            Ok(())
        });
    }
}

fn apply_memory_limit(requested_bytes: u64) {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut current) } != 0 {
        report_limit_failure();
        return;
    }

    #[allow(clippy::useless_conversion)]
    let limit = clamp_to_hard_limit(requested_bytes, u64::from(current.rlim_max)) as libc::rlim_t;
    let new_limit = libc::rlimit {
        rlim_cur: limit,
        rlim_max: limit,
    };
    if unsafe { libc::setrlimit(libc::RLIMIT_AS, &new_limit) } != 0 {
        report_limit_failure();
    }
}

fn report_limit_failure() {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            LIMIT_FAILED_MESSAGE.as_ptr() as *const libc::c_void,
            LIMIT_FAILED_MESSAGE.len(),
        );
    }
}
