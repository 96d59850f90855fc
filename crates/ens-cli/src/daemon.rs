use std::io;

/// Detach from the controlling terminal with a double fork.
///
/// Must run before any threads are started; each parent exits immediately.
#[cfg(unix)]
pub fn background_fork() -> io::Result<()> {
    fork_and_exit_parent()?;
    // SAFETY: single threaded at this point; setsid has no memory effects.
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }
    fork_and_exit_parent()
}

#[cfg(unix)]
fn fork_and_exit_parent() -> io::Result<()> {
    // SAFETY: called before the runtime or any other thread exists.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(()),
        _ => std::process::exit(0),
    }
}

#[cfg(not(unix))]
pub fn background_fork() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "daemon mode is only supported on unix, use --no-daemon",
    ))
}
