// Detection of environments where no browser can be opened for OIDC logins

use std::sync::atomic::{AtomicBool, Ordering};

static FORCE_HEADLESS: AtomicBool = AtomicBool::new(false);

/// Set from `--headless`; wins over every heuristic below.
pub fn set_headless_override(headless: bool) {
    FORCE_HEADLESS.store(headless, Ordering::Relaxed);
}

/// True when the login URL should be printed instead of opened.
///
/// Detected by the `--headless` flag, an SSH session, a CI runner, a dumb
/// terminal, or (outside macOS) a missing `DISPLAY`.
pub fn is_headless_environment() -> bool {
    if FORCE_HEADLESS.load(Ordering::Relaxed) {
        tracing::debug!("Headless mode: forced by --headless flag");
        return true;
    }

    let lookup = |key: &str| std::env::var(key).ok();
    match headless_reason(lookup) {
        Some(reason) => {
            tracing::debug!("Headless detected: {}", reason);
            true
        }
        None => {
            tracing::debug!("Not headless: detected graphical environment");
            false
        }
    }
}

fn headless_reason<F>(lookup: F) -> Option<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    if lookup("SSH_TTY").is_some() {
        return Some("SSH_TTY set");
    }
    if lookup("SSH_CONNECTION").is_some() {
        return Some("SSH_CONNECTION set");
    }
    if lookup("CI").is_some() {
        return Some("CI environment");
    }
    if let Some(term) = lookup("TERM") {
        if term == "dumb" || term.is_empty() {
            return Some("TERM is dumb or empty");
        }
    }

    // macOS has no X11 DISPLAY
    if cfg!(not(target_os = "macos")) && lookup("DISPLAY").is_none() {
        return Some("DISPLAY not set");
    }

    None
}
