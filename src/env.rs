// Environment detection for the device-flow browser prompt

/// Variables whose presence means nobody can click a browser link locally
const HEADLESS_MARKERS: [&str; 3] = ["SSH_TTY", "SSH_CONNECTION", "CI"];

/// Whether the SSO verification URL should be printed rather than opened.
///
/// True when `force` is set (`--headless`), inside SSH or CI, with a dumb
/// terminal, or without an X11 display outside macOS.
pub fn is_headless_environment(force: bool) -> bool {
    if force {
        tracing::debug!("Headless mode: forced by --headless flag");
        return true;
    }

    if let Some(marker) = HEADLESS_MARKERS
        .iter()
        .find(|name| std::env::var_os(name).is_some())
    {
        tracing::debug!("Headless detected: {} set", marker);
        return true;
    }

    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" || term.is_empty() {
            tracing::debug!("Headless detected: TERM is '{}'", term);
            return true;
        }
    }

    // macOS doesn't use DISPLAY
    #[cfg(not(target_os = "macos"))]
    {
        if std::env::var_os("DISPLAY").is_none() {
            tracing::debug!("Headless detected: DISPLAY not set");
            return true;
        }
    }

    tracing::debug!("Not headless: graphical environment");
    false
}
