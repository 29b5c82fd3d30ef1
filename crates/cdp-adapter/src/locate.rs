//! Finding a Chrome binary when the config does not name one.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const BINARY_NAMES: &[&str] = &["chrome.exe", "msedge.exe", "chromium.exe"];
#[cfg(not(windows))]
const BINARY_NAMES: &[&str] = &[
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];
#[cfg(windows)]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];
#[cfg(not(any(target_os = "macos", windows)))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/opt/google/chrome/chrome",
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/snap/bin/chromium",
];

/// `PILOT_CHROME`, then the binaries on `PATH`, then the usual install locations.
pub fn chrome_executable() -> Option<PathBuf> {
    let explicit = env::var("PILOT_CHROME").ok();
    let path_var = env::var_os("PATH");
    search(explicit.as_deref(), path_var.as_deref(), INSTALL_LOCATIONS)
}

fn search(explicit: Option<&str>, path_var: Option<&OsStr>, installs: &[&str]) -> Option<PathBuf> {
    let explicit = explicit
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .filter(|path| path.is_file());
    if explicit.is_some() {
        return explicit;
    }

    let on_path = path_var.and_then(|paths| {
        BINARY_NAMES
            .iter()
            .find_map(|name| which::which_in(name, Some(paths), Path::new(".")).ok())
    });
    on_path.or_else(|| {
        installs
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
    })
}
