// console.rs — console print helpers for the save/restore subsystem
//
// Mirrors the usual engine console surface: con_printf always prints,
// con_dprintf only in developer mode, con_warning prefixes the message.
// When a redirect is active, output is captured instead of printed; tests
// use this to assert on warnings.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);
static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// General-purpose print. Appends to the redirect buffer if one is active.
pub fn con_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// Developer-only print. Controlled by `set_developer`.
pub fn con_dprintf(msg: &str) {
    if !DEVELOPER.load(Ordering::Relaxed) {
        return;
    }
    con_printf(msg);
}

pub fn con_warning(msg: &str) {
    con_printf(&format!("WARNING: {}", msg));
}

pub fn set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

/// Begin capturing console output instead of printing it.
pub fn begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// Stop capturing and return everything printed since `begin_redirect`.
pub fn end_redirect() -> String {
    RD_BUFFER.lock().take().unwrap_or_default()
}
