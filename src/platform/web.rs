//! Browser Platform Implementation
//!
//! Routes the `log` facade to the browser console and schedules deferred
//! callbacks with `setTimeout`.

use log::{Level, LevelFilter, Log, Metadata, Record};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// `log` backend writing to `console.*`
pub struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            Level::Error => web_sys::console::error_1(&line),
            Level::Warn => web_sys::console::warn_1(&line),
            Level::Info => web_sys::console::info_1(&line),
            Level::Debug => web_sys::console::debug_1(&line),
            Level::Trace => web_sys::console::log_1(&line),
        }
    }

    fn flush(&self) {}
}

/// Install the panic hook and the console logger
pub fn init(level: LevelFilter) {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Run `task` on a later turn of the event loop
pub fn set_timeout(task: impl FnOnce() + 'static) {
    let callback = Closure::once_into_js(task);
    let scheduled = web_sys::window()
        .map(|window| window.set_timeout_with_callback(callback.unchecked_ref()))
        .unwrap_or_else(|| Err(JsValue::from_str("no window")));

    if let Err(err) = scheduled {
        log::error!("setTimeout failed: {:?}", err);
    }
}
