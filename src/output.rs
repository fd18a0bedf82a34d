use crate::controller::ResultEvent;

/// Deliver a completed transcription to the configured outputs.
///
/// An empty result means "nothing to type or copy"; it must not touch the
/// clipboard or post any keystrokes.
pub fn deliver(event: &ResultEvent) {
    if event.text.is_empty() {
        return;
    }

    if event.use_clipboard {
        copy_to_clipboard(&event.text);
    }
    if event.type_result {
        keyboard::type_text(&event.text);
    }
}

fn copy_to_clipboard(text: &str) {
    match arboard::Clipboard::new() {
        Ok(mut clipboard) => {
            if let Err(e) = clipboard.set_text(text.to_string()) {
                eprintln!("Failed to copy to clipboard: {}", e);
            }
        }
        Err(e) => eprintln!("Failed to open clipboard: {}", e),
    }
}

#[cfg(target_os = "macos")]
pub mod keyboard {
    use core_graphics::event::{CGEvent, CGEventTapLocation};
    use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    // Serialize keyboard events so concurrent deliveries cannot interleave
    static KEYBOARD_LOCK: Mutex<()> = Mutex::new(());

    static ACCESSIBILITY_CHECKED: AtomicBool = AtomicBool::new(false);
    static ACCESSIBILITY_GRANTED: AtomicBool = AtomicBool::new(false);

    /// Check if accessibility permissions are granted, posting a probe event
    fn check_accessibility_permissions() -> bool {
        if ACCESSIBILITY_CHECKED.load(Ordering::Relaxed) {
            return ACCESSIBILITY_GRANTED.load(Ordering::Relaxed);
        }

        let has_permission = match CGEventSource::new(CGEventSourceStateID::HIDSystemState) {
            Ok(source) => CGEvent::new_keyboard_event(source, 0, true).is_ok(),
            Err(_) => false,
        };

        ACCESSIBILITY_CHECKED.store(true, Ordering::Relaxed);
        ACCESSIBILITY_GRANTED.store(has_permission, Ordering::Relaxed);

        if !has_permission {
            eprintln!();
            eprintln!("WARNING: Accessibility permissions not granted!");
            eprintln!("    Keyboard typing will not work.");
            eprintln!("    1. Open System Settings -> Privacy & Security -> Accessibility");
            eprintln!("    2. Enable access for Terminal (or your terminal app)");
            eprintln!("    3. Restart the app");
            eprintln!();
        }

        has_permission
    }

    /// Type text into the focused application
    pub fn type_text(text: &str) {
        if text.is_empty() {
            return;
        }

        if !check_accessibility_permissions() {
            eprintln!("Skipping text output - no accessibility permissions");
            return;
        }

        let _lock = KEYBOARD_LOCK.lock().unwrap();

        let source = match CGEventSource::new(CGEventSourceStateID::HIDSystemState) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to create event source: {:?}", e);
                return;
            }
        };

        let utf16: Vec<u16> = text.encode_utf16().collect();
        if let Ok(event) = CGEvent::new_keyboard_event(source, 0, true) {
            event.set_string_from_utf16_unchecked(&utf16);
            event.post(CGEventTapLocation::HID);
        } else {
            eprintln!("Failed to create keyboard event");
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub mod keyboard {
    pub fn type_text(_text: &str) {
        eprintln!("Keyboard typing only supported on macOS");
    }
}
