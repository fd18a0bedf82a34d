use anyhow::{Context, Result};
use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem},
    TrayIcon, TrayIconBuilder,
};
use image::{Rgba, RgbaImage};

use crate::controller::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayMenuEvent {
    ToggleDictation,
    Settings,
    Quit,
}

/// Menu-bar status display. Consumes controller status notifications and
/// reflects them in the icon: red dot while recording (blinking), amber
/// dot while transcribing.
pub struct TrayApp {
    tray_icon: TrayIcon,
    toggle_item: MenuItem,
    settings_item: MenuItem,
    base_icon: tray_icon::Icon,
    recording_icon: tray_icon::Icon,
    transcribing_icon: tray_icon::Icon,
    is_recording_visible: bool,
}

impl TrayApp {
    pub fn new() -> Result<Self> {
        // Waveform bars (white on transparent), with a colored state dot
        let size = 32u32;
        let base_icon = Self::create_icon(size, None)?;
        let recording_icon = Self::create_icon(size, Some(Rgba([255, 59, 48, 255])))?;
        let transcribing_icon = Self::create_icon(size, Some(Rgba([255, 159, 10, 255])))?;

        let menu = Menu::new();

        let toggle_item = MenuItem::new("Toggle Dictation", true, None);
        let settings_item = MenuItem::new("Settings", true, None);

        menu.append(&toggle_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&settings_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&PredefinedMenuItem::quit(Some("Quit")))?;

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Whisper Key")
            .with_icon(base_icon.clone())
            .build()
            .context("Failed to create tray icon")?;

        Ok(TrayApp {
            tray_icon,
            toggle_item,
            settings_item,
            base_icon,
            recording_icon,
            transcribing_icon,
            is_recording_visible: false,
        })
    }

    fn create_icon(size: u32, dot: Option<Rgba<u8>>) -> Result<tray_icon::Icon> {
        let mut img = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));

        // White matches the other menu bar icons
        let white = Rgba([255, 255, 255, 255]);

        // Draw 4 vertical waveform bars, scaled from a 22x22 design
        let scale = 32.0 / 22.0;

        Self::draw_rect(&mut img, (2.0 * scale) as u32, (10.0 * scale) as u32,
                       (3.0 * scale) as u32, (6.0 * scale) as u32, white);
        Self::draw_rect(&mut img, (7.0 * scale) as u32, (4.0 * scale) as u32,
                       (3.0 * scale) as u32, (14.0 * scale) as u32, white);
        Self::draw_rect(&mut img, (12.0 * scale) as u32, (7.0 * scale) as u32,
                       (3.0 * scale) as u32, (10.0 * scale) as u32, white);
        Self::draw_rect(&mut img, (17.0 * scale) as u32, (9.0 * scale) as u32,
                       (3.0 * scale) as u32, (7.0 * scale) as u32, white);

        // State dot in the top-right corner
        if let Some(color) = dot {
            Self::draw_circle(&mut img, (24.0 * scale) as u32, (4.0 * scale) as u32,
                             (3.0 * scale) as u32, color);
        }

        tray_icon::Icon::from_rgba(img.into_raw(), size, size)
            .context("Failed to create tray icon image")
    }

    fn draw_circle(img: &mut RgbaImage, cx: u32, cy: u32, radius: u32, color: Rgba<u8>) {
        let width = img.width();
        let height = img.height();
        let r_sq = (radius * radius) as i32;

        for dy in -(radius as i32)..=(radius as i32) {
            for dx in -(radius as i32)..=(radius as i32) {
                if dx * dx + dy * dy <= r_sq {
                    let px = (cx as i32 + dx) as u32;
                    let py = (cy as i32 + dy) as u32;
                    if px < width && py < height {
                        img.put_pixel(px, py, color);
                    }
                }
            }
        }
    }

    fn draw_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
        let width = img.width();
        let height = img.height();

        for py in y..(y + h).min(height) {
            for px in x..(x + w).min(width) {
                img.put_pixel(px, py, color);
            }
        }
    }

    pub fn set_status(&mut self, status: Status) {
        let icon = match status {
            Status::Recording => {
                self.is_recording_visible = true;
                &self.recording_icon
            }
            Status::Transcribing => &self.transcribing_icon,
            Status::Idle | Status::Error => {
                self.is_recording_visible = false;
                &self.base_icon
            }
        };
        let _ = self.tray_icon.set_icon(Some(icon.clone()));
    }

    /// Toggle the recording dot (call periodically while recording for a
    /// blinking effect)
    pub fn blink_recording_indicator(&mut self) {
        self.is_recording_visible = !self.is_recording_visible;
        let icon = if self.is_recording_visible {
            &self.recording_icon
        } else {
            &self.base_icon
        };
        let _ = self.tray_icon.set_icon(Some(icon.clone()));
    }

    pub fn poll_event(&self) -> Option<TrayMenuEvent> {
        if let Ok(event) = MenuEvent::receiver().try_recv() {
            let id = event.id();

            if id == self.toggle_item.id() {
                return Some(TrayMenuEvent::ToggleDictation);
            } else if id == self.settings_item.id() {
                return Some(TrayMenuEvent::Settings);
            } else if id.0 == "quit" {
                return Some(TrayMenuEvent::Quit);
            }
        }
        None
    }
}
