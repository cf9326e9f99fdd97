//! Compile-time configuration: panel geometry, storage layout, colours and
//! the access-point details shown on the onboarding screen.

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
};

// ── Panel ───────────────────────────────────────────────────────────────────

/// Physical panel width in portrait orientation.
pub const PANEL_WIDTH: u32 = 240;
/// Physical panel height in portrait orientation.
pub const PANEL_HEIGHT: u32 = 320;
/// Physical panel size.
pub const PANEL_SIZE: Size = Size::new(PANEL_WIDTH, PANEL_HEIGHT);

/// Colour the surface is wiped to before a new image is drawn.
pub const BACKGROUND: Rgb565 = Rgb565::BLACK;

// ── Storage ─────────────────────────────────────────────────────────────────

/// Directory every stored image lives under. Callers pass bare names.
pub const IMAGE_ROOT: &str = "/images/";

/// Flash region holding stored images, after the 1 MiB factory app.
pub const IMAGE_PARTITION: core::ops::Range<u32> = 0x0011_0000..0x0031_0000;

/// Room for one image in the flash store.
pub const IMAGE_SLOT_SIZE: u32 = 256 * 1024;

// ── Decoding ────────────────────────────────────────────────────────────────

/// Edge length of the square tiles the JPEG adapter emits.
pub const JPEG_TILE_SIZE: u32 = 16;

/// Upper bound on `width * height` accepted by the decoders.
pub const MAX_IMAGE_PIXELS: u32 = 1024 * 1024;

// ── Identity ────────────────────────────────────────────────────────────────

pub const TITLE: &str = "ESP32 Display";
pub const SUBTITLE: &str = "Image Display System";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHOR: &str = "Deltav-lab.";

// ── Network (shown on screen, the AP itself is brought up elsewhere) ────────

pub const AP_SSID: &str = "ESP32-ImageDisplay";
pub const AP_PASSWORD: &str = "12345678";
pub const WEB_URL: &str = "http://192.168.4.1/";

// ── Splash palette ──────────────────────────────────────────────────────────

/// Unpacks a raw RGB565 word as written in panel datasheets.
const fn rgb565(raw: u16) -> Rgb565 {
    Rgb565::new((raw >> 11) as u8, ((raw >> 5) & 0x3F) as u8, (raw & 0x1F) as u8)
}

/// Blue header bar.
pub const COLOR_PRIMARY: Rgb565 = rgb565(0x1C47);
/// Green progress / status.
pub const COLOR_SECONDARY: Rgb565 = rgb565(0x2323);
/// Orange highlights.
pub const COLOR_ACCENT: Rgb565 = rgb565(0xFD20);
pub const COLOR_TEXT: Rgb565 = Rgb565::WHITE;
/// Dark blue-grey splash background.
pub const COLOR_BACKGROUND: Rgb565 = rgb565(0x2965);

