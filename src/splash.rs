//! Boot splash and the connection-info screen shown once the access point is
//! up.

use alloc::format;

use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        iso_8859_1::{
            FONT_6X10,
            FONT_10X20,
        },
    },
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{
        Circle,
        PrimitiveStyle,
        Rectangle,
    },
    text::{
        Alignment,
        Baseline,
        Text,
        TextStyleBuilder,
    },
};

use crate::config::{
    AP_PASSWORD,
    AP_SSID,
    AUTHOR,
    COLOR_ACCENT,
    COLOR_BACKGROUND,
    COLOR_PRIMARY,
    COLOR_SECONDARY,
    COLOR_TEXT,
    PANEL_WIDTH,
    SUBTITLE,
    TITLE,
    VERSION,
    WEB_URL,
};

/// Widest progress fill, in pixels.
pub const PROGRESS_MAX: u32 = 220;

const PROGRESS_FRAME: Rectangle = Rectangle::new(Point::new(10, 230), Size::new(222, 20));
const PROGRESS_INNER: Rectangle = Rectangle::new(Point::new(11, 231), Size::new(PROGRESS_MAX, 18));

const FEATURES: [&str; 4] = [
    "- WiFi Access Point",
    "- PNG/JPEG Display",
    "- Web Interface",
    "- 240x320 TFT",
];

const INSTRUCTIONS: [&str; 4] = [
    "1. Connect to the WiFi above",
    "2. Open the URL in a browser",
    "3. Upload 240x320 PNG/JPG images",
    "4. View images on this display",
];

/// What the splash screen announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplashInfo<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
    pub version: &'a str,
    pub author: &'a str,
}

impl Default for SplashInfo<'static> {
    fn default() -> Self {
        Self {
            title: TITLE,
            subtitle: SUBTITLE,
            version: VERSION,
            author: AUTHOR,
        }
    }
}

/// Access-point details for the connection screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    pub url: &'a str,
}

impl Default for ConnectionInfo<'static> {
    fn default() -> Self {
        Self {
            ssid: AP_SSID,
            password: AP_PASSWORD,
            url: WEB_URL,
        }
    }
}

fn text<D>(target: &mut D, s: &str, x: i32, y: i32, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(&FONT_6X10, color);
    Text::with_baseline(s, Point::new(x, y), style, Baseline::Top).draw(target)?;
    Ok(())
}

/// Large text centred horizontally with its top edge at `y`.
fn heading<D>(target: &mut D, s: &str, y: i32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(&FONT_10X20, COLOR_TEXT);
    let layout = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();
    Text::with_text_style(s, Point::new(PANEL_WIDTH as i32 / 2, y), style, layout).draw(target)?;
    Ok(())
}

/// Draws the boot screen with an empty progress bar.
pub fn draw_splash<D>(target: &mut D, info: &SplashInfo<'_>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(COLOR_BACKGROUND)?;

    target.fill_solid(&Rectangle::new(Point::zero(), Size::new(PANEL_WIDTH, 60)), COLOR_PRIMARY)?;
    heading(target, info.title, 15)?;

    let centred = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();
    Text::with_text_style(
        info.subtitle,
        Point::new(PANEL_WIDTH as i32 / 2, 40),
        MonoTextStyle::new(&FONT_6X10, COLOR_TEXT),
        centred,
    )
    .draw(target)?;

    text(target, &format!("Version: {}", info.version), 10, 80, COLOR_ACCENT)?;
    text(target, &format!("Author: {}", info.author), 10, 95, COLOR_ACCENT)?;

    text(target, "Features:", 10, 120, COLOR_TEXT)?;
    for (i, feature) in FEATURES.iter().enumerate() {
        text(target, feature, 20, 135 + 15 * i as i32, COLOR_TEXT)?;
    }

    text(target, "Initializing...", 10, 210, COLOR_SECONDARY)?;
    PROGRESS_FRAME
        .into_styled(PrimitiveStyle::with_stroke(COLOR_TEXT, 1))
        .draw(target)?;
    target.fill_solid(&PROGRESS_INNER, COLOR_BACKGROUND)
}

/// Fills the first `filled` pixels of the progress bar, clamped to
/// [`PROGRESS_MAX`].
pub fn draw_progress<D>(target: &mut D, filled: u32) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let area = Rectangle::new(
        PROGRESS_INNER.top_left,
        Size::new(filled.min(PROGRESS_MAX), PROGRESS_INNER.size.height),
    );
    target.fill_solid(&area, COLOR_SECONDARY)
}

pub fn draw_ready<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    text(target, "Ready!", 10, 260, COLOR_ACCENT)
}

/// Replaces the screen with the access point credentials and upload steps.
pub fn draw_connection_info<D>(target: &mut D, network: &ConnectionInfo<'_>) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(COLOR_BACKGROUND)?;

    target.fill_solid(&Rectangle::new(Point::zero(), Size::new(PANEL_WIDTH, 50)), COLOR_PRIMARY)?;
    heading(target, "Connection Info", 15)?;

    text(target, "WiFi Access Point:", 10, 65, COLOR_ACCENT)?;
    text(target, &format!("SSID: {}", network.ssid), 10, 80, COLOR_TEXT)?;
    text(target, &format!("Password: {}", network.password), 10, 95, COLOR_TEXT)?;

    text(target, "Web Interface:", 10, 125, COLOR_ACCENT)?;
    text(target, "URL:", 10, 140, COLOR_TEXT)?;
    text(target, network.url, 10, 155, COLOR_TEXT)?;

    text(target, "Instructions:", 10, 235, COLOR_SECONDARY)?;
    for (i, line) in INSTRUCTIONS.iter().enumerate() {
        text(target, line, 10, 250 + 15 * i as i32, COLOR_TEXT)?;
    }

    Circle::with_center(Point::new(225, 310), 13)
        .into_styled(PrimitiveStyle::with_fill(COLOR_SECONDARY))
        .draw(target)?;
    text(target, "Ready", 185, 307, COLOR_SECONDARY)
}
