//! Scrolling text console drawn straight onto the panel.
//!
//! Used for bring-up diagnostics before the image path is working. Lines are
//! 12 px apart in the small font, 26 to a screen. When the cursor reaches the
//! last line the lower part of the screen is wiped and writing continues from
//! [`WRAP_LINE`], so the header and the first messages stay visible.

use alloc::{
    borrow::Cow,
    format,
};
use core::fmt;

use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        iso_8859_1::FONT_6X10,
    },
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
    text::{
        Baseline,
        Text,
    },
};

use crate::config::{
    PANEL_HEIGHT,
    PANEL_WIDTH,
};

pub const LINE_HEIGHT: u32 = 12;
/// Lines that fit on the panel.
pub const LINES: u32 = PANEL_HEIGHT / LINE_HEIGHT;
/// Characters that fit on one line.
pub const MAX_CHARS: usize = 40;
/// First line reused after a wrap.
pub const WRAP_LINE: u32 = 15;

const HEADER: &str = "ESP32-S3 DEBUG CONSOLE";
const RULE: &str = "========================";

/// Message severity, shown as text colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Info,
    Debug,
    Warn,
    Error,
    Success,
    System,
}

impl Level {
    pub const fn color(self) -> Rgb565 {
        match self {
            Self::Info => Rgb565::WHITE,
            Self::Debug => Rgb565::CYAN,
            Self::Warn => Rgb565::YELLOW,
            Self::Error => Rgb565::RED,
            Self::Success => Rgb565::GREEN,
            Self::System => Rgb565::MAGENTA,
        }
    }
}

/// Shortens `msg` to [`MAX_CHARS`], ending in `...` when cut.
pub fn truncate(msg: &str) -> Cow<'_, str> {
    if msg.chars().count() <= MAX_CHARS {
        return Cow::Borrowed(msg);
    }
    let end = msg
        .char_indices()
        .nth(MAX_CHARS - 3)
        .map_or(msg.len(), |(i, _)| i);
    Cow::Owned(format!("{}...", &msg[..end]))
}

/// Cursor state of the on-screen console.
#[derive(Debug, Default)]
pub struct Console {
    line: u32,
    initialised: bool,
}

impl Console {
    pub const fn new() -> Self {
        Self {
            line: 0,
            initialised: false,
        }
    }

    /// Line the next message is written to.
    pub const fn line(&self) -> u32 {
        self.line
    }

    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Clears the panel and writes the header.
    pub fn init<D>(&mut self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.initialised = true;
        self.clear(target)
    }

    /// Clears the panel and rewinds to the line under the header.
    pub fn clear<D>(&mut self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        target.clear(Rgb565::BLACK)?;
        self.line = 0;
        self.write(target, HEADER, Level::System)?;
        self.line = 1;
        self.write(target, RULE, Level::Debug)?;
        self.line = 2;
        Ok(())
    }

    /// Writes `msg` on the current line without advancing.
    pub fn print<D>(&mut self, target: &mut D, msg: &str, level: Level) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        if !self.initialised {
            self.init(target)?;
        }
        self.wrap(target)?;
        self.write(target, &truncate(msg), level)
    }

    /// Writes `msg` and moves to the next line.
    pub fn println<D>(&mut self, target: &mut D, msg: &str, level: Level) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.print(target, msg, level)?;
        self.line += 1;
        if self.line >= LINES {
            self.wrap(target)?;
        }
        Ok(())
    }

    /// Formats and writes one line.
    pub fn log<D>(&mut self, target: &mut D, level: Level, args: fmt::Arguments<'_>) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        self.println(target, &format!("{args}"), level)
    }

    fn wrap<D>(&mut self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        if self.line < LINES - 1 {
            return Ok(());
        }
        let top = WRAP_LINE * LINE_HEIGHT;
        let area = Rectangle::new(
            Point::new(0, top as i32),
            Size::new(PANEL_WIDTH, PANEL_HEIGHT - top),
        );
        target.fill_solid(&area, Rgb565::BLACK)?;
        self.line = WRAP_LINE;
        Ok(())
    }

    fn write<D>(&self, target: &mut D, msg: &str, level: Level) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let style = MonoTextStyle::new(&FONT_6X10, level.color());
        let at = Point::new(0, (self.line * LINE_HEIGHT) as i32);
        Text::with_baseline(msg, at, style, Baseline::Top).draw(target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Framebuffer;

    fn line_band(line: u32) -> Rectangle {
        Rectangle::new(Point::new(0, (line * LINE_HEIGHT) as i32), Size::new(PANEL_WIDTH, LINE_HEIGHT))
    }

    #[test]
    fn long_messages_are_cut() {
        assert_eq!(truncate("short"), "short");
        let exact = "x".repeat(MAX_CHARS);
        assert_eq!(truncate(&exact), exact.as_str());

        let long = "y".repeat(50);
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), MAX_CHARS);
        assert!(cut.ends_with("yyy..."));

        let accented = "é".repeat(45);
        let wide = truncate(&accented);
        assert_eq!(wide.chars().count(), MAX_CHARS);
    }

    #[test]
    fn header_then_first_line() {
        let mut fb = Framebuffer::new();
        let mut console = Console::new();
        console.init(&mut fb).unwrap();

        assert_eq!(console.line(), 2);
        assert!(fb.count(line_band(0), Rgb565::MAGENTA) > 0);
        assert!(fb.count(line_band(1), Rgb565::CYAN) > 0);

        console.println(&mut fb, "hello", Level::Warn).unwrap();
        assert_eq!(console.line(), 3);
        assert!(fb.count(line_band(2), Rgb565::YELLOW) > 0);
    }

    #[test]
    fn first_print_initialises() {
        let mut fb = Framebuffer::new();
        let mut console = Console::new();
        console.print(&mut fb, "boot", Level::Info).unwrap();

        assert!(console.is_initialised());
        assert_eq!(console.line(), 2);
        assert!(fb.count(line_band(0), Rgb565::MAGENTA) > 0);
        assert!(fb.count(line_band(2), Rgb565::WHITE) > 0);
    }

    #[test]
    fn reaching_the_bottom_wipes_the_lower_half() {
        let mut fb = Framebuffer::new();
        let mut console = Console::new();
        console.init(&mut fb).unwrap();

        for i in 0..23 {
            console.log(&mut fb, Level::Success, format_args!("line {i}")).unwrap();
        }
        assert_eq!(console.line(), LINES - 1);
        assert!(fb.count(line_band(24), Rgb565::GREEN) > 0);

        console.println(&mut fb, "after wrap", Level::Error).unwrap();
        assert_eq!(console.line(), WRAP_LINE + 1);

        let lower = Rectangle::new(Point::new(0, 180), Size::new(PANEL_WIDTH, 140));
        assert_eq!(fb.count(lower, Rgb565::GREEN), 0);
        assert!(fb.count(line_band(WRAP_LINE), Rgb565::RED) > 0);
        // Lines above the wrap point survive.
        assert!(fb.count(line_band(2), Rgb565::GREEN) > 0);
        assert!(fb.count(line_band(14), Rgb565::GREEN) > 0);
    }

    #[test]
    fn level_colours() {
        assert_eq!(Level::Info.color(), Rgb565::WHITE);
        assert_eq!(Level::Debug.color(), Rgb565::CYAN);
        assert_eq!(Level::System.color(), Rgb565::MAGENTA);
    }
}
