//! On-screen diagnostic panels for failed display requests.

use alloc::{
    format,
    string::String,
    vec,
    vec::Vec,
};

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
    text::{
        Baseline,
        Text,
    },
};

const LEFT: i32 = 10;
const HEADLINE_Y: i32 = 100;

/// Why an image could not be shown, with the filename involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic<'a> {
    NotFound(&'a str),
    Unsupported(&'a str),
    DecodeFailed(&'a str),
}

impl Diagnostic<'_> {
    pub const fn headline(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ERROR:",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::DecodeFailed(_) => "DECODE ERROR",
        }
    }

    pub const fn color(&self) -> Rgb565 {
        match self {
            Self::Unsupported(_) => Rgb565::YELLOW,
            Self::NotFound(_) | Self::DecodeFailed(_) => Rgb565::RED,
        }
    }

    /// Detail lines with the row each one starts on.
    pub fn lines(&self) -> Vec<(i32, String)> {
        match *self {
            Self::NotFound(name) => vec![(130, "File not found".into()), (150, name.into())],
            Self::Unsupported(name) => vec![
                (130, "Format:".into()),
                (150, name.into()),
                (180, "Supported: PNG, JPG".into()),
            ],
            Self::DecodeFailed(name) => vec![
                (130, format!("File: {name}")),
                (150, "Check file format".into()),
            ],
        }
    }

    /// Draws the panel over whatever is on screen.
    pub fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = Rgb565>,
    {
        let large = MonoTextStyle::new(&FONT_10X20, self.color());
        let small = MonoTextStyle::new(&FONT_6X10, self.color());

        Text::with_baseline(self.headline(), Point::new(LEFT, HEADLINE_Y), large, Baseline::Top)
            .draw(target)?;
        for (y, line) in self.lines() {
            Text::with_baseline(&line, Point::new(LEFT, y), small, Baseline::Top).draw(target)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embedded_graphics::primitives::Rectangle;

    use super::*;
    use crate::testing::Framebuffer;

    fn band(y: i32, h: u32) -> Rectangle {
        Rectangle::new(Point::new(0, y), Size::new(240, h))
    }

    #[test]
    fn not_found_names_the_file() {
        let panel = Diagnostic::NotFound("missing.jpg");
        assert_eq!(panel.headline(), "ERROR:");
        assert_eq!(
            panel.lines(),
            [
                (130, String::from("File not found")),
                (150, String::from("missing.jpg")),
            ]
        );

        let mut fb = Framebuffer::new();
        panel.draw(&mut fb).unwrap();
        assert!(fb.count(band(100, 20), Rgb565::RED) > 0);
        assert!(fb.count(band(130, 10), Rgb565::RED) > 0);
        assert!(fb.count(band(150, 10), Rgb565::RED) > 0);
        assert_eq!(fb.count(band(170, 40), Rgb565::RED), 0);
    }

    #[test]
    fn unsupported_is_yellow_with_hint() {
        let panel = Diagnostic::Unsupported("doc.pdf");
        assert_eq!(panel.headline(), "UNSUPPORTED");
        assert_eq!(panel.lines()[1], (150, String::from("doc.pdf")));

        let mut fb = Framebuffer::new();
        panel.draw(&mut fb).unwrap();
        assert!(fb.count(band(180, 10), Rgb565::YELLOW) > 0);
        assert_eq!(fb.count(band(0, 320), Rgb565::RED), 0);
    }

    #[test]
    fn decode_failure_lines() {
        let panel = Diagnostic::DecodeFailed("broken.png");
        assert_eq!(panel.headline(), "DECODE ERROR");
        assert_eq!(
            panel.lines(),
            [
                (130, String::from("File: broken.png")),
                (150, String::from("Check file format")),
            ]
        );
    }
}
