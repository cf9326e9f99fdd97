//! Display Surface helpers.
//!
//! The surface itself is any `embedded-graphics` draw target in RGB565: the
//! mipidsi panel on the board, a recording framebuffer in tests. Everything
//! that reaches it from the image path goes through [`blit_clipped`], so no
//! write ever lands outside the panel.

use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::Rectangle,
};

/// Part of `region` that lies on `panel`, or `None` if nothing does.
#[must_use]
pub fn clip_to_panel(region: Rectangle, panel: Rectangle) -> Option<Rectangle> {
    let visible = region.intersection(&panel);
    (!visible.is_zero_sized()).then_some(visible)
}

/// Wipes the whole surface.
pub fn clear<D>(target: &mut D, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(color)
}

pub fn fill_rect<D>(target: &mut D, area: Rectangle, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.fill_solid(&area, color)
}

/// Writes `pixels` row-major into `area`.
pub fn blit<D>(target: &mut D, area: Rectangle, pixels: &[Rgb565]) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.fill_contiguous(&area, pixels.iter().copied())
}

/// Writes the on-panel part of a `region` sized block of `pixels`.
///
/// `pixels` is row-major with `region.size.width` pixels per row. Returns the
/// area actually written, `None` when the block is entirely off the panel.
pub fn blit_clipped<D>(
    target: &mut D,
    region: Rectangle,
    pixels: &[Rgb565],
) -> Result<Option<Rectangle>, D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let Some(visible) = clip_to_panel(region, target.bounding_box()) else {
        return Ok(None);
    };
    if visible == region {
        blit(target, region, pixels)?;
        return Ok(Some(region));
    }

    let stride = region.size.width as usize;
    let skip_x = (visible.top_left.x - region.top_left.x) as usize;
    let skip_y = (visible.top_left.y - region.top_left.y) as usize;
    let cols = visible.size.width as usize;

    let rows = (0..visible.size.height as usize).flat_map(|row| {
        let start = (skip_y + row) * stride + skip_x;
        pixels.get(start..start + cols).into_iter().flatten().copied()
    });
    target.fill_contiguous(&visible, rows)?;
    Ok(Some(visible))
}
