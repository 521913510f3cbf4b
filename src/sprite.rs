//! Sprite sheet packing - combines icon PNGs into one image plus a stylesheet
//!
//! Icons are stacked top-down in name order, each at `x = 0`, separated by a
//! fixed padding.

use image::{Rgba, RgbaImage};
use std::fmt::Write as _;

/// Transparent color for the sheet background
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// An icon to be packed
#[derive(Debug, Clone)]
pub struct Icon {
    /// CSS-safe name used in the generated class
    pub name: String,
    pub image: RgbaImage,
}

impl Icon {
    pub fn new(name: &str, image: RgbaImage) -> Self {
        Self { name: css_ident(name), image }
    }
}

/// An icon's position and size within the sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconFrame {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Packed sheet image with the placement of every icon
#[derive(Debug)]
pub struct SpriteSheet {
    pub image: RgbaImage,
    pub frames: Vec<IconFrame>,
}

/// Make a file stem usable as part of a CSS class and SCSS variable name.
pub fn css_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// Pack icons top-down.
///
/// Returns `None` when there is nothing to pack.
pub fn pack_top_down(mut icons: Vec<Icon>, padding: u32) -> Option<SpriteSheet> {
    if icons.is_empty() {
        return None;
    }
    icons.sort_by(|a, b| a.name.cmp(&b.name));

    let width = icons.iter().map(|i| i.image.width()).max().unwrap_or(0);
    let gaps = padding * (icons.len() as u32 - 1);
    let height = icons.iter().map(|i| i.image.height()).sum::<u32>() + gaps;

    let mut image = RgbaImage::from_pixel(width, height, TRANSPARENT);
    let mut frames = Vec::with_capacity(icons.len());
    let mut y = 0;

    for icon in &icons {
        blit(&mut image, &icon.image, 0, y);
        frames.push(IconFrame {
            name: icon.name.clone(),
            x: 0,
            y,
            width: icon.image.width(),
            height: icon.image.height(),
        });
        y += icon.image.height() + padding;
    }

    Some(SpriteSheet { image, frames })
}

/// Copy an icon's pixels onto the sheet
fn blit(sheet: &mut RgbaImage, icon: &RgbaImage, x: u32, y: u32) {
    for iy in 0..icon.height() {
        for ix in 0..icon.width() {
            if x + ix < sheet.width() && y + iy < sheet.height() {
                sheet.put_pixel(x + ix, y + iy, *icon.get_pixel(ix, iy));
            }
        }
    }
}

fn offset(v: u32) -> String {
    if v == 0 {
        "0".to_string()
    } else {
        format!("-{}px", v)
    }
}

/// Generate the SCSS partial describing a sheet.
///
/// Emits sheet size variables, per-icon variables and one rule per icon.
pub fn sheet_scss(sheet: &SpriteSheet, prefix: &str, image_url: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "${}-sheet-width: {}px;", prefix, sheet.image.width());
    let _ = writeln!(out, "${}-sheet-height: {}px;", prefix, sheet.image.height());
    let _ = writeln!(out, "${}-sheet-image: '{}';", prefix, image_url);

    for frame in &sheet.frames {
        let var = format!("{}-{}", prefix, frame.name);
        out.push('\n');
        let _ = writeln!(out, "${}-x: {};", var, offset(frame.x));
        let _ = writeln!(out, "${}-y: {};", var, offset(frame.y));
        let _ = writeln!(out, "${}-width: {}px;", var, frame.width);
        let _ = writeln!(out, "${}-height: {}px;", var, frame.height);
    }

    for frame in &sheet.frames {
        out.push('\n');
        let _ = writeln!(out, ".{}-{} {{", prefix, frame.name);
        let _ = writeln!(out, "  background-image: url({});", image_url);
        let _ = writeln!(out, "  background-position: {} {};", offset(frame.x), offset(frame.y));
        let _ = writeln!(out, "  width: {}px;", frame.width);
        let _ = writeln!(out, "  height: {}px;", frame.height);
        out.push_str("}\n");
    }

    out
}
