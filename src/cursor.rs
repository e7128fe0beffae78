use std::{fs::File, io::Read, time::Duration};

use smithay::utils::{Logical, Physical, Point, Rectangle, Size};
use tracing::warn;
use xcursor::{
    CursorTheme,
    parser::{Image, parse_xcursor},
};

use crate::{
    backend::{GpuBuffer, RenderTarget, SharedRenderer},
    errors::Result,
    region::Region,
};

pub struct CursorThemeManager {
    icons: Vec<Image>,
    size: u32,
}

impl CursorThemeManager {
    pub fn load() -> Self {
        let name = std::env::var("XCURSOR_THEME").unwrap_or_else(|_| "default".to_owned());
        let size = std::env::var("XCURSOR_SIZE")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(24);

        let theme = CursorTheme::load(&name);
        let icons = load_default_cursor(&theme).unwrap_or_else(|err| {
            warn!("Unable to load xcursor theme ({err}), using fallback cursor");
            vec![fallback_cursor_image()]
        });

        Self { icons, size }
    }

    /// Built-in arrow only, no theme lookup.
    pub fn fallback() -> Self {
        Self {
            icons: vec![fallback_cursor_image()],
            size: 24,
        }
    }

    pub fn image(&self, scale: u32, time: Duration) -> Option<&Image> {
        frame(
            time.as_millis() as u32,
            self.size.saturating_mul(scale),
            &self.icons,
        )
    }
}

fn load_default_cursor(theme: &CursorTheme) -> std::result::Result<Vec<Image>, String> {
    let path = theme
        .load_icon("default")
        .ok_or_else(|| "theme has no `default` cursor".to_owned())?;

    let mut file = File::open(path).map_err(|err| format!("failed to open cursor file: {err}"))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|err| format!("failed to read cursor file: {err}"))?;

    let images = parse_xcursor(&data).ok_or_else(|| "failed to parse cursor data".to_owned())?;
    if images.is_empty() {
        return Err("cursor file has no images".to_owned());
    }
    Ok(images)
}

/// Images of the nominal size closest to `size`.
fn nearest_images(size: u32, images: &[Image]) -> impl Iterator<Item = &Image> {
    let nearest = images
        .iter()
        .min_by_key(|image| (size as i32 - image.size as i32).abs())
        .map(|image| (image.width, image.height));

    images
        .iter()
        .filter(move |image| nearest == Some((image.width, image.height)))
}

fn frame(mut millis: u32, size: u32, images: &[Image]) -> Option<&Image> {
    let total_delay = nearest_images(size, images).fold(0, |acc, image| acc + image.delay);

    if total_delay == 0 {
        return nearest_images(size, images).next();
    }

    millis %= total_delay;

    for image in nearest_images(size, images) {
        if millis < image.delay {
            return Some(image);
        }
        millis -= image.delay;
    }
    None
}

fn fallback_cursor_image() -> Image {
    const W: usize = 24;
    const H: usize = 24;

    let mut mask = vec![false; W * H];
    let idx = |x: usize, y: usize| y * W + x;

    for y in 0..16 {
        let right = (y / 2) + 1;
        for x in 0..=right {
            mask[idx(x, y)] = true;
        }
    }

    for y in 10..23 {
        for x in 4..=8 {
            mask[idx(x, y)] = true;
        }
    }

    let mut outline = vec![false; W * H];
    for y in 0..H {
        for x in 0..W {
            if !mask[idx(x, y)] {
                continue;
            }
            for (ox, oy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
                let (nx, ny) = (x as isize + ox, y as isize + oy);
                if nx < 0 || ny < 0 || nx >= W as isize || ny >= H as isize {
                    continue;
                }
                let neighbour = idx(nx as usize, ny as usize);
                if !mask[neighbour] {
                    outline[neighbour] = true;
                }
            }
        }
    }

    let mut pixels = Vec::with_capacity(W * H * 4);
    for i in 0..W * H {
        let rgba: [u8; 4] = if mask[i] {
            [0, 0, 0, 255]
        } else if outline[i] {
            [255, 255, 255, 255]
        } else {
            [0, 0, 0, 0]
        };
        pixels.extend_from_slice(&rgba);
    }

    Image {
        size: W as u32,
        width: W as u32,
        height: H as u32,
        xhot: 1,
        yhot: 1,
        delay: 1,
        pixels_rgba: pixels,
        pixels_argb: Vec::new(),
    }
}

fn rgba_to_argb(pixels_rgba: &[u8]) -> Vec<u32> {
    bytemuck::cast_slice::<u8, [u8; 4]>(pixels_rgba)
        .iter()
        .map(|&[r, g, b, a]| u32::from_be_bytes([a, r, g, b]))
        .collect()
}

struct CursorTexture {
    buffer: GpuBuffer,
    pixels_rgba: Vec<u8>,
}

/// Cursor drawn into the frame when the display has no cursor plane.
pub struct SoftwareCursor {
    theme: CursorThemeManager,
    texture: Option<CursorTexture>,
}

impl SoftwareCursor {
    pub fn new(theme: CursorThemeManager) -> Self {
        Self {
            theme,
            texture: None,
        }
    }

    /// Area covered by the sprite with its hotspot at `position`.
    pub fn rect(
        &self,
        position: Point<i32, Logical>,
        output_scale: f64,
        time: Duration,
    ) -> Option<Rectangle<i32, Logical>> {
        let scale = output_scale.ceil().max(1.0) as u32;
        let image = self.theme.image(scale, time)?;
        let to_logical = |value: u32| (value as f64 / scale as f64).ceil() as i32;
        Some(Rectangle::new(
            Point::from((position.x - to_logical(image.xhot), position.y - to_logical(image.yhot))),
            Size::from((to_logical(image.width), to_logical(image.height))),
        ))
    }

    /// Draw the sprite wherever `damage` overlaps it. `damage` is output-local.
    pub fn draw(
        &mut self,
        renderer: &SharedRenderer,
        target: &RenderTarget,
        position: Point<i32, Logical>,
        time: Duration,
        damage: &Region<Logical>,
    ) -> Result<()> {
        let Some(rect) = self.rect(position, target.scale, time) else {
            return Ok(());
        };
        let clipped = damage.intersect_rect(rect);
        if clipped.is_empty() {
            return Ok(());
        }

        let scale = target.scale.ceil().max(1.0) as u32;
        let Some(image) = self.theme.image(scale, time) else {
            return Ok(());
        };
        let stale = self
            .texture
            .as_ref()
            .is_none_or(|texture| texture.pixels_rgba != image.pixels_rgba);
        if stale {
            let size: Size<i32, Physical> = Size::from((image.width as i32, image.height as i32));
            let pixels_rgba = image.pixels_rgba.clone();
            // Drop the previous sprite before uploading the next one.
            self.texture = None;
            self.texture = Some(CursorTexture {
                buffer: GpuBuffer::import(renderer, size, &rgba_to_argb(&pixels_rgba))?,
                pixels_rgba,
            });
        }
        let Some(texture) = &self.texture else {
            return Ok(());
        };

        let mut renderer = renderer.borrow_mut();
        renderer.begin(target)?;
        let result = renderer.draw_texture(
            texture.buffer.id(),
            target.framebuffer_box(rect),
            &target.framebuffer_region(&clipped),
            1.0,
        );
        renderer.end();
        result
    }
}
