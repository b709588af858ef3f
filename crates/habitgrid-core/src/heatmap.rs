//! PNG rendering of a [`Grid`].
//!
//! Every call paints onto its own canvas, so a renderer can be shared across
//! threads freely.

use std::convert::Infallible;
use std::io::Cursor;

use embedded_graphics::mono_font::iso_8859_1::{FONT_5X8, FONT_6X10, FONT_10X20};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::error::{GridError, Result};
use crate::grid::{DAYS_PER_WEEK, Grid};

/// Largest canvas edge, in pixels, the renderer will allocate.
pub const MAX_CANVAS_EDGE: u32 = 16_384;

/// Smallest cell edge that still fits a day-1 marker.
pub const MIN_CELL: u32 = 8;

const LABEL_FONT: &MonoFont<'static> = &FONT_6X10;
const MARKER_FONT: &MonoFont<'static> = &FONT_5X8;
const TITLE_FONT: &MonoFont<'static> = &FONT_10X20;
const PADDING: u32 = 10;
const LABEL_GAP: u32 = 6;
const MONTH_LABEL_GAP: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    /// Monday first.
    pub weekdays: [String; 7],
    /// January first.
    pub months: [String; 12],
}

impl Labels {
    pub fn new(weekdays: [String; 7], months: [String; 12]) -> Self {
        Self { weekdays, months }
    }

    pub fn month(&self, month: u32) -> &str {
        let idx = (month.clamp(1, 12) - 1) as usize;
        &self.months[idx]
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            weekdays: [
                "Monday",
                "Tuesday",
                "Wednesday",
                "Thursday",
                "Friday",
                "Saturday",
                "Sunday",
            ]
            .map(String::from),
            months: [
                "January",
                "February",
                "March",
                "April",
                "May",
                "June",
                "July",
                "August",
                "September",
                "October",
                "November",
                "December",
            ]
            .map(String::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatmapStyle {
    /// Edge of one day cell in pixels.
    pub cell: u32,
    pub background: Rgb<u8>,
    pub not_done: Rgb<u8>,
    pub done: Rgb<u8>,
    pub grid_line: Rgb<u8>,
    pub marker: Rgb<u8>,
    pub text: Rgb<u8>,
}

impl Default for HeatmapStyle {
    fn default() -> Self {
        Self {
            cell: 14,
            background: Rgb([0xFF, 0xFF, 0xFF]),
            not_done: Rgb([0xFF, 0xFF, 0xFF]),
            done: Rgb([0x4C, 0xAF, 0x50]),
            grid_line: Rgb([0xD3, 0xD3, 0xD3]),
            marker: Rgb([0x80, 0x80, 0x80]),
            text: Rgb([0x21, 0x21, 0x21]),
        }
    }
}

impl HeatmapStyle {
    pub fn with_cell(mut self, cell: u32) -> Self {
        self.cell = cell.max(MIN_CELL);
        self
    }
}

/// Pixel geometry for one render. Derived from the grid, labels and title
/// only; never from pixel content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub cell: u32,
    pub grid_left: u32,
    pub grid_top: u32,
    pub title_top: Option<u32>,
    /// Top edge of each weekday label, Monday first.
    pub weekday_label_y: [u32; DAYS_PER_WEEK],
    pub month_label_top: u32,
    /// Left edge of every month label, in grid order.
    pub month_label_x: Vec<u32>,
}

impl Layout {
    pub fn cell_origin(&self, week: usize, row: usize) -> (u32, u32) {
        (
            self.grid_left + week as u32 * self.cell,
            self.grid_top + row as u32 * self.cell,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeatmapRenderer {
    style: HeatmapStyle,
}

impl HeatmapRenderer {
    pub fn new(style: HeatmapStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &HeatmapStyle {
        &self.style
    }

    #[tracing::instrument(skip(self, grid, labels), fields(weeks = grid.num_weeks()))]
    pub fn layout(&self, grid: &Grid, labels: &Labels, title: Option<&str>) -> Result<Layout> {
        let cell = u64::from(self.style.cell);
        let weeks = grid.num_weeks() as u64;
        let label_height = LABEL_FONT.character_size.height;

        let gutter = labels
            .weekdays
            .iter()
            .map(|label| text_width(label, LABEL_FONT))
            .max()
            .unwrap_or(0);
        let grid_left = u64::from(PADDING) + gutter + u64::from(LABEL_GAP);

        let title_band =
            title.map(|_| u64::from(TITLE_FONT.character_size.height + LABEL_GAP));
        let grid_top = u64::from(PADDING) + title_band.unwrap_or(0);
        let grid_right = grid_left + weeks * cell;
        let grid_bottom = grid_top + DAYS_PER_WEEK as u64 * cell;
        let month_label_top = grid_bottom + u64::from(LABEL_GAP);
        let height = month_label_top + u64::from(label_height + PADDING);

        let mut month_label_x = Vec::with_capacity(grid.month_labels().len());
        let mut next_free = 0_u64;
        for label in grid.month_labels() {
            let x = (grid_left + label.week as u64 * cell).max(next_free);
            next_free =
                x + text_width(labels.month(label.month), LABEL_FONT) + u64::from(MONTH_LABEL_GAP);
            month_label_x.push(x);
        }

        let title_right = title
            .map(|text| text_width(text, TITLE_FONT) + 2 * u64::from(PADDING))
            .unwrap_or(0);
        let width = (grid_right + u64::from(PADDING))
            .max(next_free + u64::from(PADDING))
            .max(title_right);

        if width > u64::from(MAX_CANVAS_EDGE) || height > u64::from(MAX_CANVAS_EDGE) {
            return Err(GridError::RenderFailure(format!(
                "canvas {width}x{height} exceeds {MAX_CANVAS_EDGE}px"
            )));
        }

        // Everything below is bounded by `width`/`height`, which fit in u32.
        let inset = u64::from(self.style.cell.saturating_sub(label_height) / 2);
        let weekday_label_y =
            std::array::from_fn(|row| (grid_top + row as u64 * cell + inset) as u32);

        Ok(Layout {
            width: width as u32,
            height: height as u32,
            cell: self.style.cell,
            grid_left: grid_left as u32,
            grid_top: grid_top as u32,
            title_top: title.map(|_| PADDING),
            weekday_label_y,
            month_label_top: month_label_top as u32,
            month_label_x: month_label_x.into_iter().map(|x| x as u32).collect(),
        })
    }

    /// Draws `grid` and encodes it as PNG.
    #[tracing::instrument(skip(self, grid, labels), fields(weeks = grid.num_weeks()))]
    pub fn render(&self, grid: &Grid, labels: &Labels, title: Option<&str>) -> Result<Vec<u8>> {
        let layout = self.layout(grid, labels, title)?;
        let style = &self.style;
        let mut canvas = Canvas(RgbImage::from_pixel(
            layout.width,
            layout.height,
            style.background,
        ));
        let cell_size = Size::new_equal(layout.cell);

        for cell in grid.cells() {
            let (x, y) = layout.cell_origin(cell.week, cell.row);
            let fill = if cell.done { style.done } else { style.not_done };
            Rectangle::new(point(x, y), cell_size)
                .into_styled(PrimitiveStyle::with_fill(rgb888(fill)))
                .draw(&mut canvas)?;
        }

        let grid_line = PrimitiveStyle::with_stroke(rgb888(style.grid_line), 1);
        let grid_right = layout.grid_left + grid.num_weeks() as u32 * layout.cell;
        let grid_bottom = layout.grid_top + DAYS_PER_WEEK as u32 * layout.cell;
        for week in 0..=grid.num_weeks() {
            let x = layout.grid_left + week as u32 * layout.cell;
            Line::new(point(x, layout.grid_top), point(x, grid_bottom))
                .into_styled(grid_line)
                .draw(&mut canvas)?;
        }
        for row in 0..=DAYS_PER_WEEK {
            let y = layout.grid_top + row as u32 * layout.cell;
            Line::new(point(layout.grid_left, y), point(grid_right, y))
                .into_styled(grid_line)
                .draw(&mut canvas)?;
        }

        let marker_style = MonoTextStyle::new(MARKER_FONT, rgb888(style.marker));
        let marker_x = layout.cell.saturating_sub(MARKER_FONT.character_size.width) / 2;
        let marker_y = layout.cell.saturating_sub(MARKER_FONT.character_size.height) / 2;
        for marker in grid.day_markers() {
            let (x, y) = layout.cell_origin(marker.week, marker.row);
            Text::with_baseline(
                "1",
                point(x + marker_x, y + marker_y),
                marker_style,
                Baseline::Top,
            )
            .draw(&mut canvas)?;
        }

        let text_style = MonoTextStyle::new(LABEL_FONT, rgb888(style.text));
        for (label, y) in labels.weekdays.iter().zip(layout.weekday_label_y) {
            let x = layout.grid_left - LABEL_GAP - text_width(label, LABEL_FONT) as u32;
            Text::with_baseline(label, point(x, y), text_style, Baseline::Top).draw(&mut canvas)?;
        }

        for (label, x) in grid.month_labels().iter().zip(&layout.month_label_x) {
            let text = labels.month(label.month);
            Text::with_baseline(
                text,
                point(*x, layout.month_label_top),
                text_style,
                Baseline::Top,
            )
            .draw(&mut canvas)?;
        }

        if let (Some(text), Some(top)) = (title, layout.title_top) {
            let text_w = text_width(text, TITLE_FONT) as u32;
            let x = layout.width.saturating_sub(text_w) / 2;
            let title_style = MonoTextStyle::new(TITLE_FONT, rgb888(style.text));
            Text::with_baseline(text, point(x, top), title_style, Baseline::Top)
                .draw(&mut canvas)?;
        }

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(canvas.0)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|err| GridError::RenderFailure(err.to_string()))?;

        debug!(
            width = layout.width,
            height = layout.height,
            bytes = png.len(),
            "rendered heatmap"
        );
        Ok(png)
    }
}

/// Renders with the default style.
pub fn render(grid: &Grid, labels: &Labels, title: Option<&str>) -> Result<Vec<u8>> {
    HeatmapRenderer::default().render(grid, labels, title)
}

/// `DrawTarget` over an RGB image; pixels outside the image are dropped.
struct Canvas(RgbImage);

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.0.width(), self.0.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (width, height) = self.0.dimensions();
        for Pixel(at, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(at.x), u32::try_from(at.y)) else {
                continue;
            };
            if x < width && y < height {
                self.0.put_pixel(x, y, Rgb([color.r(), color.g(), color.b()]));
            }
        }
        Ok(())
    }
}

fn text_width(text: &str, font: &MonoFont<'_>) -> u64 {
    text.chars().count() as u64
        * u64::from(font.character_size.width + font.character_spacing)
}

fn rgb888(color: Rgb<u8>) -> Rgb888 {
    let [r, g, b] = color.0;
    Rgb888::new(r, g, b)
}

/// Layout coordinates stay below `MAX_CANVAS_EDGE`.
fn point(x: u32, y: u32) -> Point {
    Point::new(
        i32::try_from(x).unwrap_or(i32::MAX),
        i32::try_from(y).unwrap_or(i32::MAX),
    )
}
