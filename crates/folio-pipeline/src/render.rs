//! Output modes: letter boxes, word boxes, and annotated rasters.
//!
//! Word grouping looks up horizontal neighbors of every letter in an R-tree
//! of letter boxes and joins compatible pairs with a union-find. All box
//! lists are sorted by `(top, left)`.

use std::fmt;
use std::str::FromStr;

use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use petgraph::unionfind::UnionFind;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cluster::ConnectedComponent;
use crate::config::SwtConfig;
use crate::raster;
use crate::types::{BoundingBox, DetectOutput, PipelineError, RasterImage};

/// Outline color for [`OutputMode::OriginalBoxes`].
const BOX_COLOR: image::Rgb<u8> = image::Rgb([255, 0, 0]);

const WHITE: image::Rgb<u8> = image::Rgb([255, 255, 255]);
const BLACK: image::Rgb<u8> = image::Rgb([0, 0, 0]);

/// Largest height ratio between two letters of one word.
const MAX_WORD_HEIGHT_RATIO: f32 = 2.0;

/// Minimum vertical overlap between two letters of one word, as a fraction
/// of the shorter letter's height.
const MIN_WORD_OVERLAP: f32 = 0.5;

/// What the detector returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// White raster with detected stroke pixels in black.
    StrokesOnly,
    /// White raster; letter box contents keep their original gray level.
    GrayscaleText,
    /// The input with every letter box outlined in red.
    OriginalBoxes,
    /// One box per letter.
    #[default]
    LetterBoxes,
    /// Letters merged into one box per word.
    WordBoxes,
}

impl OutputMode {
    /// Every mode, in numeric order.
    pub const ALL: [Self; 5] = [
        Self::StrokesOnly,
        Self::GrayscaleText,
        Self::OriginalBoxes,
        Self::LetterBoxes,
        Self::WordBoxes,
    ];

    /// Kebab-case name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StrokesOnly => "strokes-only",
            Self::GrayscaleText => "grayscale-text",
            Self::OriginalBoxes => "original-boxes",
            Self::LetterBoxes => "letter-boxes",
            Self::WordBoxes => "word-boxes",
        }
    }

    /// Returns `true` if the mode produces boxes rather than a raster.
    #[must_use]
    pub const fn is_geometry(self) -> bool {
        matches!(self, Self::LetterBoxes | Self::WordBoxes)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::UnsupportedMode(s.to_string()))
    }
}

impl TryFrom<u8> for OutputMode {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .ok_or_else(|| PipelineError::UnsupportedMode(value.to_string()))
    }
}

/// Sort boxes top to bottom, then left to right.
fn sort_boxes(boxes: &mut [BoundingBox]) {
    boxes.sort_by_key(|b| (b.top, b.left, b.bottom, b.right));
}

/// Letter boxes of `components`, sorted.
#[must_use]
pub fn letter_boxes(components: &[ConnectedComponent]) -> Vec<BoundingBox> {
    let mut boxes: Vec<BoundingBox> = components.iter().map(ConnectedComponent::bounds).collect();
    sort_boxes(&mut boxes);
    boxes
}

/// Returns `true` if two letters belong to the same word.
fn same_word(a: &ConnectedComponent, b: &ConnectedComponent, gap_factor: f32) -> bool {
    let (ba, bb) = (a.bounds(), b.bounds());
    #[allow(clippy::cast_precision_loss)]
    let (ha, hb) = (ba.height() as f32, bb.height() as f32);
    let (short, tall) = if ha < hb { (ha, hb) } else { (hb, ha) };
    if tall > short * MAX_WORD_HEIGHT_RATIO {
        return false;
    }
    #[allow(clippy::cast_precision_loss)]
    let overlap = ba.vertical_overlap(bb) as f32;
    if overlap < short * MIN_WORD_OVERLAP {
        return false;
    }
    let stroke = a.mean_stroke_width().max(b.mean_stroke_width());
    #[allow(clippy::cast_precision_loss)]
    let gap = ba.horizontal_gap(bb) as f32;
    gap <= gap_factor * stroke
}

type IndexedBox = GeomWithData<Rectangle<[f32; 2]>, usize>;

fn corners(b: BoundingBox) -> ([f32; 2], [f32; 2]) {
    #[allow(clippy::cast_precision_loss)]
    let c = (
        [b.left as f32, b.top as f32],
        [b.right as f32, b.bottom as f32],
    );
    c
}

/// Merge letters into word boxes, sorted.
#[must_use]
pub fn word_boxes(components: &[ConnectedComponent], gap_factor: f32) -> Vec<BoundingBox> {
    let n = components.len();
    if n == 0 {
        return Vec::new();
    }

    let tree = RTree::bulk_load(
        components
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let (lo, hi) = corners(c.bounds());
                IndexedBox::new(Rectangle::from_corners(lo, hi), i)
            })
            .collect(),
    );

    // Farthest any pair can be apart and still join.
    let reach = gap_factor
        * components
            .iter()
            .map(ConnectedComponent::mean_stroke_width)
            .fold(0.0, f32::max)
        + 1.0;

    let mut uf = UnionFind::<usize>::new(n);
    for (i, comp) in components.iter().enumerate() {
        let (lo, hi) = corners(comp.bounds());
        let search = AABB::from_corners([lo[0] - reach, lo[1]], [hi[0] + reach, hi[1]]);
        for candidate in tree.locate_in_envelope_intersecting(&search) {
            let j = candidate.data;
            if j > i && same_word(comp, &components[j], gap_factor) {
                uf.union(i, j);
            }
        }
    }

    let labels = uf.into_labeling();
    let mut merged: Vec<Option<BoundingBox>> = vec![None; n];
    for (comp, &root) in components.iter().zip(&labels) {
        let slot = &mut merged[root];
        *slot = Some(slot.map_or(comp.bounds(), |b| b.union(comp.bounds())));
    }
    let mut boxes: Vec<BoundingBox> = merged.into_iter().flatten().collect();
    sort_boxes(&mut boxes);
    boxes
}

/// White raster with the stroke pixels of `components` in black.
fn strokes_only(image: &RasterImage, components: &[ConnectedComponent]) -> RasterImage {
    let mut out = RasterImage::from_pixel(image.width(), image.height(), WHITE);
    for &(x, y) in components.iter().flat_map(ConnectedComponent::pixels) {
        out.put_pixel(x, y, BLACK);
    }
    out
}

/// White raster where letter boxes keep the original luma.
fn grayscale_text(image: &RasterImage, boxes: &[BoundingBox]) -> RasterImage {
    let mut out = RasterImage::from_pixel(image.width(), image.height(), WHITE);
    for b in boxes {
        for y in b.top..=b.bottom {
            for x in b.left..=b.right {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let v = raster::luma(*image.get_pixel(x, y)).round().clamp(0.0, 255.0) as u8;
                out.put_pixel(x, y, image::Rgb([v, v, v]));
            }
        }
    }
    out
}

/// The input with each box outlined.
fn original_boxes(image: &RasterImage, boxes: &[BoundingBox]) -> RasterImage {
    let mut out = image.clone();
    for b in boxes {
        #[allow(clippy::cast_possible_wrap)]
        let rect = Rect::at(b.left as i32, b.top as i32).of_size(b.width(), b.height());
        draw_hollow_rect_mut(&mut out, rect, BOX_COLOR);
    }
    out
}

/// Produce the final output for `mode` from the surviving components.
#[instrument(skip_all, fields(%mode, components = components.len()))]
pub fn render(
    image: &RasterImage,
    components: &[ConnectedComponent],
    mode: OutputMode,
    config: &SwtConfig,
) -> DetectOutput {
    let output = match mode {
        OutputMode::LetterBoxes => DetectOutput::Boxes(letter_boxes(components)),
        OutputMode::WordBoxes => {
            DetectOutput::Boxes(word_boxes(components, config.word_gap_factor))
        }
        OutputMode::OriginalBoxes => {
            DetectOutput::Image(original_boxes(image, &letter_boxes(components)))
        }
        OutputMode::GrayscaleText => {
            DetectOutput::Image(grayscale_text(image, &letter_boxes(components)))
        }
        OutputMode::StrokesOnly => DetectOutput::Image(strokes_only(image, components)),
    };
    if let Some(boxes) = output.boxes() {
        debug!(boxes = boxes.len(), "rendered boxes");
    }
    output
}
