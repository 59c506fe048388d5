//! Frame geometry shared by both backends: aspect-preserving scaling and the
//! placement of text bars and labels.

/// Left margin of static and fully scrolled text (pixels)
pub const TEXT_MARGIN: u32 = 50;

/// Vertical distance between stacked answer texts, as a fraction of the frame height
pub const STACKED_TEXT_SPACING: f64 = 1.0 / 7.0;

/// Opacity of the bar behind boxed text
pub const BOX_OPACITY: f64 = 0.6;

/// Largest size with the aspect ratio of `(width, height)` that fits in `(max_width, max_height)`
///
/// Never exceeds either bound; scales up as well as down.
pub fn scale_to_fit(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (max_width, max_height);
    }
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scaled_width = ((width as f64 * ratio).round() as u32).min(max_width);
    let scaled_height = ((height as f64 * ratio).round() as u32).min(max_height);
    (scaled_width, scaled_height)
}

/// Offsets that center `(width, height)` on a `(canvas_width, canvas_height)` frame
pub fn centered_offset(
    width: u32,
    height: u32,
    canvas_width: u32,
    canvas_height: u32) -> (u32, u32,
) {
    (
        canvas_width.saturating_sub(width) / 2,
        canvas_height.saturating_sub(height) / 2,
    )
}

/// Text metrics derived from the frame height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLayout {
    pub frame_width: u32,
    pub frame_height: u32,
    pub box_height: u32,
    pub font_size: u32,
}

impl TextLayout {
    pub fn for_frame(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            box_height: (frame_height as f64 / 7.0).round() as u32,
            font_size: (frame_height as f64 / 14.0).round() as u32,
        }
    }

    /// Top of a bar attached to the top (`true`) or bottom edge
    pub fn box_top(&self, top: bool) -> u32 {
        if top {
            0
        } else {
            self.frame_height.saturating_sub(self.box_height)
        }
    }

    /// Vertical center of a line placed at `fraction` of the frame height
    pub fn line_center(&self, fraction: f64) -> u32 {
        (fraction * self.frame_height as f64).round() as u32
    }
}

/// Height fractions for `count` texts stacked symmetrically around mid-height
pub fn stacked_fractions(count: usize) -> Vec<f64> {
    let middle = (count as f64 - 1.0) / 2.0;
    (0..count)
        .map(|index| 0.5 + (index as f64 - middle) * STACKED_TEXT_SPACING)
        .collect()
}
