//! Orientation normalization and lossless frame rotation.

use std::fmt;

use crate::traits::{Frame, FrameMetadata};

/// Clockwise rotation applied to captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// No rotation.
    #[default]
    Deg0,
    /// Quarter turn clockwise.
    Deg90,
    /// Half turn.
    Deg180,
    /// Quarter turn counter-clockwise.
    Deg270,
}

impl Orientation {
    /// Snap an arbitrary angle to the nearest multiple of 90 degrees.
    ///
    /// Ties round up (135 becomes 180, -45 becomes 0) and the result is
    /// reduced modulo 360, so -90 becomes 270. Non-finite input maps to
    /// [`Orientation::Deg0`].
    #[must_use]
    pub fn from_degrees(degrees: f64) -> Self {
        if !degrees.is_finite() {
            return Self::Deg0;
        }

        // Reduce first: rem_euclid is exact, and keeps the cast below in
        // 0..=4 however large the input. floor(x + 0.5) is round-half-up;
        // f64::round would round -0.5 away from zero.
        let reduced = degrees.rem_euclid(360.0);
        #[allow(clippy::cast_possible_truncation)]
        let quarter_turns = (reduced / 90.0 + 0.5).floor() as i64;

        match quarter_turns.rem_euclid(4) {
            1 => Self::Deg90,
            2 => Self::Deg180,
            3 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    /// The angle in degrees, one of 0, 90, 180 or 270.
    #[must_use]
    pub const fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Whether this rotation exchanges width and height.
    #[must_use]
    pub const fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }

    /// Dimensions of a `width` x `height` image after rotation.
    #[must_use]
    pub const fn apply(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Rotate a frame. The result has exactly the input's pixels, rearranged.
    #[must_use]
    pub fn rotate(self, frame: Frame) -> Frame {
        if self == Self::Deg0 {
            return frame;
        }

        let width = frame.width();
        let height = frame.height();
        let format = frame.format();
        let metadata = frame.metadata();
        let bpp = format.bytes_per_pixel();
        let (out_width, out_height) = self.apply(width, height);

        let src = frame.data();
        let mut out = Vec::with_capacity(src.len());
        for dy in 0..out_height {
            for dx in 0..out_width {
                let (sx, sy) = self.source_of(dx, dy, width, height);
                let offset = (sy as usize * width as usize + sx as usize) * bpp;
                if let Some(pixel) = src.get(offset..offset + bpp) {
                    out.extend_from_slice(pixel);
                }
            }
        }

        rebuild(out_width, out_height, frame, out, &metadata)
    }

    /// Source coordinate for destination `(dx, dy)` in a `width` x `height`
    /// source image.
    const fn source_of(self, dx: u32, dy: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::Deg0 => (dx, dy),
            Self::Deg90 => (dy, height - 1 - dx),
            Self::Deg180 => (width - 1 - dx, height - 1 - dy),
            Self::Deg270 => (width - 1 - dy, dx),
        }
    }
}

fn rebuild(width: u32, height: u32, original: Frame, data: Vec<u8>, metadata: &FrameMetadata) -> Frame {
    // Rotation preserves the byte count and Frame::new checked the source,
    // so this cannot fail.
    let rotated = Frame::new(width, height, original.format(), data, metadata.clone());
    debug_assert!(rotated.is_ok(), "rotation changed the frame's byte count");
    rotated.unwrap_or(original)
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}
