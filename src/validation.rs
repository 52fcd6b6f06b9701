//! Frame validation utilities for test pattern verification.
//!
//! These check that delivered frames have the oriented geometry and that a
//! color bar pattern survived rotation in the expected direction. Useful for
//! integration testing with virtual cameras.

use thiserror::Error;

use crate::device::DeviceInfo;
use crate::mock::COLOR_BARS;
use crate::orientation::Orientation;
use crate::traits::Frame;

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u8 = 15;

/// A frame did not look as expected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Frame dimensions differ from the device's oriented dimensions.
    #[error("frame is {actual:?}, expected {expected:?}")]
    Geometry {
        /// Expected `(width, height)`.
        expected: (u32, u32),
        /// Actual `(width, height)`.
        actual: (u32, u32),
    },
    /// A sample point fell outside the frame.
    #[error("failed to get pixel at ({0}, {1})")]
    OutOfBounds(u32, u32),
    /// A color bar had the wrong color.
    #[error("color bar {bar} mismatch at ({x}, {y}): expected RGB{expected:?}, got RGB{actual:?}")]
    ColorBar {
        /// Bar index, 0 = white.
        bar: usize,
        /// Sample x.
        x: u32,
        /// Sample y.
        y: u32,
        /// Expected color.
        expected: (u8, u8, u8),
        /// Sampled color.
        actual: (u8, u8, u8),
    },
    /// No frames were given.
    #[error("cannot validate empty frame sequence")]
    EmptySequence,
    /// Sequence numbers skipped.
    #[error("frame sequence gap at index {index}: expected {expected}, got {actual}")]
    SequenceGap {
        /// Position in the slice.
        index: usize,
        /// Expected sequence number.
        expected: u32,
        /// Actual sequence number.
        actual: u32,
    },
}

/// Check that a frame has the device's oriented dimensions.
pub fn validate_frame_geometry(frame: &Frame, info: &DeviceInfo) -> Result<(), ValidationError> {
    let expected = (info.oriented_width, info.oriented_height);
    let actual = (frame.width(), frame.height());
    if expected == actual {
        Ok(())
    } else {
        Err(ValidationError::Geometry { expected, actual })
    }
}

/// Validates that a frame contains the eight-bar pattern, rotated by
/// `orientation`.
///
/// Unrotated bars run left to right. A quarter turn clockwise makes them run
/// top to bottom, a half turn right to left, and a quarter turn
/// counter-clockwise bottom to top. Each bar is sampled at its center.
pub fn validate_color_bars(frame: &Frame, orientation: Orientation) -> Result<(), ValidationError> {
    let along_x = !orientation.swaps_dimensions();
    let reversed = matches!(orientation, Orientation::Deg180 | Orientation::Deg270);
    let (axis_len, cross_len) = if along_x {
        (frame.width(), frame.height())
    } else {
        (frame.height(), frame.width())
    };
    let bar_len = axis_len / 8;
    let cross = cross_len / 2;

    for (bar, expected) in COLOR_BARS.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let mut pos = bar as u32 * bar_len + bar_len / 2;
        if reversed {
            pos = axis_len.saturating_sub(1).saturating_sub(pos);
        }
        let (x, y) = if along_x { (pos, cross) } else { (cross, pos) };

        let actual = frame
            .pixel_at(x, y)
            .ok_or(ValidationError::OutOfBounds(x, y))?;
        if !colors_match(actual, *expected, COLOR_TOLERANCE) {
            return Err(ValidationError::ColorBar {
                bar,
                x,
                y,
                expected: *expected,
                actual,
            });
        }
    }

    Ok(())
}

/// Validates that a sequence of frames has incrementing sequence numbers.
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<(), ValidationError> {
    if frames.is_empty() {
        return Err(ValidationError::EmptySequence);
    }

    for (index, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let expected = prev.metadata().sequence.wrapping_add(1);
            let actual = curr.metadata().sequence;
            if actual != expected {
                return Err(ValidationError::SequenceGap {
                    index: index + 1,
                    expected,
                    actual,
                });
            }
        }
    }

    Ok(())
}

/// Helper function to check if two RGB colors match within a tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    ar.abs_diff(er) <= tolerance && ag.abs_diff(eg) <= tolerance && ab.abs_diff(eb) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::device::Device;
    use crate::mock::{MockBackend, MockCamera, TestPattern};

    fn device(orientation: f64, pattern: TestPattern) -> (MockBackend, Device) {
        let backend = MockBackend::new().with_camera(0, MockCamera::new().with_pattern(pattern));
        let config = DeviceConfig::new("cam", 0).with_orientation(orientation);
        let device = Device::open(&backend, &config).expect("open should succeed");
        (backend, device)
    }

    #[test]
    fn test_color_bars_survive_every_rotation() {
        for degrees in [0.0, 90.0, 180.0, 270.0] {
            let (_backend, mut device) = device(degrees, TestPattern::ColorBars);
            let frame = device.get_frame().expect("frame should be available");

            let result = validate_color_bars(&frame, device.orientation());
            assert!(result.is_ok(), "{degrees}°: {result:?}");
            assert!(validate_frame_geometry(&frame, &device.get_device_info()).is_ok());
        }
    }

    #[test]
    fn test_color_bars_detect_wrong_direction() {
        let (_backend, mut device) = device(180.0, TestPattern::ColorBars);
        let frame = device.get_frame().expect("frame should be available");
        assert!(validate_color_bars(&frame, Orientation::Deg0).is_err());
    }

    #[test]
    fn test_color_bars_wrong_pattern() {
        let (_backend, mut device) = device(0.0, TestPattern::Gradient);
        let frame = device.get_frame().expect("frame should be available");
        assert!(matches!(
            validate_color_bars(&frame, Orientation::Deg0),
            Err(ValidationError::ColorBar { .. })
        ));
    }

    #[test]
    fn test_geometry_mismatch() {
        let (_backend, mut device) = device(90.0, TestPattern::ColorBars);
        let frame = device.get_frame().expect("frame should be available");
        let mut info = device.get_device_info();
        info.oriented_width = 640;
        info.oriented_height = 480;
        assert_eq!(
            validate_frame_geometry(&frame, &info),
            Err(ValidationError::Geometry {
                expected: (640, 480),
                actual: (480, 640),
            })
        );
    }

    #[test]
    fn test_validate_frame_sequence_success() {
        let (_backend, mut device) = device(0.0, TestPattern::Solid(1, 2, 3));
        let frames: Vec<Frame> = (0..5)
            .map(|_| device.get_frame().expect("frame should be available"))
            .collect();
        assert_eq!(validate_frame_sequence(&frames), Ok(()));
    }

    #[test]
    fn test_validate_frame_sequence_empty() {
        assert_eq!(
            validate_frame_sequence(&[]),
            Err(ValidationError::EmptySequence)
        );
    }

    #[test]
    fn test_validate_frame_sequence_with_gap() {
        let (_backend, mut device) = device(0.0, TestPattern::Solid(1, 2, 3));
        let mut frames = vec![
            device.get_frame().expect("frame should be available"),
            device.get_frame().expect("frame should be available"),
        ];

        // Skip a frame to create a gap
        let _ = device.get_frame().expect("frame should be available");
        frames.push(device.get_frame().expect("frame should be available"));

        assert!(matches!(
            validate_frame_sequence(&frames),
            Err(ValidationError::SequenceGap { index: 2, .. })
        ));
    }

    #[test]
    fn test_colors_match_exact() {
        assert!(colors_match((100, 150, 200), (100, 150, 200), 10));
    }

    #[test]
    fn test_colors_match_within_tolerance() {
        assert!(colors_match((100, 150, 200), (105, 155, 205), 10));
    }

    #[test]
    fn test_colors_match_outside_tolerance() {
        assert!(!colors_match((100, 150, 200), (120, 150, 200), 10));
    }
}
