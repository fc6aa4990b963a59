//! Frame type and pixel conversion from YUYV and MJPG to RGB, plus dark-frame detection.

/// A captured camera frame, packed RGB8 (`width * height * 3` bytes).
#[derive(Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Build a frame from packed RGB bytes, computing the dark flag.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = packed_len(width, height, 3)?;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        let is_dark = is_dark_frame(&rgb_to_luma(&data), DARK_FRAME_THRESHOLD);
        Ok(Self {
            data,
            width,
            height,
            sequence,
            is_dark,
        })
    }
}

/// Byte length of a `width`×`height` image at `bytes_per_pixel`, computed
/// without overflow.
pub fn packed_len(width: u32, height: u32, bytes_per_pixel: usize) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(bytes_per_pixel))
        .ok_or(FrameError::TooLarge { width, height })
}

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = packed_len(width, height, 2)?;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(packed_len(width, height, 3)?);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let c = 1.164 * (y as f32 - 16.0);
            rgb.push((c + 1.596 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((c - 0.392 * u - 0.813 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((c + 2.017 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Decode a Motion-JPEG buffer into RGB8, checking the decoded size.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .to_rgb8();
    if decoded.width() != width || decoded.height() != height {
        return Err(FrameError::UnexpectedSize {
            expected: (width, height),
            actual: (decoded.width(), decoded.height()),
        });
    }
    Ok(decoded.into_raw())
}

/// Rec. 601 luma of packed RGB8.
pub fn rgb_to_luma(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|p| {
            (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Check if a grayscale frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels are below 32.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPG decode failed: {0}")]
    Decode(String),
    #[error("decoded frame is {actual:?}, expected {expected:?}")]
    UnexpectedSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("frame size {width}x{height} is too large")]
    TooLarge { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_gray_pixels() {
        // Neutral chroma (U=V=128) must give R=G=B.
        let yuyv = vec![126, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_black_level() {
        let yuyv = vec![16, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_mjpeg_roundtrip_size() {
        let img = image::RgbImage::from_pixel(8, 4, image::Rgb([200, 120, 40]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let rgb = mjpeg_to_rgb(&jpeg, 8, 4).unwrap();
        assert_eq!(rgb.len(), 8 * 4 * 3);
        assert!(matches!(
            mjpeg_to_rgb(&jpeg, 16, 16),
            Err(FrameError::UnexpectedSize { .. })
        ));
    }

    #[test]
    fn test_rgb_to_luma_weights() {
        assert_eq!(rgb_to_luma(&[255, 255, 255, 0, 0, 0]), vec![255, 0]);
        assert_eq!(rgb_to_luma(&[255, 0, 0]), vec![76]);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&vec![0u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&vec![128u8; 1000], 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → should NOT be dark
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, 0.95));
    }

    #[test]
    fn test_frame_from_rgb_checks_length() {
        assert!(Frame::from_rgb(vec![0; 5], 2, 1, 0).is_err());
        let frame = Frame::from_rgb(vec![0; 6], 2, 1, 7).unwrap();
        assert!(frame.is_dark);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_oversized_dimensions_are_rejected() {
        // 40000 * 40000 * 3 overflows u32.
        assert!(packed_len(40_000, 40_000, 3).unwrap() > u32::MAX as usize);
        assert!(matches!(
            Frame::from_rgb(vec![0; 6], 40_000, 40_000, 0),
            Err(FrameError::InvalidLength { .. })
        ));
        assert!(matches!(
            packed_len(u32::MAX, u32::MAX, 3),
            Err(FrameError::TooLarge { .. })
        ));
        assert!(yuyv_to_rgb(&[0; 4], u32::MAX, u32::MAX).is_err());
    }
}
