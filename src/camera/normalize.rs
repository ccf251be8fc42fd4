use crate::error::BackendError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"NV12" => Some(PixelFormat::Nv12),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

/// Convert a device buffer into tightly packed RGBA8.
pub(crate) fn normalize_to_rgba(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>, BackendError> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| BackendError::Device("frame dimensions overflow".into()))?;

    match format {
        PixelFormat::Rgb24 => {
            expect_len(pixels, plane * 3, "RGB")?;
            let mut rgba = Vec::with_capacity(plane * 4);
            for px in pixels.chunks_exact(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            Ok(rgba)
        }
        PixelFormat::Nv12 => {
            expect_len(pixels, plane + plane / 2, "NV12")?;
            let mut rgba = vec![0u8; plane * 4];
            for j in 0..h {
                for i in 0..w {
                    let y = pixels[j * w + i];
                    let uv_index = plane + (j / 2) * w + (i / 2) * 2;
                    let offset = (j * w + i) * 4;
                    write_yuv(&mut rgba[offset..offset + 4], y, pixels[uv_index], pixels[uv_index + 1]);
                }
            }
            Ok(rgba)
        }
        PixelFormat::Yuyv => {
            expect_len(pixels, plane * 2, "YUYV")?;
            let mut rgba = vec![0u8; plane * 4];
            for (pair, chunk) in pixels.chunks_exact(4).enumerate() {
                let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                let offset = pair * 8;
                write_yuv(&mut rgba[offset..offset + 4], y0, u, v);
                write_yuv(&mut rgba[offset + 4..offset + 8], y1, u, v);
            }
            Ok(rgba)
        }
    }
}

fn expect_len(pixels: &[u8], expected: usize, label: &str) -> Result<(), BackendError> {
    if pixels.len() != expected {
        return Err(BackendError::Device(format!(
            "{} frame length mismatch: expected {}, got {}",
            label,
            expected,
            pixels.len()
        )));
    }
    Ok(())
}

fn write_yuv(out: &mut [u8], y: u8, u: u8, v: u8) {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    out[0] = clamp_to_u8(y + 1.402_f32 * v);
    out[1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
    out[2] = clamp_to_u8(y + 1.772_f32 * u);
    out[3] = 255;
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_conversion_produces_gray() -> Result<(), BackendError> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();

        let rgba = normalize_to_rgba(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(rgba, [128u8, 128, 128, 255].repeat(4));

        Ok(())
    }

    #[test]
    fn yuyv_pairs_share_chroma() -> Result<(), BackendError> {
        let yuyv = vec![0u8, 128, 255, 128];
        let rgba = normalize_to_rgba(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgba, vec![0, 0, 0, 255, 255, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn rgb_length_is_validated() {
        assert!(normalize_to_rgba(&[1u8; 8], 1, 3, PixelFormat::Rgb24).is_err());
    }
}
