//! Streaming capture from one V4L2 node

use crate::camera::{CameraConfig, PixelFormat};
use crate::error::{Error, Result};
use crate::pipeline::FrameSource;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer};
use std::mem;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Mapped stream plus the device it borrows from
struct StreamInner {
    /// Memory-mapped V4L2 stream kept warm between reads
    stream: MmapStream<'static>,
    /// Owning handle to the V4L device. Field order drops the stream first.
    _device: Box<Device>,
}

/// An opened capture node with negotiated format
pub struct CaptureDevice {
    inner: Option<StreamInner>,
    path: String,
    format: PixelFormat,
    width: u32,
    height: u32,
    preview: Option<(u32, u32)>,
}

impl CaptureDevice {
    /// Open `path`, negotiate the requested format and start streaming
    pub fn open(path: &str, config: &CameraConfig) -> Result<Self> {
        let dev = Device::with_path(path)
            .map_err(|e| Error::Camera(format!("Failed to open {path}: {e}")))?;

        let mut fmt = dev
            .format()
            .map_err(|e| Error::Camera(format!("Failed to get format: {e}")))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = config.format.to_fourcc();
        let fmt = dev
            .set_format(&fmt)
            .map_err(|e| Error::Camera(format!("Failed to set format: {e}")))?;

        let format = PixelFormat::from_fourcc(fmt.fourcc).ok_or_else(|| {
            Error::Camera(format!(
                "{path} negotiated unsupported format {}",
                String::from_utf8_lossy(&fmt.fourcc.repr)
            ))
        })?;

        let mut params = dev
            .params()
            .map_err(|e| Error::Camera(format!("Failed to get params: {e}")))?;
        params.interval = v4l::Fraction::new(1, config.max_fps.max(1));
        if let Err(e) = dev.set_params(&params) {
            tracing::debug!(device = path, "frame interval not accepted: {e}");
        }

        tracing::info!(
            device = path,
            "capture configured: {}x{} ({})",
            fmt.width,
            fmt.height,
            String::from_utf8_lossy(&fmt.fourcc.repr)
        );

        // SAFETY: the boxed device outlives the stream; both live in StreamInner
        // and the stream field is dropped first.
        let device = Box::new(dev);
        let static_device: &'static Device =
            unsafe { mem::transmute::<&Device, &'static Device>(device.as_ref()) };

        let stream =
            MmapStream::with_buffers(static_device, Type::VideoCapture, config.buffer_count.max(2))
                .map_err(|e| Error::FrameCapture(format!("Failed to create stream: {e}")))?;

        Ok(Self {
            inner: Some(StreamInner {
                stream,
                _device: device,
            }),
            path: path.to_string(),
            format,
            width: fmt.width,
            height: fmt.height,
            preview: config.preview,
        })
    }

    /// Device node path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Negotiated size
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for CaptureDevice {
    fn read_frame(&mut self) -> Result<DynamicImage> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| Error::FrameCapture(format!("{} is released", self.path)))?;

        let (buf, meta) = inner
            .stream
            .next()
            .map_err(|e| Error::FrameCapture(format!("Failed to capture: {e}")))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used == 0 { buf } else { &buf[..used] };

        let image = decode_frame(data, self.format, self.width, self.height)?;
        Ok(match self.preview {
            Some((w, h)) if (w, h) != (image.width(), image.height()) => {
                image.resize_exact(w, h, FilterType::Triangle)
            }
            _ => image,
        })
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(device = %self.path, "capture released");
        }
    }
}

/// Decode a raw frame buffer into an image
pub fn decode_frame(
    buf: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<DynamicImage> {
    match format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
            .map_err(|e| Error::Image(format!("MJPEG decode failed: {e}"))),
        PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height),
        PixelFormat::Rgb24 => {
            let expected = width as usize * height as usize * 3;
            let data = buf.get(..expected).ok_or_else(|| {
                Error::Image(format!("RGB24 frame too short: {} < {expected}", buf.len()))
            })?;
            ImageBuffer::from_raw(width, height, data.to_vec())
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| Error::Image("Failed to create RGB image".to_string()))
        }
    }
}

fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let (w, h) = (width as usize, height as usize);
    if yuyv.len() < w * h * 2 {
        return Err(Error::Image(format!(
            "YUYV frame too short: {} < {}",
            yuyv.len(),
            w * h * 2
        )));
    }

    let mut rgb = Vec::with_capacity(w * h * 3);
    for chunk in yuyv[..w * h * 2].chunks_exact(4) {
        let y0 = i32::from(chunk[0]);
        let u = i32::from(chunk[1]) - 128;
        let y1 = i32::from(chunk[2]);
        let v = i32::from(chunk[3]) - 128;

        for y in [y0, y1] {
            rgb.push((y + ((v * 1436) >> 10)).clamp(0, 255) as u8);
            rgb.push((y - ((u * 352 + v * 731) >> 10)).clamp(0, 255) as u8);
            rgb.push((y + ((u * 1814) >> 10)).clamp(0, 255) as u8);
        }
    }

    ImageBuffer::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| Error::Image("Failed to create RGB image from YUYV".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_decodes_to_grey() {
        // 2x2 frame, luma 128, neutral chroma
        let buf = [128u8; 8];
        let image = decode_frame(&buf, PixelFormat::Yuyv, 2, 2).expect("decode");
        let rgb = image.to_rgb8();
        assert_eq!(rgb.dimensions(), (2, 2));
        assert!(rgb.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_short_frames_rejected() {
        assert!(decode_frame(&[0u8; 6], PixelFormat::Yuyv, 2, 2).is_err());
        assert!(decode_frame(&[0u8; 6], PixelFormat::Rgb24, 2, 2).is_err());
        assert!(decode_frame(b"not a jpeg", PixelFormat::Mjpeg, 2, 2).is_err());
    }

    #[test]
    fn test_open_missing_node_fails() {
        let err = CaptureDevice::open("/nonexistent/video42", &CameraConfig::default())
            .err()
            .expect("open fails");
        assert!(matches!(err, Error::Camera(_)));
    }
}
