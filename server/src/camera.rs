use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera {index} not available: {reason}")]
    Open { index: u32, reason: String },
    #[error("device enumeration failed: {0}")]
    Query(String),
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("JPEG encode failed: {0}")]
    Encode(String),
}

/// A camera the UI can pick from.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
}

/// Capture backends to try, most specific first. Mirrors the usual
/// per-OS preference: the native API, then whatever nokhwa picks.
pub fn backend_order() -> &'static [ApiBackend] {
    if cfg!(target_os = "windows") {
        &[ApiBackend::MediaFoundation, ApiBackend::Auto]
    } else if cfg!(target_os = "macos") {
        &[ApiBackend::AVFoundation, ApiBackend::Auto]
    } else {
        &[ApiBackend::Video4Linux, ApiBackend::Auto]
    }
}

/// Open a camera by index, walking the backend list until one opens.
///
/// Per backend, first ask for the configured resolution as a closest
/// match (MJPEG source format keeps USB bandwidth sane at 1080p), then
/// fall back to whatever the device calls its highest resolution.
pub fn open_camera(index: u32, width: u32, height: u32, fps: u32) -> Result<Camera, CameraError> {
    let mut last_err: Option<String> = None;

    for backend in backend_order() {
        let attempts = [
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
                Resolution::new(width, height),
                FrameFormat::MJPEG,
                fps,
            ))),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
        ];

        for requested in attempts {
            debug!(index, ?backend, ?requested, "trying camera open");
            match Camera::with_backend(CameraIndex::Index(index), requested, *backend) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        let resolution = camera.resolution();
                        info!(
                            index,
                            ?backend,
                            width = resolution.width(),
                            height = resolution.height(),
                            fps = camera.frame_rate(),
                            "camera opened"
                        );
                        return Ok(camera);
                    }
                    Err(e) => last_err = Some(e.to_string()),
                },
                Err(e) => last_err = Some(e.to_string()),
            }
        }
    }

    Err(CameraError::Open {
        index,
        reason: last_err.unwrap_or_else(|| "no backend produced a device".to_string()),
    })
}

/// Enumerate devices for the UI picker. String-indexed devices (some
/// IP camera backends) are skipped; the picker only handles indices.
pub fn list_devices() -> Result<Vec<DeviceInfo>, CameraError> {
    let devices = nokhwa::query(ApiBackend::Auto).map_err(|e| CameraError::Query(e.to_string()))?;

    let mut out: Vec<DeviceInfo> = devices
        .into_iter()
        .filter_map(|info| {
            info.index().as_index().ok().map(|index| DeviceInfo {
                index,
                name: info.human_name(),
            })
        })
        .collect();
    out.sort_by_key(|d| d.index);
    Ok(out)
}

/// Read one frame and return it as JPEG bytes plus dimensions.
pub fn read_jpeg(camera: &mut Camera, quality: u8) -> Result<(Vec<u8>, u32, u32), CameraError> {
    let buffer = camera.frame().map_err(|e| CameraError::Read(e.to_string()))?;
    let decoded = buffer
        .decode_image::<RgbFormat>()
        .map_err(|e| CameraError::Decode(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    encoder
        .encode_image(&decoded)
        .map_err(|e| CameraError::Encode(e.to_string()))?;

    Ok((jpeg, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_order_ends_with_auto() {
        let order = backend_order();
        assert!(!order.is_empty());
        assert_eq!(*order.last().unwrap(), ApiBackend::Auto);
    }

    #[test]
    fn backend_order_prefers_native() {
        // First entry is never the catch-all.
        assert_ne!(backend_order()[0], ApiBackend::Auto);
    }
}
