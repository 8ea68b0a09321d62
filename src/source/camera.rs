use super::{FrameSink, FrameSource};
use crate::errors::SweepError;
use crate::types::Resolution;
use nokhwa::{
    pixel_format::LumaFormat,
    utils::{
        CameraFormat, CameraIndex, ControlValueDescription, ControlValueSetter, FrameFormat,
        KnownCameraControl, KnownCameraControlFlag, RequestedFormat, RequestedFormatType,
        Resolution as CameraResolution,
    },
    Buffer, CallbackCamera, NokhwaError,
};
use std::time::Instant;

/// Live camera delivering luma frames through nokhwa's callback camera.
///
/// The stream opens on `configure` with a discarding callback so automatic
/// exposure can converge during calibration; `start` swaps in the sweep sink.
pub struct NokhwaFrameSource {
    index: u32,
    resolution: Option<Resolution>,
    camera: Option<CallbackCamera>,
}

impl NokhwaFrameSource {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            resolution: None,
            camera: None,
        }
    }

    fn camera_mut(&mut self) -> Result<&mut CallbackCamera, SweepError> {
        self.camera
            .as_mut()
            .ok_or_else(|| SweepError::frame_source("camera not configured"))
    }
}

impl FrameSource for NokhwaFrameSource {
    fn configure(&mut self, resolution: Resolution, framerate: u32) -> Result<(), SweepError> {
        let format = RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                CameraResolution::new(resolution.width, resolution.height),
                FrameFormat::YUYV,
                framerate,
            ),
        ));

        let mut camera = CallbackCamera::new(CameraIndex::Index(self.index), format, |_| {})
            .map_err(|e| SweepError::frame_source(format!("Failed to initialize camera: {}", e)))?;

        camera
            .open_stream()
            .map_err(|e| SweepError::frame_source(format!("Failed to open stream: {}", e)))?;

        log::info!(
            "Camera {} streaming at {} ({} fps requested)",
            self.index,
            resolution,
            framerate
        );
        self.resolution = Some(resolution);
        self.camera = Some(camera);
        Ok(())
    }

    fn lock_exposure(&mut self) -> Result<(), SweepError> {
        let camera = self.camera_mut()?;
        hold_control(camera, KnownCameraControl::Exposure)
            .map_err(|e| SweepError::frame_source(format!("Failed to lock exposure: {}", e)))?;
        if let Err(e) = hold_control(camera, KnownCameraControl::WhiteBalance) {
            log::warn!("White balance left on auto: {}", e);
        }
        Ok(())
    }

    fn start(&mut self, mut sink: FrameSink) -> Result<(), SweepError> {
        let expected = self
            .resolution
            .ok_or_else(|| SweepError::frame_source("camera not configured"))?;

        let camera = self.camera_mut()?;
        camera
            .set_callback(move |buffer: Buffer| {
                let arrival = Instant::now();
                match buffer.decode_image::<LumaFormat>() {
                    Ok(image) => {
                        if image.width() != expected.width || image.height() != expected.height {
                            log::trace!(
                                "Camera delivered {}x{}, expected {}",
                                image.width(),
                                image.height(),
                                expected
                            );
                        }
                        sink(image.as_raw(), arrival);
                    }
                    Err(e) => log::warn!("Dropping undecodable frame: {}", e),
                }
            })
            .map_err(|e| SweepError::frame_source(format!("Failed to attach sink: {}", e)))?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SweepError> {
        if let Some(mut camera) = self.camera.take() {
            camera
                .stop_stream()
                .map_err(|e| SweepError::frame_source(format!("Failed to stop stream: {}", e)))?;
            log::info!("Camera {} stream stopped", self.index);
        }
        Ok(())
    }
}

impl Drop for NokhwaFrameSource {
    fn drop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            let _ = camera.stop_stream();
        }
    }
}

// The camera handle is only reached through `&mut self`, and the sink it
// calls is itself `Send`.
unsafe impl Send for NokhwaFrameSource {}

/// Freeze `control` at the value automatic mode settled on during calibration.
fn hold_control(camera: &mut CallbackCamera, control: KnownCameraControl) -> Result<(), NokhwaError> {
    let current = camera.camera_control(control)?;
    let Some(setter) = hold_current(&current.value()) else {
        log::warn!(
            "{:?} control not lockable ({:?}); leaving auto",
            control,
            current.value()
        );
        return Ok(());
    };

    match auto_switch(control) {
        Some((switch, manual)) => {
            if let Err(e) = camera.set_camera_control(switch, manual) {
                log::warn!("Could not switch {:?} to manual: {}", control, e);
            }
        }
        None => log::warn!(
            "No manual mode switch for {:?} on this platform; auto may stay on",
            control
        ),
    }

    camera.set_camera_control(control, setter)?;

    match camera.camera_control(control) {
        Ok(after) if still_automatic(after.flag()) => {
            log::warn!("{:?} still reports automatic mode after locking", control)
        }
        Ok(_) => log::info!("{:?} locked", control),
        Err(e) => log::warn!("Could not confirm {:?} lock: {}", control, e),
    }
    Ok(())
}

/// Setter that writes a control's current value back
fn hold_current(value: &ControlValueDescription) -> Option<ControlValueSetter> {
    match value {
        ControlValueDescription::Integer { value, .. }
        | ControlValueDescription::IntegerRange { value, .. } => {
            Some(ControlValueSetter::Integer(*value))
        }
        ControlValueDescription::Float { value, .. }
        | ControlValueDescription::FloatRange { value, .. } => {
            Some(ControlValueSetter::Float(*value))
        }
        _ => None,
    }
}

fn still_automatic(flags: &[KnownCameraControlFlag]) -> bool {
    flags.contains(&KnownCameraControlFlag::Automatic)
}

/// V4L2 control that turns automatic mode off for `control`, with its manual setting.
#[cfg(target_os = "linux")]
fn auto_switch(control: KnownCameraControl) -> Option<(KnownCameraControl, ControlValueSetter)> {
    const V4L2_CID_EXPOSURE_AUTO: u128 = 0x009a_0901;
    const V4L2_EXPOSURE_MANUAL: i64 = 1;
    const V4L2_CID_AUTO_WHITE_BALANCE: u128 = 0x0098_090c;

    match control {
        KnownCameraControl::Exposure => Some((
            KnownCameraControl::Other(V4L2_CID_EXPOSURE_AUTO),
            ControlValueSetter::Integer(V4L2_EXPOSURE_MANUAL),
        )),
        KnownCameraControl::WhiteBalance => Some((
            KnownCameraControl::Other(V4L2_CID_AUTO_WHITE_BALANCE),
            ControlValueSetter::Boolean(false),
        )),
        _ => None,
    }
}

#[cfg(not(target_os = "linux"))]
fn auto_switch(_control: KnownCameraControl) -> Option<(KnownCameraControl, ControlValueSetter)> {
    None
}
