use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbaImage;

use super::{Frame, FrameSource, SensorError};

pub const CAMERA_WIDTH: u32 = 640;
pub const CAMERA_HEIGHT: u32 = 480;
const CAMERA_FPS: u32 = 2;

/// Camera or video stream decoded by an `ffmpeg` child into raw RGBA frames.
/// The child is started lazily and restarted after any read failure.
pub struct FfmpegCamera {
    ffmpeg_path: String,
    url: String,
    child: Option<(Child, ChildStdout)>,
}

impl FfmpegCamera {
    pub fn new(ffmpeg_path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            url: url.into(),
            child: None,
        }
    }

    fn input_args(&self) -> Vec<String> {
        let mut args = vec!["-loglevel".to_string(), "error".to_string()];
        if self.url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        } else if self.url.starts_with("/dev/video") {
            args.extend(["-f".to_string(), "v4l2".to_string()]);
        }
        args.extend(["-i".to_string(), self.url.clone()]);
        args.extend(["-vf".to_string(), format!("fps={},scale={}:{}", CAMERA_FPS, CAMERA_WIDTH, CAMERA_HEIGHT)]);
        args.extend(["-f", "rawvideo", "-pix_fmt", "rgba", "-"].iter().map(|s| s.to_string()));
        args
    }

    fn spawn(&self) -> Result<(Child, ChildStdout), SensorError> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.input_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SensorError::Camera(format!("Cannot start ffmpeg for {}: {}", self.url, e)))?;

        match child.stdout.take() {
            Some(stdout) => {
                log::info!("[Vision] Camera stream opened: {}", self.url);
                Ok((child, stdout))
            }
            None => {
                let _ = child.kill();
                Err(SensorError::Camera("ffmpeg stdout not captured".to_string()))
            }
        }
    }

    fn release(&mut self) {
        if let Some((mut child, _)) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegCamera {
    fn read_frame(&mut self) -> Result<Frame, SensorError> {
        if self.child.is_none() {
            self.child = Some(self.spawn()?);
        }

        let mut buf = vec![0u8; (CAMERA_WIDTH * CAMERA_HEIGHT * 4) as usize];
        let read = match self.child.as_mut() {
            Some((_, stdout)) => stdout.read_exact(&mut buf),
            None => return Err(SensorError::Camera("camera not open".to_string())),
        };

        if let Err(e) = read {
            self.release();
            return Err(SensorError::Camera(format!("Stream ended: {}", e)));
        }
        RgbaImage::from_raw(CAMERA_WIDTH, CAMERA_HEIGHT, buf)
            .ok_or_else(|| SensorError::Camera("Short frame".to_string()))
    }
}

impl Drop for FfmpegCamera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtsp_streams_use_tcp_transport() {
        let camera = FfmpegCamera::new("ffmpeg", "rtsp://10.0.0.5/live");
        let args = camera.input_args();
        let i = args.iter().position(|a| a == "-rtsp_transport").unwrap();
        assert_eq!(args[i + 1], "tcp");
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(args.contains(&"fps=2,scale=640:480".to_string()));
    }

    #[test]
    fn missing_binary_reports_camera_error() {
        let mut camera = FfmpegCamera::new("/nonexistent/ffmpeg-binary", "/dev/video0");
        assert!(matches!(camera.read_frame(), Err(SensorError::Camera(_))));
    }
}
