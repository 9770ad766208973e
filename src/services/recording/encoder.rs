//! Video writers behind the recorder's fallback chain.
//!
//! GIF is encoded in-process with the `image` crate. Every other codec is
//! piped to an `ffmpeg` child process as raw RGBA frames.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame as GifFrame};
use thiserror::Error;

use crate::models::EncoderCandidate;
use crate::sensors::Frame;

const GIF_SPEED: i32 = 30;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder {candidate} unavailable: {reason}")]
    Open { candidate: String, reason: String },
    #[error("frame write failed: {0}")]
    Write(String),
    #[error("encoder did not finish cleanly: {0}")]
    Finish(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An open clip being written frame by frame.
pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> Result<(), EncoderError>;

    /// Flushes and closes the clip.
    fn finish(self: Box<Self>) -> Result<(), EncoderError>;
}

pub trait VideoEncoder: Send + Sync {
    fn open(
        &self,
        candidate: &EncoderCandidate,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSink>, EncoderError>;
}

#[derive(Debug, Clone)]
pub struct NativeEncoder {
    ffmpeg_path: String,
}

impl NativeEncoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl VideoEncoder for NativeEncoder {
    fn open(
        &self,
        candidate: &EncoderCandidate,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn FrameSink>, EncoderError> {
        let fps = fps.max(1);
        if candidate.codec.eq_ignore_ascii_case("gif") {
            return Ok(Box::new(GifSink::create(path, fps)?));
        }

        let open_error = |reason: String| EncoderError::Open {
            candidate: candidate.to_string(),
            reason,
        };
        let sink = FfmpegSink::spawn(&self.ffmpeg_path, candidate, path, fps, width, height)
            .map_err(|e| open_error(e.to_string()))?;
        Ok(Box::new(sink))
    }
}

struct GifSink {
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
}

impl GifSink {
    fn create(path: &Path, fps: u32) -> Result<Self, EncoderError> {
        let file = File::create(path)?;
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), GIF_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| EncoderError::Open {
                candidate: "GIF/.gif".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            encoder,
            delay: Delay::from_numer_denom_ms(1000, fps),
        })
    }
}

impl FrameSink for GifSink {
    fn write(&mut self, frame: &Frame) -> Result<(), EncoderError> {
        self.encoder
            .encode_frame(GifFrame::from_parts(frame.clone(), 0, 0, self.delay))
            .map_err(|e| EncoderError::Write(e.to_string()))
    }

    fn finish(self: Box<Self>) -> Result<(), EncoderError> {
        // The trailer is written and the buffer flushed when the encoder drops.
        drop(self);
        Ok(())
    }
}

fn ffmpeg_codec(codec: &str) -> (&str, &'static str) {
    match codec.to_ascii_lowercase().as_str() {
        "mp4v" => ("mpeg4", "yuv420p"),
        "avc1" | "h264" => ("libx264", "yuv420p"),
        "xvid" => ("libxvid", "yuv420p"),
        "mjpg" => ("mjpeg", "yuvj420p"),
        _ => (codec, "yuv420p"),
    }
}

struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl FfmpegSink {
    fn spawn(
        ffmpeg: &str,
        candidate: &EncoderCandidate,
        path: &Path,
        fps: u32,
        width: u32,
        height: u32,
    ) -> std::io::Result<Self> {
        let (codec, pix_fmt) = ffmpeg_codec(&candidate.codec);
        let size = format!("{}x{}", width, height);
        let rate = fps.to_string();

        let mut child = Command::new(ffmpeg)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-s", size.as_str(), "-r", rate.as_str(), "-i", "-"])
            .args(["-vf", "scale=trunc(iw/2)*2:trunc(ih/2)*2"])
            .args(["-c:v", codec, "-pix_fmt", pix_fmt])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdin = child.stdin.take();
        Ok(Self {
            child,
            stdin,
            width,
            height,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn write(&mut self, frame: &Frame) -> Result<(), EncoderError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| EncoderError::Write("encoder input already closed".to_string()))?;

        if frame.dimensions() == (self.width, self.height) {
            stdin.write_all(frame.as_raw())?;
        } else {
            let scaled = imageops::resize(frame, self.width, self.height, FilterType::Nearest);
            stdin.write_all(scaled.as_raw())?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), EncoderError> {
        drop(self.stdin.take());

        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(EncoderError::Finish(format!("{} ({})", stderr.trim(), status)))
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
