// Representative frame extraction for video posts, via ffprobe + ffmpeg.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

/// Frame count and rate of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub total_frames: u64,
    pub fps: f64,
}

/// Index of the frame roughly one second before the end of the clip.
///
/// The rate is truncated to whole frames before doubling, so 29.97 fps
/// backs off 58 frames.
pub fn target_frame(total_frames: u64, fps: f64) -> u64 {
    let back_off = (fps.max(0.0).trunc() as u64).saturating_mul(2);
    total_frames.saturating_sub(back_off)
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// `"30000/1001"` or `"25"` to frames per second. `0/0` means unknown.
fn parse_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Read the stream info out of `ffprobe -of json` output.
///
/// Containers that do not record `nb_frames` fall back to duration × fps.
pub fn parse_stream_info(json: &[u8]) -> Option<StreamInfo> {
    let parsed: FfprobeOutput = serde_json::from_slice(json).ok()?;
    let stream = parsed.streams.into_iter().next()?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))?;

    let total_frames = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .or_else(|| {
            let secs: f64 = stream.duration.as_deref()?.trim().parse().ok()?;
            Some((secs * fps).floor() as u64)
        })?;

    Some(StreamInfo { total_frames, fps })
}

pub struct FrameGrabber {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FrameGrabber {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Probe the first video stream. `None` when the file cannot be opened
    /// as a video.
    pub async fn probe(&self, video: &Path) -> Option<StreamInfo> {
        let output = Command::new(&self.ffprobe)
            .args(probe_args(video))
            .output()
            .await
            .map_err(|e| warn!(error = %e, ffprobe = %self.ffprobe.display(), "ffprobe failed to start"))
            .ok()?;

        if !output.status.success() {
            warn!(
                video = %video.display(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ffprobe could not open video"
            );
            return None;
        }

        parse_stream_info(&output.stdout)
    }

    /// Decode the frame about one second before the end and write it as a
    /// JPEG to `dest`. Returns `None` if the video cannot be opened or the
    /// frame cannot be decoded.
    pub async fn grab_last_second(&self, video: &Path, dest: &Path) -> Option<PathBuf> {
        let info = self.probe(video).await?;
        let frame = target_frame(info.total_frames, info.fps);
        debug!(total_frames = info.total_frames, fps = info.fps, frame, "Selecting video frame");

        // A file left by an earlier run must not pass for this decode.
        if let Err(e) = tokio::fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dest.display(), error = %e, "Cannot remove previous frame");
                return None;
            }
        }

        let output = Command::new(&self.ffmpeg)
            .args(extract_args(video, frame, dest))
            .output()
            .await
            .map_err(|e| warn!(error = %e, ffmpeg = %self.ffmpeg.display(), "ffmpeg failed to start"))
            .ok()?;

        let written = tokio::fs::metadata(dest)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !output.status.success() || !written {
            warn!(
                video = %video.display(),
                frame,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Could not decode video frame"
            );
            return None;
        }

        Some(dest.to_path_buf())
    }
}

fn probe_args(video: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-hide_banner"),
        OsString::from("-v"),
        OsString::from("error"),
        OsString::from("-select_streams"),
        OsString::from("v:0"),
        OsString::from("-show_entries"),
        OsString::from("stream=nb_frames,r_frame_rate,avg_frame_rate,duration"),
        OsString::from("-of"),
        OsString::from("json"),
        video.as_os_str().to_os_string(),
    ]
}

fn extract_args(video: &Path, frame: u64, dest: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-hide_banner"),
        OsString::from("-v"),
        OsString::from("error"),
        OsString::from("-y"),
        OsString::from("-i"),
        video.as_os_str().to_os_string(),
        OsString::from("-vf"),
        OsString::from(format!("select=eq(n\\,{frame})")),
        OsString::from("-frames:v"),
        OsString::from("1"),
        OsString::from("-q:v"),
        OsString::from("2"),
        dest.as_os_str().to_os_string(),
    ]
}
