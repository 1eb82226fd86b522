//! RTSP transport using GStreamer.
//!
//! Pipeline: `rtspsrc latency=0 ! decodebin ! videorate ! videoconvert ! appsink`
//! with the appsink holding at most one buffer and dropping older ones, so the
//! transport itself never accumulates a backlog.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use std::time::Instant;

use super::transport::{TransportOptions, VideoTransport};
use crate::frame::RawFrame;

const MIN_PULL_TIMEOUT_MS: u64 = 500;

pub struct GstreamerTransport {
    pipeline: Option<(gstreamer::Pipeline, gstreamer_app::AppSink)>,
    target_fps: u32,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl GstreamerTransport {
    pub fn new() -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        Ok(Self {
            pipeline: None,
            target_fps: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn build_pipeline(options: &TransportOptions) -> Result<(gstreamer::Pipeline, gstreamer_app::AppSink)> {
        let rate_caps = if options.target_fps > 0 {
            format!(
                "videorate drop-only=true ! video/x-raw,framerate={}/1 ! ",
                options.target_fps
            )
        } else {
            String::new()
        };
        let description = format!(
            "rtspsrc location={} latency=0 protocols=tcp ! decodebin ! {}videoconvert ! \
             video/x-raw,format=RGB ! appsink name=appsink sync=false max-buffers=1 drop=true",
            options.url, rate_caps
        );
        let pipeline = gstreamer::parse::launch(&description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok((pipeline, appsink))
    }

    fn pull_timeout(&self) -> gstreamer::ClockTime {
        let base_ms = if self.target_fps == 0 {
            MIN_PULL_TIMEOUT_MS
        } else {
            (1000 / self.target_fps as u64).saturating_mul(4)
        };
        gstreamer::ClockTime::from_mseconds(base_ms.max(MIN_PULL_TIMEOUT_MS))
    }

    fn poll_bus(&mut self) {
        let Some((pipeline, _)) = &self.pipeline else {
            return;
        };
        let Some(bus) = pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl VideoTransport for GstreamerTransport {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&mut self, options: &TransportOptions) -> Result<()> {
        self.release();
        let (pipeline, appsink) = Self::build_pipeline(options)?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        self.target_fps = options.target_fps;
        self.last_error = None;
        self.last_frame_at = None;
        self.pipeline = Some((pipeline, appsink));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some() && self.last_error.is_none()
    }

    fn grab(&mut self) -> Result<bool> {
        let Some((_, appsink)) = &self.pipeline else {
            return Ok(false);
        };
        Ok(appsink.try_pull_sample(gstreamer::ClockTime::ZERO).is_some())
    }

    fn retrieve(&mut self) -> Result<Option<RawFrame>> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            return Err(anyhow!("{}", err));
        }
        let timeout = self.pull_timeout();
        let Some((_, appsink)) = &self.pipeline else {
            return Ok(None);
        };
        let Some(sample) = appsink.try_pull_sample(timeout) else {
            return Ok(None);
        };
        let frame = sample_to_frame(&sample)?;
        self.last_frame_at = Some(Instant::now());
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if let Some((pipeline, _)) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                log::warn!("failed to stop RTSP pipeline: {}", e);
            }
            if let Some(at) = self.last_frame_at.take() {
                log::debug!("RTSP pipeline stopped, last frame {:?} ago", at.elapsed());
            }
        }
    }
}

impl Drop for GstreamerTransport {
    fn drop(&mut self) {
        self.release();
    }
}

fn sample_to_frame(sample: &gstreamer::Sample) -> Result<RawFrame> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok(RawFrame::new(
            data.get(..row_bytes * height as usize)
                .context("RTSP buffer is shorter than its caps")?
                .to_vec(),
            width,
            height,
        ));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok(RawFrame::new(pixels, width, height))
}
