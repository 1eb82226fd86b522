//! RTSP transport using FFmpeg.
//!
//! Opened with `fflags=nobuffer`, `flags=low_delay` and a socket timeout so
//! reads cannot block forever. `grab` feeds packets through the decoder but
//! skips color conversion and the copy out, which keeps reference frames
//! intact while staying cheap.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::transport::{TransportOptions, VideoTransport};
use crate::frame::RawFrame;

/// Socket read timeout in microseconds.
const READ_TIMEOUT_US: &str = "5000000";
/// Packets read per decoded frame before giving up on a retrieve.
const MAX_PACKETS_PER_FRAME: usize = 256;

struct OpenStream {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
}

pub struct FfmpegTransport {
    stream: Option<OpenStream>,
}

impl FfmpegTransport {
    pub fn new() -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Fatal);
        Ok(Self { stream: None })
    }
}

impl OpenStream {
    fn open(options: &TransportOptions) -> Result<Self> {
        let mut dict = ffmpeg::Dictionary::new();
        dict.set("rtsp_transport", "tcp");
        dict.set("fflags", "nobuffer");
        dict.set("flags", "low_delay");
        dict.set("timeout", READ_TIMEOUT_US);
        if options.target_fps > 0 {
            dict.set("framerate", &options.target_fps.to_string());
        }

        let input = ffmpeg::format::input_with_dictionary(&options.url, dict)
            .with_context(|| format!("failed to open stream '{}' with ffmpeg", options.url))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("stream has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler: None,
        })
    }

    /// Read packets until the decoder yields a frame.
    fn decode_next(&mut self, decoded: &mut ffmpeg::frame::Video) -> Result<bool> {
        if self.decoder.receive_frame(decoded).is_ok() {
            return Ok(true);
        }
        for _ in 0..MAX_PACKETS_PER_FRAME {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("read packet: {}", e)),
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(decoded).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn to_rgb(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RawFrame> {
        let stale = self.scaler.as_ref().is_some_and(|s| {
            s.input().width != decoded.width()
                || s.input().height != decoded.height()
                || s.input().format != decoded.format()
        });
        if stale || self.scaler.is_none() {
            self.scaler = Some(
                ffmpeg::software::scaling::Context::get(
                    decoded.format(),
                    decoded.width(),
                    decoded.height(),
                    ffmpeg::util::format::pixel::Pixel::RGB24,
                    decoded.width(),
                    decoded.height(),
                    ffmpeg::software::scaling::flag::Flags::BILINEAR,
                )
                .context("create ffmpeg scaler")?,
            );
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| anyhow!("ffmpeg scaler unavailable"))?;

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        frame_to_pixels(&rgb_frame)
    }
}

impl VideoTransport for FfmpegTransport {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&mut self, options: &TransportOptions) -> Result<()> {
        self.release();
        self.stream = Some(OpenStream::open(options)?);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn grab(&mut self) -> Result<bool> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(false);
        };
        let mut decoded = ffmpeg::frame::Video::empty();
        stream.decode_next(&mut decoded)
    }

    fn retrieve(&mut self) -> Result<Option<RawFrame>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        let mut decoded = ffmpeg::frame::Video::empty();
        if !stream.decode_next(&mut decoded)? {
            return Ok(None);
        }
        stream.to_rgb(&decoded).map(Some)
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("ffmpeg stream closed");
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<RawFrame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok(RawFrame::new(
            data.get(..row_bytes * height as usize)
                .context("ffmpeg frame is shorter than its dimensions")?
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
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok(RawFrame::new(pixels, width, height))
}
