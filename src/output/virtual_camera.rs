//! Virtual camera frame passthrough
//!
//! Raw RGB24 frames of the configured size are written to a device node or
//! pipe (v4l2loopback, OBS virtual camera FIFO, ...). A failed write disables
//! the sink for the rest of the session.
//!
//! On unix the device is opened non-blocking: a FIFO without a reader fails
//! to open instead of hanging, and a full device drops the frame.

use std::fs::OpenOptions;
use std::io::{self, Write};
use tracing::{info, warn};

use super::{OutputFrame, RasterFrame, SinkHealth};
use crate::config::VirtualCameraConfig;
use crate::error::OutputError;

pub struct VirtualCameraSink {
    writer: Box<dyn Write + Send>,
    width: u32,
    height: u32,
    fps: u32,
    health: SinkHealth,
    frames_written: u64,
    frames_rejected: u64,
    frames_dropped: u64,
}

impl VirtualCameraSink {
    /// Open the configured device for writing
    pub fn open(config: &VirtualCameraConfig) -> Result<Self, OutputError> {
        let mut options = OpenOptions::new();
        options.write(true);
        #[cfg(unix)]
        {
            use nix::fcntl::OFlag;
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(OFlag::O_NONBLOCK.bits());
        }

        let device = options
            .open(&config.device)
            .map_err(|e| OutputError::DeviceOpen(format!("{}: {}", config.device.display(), e)))?;

        info!(
            "Virtual camera {} opened ({}x{} @ {} fps)",
            config.device.display(),
            config.width,
            config.height,
            config.fps
        );
        Ok(Self::with_writer(
            Box::new(device),
            config.width,
            config.height,
            config.fps,
        ))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            writer,
            width,
            height,
            fps,
            health: SinkHealth::Healthy,
            frames_written: 0,
            frames_rejected: 0,
            frames_dropped: 0,
        }
    }

    pub fn health(&self) -> SinkHealth {
        self.health
    }

    /// Frame size as `(width, height)`
    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Frames dropped because the device was not ready
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Write the frame's raster. Frames without a raster are a no-op.
    pub fn accept(&mut self, frame: &OutputFrame) -> Result<(), OutputError> {
        if self.health == SinkHealth::Disabled {
            return Err(OutputError::SinkDisabled("virtual_camera".to_string()));
        }
        let Some(raster) = frame.raster() else {
            return Ok(());
        };

        let expected = RasterFrame::expected_len(self.width, self.height);
        if raster.width() != self.width
            || raster.height() != self.height
            || raster.data().len() != expected
        {
            self.frames_rejected += 1;
            return Err(OutputError::FrameSize {
                width: self.width,
                height: self.height,
                expected,
                actual: raster.data().len(),
            });
        }

        let written = self
            .writer
            .write_all(raster.data())
            .and_then(|_| self.writer.flush());
        match written {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.frames_dropped += 1;
                self.health = SinkHealth::Degraded;
                return Err(OutputError::DeviceBusy);
            }
            Err(e) => {
                self.health = SinkHealth::Disabled;
                warn!("Virtual camera write failed, disabling sink: {}", e);
                return Err(OutputError::DeviceWrite(e.to_string()));
            }
        }

        self.health = SinkHealth::Healthy;
        self.frames_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::PoseSample;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Reports not-ready for the first `busy` writes
    struct SlowDevice {
        busy: u32,
        written: usize,
    }

    impl Write for SlowDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.busy > 0 {
                self.busy -= 1;
                return Err(io::ErrorKind::WouldBlock.into());
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frame_with(raster: RasterFrame) -> OutputFrame {
        OutputFrame::new(1, PoseSample::ZERO, true).with_raster(Some(Arc::new(raster)))
    }

    #[test]
    fn test_writes_matching_frame() {
        let buffer = SharedBuffer::default();
        let mut sink = VirtualCameraSink::with_writer(Box::new(buffer.clone()), 4, 2, 30);

        sink.accept(&frame_with(RasterFrame::blank(4, 2))).unwrap();
        assert_eq!(buffer.0.lock().unwrap().len(), 24);
        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn test_frame_without_raster_is_noop() {
        let buffer = SharedBuffer::default();
        let mut sink = VirtualCameraSink::with_writer(Box::new(buffer.clone()), 4, 2, 30);

        sink.accept(&OutputFrame::new(1, PoseSample::ZERO, false)).unwrap();
        assert!(buffer.0.lock().unwrap().is_empty());
        assert_eq!(sink.frames_written(), 0);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mut sink = VirtualCameraSink::with_writer(Box::new(SharedBuffer::default()), 4, 2, 30);

        let result = sink.accept(&frame_with(RasterFrame::blank(2, 2)));
        assert!(matches!(
            result,
            Err(OutputError::FrameSize {
                expected: 24,
                actual: 12,
                ..
            })
        ));
        assert_eq!(sink.health(), SinkHealth::Healthy);
        assert_eq!(sink.frames_rejected(), 1);

        sink.accept(&frame_with(RasterFrame::blank(4, 2))).unwrap();
    }

    #[test]
    fn test_write_failure_disables() {
        let mut sink = VirtualCameraSink::with_writer(Box::new(BrokenPipe), 2, 2, 30);

        assert!(matches!(
            sink.accept(&frame_with(RasterFrame::blank(2, 2))),
            Err(OutputError::DeviceWrite(_))
        ));
        assert_eq!(sink.health(), SinkHealth::Disabled);
        assert!(matches!(
            sink.accept(&frame_with(RasterFrame::blank(2, 2))),
            Err(OutputError::SinkDisabled(_))
        ));
    }

    #[test]
    fn test_busy_device_drops_frame() {
        let device = SlowDevice {
            busy: 1,
            written: 0,
        };
        let mut sink = VirtualCameraSink::with_writer(Box::new(device), 2, 2, 30);

        assert!(matches!(
            sink.accept(&frame_with(RasterFrame::blank(2, 2))),
            Err(OutputError::DeviceBusy)
        ));
        assert_eq!(sink.health(), SinkHealth::Degraded);
        assert_eq!(sink.frames_dropped(), 1);

        sink.accept(&frame_with(RasterFrame::blank(2, 2))).unwrap();
        assert_eq!(sink.health(), SinkHealth::Healthy);
        assert_eq!(sink.frames_written(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_fifo_without_reader_fails_fast() {
        use nix::sys::stat::Mode;

        let dir = tempfile::tempdir().unwrap();
        let fifo = dir.path().join("camera.fifo");
        nix::unistd::mkfifo(&fifo, Mode::S_IRWXU).unwrap();

        let config = VirtualCameraConfig {
            enabled: true,
            device: fifo,
            width: 2,
            height: 2,
            fps: 30,
        };
        assert!(matches!(
            VirtualCameraSink::open(&config),
            Err(OutputError::DeviceOpen(_))
        ));
    }

    #[test]
    fn test_open_missing_device() {
        let config = VirtualCameraConfig {
            device: "/nonexistent/facerig/video99".into(),
            ..Default::default()
        };
        assert!(matches!(
            VirtualCameraSink::open(&config),
            Err(OutputError::DeviceOpen(_))
        ));
    }
}
