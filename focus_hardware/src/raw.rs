//! Packed 8-bit RGB frames read from a byte stream.
//!
//! Typically stdin fed by a camera tool writing raw `rgb24` frames of a fixed
//! size back to back. A reader thread owns the stream and blocks in
//! `read_exact`; `next_frame` waits on its channel with the caller's timeout,
//! so a silent producer shows up as missing frames instead of a hung caller.
use std::io::{self, ErrorKind, Read};
use std::time::Duration;

use crossbeam_channel as xch;
use focus_traits::{Frame, FrameSource};

use crate::error::HwError;

/// Whole frames buffered between the reader thread and the consumer.
const READ_AHEAD: usize = 2;

pub struct RawRgbReader {
    rx: xch::Receiver<io::Result<Vec<u8>>>,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl RawRgbReader {
    /// Start reading `width x height` frames from `reader` on a background
    /// thread. The thread is detached: it ends at end of stream, on a read
    /// error, or once this reader is dropped and its next frame is complete.
    pub fn new<R>(mut reader: R, width: u32, height: u32) -> Self
    where
        R: Read + Send + 'static,
    {
        let frame_len = width as usize * height as usize * 3;
        let (tx, rx) = xch::bounded(READ_AHEAD);
        std::thread::spawn(move || {
            loop {
                let mut buf = vec![0; frame_len];
                let res = reader.read_exact(&mut buf).map(|()| buf);
                let failed = res.is_err();
                if tx.send(res).is_err() || failed {
                    break;
                }
            }
            tracing::trace!("raw frame reader thread exiting");
        });
        Self {
            rx,
            width,
            height,
            frame_len,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }
}

impl FrameSource for RawRgbReader {
    /// Waits up to `timeout` for the next whole frame; `Ok(None)` when none
    /// arrived in time.
    fn next_frame(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Frame>, Box<dyn std::error::Error + Send + Sync>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(bytes)) => Ok(Frame::from_raw(self.width, self.height, bytes)),
            Ok(Err(e)) => Err(Box::new(HwError::Io(e))),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(xch::RecvTimeoutError::Disconnected) => Err(Box::new(HwError::Io(
                io::Error::new(ErrorKind::UnexpectedEof, "frame stream closed"),
            ))),
        }
    }
}
