//! Incremental frame reader over a live byte stream.
//!
//! The frame length is unknown until the first bytes have arrived, so a frame
//! is read in phases: the two prefix bytes, then 0, 2, or 8 extended length
//! bytes, then the mask key, then exactly the declared number of payload
//! bytes.  Each phase uses `read_exact`, which suspends until the bytes are
//! there however the peer chose to split its writes.
//!
//! Lengths are checked against the configured limit before the payload
//! buffer is allocated.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use wsnet_core::protocol::frame::{finish_frame, MASK_KEY_SIZE, PREFIX_SIZE};
use wsnet_core::protocol::{apply_mask, FramePrefix};
use wsnet_core::{DecodedFrame, FrameError, OpCode};

/// Why [`FrameReader::next_frame`] failed.
#[derive(Debug, Error)]
pub enum FrameReadError {
    /// The peer broke the framing rules.  The connection must be terminated.
    #[error(transparent)]
    Protocol(#[from] FrameError),

    /// The stream failed or ended in the middle of a frame.
    #[error("I/O error while reading frame: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads client frames one at a time.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    max_frame_len: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_frame_len: u64) -> Self {
        Self {
            reader,
            max_frame_len,
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// A close frame is returned as soon as its prefix is read; its status
    /// payload is left unread because the session ends there.
    ///
    /// # Errors
    ///
    /// - [`FrameReadError::Protocol`] for unmasked frames, unknown opcodes,
    ///   empty data frames, oversize lengths, or invalid UTF-8.
    /// - [`FrameReadError::Io`] if the stream fails or ends mid-frame.
    pub async fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameReadError> {
        let mut prefix = [0u8; PREFIX_SIZE];
        if self.reader.read(&mut prefix[..1]).await? == 0 {
            return Ok(None);
        }
        self.reader.read_exact(&mut prefix[1..]).await?;
        let prefix = FramePrefix::parse(prefix)?;
        if prefix.opcode == OpCode::Close {
            return Ok(Some(DecodedFrame::Close));
        }

        let mut extended = [0u8; 8];
        let extended = &mut extended[..prefix.extended_len_size()];
        self.reader.read_exact(extended).await?;
        let declared = prefix.payload_len(extended)?;
        let len = prefix.validate_len(declared, self.max_frame_len)?;

        let mut key = [0u8; MASK_KEY_SIZE];
        self.reader.read_exact(&mut key).await?;

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        apply_mask(&mut payload, key);

        Ok(Some(finish_frame(prefix.opcode, payload)?))
    }
}
