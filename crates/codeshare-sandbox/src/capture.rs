use tokio::io::{AsyncRead, AsyncReadExt};

/// Appended to a stream that exceeded the capture cap.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

const READ_CHUNK: usize = 8 * 1024;

/// Bytes captured from one child stream.
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl Captured {
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
/// Bytes past the limit are drained and discarded so the child never blocks on a full pipe.
pub(crate) async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if room > 0 {
            captured.bytes.extend_from_slice(&buf[..n.min(room)]);
        }
        if n > room {
            captured.truncated = true;
        }
    }

    Ok(captured)
}
