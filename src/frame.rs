//! Length-prefixed framing: `[u32 big-endian length][payload bytes]`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;
use crate::stream::{InputStream, OutputStream};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Writes one frame: the payload's length as a 4-byte big-endian
/// prefix, followed by the payload itself. Fails with
/// [`Error::Protocol`] before writing anything if `payload` exceeds
/// `max_frame_bytes`, and with [`Error::Io`] if the underlying writer
/// fails.
pub async fn write_frame(
    output: &mut dyn OutputStream,
    payload: &[u8],
    max_frame_bytes: u32,
) -> Result<(), Error> {
    let len = payload.len();
    if len as u64 > max_frame_bytes as u64 {
        return Err(Error::Protocol(format!(
            "frame of {len} bytes exceeds MAX_FRAME ({max_frame_bytes})"
        )));
    }
    let mut header = BytesMut::with_capacity(LENGTH_PREFIX_BYTES);
    header.put_u32(len as u32);
    output.write(header.freeze()).await?;
    output.write(Bytes::copy_from_slice(payload)).await?;
    Ok(())
}

/// Reads exactly one frame's payload: 4 length bytes, then that many
/// payload bytes, looping on short reads until satisfied. Fails with
/// [`Error::Protocol`] if the declared length exceeds
/// `max_frame_bytes`, and with [`Error::Io`] on a truncated read
/// (stream closed mid-frame).
pub async fn read_frame(
    input: &mut dyn InputStream,
    max_frame_bytes: u32,
) -> Result<Bytes, Error> {
    let header = read_exact(input, LENGTH_PREFIX_BYTES).await?;
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if len > max_frame_bytes {
        return Err(Error::Protocol(format!(
            "declared frame length {len} exceeds MAX_FRAME ({max_frame_bytes})"
        )));
    }
    read_exact(input, len as usize).await
}

async fn read_exact(input: &mut dyn InputStream, want: usize) -> Result<Bytes, Error> {
    let mut buf = BytesMut::with_capacity(want);
    while buf.len() < want {
        let chunk = input.read(want - buf.len()).await?;
        if chunk.is_empty() {
            return Err(Error::Io(
                "stream closed with a partial frame in flight".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Pipe;

    #[tokio::test]
    async fn round_trip() {
        let (mut reader, mut writer) = Pipe::channel(8);
        let payload = b"data message".to_vec();
        let write_payload = payload.clone();
        let handle = tokio::spawn(async move {
            write_frame(&mut writer, &write_payload, 5 * 1024 * 1024)
                .await
                .unwrap();
        });
        let got = read_frame(&mut reader, 5 * 1024 * 1024).await.unwrap();
        handle.await.unwrap();
        assert_eq!(got, Bytes::from(payload));
    }

    #[tokio::test]
    async fn write_rejects_oversized_payload() {
        let (_reader, mut writer) = Pipe::channel(1);
        let payload = vec![0u8; 16];
        let err = write_frame(&mut writer, &payload, 8).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn read_rejects_declared_length_over_max() {
        let (mut reader, mut writer) = Pipe::channel(8);
        let mut header = BytesMut::with_capacity(4);
        header.put_u32(100);
        writer.write(header.freeze()).await.unwrap();
        let err = read_frame(&mut reader, 8).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn read_fails_on_truncated_frame() {
        let (mut reader, mut writer) = Pipe::channel(8);
        let mut header = BytesMut::with_capacity(4);
        header.put_u32(10);
        writer.write(header.freeze()).await.unwrap();
        writer.write(Bytes::from_static(b"abc")).await.unwrap();
        drop(writer);
        let err = read_frame(&mut reader, 5 * 1024 * 1024).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
