use conflate_types::OutputFeature;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::error::{ConflateError, ConflateResult};

/// Line-delimited JSON writer for output features.
pub struct FeatureWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
    written: u64,
}

impl<W: AsyncWrite + Unpin> FeatureWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            written: 0,
        }
    }

    pub async fn write(&mut self, feature: &OutputFeature) -> ConflateResult<()> {
        write_json_line(&mut self.inner, feature).await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn finish(mut self) -> ConflateResult<W> {
        self.inner.flush().await.map_err(sink_error)?;
        Ok(self.inner.into_inner())
    }
}

#[derive(Serialize)]
struct RejectedLine<'a> {
    ordinal: u64,
    reason: &'a str,
    line: &'a str,
}

/// Writer for lines rejected by workers.
pub struct RejectWriter<W: AsyncWrite + Unpin> {
    inner: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> RejectWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
        }
    }

    pub async fn write(&mut self, ordinal: u64, reason: &str, line: &str) -> ConflateResult<()> {
        write_json_line(&mut self.inner, &RejectedLine { ordinal, reason, line }).await
    }

    pub async fn finish(mut self) -> ConflateResult<W> {
        self.inner.flush().await.map_err(sink_error)?;
        Ok(self.inner.into_inner())
    }
}

async fn write_json_line<W, T>(out: &mut W, value: &T) -> ConflateResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(value)
        .map_err(|e| ConflateError::Transport(format!("cannot encode output line: {e}")))?;
    line.push(b'\n');
    out.write_all(&line).await.map_err(sink_error)?;
    Ok(())
}

fn sink_error(e: std::io::Error) -> ConflateError {
    ConflateError::Transport(format!("output sink: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflate_types::{InputRecord, Point, StreetName};

    #[tokio::test]
    async fn writes_one_feature_per_line() {
        let mut out = FeatureWriter::new(Vec::new());
        let rec = InputRecord::new("1", vec![StreetName::new("A St", 0)], Point::new(1.0, 2.0).unwrap());
        out.write(&OutputFeature::create(rec.clone())).await.unwrap();
        out.write(&OutputFeature::create(rec)).await.unwrap();
        assert_eq!(out.written(), 2);

        let buf = out.finish().await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["action"], "create");
    }

    #[tokio::test]
    async fn reject_line_shape() {
        let mut out = RejectWriter::new(Vec::new());
        out.write(4, "malformed JSON", "{oops").await.unwrap();
        let buf = out.finish().await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v, serde_json::json!({"ordinal": 4, "reason": "malformed JSON", "line": "{oops"}));
    }

    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
            _: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn broken_sink_is_transport_error() {
        let mut out = FeatureWriter::new(ClosedPipe);
        let rec = InputRecord::new("1", vec![StreetName::new("A St", 0)], Point::new(1.0, 2.0).unwrap());
        // Buffered: the failure surfaces on flush at the latest.
        let result = match out.write(&OutputFeature::create(rec)).await {
            Err(e) => Err(e),
            Ok(()) => out.finish().await.map(|_| ()),
        };
        assert!(matches!(result, Err(ConflateError::Transport(msg)) if msg.starts_with("output sink")));
    }
}
