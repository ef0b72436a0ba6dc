//! Output boundary towards storage and notification collaborators

use crate::error::{HeatlinkError, Result};
use crate::poller::Readings;
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Receives the readings of every non-empty poll cycle
#[async_trait::async_trait]
pub trait ReadingSink: Send {
    async fn publish(&mut self, readings: &Readings) -> Result<()>;
}

#[derive(Serialize)]
struct Record<'a> {
    timestamp: String,
    values: &'a Readings,
}

/// One JSON object per cycle, newline separated
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> ReadingSink for JsonLinesSink<W> {
    async fn publish(&mut self, readings: &Readings) -> Result<()> {
        let record = Record {
            timestamp: Utc::now().to_rfc3339(),
            values: readings,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Forwards readings to an in-process consumer
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Readings>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Readings>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl ReadingSink for ChannelSink {
    async fn publish(&mut self, readings: &Readings) -> Result<()> {
        self.tx
            .send(readings.clone())
            .map_err(|_| HeatlinkError::io("Reading consumer has gone away"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SensorValue;

    #[tokio::test]
    async fn json_lines_writes_one_object_per_publish() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let mut readings = Readings::new();
        readings.insert("temp_outside".into(), SensorValue::Float(15.0));
        readings.insert("mode".into(), SensorValue::Int(1));
        readings.insert("mode_str".into(), SensorValue::Text("automatic".into()));
        sink.publish(&readings).await.unwrap();
        sink.publish(&readings).await.unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["values"]["temp_outside"], 15.0);
        assert_eq!(parsed["values"]["mode_str"], "automatic");
        assert!(parsed["timestamp"].is_string());
    }

    #[tokio::test]
    async fn json_lines_streams_through_an_async_pipe() {
        use tokio::io::AsyncBufReadExt;

        let (writer, reader) = tokio::io::duplex(1024);
        let mut sink = JsonLinesSink::new(writer);
        let mut readings = Readings::new();
        readings.insert("temp_flow".into(), SensorValue::Float(35.2));
        sink.publish(&readings).await.unwrap();

        let mut line = String::new();
        tokio::io::BufReader::new(reader)
            .read_line(&mut line)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed["values"]["temp_flow"], 35.2);
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_consumer() {
        let (mut sink, rx) = ChannelSink::channel();
        drop(rx);
        assert!(sink.publish(&Readings::new()).await.is_err());
    }
}
