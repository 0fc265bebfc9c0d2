use crate::models::{InboundReading, Point};
use crate::mqtt_service::InboundMessage;
use crate::payload::{decode_reading, PayloadError};
use crate::subscriber::ConnectionProfile;
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("No series is fed by topic '{0}'")]
    UnknownTopic(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Full contents of one chart series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesData {
    pub name: String,
    pub data: Vec<Point>,
}

/// The chart widget boundary. `update_series` always receives every series
/// with its complete point list, replacing whatever was drawn before.
pub trait ChartRenderer {
    fn render(&mut self);
    fn update_series(&mut self, series: &[SeriesData]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Unbounded,
    MostRecent(usize),
}

impl From<Option<usize>> for RetentionPolicy {
    fn from(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => RetentionPolicy::MostRecent(n),
            None => RetentionPolicy::Unbounded,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesBuffer {
    points: VecDeque<Point>,
}

impl SeriesBuffer {
    pub fn push(&mut self, point: Point) {
        self.points.push_back(point);
    }

    /// Keep the `n` most recent points.
    pub fn trim_to(&mut self, n: usize) {
        let excess = self.points.len().saturating_sub(n);
        self.points.drain(..excess);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_vec(&self) -> Vec<Point> {
        self.points.iter().copied().collect()
    }
}

/// Per-series history for one dashboard, redrawn in full after every append.
pub struct ChartFeed<R: ChartRenderer> {
    profile: ConnectionProfile,
    buffers: Vec<SeriesBuffer>,
    retention: RetentionPolicy,
    renderer: R,
}

impl<R: ChartRenderer> ChartFeed<R> {
    pub fn new(profile: ConnectionProfile, retention: RetentionPolicy, renderer: R) -> Self {
        let buffers = vec![SeriesBuffer::default(); profile.series.len()];
        Self {
            profile,
            buffers,
            retention,
            renderer,
        }
    }

    /// Initial draw.
    pub fn render(&mut self) {
        self.renderer.render();
    }

    /// Decode an inbound message and apply it. Rejected messages leave the
    /// buffers and the chart untouched.
    pub fn handle_message(&mut self, message: &InboundMessage) -> Result<(), FeedError> {
        let index = self
            .profile
            .series_index(&message.topic)
            .ok_or_else(|| FeedError::UnknownTopic(message.topic.clone()))?;
        let reading = decode_reading(&message.payload)?;
        self.append(index, &reading);
        Ok(())
    }

    /// Append a decoded reading to the series fed by `topic`.
    pub fn apply(&mut self, topic: &str, reading: &InboundReading) -> Result<(), FeedError> {
        let index = self
            .profile
            .series_index(topic)
            .ok_or_else(|| FeedError::UnknownTopic(topic.to_string()))?;
        self.append(index, reading);
        Ok(())
    }

    fn append(&mut self, index: usize, reading: &InboundReading) {
        let point = Point::from(reading);
        debug!(
            "{} <- {} (x={}, y={})",
            self.profile.series[index].name, reading.sensor, point.x, point.y
        );
        self.buffers[index].push(point);

        let snapshot = self.merge();
        self.renderer.update_series(&snapshot);
    }

    /// Join every series into one snapshot, applying retention to all of them together.
    fn merge(&mut self) -> Vec<SeriesData> {
        if let RetentionPolicy::MostRecent(n) = self.retention {
            for buffer in &mut self.buffers {
                buffer.trim_to(n);
            }
        }

        self.profile
            .series
            .iter()
            .zip(&self.buffers)
            .map(|(spec, buffer)| SeriesData {
                name: spec.name.clone(),
                data: buffer.to_vec(),
            })
            .collect()
    }

    pub fn buffer(&self, topic: &str) -> Option<&SeriesBuffer> {
        self.profile.series_index(topic).map(|i| &self.buffers[i])
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

/// Terminal stand-in for the chart widget: logs each redraw.
#[derive(Debug, Default)]
pub struct LogRenderer {
    updates: usize,
}

impl ChartRenderer for LogRenderer {
    fn render(&mut self) {
        info!("Chart rendered.");
    }

    fn update_series(&mut self, series: &[SeriesData]) {
        self.updates += 1;
        for s in series {
            match s.data.last() {
                Some(last) => info!(
                    "[update {}] {}: {} points, latest {} @ {}",
                    self.updates,
                    s.name,
                    s.data.len(),
                    last.y,
                    last.x
                ),
                None => info!("[update {}] {}: no data", self.updates, s.name),
            }
        }
        match serde_json::to_string(series) {
            Ok(json) => debug!("series: {}", json),
            Err(e) => warn!("Could not serialize series: {}", e),
        }
    }
}
