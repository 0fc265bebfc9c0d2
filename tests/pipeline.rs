use sensor_bridge::chart_feed::{ChartFeed, ChartRenderer, RetentionPolicy, SeriesData};
use sensor_bridge::classifier::{classify, unix_now};
use sensor_bridge::models::{Point, Reading, SensorType};
use sensor_bridge::mqtt_service::InboundMessage;
use sensor_bridge::payload::encode_reading;
use sensor_bridge::subscriber::ConnectionProfile;

#[derive(Default)]
struct RecordingRenderer {
    updates: Vec<Vec<SeriesData>>,
}

impl ChartRenderer for RecordingRenderer {
    fn render(&mut self) {}

    fn update_series(&mut self, series: &[SeriesData]) {
        self.updates.push(series.to_vec());
    }
}

fn published(reading: &Reading) -> InboundMessage {
    InboundMessage {
        topic: reading.topic(),
        payload: encode_reading(reading).unwrap(),
    }
}

#[test]
fn test_published_readings_reach_the_chart() {
    let mut feed = ChartFeed::new(
        ConnectionProfile::default(),
        RetentionPolicy::MostRecent(10),
        RecordingRenderer::default(),
    );

    for (value, timestamp) in [(23.0, 1000), (24.0, 1005)] {
        let reading = Reading {
            sensor_type: SensorType::Temperature,
            value,
            timestamp,
        };
        let message = published(&reading);
        assert_eq!(message.topic, "sensor/temperature");
        feed.handle_message(&message).unwrap();
    }

    let expected = vec![Point { x: 1000, y: 23 }, Point { x: 1005, y: 24 }];
    assert_eq!(feed.buffer("sensor/temperature").unwrap().to_vec(), expected);

    let updates = &feed.renderer().updates;
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0][0].data, expected[..1].to_vec());
    assert_eq!(updates[1][0].data, expected);
}

#[test]
fn test_classified_line_is_published_on_its_topic() {
    let before = unix_now();
    let reading = classify("Humidity: 61.9", unix_now()).unwrap();

    assert_eq!(reading.sensor_type, SensorType::Humidity);
    assert_eq!(reading.value, 61.9);
    assert!(reading.timestamp >= before);
    assert_eq!(published(&reading).topic, "sensor/humidity");
}

#[test]
fn test_nan_reading_is_rejected_by_the_dashboard() {
    let mut feed = ChartFeed::new(
        ConnectionProfile::default(),
        RetentionPolicy::Unbounded,
        RecordingRenderer::default(),
    );
    let reading = classify("Temperature: --", 1000).unwrap();

    assert!(feed.handle_message(&published(&reading)).is_err());
    assert!(feed.renderer().updates.is_empty());
}

#[test]
fn test_bounded_history_keeps_the_ten_newest_points() {
    let mut feed = ChartFeed::new(
        ConnectionProfile::default(),
        RetentionPolicy::MostRecent(10),
        RecordingRenderer::default(),
    );
    for t in 0..15 {
        let reading = Reading {
            sensor_type: SensorType::Humidity,
            value: 40.0 + t as f64,
            timestamp: 2000 + t,
        };
        feed.handle_message(&published(&reading)).unwrap();
    }

    let retained = feed.buffer("sensor/humidity").unwrap().to_vec();
    let xs: Vec<i64> = retained.iter().map(|p| p.x).collect();
    assert_eq!(xs, (2005..2015).collect::<Vec<_>>());
    assert_eq!(feed.renderer().updates.len(), 15);
}
