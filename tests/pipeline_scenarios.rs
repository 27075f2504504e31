//! End-to-end pipeline scenarios
//!
//! Scripted cameras and detector, simulated transport, paused tokio time.

use async_trait::async_trait;
use chrono::Utc;
use occupancy_lighting::{
    activity_log::ActivityLog,
    actuator::{
        spawn_actuator, transport::SimulatedTransport, ActuatorConfig, ActuatorHandle,
        LightActuator, MIN_SAFE_DURATION_MS,
    },
    clock::SystemClock,
    detection::{Detection, DetectionAdapter, Detector, FilterPolicy},
    frame_source::{CameraSource, Frame, FrameError, FrameSourceRegistry, FrameStream, SourceConnector},
    orchestrator::{CaptureConfig, OrchestratorSettings, PipelineOrchestrator},
    smoother::{BrightnessMapping, OccupancySmoother, SmootherConfig, StateTag},
    Error, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Frame byte that makes the scripted detector fail
const DETECTOR_FAILURE: u8 = 255;
/// Script entries that make the stream itself fail instead of yielding a frame
const READ_ERROR: u8 = 254;
const END_OF_STREAM: u8 = 253;
const HANG: u8 = 252;

/// One scripted frame: wait `delay_ms`, then yield a frame showing `count` people
type Script = Vec<(u64, u8)>;

struct ScriptedConnector {
    /// Script per connection: the n-th connect plays the n-th script, the
    /// last script is reused for later connects
    scripts: HashMap<String, Vec<Script>>,
    /// Spacing of frames once a script is exhausted (last count repeats)
    repeat_every: Duration,
    connects: Arc<Mutex<Vec<(String, Instant)>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

struct ScriptedStream {
    camera_id: String,
    script: Script,
    position: usize,
    sequence: u64,
    repeat_every: Duration,
    closed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn next_frame(&mut self) -> std::result::Result<Frame, FrameError> {
        let (delay, count) = match self.script.get(self.position) {
            Some(step) => {
                self.position += 1;
                (Duration::from_millis(step.0), step.1)
            }
            None => {
                let last = self.script.last().map(|s| s.1).unwrap_or(0);
                (self.repeat_every, last)
            }
        };
        tokio::time::sleep(delay).await;
        match count {
            READ_ERROR => return Err(FrameError::Read("scripted read error".to_string())),
            END_OF_STREAM => return Err(FrameError::EndOfStream),
            HANG => std::future::pending::<()>().await,
            _ => {}
        }
        self.sequence += 1;
        Ok(Frame {
            camera_id: self.camera_id.clone(),
            sequence: self.sequence,
            data: vec![count],
            captured_at: Utc::now(),
        })
    }

    async fn close(&mut self) {
        self.closed.lock().unwrap().push(self.camera_id.clone());
    }
}

#[async_trait]
impl SourceConnector for ScriptedConnector {
    async fn connect(&self, source: &CameraSource) -> Result<Box<dyn FrameStream>> {
        let scripts = self
            .scripts
            .get(&source.id)
            .ok_or_else(|| Error::SourceConnect {
                camera_id: source.id.clone(),
                message: "no script".to_string(),
            })?;
        let script = {
            let mut connects = self.connects.lock().unwrap();
            let attempt = connects.iter().filter(|(id, _)| *id == source.id).count();
            connects.push((source.id.clone(), Instant::now()));
            scripts[attempt.min(scripts.len() - 1)].clone()
        };
        Ok(Box::new(ScriptedStream {
            camera_id: source.id.clone(),
            script,
            position: 0,
            sequence: 0,
            repeat_every: self.repeat_every,
            closed: self.closed.clone(),
        }))
    }
}

/// Reports one person per unit in the first frame byte
#[derive(Default)]
struct ScriptedDetector {
    seen: Mutex<Vec<String>>,
}

impl ScriptedDetector {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        self.seen.lock().unwrap().push(frame.camera_id.clone());
        let count = frame.data.first().copied().unwrap_or(0);
        if count == DETECTOR_FAILURE {
            return Err(Error::Detection("scripted failure".to_string()));
        }
        Ok((0..count)
            .map(|_| Detection::new("person", 0.9, 2500.0))
            .collect())
    }
}

struct Harness {
    orchestrator: PipelineOrchestrator,
    actuator: Arc<ActuatorHandle>,
    transport: Arc<SimulatedTransport>,
    detector: Arc<ScriptedDetector>,
    connects: Arc<Mutex<Vec<(String, Instant)>>>,
    closed: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Connect times of `camera_id`, oldest first
    fn connects_of(&self, camera_id: &str) -> Vec<Instant> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == camera_id)
            .map(|(_, at)| *at)
            .collect()
    }
}

async fn harness(cameras: Vec<(&str, Script)>) -> Harness {
    let cameras = cameras
        .into_iter()
        .map(|(id, script)| (id, vec![script]))
        .collect();
    harness_with(cameras, BrightnessMapping::default()).await
}

async fn harness_with(cameras: Vec<(&str, Vec<Script>)>, mapping: BrightnessMapping) -> Harness {
    let connects = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(Mutex::new(Vec::new()));
    let connector = Arc::new(ScriptedConnector {
        scripts: cameras
            .iter()
            .map(|(id, scripts)| (id.to_string(), scripts.clone()))
            .collect(),
        repeat_every: Duration::from_millis(500),
        connects: connects.clone(),
        closed: closed.clone(),
    });
    let registry = Arc::new(FrameSourceRegistry::new(connector));
    for (id, _) in &cameras {
        registry
            .register(CameraSource::new(*id, id.to_uppercase(), format!("http://cams/{}", id)))
            .await
            .unwrap();
    }

    let detector = Arc::new(ScriptedDetector::default());
    let adapter = Arc::new(DetectionAdapter::new(detector.clone(), FilterPolicy::default()));

    let transport = Arc::new(SimulatedTransport::new());
    let actuator = Arc::new(spawn_actuator(
        LightActuator::new(transport.clone(), ActuatorConfig::default()),
        Arc::new(SystemClock),
    ));

    let orchestrator = PipelineOrchestrator::new(
        registry,
        adapter,
        OccupancySmoother::new(mapping, SmootherConfig::default()),
        actuator.clone(),
        Arc::new(ActivityLog::default()),
        Arc::new(SystemClock),
        OrchestratorSettings {
            capture: CaptureConfig::default(),
            turn_off_on_stop: true,
        },
    );

    Harness {
        orchestrator,
        actuator,
        transport,
        detector,
        connects,
        closed,
    }
}

fn color_for(count: u32) -> String {
    occupancy_lighting::actuator::ChannelLayout::White.encode(BrightnessMapping::default().map(count))
}

#[tokio::test(start_paused = true)]
async fn test_brief_absence_yields_one_ramp() {
    let h = harness(vec![("lobby", vec![(0, 0), (0, 3), (100, 0), (1900, 3)])]).await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(6)).await;

    let published = h.transport.published();
    assert_eq!(published.len(), 1, "published: {:?}", published);
    let payload = published[0].light_payload().unwrap();
    assert_eq!(payload.all, color_for(3));
    assert!(payload.duration >= MIN_SAFE_DURATION_MS);

    let status = h.orchestrator.status();
    assert!(status.running);
    assert_eq!(status.active_camera_id.as_deref(), Some("lobby"));
    assert_eq!(status.occupancy, 3);
    assert!(status.frames_processed >= 4);
}

#[tokio::test(start_paused = true)]
async fn test_empty_room_turns_off_after_delay() {
    let h = harness(vec![("lobby", vec![(0, 2), (500, 0)])]).await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.published().len(), 1);
    assert_eq!(h.orchestrator.status().smoother_state, StateTag::RampDown);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let published = h.transport.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1].light_payload().unwrap().all, "00000000");
}

#[tokio::test(start_paused = true)]
async fn test_switch_stops_processing_old_camera() {
    let h = harness(vec![
        ("lobby", vec![(0, 1)]),
        ("hall", vec![(0, 4)]),
    ])
    .await;
    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.detector.seen().iter().all(|id| id == "lobby"));

    let outcome = h.orchestrator.switch_camera("hall").await.unwrap();
    assert!(outcome.processing_resumed);
    assert_eq!(outcome.camera_name, "HALL");
    let processed_before = h.detector.seen().len();

    tokio::time::sleep(Duration::from_secs(3)).await;

    let after: Vec<String> = h.detector.seen()[processed_before..].to_vec();
    assert!(!after.is_empty());
    assert!(after.iter().all(|id| id == "hall"), "frames after switch: {:?}", after);
    assert_eq!(*h.closed.lock().unwrap(), vec!["lobby".to_string()]);

    let status = h.orchestrator.status();
    assert_eq!(status.active_camera_id.as_deref(), Some("hall"));
    let cameras = h.orchestrator.registry().list_sources().await;
    assert_eq!(cameras.iter().filter(|c| c.is_active).count(), 1);
    assert!(cameras[1].is_active);
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_unknown_camera_keeps_current() {
    let h = harness(vec![("lobby", vec![(0, 1)])]).await;
    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let result = h.orchestrator.switch_camera("garage").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(
        h.orchestrator.registry().active_camera_id().await.as_deref(),
        Some("lobby")
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_while_stopped_only_selects() {
    let h = harness(vec![("lobby", vec![(0, 1)]), ("hall", vec![(0, 2)])]).await;

    let outcome = h.orchestrator.switch_camera("hall").await.unwrap();
    assert!(!outcome.processing_resumed);
    assert!(h.orchestrator.registry().active_camera_id().await.is_none());

    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        h.orchestrator.status().active_camera_id.as_deref(),
        Some("hall")
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_outage_publishes_once_on_recovery() {
    let h = harness(vec![("lobby", vec![(0, 3)])]).await;
    h.transport.fail_next(3);
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(h.transport.attempts(), 4);
    let published = h.transport.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].light_payload().unwrap().all, color_for(3));

    let light = h.orchestrator.status().light.unwrap();
    assert!(light.connected);
    assert_eq!(light.failed_publishes, 3);
    assert_eq!(light.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_overrides_respect_cooldown() {
    let h = harness(vec![("lobby", vec![(0, 0)])]).await;

    h.orchestrator.manual_override(40).await.unwrap();
    assert!(h.actuator.settle(Duration::from_secs(5)).await);
    h.orchestrator.manual_override(60).await.unwrap();
    h.orchestrator.manual_override(150).await.unwrap();
    assert!(h.actuator.settle(Duration::from_secs(5)).await);

    let published = h.transport.published();
    assert_eq!(published.len(), 2);
    assert!(published[1].at - published[0].at >= Duration::from_millis(1000));
    assert_eq!(published[1].light_payload().unwrap().all, "000000ff");

    let activity = h.orchestrator.activity().latest(10).await;
    assert_eq!(activity.len(), 3);
    assert_eq!(activity[0].brightness, 100);
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_source_and_turns_off() {
    let h = harness(vec![("lobby", vec![(0, 3)])]).await;
    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    h.orchestrator.stop().await.unwrap();
    assert!(h.actuator.settle(Duration::from_secs(5)).await);

    let published = h.transport.published();
    assert_eq!(published.len(), 2);
    let off = published[1].light_payload().unwrap();
    assert_eq!(off.all, "00000000");
    assert!(off.duration >= MIN_SAFE_DURATION_MS);

    let status = h.orchestrator.status();
    assert!(!status.running);
    assert!(status.active_camera_id.is_none());
    assert!(h.orchestrator.registry().active_camera_id().await.is_none());
    assert_eq!(*h.closed.lock().unwrap(), vec!["lobby".to_string()]);

    // Restarting with people present turns the lights back on
    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.transport.published().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_detection_failures_are_skipped_and_counted() {
    let h = harness(vec![(
        "lobby",
        vec![(0, DETECTOR_FAILURE), (100, DETECTOR_FAILURE), (100, 2)],
    )])
    .await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.detection_errors, 2);
    assert_eq!(status.consecutive_detection_errors, 2);
    assert!(h.transport.published().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.consecutive_detection_errors, 0);
    assert_eq!(h.transport.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_frame_processing() {
    let h = harness(vec![("lobby", vec![(0, 1)])]).await;
    h.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    h.orchestrator.pause().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let processed = h.orchestrator.status().frames_processed;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.orchestrator.status().frames_processed, processed);
    assert!(h.orchestrator.status().paused);
    assert!(h.orchestrator.registry().active_camera_id().await.is_some());

    h.orchestrator.resume().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.orchestrator.status().frames_processed > processed);
}

#[tokio::test]
async fn test_start_without_cameras_is_rejected() {
    let h = harness(vec![]).await;
    assert!(matches!(h.orchestrator.start().await, Err(Error::Validation(_))));
    assert!(matches!(h.orchestrator.pause().await, Err(Error::Validation(_))));
}

#[tokio::test(start_paused = true)]
async fn test_manual_override_stays_in_configured_range() {
    let mapping = BrightnessMapping {
        min_brightness: 20,
        max_brightness: 60,
        ..Default::default()
    };
    let h = harness_with(vec![("lobby", vec![vec![(0, 0)]])], mapping).await;

    let outcome = h.orchestrator.manual_override(100).await.unwrap();
    assert_eq!(outcome.brightness, 60);
    assert!(h.actuator.settle(Duration::from_secs(5)).await);

    let outcome = h.orchestrator.manual_override(5).await.unwrap();
    assert_eq!(outcome.brightness, 20);
    assert!(h.actuator.settle(Duration::from_secs(5)).await);

    let outcome = h.orchestrator.manual_override(0).await.unwrap();
    assert_eq!(outcome.brightness, 0);
    assert!(h.actuator.settle(Duration::from_secs(5)).await);

    let published: Vec<String> = h
        .transport
        .published()
        .iter()
        .map(|m| m.light_payload().unwrap().all)
        .collect();
    assert_eq!(published, vec!["00000099", "00000033", "00000000"]);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_stream_reopens_same_source_with_backoff() {
    let h = harness_with(
        vec![
            ("lobby", vec![vec![(0, END_OF_STREAM)]]),
            ("hall", vec![vec![(0, 2)]]),
        ],
        BrightnessMapping::default(),
    )
    .await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(8)).await;

    assert!(h.connects_of("hall").is_empty());
    let connects = h.connects_of("lobby");
    assert!(
        (4..=6).contains(&connects.len()),
        "lobby connects: {}",
        connects.len()
    );
    let gaps: Vec<Duration> = connects.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(
        gaps.windows(2).all(|w| w[1] >= w[0]),
        "reconnect gaps shrank: {:?}",
        gaps
    );
    assert!(*gaps.last().unwrap() >= Duration::from_secs(2));

    let status = h.orchestrator.status();
    assert_eq!(status.frames_processed, 0);
    assert!(status.frame_errors >= 3);
    assert_eq!(status.active_camera_id.as_deref(), Some("lobby"));
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_reopen_after_limit_then_resume() {
    let h = harness_with(
        vec![(
            "lobby",
            vec![
                vec![(0, READ_ERROR), (0, READ_ERROR), (0, READ_ERROR)],
                vec![(0, 2)],
            ],
        )],
        BrightnessMapping::default(),
    )
    .await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(900)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.frame_errors, 2);
    assert_eq!(h.connects_of("lobby").len(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.frame_errors, 3);
    assert_eq!(h.connects_of("lobby").len(), 2);
    assert!(status.frames_processed > 0);
    assert_eq!(status.occupancy, 2);
    assert_eq!(h.transport.published().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_read_times_out_and_reopens() {
    let h = harness_with(
        vec![("lobby", vec![vec![(0, HANG)], vec![(0, 1)]])],
        BrightnessMapping::default(),
    )
    .await;
    h.orchestrator.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(12)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.frame_errors, 2);
    assert_eq!(status.frames_processed, 0);
    assert_eq!(status.last_error.as_deref(), Some("frame read timed out"));

    tokio::time::sleep(Duration::from_secs(6)).await;
    let status = h.orchestrator.status();
    assert_eq!(status.frame_errors, 3);
    assert_eq!(h.connects_of("lobby").len(), 2);
    assert!(status.frames_processed > 0);
    assert_eq!(h.transport.published().len(), 1);
}
