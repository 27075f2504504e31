//! Capture loop task
//!
//! One iteration: read a frame from the active source, detect, smooth, hand
//! the resulting intent to the actuator. Stop and pause are checked between
//! frames and interrupt any wait.

use super::{PipelineShared, RunState};
use crate::activity_log::LightActivity;
use crate::actuator::{ActuationIntent, IntentSource};
use crate::backoff::Backoff;
use crate::frame_source::{ActiveFrameReader, FrameError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub(crate) async fn run(shared: Arc<PipelineShared>) {
    let mut signal = shared.signal.subscribe();
    let capture = shared.capture.clone();
    let mut source_backoff = Backoff::new(capture.reconnect_base(), capture.reconnect_max());
    let mut read_failures: u32 = 0;

    tracing::info!("Capture loop started");

    loop {
        let state = *signal.borrow_and_update();
        match state {
            RunState::Stopping => break,
            RunState::Paused => {
                if signal.changed().await.is_err() {
                    break;
                }
                continue;
            }
            RunState::Running => {}
        }

        let reader = match shared.registry.active_frame_reader().await {
            Some(reader) => reader,
            None => {
                match shared.registry.activate_selected().await {
                    Ok(source) => {
                        read_failures = 0;
                        shared.status.send_modify(|s| {
                            s.active_camera_id = Some(source.id.clone());
                            s.last_error = None;
                        });
                    }
                    Err(e) => {
                        let delay = source_backoff.next_delay();
                        tracing::warn!(
                            error = %e,
                            retry_in_ms = delay.as_millis() as u64,
                            "Camera source unavailable"
                        );
                        shared.status.send_modify(|s| s.last_error = Some(e.to_string()));
                        if !idle(&mut signal, delay).await {
                            break;
                        }
                    }
                }
                continue;
            }
        };

        let read = tokio::select! {
            read = tokio::time::timeout(capture.read_timeout(), reader.next_frame()) => read,
            _ = signal.changed() => continue,
        };

        let frame = match read {
            Ok(Ok(frame)) => {
                read_failures = 0;
                source_backoff.reset();
                frame
            }
            // Switched away while reading
            Ok(Err(FrameError::Retired)) => continue,
            Ok(Err(FrameError::EndOfStream)) => {
                tracing::info!(camera_id = %reader.camera_id(), "Camera stream ended");
                record_frame_error(&shared, "end of stream".to_string());
                read_failures = 0;
                if !reopen(&shared, &reader, &mut source_backoff, &mut signal).await {
                    break;
                }
                continue;
            }
            Ok(Err(FrameError::Read(message))) => {
                read_failures += 1;
                tracing::warn!(
                    camera_id = %reader.camera_id(),
                    failures = read_failures,
                    error = %message,
                    "Frame read failed"
                );
                record_frame_error(&shared, message);
                if read_failures >= capture.max_read_failures {
                    read_failures = 0;
                    if !reopen(&shared, &reader, &mut source_backoff, &mut signal).await {
                        break;
                    }
                } else if !idle(&mut signal, capture.frame_interval()).await {
                    break;
                }
                continue;
            }
            Err(_) => {
                read_failures += 1;
                tracing::warn!(
                    camera_id = %reader.camera_id(),
                    failures = read_failures,
                    timeout_ms = capture.read_timeout_ms,
                    "Frame read timed out"
                );
                record_frame_error(&shared, "frame read timed out".to_string());
                if read_failures >= capture.max_read_failures {
                    read_failures = 0;
                    if !reopen(&shared, &reader, &mut source_backoff, &mut signal).await {
                        break;
                    }
                }
                continue;
            }
        };

        // Holding the lease keeps a switch from committing mid-frame
        let Some(lease) = shared.registry.begin_processing(reader.generation()).await else {
            tracing::debug!(
                camera_id = %reader.camera_id(),
                sequence = frame.sequence,
                "Discarding frame from retired source"
            );
            continue;
        };

        let observation = match shared.adapter.observe(&frame, shared.clock.now()).await {
            Ok(observation) => observation,
            Err(e) => {
                tracing::warn!(camera_id = %frame.camera_id, error = %e, "Detection failed, frame skipped");
                shared.status.send_modify(|s| {
                    s.detection_errors += 1;
                    s.consecutive_detection_errors += 1;
                    s.last_error = Some(e.to_string());
                });
                continue;
            }
        };

        let (event, state) = {
            let mut smoother = shared.smoother.lock().await;
            let event = smoother.update(observation);
            (event, smoother.state())
        };

        if let Some(event) = event {
            shared.actuator.submit(ActuationIntent::new(
                event.new_target_brightness,
                event.fade_duration_ms,
                IntentSource::Smoothing,
            ));
            shared
                .activity
                .record(
                    LightActivity::new(
                        IntentSource::Smoothing,
                        event.new_target_brightness,
                        event.fade_duration_ms,
                    )
                    .with_camera(frame.camera_id.clone())
                    .with_occupancy(event.occupancy),
                )
                .await;
        }

        shared.status.send_modify(|s| {
            s.active_camera_id = Some(frame.camera_id.clone());
            s.frames_processed += 1;
            s.last_frame_time = Some(frame.captured_at);
            s.occupancy = state.last_observed_count;
            s.current_brightness = state.current_brightness;
            s.target_brightness = state.target_brightness;
            s.smoother_state = state.state_tag;
            s.consecutive_detection_errors = 0;
        });
        drop(lease);
    }

    tracing::info!("Capture loop stopped");
}

fn record_frame_error(shared: &PipelineShared, message: String) {
    shared.status.send_modify(|s| {
        s.frame_errors += 1;
        s.last_error = Some(message);
    });
}

/// Reopen the reader's source, then wait the next backoff delay whether or
/// not the reopen succeeded. The first good frame resets the backoff.
/// Returns `false` if a stop was requested.
async fn reopen(
    shared: &PipelineShared,
    reader: &ActiveFrameReader,
    backoff: &mut Backoff,
    signal: &mut watch::Receiver<RunState>,
) -> bool {
    let delay = backoff.next_delay();
    match shared.registry.reconnect_active(reader.generation()).await {
        Ok(()) => {
            tracing::info!(
                camera_id = %reader.camera_id(),
                attempt = backoff.attempts(),
                next_read_in_ms = delay.as_millis() as u64,
                "Camera reopened"
            );
        }
        Err(e) => {
            tracing::warn!(
                camera_id = %reader.camera_id(),
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Camera reconnect failed"
            );
            shared.status.send_modify(|s| s.last_error = Some(e.to_string()));
        }
    }
    idle(signal, delay).await
}

/// Sleep for `duration`, waking early on a control signal.
/// Returns `false` if a stop was requested.
async fn idle(signal: &mut watch::Receiver<RunState>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = signal.changed() => {}
    }
    *signal.borrow() != RunState::Stopping
}
