//! Fixed-rate republisher for the map→odom transform.
//!
//! The scan callback only stores the transform; this thread hands it to a
//! caller-supplied sink at the configured rate, forward-dating each
//! broadcast by `transform_tolerance` so downstream consumers can keep
//! interpolating between updates.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, select, tick, Sender};
use log::debug;

use crate::core::types::Pose2D;

use super::localizer::Localizer;

/// One transform broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformBroadcast {
    /// Parent frame of the transform.
    pub parent_frame: String,
    /// Child frame of the transform.
    pub child_frame: String,
    /// The rigid transform from parent to child.
    pub transform: Pose2D,
    /// Wall-clock expiration, microseconds since the epoch.
    pub expiration_us: u64,
}

/// Handle to the running publisher thread.
pub struct TransformPublisher {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TransformPublisher {
    /// Spawn the publisher.
    ///
    /// `sink` is invoked at `transform_publish_rate` with the latest
    /// transform whenever one exists; frames follow `tf_reverse`.
    pub fn spawn<F>(localizer: Arc<Localizer>, sink: F) -> Self
    where
        F: Fn(TransformBroadcast) + Send + 'static,
    {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("tf-publisher".to_string())
            .spawn(move || {
                let (rate, tolerance, global_frame, odom_frame, reverse) =
                    localizer.transform_publish_params();
                let period = Duration::from_secs_f64(1.0 / rate);
                let tolerance_us = (tolerance * 1e6) as u64;
                let (parent, child) = if reverse {
                    (odom_frame, global_frame)
                } else {
                    (global_frame, odom_frame)
                };
                let ticker = tick(period);

                loop {
                    select! {
                        recv(shutdown_rx) -> _ => {
                            debug!("transform publisher shutting down");
                            return;
                        }
                        recv(ticker) -> _ => {
                            if let Some(transform) = localizer.published_transform() {
                                let now_us = SystemTime::now()
                                    .duration_since(UNIX_EPOCH)
                                    .map(|d| d.as_micros() as u64)
                                    .unwrap_or(0);
                                sink(TransformBroadcast {
                                    parent_frame: parent.clone(),
                                    child_frame: child.clone(),
                                    transform,
                                    expiration_us: now_us + tolerance_us,
                                });
                            }
                        }
                    }
                }
            })
            .expect("spawn tf-publisher thread");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TransformPublisher {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
