//! Stationary-interval detection on a raw accelerometer stream.
//!
//! A sample *qualifies* when its norm is within `threshold` of 1 g. The
//! detector counts consecutive qualifying samples and declares the sensor
//! static once that count exceeds `frequency × static_time`. While static,
//! the gravity estimate is the running mean of every sample since the
//! static interval began.

use nalgebra::Vector3;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_STATIC_TIME: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticDetectorConfig {
    /// Sampling frequency (Hz).
    pub frequency: f64,
    /// Largest tolerated `| ‖a‖ − 1 |`, in g.
    pub threshold: f64,
    /// Minimum length of a qualifying run before it counts as static (s).
    pub static_time: f64,
    /// Treat the sensor as having been at rest for one second before the
    /// first sample.
    pub start_static: bool,
}

impl StaticDetectorConfig {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            threshold: DEFAULT_THRESHOLD,
            static_time: DEFAULT_STATIC_TIME,
            start_static: false,
        }
    }
}

/// Per-sample classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    /// Sample outside the threshold.
    Moving,
    /// Qualifying sample, but the run is still shorter than `static_time`.
    Settling,
    Static,
}

impl Motion {
    /// Encoding used in static masks: 1 static, 0.5 settling, 0 moving.
    pub fn mask_value(self) -> f64 {
        match self {
            Self::Moving => 0.0,
            Self::Settling => 0.5,
            Self::Static => 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub motion: Motion,
    /// `true` only on the sample where a static interval begins.
    pub entered_static: bool,
    /// Gravity estimate after this sample, in g.
    pub gravity: Vector3<f64>,
}

#[derive(Clone, Copy, Debug)]
struct GravityWindow {
    start: usize,
    sum: Vector3<f64>,
    count: usize,
}

impl GravityWindow {
    fn mean(&self) -> Vector3<f64> {
        self.sum / self.count as f64
    }
}

#[derive(Clone, Debug)]
pub struct StaticDetector {
    config: StaticDetectorConfig,
    counter: u64,
    samples_seen: usize,
    window: Option<GravityWindow>,
    gravity: Option<Vector3<f64>>,
}

impl StaticDetector {
    pub fn new(config: StaticDetectorConfig) -> Self {
        let counter = if config.start_static {
            config.frequency.ceil() as u64
        } else {
            0
        };
        Self {
            config,
            counter,
            samples_seen: 0,
            window: None,
            gravity: None,
        }
    }

    pub fn config(&self) -> &StaticDetectorConfig {
        &self.config
    }

    /// Consecutive qualifying samples seen so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn is_static(&self) -> bool {
        self.counter as f64 > self.config.frequency * self.config.static_time
    }

    /// Current gravity estimate; `None` until the first sample.
    pub fn gravity(&self) -> Option<Vector3<f64>> {
        self.gravity
    }

    /// Index of the sample that opened the current static interval.
    pub fn static_since(&self) -> Option<usize> {
        self.window.map(|w| w.start)
    }

    pub fn classify(&mut self, observation: &Vector3<f64>) -> Classification {
        let index = self.samples_seen;
        self.samples_seen += 1;
        let mut gravity = *self.gravity.get_or_insert(*observation);

        let deviation = (observation.norm() - 1.0).abs();
        if deviation >= self.config.threshold {
            if let Some(window) = self.window.take() {
                debug!(
                    start = window.start,
                    end = index,
                    "static interval ended"
                );
            }
            self.counter = 0;
            return Classification {
                motion: Motion::Moving,
                entered_static: false,
                gravity,
            };
        }

        self.counter = self.counter.saturating_add(1);
        if !self.is_static() {
            return Classification {
                motion: Motion::Settling,
                entered_static: false,
                gravity,
            };
        }

        let entered_static = self.window.is_none();
        let window = self.window.get_or_insert(GravityWindow {
            start: index,
            sum: Vector3::zeros(),
            count: 0,
        });
        window.sum += observation;
        window.count += 1;
        gravity = window.mean();
        self.gravity = Some(gravity);

        if entered_static {
            debug!(index, gravity = ?gravity, "static interval started");
        }

        Classification {
            motion: Motion::Static,
            entered_static,
            gravity,
        }
    }
}
