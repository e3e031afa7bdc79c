//! Phase clock for the ribbon preview.
//!
//! The scheduler never hands wall-clock seconds to the shader. It accumulates
//! `dt * speed` into a phase wrapped to [`LOOP_SECONDS`] and submits the
//! normalised value in `[0, 1)`, which is what keeps integer-speed motion
//! seam-free at the wrap.

use std::time::Instant;

use ribbonconfig::ParameterSet;
use tracing::debug;

/// Real-time length of one seamless animation cycle at speed 1.0.
pub const LOOP_SECONDS: f64 = 20.0;

const NORMAL_SPEED: f64 = 1.0;
const FALLBACK_MAX_DELTA: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSettings {
    /// Target speed while hovered.
    pub hover_slowdown: f64,
    /// Smoothing time constant in seconds; zero snaps immediately.
    pub smooth_time: f64,
    /// Largest step a single tick may take, in seconds.
    pub max_delta: f64,
    pub log_stats: bool,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self::from_params(&ParameterSet::default())
    }
}

impl MotionSettings {
    pub fn from_params(params: &ParameterSet) -> Self {
        let finite_or = |value: f64, fallback: f64| {
            if value.is_finite() {
                value
            } else {
                fallback
            }
        };
        let max_delta = finite_or(params.performance.max_delta_time, FALLBACK_MAX_DELTA);
        Self {
            hover_slowdown: finite_or(params.interaction.hover_slowdown, NORMAL_SPEED).max(0.0),
            smooth_time: finite_or(params.interaction.smooth_time, 0.0).max(0.0),
            max_delta: if max_delta > 0.0 {
                max_delta
            } else {
                FALLBACK_MAX_DELTA
            },
            log_stats: params.performance.debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    pub playback: Playback,
    /// Accumulated phase in seconds, always in `[0, LOOP_SECONDS)`.
    pub phase_seconds: f64,
    pub current_speed: f64,
    pub target_speed: f64,
    pub last_frame: Option<Instant>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            playback: Playback::Stopped,
            phase_seconds: 0.0,
            current_speed: NORMAL_SPEED,
            target_speed: NORMAL_SPEED,
            last_frame: None,
        }
    }
}

/// Whatever consumes the normalised phase each frame.
pub trait DrawTarget {
    type Error;

    fn draw_frame(&mut self, phase: f32) -> Result<(), Self::Error>;
}

#[derive(Debug, Default)]
struct FrameStats {
    frames: u32,
    elapsed: f64,
}

#[derive(Debug, Default)]
pub struct AnimationScheduler {
    state: RenderState,
    motion: MotionSettings,
    hovered: bool,
    stats: FrameStats,
}

impl AnimationScheduler {
    pub fn new(motion: MotionSettings) -> Self {
        Self {
            motion,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn motion(&self) -> MotionSettings {
        self.motion
    }

    pub fn is_running(&self) -> bool {
        self.state.playback == Playback::Running
    }

    /// Starts ticking. The first frame after a start advances by zero so a
    /// long pause never turns into a jump.
    pub fn start(&mut self) {
        if self.state.playback == Playback::Stopped {
            self.state.playback = Playback::Running;
            self.state.last_frame = None;
            debug!(phase = self.state.phase_seconds, "animation started");
        }
    }

    pub fn stop(&mut self) {
        if self.state.playback == Playback::Running {
            self.state.playback = Playback::Stopped;
            debug!(phase = self.state.phase_seconds, "animation stopped");
        }
    }

    pub fn pointer_enter(&mut self) {
        self.hovered = true;
        self.state.target_speed = self.motion.hover_slowdown;
    }

    pub fn pointer_leave(&mut self) {
        self.hovered = false;
        self.state.target_speed = NORMAL_SPEED;
    }

    pub fn set_motion(&mut self, motion: MotionSettings) {
        self.motion = motion;
        if self.hovered {
            self.state.target_speed = motion.hover_slowdown;
        }
    }

    /// Phase as submitted to the shader, strictly below `1.0`.
    pub fn normalized_phase(&self) -> f32 {
        let value = (self.state.phase_seconds / LOOP_SECONDS) as f32;
        if value < 1.0 {
            value
        } else {
            0.0
        }
    }

    /// Advances by `dt` seconds and draws. Returns `Ok(false)` without
    /// touching anything while stopped.
    pub fn tick<T: DrawTarget>(&mut self, dt: f64, target: &mut T) -> Result<bool, T::Error> {
        if !self.is_running() {
            return Ok(false);
        }

        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.motion.max_delta)
        } else {
            0.0
        };

        let state = &mut self.state;
        if self.motion.smooth_time > 0.0 {
            let blend = 1.0 - (-dt / self.motion.smooth_time).exp();
            state.current_speed += (state.target_speed - state.current_speed) * blend;
        } else {
            state.current_speed = state.target_speed;
        }

        let mut phase = (state.phase_seconds + dt * state.current_speed).rem_euclid(LOOP_SECONDS);
        if !(0.0..LOOP_SECONDS).contains(&phase) {
            phase = 0.0;
        }
        state.phase_seconds = phase;

        self.record_stats(dt);
        target.draw_frame(self.normalized_phase())?;
        Ok(true)
    }

    /// Derives `dt` from the previous frame's timestamp and ticks.
    pub fn frame<T: DrawTarget>(&mut self, now: Instant, target: &mut T) -> Result<bool, T::Error> {
        if !self.is_running() {
            return Ok(false);
        }
        let dt = self
            .state
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(0.0);
        self.state.last_frame = Some(now);
        self.tick(dt, target)
    }

    fn record_stats(&mut self, dt: f64) {
        if !self.motion.log_stats {
            return;
        }
        self.stats.frames += 1;
        self.stats.elapsed += dt;
        if self.stats.elapsed >= 1.0 {
            debug!(
                fps = self.stats.frames as f64 / self.stats.elapsed,
                speed = self.state.current_speed,
                phase = self.normalized_phase(),
                "frame stats"
            );
            self.stats = FrameStats::default();
        }
    }
}
