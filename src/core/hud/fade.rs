use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Easing curve applied to fade progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    Sine,
    Quad,
    Quart,
    Circ,
}

impl Easing {
    /// Ease-in value for `x` in `[0, 1]`; the result is also in `[0, 1]`.
    pub fn ease(self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        let eased = match self {
            Easing::Linear => x,
            Easing::Sine => 1.0 - (x * std::f32::consts::FRAC_PI_2).cos(),
            Easing::Quad => x * x,
            Easing::Quart => x * x * x * x,
            Easing::Circ => 1.0 - (1.0 - x * x).sqrt(),
        };
        eased.clamp(0.0, 1.0)
    }

    pub fn name(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::Sine => "sine",
            Easing::Quad => "quad",
            Easing::Quart => "quart",
            Easing::Circ => "circ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeSettings {
    /// How long a line stays fully opaque.
    pub fade_start: Duration,
    /// How long the fade itself takes.
    pub fade_time: Duration,
    pub easing: Easing,
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self {
            fade_start: Duration::from_millis(5000),
            fade_time: Duration::from_millis(2000),
            easing: Easing::Linear,
        }
    }
}

/// Opacity of a line inserted at `inserted_at`, as seen at `now`.
///
/// 1.0 until `fade_start` has elapsed, eased down to 0.0 over `fade_time`,
/// then 0.0. A `now` earlier than `inserted_at` counts as no time elapsed.
pub fn fade_opacity(inserted_at: Instant, now: Instant, settings: &FadeSettings) -> f32 {
    let elapsed = now.saturating_duration_since(inserted_at);
    if elapsed <= settings.fade_start {
        return 1.0;
    }
    let fading = elapsed - settings.fade_start;
    if settings.fade_time.is_zero() || fading >= settings.fade_time {
        return 0.0;
    }
    let progress = fading.as_secs_f32() / settings.fade_time.as_secs_f32();
    1.0 - settings.easing.ease(progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 5] = [
        Easing::Linear,
        Easing::Sine,
        Easing::Quad,
        Easing::Quart,
        Easing::Circ,
    ];

    fn settings(easing: Easing) -> FadeSettings {
        FadeSettings {
            fade_start: Duration::from_millis(1000),
            fade_time: Duration::from_millis(1000),
            easing,
        }
    }

    #[test]
    fn curves_hit_their_endpoints() {
        for easing in ALL {
            assert_eq!(easing.ease(0.0), 0.0, "{easing:?}");
            assert!((easing.ease(1.0) - 1.0).abs() < 1e-6, "{easing:?}");
        }
        assert!((Easing::Quad.ease(0.5) - 0.25).abs() < 1e-6);
        assert!((Easing::Quart.ease(0.5) - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn opacity_phases() {
        let start = Instant::now();
        let linear = settings(Easing::Linear);
        assert_eq!(fade_opacity(start, start, &linear), 1.0);
        assert_eq!(fade_opacity(start, start + Duration::from_millis(999), &linear), 1.0);

        let mid = fade_opacity(start, start + Duration::from_millis(1500), &linear);
        assert!((mid - 0.5).abs() < 1e-3);

        assert_eq!(fade_opacity(start, start + Duration::from_secs(5), &linear), 0.0);
    }

    #[test]
    fn opacity_never_increases_and_stays_in_range() {
        let start = Instant::now();
        for easing in ALL {
            let settings = settings(easing);
            let mut previous = 1.0;
            for step in 0..=60 {
                let now = start + Duration::from_millis(step * 50);
                let opacity = fade_opacity(start, now, &settings);
                assert!((0.0..=1.0).contains(&opacity), "{easing:?} {opacity}");
                assert!(opacity <= previous, "{easing:?} rose at step {step}");
                previous = opacity;
            }
        }
    }

    #[test]
    fn clock_going_backwards_is_fully_opaque() {
        let later = Instant::now() + Duration::from_secs(10);
        let earlier = later - Duration::from_secs(5);
        assert_eq!(fade_opacity(later, earlier, &FadeSettings::default()), 1.0);
    }

    #[test]
    fn zero_fade_time_cuts_off() {
        let start = Instant::now();
        let settings = FadeSettings {
            fade_start: Duration::from_millis(10),
            fade_time: Duration::ZERO,
            easing: Easing::Sine,
        };
        assert_eq!(fade_opacity(start, start + Duration::from_millis(11), &settings), 0.0);
    }
}
