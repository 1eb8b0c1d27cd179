use serde::{Deserialize, Serialize};

/// Seconds a result stays hidden past the reported combat duration, matching
/// the reveal animation length in the renderer.
pub const DEFAULT_REVEAL_LEAD_SECONDS: f64 = 5.5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineSettings {
    pub reveal_lead_seconds: f64,
}

impl TimelineSettings {
    pub fn with_reveal_lead(reveal_lead_seconds: f64) -> Self {
        Self {
            reveal_lead_seconds: reveal_lead_seconds.max(0.0),
        }
    }
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            reveal_lead_seconds: DEFAULT_REVEAL_LEAD_SECONDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{TimelineSettings, DEFAULT_REVEAL_LEAD_SECONDS};

    #[test]
    fn defaults_to_reveal_animation_lead() {
        let settings = TimelineSettings::default();
        assert_eq!(settings.reveal_lead_seconds, DEFAULT_REVEAL_LEAD_SECONDS);
    }

    #[test]
    fn clamps_negative_reveal_lead_to_zero() {
        let settings = TimelineSettings::with_reveal_lead(-3.0);
        assert_eq!(settings.reveal_lead_seconds, 0.0);
    }
}
