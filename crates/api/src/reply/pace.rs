//! Render-delay pacing
//!
//! Automated replies are held back for roughly the time a fast typist would
//! need, so the typing indicator shows before the text lands.

use std::time::Duration;

use rand::Rng;

use crate::config::TypingConfig;

#[derive(Debug, Clone, Copy)]
pub struct TypingPace {
    config: TypingConfig,
}

impl TypingPace {
    pub fn new(config: TypingConfig) -> Self {
        Self { config }
    }

    /// Delay for `text` at a words-per-minute rate drawn from
    /// `base_wpm ± wpm_jitter`
    pub fn render_delay(&self, text: &str) -> Duration {
        let jitter = if self.config.wpm_jitter.is_finite() && self.config.wpm_jitter > 0.0 {
            rand::thread_rng().gen_range(-self.config.wpm_jitter..=self.config.wpm_jitter)
        } else {
            0.0
        };
        self.render_delay_at(text, self.config.base_wpm + jitter)
    }

    /// `max(words / wpm * 60000 + base_delay, min_delay)` milliseconds
    pub fn render_delay_at(&self, text: &str, wpm: f64) -> Duration {
        let words = text.split_whitespace().count() as f64;
        let typing_ms = if wpm.is_finite() && wpm > 0.0 {
            words / wpm * 60_000.0
        } else {
            0.0
        };
        let total_ms = (typing_ms + self.config.base_delay_ms as f64)
            .max(self.config.min_delay_ms as f64);
        Duration::from_millis(total_ms.round() as u64)
    }
}

impl Default for TypingPace {
    fn default() -> Self {
        Self::new(TypingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_replies_hit_minimum_delay() {
        let pace = TypingPace::default();
        // 1 word at 120 wpm = 500ms typing + 500ms base = 1000ms
        assert_eq!(pace.render_delay_at("Hello", 120.0), Duration::from_millis(1000));
        // Empty text still waits the minimum
        assert_eq!(pace.render_delay_at("", 120.0), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_scales_with_word_count() {
        let pace = TypingPace::default();
        let text = vec!["word"; 60].join(" ");
        // 60 words at 120 wpm = 30s, plus base delay
        assert_eq!(pace.render_delay_at(&text, 120.0), Duration::from_millis(30_500));
    }

    #[test]
    fn test_jittered_delay_stays_in_bounds() {
        let pace = TypingPace::default();
        let text = vec!["word"; 20].join(" ");
        let fastest = pace.render_delay_at(&text, 130.0);
        let slowest = pace.render_delay_at(&text, 110.0);

        for _ in 0..100 {
            let delay = pace.render_delay(&text);
            assert!(delay >= fastest && delay <= slowest, "{delay:?} out of range");
        }
    }

    #[test]
    fn test_non_finite_rates_fall_back_to_base_delay() {
        for jitter in [f64::NAN, f64::INFINITY] {
            let pace = TypingPace::new(TypingConfig {
                wpm_jitter: jitter,
                ..TypingConfig::default()
            });
            // Jitter is ignored, so the base rate applies
            assert_eq!(pace.render_delay("Hello"), Duration::from_millis(1000));
        }

        let pace = TypingPace::default();
        assert_eq!(pace.render_delay_at("Hello", f64::NAN), Duration::from_millis(800));
    }
}
