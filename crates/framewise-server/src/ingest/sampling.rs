//! Duration-proportional frame sampling

use crate::config::IngestionConfig;

/// Best known video duration in minutes.
///
/// Prefers the duration stored on the record, then `raw_count / fps` from
/// the notification. `None` when neither is known.
pub fn duration_minutes(
    video_duration_seconds: Option<f64>,
    fps: Option<f64>,
    raw_count: usize,
) -> Option<f64> {
    if let Some(seconds) = video_duration_seconds.filter(|s| s.is_finite() && *s > 0.0) {
        return Some(seconds / 60.0);
    }
    fps.filter(|f| f.is_finite() && *f > 0.0)
        .map(|fps| raw_count as f64 / fps / 60.0)
}

/// Number of frames to keep, always within `[min_frames, max_frames]`.
///
/// With an unknown duration the raw count stands in as the proxy.
pub fn target_frame_count(
    duration_minutes: Option<f64>,
    raw_count: usize,
    config: &IngestionConfig,
) -> usize {
    let wanted = match duration_minutes {
        Some(minutes) => (minutes * config.frames_per_minute).round().max(0.0) as usize,
        None => raw_count,
    };
    wanted.clamp(config.min_frames, config.max_frames)
}

/// Pick `target` items spread evenly over the whole slice.
///
/// Index `i` maps to `floor(i * len / target)`, so the first item is always
/// kept and the last kept item is within one step of the end. Slices no
/// longer than `target` are returned whole.
pub fn sample_evenly<T: Clone>(items: &[T], target: usize) -> Vec<T> {
    let len = items.len();
    if len <= target {
        return items.to_vec();
    }
    (0..target).map(|i| items[i * len / target].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestionConfig {
        IngestionConfig::default()
    }

    #[test]
    fn test_hour_long_video_keeps_150() {
        let target = target_frame_count(Some(60.0), 3600, &config());
        assert_eq!(target, 150);
    }

    #[test]
    fn test_short_video_clamps_to_min() {
        assert_eq!(target_frame_count(Some(2.0), 120, &config()), 100);
    }

    #[test]
    fn test_long_video_clamps_to_max() {
        assert_eq!(target_frame_count(Some(2000.0), 120_000, &config()), 2000);
    }

    #[test]
    fn test_unknown_duration_uses_raw_count() {
        assert_eq!(target_frame_count(None, 20, &config()), 100);
        assert_eq!(target_frame_count(None, 640, &config()), 640);
        assert_eq!(target_frame_count(None, 9000, &config()), 2000);
    }

    #[test]
    fn test_duration_prefers_record() {
        assert_eq!(duration_minutes(Some(1800.0), Some(1.0), 60), Some(30.0));
        assert_eq!(duration_minutes(None, Some(2.0), 7200), Some(60.0));
        assert_eq!(duration_minutes(Some(0.0), None, 100), None);
        assert_eq!(duration_minutes(None, None, 100), None);
    }

    #[test]
    fn test_sample_covers_full_range() {
        let raw: Vec<usize> = (0..3600).collect();
        let sampled = sample_evenly(&raw, 150);

        assert_eq!(sampled.len(), 150);
        assert_eq!(sampled[0], 0);
        let step = raw.len() / 150;
        assert!(raw.len() - 1 - sampled[149] < step);
        assert!(sampled.windows(2).all(|w| w[1] - w[0] == step));
    }

    #[test]
    fn test_sample_uneven_ratio_is_strictly_increasing() {
        let raw: Vec<usize> = (0..1001).collect();
        let sampled = sample_evenly(&raw, 300);
        assert_eq!(sampled.len(), 300);
        assert!(sampled.windows(2).all(|w| w[0] < w[1]));
        assert!(*sampled.last().unwrap_or(&0) >= 1001 - 4);
    }

    #[test]
    fn test_sample_short_input_untouched() {
        let raw = vec!["a", "b", "c"];
        assert_eq!(sample_evenly(&raw, 100), raw);
    }
}
