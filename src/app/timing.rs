use std::time::{Duration, Instant};

const TITLE_REFRESH: Duration = Duration::from_millis(500);

/// Frame cadence bookkeeping for the window title.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: String, now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            base_title,
        }
    }

    pub fn base_title(&self) -> &str {
        &self.base_title
    }

    /// Records a drawn frame. Returns a fresh title at most twice a second.
    pub fn update(&mut self, now: Instant, status: &str) -> Option<String> {
        let dt_duration = if let Some(last) = self.last_frame_time {
            now.saturating_duration_since(last)
        } else {
            Duration::from_millis(16)
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt_duration.as_secs_f32().max(0.0);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed < TITLE_REFRESH {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_fps_time = now;
        Some(format!(
            "{} - {:.1} fps ({:.2} ms) | {}",
            self.base_title,
            fps,
            self.frame_dt * 1000.0,
            status
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::FrameTiming;
    use std::time::{Duration, Instant};

    #[test]
    fn title_refreshes_every_half_second() {
        let start = Instant::now();
        let mut timing = FrameTiming::new("Scenewright".to_string(), start);
        assert!(timing.update(start + Duration::from_millis(100), "env").is_none());
        let title = timing
            .update(start + Duration::from_millis(500), "env")
            .unwrap();
        assert!(title.starts_with("Scenewright - 4.0 fps"));
        assert!(title.ends_with("| env"));
        assert!(timing.update(start + Duration::from_millis(600), "env").is_none());
    }
}
