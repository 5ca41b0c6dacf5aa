use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub name: String,
    pub value: f32,
    pub precision: usize,
}

/// Collects named metrics between two `log` calls and emits them through `tracing`.
#[derive(Debug)]
pub struct Logger {
    entries: Vec<LogEntry>,
    start: Instant,
    last_time: Instant,
    last_step: usize,
}

impl Default for Logger {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            entries: vec![],
            start: now,
            last_time: now,
            last_step: 0,
        }
    }
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics added with a name that is already pending overwrite the old value.
    pub fn add_log(&mut self, name: impl Into<String>, value: f32, precision: usize) {
        let name = name.into();
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                entry.value = value;
                entry.precision = precision;
            }
            None => self.entries.push(LogEntry {
                name,
                value,
                precision,
            }),
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value)
    }

    /// Emits the header followed by every pending metric, then clears them.
    pub fn log(&mut self, header: &str) {
        info!("{header}");
        for LogEntry {
            name,
            value,
            precision,
        } in self.entries.drain(..)
        {
            info!("  {name}: {value:.precision$}");
        }
    }

    /// Steps per second since the previous call and, when `max_steps` is bounded, an estimate of
    /// the remaining time. Returns the step rate.
    pub fn timeit(&mut self, current_step: usize, max_steps: Option<usize>) -> f32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_time).as_secs_f32();
        let steps = current_step.saturating_sub(self.last_step) as f32;
        let steps_per_sec = if elapsed > 0. { steps / elapsed } else { 0. };
        self.last_time = now;
        self.last_step = current_step;
        let total = self.start.elapsed().as_secs_f32();
        match max_steps {
            Some(max_steps) if steps_per_sec > 0. => {
                let eta = max_steps.saturating_sub(current_step) as f32 / steps_per_sec;
                info!("{steps_per_sec:.1} steps/s | elapsed {total:.1}s | eta {eta:.1}s");
            }
            _ => info!("{steps_per_sec:.1} steps/s | elapsed {total:.1}s"),
        }
        steps_per_sec
    }
}

#[cfg(test)]
mod tests {
    use super::Logger;

    #[test]
    fn log_drains_pending_entries() {
        let mut logger = Logger::new();
        logger.add_log("Reward/Episode", 1., 2);
        logger.add_log("Policy/Entropy", 0.5, 4);
        logger.add_log("Reward/Episode", 3., 2);
        assert_eq!(logger.entries().len(), 2);
        assert_eq!(logger.get("Reward/Episode"), Some(3.));
        logger.log("Update 1 | Episode 1 | Step 1");
        assert!(logger.entries().is_empty());
    }

    #[test]
    fn timeit_tracks_the_previous_step() {
        let mut logger = Logger::new();
        let rate = logger.timeit(0, Some(100));
        assert_eq!(rate, 0.);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(logger.timeit(10, None) > 0.);
    }
}
