use std::io::{self, Write};
use std::time::Instant;

const BAR_WIDTH: usize = 20;

fn flush() {
    io::stdout().flush().unwrap_or(());
}

/// Renders `[████░░░░]` for `done` of `total`.
pub fn progress_bar(done: usize, total: usize) -> String {
    let filled = if total == 0 {
        BAR_WIDTH
    } else {
        (done.min(total) * BAR_WIDTH) / total
    };
    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Per-chunk progress line for scenario generation.
pub struct ChunkProgress {
    enabled: bool,
    start_time: Instant,
    total: usize,
    completed: usize,
    failed: usize,
}

impl ChunkProgress {
    pub fn new(enabled: bool, total: usize) -> Self {
        Self {
            enabled,
            start_time: Instant::now(),
            total,
            completed: 0,
            failed: 0,
        }
    }

    pub fn start_chunk(&self, index: usize, endpoints: usize) {
        if !self.enabled {
            return;
        }
        print!(
            "\r🤖 Chunk {}/{} ({} endpoints) {} {}",
            index,
            self.total,
            endpoints,
            progress_bar(self.completed + self.failed, self.total),
            self.eta()
        );
        flush();
    }

    pub fn chunk_done(&mut self, rows: usize) {
        self.completed += 1;
        if self.enabled {
            print!("\r✅ Chunk {}/{} produced {} rows{:20}\n", self.completed + self.failed, self.total, rows, "");
            flush();
        }
    }

    pub fn chunk_failed(&mut self, message: &str) {
        self.failed += 1;
        if self.enabled {
            print!("\r❌ Chunk {}/{} failed: {}\n", self.completed + self.failed, self.total, message);
            flush();
        }
    }

    pub fn finish(&self) {
        if !self.enabled {
            return;
        }
        println!(
            "🎉 Generated {}/{} chunks in {:.1}s{}",
            self.completed,
            self.total,
            self.start_time.elapsed().as_secs_f64(),
            if self.failed > 0 {
                format!(" ({} failed)", self.failed)
            } else {
                String::new()
            }
        );
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    fn eta(&self) -> String {
        let done = self.completed + self.failed;
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if done == 0 || elapsed <= 0.0 {
            return "ETA: --".to_string();
        }
        let remaining = self.total.saturating_sub(done) as f64 * elapsed / done as f64;
        if remaining < 60.0 {
            format!("ETA: {:.0}s", remaining)
        } else {
            format!("ETA: {:.1}m", remaining / 60.0)
        }
    }
}

pub struct Spinner {
    enabled: bool,
    message: String,
    start_time: Instant,
}

impl Spinner {
    pub fn new(enabled: bool, message: &str) -> Self {
        if enabled {
            print!("🔍 {}...", message);
            flush();
        }
        Self {
            enabled,
            message: message.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn succeed(self, message: Option<&str>) {
        if self.enabled {
            let msg = message.unwrap_or(&self.message);
            println!("\r✅ {} ({:.1}s)", msg, self.start_time.elapsed().as_secs_f64());
        }
    }

    pub fn fail(self, message: Option<&str>) {
        if self.enabled {
            println!("\r❌ {} failed", message.unwrap_or(&self.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 4), format!("[{}]", "░".repeat(20)));
        assert_eq!(progress_bar(2, 4), format!("[{}{}]", "█".repeat(10), "░".repeat(10)));
        assert_eq!(progress_bar(9, 4), format!("[{}]", "█".repeat(20)));
        assert_eq!(progress_bar(0, 0), format!("[{}]", "█".repeat(20)));
    }

    #[test]
    fn test_disabled_progress_still_counts() {
        let mut progress = ChunkProgress::new(false, 3);
        progress.chunk_done(4);
        progress.chunk_failed("timeout");
        assert_eq!(progress.failed(), 1);
    }
}
