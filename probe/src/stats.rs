//! Per-session probe accounting and the final summary block.

use std::time::{Duration, Instant};

use common::RttStats;

/// What happened to a single probe. Exactly one outcome per probe; a probe
/// that never left the socket is neither transmitted nor received.
pub enum ProbeOutcome {
    /// Sent and a matching reply came back within the timeout
    Received(Duration),
    /// The send itself failed
    SendFailed,
    /// Sent, but no acceptable reply before the timeout
    TimedOut,
}

pub struct SessionStats {
    pub transmitted: u64,
    pub received: u64,
    pub started_at: Instant,
    pub target_display_name: String,
    pub target_numeric_address: String,
    rtt: RttStats,
}

impl SessionStats {
    pub fn new(display_name: &str, numeric_address: &str) -> Self {
        Self {
            transmitted: 0,
            received: 0,
            started_at: Instant::now(),
            target_display_name: display_name.to_string(),
            target_numeric_address: numeric_address.to_string(),
            rtt: RttStats::new(),
        }
    }

    pub fn record(&mut self, outcome: ProbeOutcome) {
        match outcome {
            ProbeOutcome::Received(rtt) => {
                self.transmitted += 1;
                self.received += 1;
                self.rtt.update(rtt.as_secs_f64() * 1e3);
            }
            ProbeOutcome::TimedOut => {
                self.transmitted += 1;
            }
            ProbeOutcome::SendFailed => {}
        }
    }

    /// Loss percentage over transmitted probes; 0 transmitted reports 0
    /// rather than dividing by zero.
    pub fn loss_percent(&self) -> f64 {
        if self.transmitted == 0 {
            return 0.0;
        }
        (self.transmitted - self.received) as f64 / self.transmitted as f64
            * 100.0
    }

    /// The summary block printed once at termination.
    pub fn render(&self, elapsed: Duration) -> String {
        let mut out = format!(
            "\n--- {} ping statistics ---\n{} packets transmitted, {} \
             received, {:.2}% packet loss, time {}ms",
            self.target_display_name,
            self.transmitted,
            self.received,
            self.loss_percent(),
            elapsed.as_millis()
        );
        if self.received > 0 {
            out.push('\n');
            out.push_str(&self.rtt.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_probes_no_division() {
        let stats = SessionStats::new("localhost", "127.0.0.1");
        assert_eq!(stats.loss_percent(), 0.0);
        let summary = stats.render(Duration::from_millis(0));
        assert!(summary
            .contains("0 packets transmitted, 0 received, 0.00% packet loss"));
    }

    #[test]
    fn all_received() {
        let mut stats = SessionStats::new("localhost", "127.0.0.1");
        stats.record(ProbeOutcome::Received(Duration::from_millis(1)));
        stats.record(ProbeOutcome::Received(Duration::from_millis(2)));
        stats.record(ProbeOutcome::Received(Duration::from_millis(3)));
        let summary = stats.render(Duration::from_millis(3004));
        assert!(summary.contains("--- localhost ping statistics ---"));
        assert!(summary.contains(
            "3 packets transmitted, 3 received, 0.00% packet loss, time \
             3004ms"
        ));
        assert!(summary
            .contains("rtt min/avg/max/mdev = 1.000/2.000/3.000/0.816 ms"));
    }

    #[test]
    fn all_timed_out() {
        let mut stats = SessionStats::new("localhost", "127.0.0.1");
        for _ in 0..4 {
            stats.record(ProbeOutcome::TimedOut);
        }
        let summary = stats.render(Duration::from_secs(8));
        assert!(summary.contains(
            "4 packets transmitted, 0 received, 100.00% packet loss"
        ));
        // No rtt line without received probes
        assert!(!summary.contains("rtt min/avg/max"));
    }

    #[test]
    fn send_failures_count_nothing() {
        let mut stats = SessionStats::new("localhost", "127.0.0.1");
        stats.record(ProbeOutcome::SendFailed);
        stats.record(ProbeOutcome::TimedOut);
        assert_eq!(stats.transmitted, 1);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.loss_percent(), 100.0);
    }

    #[test]
    fn summary_starts_with_blank_line() {
        let stats = SessionStats::new("h", "::1");
        assert!(stats.render(Duration::ZERO).starts_with('\n'));
    }
}
