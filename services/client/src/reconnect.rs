//! Transport rotation and exponential-backoff-with-jitter reconnection
//! (§4.F). Grounded on the teacher's retry scheduling in
//! `forwarder/src/replay.rs`, generalized from "recompute pending events
//! after a reconnect" to "decide when and over which transport the next
//! reconnect attempt happens" — the teacher's uplink never reconnects
//! itself (an external layer drives that), so this folds that retry loop
//! into the client as its own state machine per spec §4.F.

use std::time::Duration;

use rand::Rng;

/// `IDLE → CONNECTING → CONNECTED → OFFLINE → (reconnect) → CONNECTING`,
/// the diagram in spec §4.F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "websocket" => Some(TransportKind::WebSocket),
            "polling" => Some(TransportKind::Polling),
            _ => None,
        }
    }

    /// Parse a config transport list, dropping unrecognized entries and
    /// falling back to `[websocket, polling]` if nothing recognizable
    /// survives — an empty rotation would stall the state machine forever.
    pub fn parse_list(entries: &[String]) -> Vec<Self> {
        let parsed: Vec<Self> = entries.iter().filter_map(|s| Self::parse(s)).collect();
        if parsed.is_empty() {
            vec![TransportKind::WebSocket, TransportKind::Polling]
        } else {
            parsed
        }
    }
}

/// Consecutive-error threshold past which the client waits a full minute
/// rather than the computed exponential delay (§4.F).
const COOLDOWN_ERROR_THRESHOLD: u32 = 10;
const COOLDOWN_DELAY: Duration = Duration::from_secs(60);
const JITTER_MAX_MS: u64 = 1000;

/// Picks the next transport to try and the delay before trying it.
/// `transportIndex = (transportIndex + 1) mod transports.length` on every
/// failure (§4.F, tested by §8 property 9 / scenario S6); delay is
/// `min(baseDelay × 2^attempts, maxDelay) + U(0, 1000)ms`, or a flat 60s
/// once `consecutive_errors` exceeds 10.
pub struct ReconnectPolicy {
    transports: Vec<TransportKind>,
    transport_index: usize,
    base_delay: Duration,
    max_delay: Duration,
    consecutive_errors: u32,
}

impl ReconnectPolicy {
    pub fn new(transports: Vec<TransportKind>, base_delay: Duration, max_delay: Duration) -> Self {
        assert!(!transports.is_empty(), "transport rotation must not be empty");
        Self {
            transports,
            transport_index: 0,
            base_delay,
            max_delay,
            consecutive_errors: 0,
        }
    }

    /// The transport to use for the attempt currently being made.
    pub fn current_transport(&self) -> TransportKind {
        self.transports[self.transport_index]
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Record a failed attempt, rotate to the next transport, and return
    /// the delay to wait before the next attempt.
    pub fn on_failure(&mut self) -> Duration {
        self.transport_index = (self.transport_index + 1) % self.transports.len();
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        self.next_delay()
    }

    /// Reset the error counter; called once a connection succeeds.
    pub fn on_success(&mut self) {
        self.consecutive_errors = 0;
    }

    fn next_delay(&self) -> Duration {
        if self.consecutive_errors > COOLDOWN_ERROR_THRESHOLD {
            return COOLDOWN_DELAY;
        }
        let exponent = self.consecutive_errors.min(20);
        let backoff_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << exponent)
            .min(self.max_delay.as_millis());
        let jitter_ms: u64 = rand::thread_rng().gen_range(0..=JITTER_MAX_MS);
        Duration::from_millis(backoff_ms as u64 + jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S6: with `transports=[websocket, polling]` and no server, four
    /// failed attempts try websocket, polling, websocket, polling in order.
    #[test]
    fn reconnect_rotation_alternates_transports() {
        let mut policy = ReconnectPolicy::new(
            vec![TransportKind::WebSocket, TransportKind::Polling],
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let mut attempted = vec![policy.current_transport()];
        for _ in 0..3 {
            policy.on_failure();
            attempted.push(policy.current_transport());
        }
        assert_eq!(
            attempted,
            vec![
                TransportKind::WebSocket,
                TransportKind::Polling,
                TransportKind::WebSocket,
                TransportKind::Polling,
            ]
        );
    }

    #[test]
    fn delay_grows_exponentially_then_caps_at_max() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(800);
        let mut policy = ReconnectPolicy::new(vec![TransportKind::WebSocket], base, max);
        let d0 = policy.on_failure();
        assert!(d0.as_millis() >= 200 && d0.as_millis() < 200 + JITTER_MAX_MS as u128);
        let d1 = policy.on_failure();
        assert!(d1.as_millis() >= 400 && d1.as_millis() < 400 + JITTER_MAX_MS as u128);
        // Keeps failing until the exponential would exceed max; it must cap.
        for _ in 0..5 {
            let d = policy.on_failure();
            assert!(d.as_millis() >= 800 && d.as_millis() < 800 + JITTER_MAX_MS as u128);
        }
    }

    #[test]
    fn success_resets_the_error_counter() {
        let mut policy = ReconnectPolicy::new(
            vec![TransportKind::WebSocket],
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        policy.on_failure();
        policy.on_failure();
        assert_eq!(policy.consecutive_errors(), 2);
        policy.on_success();
        assert_eq!(policy.consecutive_errors(), 0);
    }

    #[test]
    fn past_ten_consecutive_errors_waits_a_flat_minute() {
        let mut policy = ReconnectPolicy::new(
            vec![TransportKind::WebSocket],
            Duration::from_millis(10),
            Duration::from_secs(5),
        );
        let mut last = Duration::ZERO;
        for _ in 0..11 {
            last = policy.on_failure();
        }
        assert_eq!(policy.consecutive_errors(), 11);
        assert_eq!(last, COOLDOWN_DELAY);
    }

    #[test]
    fn unrecognized_transport_names_fall_back_to_default_pair() {
        let parsed = TransportKind::parse_list(&["carrier-pigeon".to_owned()]);
        assert_eq!(parsed, vec![TransportKind::WebSocket, TransportKind::Polling]);
    }
}
