use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

const DELIVERED: &str = "delivered";
const ACCEPTED: &str = "accepted";
const REJECTED: &str = "rejected";
const DEAD_LETTERED: &str = "dead_lettered";
const DECODE_FAILURES: &str = "decode_failures";
const FORWARD_FAILURES: &str = "forward_failures";
const ACKED: &str = "acked";
const ACK_FAILURES: &str = "ack_failures";
const LOST: &str = "lost";

/// Per-runtime counters. `lost` counts messages whose work could not be
/// preserved anywhere: rejected without a reachable dead-letter sink, or
/// buffered records dropped at shutdown.
///
/// The counters are shared handles, so registering them exposes the same
/// values the runtime increments.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    delivered: Counter,
    accepted: Counter,
    rejected: Counter,
    dead_lettered: Counter,
    decode_failures: Counter,
    forward_failures: Counter,
    acked: Counter,
    ack_failures: Counter,
    lost: Counter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub dead_lettered: u64,
    pub decode_failures: u64,
    pub forward_failures: u64,
    pub acked: u64,
    pub ack_failures: u64,
    pub lost: u64,
}

impl RuntimeStats {
    /// Registers every counter in `registry`. Counters are exposed with the
    /// usual `_total` suffix, e.g. `lost_total`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            DELIVERED,
            "A Counter to keep track of the total number of messages delivered by the source queue",
            self.delivered.clone(),
        );
        registry.register(
            ACCEPTED,
            "A Counter to keep track of the total number of messages processed successfully",
            self.accepted.clone(),
        );
        registry.register(
            REJECTED,
            "A Counter to keep track of the total number of messages rejected",
            self.rejected.clone(),
        );
        registry.register(
            DEAD_LETTERED,
            "A Counter to keep track of the total number of messages forwarded to the dead letter sink",
            self.dead_lettered.clone(),
        );
        registry.register(
            DECODE_FAILURES,
            "A Counter to keep track of the total number of malformed messages dropped",
            self.decode_failures.clone(),
        );
        registry.register(
            FORWARD_FAILURES,
            "A Counter to keep track of the total number of failed dead letter forwards",
            self.forward_failures.clone(),
        );
        registry.register(
            ACKED,
            "A Counter to keep track of the total number of messages acknowledged",
            self.acked.clone(),
        );
        registry.register(
            ACK_FAILURES,
            "A Counter to keep track of the total number of failed acknowledgements",
            self.ack_failures.clone(),
        );
        registry.register(
            LOST,
            "A Counter to keep track of the total number of messages whose work was lost",
            self.lost.clone(),
        );
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.get(),
            accepted: self.accepted.get(),
            rejected: self.rejected.get(),
            dead_lettered: self.dead_lettered.get(),
            decode_failures: self.decode_failures.get(),
            forward_failures: self.forward_failures.get(),
            acked: self.acked.get(),
            ack_failures: self.ack_failures.get(),
            lost: self.lost.get(),
        }
    }

    pub(crate) fn delivered(&self) {
        self.delivered.inc();
    }

    pub(crate) fn accepted(&self) {
        self.accepted.inc();
    }

    pub(crate) fn rejected(&self) {
        self.rejected.inc();
    }

    pub(crate) fn dead_lettered(&self) {
        self.dead_lettered.inc();
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_failures.inc();
    }

    pub(crate) fn forward_failed(&self) {
        self.forward_failures.inc();
    }

    pub(crate) fn acked(&self) {
        self.acked.inc();
    }

    pub(crate) fn ack_failed(&self) {
        self.ack_failures.inc();
    }

    pub(crate) fn lost(&self, count: u64) {
        self.lost.inc_by(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registered_counters_track_increments() {
        // given
        let stats = RuntimeStats::default();
        let mut registry = Registry::default();
        stats.register(&mut registry);

        // when
        stats.delivered();
        stats.forward_failed();
        stats.lost(2);

        // then
        let mut buffer = String::new();
        encode(&mut buffer, &registry).unwrap();
        assert!(buffer.contains("delivered_total 1"), "{buffer}");
        assert!(buffer.contains("forward_failures_total 1"), "{buffer}");
        assert!(buffer.contains("lost_total 2"), "{buffer}");
        assert!(buffer.contains("accepted_total 0"), "{buffer}");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.forward_failures, 1);
        assert_eq!(snapshot.lost, 2);
    }
}
