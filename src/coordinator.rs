//! Per-cycle delivery decisions.
//!
//! Each measurement is either sent immediately or parked in the offline
//! buffer. Buffered measurements are always delivered oldest first and before
//! any newer one, so a failed send stops the drain and the cycle's own
//! measurement queues up behind the backlog.

use crate::measurement::Measurement;
use crate::ring_buffer::RingBuffer;
use crate::sender::Sender;

/// Where a cycle's measurement ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Buffered,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub buffered: u64,
    pub evicted: u64,
    pub send_failures: u64,
}

#[derive(Debug)]
pub struct Coordinator<S> {
    sender: S,
    buffer: RingBuffer<Measurement>,
    stats: DeliveryStats,
}

impl<S: Sender> Coordinator<S> {
    pub fn new(sender: S, buffer_capacity: usize) -> Result<Self, anyhow::Error> {
        Ok(Self {
            sender,
            buffer: RingBuffer::new(buffer_capacity)?,
            stats: DeliveryStats::default(),
        })
    }

    pub fn handle(&mut self, measurement: Measurement) -> Outcome {
        if !self.sender.is_connected() {
            self.enqueue(measurement);
            return Outcome::Buffered;
        }

        if !self.drain() {
            self.enqueue(measurement);
            return Outcome::Buffered;
        }

        match self.sender.send(&measurement) {
            Ok(()) => {
                self.stats.delivered += 1;
                log::debug!("{measurement:?}");
                Outcome::Delivered
            }
            Err(e) => {
                self.stats.send_failures += 1;
                log::warn!("Failed to send measurement: {e:#}");
                self.enqueue(measurement);
                Outcome::Buffered
            }
        }
    }

    /// Flushes what can be flushed before exit and returns how many
    /// measurements are lost with the buffer.
    pub fn shutdown(&mut self) -> usize {
        if !self.buffer.is_empty() && self.sender.is_connected() {
            self.drain();
        }

        let remaining = self.buffer.size();
        if remaining > 0 {
            log::warn!("Discarding {remaining} undelivered measurements");
        }
        remaining
    }

    pub fn pending(&self) -> usize {
        self.buffer.size()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    #[cfg(test)]
    pub fn sender(&self) -> &S {
        &self.sender
    }

    #[cfg(test)]
    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.sender
    }

    /// Sends buffered measurements oldest first. Returns `false` when a send
    /// failed, leaving that measurement at the head of the buffer.
    fn drain(&mut self) -> bool {
        let backlog = self.buffer.size();

        while let Some(measurement) = self.buffer.peek() {
            if let Err(e) = self.sender.send(measurement) {
                self.stats.send_failures += 1;
                log::warn!(
                    "Failed to send buffered measurement from {}: {e:#}",
                    measurement.timestamp.to_rfc3339()
                );
                log::info!(
                    "Delivered {} of {backlog} buffered measurements",
                    backlog - self.buffer.size()
                );
                return false;
            }
            self.buffer.dequeue();
            self.stats.delivered += 1;
        }

        if backlog > 0 {
            log::info!("Delivered {backlog} buffered measurements");
        }
        true
    }

    fn enqueue(&mut self, measurement: Measurement) {
        if self.buffer.is_full() {
            self.stats.evicted += 1;
            if let Some(oldest) = self.buffer.peek() {
                log::warn!(
                    "Offline buffer full, dropping measurement from {}",
                    oldest.timestamp.to_rfc3339()
                );
            }
        }

        self.buffer.push(measurement);
        self.stats.buffered += 1;
        log::info!(
            "Buffered measurement ({}/{} pending)",
            self.buffer.size(),
            self.buffer.capacity()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct MockSender {
        connected: bool,
        failures_left: usize,
        sent: Vec<Measurement>,
    }

    impl Sender for MockSender {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn send(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                anyhow::bail!("broker unreachable");
            }
            self.sent.push(measurement.clone());
            Ok(())
        }
    }

    fn reading(co2: u16) -> Measurement {
        Measurement {
            co2_concentration: Some(co2),
            ..Measurement::default()
        }
    }

    fn coordinator(connected: bool) -> Coordinator<MockSender> {
        let sender = MockSender {
            connected,
            ..MockSender::default()
        };
        // 3 usable slots
        Coordinator::new(sender, 4).unwrap()
    }

    fn sent_co2(coordinator: &Coordinator<MockSender>) -> Vec<u16> {
        coordinator
            .sender()
            .sent
            .iter()
            .filter_map(|m| m.co2_concentration)
            .collect()
    }

    #[test]
    fn test_connected_sends_directly() {
        let mut coordinator = coordinator(true);

        assert_eq!(coordinator.handle(reading(400)), Outcome::Delivered);
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(coordinator.sender().sent, vec![reading(400)]);
    }

    #[test]
    fn test_offline_keeps_most_recent_records() {
        let mut coordinator = coordinator(false);
        for co2 in 1..=5 {
            assert_eq!(coordinator.handle(reading(co2)), Outcome::Buffered);
        }

        assert_eq!(coordinator.pending(), 3);
        assert_eq!(coordinator.stats().evicted, 2);
        assert!(coordinator.sender().sent.is_empty());

        coordinator.sender_mut().connected = true;
        assert_eq!(coordinator.handle(reading(6)), Outcome::Delivered);
        assert_eq!(sent_co2(&coordinator), vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_reconnect_drains_backlog_before_current() {
        let mut coordinator = coordinator(false);
        coordinator.handle(reading(1));
        coordinator.handle(reading(2));

        coordinator.sender_mut().connected = true;
        assert_eq!(coordinator.handle(reading(3)), Outcome::Delivered);

        assert_eq!(sent_co2(&coordinator), vec![1, 2, 3]);
        assert_eq!(coordinator.pending(), 0);
        assert_eq!(
            coordinator.stats(),
            DeliveryStats {
                delivered: 3,
                buffered: 2,
                evicted: 0,
                send_failures: 0,
            }
        );
    }

    #[test]
    fn test_failed_drain_keeps_order() {
        let mut coordinator = coordinator(false);
        coordinator.handle(reading(1));

        coordinator.sender_mut().connected = true;
        coordinator.sender_mut().failures_left = 1;
        assert_eq!(coordinator.handle(reading(2)), Outcome::Buffered);
        assert_eq!(coordinator.pending(), 2);
        assert!(coordinator.sender().sent.is_empty());
        assert_eq!(coordinator.stats().send_failures, 1);

        assert_eq!(coordinator.handle(reading(3)), Outcome::Delivered);
        assert_eq!(sent_co2(&coordinator), vec![1, 2, 3]);
    }

    #[test]
    fn test_failed_direct_send_is_buffered() {
        let mut coordinator = coordinator(true);
        coordinator.sender_mut().failures_left = 1;

        assert_eq!(coordinator.handle(reading(1)), Outcome::Buffered);
        assert_eq!(coordinator.pending(), 1);

        assert_eq!(coordinator.handle(reading(2)), Outcome::Delivered);
        assert_eq!(sent_co2(&coordinator), vec![1, 2]);
    }

    #[test]
    fn test_shutdown_drains_when_connected() {
        let mut coordinator = coordinator(false);
        coordinator.handle(reading(1));
        coordinator.handle(reading(2));

        coordinator.sender_mut().connected = true;
        assert_eq!(coordinator.shutdown(), 0);
        assert_eq!(sent_co2(&coordinator), vec![1, 2]);
    }

    #[test]
    fn test_shutdown_reports_undelivered_when_offline() {
        let mut coordinator = coordinator(false);
        coordinator.handle(reading(1));
        coordinator.handle(reading(2));

        assert_eq!(coordinator.shutdown(), 2);
        assert!(coordinator.sender().sent.is_empty());
    }
}
