use std::time::{Duration, Instant};

use super::ack;

pub const MIN_HISTORY_CAPACITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketRecord {
    pub sequence: u32,
    pub acknowledged: bool,
    pub sent_at: Instant,
    pub acknowledged_at: Option<Instant>,
}

impl PacketRecord {
    fn new(sequence: u32, sent_at: Instant) -> Self {
        Self {
            sequence,
            acknowledged: false,
            sent_at,
            acknowledged_at: None,
        }
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) >= timeout
    }

    pub fn round_trip(&self) -> Option<Duration> {
        self.acknowledged_at
            .map(|at| at.saturating_duration_since(self.sent_at))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckedPacket {
    pub sequence: u32,
    pub round_trip: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("packet history full: {capacity} packets awaiting resolution")]
    Overflow { capacity: usize },
}

/// Ring of packets sent to one peer that are neither acknowledged and
/// released nor expired yet.
///
/// `resolve_cursor` points at the oldest unresolved slot (`None` when the
/// ring is empty) and `send_cursor` at the next free one. One slot is kept
/// spare so the two cursors only coincide when the ring is empty.
#[derive(Debug)]
pub struct PacketHistory {
    slots: Vec<Option<PacketRecord>>,
    send_cursor: usize,
    resolve_cursor: Option<usize>,
}

impl PacketHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_HISTORY_CAPACITY);
        Self {
            slots: vec![None; capacity + 1],
            send_cursor: 0,
            resolve_cursor: None,
        }
    }

    /// Maximum number of unresolved records.
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        match self.resolve_cursor {
            Some(resolve) => (self.send_cursor + self.slots.len() - resolve) % self.slots.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resolve_cursor.is_none()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    pub fn record(&mut self, sequence: u32, now: Instant) -> Result<(), HistoryError> {
        let next = (self.send_cursor + 1) % self.slots.len();
        if self.resolve_cursor == Some(next) {
            return Err(HistoryError::Overflow {
                capacity: self.capacity(),
            });
        }

        self.slots[self.send_cursor] = Some(PacketRecord::new(sequence, now));
        if self.resolve_cursor.is_none() {
            self.resolve_cursor = Some(self.send_cursor);
        }
        self.send_cursor = next;
        Ok(())
    }

    /// Marks every unresolved record covered by the ack. Cursors are left
    /// alone; releasing slots is up to the timeout scanner.
    pub fn reconcile(&mut self, ack_base: u32, ack_bits: u32, now: Instant) -> Vec<AckedPacket> {
        let mut acked = Vec::new();
        let Some(start) = self.resolve_cursor else {
            return acked;
        };

        let len = self.len();
        let slot_count = self.slots.len();
        for offset in 0..len {
            let Some(record) = self.slots[(start + offset) % slot_count].as_mut() else {
                continue;
            };
            if record.acknowledged || !ack::is_acknowledged(ack_base, ack_bits, record.sequence) {
                continue;
            }

            record.acknowledged = true;
            record.acknowledged_at = Some(now);
            acked.push(AckedPacket {
                sequence: record.sequence,
                round_trip: now.saturating_duration_since(record.sent_at),
            });
        }

        acked
    }

    pub fn oldest(&self) -> Option<&PacketRecord> {
        self.resolve_cursor
            .and_then(|resolve| self.slots[resolve].as_ref())
    }

    /// Frees the slot under the resolve cursor and moves the cursor on.
    pub fn release_oldest(&mut self) -> Option<PacketRecord> {
        let resolve = self.resolve_cursor?;
        let record = self.slots[resolve].take();

        let next = (resolve + 1) % self.slots.len();
        self.resolve_cursor = (next != self.send_cursor).then_some(next);
        record
    }

    /// Unresolved records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &PacketRecord> + '_ {
        let start = self.resolve_cursor.unwrap_or(self.send_cursor);
        let slot_count = self.slots.len();
        (0..self.len()).filter_map(move |offset| self.slots[(start + offset) % slot_count].as_ref())
    }

    pub fn get(&self, sequence: u32) -> Option<&PacketRecord> {
        self.iter().find(|record| record.sequence == sequence)
    }

    pub fn unacked_count(&self) -> usize {
        self.iter().filter(|record| !record.acknowledged).count()
    }
}
