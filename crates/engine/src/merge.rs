//! Merge stage: combines the TO, FROM, and REDACT record streams into one
//! canonically ordered stream with no overlapping output (invariants
//! §3.2-2 and §3.2-3).
//!
//! The core algorithm is `next_range`: among the three per-queue front
//! records, pick the smallest by canonical order; compute `first_change` as
//! the earliest point among the *other* queues' fronts that still overlaps
//! the chosen record's remaining span; truncate the chosen record to
//! `[start, first_change)` and return it, leaving the truncated remainder
//! (if any) at the front of its queue for the next call.

use core::error::EngineError;

use crate::queue::ByteQueueReceiver;
use crate::record::{Kind, Record};

/// Which input queue a front record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    To,
    From,
    Redact,
}

/// Combines the TO-traversal, FROM-list, and REDACT-list streams.
pub struct MergeStage {
    to: ByteQueueReceiver<Record>,
    from: ByteQueueReceiver<Record>,
    redact: ByteQueueReceiver<Record>,
    to_front: Option<Record>,
    from_front: Option<Record>,
    redact_front: Option<Record>,
}

impl MergeStage {
    /// Builds a merge stage over the three input queues.
    #[must_use]
    pub const fn new(
        to: ByteQueueReceiver<Record>,
        from: ByteQueueReceiver<Record>,
        redact: ByteQueueReceiver<Record>,
    ) -> Self {
        Self {
            to,
            from,
            redact,
            to_front: None,
            from_front: None,
            redact_front: None,
        }
    }

    fn fill(&mut self) -> Result<(), EngineError> {
        if self.to_front.is_none() {
            self.to_front = Some(recv(&self.to)?);
        }
        if self.from_front.is_none() {
            self.from_front = Some(recv(&self.from)?);
        }
        if self.redact_front.is_none() {
            self.redact_front = Some(recv(&self.redact)?);
        }
        Ok(())
    }

    /// Returns the next canonically-ordered, non-overlapping record, or
    /// `None` once all three inputs are exhausted.
    ///
    /// # Errors
    ///
    /// Propagates a queue disconnection as [`EngineError::Interrupted`].
    pub fn next_range(&mut self) -> Result<Option<Record>, EngineError> {
        loop {
            self.fill()?;

            let to_eos = self.to_front.as_ref().is_some_and(Record::is_eos);
            let from_eos = self.from_front.as_ref().is_some_and(Record::is_eos);
            let redact_eos = self.redact_front.as_ref().is_some_and(Record::is_eos);
            if to_eos && from_eos && redact_eos {
                return Ok(None);
            }

            let candidates = [
                (Origin::To, &self.to_front),
                (Origin::From, &self.from_front),
                (Origin::Redact, &self.redact_front),
            ];
            let (winner, _) = candidates
                .iter()
                .filter_map(|(origin, front)| front.as_ref().map(|r| (*origin, r)))
                .filter(|(_, r)| !r.is_eos())
                .min_by_key(|(_, r)| r.order_key())
                .expect("at least one non-Eos front, else the all-Eos check above returned");

            // ObjectRange only ever comes from TO and never overlaps
            // anything else; forward it unchanged.
            let winner_record = match winner {
                Origin::To => self.to_front.as_ref().unwrap(),
                Origin::From => self.from_front.as_ref().unwrap(),
                Origin::Redact => self.redact_front.as_ref().unwrap(),
            };
            if matches!(winner_record.kind, Kind::ObjectRange(_)) {
                return Ok(self.to_front.take());
            }

            if let Some(result) = self.resolve_tie_group(winner)? {
                return Ok(Some(result));
            }
            // A tie group resolved to nothing emittable (e.g. FROM/REDACT
            // drop); loop again for the next range.
        }
    }

    /// Resolves the overlap/tie rules of §4.4 for the range starting at the
    /// winning queue's front, truncating or dropping the losing fronts in
    /// place.
    fn resolve_tie_group(&mut self, winner: Origin) -> Result<Option<Record>, EngineError> {
        let object = match winner {
            Origin::To => self.to_front.as_ref().unwrap().object,
            Origin::From => self.from_front.as_ref().unwrap().object,
            Origin::Redact => self.redact_front.as_ref().unwrap().object,
        };
        let start = match winner {
            Origin::To => self.to_front.as_ref().unwrap().start_blkid,
            Origin::From => self.from_front.as_ref().unwrap().start_blkid,
            Origin::Redact => self.redact_front.as_ref().unwrap().start_blkid,
        };

        let to_ties = same_start(&self.to_front, object, start);
        let from_ties = same_start(&self.from_front, object, start);
        let redact_ties = same_start(&self.redact_front, object, start);

        // first_change: the earliest boundary among the *other* queues'
        // fronts that still falls inside the winner's remaining span.
        let winner_end = match winner {
            Origin::To => self.to_front.as_ref().unwrap().end_blkid,
            Origin::From => self.from_front.as_ref().unwrap().end_blkid,
            Origin::Redact => self.redact_front.as_ref().unwrap().end_blkid,
        };
        let first_change = [&self.to_front, &self.from_front, &self.redact_front]
            .into_iter()
            .flatten()
            .filter(|r| !r.is_eos() && r.object == object)
            .map(|r| r.start_blkid)
            .filter(|&s| s > start && s < winner_end)
            .min()
            .unwrap_or(winner_end);

        let result = if redact_ties && to_ties {
            // TO and REDACT tie: emit redacted, preserving TO's block size.
            let block_size = match &self.to_front.as_ref().unwrap().kind {
                Kind::Data(data) => data.logical_size,
                Kind::Hole { block_size } => *block_size,
                _ => 0,
            };
            let record = Record {
                object,
                start_blkid: start,
                end_blkid: first_change,
                kind: Kind::Redact { block_size },
            };
            self.advance(Origin::To, first_change);
            self.advance(Origin::Redact, first_change);
            self.advance(Origin::From, first_change);
            Some(record)
        } else if redact_ties && from_ties {
            // FROM and REDACT tie on the same span: drop it entirely.
            self.advance(Origin::From, first_change);
            self.advance(Origin::Redact, first_change);
            None
        } else if to_ties {
            // TO alone, or TO ties only with FROM: TO wins.
            let record = self
                .to_front
                .as_ref()
                .unwrap()
                .truncated_to(start, first_change);
            self.advance(Origin::To, first_change);
            if from_ties {
                self.advance(Origin::From, first_change);
            }
            Some(record)
        } else if redact_ties {
            let record = self
                .redact_front
                .as_ref()
                .unwrap()
                .truncated_to(start, first_change);
            self.advance(Origin::Redact, first_change);
            Some(record)
        } else {
            debug_assert!(from_ties);
            let record = self
                .from_front
                .as_ref()
                .unwrap()
                .truncated_to(start, first_change);
            self.advance(Origin::From, first_change);
            Some(record)
        };

        Ok(result)
    }

    /// Advances `origin`'s front past `new_start`: drops it if fully
    /// consumed, otherwise truncates it in place.
    fn advance(&mut self, origin: Origin, new_start: u64) {
        let slot = match origin {
            Origin::To => &mut self.to_front,
            Origin::From => &mut self.from_front,
            Origin::Redact => &mut self.redact_front,
        };
        let Some(front) = slot.take() else { return };
        if front.is_eos() || front.end_blkid <= new_start {
            *slot = None;
        } else if front.start_blkid < new_start {
            *slot = Some(front.truncated_to(new_start, front.end_blkid));
        } else {
            *slot = Some(front);
        }
    }
}

fn same_start(front: &Option<Record>, object: u64, start: u64) -> bool {
    front
        .as_ref()
        .is_some_and(|r| !r.is_eos() && r.object == object && r.start_blkid == start)
}

fn recv(rx: &ByteQueueReceiver<Record>) -> Result<Record, EngineError> {
    rx.recv().map_err(|_| EngineError::Interrupted)
}
