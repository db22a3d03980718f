//! Scheduler -> visual note queue
//!
//! A bounded rtrb ring buffer carries [`ScheduledNote`]s from the scheduler
//! thread to the visual frame thread. Only the consumer may pop, so the
//! producer cannot clear leftovers from an earlier run. Instead every note
//! carries the session id it was scheduled in, and the receiver silently
//! drops notes whose session is no longer current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

/// A step committed to the audio clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    /// Physical step counter since start, before shift is applied
    pub step_index: u64,
    /// Audio-clock time the step sounds at, swing included
    pub audio_time: f64,
    /// Playback session the note belongs to
    pub session: u64,
}

/// Create a connected sender/receiver pair.
pub fn note_queue(capacity: usize) -> (NoteSender, NoteReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    let session = Arc::new(AtomicU64::new(0));
    (
        NoteSender {
            producer,
            session: Arc::clone(&session),
        },
        NoteReceiver { consumer, session },
    )
}

pub struct NoteSender {
    producer: Producer<ScheduledNote>,
    session: Arc<AtomicU64>,
}

impl NoteSender {
    /// Start a new session. Notes from earlier sessions become invisible to
    /// the receiver.
    pub fn begin_session(&mut self) -> u64 {
        self.session.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// Push a note for the current session. Returns `false` if the queue is
    /// full and the note was dropped.
    pub fn send(&mut self, step_index: u64, audio_time: f64) -> bool {
        let note = ScheduledNote {
            step_index,
            audio_time,
            session: self.current_session(),
        };
        self.producer.push(note).is_ok()
    }
}

pub struct NoteReceiver {
    consumer: Consumer<ScheduledNote>,
    session: Arc<AtomicU64>,
}

impl NoteReceiver {
    /// Pop the oldest current-session note if it is due before `deadline`.
    ///
    /// Stale notes at the head of the queue are discarded on the way.
    pub fn pop_due(&mut self, deadline: f64) -> Option<ScheduledNote> {
        let current = self.session.load(Ordering::Acquire);
        loop {
            let head = *self.consumer.peek().ok()?;
            if head.session != current {
                let _ = self.consumer.pop();
                continue;
            }
            if head.audio_time < deadline {
                return self.consumer.pop().ok();
            }
            return None;
        }
    }

    /// Discard everything currently queued.
    pub fn clear(&mut self) {
        while self.consumer.pop().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.consumer.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
