//! Per-user in-memory session state.
//!
//! Every map is guarded by its own mutex, held only for the duration of a
//! map operation and never across an `.await`. A user's slot is either
//! reserved (a generation request is in flight) or holds a live session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use teloxide::types::UserId;

use crate::dialogue::DialogueSession;
use crate::quiz::QuizSession;
use crate::vocabulary::VocabularySet;

/// Identifies one reservation or one session. A reply carrying an outdated
/// ticket belongs to something the user has since cancelled or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug)]
enum Slot<T> {
    Pending(Ticket),
    Active(Ticket, T),
}

#[derive(Debug)]
pub struct SessionMap<T> {
    slots: Mutex<HashMap<UserId, Slot<T>>>,
    next_ticket: AtomicU64,
}

impl<T> Default for SessionMap<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }
}

impl<T> SessionMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<UserId, Slot<T>>> {
        // A panic inside a map operation cannot leave a slot half-written.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the user as waiting for a new session, replacing whatever was
    /// there before.
    pub fn reserve(&self, user: UserId) -> Ticket {
        let ticket = self.issue();
        self.slots().insert(user, Slot::Pending(ticket));
        ticket
    }

    fn issue(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// Installs `value` under the reservation's ticket if it is still the
    /// user's. Returns `false` and drops the value otherwise.
    pub fn fulfil(&self, user: UserId, ticket: Ticket, value: T) -> bool {
        let mut slots = self.slots();
        match slots.get(&user) {
            Some(Slot::Pending(current)) if *current == ticket => {
                slots.insert(user, Slot::Active(ticket, value));
                true
            }
            _ => false,
        }
    }

    /// Clears the reservation. Returns `false` if it had already been
    /// cancelled or replaced.
    pub fn release(&self, user: UserId, ticket: Ticket) -> bool {
        let mut slots = self.slots();
        if matches!(slots.get(&user), Some(Slot::Pending(current)) if *current == ticket) {
            slots.remove(&user);
            true
        } else {
            false
        }
    }

    pub fn insert(&self, user: UserId, value: T) -> Ticket {
        let ticket = self.issue();
        self.slots().insert(user, Slot::Active(ticket, value));
        ticket
    }

    /// Removes the user's slot. Returns the session if one was active.
    pub fn remove(&self, user: UserId) -> Option<T> {
        match self.slots().remove(&user) {
            Some(Slot::Active(_, value)) => Some(value),
            _ => None,
        }
    }

    /// Removes the session only if it is still the one `ticket` names.
    pub fn take(&self, user: UserId, ticket: Ticket) -> Option<T> {
        let mut slots = self.slots();
        match slots.get(&user) {
            Some(Slot::Active(current, _)) if *current == ticket => match slots.remove(&user) {
                Some(Slot::Active(_, value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Drops whatever the user had, reservation or session. Returns whether
    /// there was anything to drop.
    pub fn cancel(&self, user: UserId) -> bool {
        self.slots().remove(&user).is_some()
    }

    /// Runs `f` on the active session, if any.
    pub fn with<R>(&self, user: UserId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.slots().get_mut(&user) {
            Some(Slot::Active(_, value)) => Some(f(value)),
            _ => None,
        }
    }

    /// Like [`with`](Self::with), but only for the session `ticket` names.
    pub fn with_ticket<R>(
        &self,
        user: UserId,
        ticket: Ticket,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        match self.slots().get_mut(&user) {
            Some(Slot::Active(current, value)) if *current == ticket => Some(f(value)),
            _ => None,
        }
    }

    /// The ticket of the active session, if any.
    pub fn active_ticket(&self, user: UserId) -> Option<Ticket> {
        match self.slots().get(&user) {
            Some(Slot::Active(ticket, _)) => Some(*ticket),
            _ => None,
        }
    }

    pub fn is_active(&self, user: UserId) -> bool {
        self.active_ticket(user).is_some()
    }

    #[cfg(test)]
    pub fn is_pending(&self, user: UserId) -> bool {
        matches!(self.slots().get(&user), Some(Slot::Pending(_)))
    }
}

impl<T: Clone> SessionMap<T> {
    pub fn get(&self, user: UserId) -> Option<T> {
        self.with(user, |value| value.clone())
    }
}

/// All in-memory state of the bot. Created once at startup and shared.
#[derive(Debug, Default)]
pub struct Sessions {
    pub quizzes: SessionMap<QuizSession>,
    pub dialogues: SessionMap<DialogueSession>,
    /// Last generated set per user, for the lifetime of the process.
    pub vocabulary: SessionMap<VocabularySet>,
    /// Word lists being generated. Only ever holds reservations.
    pub vocabulary_requests: SessionMap<()>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }
}
