use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::guid::Guid128;
use crate::types::{CaptureTime, FrameStamp};

/// One attacker/victim engagement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombatSession {
    pub id: usize,
    pub attacker: Guid128,
    pub victim: Guid128,
    /// Absent when the capture began mid-fight and only the stop was seen.
    pub start: Option<FrameStamp>,
    pub end: Option<FrameStamp>,
}

impl CombatSession {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn involves(&self, guid: &Guid128) -> bool {
        self.attacker == *guid || self.victim == *guid
    }

    pub fn start_time(&self) -> Option<CaptureTime> {
        self.start.map(|s| s.time)
    }

    pub fn end_time(&self) -> Option<CaptureTime> {
        self.end.map(|s| s.time)
    }

    /// Seconds between start and end, when both are known.
    pub fn duration(&self) -> Option<f64> {
        Some(self.end_time()? - self.start_time()?)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SessionChange {
    Opened(usize),
    Closed(usize),
}

/// Groups attack start/stop pairs into sessions. At most one session per ordered pair is open at
/// any time.
#[derive(Debug, Default)]
pub struct CombatSessions {
    sessions: Vec<CombatSession>,
    open: HashMap<(Guid128, Guid128), usize>,
    changes: Vec<SessionChange>,
}

impl CombatSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for the pair unless one is already open, in which case it is reused.
    pub fn attack_start(&mut self, attacker: Guid128, victim: Guid128, stamp: FrameStamp) -> usize {
        if let Some(id) = self.open.get(&(attacker, victim)) {
            return *id;
        }

        let id = self.sessions.len();
        debug!("combat session {id} opened: {attacker} -> {victim} at {}", stamp.time);
        self.sessions.push(CombatSession {
            id,
            attacker,
            victim,
            start: Some(stamp),
            end: None,
        });
        self.open.insert((attacker, victim), id);
        self.changes.push(SessionChange::Opened(id));
        id
    }

    /// Closes the open session for the pair. A stop without a preceding start still yields a
    /// session, with no start.
    pub fn attack_stop(&mut self, attacker: Guid128, victim: Guid128, stamp: FrameStamp) -> usize {
        let id = match self.open.remove(&(attacker, victim)) {
            Some(id) => id,
            None => {
                let id = self.sessions.len();
                self.sessions.push(CombatSession {
                    id,
                    attacker,
                    victim,
                    start: None,
                    end: None,
                });
                id
            }
        };

        if let Some(session) = self.sessions.get_mut(id) {
            session.end = Some(stamp);
        }
        debug!("combat session {id} closed: {attacker} -> {victim} at {}", stamp.time);
        self.changes.push(SessionChange::Closed(id));
        id
    }

    /// Opponents `attacker` still has an open session with.
    pub fn open_victims(&self, attacker: &Guid128) -> Vec<Guid128> {
        let mut victims: Vec<(usize, Guid128)> = self
            .open
            .iter()
            .filter(|((a, _), _)| a == attacker)
            .map(|((_, v), id)| (*id, *v))
            .collect();
        victims.sort_unstable_by_key(|(id, _)| *id);
        victims.into_iter().map(|(_, v)| v).collect()
    }

    pub fn get(&self, id: usize) -> Option<&CombatSession> {
        self.sessions.get(id)
    }

    pub fn sessions(&self) -> &[CombatSession] {
        &self.sessions
    }

    pub fn open_session(&self, attacker: &Guid128, victim: &Guid128) -> Option<&CombatSession> {
        self.open
            .get(&(*attacker, *victim))
            .and_then(|id| self.sessions.get(*id))
    }

    pub fn for_participant<'a>(
        &'a self,
        guid: &'a Guid128,
    ) -> impl Iterator<Item = &'a CombatSession> + 'a {
        self.sessions.iter().filter(move |s| s.involves(guid))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn take_changes(&mut self) -> Vec<SessionChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(index: u64, seconds: f64) -> FrameStamp {
        FrameStamp {
            index,
            time: CaptureTime(seconds),
        }
    }

    #[test]
    fn start_then_stop_makes_one_session() {
        let (a, b) = (Guid128::creature(1, 1), Guid128::creature(2, 1));
        let mut combat = CombatSessions::new();
        combat.attack_start(a, b, at(0, 10.0));
        combat.attack_stop(a, b, at(1, 15.0));

        assert_eq!(combat.len(), 1);
        let session = &combat.sessions()[0];
        assert_eq!(session.start_time(), Some(CaptureTime(10.0)));
        assert_eq!(session.end_time(), Some(CaptureTime(15.0)));
        assert_eq!(session.duration(), Some(5.0));
        assert!(!session.is_open());
    }

    #[test]
    fn open_victims_lists_only_open_sessions_in_order() {
        let a = Guid128::creature(1, 1);
        let (b, c, d) = (Guid128::creature(2, 1), Guid128::creature(3, 1), Guid128::creature(4, 1));
        let mut combat = CombatSessions::new();
        combat.attack_start(a, c, at(0, 1.0));
        combat.attack_start(a, b, at(1, 2.0));
        combat.attack_start(a, d, at(2, 3.0));
        combat.attack_start(b, a, at(3, 4.0));
        combat.attack_stop(a, d, at(4, 5.0));

        assert_eq!(combat.open_victims(&a), vec![c, b]);
        assert!(combat.open_victims(&d).is_empty());
    }

    #[test]
    fn repeated_start_reuses_open_session() {
        let (a, b) = (Guid128::creature(1, 1), Guid128::creature(2, 1));
        let mut combat = CombatSessions::new();
        let first = combat.attack_start(a, b, at(0, 1.0));
        let second = combat.attack_start(a, b, at(1, 2.0));
        assert_eq!(first, second);
        assert_eq!(combat.len(), 1);
        assert_eq!(
            combat.open_session(&a, &b).unwrap().start_time(),
            Some(CaptureTime(1.0))
        );
        // the reverse pair is its own session
        combat.attack_start(b, a, at(2, 3.0));
        assert_eq!(combat.len(), 2);
    }

    #[test]
    fn stop_without_start_has_no_start() {
        let (a, b) = (Guid128::creature(1, 1), Guid128::creature(2, 1));
        let mut combat = CombatSessions::new();
        combat.attack_stop(a, b, at(4, 20.0));

        let session = &combat.sessions()[0];
        assert_eq!(session.start, None);
        assert_eq!(session.end_time(), Some(CaptureTime(20.0)));
        assert_eq!(session.duration(), None);
        assert_eq!(combat.for_participant(&b).count(), 1);
    }

    #[test]
    fn changes_are_drained_in_order() {
        let (a, b) = (Guid128::creature(1, 1), Guid128::creature(2, 1));
        let mut combat = CombatSessions::new();
        combat.attack_start(a, b, at(0, 1.0));
        combat.attack_stop(a, b, at(1, 2.0));
        let changes = combat.take_changes();
        assert!(matches!(
            changes.as_slice(),
            [SessionChange::Opened(0), SessionChange::Closed(0)]
        ));
        assert!(combat.take_changes().is_empty());
    }
}
