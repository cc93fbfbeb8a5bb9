use serde::Serialize;

use super::combat::{CombatSessions, SessionChange};
use super::entity::EntityKind;
use super::registry::EntityRegistry;
use crate::guid::Guid128;
use crate::types::ClientBuild;

/// Facts about the client session decoded from handshake frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionInfo {
    /// Build the client reported in its auth-session frame.
    pub reported_build: Option<ClientBuild>,
    pub login_server_id: Option<u32>,
    /// Character the client logged in with.
    pub player: Option<Guid128>,
    pub auth_challenge_seen: bool,
    /// Map of the most recent update-object frame.
    pub map_id: Option<u16>,
}

/// Something the state layer wants announced once the current frame is fully applied.
#[derive(Debug, Clone)]
pub(crate) enum StateNotice {
    EntityCreated { guid: Guid128, kind: EntityKind },
    SessionOpened(usize),
    SessionClosed(usize),
}

/// All mutable state built up while replaying one capture.
///
/// Rewinding throws the whole context away and starts from [`ReplayContext::default`].
#[derive(Debug, Default)]
pub struct ReplayContext {
    pub(crate) entities: EntityRegistry,
    pub(crate) combat: CombatSessions,
    pub(crate) session: SessionInfo,
}

impl ReplayContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn combat(&self) -> &CombatSessions {
        &self.combat
    }

    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    pub(crate) fn take_notices(&mut self) -> Vec<StateNotice> {
        let mut notices: Vec<StateNotice> = self
            .entities
            .take_created()
            .into_iter()
            .map(|(guid, kind)| StateNotice::EntityCreated { guid, kind })
            .collect();
        notices.extend(self.combat.take_changes().into_iter().map(|change| match change {
            SessionChange::Opened(id) => StateNotice::SessionOpened(id),
            SessionChange::Closed(id) => StateNotice::SessionClosed(id),
        }));
        notices
    }
}
