use super::combat::CombatSessions;
use super::context::SessionInfo;
use super::entity::Entity;
use super::registry::EntityRegistry;
use crate::guid::Guid128;
use crate::types::ClientBuild;

/// Readonly view into replay state.
///
/// This trait hides the definitions generic on [`crate::Capture`], allowing analyzers to read
/// state without being generic themselves.
pub trait ReplayState {
    /// Number of frames decoded so far
    fn frame_index(&self) -> u64;

    /// Client build the capture is being replayed with
    fn build(&self) -> ClientBuild;

    /// All entities seen so far
    fn entities(&self) -> &EntityRegistry;

    /// Combat sessions, open and closed
    fn combat_sessions(&self) -> &CombatSessions;

    /// Handshake facts
    fn session(&self) -> &SessionInfo;

    /// Lookup that never creates an entity
    fn entity(&self, guid: &Guid128) -> Option<&Entity> {
        self.entities().find(guid)
    }

    /// Best display name for an identifier
    fn display_name(&self, guid: &Guid128) -> String {
        match self.entity(guid).and_then(Entity::name) {
            Some(name) => name.to_string(),
            None => guid.to_string(),
        }
    }
}
