//! Client to server payloads. Only the handshake is decoded.

use serde::Serialize;
use tracing::debug;

use crate::error::ReadError;
use crate::guid::Guid128;
use crate::reader::PacketReader;
use crate::state::ReplayContext;
use crate::types::{ClientBuild, FrameStamp};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthSession {
    pub login_server_id: u32,
    pub build: ClientBuild,
    pub region_id: u32,
}

impl AuthSession {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            login_server_id: reader.read_u32()?,
            build: ClientBuild::from(reader.read_u16()?),
            region_id: reader.read_u32()?,
        })
    }

    pub fn update_state(&self, _stamp: FrameStamp, ctx: &mut ReplayContext) {
        debug!("client reports build {}", self.build);
        ctx.session.reported_build = Some(self.build);
        ctx.session.login_server_id = Some(self.login_server_id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerLogin {
    pub guid: Guid128,
    pub far_clip: f32,
}

impl PlayerLogin {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            guid: reader.read_packed_guid128()?,
            far_clip: reader.read_f32()?,
        })
    }

    pub fn update_state(&self, _stamp: FrameStamp, ctx: &mut ReplayContext) {
        ctx.session.player = Some(self.guid);
        ctx.entities.find_or_create(self.guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptureTime;

    #[test]
    fn player_login_records_the_session_player() {
        let guid = Guid128::player(3, 42);
        let mut data = guid.to_packed();
        data.extend_from_slice(&100.0f32.to_le_bytes());

        let mut reader = PacketReader::new(&data);
        let login = PlayerLogin::parse(&mut reader).unwrap();
        let mut ctx = ReplayContext::new();
        login.update_state(
            FrameStamp {
                index: 0,
                time: CaptureTime(0.0),
            },
            &mut ctx,
        );
        assert_eq!(ctx.session().player, Some(guid));
        assert!(ctx.entities().find(&guid).is_some());
    }
}
