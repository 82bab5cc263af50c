//! Discovery.
//!
//! ```text
//! Peer   ──[StatusRequest]──► Server   (often to the broadcast identity)
//!   Payload: empty
//!
//! Server ──[StatusResponse]─► Peer
//!   Payload: StatusResponse (6 bytes)
//! ```

use crate::display::DisplayState;
use crate::error::RmtError;

/// Encoded size of [`StatusResponse`].
pub const STATUS_RESPONSE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusResponse {
    pub video_mode: u8,
    pub active_page: u8,
    pub rows: u8,
    pub cols: u8,
    pub cursor_row: u8,
    pub cursor_col: u8,
}

impl StatusResponse {
    pub fn encode(&self) -> [u8; STATUS_RESPONSE_LEN] {
        [
            self.video_mode,
            self.active_page,
            self.rows,
            self.cols,
            self.cursor_row,
            self.cursor_col,
        ]
    }

    pub fn decode(data: &[u8]) -> Result<Self, RmtError> {
        if data.len() < STATUS_RESPONSE_LEN {
            return Err(RmtError::FrameTooShort {
                needed: STATUS_RESPONSE_LEN,
                actual: data.len(),
            });
        }
        Ok(Self {
            video_mode: data[0],
            active_page: data[1],
            rows: data[2],
            cols: data[3],
            cursor_row: data[4],
            cursor_col: data[5],
        })
    }
}

impl From<DisplayState> for StatusResponse {
    fn from(state: DisplayState) -> Self {
        Self {
            video_mode: state.mode,
            active_page: state.page,
            rows: state.rows,
            cols: state.cols,
            cursor_row: state.cursor_row,
            cursor_col: state.cursor_col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_field_order() {
        let resp = StatusResponse {
            video_mode: 3,
            active_page: 0,
            rows: 25,
            cols: 80,
            cursor_row: 4,
            cursor_col: 7,
        };
        assert_eq!(resp.encode(), [3, 0, 25, 80, 4, 7]);
        assert_eq!(StatusResponse::decode(&resp.encode()).unwrap(), resp);
    }

    #[test]
    fn short_payload_rejected() {
        assert!(StatusResponse::decode(&[3, 0, 25]).is_err());
    }
}
