pub mod channel;
pub mod channel_playlist;
pub mod channel_track;
pub mod cursor;
pub mod duplicate_track;
