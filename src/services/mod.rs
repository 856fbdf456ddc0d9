pub mod background;
pub mod backlog;
pub mod catalog;
pub mod channel_scanner;
pub mod cursor;
pub mod duplicates;
pub mod matcher;
pub mod playlist;
pub mod reconcile;
pub mod spotify;
