pub mod spotify;
pub mod track_name;
