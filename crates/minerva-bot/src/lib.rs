pub mod backfill;
pub mod media;
pub mod moderator;
pub mod persona;
pub mod provider;
