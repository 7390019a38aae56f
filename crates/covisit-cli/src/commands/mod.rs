pub mod checkin;
pub mod decoy;
pub mod diary;
pub mod report;
pub mod sync;
