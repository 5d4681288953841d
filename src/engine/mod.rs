//! Core engine — the daily job, the scalp cycle and the schedule that
//! drives them.

pub mod accountant;
pub mod daily;
pub mod executor;
pub mod positions;
pub mod scalper;
pub mod scanner;
pub mod schedule;
