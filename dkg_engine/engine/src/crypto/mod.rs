//! Cryptographic capabilities used by DKG rounds.

pub mod groups;
pub mod sharing;
pub mod signing;
pub mod translation;
