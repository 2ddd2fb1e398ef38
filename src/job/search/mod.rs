//! Full-text search subsystem (§4.H.4): index build plus the three query
//! modes the boundary exposes (`search`, `ac`, `fp`).

pub mod index;
pub mod query;
