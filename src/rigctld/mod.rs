//! rigctld-compatible TCP front end: one session per client, all sharing
//! the radio behind `rig_lock`.

pub mod server;
pub mod session;

pub use server::RigctldServer;
