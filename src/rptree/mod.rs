mod cursor;
mod insert;
mod node_updates;
mod oneoff;
mod read;
mod rebalance;
mod remove;
mod seek;
mod write;

pub use cursor::{CursorState, RptCursor};
pub(crate) use node_updates::{InPair, NodeUpdates};
