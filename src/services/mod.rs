pub mod execution_bridge;

pub use execution_bridge::{
    execution_bridge, BridgeDrain, BridgeError, BridgeHandle, DrainReport, PendingWork,
};
