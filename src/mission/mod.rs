//! State-graph engine: context, nodes, the activation event and the runtime.

pub mod cansat;
pub mod context;
pub mod event;
pub mod node;

pub use cansat::{CanSat, ShutdownHandle};
pub use context::{Context, Next, NodeFlow, NodeKey};
pub use event::{Flag, PostEvent};
pub use node::{Node, NodeHandle};
