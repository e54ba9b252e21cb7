pub mod adapters;
pub mod engine;
pub mod error;
pub mod plane;
pub mod port;
pub mod scenario;

pub use adapters::*;
pub use engine::*;
pub use error::*;
pub use plane::*;
pub use port::{
    ClockPort, ContextKind, HeadlessRender, HttpMethod, HttpRequest, HttpResponse, MemoryStorage,
    NetworkPort, RenderContext, RenderPort, StoragePort, SystemClock,
};
pub use scenario::*;
