pub mod adapter;
pub mod command;
pub mod http;
pub mod router;
pub mod scope;
pub mod stub;

pub use adapter::AnalysisEngine;
pub use command::{CommandEngine, PromptVia};
pub use http::HttpEngine;
pub use router::create_engine;
pub use scope::ScopeReader;
pub use stub::{StubEngine, StubResponse};
