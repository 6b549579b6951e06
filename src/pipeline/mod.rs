pub mod events;
pub mod orchestrator;
pub mod review;
pub mod run;
pub mod state;

pub use events::{EventSender, RunEvent};
pub use orchestrator::{EngineCatalog, RunOrchestrator, RunSet};
pub use review::{ReviewOutcome, ReviewSession};
pub use run::{RunOutcome, Teardown};
pub use state::{RunLimits, RunPhase};
