//! 阶段层：Planner、Executor、Reflector、Synthesizer 与阶段事件

pub mod events;
pub mod executor;
pub mod planner;
pub mod reflector;
pub mod synthesizer;

pub use events::{PhaseEvent, StepOutcome};
pub use executor::{BatchOutcome, Executor};
pub use planner::Planner;
pub use reflector::{render_step_results, Reflector};
pub use synthesizer::{render_findings, Synthesizer};
