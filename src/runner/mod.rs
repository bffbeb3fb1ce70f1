//! Step definitions and run hooks used by the BDD runner. Each scenario
//! works on its own [`ScenarioContext`].

pub mod api;
pub mod context;
pub mod db;
pub mod hooks;
pub mod steps;

pub use api::ApiSteps;
pub use context::ScenarioContext;
pub use db::DatabaseSteps;
pub use hooks::RunLifecycle;
pub use steps::GenericSteps;
