mod coordinator_scenarios;
pub mod support;
