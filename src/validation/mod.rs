pub(crate) mod case;
pub(crate) mod manifest;
pub(crate) mod orchestrator;
pub(crate) mod report;
pub(crate) mod run;
