pub(crate) mod coordinator;
pub(crate) mod session;
pub(crate) mod simulated;
pub(crate) mod transport;
