use crate::measurement::Measurement;

/// Destination that measurements are forwarded to.
///
/// Implementations own reconnection and must bound every call with their own
/// timeout; the coordinator calls them once per cycle and never retries inline.
pub trait Sender {
    /// Reports whether a send attempt is worth making right now. May try to
    /// reconnect.
    fn is_connected(&mut self) -> bool;

    fn send(&mut self, measurement: &Measurement) -> Result<(), anyhow::Error>;
}
