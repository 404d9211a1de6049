//! Cellular link layer boundary.
//!
//! Modem bring-up and network registration belong to the platform. The core
//! only needs to bring the link up before a session and power it off after,
//! whichever way the session ended.

use crate::network::error::Error;

/// A data link that must be up before any transport can connect.
pub trait Link {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Attach to the network and wait until data can flow.
    fn bring_up(&mut self) -> Result<(), Self::Error>;
    /// Detach and power the radio down.
    fn power_off(&mut self);
}

/// Bring `link` up, run `session`, then power the link off.
///
/// The link is powered off whether `session` succeeds or fails. A link that
/// fails to come up is reported as [`Error::Link`] and `session` never runs.
pub fn with_link<L, T, F>(link: &mut L, session: F) -> Result<T, Error>
where
    L: Link,
    F: FnOnce() -> Result<T, Error>,
{
    link.bring_up().map_err(|_| {
        error!("link bring-up failed");
        Error::Link
    })?;
    info!("link up");

    let result = session();

    link.power_off();
    info!("link powered off");
    result
}
