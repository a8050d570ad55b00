//! Channel identity and participant identity.
//!
//! A secured channel is named by `(mcast_group, channel_name)`; both are
//! opaque strings. The pair determines the authorization URN a sender's
//! certificate must carry, and the pub/sub channel the exchange itself runs
//! on.

use std::fmt;

/// Identity of one participant in one exchange: ring index plus epoch.
///
/// `u` is the 1-based position in the ring. `d` counts exchange instances on
/// the same channel; the orchestration bumps it for every fresh attempt so
/// stale tasks and messages can be told apart from live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartyId {
    /// 1-based ring index.
    pub u: u32,
    /// Exchange epoch.
    pub d: u32,
}

/// The `(mcast_group, channel_name)` pair a key exchange is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelBinding {
    /// Multicast group, e.g. `"239.255.76.67:7667"`.
    pub mcast_group: String,
    /// Channel name, e.g. `"clock"`. `None` for the default group channel.
    pub channel_name: Option<String>,
}

impl ChannelBinding {
    /// Binding for the default group channel of `mcast_group`.
    pub fn group_default(mcast_group: impl Into<String>) -> Self {
        Self { mcast_group: mcast_group.into(), channel_name: None }
    }

    /// Binding for a named channel on `mcast_group`.
    pub fn named(mcast_group: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self { mcast_group: mcast_group.into(), channel_name: Some(channel_name.into()) }
    }

    /// The URN a certificate must carry to authorize ring index `u` here.
    ///
    /// Default channel: `urn:lcmsec:gkexchg_g:<mcast_group>:<u>`.
    /// Named channel: `urn:lcmsec:gkexchg:<mcast_group>:<channel_name>:<u>`.
    #[must_use]
    pub fn authorization_urn(&self, u: u32) -> String {
        match &self.channel_name {
            Some(name) => format!("urn:lcmsec:gkexchg:{}:{}:{}", self.mcast_group, name, u),
            None => format!("urn:lcmsec:gkexchg_g:{}:{}", self.mcast_group, u),
        }
    }

    /// Name of the pub/sub channel the exchange messages travel on.
    #[must_use]
    pub fn exchange_channel(&self) -> String {
        match &self.channel_name {
            Some(name) => format!("lcm://{name}"),
            None => "lcm://gkexchg_g".to_owned(),
        }
    }
}

impl fmt::Display for ChannelBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.channel_name {
            Some(name) => write!(f, "{}/{}", self.mcast_group, name),
            None => f.write_str(&self.mcast_group),
        }
    }
}
