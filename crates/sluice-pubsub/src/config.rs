//! Configuration for publishers and subscribers.
//!
//! The constructors mirror the three supported setups: a plain catch-up
//! subscription, a persistent subscription with a generated group name, and
//! a persistent subscription joining an explicit consumer group.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a subscription starts reading within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamPosition {
    /// Replay from the beginning of the stream.
    #[default]
    Start,
    /// Skip history; receive only records appended after subscribing.
    End,
    /// Start from an explicit stream revision.
    Revision(u64),
}

/// Authentication credentials passed through to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login name.
    pub login: String,
    /// Password.
    pub password: String,
}

/// Per-call options for appending to a stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendOptions {
    /// Expected stream revision; `None` means any.
    #[serde(default)]
    pub expected_revision: Option<u64>,
    /// Credentials for this call.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Options for a catch-up stream subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeOptions {
    /// Start position within the stream.
    #[serde(default)]
    pub from: StreamPosition,
    /// Credentials for the subscription.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Options for creating a persistent subscription group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentOptions {
    /// Position the group starts tracking from.
    #[serde(default)]
    pub start_from: StreamPosition,
    /// Credentials for the create call.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Options for joining an existing persistent subscription group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentSubscribeOptions {
    /// Credentials for the subscription.
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

/// Publisher-side configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Options applied to every append call.
    #[serde(default)]
    pub options: AppendOptions,
}

/// Subscriber-side configuration.
///
/// A `group` of `None` selects the catch-up pipeline; `Some(name)` selects
/// the persistent pipeline against that consumer group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// Options for catch-up subscriptions.
    #[serde(default)]
    pub stream: SubscribeOptions,
    /// Options for creating the persistent group.
    #[serde(default)]
    pub group_create: PersistentOptions,
    /// Options for joining the persistent group.
    #[serde(default)]
    pub group_subscribe: PersistentSubscribeOptions,
    /// Consumer group name; `None` means catch-up mode.
    #[serde(default)]
    pub group: Option<String>,
    /// Capacity of the internal and outbound channels.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            stream: SubscribeOptions::default(),
            group_create: PersistentOptions::default(),
            group_subscribe: PersistentSubscribeOptions::default(),
            group: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

const fn default_channel_capacity() -> usize {
    16
}

/// Combined configuration for one publisher/subscriber pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection target string, parsed by the store implementation.
    pub connection_string: String,
    /// Publisher-side settings.
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Subscriber-side settings.
    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

impl Config {
    /// Config for a simple catch-up subscription.
    pub fn catch_up(
        connection_string: impl Into<String>,
        credentials: Option<Credentials>,
        from: StreamPosition,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            publisher: PublisherConfig {
                options: AppendOptions {
                    expected_revision: None,
                    credentials: credentials.clone(),
                },
            },
            subscriber: SubscriberConfig {
                stream: SubscribeOptions { from, credentials },
                ..SubscriberConfig::default()
            },
        }
    }

    /// Config for a persistent subscription with a generated group name.
    ///
    /// Useful when each process wants its own store-tracked subscription
    /// without coordinating group names.
    pub fn persistent(
        connection_string: impl Into<String>,
        credentials: Option<Credentials>,
        from: StreamPosition,
    ) -> Self {
        let group = Uuid::new_v4().to_string();
        Self::persistent_group(connection_string, group, credentials, from)
    }

    /// Config for a persistent subscription joining an explicit consumer
    /// group.
    pub fn persistent_group(
        connection_string: impl Into<String>,
        group: impl Into<String>,
        credentials: Option<Credentials>,
        from: StreamPosition,
    ) -> Self {
        Self {
            connection_string: connection_string.into(),
            publisher: PublisherConfig {
                options: AppendOptions {
                    expected_revision: None,
                    credentials: credentials.clone(),
                },
            },
            subscriber: SubscriberConfig {
                group: Some(group.into()),
                group_create: PersistentOptions {
                    start_from: from,
                    credentials: credentials.clone(),
                },
                group_subscribe: PersistentSubscribeOptions { credentials },
                ..SubscriberConfig::default()
            },
        }
    }
}
