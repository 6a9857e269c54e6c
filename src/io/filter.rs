// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Topic and channel filtering.
//!
//! Callers name topics; chunks and messages carry channel IDs. A
//! [`TopicFilter`] selects topics by name or pattern, and a
//! [`ChannelFilter`] is the resolved set of channel IDs for one query.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::io::metadata::Channel;

/// Selects topics by exact name or regular expression.
#[derive(Clone, Default)]
pub enum TopicFilter {
    /// Every topic
    #[default]
    All,
    /// Only the listed topics
    Include(HashSet<String>),
    /// Topics matching a regex pattern
    Regex(Arc<regex::Regex>),
}

impl fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.debug_tuple("All").finish(),
            Self::Include(v) => f.debug_tuple("Include").field(v).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
        }
    }
}

impl TopicFilter {
    /// Check if a topic should be included.
    pub fn should_include(&self, topic: &str) -> bool {
        match self {
            TopicFilter::All => true,
            TopicFilter::Include(topics) => topics.contains(topic),
            TopicFilter::Regex(re) => re.is_match(topic),
        }
    }

    /// Create an include filter from topic names.
    pub fn include<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(topics.into_iter().map(Into::into).collect())
    }

    /// Create a regex filter.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        regex::Regex::new(pattern).map(|re| Self::Regex(Arc::new(re)))
    }

    /// Resolve to the explicit topic set used by iterator arguments.
    ///
    /// Returns `None` for [`TopicFilter::All`].
    pub fn resolve(&self, channels: &HashMap<u16, Channel>) -> Option<HashSet<String>> {
        match self {
            TopicFilter::All => None,
            TopicFilter::Include(topics) => Some(topics.clone()),
            TopicFilter::Regex(_) => Some(
                channels
                    .values()
                    .filter(|c| self.should_include(&c.topic))
                    .map(|c| c.topic.clone())
                    .collect(),
            ),
        }
    }
}

/// Channel IDs selected by a topic set.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    /// Allowed channel IDs; `None` allows every channel
    allowed_channels: Option<HashSet<u16>>,
}

impl ChannelFilter {
    /// Resolve a topic set against known channels.
    ///
    /// A topic served by several channels selects all of them.
    pub fn from_topics(topics: Option<&HashSet<String>>, channels: &HashMap<u16, Channel>) -> Self {
        let allowed_channels = topics.map(|topics| {
            channels
                .values()
                .filter(|c| topics.contains(&c.topic))
                .map(|c| c.id)
                .collect()
        });
        Self { allowed_channels }
    }

    /// Create a filter that includes all channels.
    pub fn all() -> Self {
        Self::default()
    }

    /// Check if a channel ID is allowed.
    pub fn allows_channel(&self, channel_id: u16) -> bool {
        self.allowed_channels
            .as_ref()
            .map_or(true, |ids| ids.contains(&channel_id))
    }

    /// The allowed IDs, or `None` when unrestricted.
    pub fn channel_ids(&self) -> Option<&HashSet<u16>> {
        self.allowed_channels.as_ref()
    }

    /// Whether the filter is restricted and admits nothing.
    pub fn is_empty(&self) -> bool {
        self.allowed_channels
            .as_ref()
            .is_some_and(|ids| ids.is_empty())
    }
}
