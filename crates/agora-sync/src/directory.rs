use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use agora_types::models::Channel;

/// Client-local view of the channel list: a name -> id index plus unread
/// counters. Rebuilt from the server on every load and never authoritative.
///
/// Unread counts are `message_count - read_mark`, where the read mark is the
/// channel's total at the moment its messages were last fetched.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    loaded: bool,
    channels: Vec<Channel>,
    by_name: HashMap<String, Uuid>,
    counts: HashMap<Uuid, u64>,
    read_marks: HashMap<Uuid, u64>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a directory load has completed at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Replace the cached view with a fresh server listing.
    pub fn load(&mut self, channels: Vec<Channel>) {
        self.by_name.clear();
        self.counts.clear();
        for channel in &channels {
            // Top-level channels win name collisions with nested ones.
            let replace = match self.by_name.get(&channel.name) {
                None => true,
                Some(existing) => {
                    channel.parent_id.is_none()
                        && channels
                            .iter()
                            .any(|c| c.id == *existing && c.parent_id.is_some())
                }
            };
            if replace {
                self.by_name.insert(channel.name.clone(), channel.id);
            }
            self.counts.insert(channel.id, channel.message_count);
        }
        self.read_marks.retain(|id, _| self.counts.contains_key(id));
        self.channels = channels;
        self.loaded = true;
    }

    /// Cached lookup only; a miss means the caller should query the server.
    pub fn resolve(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: Uuid) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    /// The viewer just fetched this channel: everything up to `total` is read.
    pub fn mark_read(&mut self, channel_id: Uuid, total: u64) {
        let count = self.counts.entry(channel_id).or_insert(0);
        *count = (*count).max(total);
        self.read_marks.insert(channel_id, *count);
    }

    /// A message arrived in a channel the viewer is not looking at.
    pub fn note_new_message(&mut self, channel_id: Uuid) {
        if let Some(count) = self.counts.get_mut(&channel_id) {
            *count += 1;
        }
    }

    pub fn unread(&self, channel_id: Uuid) -> u64 {
        let count = self.counts.get(&channel_id).copied().unwrap_or(0);
        let read = self.read_marks.get(&channel_id).copied().unwrap_or(0);
        count.saturating_sub(read)
    }

    /// Unread counters for every known channel, zero entries included.
    pub fn unread_counts(&self) -> BTreeMap<Uuid, u64> {
        self.counts.keys().map(|id| (*id, self.unread(*id))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, parent: Option<Uuid>, count: u64) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            parent_id: parent,
            message_count: count,
        }
    }

    #[test]
    fn resolves_names_after_load() {
        let mut dir = ChannelDirectory::new();
        assert!(!dir.is_loaded());
        assert_eq!(dir.resolve("general"), None);

        let general = channel("general", None, 3);
        let id = general.id;
        dir.load(vec![general]);
        assert!(dir.is_loaded());
        assert_eq!(dir.resolve("general"), Some(id));
        assert_eq!(dir.name_of(id), Some("general"));
    }

    #[test]
    fn top_level_channel_wins_name_collision() {
        let parent = channel("forums", None, 0);
        let nested = channel("help", Some(parent.id), 0);
        let top = channel("help", None, 0);
        let top_id = top.id;

        let mut dir = ChannelDirectory::new();
        dir.load(vec![parent, nested, top]);
        assert_eq!(dir.resolve("help"), Some(top_id));
    }

    #[test]
    fn unread_counts_reset_on_view_and_grow_on_push() {
        let general = channel("general", None, 4);
        let random = channel("random", None, 2);
        let (g, r) = (general.id, random.id);

        let mut dir = ChannelDirectory::new();
        dir.load(vec![general, random]);
        assert_eq!(dir.unread(g), 4);

        dir.mark_read(g, 4);
        assert_eq!(dir.unread(g), 0);

        dir.note_new_message(g);
        dir.note_new_message(r);
        assert_eq!(dir.unread(g), 1);
        assert_eq!(dir.unread(r), 3);

        // A reload keeps the read mark, so only newer messages count.
        let mut reloaded = vec![channel("general", None, 6), channel("random", None, 3)];
        reloaded[0].id = g;
        reloaded[1].id = r;
        dir.load(reloaded);
        assert_eq!(dir.unread(g), 2);
        assert_eq!(dir.unread_counts().get(&r), Some(&3));
    }
}
