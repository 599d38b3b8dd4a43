//! Channel and user model.
//!
//! The client keeps a snapshot of the channels it occupies and the nicks
//! present in each. The model mutates only from observed server traffic
//! (JOIN/PART/KICK/QUIT/NICK echoes), never optimistically on outbound
//! requests.

use std::collections::BTreeSet;

use crate::line::Source;

/// A channel the client currently occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    name: String,
    users: BTreeSet<String>,
}

impl Channel {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: BTreeSet::new(),
        }
    }

    /// Channel name as the server spelled it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nicks known to be present.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    /// True when the nick is present, ASCII case folding.
    pub fn has_user(&self, nick: &str) -> bool {
        self.users.iter().any(|u| u.eq_ignore_ascii_case(nick))
    }

    pub(crate) fn add_user(&mut self, nick: &str) {
        self.users.insert(nick.to_string());
    }

    pub(crate) fn remove_user(&mut self, nick: &str) -> bool {
        match self.users.iter().find(|u| u.eq_ignore_ascii_case(nick)).cloned() {
            Some(existing) => self.users.remove(&existing),
            None => false,
        }
    }

    pub(crate) fn rename_user(&mut self, old: &str, new: &str) {
        if self.remove_user(old) {
            self.users.insert(new.to_string());
        }
    }
}

/// True when a name is a channel name rather than a nick.
pub fn is_channel_name(name: &str) -> bool {
    name.starts_with('#') || name.starts_with('&')
}

/// Anything that can be the target of a message.
pub trait MessageRecipient {
    /// The name to put in the target slot of `PRIVMSG`/`NOTICE`.
    fn message_target(&self) -> &str;
}

impl MessageRecipient for Channel {
    fn message_target(&self) -> &str {
        &self.name
    }
}

impl MessageRecipient for Source {
    fn message_target(&self) -> &str {
        &self.nick
    }
}

impl MessageRecipient for str {
    fn message_target(&self) -> &str {
        self
    }
}

impl MessageRecipient for String {
    fn message_target(&self) -> &str {
        self
    }
}

impl<'a, T: MessageRecipient + ?Sized> MessageRecipient for &'a T {
    fn message_target(&self) -> &str {
        (**self).message_target()
    }
}
