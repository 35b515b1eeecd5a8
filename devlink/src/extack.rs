// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::Display;

/// Extended ack: the human readable reason attached to a failed administrative request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extack {
    msg: Option<String>,
}

impl Extack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `msg`, replacing any earlier message.
    pub fn set_msg(&mut self, msg: impl Into<String>) {
        self.msg = Some(msg.into());
    }

    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }

    pub fn clear(&mut self) {
        self.msg = None;
    }
}

impl Display for Extack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "(no message)"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Extack;

    #[test]
    fn last_message_wins() {
        let mut extack = Extack::new();
        assert_eq!(extack.msg(), None);
        extack.set_msg("Failed to initialize auxiliary device");
        extack.set_msg("Incorrect pfnum supplied");
        assert_eq!(extack.msg(), Some("Incorrect pfnum supplied"));
        extack.clear();
        assert_eq!(extack.to_string(), "(no message)");
    }
}
