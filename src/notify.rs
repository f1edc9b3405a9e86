//! Outbound notification formatting
//!
//! Maps a notification category to its text decoration. Pure and infallible:
//! an unknown category string degrades to an unprefixed send rather than an
//! error, so a typo in a caller's category field can never block a send.

/// Category of an outbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Reminder,
    WelfareCheck,
    GoodMorning,
    Plain,
}

impl NotificationCategory {
    /// Parse a category string; anything unrecognized is `Plain`
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "reminder" => Self::Reminder,
            "welfare_check" => Self::WelfareCheck,
            "good_morning" => Self::GoodMorning,
            _ => Self::Plain,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::WelfareCheck => "welfare_check",
            Self::GoodMorning => "good_morning",
            Self::Plain => "plain",
        }
    }

    /// Text prefix applied before the notification body
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Reminder => "⏰ ",
            Self::WelfareCheck => "🌅 ",
            Self::GoodMorning => "☀️ ",
            Self::Plain => "",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound notification, ready for formatting and sending
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub destination: String,
    pub body: String,
    pub category: NotificationCategory,
}

impl OutboundNotification {
    /// Final text as it goes to the transport
    pub fn render(&self) -> String {
        format_notification(self.category, &self.body)
    }
}

/// Decorate `body` with the category prefix
pub fn format_notification(category: NotificationCategory, body: &str) -> String {
    format!("{}{}", category.prefix(), body)
}
