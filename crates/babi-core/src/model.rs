use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PartnerRole {
    Male,
    Female,
}

impl PartnerRole {
    pub const ALL: [PartnerRole; 2] = [PartnerRole::Male, PartnerRole::Female];

    pub fn partner(self) -> Self {
        match self {
            PartnerRole::Male => PartnerRole::Female,
            PartnerRole::Female => PartnerRole::Male,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            PartnerRole::Male => "male",
            PartnerRole::Female => "female",
        }
    }
}

impl FromStr for PartnerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "ronron" => Ok(PartnerRole::Male),
            "female" | "bribri" => Ok(PartnerRole::Female),
            other => Err(anyhow!("unknown role '{other}', expected male/ronron or female/bribri")),
        }
    }
}

impl fmt::Display for PartnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerNames {
    pub male: String,
    pub female: String,
}

impl Default for PartnerNames {
    fn default() -> Self {
        Self {
            male: "Ronron".to_string(),
            female: "Bribri".to_string(),
        }
    }
}

impl PartnerNames {
    pub fn name_of(&self, role: PartnerRole) -> &str {
        match role {
            PartnerRole::Male => &self.male,
            PartnerRole::Female => &self.female,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvitationShare {
    pub title: String,
    pub message: String,
    pub date: String,
    pub time: String,
    pub place: String,
    pub gif: String,
    pub sticker: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Invitation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: PartnerRole,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation: Option<InvitationShare>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: PartnerRole, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            sender,
            text,
            image: None,
            kind: None,
            invitation: None,
            created_at: now,
        }
    }

    pub fn is_invitation(&self) -> bool {
        self.kind == Some(MessageKind::Invitation)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MoodValue {
    #[default]
    InLove,
    Happy,
    MissingYou,
    Stressed,
    Sleepy,
}

impl MoodValue {
    pub const ALL: [MoodValue; 5] = [
        MoodValue::InLove,
        MoodValue::Happy,
        MoodValue::MissingYou,
        MoodValue::Stressed,
        MoodValue::Sleepy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MoodValue::InLove => "In Love",
            MoodValue::Happy => "Happy",
            MoodValue::MissingYou => "Missing You",
            MoodValue::Stressed => "Stressed",
            MoodValue::Sleepy => "Sleepy",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            MoodValue::InLove => "😍",
            MoodValue::Happy => "😊",
            MoodValue::MissingYou => "🥺",
            MoodValue::Stressed => "😵",
            MoodValue::Sleepy => "😴",
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            MoodValue::InLove => "in-love",
            MoodValue::Happy => "happy",
            MoodValue::MissingYou => "missing-you",
            MoodValue::Stressed => "stressed",
            MoodValue::Sleepy => "sleepy",
        }
    }
}

impl FromStr for MoodValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        MoodValue::ALL
            .into_iter()
            .find(|mood| mood.as_key() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = MoodValue::ALL.iter().map(|m| m.as_key()).collect();
                anyhow!("unknown mood '{s}', expected one of: {}", known.join(", "))
            })
    }
}

/// Stored check-in. Missing fields fall back to the defaults so older or
/// partial documents still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Checkin {
    #[serde(default)]
    pub mood: MoodValue,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Checkins {
    #[serde(default)]
    pub male: Checkin,
    #[serde(default)]
    pub female: Checkin,
}

impl Checkins {
    pub fn get(&self, role: PartnerRole) -> &Checkin {
        match role {
            PartnerRole::Male => &self.male,
            PartnerRole::Female => &self.female,
        }
    }

    pub fn get_mut(&mut self, role: PartnerRole) -> &mut Checkin {
        match role {
            PartnerRole::Male => &mut self.male,
            PartnerRole::Female => &mut self.female,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryItem {
    pub id: String,
    pub text: String,
    pub date: String,
    pub author: PartnerRole,
    #[serde(default)]
    pub favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub title: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvitationItem {
    pub id: String,
    pub template_id: String,
    pub title: String,
    pub message: String,
    pub date: String,
    pub time: String,
    pub place: String,
    pub gif: String,
    pub sticker: String,
    pub created_by: PartnerRole,
    pub created_at: DateTime<Utc>,
}

impl InvitationItem {
    pub fn share(&self) -> InvitationShare {
        InvitationShare {
            title: self.title.clone(),
            message: self.message.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            place: self.place.clone(),
            gif: self.gif.clone(),
            sticker: self.sticker.clone(),
        }
    }
}

/// Seen incoming-invitation message ids, per recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeenInvitations {
    #[serde(default)]
    pub male: Vec<String>,
    #[serde(default)]
    pub female: Vec<String>,
}

impl SeenInvitations {
    pub fn for_role(&self, role: PartnerRole) -> &[String] {
        match role {
            PartnerRole::Male => &self.male,
            PartnerRole::Female => &self.female,
        }
    }

    pub fn mark(&mut self, role: PartnerRole, id: &str) {
        let list = match role {
            PartnerRole::Male => &mut self.male,
            PartnerRole::Female => &mut self.female,
        };
        if !list.iter().any(|seen| seen == id) {
            list.push(id.to_string());
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub const INVITATION_TEMPLATES: [InvitationTemplate; 10] = [
    InvitationTemplate {
        id: "sunset-romance",
        name: "Sunset Romance",
        title: "Sunset Date for Two",
        message: "Let's watch the sunset and enjoy the evening together.",
    },
    InvitationTemplate {
        id: "coffee-cute",
        name: "Coffee Cute",
        title: "Coffee + Catch Up",
        message: "I miss you. Let's grab coffee and talk about everything.",
    },
    InvitationTemplate {
        id: "movie-night",
        name: "Movie Night",
        title: "Cozy Movie Night",
        message: "Blanket, snacks, and us. Pick a movie and cuddle time.",
    },
    InvitationTemplate {
        id: "dinner-elegant",
        name: "Dinner Elegant",
        title: "Special Dinner Date",
        message: "Dress up with me and let's have a memorable dinner date.",
    },
    InvitationTemplate {
        id: "adventure-day",
        name: "Adventure Day",
        title: "Adventure Together",
        message: "Let's try something new and make a fresh memory today.",
    },
    InvitationTemplate {
        id: "picnic-love",
        name: "Picnic Love",
        title: "Picnic Date",
        message: "Let's have a cute picnic and spend slow quality time.",
    },
    InvitationTemplate {
        id: "game-night",
        name: "Game Night",
        title: "Playful Game Night",
        message: "Bring your best mood and let me win at least once.",
    },
    InvitationTemplate {
        id: "staycation",
        name: "Staycation",
        title: "Mini Staycation",
        message: "Let's pause the world and enjoy a little escape together.",
    },
    InvitationTemplate {
        id: "surprise-date",
        name: "Surprise",
        title: "Mystery Date Invitation",
        message: "Don't ask questions, just be ready for a cute surprise.",
    },
    InvitationTemplate {
        id: "anniv-special",
        name: "Anniv Special",
        title: "Monthsary / Anniversary Celebration",
        message: "Let's celebrate us and make this day extra special.",
    },
];

pub fn find_template(id: &str) -> Option<&'static InvitationTemplate> {
    INVITATION_TEMPLATES.iter().find(|template| template.id == id)
}

pub const GIF_OPTIONS: [&str; 8] = [
    "https://media.giphy.com/media/l0HlBO7eyXzSZkJri/giphy.gif",
    "https://media.giphy.com/media/3oriO0OEd9QIDdllqo/giphy.gif",
    "https://media.giphy.com/media/MDJ9IbxxvDUQM/giphy.gif",
    "https://media.giphy.com/media/26BRv0ThflsHCqDrG/giphy.gif",
    "https://media.giphy.com/media/5GoVLqeAOo6PK/giphy.gif",
    "https://media.giphy.com/media/3o7TKtnuHOHHUjR38Y/giphy.gif",
    "https://media.giphy.com/media/11sBLVxNs7v6WA/giphy.gif",
    "https://media.giphy.com/media/10UeedrT5MIfPG/giphy.gif",
];

pub const STICKER_OPTIONS: [&str; 12] = [
    "💌", "💖", "🌹", "🐻", "✨", "💍", "🍓", "🎀", "🫶", "🥰", "🎡", "🌙",
];

pub const DECLINE_TEASE_TEXTS: [&str; 6] = [
    "No 😌",
    "No, no please accept it 🥺",
    "Come on, say yes 💞",
    "Please accept this date 💖",
    "Still no? Try accept 😘",
    "Only accept works 😇",
];

pub const DEFAULT_DATE_IDEAS: [&str; 7] = [
    "Sunset walk + street food date",
    "Cook dinner together and rate each dish",
    "Movie night with matching pajamas",
    "No-phone cafe date for 1 hour",
    "Memory lane: revisit your first date spot",
    "At-home spa night with soft music",
    "Mini photoshoot and make a shared album",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_from_names_and_keys() {
        assert_eq!("Ronron".parse::<PartnerRole>().expect("role"), PartnerRole::Male);
        assert_eq!(" female ".parse::<PartnerRole>().expect("role"), PartnerRole::Female);
        assert!("someone".parse::<PartnerRole>().is_err());
        assert_eq!(PartnerRole::Male.partner(), PartnerRole::Female);
    }

    #[test]
    fn moods_parse_loosely() {
        assert_eq!("missing you".parse::<MoodValue>().expect("mood"), MoodValue::MissingYou);
        assert_eq!("IN_LOVE".parse::<MoodValue>().expect("mood"), MoodValue::InLove);
        assert!("grumpy".parse::<MoodValue>().is_err());
    }

    #[test]
    fn message_json_uses_stored_field_names() {
        let raw = r#"{"id":"m1","sender":"female","text":"hi","type":"invitation",
            "invitation":{"title":"t","message":"m","date":"2025-11-01","time":"19:00",
            "place":"p","gif":"g","sticker":"s"},"createdAt":"2025-10-15T10:00:00Z"}"#;
        let message: Message = serde_json::from_str(raw).expect("parse message");
        assert!(message.is_invitation());
        assert_eq!(message.sender, PartnerRole::Female);

        let encoded = serde_json::to_value(&message).expect("encode");
        assert_eq!(encoded["type"], "invitation");
        assert!(encoded.get("createdAt").is_some());
        assert!(encoded.get("image").is_none());
    }

    #[test]
    fn partial_checkins_fill_defaults() {
        let parsed: Checkins =
            serde_json::from_str(r#"{"male":{"mood":"happy"}}"#).expect("parse checkins");
        assert_eq!(parsed.male.mood, MoodValue::Happy);
        assert_eq!(parsed.male.note, "");
        assert_eq!(parsed.female, Checkin::default());
    }

    #[test]
    fn seen_marks_are_unique() {
        let mut seen = SeenInvitations::default();
        seen.mark(PartnerRole::Male, "a");
        seen.mark(PartnerRole::Male, "a");
        assert_eq!(seen.for_role(PartnerRole::Male), ["a".to_string()]);
        assert!(seen.for_role(PartnerRole::Female).is_empty());
    }
}
