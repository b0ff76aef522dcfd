use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::datastore::{
    CHECKINS_KEY, DATE_IDEAS_KEY, INVITATIONS_KEY, MEMORIES_KEY, MESSAGES_KEY,
    SEEN_INVITE_MESSAGE_IDS_KEY, SESSION_ROLE_KEY, START_DATE_KEY, Storage, StorageExt,
};
use crate::datetime::{CalendarDate, add_days, parse_ymd, short_date_str, to_ymd};
use crate::duration::{DurationBreakdown, compute_duration};
use crate::entropy::{Entropy, UuidEntropy};
use crate::invitation::{IncomingInvitation, Resolution};
use crate::milestones::{MilestoneEvent, upcoming_milestones};
use crate::model::{
    Checkins, DEFAULT_DATE_IDEAS, GIF_OPTIONS, INVITATION_TEMPLATES, InvitationItem,
    InvitationShare, InvitationTemplate, MemoryItem, Message, MessageKind, MoodValue,
    PartnerNames, PartnerRole, STICKER_OPTIONS, SeenInvitations, find_template, new_id,
};

pub const DEFAULT_START_DATE: &str = "2025-10-15";
pub const DEFAULT_INVITATION_TIME: &str = "19:00";

#[derive(Debug, Clone)]
pub struct SpaceOptions {
    pub partners: PartnerNames,
    pub default_start: CalendarDate,
}

impl Default for SpaceOptions {
    fn default() -> Self {
        Self {
            partners: PartnerNames::default(),
            default_start: parse_ymd(DEFAULT_START_DATE).unwrap_or_default(),
        }
    }
}

/// Duration and upcoming milestones for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub start: CalendarDate,
    pub today: CalendarDate,
    pub duration: DurationBreakdown,
    pub upcoming: Vec<MilestoneEvent>,
}

/// Editable invitation before it is saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationDraft {
    pub template_id: String,
    pub title: String,
    pub message: String,
    pub date: String,
    pub time: String,
    pub place: String,
    pub gif: String,
    pub custom_gif: Option<String>,
    pub sticker: String,
}

impl InvitationDraft {
    /// Prefilled from `template`, dated `tomorrow` at the default time.
    pub fn from_template(template: &InvitationTemplate, tomorrow: CalendarDate) -> Self {
        Self {
            template_id: template.id.to_string(),
            title: template.title.to_string(),
            message: template.message.to_string(),
            date: to_ymd(tomorrow),
            time: DEFAULT_INVITATION_TIME.to_string(),
            place: String::new(),
            gif: GIF_OPTIONS[0].to_string(),
            custom_gif: None,
            sticker: STICKER_OPTIONS[0].to_string(),
        }
    }

    pub fn for_today(today: CalendarDate) -> Self {
        Self::from_template(&INVITATION_TEMPLATES[0], add_days(today, 1))
    }

    /// Switches template, replacing title and message.
    pub fn select_template(&mut self, template_id: &str) -> anyhow::Result<()> {
        let template =
            find_template(template_id).ok_or_else(|| anyhow!("unknown template: {template_id}"))?;
        self.template_id = template.id.to_string();
        self.title = template.title.to_string();
        self.message = template.message.to_string();
        Ok(())
    }

    pub fn active_gif(&self) -> &str {
        self.custom_gif.as_deref().unwrap_or(&self.gif)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.title.trim().is_empty() {
            return Err(anyhow!("invitation title is required"));
        }
        if self.message.trim().is_empty() {
            return Err(anyhow!("invitation message is required"));
        }
        if self.place.trim().is_empty() {
            return Err(anyhow!("invitation place is required"));
        }
        parse_ymd(&self.date).context("invitation date")?;
        let time_re = Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$")
            .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
        if !time_re.is_match(self.time.trim()) {
            return Err(anyhow!("invitation time must be HH:MM, got: {}", self.time));
        }
        Ok(())
    }

    pub fn share(&self) -> InvitationShare {
        InvitationShare {
            title: self.title.trim().to_string(),
            message: self.message.trim().to_string(),
            date: self.date.trim().to_string(),
            time: self.time.trim().to_string(),
            place: self.place.trim().to_string(),
            gif: self.active_gif().to_string(),
            sticker: self.sticker.clone(),
        }
    }
}

/// Shared space of the two partners, backed by a local store (shared
/// state) and a session store (who is logged in).
pub struct Space<S: Storage> {
    local: S,
    session: S,
    options: SpaceOptions,
    entropy: Box<dyn Entropy>,
}

impl<S: Storage> Space<S> {
    pub fn new(local: S, session: S, options: SpaceOptions) -> Self {
        Self::with_entropy(local, session, options, Box::new(UuidEntropy))
    }

    pub fn with_entropy(
        local: S,
        session: S,
        options: SpaceOptions,
        entropy: Box<dyn Entropy>,
    ) -> Self {
        Self {
            local,
            session,
            options,
            entropy,
        }
    }

    pub fn partners(&self) -> &PartnerNames {
        &self.options.partners
    }

    pub fn entropy(&mut self) -> &mut dyn Entropy {
        self.entropy.as_mut()
    }

    // Session

    pub fn role(&self) -> Option<PartnerRole> {
        self.session.load(SESSION_ROLE_KEY)
    }

    #[instrument(skip(self))]
    pub fn login(&self, role: PartnerRole) -> anyhow::Result<()> {
        self.session.save(SESSION_ROLE_KEY, &role)?;
        info!(%role, "logged in");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn logout(&self) -> anyhow::Result<()> {
        self.session.remove(SESSION_ROLE_KEY)
    }

    pub fn require_role(&self) -> anyhow::Result<PartnerRole> {
        self.role()
            .ok_or_else(|| anyhow!("not logged in; run `babi login <ronron|bribri>` first"))
    }

    pub fn name_of(&self, role: PartnerRole) -> &str {
        self.options.partners.name_of(role)
    }

    pub fn my_name(&self) -> anyhow::Result<&str> {
        Ok(self.name_of(self.require_role()?))
    }

    pub fn partner_name(&self) -> anyhow::Result<&str> {
        Ok(self.name_of(self.require_role()?.partner()))
    }

    /// Current value of `key` for a read-modify-write. Fails instead of
    /// defaulting when the stored value is unparsable.
    fn stored_for_update<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        Ok(self.local.load_for_update(key)?.unwrap_or_default())
    }

    // Start date and overview

    pub fn start_date(&self) -> CalendarDate {
        let Some(raw) = self.local.load::<String>(START_DATE_KEY) else {
            return self.options.default_start;
        };
        match parse_ymd(&raw) {
            Ok(date) => date,
            Err(err) => {
                warn!(stored = %raw, error = %err, "stored start date invalid; using default");
                self.options.default_start
            }
        }
    }

    #[instrument(skip(self))]
    pub fn set_start_date(&self, raw: &str) -> anyhow::Result<CalendarDate> {
        let date = parse_ymd(raw)?;
        self.local.save(START_DATE_KEY, &to_ymd(date))?;
        info!(start = %date, "saved start date");
        Ok(date)
    }

    pub fn overview(&self, today: CalendarDate) -> Overview {
        let start = self.start_date();
        Overview {
            start,
            today,
            duration: compute_duration(start, today),
            upcoming: upcoming_milestones(start, today),
        }
    }

    // Chat

    pub fn messages(&self) -> Vec<Message> {
        self.local.load(MESSAGES_KEY).unwrap_or_default()
    }

    fn append_message(&self, message: Message) -> anyhow::Result<Message> {
        let mut messages: Vec<Message> = self.stored_for_update(MESSAGES_KEY)?;
        messages.push(message.clone());
        self.local.save(MESSAGES_KEY, &messages)?;
        debug!(id = %message.id, count = messages.len(), "appended message");
        Ok(message)
    }

    #[instrument(skip(self, text, image), fields(has_image = image.is_some()))]
    pub fn send_message(
        &self,
        text: &str,
        image: Option<String>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Message> {
        let sender = self.require_role()?;
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return Err(anyhow!("nothing to send: write a message or attach an image"));
        }
        let mut message = Message::new(sender, text.to_string(), now);
        message.image = image;
        self.append_message(message)
    }

    pub fn last_message_preview(&self) -> String {
        let Some(last) = self.messages().pop() else {
            return "Start your first sweet message 💌".to_string();
        };
        if last.is_invitation() {
            "💌 Date invitation".to_string()
        } else if !last.text.is_empty() {
            last.text
        } else if last.image.is_some() {
            "📷 Sent an image".to_string()
        } else {
            "New message".to_string()
        }
    }

    // Check-ins

    pub fn checkins(&self) -> Checkins {
        self.local.load(CHECKINS_KEY).unwrap_or_default()
    }

    #[instrument(skip(self, note))]
    pub fn save_checkin(
        &self,
        mood: Option<MoodValue>,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Checkins> {
        let role = self.require_role()?;
        let mut checkins: Checkins = self.stored_for_update(CHECKINS_KEY)?;
        let entry = checkins.get_mut(role);
        if let Some(mood) = mood {
            entry.mood = mood;
        }
        if let Some(note) = note {
            entry.note = note.to_string();
        }
        entry.updated_at = now.to_rfc3339();
        self.local.save(CHECKINS_KEY, &checkins)?;
        Ok(checkins)
    }

    // Date ideas

    pub fn date_ideas(&self) -> Vec<String> {
        ideas_or_defaults(self.local.load(DATE_IDEAS_KEY))
    }

    pub fn pick_idea(&mut self) -> Option<String> {
        let mut ideas = self.date_ideas();
        let index = self.entropy.pick_index(ideas.len())?;
        Some(ideas.swap_remove(index))
    }

    /// Prepends `text`; returns `false` without saving when an idea with the
    /// same text (ignoring case) already exists.
    #[instrument(skip(self))]
    pub fn add_idea(&self, text: &str) -> anyhow::Result<bool> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("idea cannot be empty"));
        }
        let mut ideas = ideas_or_defaults(self.local.load_for_update(DATE_IDEAS_KEY)?);
        let wanted = trimmed.to_lowercase();
        if ideas.iter().any(|idea| idea.to_lowercase() == wanted) {
            debug!("duplicate idea ignored");
            return Ok(false);
        }
        ideas.insert(0, trimmed.to_string());
        self.local.save(DATE_IDEAS_KEY, &ideas)?;
        Ok(true)
    }

    // Memories

    pub fn memories(&self) -> Vec<MemoryItem> {
        self.local.load(MEMORIES_KEY).unwrap_or_default()
    }

    #[instrument(skip(self, text))]
    pub fn add_memory(&self, text: &str, date: CalendarDate) -> anyhow::Result<MemoryItem> {
        let author = self.require_role()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(anyhow!("memory text cannot be empty"));
        }
        let item = MemoryItem {
            id: new_id(),
            text: text.to_string(),
            date: to_ymd(date),
            author,
            favorite: false,
        };
        let mut memories: Vec<MemoryItem> = self.stored_for_update(MEMORIES_KEY)?;
        memories.insert(0, item.clone());
        self.local.save(MEMORIES_KEY, &memories)?;
        Ok(item)
    }

    /// Flips the favorite flag of the memory whose id starts with `id`.
    #[instrument(skip(self))]
    pub fn toggle_favorite(&self, id: &str) -> anyhow::Result<MemoryItem> {
        let mut memories: Vec<MemoryItem> = self.stored_for_update(MEMORIES_KEY)?;
        let index = unique_prefix_match(&memories, id, |item| &item.id)?;
        let item = &mut memories[index];
        item.favorite = !item.favorite;
        let updated = item.clone();
        self.local.save(MEMORIES_KEY, &memories)?;
        Ok(updated)
    }

    // Invitations

    pub fn invitations(&self) -> Vec<InvitationItem> {
        self.local.load(INVITATIONS_KEY).unwrap_or_default()
    }

    pub fn find_invitation(&self, id: &str) -> anyhow::Result<InvitationItem> {
        let mut invitations = self.invitations();
        let index = unique_prefix_match(&invitations, id, |item| &item.id)?;
        Ok(invitations.swap_remove(index))
    }

    #[instrument(skip(self, draft), fields(template = %draft.template_id))]
    pub fn save_invitation(
        &self,
        draft: &InvitationDraft,
        now: DateTime<Utc>,
    ) -> anyhow::Result<InvitationItem> {
        let created_by = self.require_role()?;
        draft.validate()?;
        let share = draft.share();
        let item = InvitationItem {
            id: new_id(),
            template_id: draft.template_id.clone(),
            title: share.title,
            message: share.message,
            date: share.date,
            time: share.time,
            place: share.place,
            gif: share.gif,
            sticker: share.sticker,
            created_by,
            created_at: now,
        };
        let mut invitations: Vec<InvitationItem> = self.stored_for_update(INVITATIONS_KEY)?;
        invitations.insert(0, item.clone());
        self.local.save(INVITATIONS_KEY, &invitations)?;
        Ok(item)
    }

    #[instrument(skip(self, invitation), fields(title = %invitation.title))]
    pub fn send_invitation_to_chat(
        &self,
        invitation: &InvitationShare,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Message> {
        let sender = self.require_role()?;
        let text = [
            format!("{} {}", invitation.sticker, invitation.title),
            invitation.message.clone(),
            format!("📅 {} · {}", short_date_str(&invitation.date), invitation.time),
            format!("📍 {}", invitation.place),
        ]
        .join("\n");

        let mut message = Message::new(sender, text, now);
        message.image = Some(invitation.gif.clone());
        message.kind = Some(MessageKind::Invitation);
        message.invitation = Some(invitation.clone());
        self.append_message(message)
    }

    fn seen_invitations(&self) -> SeenInvitations {
        self.local.load(SEEN_INVITE_MESSAGE_IDS_KEY).unwrap_or_default()
    }

    /// The newest invitation from the partner that the logged-in role has
    /// not seen yet, shown as an envelope.
    pub fn incoming_invitation(&self) -> anyhow::Result<IncomingInvitation> {
        let role = self.require_role()?;
        let seen = self.seen_invitations();
        let seen = seen.for_role(role);
        let unseen = self.messages().into_iter().rev().find(|message| {
            message.is_invitation() && message.sender != role && !seen.contains(&message.id)
        });
        Ok(unseen.map_or(IncomingInvitation::Idle, IncomingInvitation::present))
    }

    #[instrument(skip(self))]
    pub fn mark_invitation_seen(&self, message_id: &str) -> anyhow::Result<()> {
        let role = self.require_role()?;
        let mut seen: SeenInvitations = self.stored_for_update(SEEN_INVITE_MESSAGE_IDS_KEY)?;
        seen.mark(role, message_id);
        self.local.save(SEEN_INVITE_MESSAGE_IDS_KEY, &seen)
    }

    /// Posts the acceptance reply (when the message carries an invitation)
    /// and marks the invitation seen.
    #[instrument(skip(self, message), fields(id = %message.id))]
    pub fn accept_invitation(
        &self,
        message: &Message,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Message>> {
        let sender = self.require_role()?;
        let reply = match &message.invitation {
            Some(invitation) => {
                let mut reply = Message::new(
                    sender,
                    format!("💖 I accept your invitation: {}", invitation.title),
                    now,
                );
                reply.kind = Some(MessageKind::Text);
                Some(self.append_message(reply)?)
            }
            None => None,
        };
        self.mark_invitation_seen(&message.id)?;
        Ok(reply)
    }

    /// Persists the effects of a resolved incoming invitation. Other states
    /// have nothing to persist.
    pub fn resolve_invitation(
        &self,
        state: &IncomingInvitation,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Message>> {
        match state {
            IncomingInvitation::Resolved {
                message,
                resolution: Resolution::Accepted,
            } => self.accept_invitation(message, now),
            IncomingInvitation::Resolved {
                message,
                resolution: Resolution::Dismissed,
            } => {
                self.mark_invitation_seen(&message.id)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

fn ideas_or_defaults(stored: Option<Vec<String>>) -> Vec<String> {
    match stored {
        Some(ideas) if !ideas.is_empty() => ideas,
        _ => DEFAULT_DATE_IDEAS.iter().map(|idea| idea.to_string()).collect(),
    }
}

fn unique_prefix_match<T>(
    items: &[T],
    prefix: &str,
    id_of: impl Fn(&T) -> &String,
) -> anyhow::Result<usize> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(anyhow!("id cannot be empty"));
    }
    let mut matches = items
        .iter()
        .enumerate()
        .filter(|(_, item)| id_of(item).starts_with(prefix))
        .map(|(index, _)| index);
    let first = matches.next().ok_or_else(|| anyhow!("no entry with id {prefix}"))?;
    if matches.next().is_some() {
        return Err(anyhow!("id prefix {prefix} is ambiguous"));
    }
    Ok(first)
}
