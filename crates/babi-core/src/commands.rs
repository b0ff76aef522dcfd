use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::calendar::{ViewMonth, build_month_grid};
use crate::cli::{
    ChatCommand, CheckinCommand, Command, IdeaCommand, InboxCommand, InviteCommand, InviteFields,
    MemoryCommand,
};
use crate::datastore::Storage;
use crate::datetime::{CalendarDate, parse_ymd, short_date_str, today};
use crate::invitation::IncomingInvitation;
use crate::model::{GIF_OPTIONS, STICKER_OPTIONS};
use crate::render::Renderer;
use crate::space::{InvitationDraft, Space};
use crate::upload::{UploadSettings, upload_image_file};

/// Everything a command needs besides the space itself.
pub struct CommandEnv<'a, W: Write> {
    pub renderer: &'a Renderer,
    pub upload: &'a UploadSettings,
    pub now: DateTime<Utc>,
    pub out: &'a mut W,
}

impl<W: Write> CommandEnv<'_, W> {
    fn today(&self) -> CalendarDate {
        today(self.now)
    }
}

#[instrument(skip_all, fields(command = command_name(command.as_ref())))]
pub fn dispatch<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::Overview);
    debug!(role = ?space.role(), "dispatching");

    match command {
        Command::Login { role } => {
            space.login(role)?;
            writeln!(ctx.out, "Logged in as {}.", space.name_of(role))?;
        }
        Command::Logout => {
            space.logout()?;
            writeln!(ctx.out, "Logged out.")?;
        }
        Command::Whoami => match space.role() {
            Some(role) => writeln!(
                ctx.out,
                "{} ({role}), partner: {}",
                space.name_of(role),
                space.name_of(role.partner())
            )?,
            None => writeln!(ctx.out, "Not logged in.")?,
        },
        Command::Start { date } => {
            let start = match date {
                Some(raw) => space.set_start_date(&raw)?,
                None => space.start_date(),
            };
            ctx.renderer.print_start(ctx.out, start)?;
        }
        Command::Overview => {
            let overview = space.overview(ctx.today());
            ctx.renderer
                .print_overview(ctx.out, &overview, space.partners())?;
        }
        Command::Calendar { month, shift } => {
            let today = ctx.today();
            let base = match month {
                Some(raw) => ViewMonth::parse(&raw)?,
                None => ViewMonth::containing(today),
            };
            let view = base.shift(shift);
            let start = space.start_date();
            let milestones = space.overview(today).upcoming;
            let grid = build_month_grid(view, &milestones, start, today);
            ctx.renderer.print_calendar(ctx.out, view, &grid)?;
        }
        Command::Chat(action) => run_chat(space, ctx, action)?,
        Command::Checkin(action) => run_checkin(space, ctx, action)?,
        Command::Idea(action) => run_idea(space, ctx, action)?,
        Command::Memory(action) => run_memory(space, ctx, action)?,
        Command::Invite(action) => run_invite(space, ctx, action)?,
        Command::Inbox { action } => {
            run_inbox(space, ctx, action.unwrap_or(InboxCommand::Show))?
        }
    }

    Ok(())
}

fn command_name(command: Option<&Command>) -> &'static str {
    match command {
        None | Some(Command::Overview) => "overview",
        Some(Command::Login { .. }) => "login",
        Some(Command::Logout) => "logout",
        Some(Command::Whoami) => "whoami",
        Some(Command::Start { .. }) => "start",
        Some(Command::Calendar { .. }) => "calendar",
        Some(Command::Chat(_)) => "chat",
        Some(Command::Checkin(_)) => "checkin",
        Some(Command::Idea(_)) => "idea",
        Some(Command::Memory(_)) => "memory",
        Some(Command::Invite(_)) => "invite",
        Some(Command::Inbox { .. }) => "inbox",
    }
}

fn join_words(words: Vec<String>) -> String {
    words.join(" ")
}

fn run_chat<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: ChatCommand,
) -> anyhow::Result<()> {
    match action {
        ChatCommand::List => {
            let messages = space.messages();
            ctx.renderer
                .print_messages(ctx.out, &messages, space.partners(), space.role())?;
        }
        ChatCommand::Send { text, image } => {
            space.require_role()?;
            let image = image
                .map(|path| upload_image_file(&path, ctx.upload))
                .transpose()
                .context("image upload failed")?;
            let message = space.send_message(&join_words(text), image, ctx.now)?;
            info!(id = %message.id, "message sent");
            writeln!(ctx.out, "Sent.")?;
        }
    }
    Ok(())
}

fn run_checkin<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: CheckinCommand,
) -> anyhow::Result<()> {
    let checkins = match action {
        CheckinCommand::Show => space.checkins(),
        CheckinCommand::Set { mood, note } => {
            space.save_checkin(mood, note.as_deref(), ctx.now)?
        }
    };
    ctx.renderer
        .print_checkins(ctx.out, &checkins, space.partners())
}

fn run_idea<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: IdeaCommand,
) -> anyhow::Result<()> {
    match action {
        IdeaCommand::List => ctx.renderer.print_ideas(ctx.out, &space.date_ideas())?,
        IdeaCommand::Pick => match space.pick_idea() {
            Some(idea) => writeln!(ctx.out, "✨ {idea}")?,
            None => writeln!(ctx.out, "No ideas yet.")?,
        },
        IdeaCommand::Add { text } => {
            if space.add_idea(&join_words(text))? {
                writeln!(ctx.out, "Idea added.")?;
            } else {
                writeln!(ctx.out, "That idea is already on the list.")?;
            }
        }
    }
    Ok(())
}

fn run_memory<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: MemoryCommand,
) -> anyhow::Result<()> {
    match action {
        MemoryCommand::List => {
            ctx.renderer
                .print_memories(ctx.out, &space.memories(), space.partners())?
        }
        MemoryCommand::Add { text, date } => {
            let date = match date {
                Some(raw) => parse_ymd(&raw)?,
                None => ctx.today(),
            };
            let item = space.add_memory(&join_words(text), date)?;
            writeln!(
                ctx.out,
                "Saved memory {} for {}.",
                item.id.get(..8).unwrap_or(&item.id),
                short_date_str(&item.date)
            )?;
        }
        MemoryCommand::Fav { id } => {
            let item = space.toggle_favorite(&id)?;
            let state = if item.favorite { "★ favorite" } else { "☆ not favorite" };
            writeln!(ctx.out, "{state}: {}", item.text)?;
        }
    }
    Ok(())
}

fn draft_from_fields(fields: InviteFields, today: CalendarDate) -> anyhow::Result<InvitationDraft> {
    let mut draft = InvitationDraft::for_today(today);
    if let Some(template) = fields.template {
        draft.select_template(&template)?;
    }
    if let Some(title) = fields.title {
        draft.title = title;
    }
    if let Some(message) = fields.message {
        draft.message = message;
    }
    if let Some(date) = fields.date {
        draft.date = date;
    }
    if let Some(time) = fields.time {
        draft.time = time;
    }
    if let Some(index) = fields.gif {
        draft.gif = GIF_OPTIONS
            .get(index)
            .ok_or_else(|| anyhow!("gif index must be below {}", GIF_OPTIONS.len()))?
            .to_string();
    }
    if let Some(sticker) = fields.sticker {
        if !STICKER_OPTIONS.contains(&sticker.as_str()) {
            return Err(anyhow!(
                "unknown sticker {sticker}, expected one of: {}",
                STICKER_OPTIONS.join(" ")
            ));
        }
        draft.sticker = sticker;
    }
    draft.custom_gif = fields.custom_gif.filter(|url| !url.trim().is_empty());
    draft.place = fields.place;
    Ok(draft)
}

fn run_invite<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: InviteCommand,
) -> anyhow::Result<()> {
    match action {
        InviteCommand::Templates => ctx.renderer.print_templates(ctx.out)?,
        InviteCommand::List => {
            ctx.renderer
                .print_invitations(ctx.out, &space.invitations(), space.partners())?
        }
        InviteCommand::New(fields) => {
            let send = fields.send;
            let draft = draft_from_fields(fields, ctx.today())?;
            let item = space.save_invitation(&draft, ctx.now)?;
            writeln!(
                ctx.out,
                "Saved invitation {} ({}).",
                item.id.get(..8).unwrap_or(&item.id),
                item.title
            )?;
            if send {
                space.send_invitation_to_chat(&item.share(), ctx.now)?;
                writeln!(ctx.out, "Sent to {} 💌", space.partner_name()?)?;
            }
        }
        InviteCommand::Send { id } => {
            let item = space.find_invitation(&id)?;
            space.send_invitation_to_chat(&item.share(), ctx.now)?;
            writeln!(ctx.out, "Sent to {} 💌", space.partner_name()?)?;
        }
    }
    Ok(())
}

/// One step of the incoming invitation flow per invocation. Declining only
/// teases: the card stays open.
fn run_inbox<S: Storage, W: Write>(
    space: &mut Space<S>,
    ctx: &mut CommandEnv<'_, W>,
    action: InboxCommand,
) -> anyhow::Result<()> {
    let incoming = space.incoming_invitation()?;
    if incoming == IncomingInvitation::Idle {
        return ctx
            .renderer
            .print_incoming(ctx.out, &incoming, space.partners());
    }

    let state = match action {
        InboxCommand::Show => incoming,
        InboxCommand::Open => incoming.open()?,
        InboxCommand::Decline => {
            let mut opened = incoming.open()?;
            opened.tease_decline(space.entropy())?;
            opened
        }
        InboxCommand::Accept => incoming.open()?.accept()?,
        InboxCommand::Dismiss => incoming.dismiss()?,
    };
    debug!(state = state.name(), "inbox transition");

    space.resolve_invitation(&state, ctx.now)?;
    ctx.renderer
        .print_incoming(ctx.out, &state, space.partners())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::datastore::MemoryStore;
    use crate::entropy::SequenceEntropy;
    use crate::model::PartnerRole;
    use crate::space::SpaceOptions;

    fn run(space: &mut Space<MemoryStore>, command: Command) -> anyhow::Result<String> {
        let renderer = Renderer::plain();
        let upload = UploadSettings::default();
        let mut buf = Vec::new();
        let mut ctx = CommandEnv {
            renderer: &renderer,
            upload: &upload,
            now: Utc
                .with_ymd_and_hms(2025, 11, 14, 12, 0, 0)
                .single()
                .expect("now"),
            out: &mut buf,
        };
        dispatch(space, &mut ctx, Some(command))?;
        Ok(String::from_utf8(buf).expect("utf8"))
    }

    fn fields(place: &str) -> InviteFields {
        InviteFields {
            template: Some("picnic-love".to_string()),
            title: None,
            message: None,
            date: None,
            time: None,
            place: place.to_string(),
            gif: Some(2),
            custom_gif: None,
            sticker: Some("🌹".to_string()),
            send: true,
        }
    }

    #[test]
    fn invite_then_accept_through_inbox() {
        let mut space = Space::with_entropy(
            MemoryStore::new(),
            MemoryStore::new(),
            SpaceOptions::default(),
            Box::new(SequenceEntropy::new(vec![0.9, 0.1])),
        );
        run(&mut space, Command::Login { role: PartnerRole::Male }).expect("login");
        let text = run(&mut space, Command::Invite(InviteCommand::New(fields("Park"))))
            .expect("invite");
        assert!(text.contains("(Picnic Date)"));
        assert!(text.contains("Sent to Bribri"));

        run(&mut space, Command::Login { role: PartnerRole::Female }).expect("login");
        let text = run(&mut space, Command::Inbox { action: None }).expect("inbox");
        assert!(text.contains("Ronron sent you a date invitation"));

        let text = run(
            &mut space,
            Command::Inbox {
                action: Some(InboxCommand::Decline),
            },
        )
        .expect("decline");
        assert!(text.contains("No, no please accept it 🥺"));

        let text = run(
            &mut space,
            Command::Inbox {
                action: Some(InboxCommand::Accept),
            },
        )
        .expect("accept");
        assert!(text.contains("You accepted Ronron's invitation"));
        assert_eq!(
            space.messages().last().map(|m| m.text.as_str()),
            Some("💖 I accept your invitation: Picnic Date")
        );

        let text = run(&mut space, Command::Inbox { action: None }).expect("inbox");
        assert!(text.contains("No new invitations."));
    }

    #[test]
    fn bad_sticker_and_gif_are_rejected() {
        let today = CalendarDate::from_ymd_opt(2025, 11, 14).expect("valid date");
        let mut bad = fields("Park");
        bad.sticker = Some("🙂".to_string());
        assert!(draft_from_fields(bad, today).is_err());

        let mut bad = fields("Park");
        bad.gif = Some(99);
        assert!(draft_from_fields(bad, today).is_err());
    }

    #[test]
    fn default_command_is_overview() {
        let mut space = Space::new(MemoryStore::new(), MemoryStore::new(), SpaceOptions::default());
        let renderer = Renderer::plain();
        let upload = UploadSettings::default();
        let mut buf = Vec::new();
        let mut ctx = CommandEnv {
            renderer: &renderer,
            upload: &upload,
            now: Utc::now(),
            out: &mut buf,
        };
        dispatch(&mut space, &mut ctx, None).expect("overview");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("Together since"));
    }
}
