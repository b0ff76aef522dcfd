use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::Local;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{MonthGrid, ViewMonth, WEEKDAY_LABELS};
use crate::datetime::{CalendarDate, date_label, short_date, short_date_str};
use crate::invitation::{IncomingInvitation, Resolution};
use crate::model::{
    Checkins, INVITATION_TEMPLATES, InvitationItem, InvitationShare, MemoryItem, Message,
    PartnerNames, PartnerRole,
};
use crate::space::Overview;

const RED: &str = "31";
const GREEN: &str = "32";
const YELLOW: &str = "33";
const MAGENTA: &str = "35";
const BOLD: &str = "1";
const DIM: &str = "2";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour follows the `color` key, and is only used on a terminal.
    pub fn new(color_setting: Option<&str>) -> anyhow::Result<Self> {
        let color = match color_setting.unwrap_or("on").to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_overview<W: Write>(
        &self,
        out: &mut W,
        overview: &Overview,
        names: &PartnerNames,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} 💞 {}",
            self.paint(&names.male, BOLD),
            self.paint(&names.female, BOLD)
        )?;
        writeln!(out, "Together since {}", date_label(overview.start))?;
        writeln!(out)?;

        let duration = &overview.duration;
        let counters = [
            ("Years", duration.years),
            ("Months", duration.months),
            ("Days", duration.days),
            ("Weeks total", duration.total_weeks),
            ("Days total", duration.total_days),
        ];
        for (label, value) in counters {
            writeln!(out, "{label:<12} {}", self.paint(&value.to_string(), MAGENTA))?;
        }
        writeln!(out)?;

        if overview.upcoming.is_empty() {
            writeln!(out, "No upcoming milestones.")?;
            return Ok(());
        }

        writeln!(out, "{}", self.paint("Upcoming milestones", BOLD))?;
        let rows = overview
            .upcoming
            .iter()
            .map(|event| {
                let days_left = (event.date - overview.today).num_days();
                let when = match days_left {
                    0 => self.paint("today", GREEN),
                    1 => "tomorrow".to_string(),
                    n => format!("in {n} days"),
                };
                vec![event.title.clone(), date_label(event.date), when]
            })
            .collect();
        write_table(
            out,
            vec!["Milestone".to_string(), "Date".to_string(), "When".to_string()],
            rows,
        )
    }

    /// Month grid, Sunday first. `[d]` marks today and `d*` a labelled day;
    /// labels are listed under the grid.
    #[tracing::instrument(skip(self, out, grid))]
    pub fn print_calendar<W: Write>(
        &self,
        out: &mut W,
        view: ViewMonth,
        grid: &MonthGrid,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&view.to_string(), BOLD))?;
        for label in WEEKDAY_LABELS {
            write!(out, "{label:>5}")?;
        }
        writeln!(out)?;

        for week in grid.chunks(7) {
            if week.iter().all(Option::is_none) {
                continue;
            }
            for slot in week {
                let Some(cell) = slot else {
                    write!(out, "{:>5}", "")?;
                    continue;
                };
                let text = match (cell.is_today, cell.label.is_some()) {
                    (true, true) => format!("[{}]*", cell.day),
                    (true, false) => format!("[{}]", cell.day),
                    (false, true) => format!("{}*", cell.day),
                    (false, false) => cell.day.to_string(),
                };
                let padded = format!("{text:>5}");
                let painted = if cell.label.is_some() {
                    self.paint(&padded, MAGENTA)
                } else if cell.is_today {
                    self.paint(&padded, YELLOW)
                } else {
                    padded
                };
                write!(out, "{painted}")?;
            }
            writeln!(out)?;
        }

        let labelled: Vec<_> = grid
            .iter()
            .flatten()
            .filter_map(|cell| cell.label.as_ref().map(|label| (cell.date, label)))
            .collect();
        if !labelled.is_empty() {
            writeln!(out)?;
            for (date, label) in labelled {
                writeln!(out, "{}  {label}", date.format("%b %-d"))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(count = messages.len()))]
    pub fn print_messages<W: Write>(
        &self,
        out: &mut W,
        messages: &[Message],
        names: &PartnerNames,
        me: Option<PartnerRole>,
    ) -> anyhow::Result<()> {
        if messages.is_empty() {
            writeln!(out, "Start your first sweet message 💌")?;
            return Ok(());
        }
        for message in messages {
            let sender = names.name_of(message.sender);
            let sender = if Some(message.sender) == me {
                self.paint(sender, GREEN)
            } else {
                self.paint(sender, MAGENTA)
            };
            let stamp = message.created_at.with_timezone(&Local).format("%-m/%-d %H:%M");
            writeln!(out, "{} {sender}", self.paint(&stamp.to_string(), DIM))?;

            if let Some(share) = &message.invitation {
                self.write_invitation_card(out, share, "  ")?;
            } else {
                for line in message.text.lines() {
                    writeln!(out, "  {line}")?;
                }
                if let Some(image) = &message.image {
                    writeln!(out, "  📷 {}", abbreviate_image(image))?;
                }
            }
        }
        Ok(())
    }

    pub fn print_checkins<W: Write>(
        &self,
        out: &mut W,
        checkins: &Checkins,
        names: &PartnerNames,
    ) -> anyhow::Result<()> {
        for role in PartnerRole::ALL {
            let checkin = checkins.get(role);
            writeln!(
                out,
                "{} {} {}",
                self.paint(names.name_of(role), BOLD),
                checkin.mood.emoji(),
                checkin.mood.label()
            )?;
            if !checkin.note.is_empty() {
                writeln!(out, "  \"{}\"", checkin.note)?;
            }
            if !checkin.updated_at.is_empty() {
                writeln!(out, "  {}", self.paint(&format!("updated {}", checkin.updated_at), DIM))?;
            }
        }
        Ok(())
    }

    pub fn print_ideas<W: Write>(&self, out: &mut W, ideas: &[String]) -> anyhow::Result<()> {
        for (index, idea) in ideas.iter().enumerate() {
            writeln!(out, "{:>3}. {idea}", index + 1)?;
        }
        Ok(())
    }

    pub fn print_memories<W: Write>(
        &self,
        out: &mut W,
        memories: &[MemoryItem],
        names: &PartnerNames,
    ) -> anyhow::Result<()> {
        if memories.is_empty() {
            writeln!(out, "No memories yet.")?;
            return Ok(());
        }
        let rows = memories
            .iter()
            .map(|memory| {
                let star = if memory.favorite {
                    self.paint("★", YELLOW)
                } else {
                    "☆".to_string()
                };
                vec![
                    short_id(&memory.id).to_string(),
                    star,
                    short_date_str(&memory.date),
                    names.name_of(memory.author).to_string(),
                    memory.text.clone(),
                ]
            })
            .collect();
        write_table(
            out,
            ["ID", "Fav", "Date", "By", "Memory"]
                .map(str::to_string)
                .to_vec(),
            rows,
        )
    }

    pub fn print_templates<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        let rows = INVITATION_TEMPLATES
            .iter()
            .map(|template| {
                vec![
                    template.id.to_string(),
                    template.name.to_string(),
                    template.title.to_string(),
                ]
            })
            .collect();
        write_table(
            out,
            vec!["ID".to_string(), "Name".to_string(), "Title".to_string()],
            rows,
        )
    }

    pub fn print_invitations<W: Write>(
        &self,
        out: &mut W,
        invitations: &[InvitationItem],
        names: &PartnerNames,
    ) -> anyhow::Result<()> {
        if invitations.is_empty() {
            writeln!(out, "No saved invitations.")?;
            return Ok(());
        }
        let rows = invitations
            .iter()
            .map(|item| {
                vec![
                    self.paint(short_id(&item.id), YELLOW),
                    format!("{} {}", item.sticker, item.title),
                    format!("{} {}", short_date_str(&item.date), item.time),
                    item.place.clone(),
                    names.name_of(item.created_by).to_string(),
                ]
            })
            .collect();
        write_table(
            out,
            ["ID", "Invitation", "When", "Where", "By"]
                .map(str::to_string)
                .to_vec(),
            rows,
        )
    }

    /// Incoming invitation screen for the current state.
    pub fn print_incoming<W: Write>(
        &self,
        out: &mut W,
        state: &IncomingInvitation,
        names: &PartnerNames,
    ) -> anyhow::Result<()> {
        let from = state
            .message()
            .map(|message| names.name_of(message.sender))
            .unwrap_or_default();
        match state {
            IncomingInvitation::Idle => writeln!(out, "No new invitations.")?,
            IncomingInvitation::Envelope { .. } => {
                writeln!(out, "💌 {from} sent you a date invitation!")?;
                writeln!(out, "Run `babi inbox open` to open the envelope.")?;
            }
            IncomingInvitation::CardOpened { offset, .. } => {
                if let Some(share) = state.share() {
                    self.write_invitation_card(out, share, "")?;
                }
                writeln!(out)?;
                let pad = " ".repeat(usize::try_from(offset.x.max(0) / 10).unwrap_or(0));
                writeln!(
                    out,
                    "[{}]  {pad}[{}]",
                    self.paint("Accept 💖", GREEN),
                    state.decline_label()
                )?;
                if let Some(hint) = state.decline_hint() {
                    writeln!(out, "{}", self.paint(hint, RED))?;
                }
            }
            IncomingInvitation::Resolved { resolution, .. } => match resolution {
                Resolution::Accepted => writeln!(out, "💖 You accepted {from}'s invitation.")?,
                Resolution::Dismissed => writeln!(out, "Invitation closed.")?,
            },
        }
        Ok(())
    }

    fn write_invitation_card<W: Write>(
        &self,
        out: &mut W,
        share: &InvitationShare,
        indent: &str,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{indent}{} {}",
            share.sticker,
            self.paint(&share.title, BOLD)
        )?;
        writeln!(out, "{indent}{}", share.message)?;
        writeln!(out, "{indent}📅 {} · {}", short_date_str(&share.date), share.time)?;
        writeln!(out, "{indent}📍 {}", share.place)?;
        writeln!(out, "{indent}🎞  {}", abbreviate_image(&share.gif))?;
        Ok(())
    }

    pub fn print_start<W: Write>(&self, out: &mut W, start: CalendarDate) -> anyhow::Result<()> {
        writeln!(
            out,
            "Start date: {} ({})",
            date_label(start),
            short_date(start)
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Data URLs are shown by type and size instead of inline.
fn abbreviate_image(image: &str) -> String {
    match image.strip_prefix("data:") {
        Some(rest) => {
            let mime = rest.split(';').next().unwrap_or("image");
            format!("[inline {mime}, {} chars]", image.len())
        }
        None => image.to_string(),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::calendar::build_month_grid;
    use crate::duration::compute_duration;
    use crate::milestones::upcoming_milestones;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn render(f: impl FnOnce(&Renderer, &mut Vec<u8>) -> anyhow::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&Renderer::plain(), &mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn strip_ansi_removes_sequences() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m text"), "red text");
    }

    #[test]
    fn rejects_unknown_color_setting() {
        assert!(Renderer::new(Some("sometimes")).is_err());
        assert!(Renderer::new(Some("off")).is_ok());
    }

    #[test]
    fn overview_lists_counters_and_milestones() {
        let start = ymd(2025, 10, 15);
        let today = ymd(2025, 11, 14);
        let overview = Overview {
            start,
            today,
            duration: compute_duration(start, today),
            upcoming: upcoming_milestones(start, today),
        };
        let text = render(|r, out| r.print_overview(out, &overview, &PartnerNames::default()));

        assert!(text.contains("Ronron 💞 Bribri"));
        assert!(text.contains("Together since Wed, October 15, 2025"));
        assert!(text.contains("Days total   30"));
        assert!(text.contains("1st monthsary"));
        assert!(text.contains("tomorrow"));
    }

    #[test]
    fn calendar_marks_today_and_labels() {
        let start = ymd(2025, 10, 15);
        let today = ymd(2025, 11, 3);
        let view = ViewMonth::new(2025, 11).expect("view");
        let grid = build_month_grid(view, &upcoming_milestones(start, today), start, today);
        let text = render(|r, out| r.print_calendar(out, view, &grid));

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "November 2025");
        assert!(lines[1].starts_with("  Sun  Mon"));
        assert!(text.contains("[3]"));
        assert!(text.contains("15*"));
        assert!(text.contains("Nov 15  1st monthsary"));
    }

    #[test]
    fn images_are_abbreviated() {
        assert_eq!(
            abbreviate_image("data:image/png;base64,AAAA"),
            "[inline image/png, 26 chars]"
        );
        assert_eq!(abbreviate_image("https://x/y.png"), "https://x/y.png");
    }
}
