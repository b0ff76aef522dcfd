use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Local,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{
  debug,
  trace,
  warn
};

/// Calendar date used by every duration,
/// milestone and grid computation.
pub type CalendarDate = NaiveDate;

const TIMEZONE_FILE: &str =
  "babi-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "BABI_TIMEZONE";
const TIMEZONE_FILE_ENV_VAR: &str =
  "BABI_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct ZoneFile {
  timezone: Option<String>,
  time:     Option<ZoneSection>
}

#[derive(Debug, Deserialize)]
struct ZoneSection {
  timezone: Option<String>
}

/// Zone whose calendar decides what
/// "today" is.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum LocalZone {
  /// Named by `BABI_TIMEZONE` or
  /// `babi-time.toml`.
  Named(Tz),
  /// The machine's own zone.
  System
}

impl LocalZone {
  /// Env var first, then the zone
  /// file, then the system zone.
  pub fn resolve(
    lookup: impl Fn(&str) -> Option<String>
  ) -> Self {
    let named = lookup(TIMEZONE_ENV_VAR)
      .and_then(|raw| {
        zone_id(&raw, TIMEZONE_ENV_VAR)
      })
      .or_else(|| {
        zone_from_file(&zone_file_path(
          &lookup
        )?)
      });
    match named {
      | Some(tz) => Self::Named(tz),
      | None => {
        debug!(
          "no timezone configured; \
           using the system zone"
        );
        Self::System
      }
    }
  }

  #[must_use]
  pub fn date_of(
    self,
    now: DateTime<Utc>
  ) -> CalendarDate {
    match self {
      | Self::Named(tz) => {
        now.with_timezone(&tz).date_naive()
      }
      | Self::System => {
        now.with_timezone(&Local).date_naive()
      }
    }
  }
}

pub fn local_zone() -> LocalZone {
  static ZONE: OnceLock<LocalZone> =
    OnceLock::new();
  *ZONE.get_or_init(|| {
    LocalZone::resolve(|name| {
      std::env::var(name).ok()
    })
  })
}

/// The local calendar date of `now`.
#[must_use]
pub fn today(
  now: DateTime<Utc>
) -> CalendarDate {
  local_zone().date_of(now)
}

fn zone_file_path(
  lookup: &impl Fn(&str) -> Option<String>
) -> Option<PathBuf> {
  if let Some(raw) =
    lookup(TIMEZONE_FILE_ENV_VAR)
    && !raw.trim().is_empty()
  {
    return Some(PathBuf::from(
      raw.trim()
    ));
  }
  std::env::current_dir()
    .ok()
    .map(|dir| dir.join(TIMEZONE_FILE))
}

fn zone_from_file(
  path: &Path
) -> Option<Tz> {
  match read_zone_file(path) {
    | Ok(Some(id)) => zone_id(
      &id,
      &format!("file:{}", path.display())
    ),
    | Ok(None) => None,
    | Err(err) => {
      warn!(error = %err, "ignoring timezone file");
      None
    }
  }
}

fn read_zone_file(
  path: &Path
) -> anyhow::Result<Option<String>> {
  if !path.exists() {
    trace!(file = %path.display(), "no timezone file");
    return Ok(None);
  }
  let raw = fs::read_to_string(path)
    .with_context(|| {
      format!(
        "failed reading {}",
        path.display()
      )
    })?;
  let parsed: ZoneFile =
    toml::from_str(&raw).with_context(
      || {
        format!(
          "failed parsing {}",
          path.display()
        )
      }
    )?;
  Ok(parsed.timezone.or_else(|| {
    parsed
      .time
      .and_then(|section| section.timezone)
  }))
}

fn zone_id(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let id = raw.trim();
  if id.is_empty() {
    return None;
  }
  match id.parse::<Tz>() {
    | Ok(tz) => {
      debug!(source, timezone = %id, "using configured timezone");
      Some(tz)
    }
    | Err(err) => {
      warn!(source, timezone = %id, error = %err, "unknown timezone id");
      None
    }
  }
}

pub fn parse_ymd(
  input: &str
) -> anyhow::Result<CalendarDate> {
  let token = input.trim();
  if token.is_empty() {
    return Err(anyhow!(
      "date cannot be empty"
    ));
  }
  NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid date '{token}', \
       expected YYYY-MM-DD"
    )
  })
}

#[must_use]
pub fn to_ymd(
  date: CalendarDate
) -> String {
  date.format("%Y-%m-%d").to_string()
}

/// `Wed, October 15, 2025`
#[must_use]
pub fn date_label(
  date: CalendarDate
) -> String {
  date
    .format("%a, %B %-d, %Y")
    .to_string()
}

/// `10/15/2025`
#[must_use]
pub fn short_date(
  date: CalendarDate
) -> String {
  date
    .format("%-m/%-d/%Y")
    .to_string()
}

/// Same as [`short_date`] for a stored
/// ISO string; unparsable input is shown
/// verbatim.
#[must_use]
pub fn short_date_str(
  raw: &str
) -> String {
  parse_ymd(raw)
    .map(short_date)
    .unwrap_or_else(|_| raw.to_string())
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> CalendarDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> CalendarDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn add_days(
  date: CalendarDate,
  days: i64
) -> CalendarDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

/// Year and month `months` away from
/// `(year, month)`, carrying across year
/// boundaries in either direction.
pub fn shift_year_month(
  year: i32,
  month: u32,
  months: i32
) -> (i32, u32) {
  let zero_based = i64::from(year) * 12
    + i64::from(month)
    - 1
    + i64::from(months);
  let year = zero_based.div_euclid(12);
  let month =
    zero_based.rem_euclid(12) + 1;
  (
    i32::try_from(year).unwrap_or(
      if year < 0 {
        i32::MIN
      } else {
        i32::MAX
      }
    ),
    month as u32
  )
}

/// Adds calendar months, clamping the
/// day to the end of the target month
/// (Jan 31 + 1 month is the last day of
/// February).
pub fn add_months(
  date: CalendarDate,
  months: i32
) -> CalendarDate {
  let (year, month) = shift_year_month(
    date.year(),
    date.month(),
    months
  );
  let day = date
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(
    year, month, day
  )
  .unwrap_or(date)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn add_months_clamps_to_month_end() {
    assert_eq!(
      add_months(ymd(2024, 1, 31), 1),
      ymd(2024, 2, 29)
    );
    assert_eq!(
      add_months(ymd(2023, 1, 31), 1),
      ymd(2023, 2, 28)
    );
    assert_eq!(
      add_months(ymd(2025, 8, 31), 1),
      ymd(2025, 9, 30)
    );
  }

  #[test]
  fn add_months_carries_years_both_ways(
  ) {
    assert_eq!(
      add_months(ymd(2025, 10, 15), 3),
      ymd(2026, 1, 15)
    );
    assert_eq!(
      add_months(ymd(2025, 10, 15), 24),
      ymd(2027, 10, 15)
    );
    assert_eq!(
      add_months(ymd(2025, 2, 15), -3),
      ymd(2024, 11, 15)
    );
  }

  #[test]
  fn days_in_month_handles_leap_years() {
    assert_eq!(days_in_month(2024, 2), 29);
    assert_eq!(days_in_month(2023, 2), 28);
    assert_eq!(days_in_month(1900, 2), 28);
    assert_eq!(days_in_month(2000, 2), 29);
    assert_eq!(
      days_in_month(2025, 12),
      31
    );
  }

  #[test]
  fn parses_iso_dates() {
    assert_eq!(
      parse_ymd(" 2025-10-15 ")
        .expect("parse date"),
      ymd(2025, 10, 15)
    );
    assert!(parse_ymd("2025-02-30").is_err());
    assert!(parse_ymd("").is_err());
    assert!(parse_ymd("10/15/2025").is_err());
  }

  #[test]
  fn formats_labels() {
    let date = ymd(2025, 10, 15);
    assert_eq!(
      date_label(date),
      "Wed, October 15, 2025"
    );
    assert_eq!(short_date(date), "10/15/2025");
    assert_eq!(to_ymd(date), "2025-10-15");
    assert_eq!(
      short_date_str("not-a-date"),
      "not-a-date"
    );
  }

  fn noon_utc() -> DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2026, 2, 16, 20, 0, 0
      )
      .single()
      .expect("valid now")
  }

  #[test]
  fn env_zone_wins_over_file() {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let file = temp.path().join("tz.toml");
    fs::write(
      &file,
      "[time]\ntimezone = \"America/New_York\"\n"
    )
    .expect("write zone file");
    let file = file.display().to_string();

    let zone = LocalZone::resolve(|name| {
      match name {
        | "BABI_TIMEZONE" => {
          Some(" Asia/Manila ".to_string())
        }
        | "BABI_TIME_CONFIG" => {
          Some(file.clone())
        }
        | _ => None
      }
    });
    assert_eq!(
      zone,
      LocalZone::Named(
        chrono_tz::Asia::Manila
      )
    );
    assert_eq!(
      zone.date_of(noon_utc()),
      ymd(2026, 2, 17)
    );

    let from_file =
      LocalZone::resolve(|name| {
        (name == "BABI_TIME_CONFIG")
          .then(|| file.clone())
      });
    assert_eq!(
      from_file.date_of(noon_utc()),
      ymd(2026, 2, 16)
    );
  }

  #[test]
  fn unset_zone_falls_back_to_system()
  {
    let temp = tempfile::tempdir()
      .expect("tempdir");
    let missing = temp
      .path()
      .join("absent.toml")
      .display()
      .to_string();
    let zone = LocalZone::resolve(|name| {
      match name {
        | "BABI_TIMEZONE" => {
          Some("Not/AZone".to_string())
        }
        | "BABI_TIME_CONFIG" => {
          Some(missing.clone())
        }
        | _ => None
      }
    });
    assert_eq!(zone, LocalZone::System);
    assert_eq!(
      zone.date_of(noon_utc()),
      noon_utc()
        .with_timezone(&Local)
        .date_naive()
    );
  }

  #[test]
  fn today_uses_project_timezone() {
    let now = Utc
      .with_ymd_and_hms(
        2026, 2, 17, 12, 0, 0
      )
      .single()
      .expect("valid now");
    let local = today(now);
    let delta = (local - ymd(2026, 2, 17))
      .num_days()
      .abs();
    assert!(delta <= 1);
  }
}
