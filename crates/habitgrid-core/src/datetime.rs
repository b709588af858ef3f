use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "HABITGRID_TIMEZONE";

/// Zone that decides which calendar day "today" is. The configured value
/// must parse; the environment variable only warns, then falls back to UTC.
#[tracing::instrument]
pub fn resolve_timezone(
  configured: Option<&str>
) -> anyhow::Result<Tz> {
  if let Some(raw) = configured {
    return parse_timezone(raw)
      .with_context(|| {
        format!(
          "invalid timezone in config: \
           {raw}"
        )
      });
  }

  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
  {
    match parse_timezone(&raw) {
      | Ok(tz) => return Ok(tz),
      | Err(err) => {
        tracing::warn!(
          source = TIMEZONE_ENV_VAR,
          timezone = %raw,
          error = %err,
          "ignoring unparsable timezone; using UTC"
        );
      }
    }
  }

  Ok(chrono_tz::UTC)
}

fn parse_timezone(
  raw: &str
) -> anyhow::Result<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(anyhow!(
      "timezone is empty"
    ));
  }
  let tz =
    trimmed.parse::<Tz>().map_err(
      |err| anyhow!("{err}")
    )?;
  tracing::debug!(timezone = %trimmed, "resolved timezone");
  Ok(tz)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: &Tz
) -> NaiveDate {
  dt.with_timezone(tz).date_naive()
}

fn relative_re()
-> Option<&'static Regex> {
  static RELATIVE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  RELATIVE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<sign>[+-])?(?P<count>\d{1,5})(?P<unit>[dw])$"
      )
      .ok()
    })
    .as_ref()
}

/// Resolves a day expression relative to `today`.
///
/// Accepts `today`, `yesterday`, `tomorrow`, `YYYY-MM-DD`, `YYYYMMDD`,
/// a bare year (January 1st), `+Nd`/`-Nd`/`+Nw`/`-Nw` offsets, and
/// weekday names, which pick the most recent such day on or before today.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "yesterday" => {
      return shift(today, -1);
    }
    | "tomorrow" => {
      return shift(today, 1);
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(previous_weekday_date(
      today, weekday
    ));
  }

  if token.len() == 4
    && token
      .chars()
      .all(|c| c.is_ascii_digit())
  {
    let year: i32 =
      token.parse().context(
        "invalid 4-digit year"
      )?;
    return NaiveDate::from_ymd_opt(
      year, 1, 1
    )
    .ok_or_else(|| {
      anyhow!(
        "invalid year value: {year}"
      )
    });
  }

  if let Some(captures) =
    relative_re()
      .and_then(|re| re.captures(&lower))
  {
    let count: i64 = captures
      .name("count")
      .map(|m| m.as_str())
      .unwrap_or("0")
      .parse()
      .context(
        "invalid relative offset"
      )?;
    let negative = captures
      .name("sign")
      .is_some_and(|m| m.as_str() == "-");
    let per_unit = match captures
      .name("unit")
      .map(|m| m.as_str())
    {
      | Some("w") => 7,
      | _ => 1
    };
    let days = count * per_unit;
    return shift(
      today,
      if negative { -days } else { days }
    );
  }

  for format in ["%Y-%m-%d", "%Y%m%d"] {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        token, format
      )
    {
      return Ok(date);
    }
  }

  Err(anyhow!(
    "unrecognized date expression \
     '{token}'. Supported: today, \
     yesterday, tomorrow, weekday \
     names (e.g. monday), a year \
     (e.g. 2024), +Nd/-Nd/+Nw/-Nw, \
     YYYY-MM-DD, YYYYMMDD"
  ))
}

fn shift(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .ok_or_else(|| {
      anyhow!(
        "date offset of {days} days \
         from {date} is out of range"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn previous_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let delta =
    (7 + from_idx - target_idx) % 7;
  from
    .checked_sub_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
