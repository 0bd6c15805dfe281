use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::scheduler::reminders::Reminder;

/// Chat value meaning "every allowed chat", kept for compatibility with
/// older clients that sent it instead of a blank field
const BROADCAST_SENTINEL: &str = "-1";

/// Parse `dd/mm/yy`.
///
/// Any year below 2000 gets 2000 added, with no sliding window: `30` is
/// 2030, `99` is 2099, and a four-digit `2031` is taken as is.
pub fn parse_date(date: &str) -> Result<NaiveDate> {
    let parts = date
        .trim()
        .split('/')
        .map(|part| part.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Malformed date: {:?}", date))?;

    let &[day, month, year] = parts.as_slice() else {
        anyhow::bail!("Date must be dd/mm/yy, got {:?}", date);
    };
    let year = if year < 2000 { year + 2000 } else { year };

    if day < 1 || month < 1 {
        anyhow::bail!("Date out of range: {:?}", date);
    }
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .with_context(|| format!("Date out of range: {:?}", date))
}

/// Parse `hh:mm:ss`; missing trailing fields default to zero and a blank
/// time is midnight.
pub fn parse_time(time: &str) -> Result<NaiveTime> {
    let time = time.trim();
    let mut fields = [0u32; 3];

    if !time.is_empty() {
        let parts: Vec<&str> = time.split(':').collect();
        if parts.len() > fields.len() {
            anyhow::bail!("Time must be hh:mm:ss, got {:?}", time);
        }
        for (slot, part) in fields.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .with_context(|| format!("Malformed time: {:?}", time))?;
        }
    }

    NaiveTime::from_hms_opt(fields[0], fields[1], fields[2])
        .with_context(|| format!("Time out of range: {:?}", time))
}

pub fn parse_trigger_time(date: &str, time: &str) -> Result<NaiveDateTime> {
    Ok(parse_date(date)?.and_time(parse_time(time)?))
}

/// Build a reminder from `<name> <date> <time> <chat_or_blank> <message...>`
pub fn parse_reminder(args: &[String]) -> Result<Reminder> {
    let [name, date, time, chat, message @ ..] = args else {
        anyhow::bail!("remind needs a name, date, time and chat field");
    };
    if name.is_empty() {
        anyhow::bail!("Reminder name is empty");
    }

    let chat = chat.trim();
    let chat_id = if chat.is_empty() || chat == BROADCAST_SENTINEL {
        None
    } else {
        Some(
            chat.parse::<i64>()
                .with_context(|| format!("Malformed chat id: {:?}", chat))?,
        )
    };

    let message = message.join(" ");
    if message.trim().is_empty() {
        anyhow::bail!("Reminder '{}' has no message", name);
    }

    Ok(Reminder {
        name: name.clone(),
        trigger_time: parse_trigger_time(date, time)?,
        chat_id,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_two_digit_year_gets_century() {
        assert_eq!(
            parse_date("01/01/30").unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()
        );
        assert_eq!(
            parse_date("31/12/99").unwrap(),
            NaiveDate::from_ymd_opt(2099, 12, 31).unwrap()
        );
        assert_eq!(
            parse_date("15/06/2031").unwrap(),
            NaiveDate::from_ymd_opt(2031, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_bad_dates() {
        assert!(parse_date("32/01/30").is_err());
        assert!(parse_date("01/13/30").is_err());
        assert!(parse_date("01-01-30").is_err());
        assert!(parse_date("01/01").is_err());
        assert!(parse_date("aa/01/30").is_err());
        assert!(parse_date("0/01/30").is_err());
    }

    #[test]
    fn test_missing_time_fields_default_to_zero() {
        assert_eq!(
            parse_time("10").unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_time("10:30").unwrap(),
            NaiveTime::from_hms_opt(10, 30, 0).unwrap()
        );
        assert_eq!(
            parse_time("").unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert!(parse_time("25:00:00").is_err());
        assert!(parse_time("10:00:00:00").is_err());
        assert!(parse_time("ten").is_err());
    }

    #[test]
    fn test_blank_chat_means_broadcast() {
        let reminder =
            parse_reminder(&args(&["r1", "01/01/30", "10:00:00", "", "hello", "world"])).unwrap();
        assert_eq!(reminder.name, "r1");
        assert_eq!(reminder.trigger_time, at(2030, 1, 1, 10, 0, 0));
        assert_eq!(reminder.chat_id, None);
        assert_eq!(reminder.message, "hello world");
    }

    #[test]
    fn test_direct_chat_reminder() {
        let reminder =
            parse_reminder(&args(&["r2", "02/03/31", "08:15", "12345678", "wake", "up"])).unwrap();
        assert_eq!(reminder.chat_id, Some(12345678));
        assert_eq!(reminder.trigger_time, at(2031, 3, 2, 8, 15, 0));
        assert_eq!(reminder.message, "wake up");

        let legacy = parse_reminder(&args(&["r3", "02/03/31", "08:15", "-1", "x"])).unwrap();
        assert_eq!(legacy.chat_id, None);
    }

    #[test]
    fn test_malformed_reminders() {
        assert!(parse_reminder(&args(&["r1", "01/01/30", "10:00:00"])).is_err());
        assert!(parse_reminder(&args(&["r1", "01/01/30", "10:00:00", "abc", "hi"])).is_err());
        assert!(parse_reminder(&args(&["r1", "nope", "10:00:00", "", "hi"])).is_err());
        assert!(parse_reminder(&args(&["", "01/01/30", "10:00:00", "", "hi"])).is_err());
        assert!(parse_reminder(&args(&["r1", "01/01/30", "10:00", "12345678"])).is_err());
        assert!(parse_reminder(&args(&["r1", "01/01/30", "10:00", "12345678", ""])).is_err());
        assert!(parse_reminder(&args(&["r1", "01/01/30", "10:00", "", " ", " "])).is_err());
    }
}
