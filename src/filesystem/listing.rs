//! Parsing of `ls -la` output into file entries.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    /// Permission bits, `0o7777` at most
    pub mode: u32,
    pub modified: Option<NaiveDateTime>,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Quotes `value` for a POSIX shell; embedded `'` becomes `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parses the output of `ls -la`, skipping anything that is not an entry line.
///
/// `now` decides the year of `Mon DD HH:MM` timestamps.
pub fn parse_ls_output(output: &str, now: NaiveDateTime) -> Vec<FileEntry> {
    output
        .lines()
        .filter_map(|line| {
            let entry = parse_ls_line(line, now);
            if entry.is_none() && !line.trim().is_empty() && !line.starts_with("total ") {
                tracing::trace!("Skipping unparseable ls line: {:?}", line);
            }
            entry
        })
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect()
}

fn parse_ls_line(line: &str, now: NaiveDateTime) -> Option<FileEntry> {
    let (fields, rest) = take_fields(line, 5)?;
    let perms = fields[0];
    let mode = parse_mode(perms)?;
    let kind = perms.as_bytes()[0];

    // device files print "major, minor" where the size would be
    let (size, rest) = if fields[4].ends_with(',') {
        let (_, rest) = take_fields(rest, 1)?;
        (0, rest)
    } else {
        (fields[4].parse::<u64>().ok()?, rest)
    };

    let (modified, name) = parse_timestamp(rest, now)?;
    if name.is_empty() {
        return None;
    }

    let name = if kind == b'l' {
        name.split_once(" -> ").map_or(name, |(link, _)| link)
    } else {
        name
    };

    Some(FileEntry {
        name: name.to_string(),
        size,
        mode,
        modified: Some(modified),
        is_dir: kind == b'd',
        is_symlink: kind == b'l',
    })
}

/// Splits off `n` whitespace separated fields, returning them and the remainder
/// minus the single separator that follows the last field.
fn take_fields(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(n);
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = &rest[end..];
    }
    let rest = rest
        .strip_prefix(|c: char| c.is_whitespace())
        .unwrap_or(rest);
    Some((fields, rest))
}

/// Reads either `YYYY-MM-DD HH:MM` or `Mon DD HH:MM|YYYY` from the front of
/// `rest`, returning the timestamp and the file name after it.
fn parse_timestamp(rest: &str, now: NaiveDateTime) -> Option<(NaiveDateTime, &str)> {
    let (fields, name) = take_fields(rest, 2)?;
    if let (Ok(date), Ok(time)) = (
        NaiveDate::parse_from_str(fields[0], "%Y-%m-%d"),
        NaiveTime::parse_from_str(fields[1], "%H:%M"),
    ) {
        return Some((date.and_time(time), name.trim_start()));
    }

    let (fields, name) = take_fields(rest, 3)?;
    let month = month_number(fields[0])?;
    let day = fields[1].parse::<u32>().ok()?;

    if let Ok(time) = NaiveTime::parse_from_str(fields[2], "%H:%M") {
        let this_year = NaiveDate::from_ymd_opt(now.year(), month, day)
            .map(|date| date.and_time(time))
            .filter(|modified| *modified <= now);
        let modified = match this_year {
            Some(modified) => modified,
            // Feb 29 has no previous-year date; keep the slightly future one
            None => NaiveDate::from_ymd_opt(now.year() - 1, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(now.year(), month, day))?
                .and_time(time),
        };
        return Some((modified, name.trim_start()));
    }

    let year = fields[2].parse::<i32>().ok()?;
    let modified = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some((modified, name.trim_start()))
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32 + 1)
}

/// Converts `drwxr-sr-t`-style permissions into mode bits. Trailing ACL/xattr
/// markers (`+`, `.`, `@`) are ignored.
fn parse_mode(perms: &str) -> Option<u32> {
    let bytes = perms.as_bytes();
    if bytes.len() < 10 || !b"-dlcbps".contains(&bytes[0]) {
        return None;
    }

    const SPECIAL: [u32; 3] = [0o4000, 0o2000, 0o1000];
    let mut mode = 0;
    for (i, triple) in bytes[1..10].chunks(3).enumerate() {
        let shift = 6 - 3 * i as u32;
        match triple[0] {
            b'r' => mode |= 4 << shift,
            b'-' => {}
            _ => return None,
        }
        match triple[1] {
            b'w' => mode |= 2 << shift,
            b'-' => {}
            _ => return None,
        }
        match triple[2] {
            b'x' => mode |= 1 << shift,
            b's' | b't' => mode |= (1 << shift) | SPECIAL[i],
            b'S' | b'T' => mode |= SPECIAL[i],
            b'-' => {}
            _ => return None,
        }
    }
    Some(mode)
}
