//! Time token parsing and formatting for schedule cells.
//!
//! A cell side holds whatever the user typed. Tokens are read as a clock time
//! ("9", "930", "0930", "9:30", "24"), as an off-day marker, or as nothing
//! usable at all.

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Result of reading one side of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    /// Explicit non-working day
    Off,
    /// Minutes since local midnight, 0..=1440
    Minutes(u32),
    /// Blank or unreadable text
    Invalid,
}

/// Parser configured with the accepted off-day markers.
///
/// Off detection is an exact, case-insensitive match of the trimmed token
/// against `markers`. Nothing is matched by prefix or leading character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParser {
    markers: Vec<String>,
    off_display: String,
}

impl Default for TimeParser {
    fn default() -> Self {
        Self::new(default_off_markers().as_slice(), "OFF")
    }
}

/// Markers seen in rosters: the English word, Latin "B"/"V", and the Cyrillic
/// "В"/"ВЫХ"/"ВЫХОДНОЙ" used for "выходной".
pub fn default_off_markers() -> Vec<String> {
    ["OFF", "B", "V", "В", "ВЫХ", "ВЫХОДНОЙ"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl TimeParser {
    pub fn new<S: AsRef<str>>(markers: &[S], off_display: &str) -> Self {
        let mut markers: Vec<String> = markers
            .iter()
            .map(|m| m.as_ref().trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();

        // The canonical text must read back as Off or normalize would not be idempotent
        let off_display = off_display.trim().to_string();
        let off_display = if off_display.is_empty() { "OFF".to_string() } else { off_display };
        let display_key = off_display.to_uppercase();
        if !markers.contains(&display_key) {
            markers.push(display_key);
        }

        Self { markers, off_display }
    }

    pub fn off_display(&self) -> &str {
        &self.off_display
    }

    pub fn is_off_marker(&self, token: &str) -> bool {
        let key = token.trim().to_uppercase();
        !key.is_empty() && self.markers.iter().any(|m| *m == key)
    }

    pub fn parse(&self, token: &str) -> ParsedTime {
        if self.is_off_marker(token) {
            return ParsedTime::Off;
        }
        match parse_clock(token) {
            Some(minutes) => ParsedTime::Minutes(minutes),
            None => ParsedTime::Invalid,
        }
    }

    /// Rewrite a token into its display form: "HH:MM" for clock times, the
    /// canonical off text for markers. Blank becomes empty; unreadable text is
    /// only trimmed.
    pub fn normalize(&self, token: &str) -> String {
        match self.parse(token) {
            ParsedTime::Minutes(minutes) => format_clock(minutes),
            ParsedTime::Off => self.off_display.clone(),
            ParsedTime::Invalid => token.trim().to_string(),
        }
    }
}

/// Parse a clock token into minutes since midnight.
///
/// One or two digits are an hour; three digits are `H MM`; four are `HH MM`.
/// With a colon, each side takes one or two digits.
pub fn parse_clock(token: &str) -> Option<u32> {
    let s = token.trim();

    let (hour, minute) = match s.split_once(':') {
        Some((h, m)) => {
            if !is_digits(h, 1, 2) || !is_digits(m, 1, 2) {
                return None;
            }
            (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?)
        }
        None => {
            if !is_digits(s, 1, 4) {
                return None;
            }
            // All ASCII digits, so byte slicing is on char boundaries
            match s.len() {
                1 | 2 => (s.parse::<u32>().ok()?, 0),
                3 => (s[..1].parse::<u32>().ok()?, s[1..].parse::<u32>().ok()?),
                _ => (s[..2].parse::<u32>().ok()?, s[2..].parse::<u32>().ok()?),
            }
        }
    };

    minute_of_day(hour, minute)
}

fn is_digits(s: &str, min_len: usize, max_len: usize) -> bool {
    (min_len..=max_len).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

/// 24:00 is the only valid time in hour 24
pub fn minute_of_day(hour: u32, minute: u32) -> Option<u32> {
    if hour > 24 || minute > 59 || (hour == 24 && minute != 0) {
        return None;
    }
    Some(hour * 60 + minute)
}

/// Format minutes since midnight as "HH:MM" (1440 => "24:00")
pub fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Format a worked duration in the clock layout. Hours are not wrapped, so a
/// double shift reads "25:00" and a month total "184:30".
pub fn format_duration(minutes: u32) -> String {
    format_clock(minutes)
}

/// Worked minutes between two parsed sides.
///
/// Equal sides are a full 24-hour shift. A double shift whose end is not
/// before its start runs past the next midnight. Otherwise the span wraps at
/// midnight.
pub fn calc_span(start: ParsedTime, end: ParsedTime, double_shift: bool) -> Option<u32> {
    let (ParsedTime::Minutes(a), ParsedTime::Minutes(b)) = (start, end) else {
        return None;
    };

    if a == b {
        return Some(MINUTES_PER_DAY);
    }
    if double_shift && b >= a {
        return Some(MINUTES_PER_DAY + (b - a));
    }
    if b >= a {
        Some(b - a)
    } else {
        Some(b + MINUTES_PER_DAY - a)
    }
}

impl TimeParser {
    /// Worked minutes for a pair of raw tokens
    pub fn span(&self, start: &str, end: &str, double_shift: bool) -> Option<u32> {
        calc_span(self.parse(start), self.parse(end), double_shift)
    }
}
