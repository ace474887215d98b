use alloc::format;
use alloc::string::{String, ToString};

/// A `Nats-Schedule` header value
///
/// The client only renders and parses this grammar; the schedule itself is
/// evaluated server-side. A `ScheduleSpec` is meaningless unless the stream
/// it's published to was created with `allow_msg_schedules` and the publish
/// also carries a `Nats-Schedule-Target` header naming a subject the stream
/// covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// A single delivery at a fixed instant (RFC3339, UTC). Past instants fire immediately.
    At(String),
    /// A repeating interval, rendered as `<integer><unit>` with unit in `s`, `m`, `h`.
    Every { amount: u64, unit: IntervalUnit },
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    /// A 6-field cron expression: `sec min hour dom mon dow`.
    Cron(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
}

impl IntervalUnit {
    const fn as_char(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
        }
    }

    const fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            _ => None,
        }
    }
}

impl ScheduleSpec {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::At(at) => format!("@at {at}"),
            Self::Every { amount, unit } => format!("@every {amount}{}", unit.as_char()),
            Self::Hourly => "@hourly".to_string(),
            Self::Daily => "@daily".to_string(),
            Self::Weekly => "@weekly".to_string(),
            Self::Monthly => "@monthly".to_string(),
            Self::Yearly => "@yearly".to_string(),
            Self::Cron(expr) => expr.clone(),
        }
    }

    /// Parse a `Nats-Schedule` header value back into a [`ScheduleSpec`]
    ///
    /// Used by tests and by any code that wants to introspect a schedule it
    /// previously rendered; the broker itself never sends this value back.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if let Some(at) = value.strip_prefix("@at ") {
            return Some(Self::At(at.to_string()));
        }
        if let Some(every) = value.strip_prefix("@every ") {
            let unit_char = every.chars().last()?;
            let unit = IntervalUnit::from_char(unit_char)?;
            let amount = every[..every.len() - 1].parse().ok()?;
            return Some(Self::Every { amount, unit });
        }
        match value {
            "@hourly" => return Some(Self::Hourly),
            "@daily" => return Some(Self::Daily),
            "@weekly" => return Some(Self::Weekly),
            "@monthly" => return Some(Self::Monthly),
            "@yearly" => return Some(Self::Yearly),
            _ => {}
        }
        if value.split(' ').count() == 6 {
            return Some(Self::Cron(value.to_string()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::{IntervalUnit, ScheduleSpec};

    #[test]
    fn render_at() {
        let spec = ScheduleSpec::At("2026-07-27T12:00:00Z".to_string());
        assert_eq!("@at 2026-07-27T12:00:00Z", spec.render());
        assert_eq!(Some(spec.clone()), ScheduleSpec::parse(&spec.render()));
    }

    #[test]
    fn render_every() {
        let spec = ScheduleSpec::Every {
            amount: 30,
            unit: IntervalUnit::Seconds,
        };
        assert_eq!("@every 30s", spec.render());
        assert_eq!(Some(spec.clone()), ScheduleSpec::parse(&spec.render()));
    }

    #[test]
    fn render_predefined() {
        assert_eq!("@hourly", ScheduleSpec::Hourly.render());
        assert_eq!(Some(ScheduleSpec::Hourly), ScheduleSpec::parse("@hourly"));
    }

    #[test]
    fn render_cron() {
        let spec = ScheduleSpec::Cron("0 0 * * * *".to_string());
        assert_eq!(Some(spec.clone()), ScheduleSpec::parse(&spec.render()));
    }
}
