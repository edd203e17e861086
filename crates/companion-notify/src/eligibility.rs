use companion_types::models::NotificationPreference;
use thiserror::Error;

/// Why a notification was not sent. The `Display` text is the reason
/// reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Notifications disabled")]
    Disabled,
    #[error("In quiet hours")]
    QuietHours,
    #[error("Daily limit reached")]
    DailyLimit,
    #[error("No character found")]
    NoCharacter,
}

/// Quiet-hours window check. A window with `start > end` wraps past midnight;
/// `start == end` is an empty window.
pub fn in_quiet_hours(hour: u8, start: u8, end: u8) -> bool {
    if start > end {
        hour >= start || hour < end
    } else {
        start <= hour && hour < end
    }
}

/// Gate a candidate on its preferences, the current UTC hour and how many
/// notifications it already received today. Character selection happens
/// afterwards.
pub fn check(pref: &NotificationPreference, hour: u8, sent_today: u32) -> Result<(), Rejection> {
    if !pref.enabled {
        return Err(Rejection::Disabled);
    }
    if in_quiet_hours(hour, pref.quiet_hours_start, pref.quiet_hours_end) {
        return Err(Rejection::QuietHours);
    }
    if sent_today >= pref.frequency.daily_cap() {
        return Err(Rejection::DailyLimit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_types::models::Frequency;

    fn pref(start: u8, end: u8) -> NotificationPreference {
        NotificationPreference {
            enabled: true,
            frequency: Frequency::Medium,
            quiet_hours_start: start,
            quiet_hours_end: end,
        }
    }

    #[test]
    fn overnight_window() {
        assert!(in_quiet_hours(23, 22, 8));
        assert!(in_quiet_hours(5, 22, 8));
        assert!(in_quiet_hours(22, 22, 8));
        assert!(!in_quiet_hours(8, 22, 8));
        assert!(!in_quiet_hours(12, 22, 8));
    }

    #[test]
    fn daytime_window() {
        assert!(in_quiet_hours(12, 9, 17));
        assert!(in_quiet_hours(9, 9, 17));
        assert!(!in_quiet_hours(17, 9, 17));
        assert!(!in_quiet_hours(20, 9, 17));
    }

    #[test]
    fn degenerate_windows() {
        for hour in 0..24 {
            assert!(!in_quiet_hours(hour, 10, 10));
        }
        // 23..0 wraps and only covers the last hour of the day
        assert!(in_quiet_hours(23, 23, 0));
        assert!(!in_quiet_hours(0, 23, 0));
        assert!(!in_quiet_hours(12, 23, 0));
    }

    #[test]
    fn disabled_wins_over_everything() {
        let mut p = pref(22, 8);
        p.enabled = false;
        assert_eq!(check(&p, 12, 0), Err(Rejection::Disabled));
        assert_eq!(check(&p, 23, 99), Err(Rejection::Disabled));
    }

    #[test]
    fn caps_follow_frequency() {
        let mut p = pref(22, 8);
        for (frequency, cap) in [(Frequency::Low, 2), (Frequency::Medium, 5), (Frequency::High, 8)] {
            p.frequency = frequency;
            assert_eq!(check(&p, 12, cap - 1), Ok(()));
            assert_eq!(check(&p, 12, cap), Err(Rejection::DailyLimit));
        }
    }

    #[test]
    fn quiet_hours_checked_before_cap() {
        assert_eq!(check(&pref(22, 8), 23, 100), Err(Rejection::QuietHours));
        assert_eq!(check(&NotificationPreference::default(), 3, 0), Err(Rejection::QuietHours));
    }

    #[test]
    fn reasons_mention_cause() {
        assert!(Rejection::Disabled.to_string().to_lowercase().contains("disabled"));
        assert!(Rejection::QuietHours.to_string().to_lowercase().contains("quiet hours"));
        assert!(Rejection::DailyLimit.to_string().to_lowercase().contains("daily limit"));
    }
}
